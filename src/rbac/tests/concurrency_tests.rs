//! Concurrent access tests
//!
//! Readers must only ever see whole graph snapshots, writers on one key
//! must not lose updates, and writers on different tenants run side by side.
//! Every test runs on the multi-threaded runtime so tasks really overlap.

use cretoai_rbac::{
    EngineConfig, HierarchyType, RbacEngine, RbacError, SdKind, SdSet, User, UserRole,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn engine() -> RbacEngine {
    RbacEngine::in_memory(EngineConfig::default()).unwrap()
}

fn role(i: usize) -> String {
    format!("R{:03}", i)
}

// ============================================================================
// SNAPSHOT CONSISTENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_complete_chains() {
    let engine = engine();
    let done = Arc::new(AtomicBool::new(false));
    const LEN: usize = 40;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut observed = 0;
            while !done.load(Ordering::SeqCst) {
                let asc = engine
                    .hierarchy()
                    .ascendants(HierarchyType::Role, "", &role(0))
                    .await
                    .unwrap();

                // The chain grows from the bottom, so any snapshot is a prefix
                let expected: BTreeSet<String> = (1..=asc.len()).map(role).collect();
                assert_eq!(asc, expected);
                assert!(asc.len() >= observed);
                observed = asc.len();
                tokio::task::yield_now().await;
            }
        }));
    }

    for i in 0..LEN {
        engine
            .hierarchy()
            .add_edge(HierarchyType::Role, "", &role(i), &role(i + 1))
            .await
            .unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.await.unwrap();
    }

    let asc = engine
        .hierarchy()
        .ascendants(HierarchyType::Role, "", &role(0))
        .await
        .unwrap();
    assert_eq!(asc.len(), LEN);
}

// ============================================================================
// WRITER SERIALIZATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_do_not_lose_edges() {
    let engine = engine();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .hierarchy()
                    .add_edge(HierarchyType::Role, "", &role(i), "ROOT")
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        engine
            .hierarchy()
            .num_children(HierarchyType::Role, "", "root")
            .await
            .unwrap(),
        32
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_opposite_edges_admit_one() {
    let engine = engine();

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .hierarchy()
                .add_edge(HierarchyType::Role, "", "X", "Y")
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .hierarchy()
                .add_edge(HierarchyType::Role, "", "Y", "X")
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let graph = engine.hierarchy().graph(HierarchyType::Role, "").await.unwrap();
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_node_stops_once_child_appears() {
    const PARENTS: usize = 8;

    for _ in 0..20 {
        let engine = engine();
        for p in 0..PARENTS {
            engine
                .hierarchy()
                .add_edge(HierarchyType::Role, "", "X", &role(p))
                .await
                .unwrap();
        }

        // Once X has a child, no more of its parent edges may go
        let done = Arc::new(AtomicBool::new(false));
        let watcher = {
            let engine = engine.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut floor = None;
                while !done.load(Ordering::SeqCst) {
                    let graph = engine.hierarchy().graph(HierarchyType::Role, "").await.unwrap();
                    let parents = graph.parents("X").len();
                    if let Some(floor) = floor {
                        assert!(parents >= floor);
                    } else if graph.num_children("X") > 0 {
                        floor = Some(parents);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let remover = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .hierarchy()
                    .remove_node(HierarchyType::Role, "", "X")
                    .await
            })
        };
        let adder = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .hierarchy()
                    .add_edge(HierarchyType::Role, "", "C", "X")
                    .await
            })
        };

        let removed = remover.await.unwrap();
        adder.await.unwrap().unwrap();
        done.store(true, Ordering::SeqCst);
        watcher.await.unwrap();

        let graph = engine.hierarchy().graph(HierarchyType::Role, "").await.unwrap();
        match removed {
            Ok(()) => assert!(graph.parents("X").is_empty()),
            Err(e) => {
                assert!(matches!(e, RbacError::HasChildren { .. }));
                assert!(!graph.parents("X").is_empty());
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tenants_write_independently() {
    let engine = engine();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let tenant = format!("tenant-{}", t);
                for i in 0..10 {
                    engine
                        .hierarchy()
                        .add_edge(HierarchyType::Role, &tenant, &role(i), &role(i + 1))
                        .await
                        .unwrap();
                }
                tenant
            })
        })
        .collect();

    for handle in handles {
        let tenant = handle.await.unwrap();
        let asc = engine
            .hierarchy()
            .ascendants(HierarchyType::Role, &tenant, &role(0))
            .await
            .unwrap();
        assert_eq!(asc.len(), 10);
    }

    assert!(engine
        .hierarchy()
        .ascendants(HierarchyType::Role, "", &role(0))
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// CONSTRAINT CACHE UNDER LOAD
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ssd_checks_share_cache() {
    let engine = engine();
    engine
        .sd_sets()
        .create_set(SdSet::new("Payments", SdKind::Static, ["R1", "R2"], 2))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut user = User::new(format!("user-{}", i)).with_role(UserRole::new("R1"));
                engine.assign_user(&mut user, UserRole::new("R2")).await.is_err()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let stats = engine.constraint_store().stats();
    assert_eq!(stats.hits + stats.misses, 16);
    assert!(stats.entries >= 1);
}

// ============================================================================
// SD SET ADMINISTRATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_member_keeps_every_role() {
    let engine = engine();
    engine
        .sd_sets()
        .create_set(SdSet::new("S", SdKind::Static, ["A", "B"], 2))
        .await
        .unwrap();

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .sd_sets()
                    .add_member(SdKind::Static, "", "S", &role(i))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let set = engine.sd_sets().read_set(SdKind::Static, "", "S").await.unwrap();
    assert_eq!(set.members.len(), 66);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_member_churn_is_serialized() {
    let engine = engine();
    let initial: Vec<String> = (0..32).map(role).collect();
    engine
        .sd_sets()
        .create_set(SdSet::new("S", SdKind::Dynamic, &initial, 2))
        .await
        .unwrap();

    // Half the tasks remove an original member, half add a new one
    let handles: Vec<_> = (0..64)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let admin = engine.sd_sets();
                if i < 32 {
                    admin.delete_member(SdKind::Dynamic, "", "S", &role(i)).await
                } else {
                    admin.add_member(SdKind::Dynamic, "", "S", &role(i)).await
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let set = engine.sd_sets().read_set(SdKind::Dynamic, "", "S").await.unwrap();
    let expected: BTreeSet<String> = (32..64).map(role).collect();
    assert_eq!(set.members, expected);
}
