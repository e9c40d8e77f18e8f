//! Per-(type, tenant) graph cache with serialized writers
//!
//! Readers get an `Arc<RoleGraph>` snapshot and never block each other.
//! Writers apply a single-edge delta to the directory, rebuild the whole
//! graph from the refreshed record, and publish it with one map insert.
//! A graph that a reader is traversing is never mutated.
//!
//! Writers for the same key are serialized by a per-key async mutex.
//! Different tenants and hierarchy types never contend.

use super::graph::RoleGraph;
use crate::error::{RbacError, Result};
use crate::store::HierarchyRepository;
use crate::types::{HierarchyKey, HierarchyOp, HierarchyType, Relationship};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Graph cache statistics
#[derive(Debug, Clone, Default)]
pub struct GraphCacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that loaded from the directory
    pub misses: u64,
    /// Forced rebuilds after mutation
    pub reloads: u64,
    /// Cached graphs
    pub entries: usize,
}

impl GraphCacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Owner of every cached hierarchy graph
pub struct GraphStore {
    /// Directory backend
    repository: Arc<dyn HierarchyRepository>,

    /// Published graphs
    graphs: DashMap<HierarchyKey, Arc<RoleGraph>>,

    /// One writer lock per key
    writers: DashMap<HierarchyKey, Arc<Mutex<()>>>,

    hits: AtomicU64,
    misses: AtomicU64,
    reloads: AtomicU64,
}

impl GraphStore {
    /// Create a store over a directory backend
    pub fn new(repository: Arc<dyn HierarchyRepository>) -> Self {
        Self {
            repository,
            graphs: DashMap::new(),
            writers: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
        }
    }

    /// Current graph for (type, tenant), loading it on a miss.
    ///
    /// Never fails for an absent record: an unknown hierarchy is an empty graph.
    pub async fn get_graph(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
    ) -> Result<Arc<RoleGraph>> {
        let key = HierarchyKey::new(hierarchy, tenant);

        if let Some(graph) = self.graphs.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(graph.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Graph cache miss for {}", key);

        let graph = Arc::new(self.load(&key).await?);

        // A writer may have published while we were loading; theirs wins.
        let published = self.graphs.entry(key).or_insert(graph);
        Ok(Arc::clone(published.value()))
    }

    /// Rebuild (type, tenant) from the directory and replace the cache entry
    pub async fn reload(&self, hierarchy: HierarchyType, tenant: &str) -> Result<Arc<RoleGraph>> {
        let key = HierarchyKey::new(hierarchy, tenant);
        self.reload_key(&key).await
    }

    /// Apply a single-edge delta and rebuild the graph
    pub async fn update_hierarchy(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        relationship: &Relationship,
        op: HierarchyOp,
    ) -> Result<Arc<RoleGraph>> {
        self.update_hierarchy_checked(hierarchy, tenant, relationship, op, |_| Ok(()))
            .await
    }

    /// Apply a single-edge delta after `check` passes against the current graph.
    ///
    /// `check` runs under the key's writer lock, so no other writer can change
    /// the hierarchy between validation and mutation. On any failure the cached
    /// graph is left as it was.
    pub async fn update_hierarchy_checked<F>(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        relationship: &Relationship,
        op: HierarchyOp,
        check: F,
    ) -> Result<Arc<RoleGraph>>
    where
        F: FnOnce(&RoleGraph) -> Result<()> + Send,
    {
        let key = HierarchyKey::new(hierarchy, tenant);

        if !matches!(op, HierarchyOp::Add | HierarchyOp::Remove) {
            return Err(RbacError::CannotPerform(format!(
                "{} on hierarchy {} edge {}",
                op, key, relationship
            )));
        }

        let writer = self.writer(&key);
        let _guard = writer.lock().await;

        let current = self.get_graph(hierarchy, tenant).await?;
        check(&current)?;

        let edge = relationship.normalized();
        self.repository
            .write_hierarchy(hierarchy, tenant, &edge, op)
            .await
            .map_err(|e| {
                warn!("Hierarchy write {} {} on {} failed: {}", op, edge, key, e);
                if e.is_validation() {
                    e
                } else {
                    RbacError::HierarchyUpdate(format!("{} {} on {}: {}", op, edge, key, e))
                }
            })?;

        info!("Hierarchy {} updated: {} {}", key, op, edge);

        self.reload_key(&key).await
    }

    /// Drop a cached graph; the next read reloads it
    pub fn evict(&self, hierarchy: HierarchyType, tenant: &str) {
        self.graphs.remove(&HierarchyKey::new(hierarchy, tenant));
    }

    /// Drop every cached graph
    pub fn clear(&self) {
        self.graphs.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> GraphCacheStats {
        GraphCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            entries: self.graphs.len(),
        }
    }

    async fn reload_key(&self, key: &HierarchyKey) -> Result<Arc<RoleGraph>> {
        self.reloads.fetch_add(1, Ordering::Relaxed);

        match self.load(key).await {
            Ok(graph) => {
                let graph = Arc::new(graph);
                self.graphs.insert(key.clone(), Arc::clone(&graph));
                debug!(
                    "Published graph {} ({} nodes, {} edges)",
                    key,
                    graph.node_count(),
                    graph.edge_count()
                );
                Ok(graph)
            }
            Err(e) => {
                // The cached copy may predate a committed write.
                self.graphs.remove(key);
                Err(e)
            }
        }
    }

    async fn load(&self, key: &HierarchyKey) -> Result<RoleGraph> {
        match self.repository.read_hierarchy(key.hierarchy, &key.tenant).await {
            Ok(hierarchy) => Ok(RoleGraph::from_hierarchy(&hierarchy)),
            Err(RbacError::HierarchyNotFound(_)) => {
                debug!("No hierarchy record for {}, using empty graph", key);
                Ok(RoleGraph::new())
            }
            Err(e) => {
                warn!("Failed to read hierarchy {}: {}", key, e);
                Err(e)
            }
        }
    }

    fn writer(&self, key: &HierarchyKey) -> Arc<Mutex<()>> {
        let entry = self
            .writers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDirectory;

    fn store_with(dir: Arc<InMemoryDirectory>) -> GraphStore {
        GraphStore::new(dir)
    }

    #[tokio::test]
    async fn test_empty_hierarchy_yields_empty_graph() {
        let store = store_with(Arc::new(InMemoryDirectory::new()));
        let graph = store.get_graph(HierarchyType::Role, "t1").await.unwrap();
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_graph_is_cached() {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.seed_hierarchy(HierarchyType::Role, "t1", vec![Relationship::new("a", "b")])
            .await;
        let store = store_with(Arc::clone(&dir));

        let first = store.get_graph(HierarchyType::Role, "t1").await.unwrap();
        let second = store.get_graph(HierarchyType::Role, "t1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dir.hierarchy_reads(), 1);
        assert_eq!(store.stats().hits, 1);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_update_publishes_new_graph() {
        let dir = Arc::new(InMemoryDirectory::new());
        let store = store_with(Arc::clone(&dir));

        let before = store.get_graph(HierarchyType::Role, "").await.unwrap();
        let after = store
            .update_hierarchy(
                HierarchyType::Role,
                "",
                &Relationship::new("Teller", "Supervisor"),
                HierarchyOp::Add,
            )
            .await
            .unwrap();

        // The old snapshot is unchanged
        assert!(before.is_empty());
        assert!(after.has_edge("teller", "supervisor"));

        let cached = store.get_graph(HierarchyType::Role, "").await.unwrap();
        assert!(Arc::ptr_eq(&after, &cached));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.seed_hierarchy(HierarchyType::Role, "", vec![Relationship::new("a", "b")])
            .await;
        let store = store_with(Arc::clone(&dir));
        let before = store.get_graph(HierarchyType::Role, "").await.unwrap();

        dir.set_fail_writes(true);
        let result = store
            .update_hierarchy(
                HierarchyType::Role,
                "",
                &Relationship::new("b", "c"),
                HierarchyOp::Add,
            )
            .await;

        assert!(matches!(result, Err(RbacError::HierarchyUpdate(_))));
        let after = store.get_graph(HierarchyType::Role, "").await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_modify_is_rejected() {
        let store = store_with(Arc::new(InMemoryDirectory::new()));
        let result = store
            .update_hierarchy(
                HierarchyType::Role,
                "",
                &Relationship::new("a", "b"),
                HierarchyOp::Modify,
            )
            .await;
        assert!(matches!(result, Err(RbacError::CannotPerform(_))));
    }

    #[tokio::test]
    async fn test_check_failure_skips_write() {
        let dir = Arc::new(InMemoryDirectory::new());
        let store = store_with(Arc::clone(&dir));

        let result = store
            .update_hierarchy_checked(
                HierarchyType::Role,
                "",
                &Relationship::new("a", "b"),
                HierarchyOp::Add,
                |_| Err(RbacError::InvalidInput("rejected".into())),
            )
            .await;

        assert!(result.is_err());
        assert!(dir.read_hierarchy(HierarchyType::Role, "").await.is_err());
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.set_fail_reads(true);
        let store = store_with(dir);

        let result = store.get_graph(HierarchyType::PermOu, "").await;
        assert!(matches!(result, Err(RbacError::Unavailable(_))));
        assert_eq!(store.stats().entries, 0);
    }
}
