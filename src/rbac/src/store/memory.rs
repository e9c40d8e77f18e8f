//! In-memory directory
//!
//! Reference backend for tests, benchmarks and embedded use. Supports
//! failure injection so callers can exercise the engine's error paths.

use super::{matches_pattern, HierarchyRepository, SdSetRepository};
use crate::error::{RbacError, Result};
use crate::sod::{SdKind, SdSet};
use crate::types::{normalize, Hierarchy, HierarchyKey, HierarchyOp, HierarchyType, Relationship};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type SetKey = (SdKind, String, String);

/// In-memory hierarchy and SD set store
pub struct InMemoryDirectory {
    hierarchies: Arc<RwLock<HashMap<HierarchyKey, Hierarchy>>>,
    sets: Arc<RwLock<HashMap<SetKey, SdSet>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    hierarchy_reads: AtomicUsize,
    set_searches: AtomicUsize,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            hierarchies: Arc::new(RwLock::new(HashMap::new())),
            sets: Arc::new(RwLock::new(HashMap::new())),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            hierarchy_reads: AtomicUsize::new(0),
            set_searches: AtomicUsize::new(0),
        }
    }

    /// Seed a complete hierarchy record, replacing any existing one
    pub async fn seed_hierarchy(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        relationships: Vec<Relationship>,
    ) {
        let normalized = relationships.iter().map(Relationship::normalized).collect();
        self.hierarchies
            .write()
            .await
            .insert(HierarchyKey::new(hierarchy, tenant), Hierarchy::new(normalized));
    }

    /// Make every subsequent read fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of hierarchy reads served
    pub fn hierarchy_reads(&self) -> usize {
        self.hierarchy_reads.load(Ordering::SeqCst)
    }

    /// Number of containing-role set searches served
    pub fn set_searches(&self) -> usize {
        self.set_searches.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RbacError::Unavailable("directory read failed".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RbacError::Unavailable("directory write failed".to_string()));
        }
        Ok(())
    }

    fn set_key(kind: SdKind, tenant: &str, name: &str) -> SetKey {
        (kind, tenant.to_string(), normalize(name))
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HierarchyRepository for InMemoryDirectory {
    async fn read_hierarchy(&self, hierarchy: HierarchyType, tenant: &str) -> Result<Hierarchy> {
        self.check_read()?;
        self.hierarchy_reads.fetch_add(1, Ordering::SeqCst);

        let key = HierarchyKey::new(hierarchy, tenant);
        let hierarchies = self.hierarchies.read().await;
        hierarchies
            .get(&key)
            .cloned()
            .ok_or_else(|| RbacError::HierarchyNotFound(key.to_string()))
    }

    async fn write_hierarchy(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        relationship: &Relationship,
        op: HierarchyOp,
    ) -> Result<()> {
        self.check_write()?;

        let key = HierarchyKey::new(hierarchy, tenant);
        let edge = relationship.normalized();
        let mut hierarchies = self.hierarchies.write().await;

        match op {
            HierarchyOp::Add => {
                let record = hierarchies.entry(key).or_default();
                if record.contains(&edge) {
                    return Err(RbacError::RelationshipExists {
                        child: edge.child,
                        parent: edge.parent,
                    });
                }
                record.relationships.push(edge);
                Ok(())
            }
            HierarchyOp::Remove => {
                let record = hierarchies
                    .get_mut(&key)
                    .ok_or_else(|| RbacError::HierarchyNotFound(key.to_string()))?;
                let before = record.relationships.len();
                record.relationships.retain(|r| !r.same_edge(&edge));
                if record.relationships.len() == before {
                    return Err(RbacError::RelationshipMissing {
                        child: edge.child,
                        parent: edge.parent,
                    });
                }
                Ok(())
            }
            HierarchyOp::Modify => Err(RbacError::CannotPerform(format!(
                "{} on hierarchy edge {}",
                op, edge
            ))),
        }
    }
}

#[async_trait]
impl SdSetRepository for InMemoryDirectory {
    async fn search_sets_containing(
        &self,
        kind: SdKind,
        tenant: &str,
        role: &str,
    ) -> Result<Vec<SdSet>> {
        self.check_read()?;
        self.set_searches.fetch_add(1, Ordering::SeqCst);

        let role = normalize(role);
        let sets = self.sets.read().await;
        let mut found: Vec<SdSet> = sets
            .iter()
            .filter(|((k, t, _), set)| *k == kind && t == tenant && set.members.contains(&role))
            .map(|(_, set)| set.clone())
            .collect();
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(found)
    }

    async fn search_sets(&self, kind: SdKind, tenant: &str, pattern: &str) -> Result<Vec<SdSet>> {
        self.check_read()?;

        let sets = self.sets.read().await;
        let mut found: Vec<SdSet> = sets
            .iter()
            .filter(|((k, t, _), set)| {
                *k == kind && t == tenant && matches_pattern(pattern, &set.name)
            })
            .map(|(_, set)| set.clone())
            .collect();
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(found)
    }

    async fn read_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<SdSet> {
        self.check_read()?;

        let sets = self.sets.read().await;
        sets.get(&Self::set_key(kind, tenant, name))
            .cloned()
            .ok_or_else(|| RbacError::SdSetNotFound(format!("{} {}", kind, name)))
    }

    async fn create_set(&self, set: &SdSet) -> Result<()> {
        self.check_write()?;

        let key = Self::set_key(set.kind, &set.tenant, &set.name);
        let mut sets = self.sets.write().await;
        if sets.contains_key(&key) {
            return Err(RbacError::SdSetExists(format!("{} {}", set.kind, set.name)));
        }
        sets.insert(key, set.clone());
        Ok(())
    }

    async fn update_set(&self, set: &SdSet) -> Result<()> {
        self.check_write()?;

        let key = Self::set_key(set.kind, &set.tenant, &set.name);
        let mut sets = self.sets.write().await;
        match sets.get_mut(&key) {
            Some(existing) => {
                *existing = set.clone();
                Ok(())
            }
            None => Err(RbacError::SdSetNotFound(format!("{} {}", set.kind, set.name))),
        }
    }

    async fn delete_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<()> {
        self.check_write()?;

        let mut sets = self.sets.write().await;
        sets.remove(&Self::set_key(kind, tenant, name))
            .map(|_| ())
            .ok_or_else(|| RbacError::SdSetNotFound(format!("{} {}", kind, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_hierarchy_is_not_found() {
        let dir = InMemoryDirectory::new();
        let result = dir.read_hierarchy(HierarchyType::Role, "t1").await;
        assert!(matches!(result, Err(RbacError::HierarchyNotFound(_))));
    }

    #[tokio::test]
    async fn test_first_add_creates_record() {
        let dir = InMemoryDirectory::new();
        dir.write_hierarchy(
            HierarchyType::Role,
            "t1",
            &Relationship::new("Teller", "Supervisor"),
            HierarchyOp::Add,
        )
        .await
        .unwrap();

        let record = dir.read_hierarchy(HierarchyType::Role, "t1").await.unwrap();
        assert_eq!(record.relationships, vec![Relationship::new("TELLER", "SUPERVISOR")]);

        // Other tenants are untouched
        assert!(dir.read_hierarchy(HierarchyType::Role, "").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_modify() {
        let dir = InMemoryDirectory::new();
        let rel = Relationship::new("a", "b");
        dir.write_hierarchy(HierarchyType::UserOu, "", &rel, HierarchyOp::Add).await.unwrap();

        let modify = dir
            .write_hierarchy(HierarchyType::UserOu, "", &rel, HierarchyOp::Modify)
            .await;
        assert!(matches!(modify, Err(RbacError::CannotPerform(_))));

        dir.write_hierarchy(HierarchyType::UserOu, "", &rel, HierarchyOp::Remove).await.unwrap();
        let again = dir.write_hierarchy(HierarchyType::UserOu, "", &rel, HierarchyOp::Remove).await;
        assert!(matches!(again, Err(RbacError::RelationshipMissing { .. })));

        let record = dir.read_hierarchy(HierarchyType::UserOu, "").await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_set_search() {
        let dir = InMemoryDirectory::new();
        dir.create_set(&SdSet::new("Banking", SdKind::Static, ["teller", "auditor"], 2))
            .await
            .unwrap();
        dir.create_set(&SdSet::new("Trading", SdKind::Static, ["trader", "auditor"], 2))
            .await
            .unwrap();
        dir.create_set(&SdSet::new("Banking", SdKind::Dynamic, ["teller", "auditor"], 2))
            .await
            .unwrap();

        let containing = dir.search_sets_containing(SdKind::Static, "", "Auditor").await.unwrap();
        assert_eq!(containing.len(), 2);

        let by_name = dir.search_sets(SdKind::Static, "", "bank*").await.unwrap();
        assert_eq!(by_name.len(), 1);

        let duplicate = dir
            .create_set(&SdSet::new("BANKING", SdKind::Static, ["x", "y"], 2))
            .await;
        assert!(matches!(duplicate, Err(RbacError::SdSetExists(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let dir = InMemoryDirectory::new();
        dir.set_fail_writes(true);
        let result = dir
            .write_hierarchy(
                HierarchyType::Role,
                "",
                &Relationship::new("a", "b"),
                HierarchyOp::Add,
            )
            .await;
        assert!(matches!(result, Err(RbacError::Unavailable(_))));

        dir.set_fail_reads(true);
        assert!(dir.read_hierarchy(HierarchyType::Role, "").await.unwrap_err().is_unavailable());
    }
}
