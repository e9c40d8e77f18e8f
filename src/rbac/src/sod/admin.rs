//! SD set administration
//!
//! Every membership change invalidates the constraint cache entries of the
//! roles it touches; the next validation repopulates them.
//!
//! Edits are read-modify-write against the directory, so writers on the same
//! (kind, tenant, set) are serialized by a per-set async mutex.

use super::cache::ConstraintSetStore;
use super::types::{SdKind, SdSet};
use crate::error::{RbacError, Result};
use crate::store::SdSetRepository;
use crate::types::{normalize, TenantId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

type SetKey = (SdKind, TenantId, String);

/// Create, edit and delete SSD/DSD sets
#[derive(Clone)]
pub struct SdSetAdmin {
    repository: Arc<dyn SdSetRepository>,
    constraints: Arc<ConstraintSetStore>,
    /// Placeholder member kept in sets whose last real member was removed
    sentinel: String,
    /// One writer lock per set, shared by clones
    writers: Arc<DashMap<SetKey, Arc<Mutex<()>>>>,
}

impl SdSetAdmin {
    pub fn new(
        repository: Arc<dyn SdSetRepository>,
        constraints: Arc<ConstraintSetStore>,
        sentinel: impl AsRef<str>,
    ) -> Self {
        Self {
            repository,
            constraints,
            sentinel: normalize(sentinel.as_ref()),
            writers: Arc::new(DashMap::new()),
        }
    }

    /// Placeholder member name
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Create a set after validating its name and cardinality
    pub async fn create_set(&self, set: SdSet) -> Result<SdSet> {
        set.validate(&self.sentinel)?;
        let writer = self.writer(set.kind, &set.tenant, &set.name);
        let _guard = writer.lock().await;

        self.repository.create_set(&set).await?;
        self.invalidate_members(&set);

        info!(
            "Created {} set {} ({} members, cardinality {})",
            set.kind,
            set.name,
            set.members.len(),
            set.cardinality
        );
        Ok(set)
    }

    /// Replace members, cardinality and description of an existing set
    pub async fn update_set(&self, set: SdSet) -> Result<SdSet> {
        set.validate(&self.sentinel)?;
        let writer = self.writer(set.kind, &set.tenant, &set.name);
        let _guard = writer.lock().await;

        let previous = self.repository.read_set(set.kind, &set.tenant, &set.name).await?;
        self.repository.update_set(&set).await?;

        self.invalidate_members(&previous);
        self.invalidate_members(&set);

        info!("Updated {} set {}", set.kind, set.name);
        Ok(set)
    }

    /// Delete a set
    pub async fn delete_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<()> {
        let writer = self.writer(kind, tenant, name);
        let _guard = writer.lock().await;

        let previous = self.repository.read_set(kind, tenant, name).await?;
        self.repository.delete_set(kind, tenant, name).await?;
        self.invalidate_members(&previous);

        info!("Deleted {} set {}", kind, previous.name);
        Ok(())
    }

    pub async fn read_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<SdSet> {
        self.repository.read_set(kind, tenant, name).await
    }

    /// Sets whose name matches a wildcard pattern
    pub async fn search_sets(
        &self,
        kind: SdKind,
        tenant: &str,
        pattern: &str,
    ) -> Result<Vec<SdSet>> {
        self.repository.search_sets(kind, tenant, pattern).await
    }

    /// Sets that list `role` as a member, read through the cache
    pub async fn role_sets(&self, kind: SdKind, tenant: &str, role: &str) -> Result<Vec<SdSet>> {
        Ok(self
            .constraints
            .sets_containing(tenant, role, kind)
            .await?
            .to_vec())
    }

    /// Add a role to a set; replaces the placeholder if present
    pub async fn add_member(
        &self,
        kind: SdKind,
        tenant: &str,
        name: &str,
        role: &str,
    ) -> Result<SdSet> {
        let role = normalize(role);
        if role.is_empty() || role == self.sentinel {
            return Err(RbacError::InvalidInput(format!("invalid member '{}'", role)));
        }

        let writer = self.writer(kind, tenant, name);
        let _guard = writer.lock().await;

        let mut set = self.repository.read_set(kind, tenant, name).await?;
        if !set.add_member(&role, &self.sentinel) {
            return Err(RbacError::InvalidInput(format!(
                "role {} is already a member of {} set {}",
                role, kind, set.name
            )));
        }

        self.repository.update_set(&set).await?;
        self.invalidate_members(&set);

        info!("Added {} to {} set {}", role, kind, set.name);
        Ok(set)
    }

    /// Remove a role from a set.
    ///
    /// A set left without members keeps exactly one placeholder member.
    /// Cardinality is not re-validated here.
    pub async fn delete_member(
        &self,
        kind: SdKind,
        tenant: &str,
        name: &str,
        role: &str,
    ) -> Result<SdSet> {
        let role = normalize(role);
        let writer = self.writer(kind, tenant, name);
        let _guard = writer.lock().await;

        let mut set = self.repository.read_set(kind, tenant, name).await?;

        if !set.remove_member(&role, &self.sentinel) {
            return Err(RbacError::InvalidInput(format!(
                "role {} is not a member of {} set {}",
                role, kind, set.name
            )));
        }

        self.repository.update_set(&set).await?;
        self.constraints.invalidate(tenant, &role, kind);
        self.invalidate_members(&set);

        info!("Removed {} from {} set {}", role, kind, set.name);
        Ok(set)
    }

    /// Change a set's cardinality
    pub async fn set_cardinality(
        &self,
        kind: SdKind,
        tenant: &str,
        name: &str,
        cardinality: usize,
    ) -> Result<SdSet> {
        let writer = self.writer(kind, tenant, name);
        let _guard = writer.lock().await;

        let mut set = self.repository.read_set(kind, tenant, name).await?;
        set.cardinality = cardinality;
        set.validate(&self.sentinel)?;

        self.repository.update_set(&set).await?;
        self.invalidate_members(&set);
        Ok(set)
    }

    /// Cached lookups of every member embed the set, so all of them go stale
    fn invalidate_members(&self, set: &SdSet) {
        for member in &set.members {
            self.constraints.invalidate(&set.tenant, member, set.kind);
        }
    }

    fn writer(&self, kind: SdKind, tenant: &str, name: &str) -> Arc<Mutex<()>> {
        let entry = self
            .writers
            .entry((kind, tenant.to_string(), normalize(name)))
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }
}
