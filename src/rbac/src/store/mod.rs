//! Directory (persistence) contracts consumed by the engine
//!
//! The engine never talks to a backing store directly. It reads and writes
//! hierarchy records and searches SD sets through these traits. Any backend
//! (LDAP, SQL, in-memory) can sit behind them.

use crate::error::Result;
use crate::sod::{SdKind, SdSet};
use crate::types::{Hierarchy, HierarchyOp, HierarchyType, Relationship};
use async_trait::async_trait;

pub mod memory;

pub use memory::InMemoryDirectory;

/// Hierarchy record storage
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    /// Read the edge list for (type, tenant).
    ///
    /// Returns `RbacError::HierarchyNotFound` if no record exists yet.
    async fn read_hierarchy(&self, hierarchy: HierarchyType, tenant: &str) -> Result<Hierarchy>;

    /// Apply a single-edge delta, creating the record on first add
    async fn write_hierarchy(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        relationship: &Relationship,
        op: HierarchyOp,
    ) -> Result<()>;
}

/// SD set storage
#[async_trait]
pub trait SdSetRepository: Send + Sync {
    /// Sets of `kind` that list `role` as a direct member
    async fn search_sets_containing(
        &self,
        kind: SdKind,
        tenant: &str,
        role: &str,
    ) -> Result<Vec<SdSet>>;

    /// Sets of `kind` whose name matches a wildcard pattern (`*` matches anything)
    async fn search_sets(&self, kind: SdKind, tenant: &str, pattern: &str) -> Result<Vec<SdSet>>;

    /// Read one set by name
    async fn read_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<SdSet>;

    /// Store a new set; fails with `SdSetExists` on duplicates
    async fn create_set(&self, set: &SdSet) -> Result<()>;

    /// Replace an existing set
    async fn update_set(&self, set: &SdSet) -> Result<()>;

    /// Delete a set
    async fn delete_set(&self, kind: SdKind, tenant: &str, name: &str) -> Result<()>;
}

/// Both halves of the directory contract
pub trait Directory: HierarchyRepository + SdSetRepository {}

impl<T: HierarchyRepository + SdSetRepository> Directory for T {}

/// Case-insensitive wildcard match (`*` matches any run of characters)
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if pattern.contains('*') {
        let regex_pattern = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        if let Ok(regex) = regex::Regex::new(&format!("(?i)^{}$", regex_pattern)) {
            return regex.is_match(value);
        }
    }

    pattern.eq_ignore_ascii_case(value)
}
