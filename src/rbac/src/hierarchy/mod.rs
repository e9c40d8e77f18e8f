//! Role and OU hierarchies
//!
//! Provides the adjacency-list graph with its traversal queries, the
//! per-tenant graph cache, and the coordinator administrative callers use.
//!
//! # Features
//!
//! - **Four hierarchies per tenant**: ROLE, ADMIN_ROLE, USER_OU, PERM_OU
//! - **Case-insensitive names**: everything is stored upper-case
//! - **Copy-then-publish**: graphs are rebuilt off to the side and swapped in
//! - **Acyclic by construction**: every insert is validated first
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::hierarchy::{GraphStore, HierarchyCoordinator};
//! use cretoai_rbac::sod::ConstraintSetStore;
//! use cretoai_rbac::store::InMemoryDirectory;
//! use cretoai_rbac::types::HierarchyType;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = Arc::new(InMemoryDirectory::new());
//! let coordinator = HierarchyCoordinator::new(
//!     Arc::new(GraphStore::new(dir.clone())),
//!     Arc::new(ConstraintSetStore::new(dir)),
//! );
//!
//! coordinator.add_edge(HierarchyType::Role, "t1", "Teller", "Supervisor").await?;
//! coordinator.add_edge(HierarchyType::Role, "t1", "Supervisor", "Manager").await?;
//!
//! let ascendants = coordinator.ascendants(HierarchyType::Role, "t1", "teller").await?;
//! assert!(ascendants.contains("MANAGER"));
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod graph;
pub mod store;


pub use coordinator::HierarchyCoordinator;
pub use graph::RoleGraph;
pub use store::{GraphCacheStats, GraphStore};
