//! # CretoAI RBAC Engine
//!
//! Role hierarchy graphs and separation-of-duty constraints for RBAC/ARBAC.
//!
//! ## Features
//!
//! - **Four hierarchies per tenant**: role, admin role, user OU and permission OU
//! - **Lock-free reads**: graphs are immutable snapshots published behind `Arc`
//! - **Serialized writers** per (hierarchy, tenant), no contention across tenants
//! - **SSD** enforcement at assignment time (hard failure)
//! - **DSD** enforcement at activation time (roles dropped, session still created)
//! - **Pluggable directory** behind async traits, with an in-memory backend
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{EngineConfig, RbacEngine, HierarchyType, SdKind, SdSet, User, UserRole};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = RbacEngine::in_memory(EngineConfig::default())?;
//!
//!     engine.hierarchy().add_edge(HierarchyType::Role, "", "Teller", "Supervisor").await?;
//!     let banking = SdSet::new("Banking", SdKind::Static, ["Teller", "Auditor"], 2);
//!     engine.sd_sets().create_set(banking).await?;
//!
//!     let mut alice = User::new("alice");
//!     engine.assign_user(&mut alice, UserRole::new("Teller")).await?;
//!
//!     // Teller and Auditor may not be held together
//!     assert!(engine.assign_user(&mut alice, UserRole::new("Auditor")).await.is_err());
//!
//!     let roles = engine.authorized_roles(&alice).await?;
//!     assert!(roles.contains("SUPERVISOR"));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod session;
pub mod sod;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{RbacEngine, SessionActivation};
pub use error::{RbacError, Result};
pub use hierarchy::{GraphStore, HierarchyCoordinator, RoleGraph};
pub use session::{Session, TemporalConstraint, User, UserRole};
pub use sod::{ConstraintSetStore, DsdOutcome, SdKind, SdSet, SdSetAdmin, SodValidator};
pub use store::{HierarchyRepository, InMemoryDirectory, SdSetRepository};
pub use types::{normalize, Hierarchy, HierarchyKey, HierarchyOp, HierarchyType, Relationship};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
