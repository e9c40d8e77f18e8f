//! Static and dynamic separation of duty
//!
//! - `ConstraintSetStore`: role-keyed cache of the sets containing a role
//! - `SodValidator`: SSD assignment checks and DSD activation checks
//! - `SdSetAdmin`: set creation, membership edits and cache invalidation

pub mod admin;
pub mod cache;
pub mod types;
pub mod validator;

pub use admin::SdSetAdmin;
pub use cache::{ConstraintCacheStats, ConstraintSetStore};
pub use types::{SdKind, SdSet, MIN_CARDINALITY};
pub use validator::{DsdDrop, DsdOutcome, SodValidator};
