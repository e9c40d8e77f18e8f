//! Error types for the RBAC engine

use thiserror::Error;

/// Status code reported when DSD validation drops roles from a session
pub const DSD_VALIDATION_FAILED: i32 = 5090;

/// Status code for a rejected SSD assignment
pub const SSD_VALIDATION_FAILED: i32 = 5091;

/// RBAC engine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RbacError {
    /// A relationship from a node to itself
    #[error("Invalid relationship: '{0}' cannot inherit from itself")]
    SelfRelationship(String),

    /// The direct edge was required but is absent
    #[error("Relationship '{child}' -> '{parent}' does not exist")]
    RelationshipMissing { child: String, parent: String },

    /// The direct edge was required to be absent but exists
    #[error("Relationship '{child}' -> '{parent}' already exists")]
    RelationshipExists { child: String, parent: String },

    /// Adding the edge would let a node inherit from itself
    #[error("Relationship '{child}' -> '{parent}' would create a cycle")]
    CycleDetected { child: String, parent: String },

    /// Node still has children and cannot be removed
    #[error("Node '{node}' has {children} child(ren) and cannot be removed")]
    HasChildren { node: String, children: usize },

    /// SDSet cardinality out of range
    #[error("Invalid cardinality {cardinality} for set '{set}' with {members} member(s)")]
    InvalidCardinality {
        set: String,
        cardinality: usize,
        members: usize,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Static separation-of-duty violation
    #[error("SSD violation: role '{role}' conflicts with set '{set}' (cardinality {cardinality})")]
    SsdViolation {
        set: String,
        role: String,
        cardinality: usize,
    },

    /// Dynamic separation-of-duty violation
    #[error("DSD violation: role '{role}' conflicts with set '{set}' (cardinality {cardinality})")]
    DsdViolation {
        set: String,
        role: String,
        cardinality: usize,
    },

    /// Hierarchy record not found in the directory
    #[error("Hierarchy not found: {0}")]
    HierarchyNotFound(String),

    /// SDSet not found
    #[error("SD set not found: {0}")]
    SdSetNotFound(String),

    /// SDSet already exists
    #[error("SD set already exists: {0}")]
    SdSetExists(String),

    /// Writing a hierarchy delta failed
    #[error("Hierarchy update failed: {0}")]
    HierarchyUpdate(String),

    /// Persistence layer read/write failure
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// Unsupported operation
    #[error("Cannot perform operation: {0}")]
    CannotPerform(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RbacError {
    /// Caller-correctable validation failures
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RbacError::SelfRelationship(_)
                | RbacError::RelationshipMissing { .. }
                | RbacError::RelationshipExists { .. }
                | RbacError::CycleDetected { .. }
                | RbacError::HasChildren { .. }
                | RbacError::InvalidCardinality { .. }
                | RbacError::InvalidInput(_)
        )
    }

    /// SSD or DSD rejection
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            RbacError::SsdViolation { .. } | RbacError::DsdViolation { .. }
        )
    }

    /// Persistence or system failure; never retried by the engine
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RbacError::Unavailable(_) | RbacError::HierarchyUpdate(_)
        )
    }

    /// Numeric status code, where one is defined
    pub fn status_code(&self) -> Option<i32> {
        match self {
            RbacError::SsdViolation { .. } => Some(SSD_VALIDATION_FAILED),
            RbacError::DsdViolation { .. } => Some(DSD_VALIDATION_FAILED),
            _ => None,
        }
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;
