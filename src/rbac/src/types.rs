//! Core hierarchy types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant identifier. The empty string is the default tenant.
pub type TenantId = String;

/// Canonical form of a role or OU name: trimmed, upper-case.
///
/// Every graph and set membership operation runs on canonical names, so
/// callers may pass any case.
pub fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Kind of hierarchy kept per tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyType {
    /// RBAC role inheritance
    Role,
    /// ARBAC admin-role inheritance
    AdminRole,
    /// User organizational units
    UserOu,
    /// Permission organizational units
    PermOu,
}

impl HierarchyType {
    /// All hierarchy types
    pub const ALL: [HierarchyType; 4] = [
        HierarchyType::Role,
        HierarchyType::AdminRole,
        HierarchyType::UserOu,
        HierarchyType::PermOu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyType::Role => "ROLE",
            HierarchyType::AdminRole => "ADMIN_ROLE",
            HierarchyType::UserOu => "USER_OU",
            HierarchyType::PermOu => "PERM_OU",
        }
    }
}

impl fmt::Display for HierarchyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache and storage key: one hierarchy per (type, tenant)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyKey {
    pub hierarchy: HierarchyType,
    /// Used verbatim; `""` is its own key
    pub tenant: TenantId,
}

impl HierarchyKey {
    pub fn new(hierarchy: HierarchyType, tenant: impl Into<TenantId>) -> Self {
        Self {
            hierarchy,
            tenant: tenant.into(),
        }
    }
}

impl fmt::Display for HierarchyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tenant.is_empty() {
            write!(f, "{}@<default>", self.hierarchy)
        } else {
            write!(f, "{}@{}", self.hierarchy, self.tenant)
        }
    }
}

/// A single edge: `child` inherits from `parent`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub child: String,
    pub parent: String,
}

impl Relationship {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    /// Copy with both endpoints in canonical case
    pub fn normalized(&self) -> Self {
        Self {
            child: normalize(&self.child),
            parent: normalize(&self.parent),
        }
    }

    /// Case-insensitive edge equality
    pub fn same_edge(&self, other: &Relationship) -> bool {
        normalize(&self.child) == normalize(&other.child)
            && normalize(&self.parent) == normalize(&other.parent)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.child, self.parent)
    }
}

/// Persisted hierarchy record: the complete edge list for one key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Hierarchy {
    pub fn new(relationships: Vec<Relationship>) -> Self {
        Self { relationships }
    }

    pub fn contains(&self, relationship: &Relationship) -> bool {
        self.relationships.iter().any(|r| r.same_edge(relationship))
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// Mutation applied to a persisted hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HierarchyOp {
    Add,
    Remove,
    /// Not supported for edges; always rejected
    Modify,
}

impl fmt::Display for HierarchyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyOp::Add => f.write_str("ADD"),
            HierarchyOp::Remove => f.write_str("REMOVE"),
            HierarchyOp::Modify => f.write_str("MODIFY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Manager"), "MANAGER");
        assert_eq!(normalize("  teller "), "TELLER");
    }

    #[test]
    fn test_tenant_keys_are_distinct() {
        let default = HierarchyKey::new(HierarchyType::Role, "");
        let named = HierarchyKey::new(HierarchyType::Role, "t1");
        let other_type = HierarchyKey::new(HierarchyType::AdminRole, "t1");

        assert_ne!(default, named);
        assert_ne!(named, other_type);
        assert_eq!(default.to_string(), "ROLE@<default>");
    }

    #[test]
    fn test_relationship_same_edge_ignores_case() {
        let a = Relationship::new("Teller", "Supervisor");
        let b = Relationship::new("TELLER", "supervisor");
        assert!(a.same_edge(&b));
        assert!(!a.same_edge(&Relationship::new("Supervisor", "Teller")));
    }

    #[test]
    fn test_hierarchy_type_serde() {
        let json = serde_json::to_string(&HierarchyType::AdminRole).unwrap();
        assert_eq!(json, "\"ADMIN_ROLE\"");
    }
}
