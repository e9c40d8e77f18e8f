//! Separation-of-duty set definitions

use crate::error::{RbacError, Result};
use crate::types::{normalize, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Smallest cardinality a set may carry
pub const MIN_CARDINALITY: usize = 2;

/// SSD or DSD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SdKind {
    /// Enforced at assignment time
    Static,
    /// Enforced at activation time
    Dynamic,
}

impl fmt::Display for SdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdKind::Static => f.write_str("SSD"),
            SdKind::Dynamic => f.write_str("DSD"),
        }
    }
}

/// Named constraint set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdSet {
    /// Set name
    pub name: String,

    /// SSD or DSD
    #[serde(rename = "type")]
    pub kind: SdKind,

    /// Owning tenant
    #[serde(default)]
    pub tenant: TenantId,

    /// Member roles, canonical case
    pub members: BTreeSet<String>,

    /// Smallest number of members one user may not jointly hold
    pub cardinality: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SdSet {
    /// Create a set in the default tenant
    pub fn new<I, S>(name: impl Into<String>, kind: SdKind, members: I, cardinality: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            kind,
            tenant: TenantId::new(),
            members: members
                .into_iter()
                .map(|m| normalize(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
            cardinality,
            description: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name in canonical case, used as the storage key
    pub fn key(&self) -> String {
        normalize(&self.name)
    }

    /// Case-insensitive membership test
    pub fn contains(&self, role: &str) -> bool {
        self.members.contains(&normalize(role))
    }

    /// Check name, members and `2 <= cardinality <= |members|`.
    ///
    /// The placeholder is only ever written by member removal, so a caller
    /// supplying it as a member is rejected.
    pub fn validate(&self, sentinel: &str) -> Result<()> {
        if self.key().is_empty() {
            return Err(RbacError::InvalidInput("SD set name cannot be empty".to_string()));
        }

        if self.contains(sentinel) {
            return Err(RbacError::InvalidInput(format!(
                "'{}' is reserved and cannot be a member of {}",
                normalize(sentinel),
                self.name
            )));
        }

        if self.cardinality < MIN_CARDINALITY || self.cardinality > self.members.len() {
            return Err(RbacError::InvalidCardinality {
                set: self.name.clone(),
                cardinality: self.cardinality,
                members: self.members.len(),
            });
        }

        Ok(())
    }

    /// Insert a member, dropping the placeholder if present.
    ///
    /// Returns false if the role was already a member.
    pub fn add_member(&mut self, role: &str, sentinel: &str) -> bool {
        self.members.remove(&normalize(sentinel));
        self.members.insert(normalize(role))
    }

    /// Remove a member. An emptied set gets the placeholder as its only member.
    ///
    /// Returns false if the role was not a member.
    pub fn remove_member(&mut self, role: &str, sentinel: &str) -> bool {
        let removed = self.members.remove(&normalize(role));
        if self.members.is_empty() {
            self.members.insert(normalize(sentinel));
        }
        removed
    }

    /// Members other than the placeholder
    pub fn real_members<'a>(&'a self, sentinel: &str) -> impl Iterator<Item = &'a String> + 'a {
        let sentinel = normalize(sentinel);
        self.members.iter().filter(move |m| **m != sentinel)
    }
}
