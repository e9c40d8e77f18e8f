//! Cardinality-based separation-of-duty validation
//!
//! Two enforcement modes share one counting rule: a user may hold at most
//! `cardinality - 1` members of any set.
//!
//! - **SSD** (assignment time) is hard: the assignment is rejected.
//! - **DSD** (activation time) is hard for a single role activation and
//!   soft for session creation, where conflicting roles are dropped from the
//!   session and reported instead of failing the login.

use super::cache::ConstraintSetStore;
use super::types::{SdKind, SdSet};
use crate::error::{RbacError, Result, DSD_VALIDATION_FAILED};
use crate::hierarchy::{GraphStore, RoleGraph};
use crate::session::{Session, User};
use crate::types::{normalize, HierarchyType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A role removed from a session by DSD validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsdDrop {
    pub role: String,
    pub set: String,
    pub cardinality: usize,
}

/// Result of soft DSD validation over a whole session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsdOutcome {
    pub dropped: Vec<DsdDrop>,
}

impl DsdOutcome {
    /// Zero when nothing was dropped, `DSD_VALIDATION_FAILED` otherwise
    pub fn status(&self) -> i32 {
        if self.dropped.is_empty() {
            0
        } else {
            DSD_VALIDATION_FAILED
        }
    }

    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// SSD/DSD validator over the ROLE hierarchy
#[derive(Clone)]
pub struct SodValidator {
    graphs: Arc<GraphStore>,
    constraints: Arc<ConstraintSetStore>,
}

impl SodValidator {
    pub fn new(graphs: Arc<GraphStore>, constraints: Arc<ConstraintSetStore>) -> Self {
        Self { graphs, constraints }
    }

    /// Reject assigning `role` to `user` if it would complete an SSD set.
    ///
    /// For each SSD set containing `role`, counts the user's authorized roles
    /// (assignments plus ascendants) that are members. Reaching
    /// `cardinality - 1` existing matches means the new role would be the one
    /// that tips the set over.
    pub async fn validate_ssd(&self, user: &User, role: &str) -> Result<()> {
        let graph = self.graphs.get_graph(HierarchyType::Role, &user.tenant).await?;
        let authorized = graph.inherited_roles(user.role_names());
        if authorized.is_empty() {
            return Ok(());
        }

        let role = normalize(role);
        let sets = self
            .constraints
            .sets_containing(&user.tenant, &role, SdKind::Static)
            .await?;

        for set in sets.iter() {
            if let Some(matches) = threshold_reached(set, &authorized) {
                warn!(
                    "SSD violation: {} assigning {} holds {} member(s) of {} (cardinality {})",
                    user.user_id, role, matches, set.name, set.cardinality
                );
                return Err(RbacError::SsdViolation {
                    set: set.name.clone(),
                    role,
                    cardinality: set.cardinality,
                });
            }
        }

        Ok(())
    }

    /// Reject activating `role` in `session` if it would complete a DSD set.
    ///
    /// Same counting rule as SSD, over the session's activated roles and
    /// their ascendants.
    pub async fn validate_dsd(&self, session: &Session, role: &str) -> Result<()> {
        if session.roles.is_empty() {
            return Ok(());
        }

        let graph = self.graphs.get_graph(HierarchyType::Role, &session.tenant).await?;
        let activated = graph.inherited_roles(session.role_names());

        let role = normalize(role);
        let sets = self
            .constraints
            .sets_containing(&session.tenant, &role, SdKind::Dynamic)
            .await?;

        for set in sets.iter() {
            if threshold_reached(set, &activated).is_some() {
                warn!(
                    "DSD violation: session {} activating {} conflicts with set {}",
                    session.id, role, set.name
                );
                return Err(RbacError::DsdViolation {
                    set: set.name.clone(),
                    role,
                    cardinality: set.cardinality,
                });
            }
        }

        Ok(())
    }

    /// Soft DSD check over a candidate session.
    ///
    /// For every DSD set touching the session's authorized roles, walks the
    /// activated roles in order. A role counts once if it is a direct member,
    /// or else once for the first of its ascendants that is a member. When a
    /// role arrives with `cardinality - 1` matches already counted, it is
    /// removed from the session and a warning is recorded. Processing
    /// continues over the remaining roles and sets.
    pub async fn check_session(&self, session: &mut Session) -> Result<DsdOutcome> {
        let mut outcome = DsdOutcome::default();

        let graph = self.graphs.get_graph(HierarchyType::Role, &session.tenant).await?;
        let authorized = graph.inherited_roles(session.role_names());
        if authorized.len() < 2 {
            return Ok(outcome);
        }

        let sets = self
            .constraints
            .sets_containing_any(&session.tenant, &authorized, SdKind::Dynamic)
            .await?;
        debug!(
            "Checking session {} against {} DSD set(s)",
            session.id,
            sets.len()
        );

        for set in &sets {
            let dropped = apply_dsd_set(set, &graph, session);
            for role in dropped {
                warn!(
                    "DSD: dropped role {} from session {} (set {}, cardinality {})",
                    role, session.id, set.name, set.cardinality
                );
                session.warn(
                    role.clone(),
                    format!("conflicts with DSD set {}", set.name),
                    DSD_VALIDATION_FAILED,
                );
                outcome.dropped.push(DsdDrop {
                    role,
                    set: set.name.clone(),
                    cardinality: set.cardinality,
                });
            }
        }

        Ok(outcome)
    }
}

/// Count members of `set` in `held`; `Some(count)` once it reaches `cardinality - 1`
fn threshold_reached(set: &SdSet, held: &BTreeSet<String>) -> Option<usize> {
    let mut matches = 0;
    for role in held {
        if set.members.contains(role) {
            matches += 1;
            if matches >= set.cardinality.saturating_sub(1) {
                return Some(matches);
            }
        }
    }
    None
}

/// Walk the session's activated roles against one DSD set, removing the
/// roles that push the match count to `cardinality`. Returns them in order.
fn apply_dsd_set(set: &SdSet, graph: &RoleGraph, session: &mut Session) -> Vec<String> {
    let mut matches = 0;
    let mut dropped = Vec::new();

    session.roles.retain(|activated| {
        let credited = set.members.contains(&activated.name)
            // One credit per activated role, for its first member ascendant
            || graph
                .ascendants(&activated.name)
                .iter()
                .any(|ascendant| set.members.contains(ascendant));

        if !credited {
            return true;
        }

        matches += 1;
        if matches >= set.cardinality {
            dropped.push(activated.name.clone());
            false
        } else {
            true
        }
    });

    dropped
}
