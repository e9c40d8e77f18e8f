//! Users, role assignments and activation sessions

use crate::types::{normalize, TenantId};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Validity window attached to a role assignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalConstraint {
    /// First valid day (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_date: Option<NaiveDate>,

    /// Last valid day (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    /// Daily window start (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<NaiveTime>,

    /// Daily window end (exclusive); a window with end < begin wraps midnight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,

    /// Allowed weekdays; empty allows every day
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<Weekday>,
}

impl TemporalConstraint {
    /// Whether the assignment may be activated at `now`
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        let today = now.date();

        if self.begin_date.is_some_and(|begin| today < begin) {
            return false;
        }
        if self.end_date.is_some_and(|end| today > end) {
            return false;
        }
        if !self.days.is_empty() && !self.days.contains(&today.weekday()) {
            return false;
        }

        let time = now.time();
        match (self.begin_time, self.end_time) {
            (Some(begin), Some(end)) if begin <= end => time >= begin && time < end,
            (Some(begin), Some(end)) => time >= begin || time < end,
            (Some(begin), None) => time >= begin,
            (None, Some(end)) => time < end,
            (None, None) => true,
        }
    }
}

/// A role assigned to (or activated by) a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    /// Role name, canonical case
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<TemporalConstraint>,
}

impl UserRole {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: normalize(name.as_ref()),
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: TemporalConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Unconstrained roles are always active
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.constraint
            .as_ref()
            .map(|c| c.is_active_at(now))
            .unwrap_or(true)
    }
}

/// User with their role assignments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,

    #[serde(default)]
    pub tenant: TenantId,

    #[serde(default)]
    pub roles: Vec<UserRole>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant: TenantId::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Whether `role` is directly assigned
    pub fn has_role(&self, role: &str) -> bool {
        let role = normalize(role);
        self.roles.iter().any(|r| r.name == role)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }
}

/// Record of a role dropped from a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWarning {
    /// Dropped role
    pub role: String,
    /// Why it was dropped
    pub reason: String,
    /// Status code for the drop
    pub code: i32,
}

/// A user's activation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub tenant: TenantId,

    /// Currently activated roles
    pub roles: Vec<UserRole>,

    #[serde(default)]
    pub warnings: Vec<SessionWarning>,
}

impl Session {
    /// Candidate session activating every role assigned to `user`
    pub fn new(user: &User) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.user_id.clone(),
            tenant: user.tenant.clone(),
            roles: user.roles.clone(),
            warnings: Vec::new(),
        }
    }

    /// Candidate session activating only the given subset of `user`'s roles
    pub fn with_roles<I, S>(user: &User, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = roles.into_iter().map(|r| normalize(r.as_ref())).collect();
        let mut session = Self::new(user);
        session.roles.retain(|r| wanted.contains(&r.name));
        session
    }

    /// Whether `role` is activated
    pub fn is_active(&self, role: &str) -> bool {
        let role = normalize(role);
        self.roles.iter().any(|r| r.name == role)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }

    /// Deactivate `role`; returns whether it was active
    pub fn drop_role(&mut self, role: &str) -> bool {
        let role = normalize(role);
        let before = self.roles.len();
        self.roles.retain(|r| r.name != role);
        self.roles.len() != before
    }

    /// Drop roles whose temporal constraint is inactive at `now`.
    ///
    /// Returns the dropped names.
    pub fn filter_temporal(&mut self, now: NaiveDateTime) -> Vec<String> {
        let mut dropped = Vec::new();
        self.roles.retain(|role| {
            if role.is_active_at(now) {
                true
            } else {
                dropped.push(role.name.clone());
                false
            }
        });
        dropped
    }

    pub fn warn(&mut self, role: impl Into<String>, reason: impl Into<String>, code: i32) {
        self.warnings.push(SessionWarning {
            role: role.into(),
            reason: reason.into(),
            code,
        });
    }
}
