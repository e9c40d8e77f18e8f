//! Engine wiring: one graph store, one constraint cache, shared by every
//! component that needs them.
//!
//! # Architecture
//!
//! ```text
//! assign_user ──► SodValidator (SSD) ──► ConstraintSetStore ──┐
//! create_session ► temporal filter ► SodValidator (DSD) ──────┤
//! add_edge ─────► HierarchyCoordinator ► GraphStore ──────────┴─► Directory
//! ```

use crate::config::EngineConfig;
use crate::error::{RbacError, Result};
use crate::hierarchy::{GraphStore, HierarchyCoordinator};
use crate::session::{Session, User, UserRole};
use crate::sod::{ConstraintSetStore, DsdOutcome, SdSetAdmin, SodValidator};
use crate::store::{Directory, InMemoryDirectory};
use crate::types::{normalize, HierarchyType};
use chrono::NaiveDateTime;
use futures::future::try_join_all;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of creating a session
#[derive(Debug, Clone)]
pub struct SessionActivation {
    /// Session with the roles that survived activation
    pub session: Session,

    /// Roles dropped because their temporal constraint was inactive
    pub temporal_drops: Vec<String>,

    /// DSD soft-validation result
    pub dsd: DsdOutcome,
}

impl SessionActivation {
    /// Zero when every candidate role was activated
    pub fn status(&self) -> i32 {
        self.dsd.status()
    }
}

/// RBAC engine
///
/// Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct RbacEngine {
    config: Arc<EngineConfig>,
    graphs: Arc<GraphStore>,
    constraints: Arc<ConstraintSetStore>,
    hierarchy: HierarchyCoordinator,
    validator: SodValidator,
    sd_sets: SdSetAdmin,
}

impl RbacEngine {
    /// Create an engine over a directory backend
    pub fn new<D>(config: EngineConfig, directory: Arc<D>) -> Result<Self>
    where
        D: Directory + 'static,
    {
        config.validate()?;

        let graphs = Arc::new(GraphStore::new(directory.clone()));
        let constraints = Arc::new(ConstraintSetStore::with_cache_settings(
            directory.clone(),
            config.constraint_cache_capacity,
            config.constraint_cache_ttl(),
        ));

        let hierarchy = HierarchyCoordinator::new(Arc::clone(&graphs), Arc::clone(&constraints));
        let validator = SodValidator::new(Arc::clone(&graphs), Arc::clone(&constraints));
        let sd_sets = SdSetAdmin::new(directory, Arc::clone(&constraints), &config.sentinel_member);

        info!(
            "RbacEngine initialized with constraint cache capacity={}, ttl={:?}",
            config.constraint_cache_capacity,
            config.constraint_cache_ttl()
        );

        Ok(Self {
            config: Arc::new(config),
            graphs,
            constraints,
            hierarchy,
            validator,
            sd_sets,
        })
    }

    /// Engine backed by a fresh in-memory directory
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemoryDirectory::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hierarchy queries and edits
    pub fn hierarchy(&self) -> &HierarchyCoordinator {
        &self.hierarchy
    }

    /// SSD/DSD validation
    pub fn validator(&self) -> &SodValidator {
        &self.validator
    }

    /// SD set administration
    pub fn sd_sets(&self) -> &SdSetAdmin {
        &self.sd_sets
    }

    pub fn graph_store(&self) -> &GraphStore {
        &self.graphs
    }

    pub fn constraint_store(&self) -> &ConstraintSetStore {
        &self.constraints
    }

    /// Load all four hierarchies of a tenant concurrently
    pub async fn warm_up(&self, tenant: &str) -> Result<()> {
        try_join_all(
            HierarchyType::ALL
                .iter()
                .map(|hierarchy| self.graphs.get_graph(*hierarchy, tenant)),
        )
        .await?;
        debug!("Warmed up hierarchies for tenant '{}'", tenant);
        Ok(())
    }

    /// `tenant`, or the configured default when it is empty
    pub fn resolve_tenant<'a>(&'a self, tenant: &'a str) -> &'a str {
        if tenant.is_empty() {
            &self.config.default_tenant
        } else {
            tenant
        }
    }

    /// The user as seen by validation, with the default tenant filled in
    fn resolve_user<'a>(&self, user: &'a User) -> Cow<'a, User> {
        if user.tenant.is_empty() && !self.config.default_tenant.is_empty() {
            let mut resolved = user.clone();
            resolved.tenant = self.config.default_tenant.clone();
            Cow::Owned(resolved)
        } else {
            Cow::Borrowed(user)
        }
    }

    fn resolve_session(&self, session: &mut Session) {
        if session.tenant.is_empty() {
            session.tenant = self.config.default_tenant.clone();
        }
    }

    /// Every role the user is authorized for: assignments plus ascendants
    pub async fn authorized_roles(&self, user: &User) -> Result<BTreeSet<String>> {
        let tenant = self.resolve_tenant(&user.tenant);
        self.hierarchy
            .inherited_roles(HierarchyType::Role, tenant, user.role_names())
            .await
    }

    /// Every role a session is authorized for: activations plus ascendants
    pub async fn session_roles(&self, session: &Session) -> Result<BTreeSet<String>> {
        let tenant = self.resolve_tenant(&session.tenant);
        self.hierarchy
            .inherited_roles(HierarchyType::Role, tenant, session.role_names())
            .await
    }

    /// Assign `role` to `user` after the SSD check.
    ///
    /// Persisting the assignment is up to the caller.
    pub async fn assign_user(&self, user: &mut User, role: UserRole) -> Result<()> {
        if role.name.is_empty() {
            return Err(RbacError::InvalidInput("role name cannot be empty".to_string()));
        }
        if user.has_role(&role.name) {
            return Err(RbacError::InvalidInput(format!(
                "user {} already has role {}",
                user.user_id, role.name
            )));
        }

        self.validator
            .validate_ssd(&self.resolve_user(user), &role.name)
            .await?;

        info!("Assigned role {} to user {}", role.name, user.user_id);
        user.roles.push(role);
        Ok(())
    }

    /// Remove a role assignment; returns whether it was present
    pub fn deassign_user(&self, user: &mut User, role: &str) -> bool {
        let role = normalize(role);
        let before = user.roles.len();
        user.roles.retain(|r| r.name != role);
        before != user.roles.len()
    }

    /// Build a session activating every role assigned to `user`
    pub async fn create_session(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<SessionActivation> {
        self.activate(Session::new(user), now).await
    }

    /// Build a session activating only the named subset of `user`'s roles
    pub async fn create_session_with<I, S>(
        &self,
        user: &User,
        roles: I,
        now: NaiveDateTime,
    ) -> Result<SessionActivation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.activate(Session::with_roles(user, roles), now).await
    }

    async fn activate(
        &self,
        mut session: Session,
        now: NaiveDateTime,
    ) -> Result<SessionActivation> {
        self.resolve_session(&mut session);

        let temporal_drops = if self.config.enforce_temporal_constraints {
            session.filter_temporal(now)
        } else {
            Vec::new()
        };
        for role in &temporal_drops {
            warn!("Role {} inactive at {} for user {}", role, now, session.user_id);
        }

        let dsd = self.validator.check_session(&mut session).await?;

        info!(
            "Created session {} for user {} with {} active role(s)",
            session.id,
            session.user_id,
            session.roles.len()
        );

        Ok(SessionActivation {
            session,
            temporal_drops,
            dsd,
        })
    }

    /// Activate one more of the user's roles in an existing session
    pub async fn add_active_role(
        &self,
        user: &User,
        session: &mut Session,
        role: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        let role = normalize(role);
        self.resolve_session(session);

        let assignment = user
            .roles
            .iter()
            .find(|r| r.name == role)
            .ok_or_else(|| {
                RbacError::InvalidInput(format!(
                    "role {} is not assigned to user {}",
                    role, user.user_id
                ))
            })?;

        if session.is_active(&role) {
            return Err(RbacError::InvalidInput(format!(
                "role {} is already active in session {}",
                role, session.id
            )));
        }

        if self.config.enforce_temporal_constraints && !assignment.is_active_at(now) {
            return Err(RbacError::InvalidInput(format!(
                "role {} is not active at {}",
                role, now
            )));
        }

        self.validator.validate_dsd(session, &role).await?;

        session.roles.push(assignment.clone());
        debug!("Activated role {} in session {}", role, session.id);
        Ok(())
    }

    /// Deactivate a role in a session
    pub fn drop_active_role(&self, session: &mut Session, role: &str) -> Result<()> {
        if session.drop_role(role) {
            Ok(())
        } else {
            Err(RbacError::InvalidInput(format!(
                "role {} is not active in session {}",
                normalize(role),
                session.id
            )))
        }
    }
}
