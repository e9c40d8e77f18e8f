//! Engine configuration
//!
//! Environment variables:
//! - `RBAC_DEFAULT_TENANT` - Tenant used when none is given (default: "")
//! - `RBAC_SENTINEL_MEMBER` - Placeholder member for emptied SD sets (default: `__NONE__`)
//! - `RBAC_CONSTRAINT_CACHE_SIZE` - Constraint cache capacity (default: 10000)
//! - `RBAC_CONSTRAINT_CACHE_TTL` - Constraint cache TTL in seconds, 0 disables expiry
//!   (default: 300)
//! - `RBAC_ENFORCE_TEMPORAL` - Apply temporal role constraints at activation (default: true)

use crate::error::{RbacError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RBAC engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tenant used when the caller does not name one
    pub default_tenant: String,

    /// Placeholder member kept in SD sets whose last member was removed
    pub sentinel_member: String,

    /// Maximum number of cached role -> SD set lookups
    pub constraint_cache_capacity: usize,

    /// Constraint cache TTL in seconds (0 = no expiry)
    pub constraint_cache_ttl_secs: u64,

    /// Drop temporally inactive roles when activating
    pub enforce_temporal_constraints: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_tenant: String::new(),
            sentinel_member: "__NONE__".to_string(),
            constraint_cache_capacity: 10_000,
            constraint_cache_ttl_secs: 300,
            enforce_temporal_constraints: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `RBAC_*` environment variables.
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_tenant: std::env::var("RBAC_DEFAULT_TENANT").unwrap_or(defaults.default_tenant),
            sentinel_member: std::env::var("RBAC_SENTINEL_MEMBER")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.sentinel_member),
            constraint_cache_capacity: std::env::var("RBAC_CONSTRAINT_CACHE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.constraint_cache_capacity),
            constraint_cache_ttl_secs: std::env::var("RBAC_CONSTRAINT_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.constraint_cache_ttl_secs),
            enforce_temporal_constraints: std::env::var("RBAC_ENFORCE_TEMPORAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enforce_temporal_constraints),
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RbacError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinel_member.trim().is_empty() {
            return Err(RbacError::Config("sentinel_member cannot be empty".to_string()));
        }
        if self.constraint_cache_capacity == 0 {
            return Err(RbacError::Config(
                "constraint_cache_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Constraint cache TTL, `None` when expiry is disabled
    pub fn constraint_cache_ttl(&self) -> Option<Duration> {
        match self.constraint_cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
