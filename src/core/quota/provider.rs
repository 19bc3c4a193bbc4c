//! Quota limit lookup and scope membership
//!
//! Both are consumed through traits so deployments can back them with a
//! database or an admin service; [`StaticQuotaConfig`] serves them from the
//! loaded configuration.

use crate::config::models::quota::{QuotaConfig, QuotaLimits};
use crate::core::scope::{GLOBAL_SCOPE_ID, Scope, ScopeRef};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Limits and thresholds that apply to one scope member
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeLimits {
    pub limits: QuotaLimits,
    /// Percent of the limit
    pub warn_threshold: f64,
    /// Percent of the limit
    pub alert_threshold: f64,
}

/// Source of quota limits
#[async_trait]
pub trait QuotaConfigProvider: Send + Sync + Debug {
    /// Limits for a scope member, or `None` when the scope has none configured
    async fn get_limits(&self, scope: Scope, scope_id: &str) -> Result<Option<ScopeLimits>>;
}

/// Membership of scope members in broader scopes
#[async_trait]
pub trait ScopeHierarchy: Send + Sync + Debug {
    /// Broader scopes containing the member, narrowest first, ending with
    /// the global scope
    async fn ancestors(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeRef>>;
}

/// Limits and hierarchy served from [`QuotaConfig`]
#[derive(Debug, Clone, Default)]
pub struct StaticQuotaConfig {
    config: QuotaConfig,
}

impl StaticQuotaConfig {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }
}

#[async_trait]
impl QuotaConfigProvider for StaticQuotaConfig {
    async fn get_limits(&self, scope: Scope, scope_id: &str) -> Result<Option<ScopeLimits>> {
        let (warn_threshold, alert_threshold) = self.config.thresholds_for(scope);
        Ok(self
            .config
            .limits_for(scope, scope_id)
            .map(|limits| ScopeLimits {
                limits: limits.clone(),
                warn_threshold,
                alert_threshold,
            }))
    }
}

#[async_trait]
impl ScopeHierarchy for StaticQuotaConfig {
    async fn ancestors(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeRef>> {
        let hierarchy = &self.config.hierarchy;
        let mut chain = Vec::new();

        let group = match scope {
            Scope::User => hierarchy.user_groups.get(scope_id).cloned(),
            _ => None,
        };
        if let Some(group) = &group {
            chain.push(ScopeRef::new(Scope::Group, group.clone()));
        }

        let site = match scope {
            Scope::User => group.and_then(|g| hierarchy.group_sites.get(&g).cloned()),
            Scope::Group => hierarchy.group_sites.get(scope_id).cloned(),
            _ => None,
        };
        if let Some(site) = site {
            chain.push(ScopeRef::new(Scope::Site, site));
        }

        if scope != Scope::Global {
            chain.push(ScopeRef::new(Scope::Global, GLOBAL_SCOPE_ID));
        }

        Ok(chain)
    }
}
