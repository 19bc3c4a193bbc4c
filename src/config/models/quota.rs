//! Quota configuration

use super::*;
use crate::core::scope::{QuotaPeriod, QuotaType, Scope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Limits per quota type and period
pub type QuotaLimits = HashMap<QuotaType, HashMap<QuotaPeriod, f64>>;

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Enable quota enforcement
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Percent of the limit at which a one-time warning is sent
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
    /// Percent of the limit at or above which every check alerts
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Limits per scope
    #[serde(default)]
    pub scopes: HashMap<Scope, ScopeQuotaConfig>,
    /// Membership used to walk from a user up to the global scope
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_threshold: default_warn_threshold(),
            alert_threshold: default_alert_threshold(),
            scopes: HashMap::new(),
            hierarchy: HierarchyConfig::default(),
        }
    }
}

impl QuotaConfig {
    /// Set one limit on the default of a scope
    pub fn with_limit(
        mut self,
        scope: Scope,
        quota_type: QuotaType,
        period: QuotaPeriod,
        limit: f64,
    ) -> Self {
        self.scopes
            .entry(scope)
            .or_default()
            .default
            .get_or_insert_with(HashMap::new)
            .entry(quota_type)
            .or_default()
            .insert(period, limit);
        self
    }

    /// Limits configured for a scope member, overrides first
    pub fn limits_for(&self, scope: Scope, scope_id: &str) -> Option<&QuotaLimits> {
        let scope_config = self.scopes.get(&scope)?;
        scope_config
            .overrides
            .get(scope_id)
            .or(scope_config.default.as_ref())
    }

    /// `(warn, alert)` thresholds for a scope
    pub fn thresholds_for(&self, scope: Scope) -> (f64, f64) {
        let scope_config = self.scopes.get(&scope);
        (
            scope_config
                .and_then(|c| c.warn_threshold)
                .unwrap_or(self.warn_threshold),
            scope_config
                .and_then(|c| c.alert_threshold)
                .unwrap_or(self.alert_threshold),
        )
    }
}

/// Limits for one scope
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScopeQuotaConfig {
    /// Limits for every member without an override
    #[serde(default)]
    pub default: Option<QuotaLimits>,
    /// Limits for specific members
    #[serde(default)]
    pub overrides: HashMap<String, QuotaLimits>,
    #[serde(default)]
    pub warn_threshold: Option<f64>,
    #[serde(default)]
    pub alert_threshold: Option<f64>,
}

/// Group and site membership
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HierarchyConfig {
    /// user id → group id
    #[serde(default)]
    pub user_groups: HashMap<String, String>,
    /// group id → site id
    #[serde(default)]
    pub group_sites: HashMap<String, String>,
}
