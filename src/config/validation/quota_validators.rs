//! Quota configuration validators

use super::trait_def::Validate;
use crate::config::models::*;

fn validate_thresholds(context: &str, warn: f64, alert: f64) -> Result<(), String> {
    for (name, value) in [("warn", warn), ("alert", alert)] {
        if !value.is_finite() || value <= 0.0 || value > 100.0 {
            return Err(format!(
                "{} {} threshold must be in (0, 100], got {}",
                context, name, value
            ));
        }
    }

    if warn > alert {
        return Err(format!(
            "{} warn threshold ({}) must not exceed alert threshold ({})",
            context, warn, alert
        ));
    }

    Ok(())
}

fn validate_limits(context: &str, limits: &QuotaLimits) -> Result<(), String> {
    for (quota_type, periods) in limits {
        for (period, limit) in periods {
            if !limit.is_finite() || *limit < 0.0 {
                return Err(format!(
                    "{} {}/{} limit must be a non-negative number, got {}",
                    context, quota_type, period, limit
                ));
            }
        }
    }
    Ok(())
}

impl Validate for QuotaConfig {
    fn validate(&self) -> Result<(), String> {
        validate_thresholds("Quota", self.warn_threshold, self.alert_threshold)?;

        for (scope, scope_config) in &self.scopes {
            let context = format!("Quota scope '{}'", scope);

            let (warn, alert) = self.thresholds_for(*scope);
            validate_thresholds(&context, warn, alert)?;

            if let Some(default) = &scope_config.default {
                validate_limits(&context, default)?;
            }
            for (scope_id, limits) in &scope_config.overrides {
                validate_limits(&format!("{} override '{}'", context, scope_id), limits)?;
            }
        }

        Ok(())
    }
}
