//! Rate limit configuration validators

use super::trait_def::Validate;
use crate::config::models::*;
use std::collections::HashSet;

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            if !names.insert(rule.name.as_str()) {
                return Err(format!("Duplicate rate limit rule name: {}", rule.name));
            }
            rule.validate()?;
        }

        Ok(())
    }
}

impl Validate for RateLimitRule {
    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Rate limit rule name cannot be empty".to_string());
        }

        if !self.limit.is_finite() || self.limit <= 0.0 {
            return Err(format!(
                "Rate limit rule '{}' must have a positive limit",
                self.name
            ));
        }

        if self.window_secs == 0 {
            return Err(format!(
                "Rate limit rule '{}' window must be greater than 0",
                self.name
            ));
        }

        for (identifier, limit) in &self.overrides {
            if !limit.is_finite() || *limit <= 0.0 {
                return Err(format!(
                    "Rate limit rule '{}' override for '{}' must be positive",
                    self.name, identifier
                ));
            }
        }

        Ok(())
    }
}
