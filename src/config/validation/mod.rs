//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.
//!
//! The validation is organized into several submodules:
//! - `trait_def`: Core Validate trait definition
//! - `config_validators`: Top-level and logging validators
//! - `rate_limit_validators`: Rate limit rule validators
//! - `quota_validators`: Quota limit and threshold validators
//! - `storage_validators`: Storage-related validators
//! - `tests`: Test suite for all validators

mod config_validators;
mod quota_validators;
mod rate_limit_validators;
mod storage_validators;
mod trait_def;

pub use trait_def::Validate;
