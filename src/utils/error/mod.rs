//! Error handling utilities
//!
//! This module provides the error type shared by every admission component.

pub mod error;

// Re-export commonly used types
pub use error::*;
pub(crate) use error::validate_cost;
