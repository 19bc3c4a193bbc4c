//! Utility modules for the admission engine
//!
//! - **error**: the crate error type and denial details
//! - **logging**: subscriber setup for binaries and embedding services

pub mod error;
pub mod logging;

pub use logging::init_logging;
