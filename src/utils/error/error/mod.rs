//! Error handling for the admission engine
//!
//! This module defines all error types used throughout the crate.

#![allow(missing_docs)]

mod helpers;
mod response;
mod types;

pub(crate) use helpers::validate_cost;
pub use response::DenialDetail;
pub use types::{AdmissionError, Result};
