//! Common test utilities for llm-admission
//!
//! ```rust,ignore
//! use crate::common::fixtures::Harness;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let harness = Harness::new(fixtures::team_config());
//!     let ticket = harness.controller.admit(fixtures::user_request("alice", 1.0)).await;
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::DenialAssertions;
pub use fixtures::Harness;

/// Skip test if environment variable is not set
#[macro_export]
macro_rules! skip_without_env {
    ($var:expr) => {
        if std::env::var($var).is_err() {
            eprintln!("Skipping test: {} environment variable not set", $var);
            return;
        }
    };
}
