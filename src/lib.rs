//! # llm-admission
//!
//! Admission control for metered, rate-limited LLM providers shared by many
//! concurrent callers.
//!
//! ## Features
//!
//! - **Rate limiting**: burst-tolerant token bucket, strict sliding window,
//!   and a fixed window for stores that only offer atomic counters
//! - **Hierarchical quotas**: user → group → site → global budgets per
//!   metric and calendar period; the most restrictive quota wins
//! - **Reservations**: reserve an estimate, then settle the actual cost or
//!   cancel
//! - **Shared state**: in-memory, Redis, or a local cache tier in front of
//!   Redis, all updated with compare-and-swap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_admission::{AdmissionController, AdmissionRequest, Config, QuotaType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config/admission.yaml").await?;
//!     let controller = AdmissionController::from_config(&config).await?;
//!
//!     let request = AdmissionRequest::user("alice", "openai", QuotaType::Tokens, 1_500.0);
//!     match controller.admit(request).await {
//!         Ok(ticket) => {
//!             // ... call the provider ...
//!             controller.settle(ticket, 1_234.0).await?;
//!         }
//!         Err(e) if e.is_denial() => println!("denied: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod storage;
pub mod utils;

// Re-export main types
pub use config::{Config, FailurePolicy};
pub use utils::error::{AdmissionError, DenialDetail, Result};

pub use core::admission::{AdmissionController, AdmissionRequest, AdmissionStats, AdmissionTicket};
pub use core::clock::{Clock, ManualClock, SystemClock};
pub use core::notifications::{
    ChannelNotificationSink, LoggingNotificationSink, NoopNotificationSink, NotificationLevel,
    NotificationSink, QuotaNotification,
};
pub use core::quota::{
    QuotaBooking, QuotaCheck, QuotaConfigProvider, QuotaManager, QuotaSnapshot, ScopeHierarchy,
    ScopeLimits, StaticQuotaConfig,
};
pub use core::rate_limiter::{RateLimitDecision, RateLimitResult, RateLimiter};
pub use core::scope::{QuotaPeriod, QuotaType, Scope, ScopeRef};
pub use storage::{MemoryStore, StateStore, TieredStore, build_state_store};

// Version information
/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Description of the crate
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build information
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    /// Version number
    pub version: &'static str,
    /// Build time, seconds since the epoch
    pub build_time: &'static str,
    /// Git commit hash
    pub git_hash: &'static str,
    /// Rust version
    pub rust_version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: VERSION,
            build_time: option_env!("BUILD_TIME").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            rust_version: option_env!("RUST_VERSION").unwrap_or("unknown"),
        }
    }
}

/// Build information of this binary
pub fn build_info() -> BuildInfo {
    BuildInfo::default()
}
