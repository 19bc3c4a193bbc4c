//! Hierarchical quotas
//!
//! A quota is one budget of one metric over one calendar period for one
//! scope member. A request is checked against the whole chain from its own
//! scope up to global, and the most restrictive quota wins. Periods roll
//! over lazily on the first access after they end.
//!
//! Callers follow a reserve/consume/release protocol: reserve the estimate
//! in [`QuotaManager::check_quota`], then either book the actual cost with
//! [`QuotaManager::consume_quota`] or hand the estimate back with
//! [`QuotaManager::release_quota`].

mod manager;
mod period;
mod provider;
mod types;

#[cfg(test)]
mod tests;

pub use manager::QuotaManager;
pub use period::{period_bounds, period_bounds_secs};
pub use provider::{QuotaConfigProvider, ScopeHierarchy, ScopeLimits, StaticQuotaConfig};
pub use types::{QuotaBooking, QuotaCheck, QuotaKey, QuotaSnapshot, QuotaState};
