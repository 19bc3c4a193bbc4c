//! Core admission engine
//!
//! Rate limiters and quotas, the vocabulary they share, and the admission
//! facade that combines them.

pub mod admission;
pub mod clock;
pub mod notifications;
pub mod quota;
pub mod rate_limiter;
pub mod scope;
