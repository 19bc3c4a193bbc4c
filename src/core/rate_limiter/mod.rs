//! Rate Limiting Implementation
//!
//! Per-key admission with a burst-tolerant token bucket, a strict sliding
//! window, and a fixed window that needs nothing but an atomic counter.
//! Keys have the form `scope:identifier[:provider]`.

mod limiter;
mod strategies;
mod types;
mod utils;


// Re-export public types
pub use limiter::RateLimiter;
pub use types::{
    RateLimitDecision, RateLimitGrant, RateLimitResult, RateLimitState, SlidingWindowState,
    WindowEntry,
};
