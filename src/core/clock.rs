//! Time sources
//!
//! All engine arithmetic runs on `f64` seconds since the Unix epoch. The
//! system clock is anchored to wall time once and then advanced with a
//! monotonic [`Instant`], so elapsed-time math never goes backwards.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::Instant;

/// Source of the current time in seconds
pub trait Clock: Send + Sync + Debug {
    /// Current time as seconds since the Unix epoch
    fn now(&self) -> f64;

    /// Current time as a UTC datetime
    fn now_utc(&self) -> DateTime<Utc> {
        seconds_to_utc(self.now())
    }
}

/// Convert epoch seconds into a UTC datetime
pub fn seconds_to_utc(seconds: f64) -> DateTime<Utc> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert a UTC datetime into epoch seconds
pub fn utc_to_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Wall-anchored monotonic clock
#[derive(Debug)]
pub struct SystemClock {
    wall_origin: f64,
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            wall_origin: utc_to_seconds(Utc::now()),
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.wall_origin + self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for deterministic tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock frozen at `seconds` since the epoch
    pub fn new(seconds: f64) -> Self {
        Self {
            now: Mutex::new(seconds),
        }
    }

    /// Create a clock frozen at the given datetime
    pub fn at(time: DateTime<Utc>) -> Self {
        Self::new(utc_to_seconds(time))
    }

    /// Move the clock forward
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        *self.now.lock() = seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
