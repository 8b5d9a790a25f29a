//! Clock abstraction for determinism.
//!
//! Lease expiry and timer due times compare wall-clock instants, so the
//! engine takes its notion of "now" through this trait instead of calling
//! `Utc::now` directly.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
