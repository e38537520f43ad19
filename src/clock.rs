//! Time source used for last-access bookkeeping
//!
//! Providers stamp sessions through a `Clock` so expiration can be
//! exercised deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of wall-clock time in Unix milliseconds
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds
    fn now_millis(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given Unix millisecond timestamp
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute timestamp; never moves backwards
    pub fn set(&self, millis: u64) {
        self.now.fetch_max(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether a session last touched at `last_access` is past `max_idle` at `now`
///
/// A session touched exactly `max_idle` ago is still alive.
pub fn is_expired(last_access: u64, now: u64, max_idle: Duration) -> bool {
    now.saturating_sub(last_access) > max_idle.as_millis() as u64
}
