//! Idle tracking for TTL-based eviction.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Last access time for a single tracked entry.
///
/// Lives inside the entry it tracks so a sweep can check and remove the entry
/// in one atomic map operation.
#[derive(Debug)]
pub struct LastSeen {
    at: Mutex<Instant>,
}

impl LastSeen {
    /// Create a tracker stamped with the current time.
    pub fn now() -> Self {
        Self {
            at: Mutex::new(Instant::now()),
        }
    }

    /// Record an access (resets the idle timer).
    pub fn touch(&self) {
        *self.at.lock() = Instant::now();
    }

    /// Whether the entry has been idle for longer than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        is_idle(*self.at.lock(), ttl)
    }
}

impl Default for LastSeen {
    fn default() -> Self {
        Self::now()
    }
}

/// Whether more than `ttl` has passed since `last_use`.
pub fn is_idle(last_use: Instant, ttl: Duration) -> bool {
    last_use.elapsed() > ttl
}
