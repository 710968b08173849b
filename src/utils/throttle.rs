//! Log throttling utility
//!
//! Limits how often the same log message is recorded, so a sustained
//! overload condition (a full frame queue, a slow client) cannot flood
//! the log at frame rate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Log throttler that limits how often the same message key is logged
pub struct LogThrottler {
    /// Map of message key to last log time
    last_logged: RwLock<HashMap<&'static str, Instant>>,
    /// Throttle interval
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    /// Create a log throttler with the interval specified in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Check if a message should be logged (not throttled)
    ///
    /// Returns `true` if the message should be logged and updates the
    /// internal timestamp for the key.
    pub fn should_log(&self, key: &'static str) -> bool {
        let now = Instant::now();

        // Fast path under the read lock
        {
            let map = self.last_logged.read().unwrap();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }

        let mut map = self.last_logged.write().unwrap();
        // Double-check after acquiring the write lock
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key, now);
        true
    }

    /// Clear throttle state for a key, so the next occurrence logs
    /// immediately
    pub fn clear(&self, key: &'static str) {
        self.last_logged.write().unwrap().remove(key);
    }
}

impl Default for LogThrottler {
    fn default() -> Self {
        Self::with_secs(5)
    }
}
