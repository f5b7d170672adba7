//! Rate-limited warnings for failures that repeat on every record.
//!
//! A full disk or an overflowing queue fails the same way thousands of times
//! per second. [`RateLimitedWarn`] emits at most one `log::warn!` per
//! interval and reports how many occurrences were suppressed in between.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(10);

pub struct RateLimitedWarn {
    min_interval: Duration,
    last_logged: Mutex<Option<Instant>>,
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedWarn {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_logged: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Records one occurrence; returns true if it was logged.
    pub fn warn(&self, message: &str, detail: &dyn fmt::Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        let due = {
            let mut last = self.last_logged.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            match *last {
                Some(at) if now.duration_since(at) < self.min_interval => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };
        if !due {
            return false;
        }

        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 1 {
            log::warn!(
                "{message}: {detail} ({} suppressed, {total} total)",
                count - 1
            );
        } else {
            log::warn!("{message}: {detail} ({total} total)");
        }
        true
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedWarn {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
