//! Minimum-spacing throttle for third-party lookups.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Enforces a minimum delay between consecutive calls.
///
/// The lock is held while sleeping, so concurrent callers sharing one
/// limiter are serialized rather than released together.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a call is allowed, then record it. Returns the time slept.
    pub fn acquire(&self) -> Duration {
        let mut last = self.last_call.lock();
        let waited = match *last {
            Some(prev) => {
                let elapsed = prev.elapsed();
                if elapsed < self.min_interval {
                    let wait = self.min_interval - elapsed;
                    std::thread::sleep(wait);
                    wait
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };
        *last = Some(Instant::now());
        waited
    }
}
