//! Rate limiting for repetitive log lines

use core::time::Duration;

use crate::types::Timestamp;

/// Allows an event at most once per interval
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Timestamp>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Returns true and records `now` if the interval has passed
    pub fn ready(&mut self, now: Timestamp) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.has_elapsed(last, self.interval),
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
