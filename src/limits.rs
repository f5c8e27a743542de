//! Sliding-window rate limiting.

use dashmap::DashMap;
use time::OffsetDateTime;

/// Per-key sliding-window limiter: at most `max_hits` within `window_secs`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_hits: usize,
    window_secs: i64,
    hits: DashMap<String, Vec<i64>>,
}

impl SlidingWindowLimiter {
    /// Build a limiter allowing `max_hits` events per `window_secs` per key.
    pub fn new(max_hits: usize, window_secs: i64) -> Self {
        Self {
            max_hits,
            window_secs,
            hits: DashMap::new(),
        }
    }

    /// Record an attempt for `key`; returns false when the window is full.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub(crate) fn allow_at(&self, key: &str, now: i64) -> bool {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        let floor = now - self.window_secs;
        entry.retain(|&stamp| stamp > floor);
        if entry.len() >= self.max_hits {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_the_window_per_key() {
        let limiter = SlidingWindowLimiter::new(2, 60);
        assert!(limiter.allow_at("1.2.3.4", 100));
        assert!(limiter.allow_at("1.2.3.4", 110));
        assert!(!limiter.allow_at("1.2.3.4", 120));
        // Other keys are unaffected.
        assert!(limiter.allow_at("5.6.7.8", 120));
        // Hits expire as the window slides.
        assert!(limiter.allow_at("1.2.3.4", 161));
    }
}
