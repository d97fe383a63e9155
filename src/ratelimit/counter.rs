//! Fixed-window message counter.

use std::time::{Duration, Instant};

/// Length of an accounting window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Counts messages from one key within the current window.
///
/// Not synchronized on its own; the owning table hands out exclusive access
/// per key, so a rollover and the following increment happen together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounter {
    /// Messages counted in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl WindowCounter {
    /// Create an empty counter whose window starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Account one message observed at `now` and return the count in the
    /// window it landed in.
    ///
    /// If `now` is at or past the end of the current window a fresh window
    /// starts at `now`, no matter how many windows were skipped.
    pub fn hit(&mut self, now: Instant) -> u64 {
        if self.is_expired(now) {
            self.count = 0;
            self.window_start = now;
        }
        self.count += 1;
        self.count
    }

    /// Account one message and report whether it is over `limit`.
    ///
    /// A limit of `0` never throttles and leaves the counter untouched.
    pub fn throttle(&mut self, now: Instant, limit: u64) -> bool {
        if limit == 0 {
            return false;
        }
        self.hit(now) > limit
    }

    /// Whether the window has ended at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_start + WINDOW
    }

    /// Messages counted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window started.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Time left in the current window as seen at `now`.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        (self.window_start + WINDOW).saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment_within_limit() {
        let now = Instant::now();
        let mut counter = WindowCounter::new(now);

        assert!(!counter.throttle(now, 10));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_counter_increment_exceeds_limit() {
        let now = Instant::now();
        let mut counter = WindowCounter::new(now);

        for _ in 0..5 {
            assert!(!counter.throttle(now, 5));
        }

        // The 6th message and every one after it is over the limit
        assert!(counter.throttle(now, 5));
        assert!(counter.throttle(now, 5));
        assert_eq!(counter.count(), 7);
    }

    #[test]
    fn test_zero_limit_touches_nothing() {
        let now = Instant::now();
        let mut counter = WindowCounter::new(now);

        for _ in 0..1000 {
            assert!(!counter.throttle(now, 0));
        }
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start);

        for _ in 0..3 {
            counter.hit(start);
        }
        assert!(counter.throttle(start + Duration::from_millis(999), 3));

        // Exactly one window later a fresh window begins
        let next = start + WINDOW;
        assert!(!counter.throttle(next, 3));
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.window_start(), next);
    }

    #[test]
    fn test_window_restarts_at_now_after_long_idle() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start);
        counter.hit(start);

        let later = start + Duration::from_millis(5_300);
        assert_eq!(counter.hit(later), 1);
        assert_eq!(counter.window_start(), later);
        assert_eq!(counter.duration_until_reset(later), WINDOW);
    }

    #[test]
    fn test_duration_until_reset() {
        let start = Instant::now();
        let counter = WindowCounter::new(start);

        assert_eq!(
            counter.duration_until_reset(start + Duration::from_millis(400)),
            Duration::from_millis(600)
        );
        assert_eq!(counter.duration_until_reset(start + WINDOW * 2), Duration::ZERO);
    }
}
