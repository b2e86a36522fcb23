//! Inactivity measurement for front ends that auto-lock.
//!
//! The engine has no timers of its own. A front end records activity after
//! each user command and calls `VaultEngine::lock` once the tracker reports
//! expiry.

use std::time::{Duration, Instant};

/// Default inactivity window before auto-lock.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct IdleTracker {
    timeout: Duration,
    last_activity: Instant,
}

impl IdleTracker {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Instant::now(),
        }
    }

    /// Restart the inactivity window.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.last_activity.elapsed() >= self.timeout
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.last_activity.elapsed())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_not_expired() {
        let tracker = IdleTracker::default();
        assert!(!tracker.is_expired());
        assert!(tracker.remaining() <= DEFAULT_IDLE_TIMEOUT);
        assert!(tracker.remaining() > Duration::from_secs(170));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let tracker = IdleTracker::new(Duration::ZERO);
        assert!(tracker.is_expired());
        assert_eq!(tracker.remaining(), Duration::ZERO);
    }

    #[test]
    fn activity_resets_window() {
        let mut tracker = IdleTracker::new(Duration::from_millis(30));
        std::thread::sleep(Duration::from_millis(40));
        assert!(tracker.is_expired());
        tracker.record_activity();
        assert!(!tracker.is_expired());
    }
}
