//! Per-actor sliding-window rate limiter

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use warden_core::{ActorId, RateLimitConfig, SharedClock, SystemClock};

/// Sliding-window limiter keyed by actor.
///
/// Denied calls are not recorded, so a flooding actor recovers as soon as the
/// oldest allowed call leaves the window.
#[derive(Debug)]
pub struct RateLimiter {
    max_commands: usize,
    window: Duration,
    clock: SharedClock,
    windows: DashMap<ActorId, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_commands: usize, window: Duration) -> Self {
        Self::with_clock(max_commands, window, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(max_commands: usize, window: Duration, clock: SharedClock) -> Self {
        Self {
            max_commands,
            window,
            clock,
            windows: DashMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig, clock: SharedClock) -> Self {
        Self::with_clock(config.max_commands, config.window(), clock)
    }

    /// Swap the time source; existing windows are kept
    pub fn replace_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }

    /// Prune, then allow and record if under the limit
    pub fn check(&self, actor: &ActorId) -> bool {
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let mut stamps = self.windows.entry(actor.clone()).or_default();
        while stamps.front().is_some_and(|t| *t <= cutoff) {
            stamps.pop_front();
        }
        if stamps.len() >= self.max_commands {
            return false;
        }
        stamps.push_back(now);
        true
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Human-readable denial reason
    #[must_use]
    pub fn limit_reason(&self) -> String {
        format!(
            "rate limited: {} cmds / {}s",
            self.max_commands,
            self.window.num_seconds()
        )
    }

    /// Drop actors whose window has fully drained
    pub fn cleanup(&self) {
        let cutoff = self.cutoff(self.clock.now());
        self.windows
            .retain(|_, stamps| stamps.back().is_some_and(|t| *t > cutoff));
    }

    /// Number of actors currently tracked
    #[must_use]
    pub fn tracked_actors(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ManualClock;

    fn limiter(max: usize, secs: i64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::with_clock(max, Duration::seconds(secs), clock.clone());
        (clock, limiter)
    }

    #[test]
    fn allows_up_to_limit_then_denies() {
        let (_clock, limiter) = limiter(5, 10);
        let bot = ActorId::new("bot");
        for _ in 0..5 {
            assert!(limiter.check(&bot));
        }
        assert!(!limiter.check(&bot));
    }

    #[test]
    fn window_slides() {
        let (clock, limiter) = limiter(5, 10);
        let bot = ActorId::new("bot");
        for _ in 0..5 {
            assert!(limiter.check(&bot));
        }
        assert!(!limiter.check(&bot));
        clock.advance_secs(11);
        assert!(limiter.check(&bot));
    }

    #[test]
    fn denied_calls_are_not_recorded() {
        let (clock, limiter) = limiter(2, 10);
        let bot = ActorId::new("bot");
        assert!(limiter.check(&bot));
        clock.advance_secs(5);
        assert!(limiter.check(&bot));
        for _ in 0..10 {
            assert!(!limiter.check(&bot));
        }
        // Only the first call has aged out.
        clock.advance_secs(6);
        assert!(limiter.check(&bot));
        assert!(!limiter.check(&bot));
    }

    #[test]
    fn actors_are_independent() {
        let (_clock, limiter) = limiter(1, 10);
        assert!(limiter.check(&ActorId::new("a")));
        assert!(!limiter.check(&ActorId::new("a")));
        assert!(limiter.check(&ActorId::new("b")));
    }

    #[test]
    fn cleanup_drops_idle_actors() {
        let (clock, limiter) = limiter(3, 10);
        limiter.check(&ActorId::new("a"));
        limiter.check(&ActorId::new("b"));
        assert_eq!(limiter.tracked_actors(), 2);
        clock.advance_secs(30);
        limiter.cleanup();
        assert_eq!(limiter.tracked_actors(), 0);
    }

    #[test]
    fn unbounded_window_never_drains() {
        let config = RateLimitConfig {
            max_commands: 1,
            window_secs: u64::MAX,
        };
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::from_config(&config, clock.clone());
        let bot = ActorId::new("bot");
        assert!(limiter.check(&bot));
        clock.advance_secs(1_000_000);
        assert!(!limiter.check(&bot));
        limiter.cleanup();
        assert_eq!(limiter.tracked_actors(), 1);
    }

    #[test]
    fn concurrent_first_access() {
        let limiter = Arc::new(RateLimiter::new(1000, Duration::seconds(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.check(&ActorId::new("shared"))).count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 400);
    }
}
