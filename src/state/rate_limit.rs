//! Per-player sliding-window rate limiting for live score updates.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use uuid::Uuid;

/// Outcome of a rate-limit check that rejected the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Time until the oldest timestamp ages out of the window.
    pub retry_after: Duration,
}

/// Sliding-window limiter keyed by player id.
///
/// Multiple connections may legitimately (or not) act for the same player id
/// concurrently; the per-key `DashMap` entry lock keeps each window
/// consistent. Windows are pruned on every check and fully-empty entries are
/// dropped by [`RateLimiter::prune`], so idle players cost nothing.
pub struct RateLimiter {
    window: Duration,
    max_updates: usize,
    windows: DashMap<Uuid, Vec<SystemTime>>,
}

impl RateLimiter {
    /// Build a limiter allowing `max_updates` per `window`.
    pub fn new(max_updates: usize, window: Duration) -> Self {
        Self {
            window,
            max_updates,
            windows: DashMap::new(),
        }
    }

    /// Record an update attempt at the current time.
    pub fn check(&self, player_id: Uuid) -> Result<(), RateLimited> {
        self.check_at(player_id, SystemTime::now())
    }

    /// Record an update attempt at an explicit instant.
    pub fn check_at(&self, player_id: Uuid, now: SystemTime) -> Result<(), RateLimited> {
        let mut entry = self.windows.entry(player_id).or_default();
        let cutoff = now - self.window;
        entry.retain(|stamp| *stamp > cutoff);

        if entry.len() >= self.max_updates {
            // The window reopens when the oldest stamp ages out.
            let oldest = entry.iter().min().copied().unwrap_or(now);
            let elapsed = now.duration_since(oldest).unwrap_or_default();
            return Err(RateLimited {
                retry_after: self.window.saturating_sub(elapsed),
            });
        }

        entry.push(now);
        Ok(())
    }

    /// Drop windows that hold no timestamp newer than the window span.
    ///
    /// Called from the idle sweep so the map does not grow unboundedly with
    /// players that stopped updating.
    pub fn prune(&self, now: SystemTime) {
        let cutoff = now - self.window;
        self.windows
            .retain(|_, stamps| stamps.iter().any(|stamp| *stamp > cutoff));
    }

    /// Number of tracked windows, exposed for the health probe and tests.
    pub fn tracked_players(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn sixty_first_update_in_window_is_rejected() {
        let limiter = RateLimiter::new(60, WINDOW);
        let player = Uuid::new_v4();
        let start = SystemTime::now();

        for i in 0..60 {
            let at = start + Duration::from_millis(i * 10);
            assert!(limiter.check_at(player, at).is_ok(), "update {i} rejected");
        }

        let rejected = limiter
            .check_at(player, start + Duration::from_secs(1))
            .unwrap_err();
        assert!(rejected.retry_after <= WINDOW);
        assert!(rejected.retry_after > Duration::ZERO);
    }

    #[test]
    fn update_accepted_after_oldest_stamp_ages_out() {
        let limiter = RateLimiter::new(60, WINDOW);
        let player = Uuid::new_v4();
        let start = SystemTime::now();

        for i in 0..60 {
            limiter
                .check_at(player, start + Duration::from_millis(i * 10))
                .unwrap();
        }
        assert!(
            limiter
                .check_at(player, start + Duration::from_secs(30))
                .is_err()
        );

        // One second past the first stamp's expiry the window has room again.
        assert!(
            limiter
                .check_at(player, start + WINDOW + Duration::from_secs(1))
                .is_ok()
        );
    }

    #[test]
    fn players_do_not_share_windows() {
        let limiter = RateLimiter::new(1, WINDOW);
        let now = SystemTime::now();
        assert!(limiter.check_at(Uuid::new_v4(), now).is_ok());
        assert!(limiter.check_at(Uuid::new_v4(), now).is_ok());
    }

    #[test]
    fn prune_drops_idle_windows() {
        let limiter = RateLimiter::new(60, WINDOW);
        let player = Uuid::new_v4();
        let start = SystemTime::now();
        limiter.check_at(player, start).unwrap();
        assert_eq!(limiter.tracked_players(), 1);

        limiter.prune(start + WINDOW + Duration::from_secs(1));
        assert_eq!(limiter.tracked_players(), 0);
    }
}
