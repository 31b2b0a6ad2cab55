//! Sliding-window request limiter keyed by user.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

/// How often idle users are swept from the map.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct RateLimiter {
    limit_per_window: u32,
    window: Duration,
    requests: Mutex<(HashMap<Uuid, Vec<Instant>>, Instant)>,
}

impl RateLimiter {
    /// A limit of zero disables limiting.
    pub fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            requests: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Record a request for `key`. When the window is full, returns how long
    /// until the oldest request leaves it.
    pub fn check(&self, key: Uuid) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: Uuid, now: Instant) -> Result<(), Duration> {
        if self.limit_per_window == 0 {
            return Ok(());
        }

        let cutoff = now.checked_sub(self.window);
        let live = |t: &Instant| cutoff.is_none_or(|c| *t > c);

        let mut guard = self.requests.lock();
        let (requests, last_sweep) = &mut *guard;

        if now.duration_since(*last_sweep) >= SWEEP_INTERVAL {
            requests.retain(|_, timestamps| {
                timestamps.retain(live);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = requests.entry(key).or_default();
        entry.retain(live);

        if entry.len() >= self.limit_per_window as usize {
            let oldest = entry[0];
            return Err((oldest + self.window).saturating_duration_since(now));
        }

        entry.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_per_key() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let key = Uuid::new_v4();
        let start = Instant::now();

        assert!(limiter.check_at(key, start).is_ok());
        let wait = limiter
            .check_at(key, start + Duration::from_secs(4))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(6));
        assert!(limiter.check_at(key, start + Duration::from_secs(11)).is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::disabled();
        let key = Uuid::new_v4();
        for _ in 0..1000 {
            assert!(limiter.check(key).is_ok());
        }
    }
}
