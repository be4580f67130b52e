use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Fixed-window in-memory rate limiter, keyed by caller identity.
///
/// Guards the checkout endpoint against hammering; webhook and read paths
/// are not limited. State is per-process, which is acceptable because the
/// limit exists to slow abusive clients, not to meter billing.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Records a hit for `key` and reports whether it is within the limit.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drops windows that have been idle for at least one full window.
    /// Called opportunistically; correctness does not depend on it.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("user-1"));
        assert!(limiter.check("user-1"));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
        assert!(limiter.check("user-2"));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("user-1"));
    }

    #[test]
    fn prune_drops_stale_windows() {
        let limiter = RateLimiter::new(1, Duration::from_millis(5));
        limiter.check("user-1");
        std::thread::sleep(Duration::from_millis(20));
        limiter.prune();
        assert!(limiter.windows.is_empty());
    }
}
