//! Per-platform sliding-window rate limiter (§4.4).
//!
//! One mutex-guarded timestamp deque per platform. `can_publish` prunes
//! timestamps older than the platform's window before counting, so reads
//! stay cheap (O(window-occupancy), never O(all-time-history)). The limiter
//! is in-memory only; `rebuild` reconstructs it from recent successful
//! dispatches recorded in the queue store so a restart doesn't silently
//! over-permit (§4.4 failure semantics).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::RateLimitsConfig;
use crate::domain::Platform;

struct Window {
    window: ChronoDuration,
    limit: u32,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while matches!(self.timestamps.front(), Some(ts) if *ts < cutoff) {
            self.timestamps.pop_front();
        }
    }
}

/// Sliding-window quota tracker queried before every dispatch attempt.
pub struct RateLimiter {
    windows: Mutex<HashMap<Platform, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitsConfig) -> Self {
        let mut windows = HashMap::new();
        for platform in [Platform::Facebook, Platform::Instagram] {
            let limit = config.for_platform(platform.as_str());
            windows.insert(
                platform,
                Window {
                    window: ChronoDuration::seconds(limit.window_seconds),
                    limit: limit.limit,
                    timestamps: VecDeque::new(),
                },
            );
        }
        RateLimiter {
            windows: Mutex::new(windows),
        }
    }

    /// Whether one more dispatch to `platform` is currently admitted.
    pub fn can_publish(&self, platform: Platform) -> bool {
        let now = Utc::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let Some(w) = windows.get_mut(&platform) else {
            return true;
        };
        w.prune(now);
        (w.timestamps.len() as u32) < w.limit
    }

    /// The earliest future time at which one more dispatch would be admitted.
    /// Returns `now` if the platform is already under quota.
    pub fn next_available(&self, platform: Platform) -> DateTime<Utc> {
        let now = Utc::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let Some(w) = windows.get_mut(&platform) else {
            return now;
        };
        w.prune(now);
        if (w.timestamps.len() as u32) < w.limit {
            return now;
        }
        // The window admits one more call as soon as its oldest occupant
        // ages out.
        w.timestamps.front().copied().unwrap_or(now) + w.window
    }

    /// Record a successful dispatch against `platform`'s window.
    pub fn record(&self, platform: Platform, at: DateTime<Utc>) {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        if let Some(w) = windows.get_mut(&platform) {
            w.timestamps.push_back(at);
        }
    }

    /// Seed the in-memory window from historical publish timestamps, used
    /// on startup so a restart doesn't reset everyone's quota to zero.
    pub fn rebuild(&self, platform: Platform, timestamps: Vec<DateTime<Utc>>) {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        if let Some(w) = windows.get_mut(&platform) {
            w.timestamps = timestamps.into_iter().collect();
            let now = Utc::now();
            w.prune(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(window_seconds: i64, limit: u32) -> RateLimiter {
        let mut config = RateLimitsConfig::default();
        config.platforms.insert(
            "facebook".to_string(),
            crate::config::PlatformRateLimit {
                window_seconds,
                limit,
            },
        );
        RateLimiter::new(&config)
    }

    #[test]
    fn admits_calls_under_the_limit() {
        let limiter = limiter_with(3600, 2);
        assert!(limiter.can_publish(Platform::Facebook));
        limiter.record(Platform::Facebook, Utc::now());
        assert!(limiter.can_publish(Platform::Facebook));
        limiter.record(Platform::Facebook, Utc::now());
        assert!(!limiter.can_publish(Platform::Facebook));
    }

    #[test]
    fn next_available_is_now_when_under_quota() {
        let limiter = limiter_with(3600, 5);
        let next = limiter.next_available(Platform::Facebook);
        assert!(next <= Utc::now() + ChronoDuration::seconds(1));
    }

    #[test]
    fn next_available_is_in_the_future_when_exhausted() {
        let limiter = limiter_with(3600, 1);
        let now = Utc::now();
        limiter.record(Platform::Facebook, now);
        let next = limiter.next_available(Platform::Facebook);
        assert!(next > now);
        assert!(next <= now + ChronoDuration::seconds(3601));
    }

    #[test]
    fn pruning_drops_timestamps_outside_the_window() {
        let limiter = limiter_with(10, 1);
        let stale = Utc::now() - ChronoDuration::seconds(20);
        limiter.rebuild(Platform::Facebook, vec![stale]);
        assert!(limiter.can_publish(Platform::Facebook));
    }

    #[test]
    fn rebuild_reconstructs_window_occupancy_on_restart() {
        let limiter = limiter_with(3600, 1);
        let recent = Utc::now() - ChronoDuration::seconds(5);
        limiter.rebuild(Platform::Facebook, vec![recent]);
        assert!(!limiter.can_publish(Platform::Facebook));
    }

    #[test]
    fn platforms_are_tracked_independently() {
        let config = RateLimitsConfig::default();
        let limiter = RateLimiter::new(&config);
        for _ in 0..25 {
            limiter.record(Platform::Instagram, Utc::now());
        }
        assert!(!limiter.can_publish(Platform::Instagram));
        assert!(limiter.can_publish(Platform::Facebook));
    }
}
