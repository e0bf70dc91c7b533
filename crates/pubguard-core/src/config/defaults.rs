//! Default values for all configuration sections.
//!
//! These defaults match the values given in the specification tables
//! (§4.4 rate limiter windows, §4.5 scheduler settings, §6 env keys).

use std::collections::HashMap;

use super::{CadenceConfig, EventsConfig, PlatformRateLimit, RateLimitsConfig, SchedulerConfig, StorageConfig};

pub(super) fn default_storage_config() -> StorageConfig {
    StorageConfig {
        db_path: "~/.pubguard/pubguard.db".to_string(),
        scheduler_db_path: "~/.pubguard/scheduler.db".to_string(),
        encryption_key: None,
    }
}

pub(super) fn default_events_config() -> EventsConfig {
    EventsConfig {
        sse_max_subscribers: 16,
        event_buffer_size: 32,
    }
}

pub(super) fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        dispatch_timeout_seconds: 30,
        retry_backoff_base_seconds: 60,
        max_retries: 3,
        stale_scan_interval_minutes: 30,
        stale_threshold_hours: 4,
        worker_pool_size: 8,
    }
}

pub(super) fn default_rate_limits_config() -> RateLimitsConfig {
    let mut platforms = HashMap::new();
    platforms.insert(
        "facebook".to_string(),
        PlatformRateLimit {
            window_seconds: 3600,
            limit: 200,
        },
    );
    platforms.insert(
        "instagram".to_string(),
        PlatformRateLimit {
            window_seconds: 86400,
            limit: 25,
        },
    );
    RateLimitsConfig { platforms }
}

pub(super) fn default_cadence_config() -> CadenceConfig {
    CadenceConfig {
        min_hours_between_posts: 4,
        posts_per_week_per_platform: 14,
    }
}
