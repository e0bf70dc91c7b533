//! Configuration for the approval, publishing, and recovery core.
//!
//! Supports three-layer configuration loading:
//! 1. Built-in defaults
//! 2. TOML config file (`~/.pubguard/config.toml`)
//! 3. Environment variable overrides, using the literal key names recognized
//!    by the specification (§6) -- e.g. `DB_PATH`, `FACEBOOK_ACCESS_TOKEN`.
//!
//! CLI flag overrides, if any, are applied by the binary crates after loading.

mod defaults;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for the core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Operator-facing IANA timezone used to render scheduling hints.
    #[serde(default = "default_timezone")]
    pub operator_timezone: String,

    /// Public base URL the server is reachable at (used for webhook callbacks).
    #[serde(default)]
    pub base_url: String,

    /// Storage paths (main content DB and separate scheduler fire-time DB).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat-bot webhook credentials.
    #[serde(default)]
    pub bot: BotConfig,

    /// Platform adapter credentials.
    #[serde(default)]
    pub platforms: PlatformsConfig,

    /// Event bus tuning.
    #[serde(default)]
    pub events: EventsConfig,

    /// Scheduler/executor tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-platform rate limiter windows.
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Default cadence rules, used when a client has no override on record.
    #[serde(default)]
    pub cadence: CadenceConfig,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Storage paths. The scheduler's own fire-time index is kept in a separate,
/// unencrypted file from the main content database (see design notes §9).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: String,
    #[serde(default)]
    pub scheduler_db_path: String,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        defaults::default_storage_config()
    }
}

/// Chat-bot webhook credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Platform adapter credentials for the two supported platforms.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FacebookConfig {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstagramConfig {
    #[serde(default)]
    pub business_account_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Event bus tuning (§4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub sse_max_subscribers: usize,
    #[serde(default)]
    pub event_buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        defaults::default_events_config()
    }
}

/// Scheduler/executor tuning (§4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub dispatch_timeout_seconds: u64,
    #[serde(default)]
    pub retry_backoff_base_seconds: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub stale_scan_interval_minutes: u64,
    #[serde(default)]
    pub stale_threshold_hours: i64,
    #[serde(default)]
    pub worker_pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        defaults::default_scheduler_config()
    }
}

/// A single platform's sliding-window rate limit (§4.4).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PlatformRateLimit {
    pub window_seconds: i64,
    pub limit: u32,
}

/// Per-platform rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub platforms: HashMap<String, PlatformRateLimit>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        defaults::default_rate_limits_config()
    }
}

impl RateLimitsConfig {
    /// Look up the configured limit for a platform, falling back to a
    /// conservative default (1 per hour) for unknown platforms.
    pub fn for_platform(&self, platform: &str) -> PlatformRateLimit {
        self.platforms
            .get(platform)
            .copied()
            .unwrap_or(PlatformRateLimit {
                window_seconds: 3600,
                limit: 1,
            })
    }
}

/// Default per-client cadence rules, used absent a client-specific override
/// from the client repository (§6 client repository interface).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub min_hours_between_posts: i64,
    #[serde(default)]
    pub posts_per_week_per_platform: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        defaults::default_cadence_config()
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// The loading sequence:
    /// 1. Determine config file path (argument > `PUBGUARD_CONFIG` env var > default)
    /// 2. Parse TOML file (or use defaults if the default path doesn't exist)
    /// 3. Apply environment variable overrides using the literal key names
    ///    recognized by the specification.
    pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError { source: e })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Config::default()
            }
            Err(_) => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        };

        config.apply_env_overrides()?;

        Ok(config)
    }

    fn resolve_config_path(config_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(path) = config_path {
            return (expand_tilde(path), true);
        }

        if let Ok(env_path) = env::var("PUBGUARD_CONFIG") {
            return (expand_tilde(&env_path), true);
        }

        (expand_tilde("~/.pubguard/config.toml"), false)
    }

    /// Apply environment variable overrides using the exact key names listed
    /// in the specification's "Environment / configuration" section.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("DB_PATH") {
            self.storage.db_path = val;
        }
        if let Ok(val) = env::var("DB_ENCRYPTION_KEY") {
            self.storage.encryption_key = Some(val);
        }
        if let Ok(val) = env::var("SCHEDULER_DB_PATH") {
            self.storage.scheduler_db_path = val;
        }
        if let Ok(val) = env::var("OPERATOR_TIMEZONE") {
            self.operator_timezone = val;
        }
        if let Ok(val) = env::var("BASE_URL") {
            self.base_url = val;
        }
        if let Ok(val) = env::var("BOT_TOKEN") {
            self.bot.token = Some(val);
        }
        if let Ok(val) = env::var("BOT_CHAT_ID") {
            self.bot.chat_id = Some(val);
        }
        if let Ok(val) = env::var("FACEBOOK_PAGE_ID") {
            self.platforms.facebook.page_id = Some(val);
        }
        if let Ok(val) = env::var("FACEBOOK_ACCESS_TOKEN") {
            self.platforms.facebook.access_token = Some(val);
        }
        if let Ok(val) = env::var("INSTAGRAM_BUSINESS_ACCOUNT_ID") {
            self.platforms.instagram.business_account_id = Some(val);
        }
        if let Ok(val) = env::var("INSTAGRAM_ACCESS_TOKEN") {
            self.platforms.instagram.access_token = Some(val);
        }
        if let Ok(val) = env::var("SSE_MAX_SUBSCRIBERS") {
            self.events.sse_max_subscribers = parse_env("SSE_MAX_SUBSCRIBERS", &val)?;
        }
        if let Ok(val) = env::var("EVENT_BUFFER_SIZE") {
            self.events.event_buffer_size = parse_env("EVENT_BUFFER_SIZE", &val)?;
        }
        if let Ok(val) = env::var("DISPATCH_TIMEOUT_SECONDS") {
            self.scheduler.dispatch_timeout_seconds = parse_env("DISPATCH_TIMEOUT_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("STALE_THRESHOLD_HOURS") {
            self.scheduler.stale_threshold_hours = parse_env("STALE_THRESHOLD_HOURS", &val)?;
        }

        Ok(())
    }

    /// Validate structural invariants that the TOML schema cannot express.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.storage.db_path.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "storage.db_path".to_string(),
            });
        }
        if self.storage.scheduler_db_path.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "storage.scheduler_db_path".to_string(),
            });
        }
        if self.events.sse_max_subscribers == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "events.sse_max_subscribers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scheduler.max_retries == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "scheduler.max_retries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.operator_timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ConfigError::InvalidValue {
                field: "operator_timezone".to_string(),
                message: "not a valid IANA timezone".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, val: &str) -> Result<T, ConfigError> {
    val.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("expected a number, got '{val}'"),
    })
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rate_limit_defaults_match_spec_table() {
        let config = Config::default();
        let fb = config.rate_limits.for_platform("facebook");
        assert_eq!(fb.window_seconds, 3600);
        assert_eq!(fb.limit, 200);

        let ig = config.rate_limits.for_platform("instagram");
        assert_eq!(ig.window_seconds, 86400);
        assert_eq!(ig.limit, 25);
    }

    #[test]
    fn unknown_platform_gets_conservative_fallback() {
        let config = Config::default();
        let other = config.rate_limits.for_platform("tiktok");
        assert_eq!(other.limit, 1);
    }

    #[test]
    fn invalid_timezone_fails_validation() {
        let mut config = Config::default();
        config.operator_timezone = "Not/AZone".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_explicit_path_errors() {
        let err = Config::load(Some("/nonexistent/path/config.toml"));
        assert!(matches!(err, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn load_absent_default_path_falls_back_to_defaults() {
        // SAFETY: test runs single-threaded within this process's test binary
        // and does not race other tests that read PUBGUARD_CONFIG.
        unsafe {
            env::remove_var("PUBGUARD_CONFIG");
        }
        let config = Config::load(Some(
            "/tmp/pubguard-test-config-that-does-not-exist-12345.toml",
        ));
        assert!(config.is_err());
    }
}
