use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub window: WindowConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port (default: 8080)
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Primary batch provider (Yahoo-style quote endpoint)
    pub yahoo: YahooConfig,
    /// Per-symbol fallback provider
    #[serde(default)]
    pub finnhub: Option<FinnhubConfig>,
    /// Client-side timeout for a single provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooConfig {
    pub base_url: String,
    /// Minimum seconds between two batch requests
    #[serde(default = "default_yahoo_interval_secs")]
    pub min_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinnhubConfig {
    pub base_url: String,
    pub api_key: String,
    /// Fixed delay between per-symbol calls in milliseconds
    #[serde(default = "default_finnhub_delay_ms")]
    pub per_symbol_delay_ms: u64,
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_yahoo_interval_secs() -> u64 {
    5
}

fn default_finnhub_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Snapshot freshness window while the market window is active
    #[serde(default = "default_active_staleness_secs")]
    pub active_staleness_secs: u64,
    /// Snapshot freshness window while in standby
    #[serde(default = "default_standby_staleness_secs")]
    pub standby_staleness_secs: u64,
}

fn default_active_staleness_secs() -> u64 {
    45
}

fn default_standby_staleness_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active_staleness_secs: default_active_staleness_secs(),
            standby_staleness_secs: default_standby_staleness_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Watchlist symbols always kept in sync, in addition to symbols
    /// referenced by alert rules
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Sync period while active, in seconds
    #[serde(default = "default_sync_active_secs")]
    pub active_interval_secs: u64,
    /// Sync period in the closing minutes of the session
    #[serde(default = "default_sync_closing_secs")]
    pub closing_interval_secs: u64,
    /// Sync period while in standby
    #[serde(default = "default_sync_standby_secs")]
    pub standby_interval_secs: u64,
    /// Minutes before window close that switch to the closing cadence
    #[serde(default = "default_closing_window_minutes")]
    pub closing_window_minutes: i64,
    /// Consecutive all-provider failures before backoff + degraded flag
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_sync_active_secs() -> u64 {
    60
}

fn default_sync_closing_secs() -> u64 {
    20
}

fn default_sync_standby_secs() -> u64 {
    600
}

fn default_closing_window_minutes() -> i64 {
    10
}

fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            active_interval_secs: default_sync_active_secs(),
            closing_interval_secs: default_sync_closing_secs(),
            standby_interval_secs: default_sync_standby_secs(),
            closing_window_minutes: default_closing_window_minutes(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Working set rebuild period (runs in both activation states)
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Evaluation period while active
    #[serde(default = "default_eval_active_secs")]
    pub eval_active_interval_secs: u64,
    /// Evaluation period while in standby
    #[serde(default = "default_eval_standby_secs")]
    pub eval_standby_interval_secs: u64,
}

fn default_reload_interval_secs() -> u64 {
    300
}

fn default_eval_active_secs() -> u64 {
    30
}

fn default_eval_standby_secs() -> u64 {
    600
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: default_reload_interval_secs(),
            eval_active_interval_secs: default_eval_active_secs(),
            eval_standby_interval_secs: default_eval_standby_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Milliseconds between two drained trigger events. Backpressure valve
    /// against notification-provider rate limits.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

fn default_drain_interval_ms() -> u64 {
    1000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Daily window open, "HH:MM" in the configured offset
    pub open: String,
    /// Daily window close, "HH:MM"
    pub close: String,
    /// Fixed UTC offset of the exchange timezone, in hours
    #[serde(default)]
    pub utc_offset_hours: i32,
    /// Restrict the active window to Monday..Friday
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    /// Minute-granularity failsafe check period, in seconds
    #[serde(default = "default_failsafe_secs")]
    pub failsafe_check_secs: u64,
}

fn default_weekdays_only() -> bool {
    true
}

fn default_failsafe_secs() -> u64 {
    60
}

impl WindowConfig {
    pub fn open_time(&self) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(&self.open, "%H:%M")
            .map_err(|e| format!("invalid window.open '{}': {}", self.open, e))
    }

    pub fn close_time(&self) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(&self.close, "%H:%M")
            .map_err(|e| format!("invalid window.close '{}': {}", self.close, e))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    /// Notification gateway base URL; notifications are disabled when unset
    #[serde(default)]
    pub gateway_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STOCKPULSE_ENV")
                        .unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STOCKPULSE_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("STOCKPULSE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.window.open_time() {
            errors.push(e);
        }
        if let Err(e) = self.window.close_time() {
            errors.push(e);
        }
        if let (Ok(open), Ok(close)) = (self.window.open_time(), self.window.close_time()) {
            if open >= close {
                errors.push("window.open must be before window.close".to_string());
            }
        }
        if !(-12..=14).contains(&self.window.utc_offset_hours) {
            errors.push("window.utc_offset_hours must be within -12..=14".to_string());
        }

        if self.cache.active_staleness_secs == 0 || self.cache.standby_staleness_secs == 0 {
            errors.push("cache staleness windows must be positive".to_string());
        }
        if self.cache.active_staleness_secs > self.cache.standby_staleness_secs {
            errors.push(
                "cache.active_staleness_secs should not exceed standby_staleness_secs"
                    .to_string(),
            );
        }

        if self.sync.active_interval_secs == 0
            || self.sync.standby_interval_secs == 0
            || self.sync.closing_interval_secs == 0
        {
            errors.push("sync intervals must be positive".to_string());
        }
        if self.sync.max_consecutive_failures == 0 {
            errors.push("sync.max_consecutive_failures must be positive".to_string());
        }

        if self.dispatch.drain_interval_ms == 0 {
            errors.push("dispatch.drain_interval_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            providers: ProvidersConfig {
                yahoo: YahooConfig {
                    base_url: "https://quotes.example.com".to_string(),
                    min_interval_secs: 5,
                },
                finnhub: None,
                timeout_secs: 10,
            },
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            alerts: AlertsConfig::default(),
            dispatch: DispatchConfig::default(),
            window: WindowConfig {
                open: "09:00".to_string(),
                close: "15:00".to_string(),
                utc_offset_hours: 9,
                weekdays_only: true,
                failsafe_check_secs: 60,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/stockpulse".to_string(),
                max_connections: 5,
            },
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
            health_port: Some(8080),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut config = base_config();
        config.window.open = "16:00".to_string();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("window.open")));
    }

    #[test]
    fn malformed_window_time_is_rejected() {
        let mut config = base_config();
        config.window.close = "25:99".to_string();
        assert!(config.validate().is_err());
    }
}
