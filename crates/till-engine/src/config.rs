//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_DATABASE_PATH=/var/lib/till/till.db                           │
//! │     TILL_CHECKOUT_TIMEOUT_MS=8000                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/till.toml (Linux)                                    │
//! │     ~/Library/Application Support/com.till.pos/till.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/till/till.db"
//! max_connections = 5
//!
//! [checkout]
//! timeout_ms = 5000
//!
//! [loyalty]
//! silver_threshold = 500
//! gold_threshold = 1000
//! silver_multiplier_bps = 15000
//! gold_multiplier_bps = 20000
//! spend_per_point_cents = 1000
//!
//! [alerts]
//! sweep_interval_secs = 14400   # every 4 hours
//!
//! [report]
//! enabled = true
//! hour = 22                     # UTC
//! minute = 0
//!
//! [forecast]
//! lookback_days = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use till_core::loyalty::LoyaltyPolicy;

use crate::error::{EngineError, EngineResult};

/// Upper bounds; larger values overflow timer or calendar arithmetic long
/// before they make sense for a shop.
pub const MAX_CHECKOUT_TIMEOUT_MS: u64 = 10 * 60 * 1000;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_LOOKBACK_DAYS: i64 = 10 * 365;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file, created on first start.
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("till.db"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutSettings {
    /// Budget for one sale's commit, lock waits included.
    pub timeout_ms: u64,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings { timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub sweep_interval_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            sweep_interval_secs: 4 * 60 * 60,
        }
    }
}

/// Daily closing report, sent at `hour:minute` UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            enabled: true,
            hour: 22,
            minute: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub lookback_days: i64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        ForecastSettings { lookback_days: 30 }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub loyalty: LoyaltyPolicy,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub report: ReportSettings,

    #[serde(default)]
    pub forecast: ForecastSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`till.toml`); a missing file is not an error
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document; absent sections and keys take defaults.
    pub fn from_toml_str(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.loyalty
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        if !(1..=MAX_CHECKOUT_TIMEOUT_MS).contains(&self.checkout.timeout_ms) {
            return Err(EngineError::InvalidConfig(format!(
                "checkout.timeout_ms must be between 1 and {}",
                MAX_CHECKOUT_TIMEOUT_MS
            )));
        }

        if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&self.alerts.sweep_interval_secs) {
            return Err(EngineError::InvalidConfig(format!(
                "alerts.sweep_interval_secs must be between 1 and {}",
                MAX_SWEEP_INTERVAL_SECS
            )));
        }

        if self.report.hour >= 24 || self.report.minute >= 60 {
            return Err(EngineError::InvalidConfig(format!(
                "report time {:02}:{:02} is not a valid time of day",
                self.report.hour, self.report.minute
            )));
        }

        if !(2..=MAX_LOOKBACK_DAYS).contains(&self.forecast.lookback_days) {
            return Err(EngineError::InvalidConfig(format!(
                "forecast.lookback_days must be between 2 and {}",
                MAX_LOOKBACK_DAYS
            )));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TILL_*` overrides read through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("TILL_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_parsed(&var, "TILL_CHECKOUT_TIMEOUT_MS", &mut self.checkout.timeout_ms);
        override_parsed(&var, "TILL_LOYALTY_SILVER_THRESHOLD", &mut self.loyalty.silver_threshold);
        override_parsed(&var, "TILL_LOYALTY_GOLD_THRESHOLD", &mut self.loyalty.gold_threshold);
        override_parsed(&var, "TILL_SWEEP_INTERVAL_SECS", &mut self.alerts.sweep_interval_secs);
        override_parsed(&var, "TILL_REPORT_HOUR", &mut self.report.hour);

        if let Some(enabled) = var("TILL_REPORT_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.report.enabled = true,
                "0" | "false" | "no" | "off" => self.report.enabled = false,
                _ => warn!(value = %enabled, "Unknown TILL_REPORT_ENABLED value"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("till.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.alerts.sweep_interval_secs)
    }
}

fn override_parsed<T>(var: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T)
where
    T: std::str::FromStr + std::fmt::Display,
{
    if let Some(raw) = var(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(var = name, value = %value, "Overriding config from environment");
                *target = value;
            }
            Err(_) => warn!(var = name, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}
