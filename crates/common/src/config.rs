use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Direction, Error, Result, SettlementMode};

/// Upper bound for expiry and interval seconds (one day).
pub const MAX_CADENCE_SECS: u64 = 86_400;

pub const DEFAULT_FEED_URL: &str = "wss://stream.binance.com:9443/ws/btcusdt@miniTicker";
pub const DEFAULT_ADVISOR_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ADVISOR_MODEL: &str = "gemini-2.5-flash";

/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Feed
    pub feed_url: String,

    // Dashboard
    pub dashboard_token: String,
    pub dashboard_port: u16,

    // Session
    pub settlement_mode: Option<SettlementMode>,
    pub session_config_path: String,

    // Advisory
    pub advisor_api_key: Option<String>,
    pub advisor_model: String,
    pub advisor_base_url: String,

    // Telegram (disabled when no token is set)
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let settlement_mode = optional_env("SETTLEMENT_MODE").map(|raw| {
            raw.parse::<SettlementMode>()
                .unwrap_or_else(|e| panic!("ERROR: SETTLEMENT_MODE: {e}"))
        });

        let telegram_token = optional_env("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty());
        let telegram_allowed_user_ids = match &telegram_token {
            Some(_) => parse_user_ids(&required_env("TELEGRAM_ALLOWED_USER_IDS")),
            None => Vec::new(),
        };

        Config {
            feed_url: optional_env("FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            dashboard_token: required_env("DASHBOARD_TOKEN"),
            dashboard_port: optional_env("DASHBOARD_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            settlement_mode,
            session_config_path: optional_env("SESSION_CONFIG_PATH")
                .unwrap_or_else(|| "config/session.toml".to_string()),
            advisor_api_key: optional_env("ADVISOR_API_KEY").filter(|k| !k.trim().is_empty()),
            advisor_model: optional_env("ADVISOR_MODEL")
                .unwrap_or_else(|| DEFAULT_ADVISOR_MODEL.to_string()),
            advisor_base_url: optional_env("ADVISOR_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ADVISOR_BASE_URL.to_string()),
            telegram_token,
            telegram_allowed_user_ids,
        }
    }
}

fn parse_user_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(|s| {
            s.trim().parse::<i64>().unwrap_or_else(|_| {
                panic!(
                    "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                    s.trim()
                )
            })
        })
        .collect()
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ─── Session file ────────────────────────────────────────────────────────────

/// Session policy loaded from TOML. Every field has a default, so an empty
/// or missing file yields the stock simulator.
///
/// Example `config/session.toml`:
/// ```toml
/// mode = "binary"
/// expiry_secs = 60
///
/// [cadence]
/// min_period_ms = 5000
/// ms_per_expiry_sec = 500
///
/// [allocation]
/// starting_cash = 10000.0
/// stake_fraction = 0.5
/// min_order = 1000.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SettlementMode,
    /// Holding duration of binary decisions.
    pub expiry_secs: u64,
    /// Generation period in position mode.
    pub interval_secs: u64,
    pub initial_direction: Direction,
    /// Rolling price history bound.
    pub history_capacity: usize,
    pub settle_poll_ms: u64,
    /// Fixed delay before the feed reconnects.
    pub feed_backoff_secs: u64,
    pub cadence: CadenceConfig,
    pub allocation: AllocationConfig,
    pub advisory: AdvisoryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SettlementMode::Binary,
            expiry_secs: 60,
            interval_secs: 10,
            initial_direction: Direction::Up,
            history_capacity: 150,
            settle_poll_ms: 250,
            feed_backoff_secs: 3,
            cadence: CadenceConfig::default(),
            allocation: AllocationConfig::default(),
            advisory: AdvisoryConfig::default(),
        }
    }
}

/// Binary-mode generation period: `max(min_period_ms, expiry × ms_per_expiry_sec)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub min_period_ms: u64,
    pub ms_per_expiry_sec: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            min_period_ms: 5_000,
            ms_per_expiry_sec: 500,
        }
    }
}

/// Position-mode capital allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub starting_cash: f64,
    /// Share of available cash invested per buy.
    pub stake_fraction: f64,
    /// Smallest buy notional.
    pub min_order: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            starting_cash: 10_000.0,
            stake_fraction: 0.5,
            min_order: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    /// Number of most recent points sent to the advisor.
    pub window: usize,
    /// Advisory is skipped until this many points are held.
    pub min_points: usize,
    pub refresh_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_points: 10,
            refresh_secs: 15,
        }
    }
}

impl SessionConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Session config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        Self::check_cadence(self.expiry_secs)?;
        Self::check_cadence(self.interval_secs)?;
        if self.history_capacity == 0 || self.settle_poll_ms == 0 {
            return Err(Error::Config(
                "history_capacity and settle_poll_ms must be positive".into(),
            ));
        }
        let a = &self.allocation;
        if a.starting_cash < 0.0 || a.min_order < 0.0 || !(0.0..=1.0).contains(&a.stake_fraction) {
            return Err(Error::Config(
                "allocation requires non-negative cash/min_order and stake_fraction in 0..=1".into(),
            ));
        }
        Ok(())
    }

    /// A cadence value must be between 1 and [`MAX_CADENCE_SECS`] seconds.
    pub fn check_cadence(value: u64) -> Result<()> {
        if value == 0 || value > MAX_CADENCE_SECS {
            return Err(Error::Config(format!(
                "cadence must be 1..={MAX_CADENCE_SECS} seconds, got {value}"
            )));
        }
        Ok(())
    }

    /// The user-facing cadence knob for the active mode.
    pub fn cadence_value(&self) -> u64 {
        match self.mode {
            SettlementMode::Binary => self.expiry_secs,
            SettlementMode::Position => self.interval_secs,
        }
    }

    pub fn set_cadence_value(&mut self, value: u64) {
        match self.mode {
            SettlementMode::Binary => self.expiry_secs = value,
            SettlementMode::Position => self.interval_secs = value,
        }
    }
}
