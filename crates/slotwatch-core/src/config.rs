//! TOML-based application configuration.
//!
//! Stores the monitor schedule, booking limits, CAPTCHA cascade settings
//! and request pacing budget. Secrets never live here -- they come from
//! the OS keyring (see [`crate::store`]).
//!
//! Configuration is stored at `~/.config/slotwatch/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::monitor::LocationKind;

/// Returns `~/.config/slotwatch[-dev]/` based on SLOTWATCH_ENV.
///
/// Set SLOTWATCH_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SLOTWATCH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("slotwatch-dev")
    } else {
        base_dir.join("slotwatch")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

/// A consulate the monitor watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulateConfig {
    /// Portal-side consulate id (e.g. "122").
    pub id: String,
    /// Display name (e.g. "Chennai").
    pub name: String,
    /// Main consulates trigger notifications; satellite/VAC locations
    /// are recorded but never notified.
    #[serde(default)]
    pub kind: LocationKind,
}

/// Availability API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

/// Slot monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between poll ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum seconds between two notifications for the same consulate.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Consulates to watch.
    #[serde(default = "default_consulates")]
    pub consulates: Vec<ConsulateConfig>,
}

/// Booking engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Login retries on transient failures before giving up.
    #[serde(default = "default_max_login_retries")]
    pub max_login_retries: u32,
    /// Fresh CAPTCHA challenges per attempt before abandoning.
    #[serde(default = "default_max_captcha_retries")]
    pub max_captcha_retries: u32,
    /// Base backoff in milliseconds; doubles per retry, with jitter.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Wall-clock budget for a whole attempt.
    #[serde(default = "default_attempt_budget_secs")]
    pub attempt_budget_secs: u64,
    /// Whether the run loop starts booking attempts on availability.
    #[serde(default)]
    pub auto_book: bool,
}

/// CAPTCHA cascade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Per-provider timeout; a provider that exceeds it is skipped.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Enable the paid 2captcha fallback (needs a keyring API key).
    #[serde(default)]
    pub paid_fallback: bool,
}

/// Request pacing shared by every portal interaction and API poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Randomized inter-action delay bounds in milliseconds.
    #[serde(default = "default_min_action_delay_ms")]
    pub min_action_delay_ms: u64,
    #[serde(default = "default_max_action_delay_ms")]
    pub max_action_delay_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/slotwatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
}

// Default functions
fn default_api_endpoint() -> String {
    "https://app.checkvisaslots.com/slots/v3".into()
}
fn default_api_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_secs() -> u64 {
    180
}
fn default_cooldown_secs() -> u64 {
    300
}
fn default_max_login_retries() -> u32 {
    3
}
fn default_max_captcha_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    2_000
}
fn default_attempt_budget_secs() -> u64 {
    600
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_max_requests() -> usize {
    10
}
fn default_window_secs() -> u64 {
    60
}
fn default_min_action_delay_ms() -> u64 {
    800
}
fn default_max_action_delay_ms() -> u64 {
    3_200
}

fn default_consulates() -> Vec<ConsulateConfig> {
    // Known consulates and their satellite VAC counterparts.
    [
        ("122", "Chennai"),
        ("123", "Hyderabad"),
        ("124", "Kolkata"),
        ("125", "Mumbai"),
        ("126", "New Delhi"),
    ]
    .into_iter()
    .map(|(id, name)| ConsulateConfig {
        id: id.to_string(),
        name: name.to_string(),
        kind: LocationKind::Main,
    })
    .collect()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_api_endpoint(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            consulates: default_consulates(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_login_retries: default_max_login_retries(),
            max_captcha_retries: default_max_captcha_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            attempt_budget_secs: default_attempt_budget_secs(),
            auto_book: false,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            paid_fallback: false,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            min_action_delay_ms: default_min_action_delay_ms(),
            max_action_delay_ms: default_max_action_delay_ms(),
        }
    }
}

impl Config {
    /// Path of the config file inside the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, falling back to defaults when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let config: Config = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Validate field constraints, collecting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.monitor.poll_interval_secs == 0 {
            errors.push("monitor.poll_interval_secs must be positive");
        }
        if self.monitor.consulates.is_empty() {
            errors.push("monitor.consulates must list at least one consulate");
        }
        if self.booking.max_login_retries == 0 {
            errors.push("booking.max_login_retries must be at least 1");
        }
        if self.booking.max_captcha_retries == 0 {
            errors.push("booking.max_captcha_retries must be at least 1");
        }
        if self.pacing.max_requests == 0 {
            errors.push("pacing.max_requests must be positive");
        }
        if self.pacing.min_action_delay_ms > self.pacing.max_action_delay_ms {
            errors.push("pacing.min_action_delay_ms must not exceed max_action_delay_ms");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                key: "config".into(),
                message: errors.join("; "),
            })
        }
    }

    /// Look up the display name for a consulate id.
    pub fn consulate_name(&self, id: &str) -> String {
        self.monitor
            .consulates
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("Consulate {id}"))
    }
}
