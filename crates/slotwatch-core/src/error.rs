//! Core error types for slotwatch-core.
//!
//! The taxonomy separates what the caller should do about a failure:
//! transient errors are retried with backoff, fatal errors halt the
//! affected component, and race losses end an attempt without being
//! treated as a system fault.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-specific errors. All of these are init-time
/// preconditions: the process refuses to start rather than limping on.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key or credential
    #[error("Missing required configuration: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Availability API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Timeouts, connection failures and 5xx responses. The poll loop
    /// retries these with backoff.
    #[error("Transient availability API failure: {0}")]
    Transient(String),

    /// Schema changes and auth rejection. The monitor must stop rather
    /// than retry indefinitely.
    #[error("Fatal availability API failure: {0}")]
    Fatal(String),
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Fatal(_))
    }
}

/// CAPTCHA cascade errors.
#[derive(Error, Debug)]
pub enum SolveError {
    /// Preprocessing failed -- no provider can be tried on this payload.
    #[error("Unusable audio challenge: {0}")]
    BadAudio(String),

    /// Every provider in the cascade failed for this challenge.
    #[error("All providers failed ({})", tried.join(", "))]
    AllProvidersFailed { tried: Vec<String> },
}

/// A single provider's failure within the cascade. Never escapes the
/// cascade -- it advances the chain to the next provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned an empty or malformed transcript")]
    EmptyTranscript,

    #[error("Provider is not configured: {0}")]
    NotConfigured(String),
}

/// Booking attempt errors.
#[derive(Error, Debug)]
pub enum BookingError {
    /// Credentials rejected by the portal. Never retried -- requires
    /// operator intervention.
    #[error("Portal rejected credentials: {0}")]
    Auth(String),

    /// The expected page structure is absent. The portal layout changed
    /// and a code update is required.
    #[error("Portal layout changed: {0}")]
    PortalChanged(String),

    /// Network-level failure or timeout during a portal action.
    /// Retried with bounded exponential backoff.
    #[error("Transient portal failure: {0}")]
    Transient(String),

    /// The slot was taken by a competing booking in the race window.
    /// Expected contention, ends the attempt as Abandoned.
    #[error("Lost the booking race: {0}")]
    RaceLost(String),

    /// A presented security question has no normalized match in the
    /// answer map. The engine never guesses.
    #[error("No stored answer for security question: {0:?}")]
    MissingAnswer(String),

    /// The CAPTCHA cascade failed more times than the attempt allows.
    #[error("CAPTCHA retries exhausted after {attempts} attempts")]
    CaptchaExhausted { attempts: u32 },

    /// The attempt exceeded its wall-clock budget.
    #[error("Booking attempt exceeded its {budget_secs}s budget")]
    BudgetExceeded { budget_secs: u64 },

    /// Another booking attempt is already in flight.
    #[error("A booking attempt is already in progress")]
    AttemptInProgress,
}

impl BookingError {
    /// Transient failures are retried in place; everything else ends the
    /// attempt one way or another.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Transient(_))
    }
}

/// Notification delivery errors. Delivery failure must never abort the
/// monitor loop -- callers log and continue.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(String),

    #[error("Notification sink rejected the message: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Notification sink is not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ApiError::Transient(err.to_string())
        } else {
            // Decode/builder errors mean the response was not what the
            // schema promised.
            ApiError::Fatal(err.to_string())
        }
    }
}

impl From<reqwest::Error> for BookingError {
    fn from(err: reqwest::Error) -> Self {
        BookingError::Transient(err.to_string())
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err.to_string())
    }
}
