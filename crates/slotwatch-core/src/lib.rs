//! # Slotwatch Core Library
//!
//! Core logic for the slotwatch visa-appointment watcher. It implements a
//! CLI-first philosophy where every operation is available via a standalone
//! CLI binary over this one library.
//!
//! ## Architecture
//!
//! - **Slot Monitor**: polls the availability API, detects zero/non-zero
//!   edges per consulate and gates notifications behind a cooldown
//! - **CAPTCHA Cascade**: ordered fallback chain of speech-recognition
//!   providers over a shared preprocessed audio payload
//! - **Booking Engine**: a state machine that drives the appointment
//!   portal from login to confirmation, one attempt at a time
//! - **Store**: OS-keyring credentials and the security-answer map
//! - **Notify**: pluggable sinks (Telegram, log) fed by monitor and
//!   booking events
//!
//! ## Key Components
//!
//! - [`SlotMonitor`]: availability polling and edge detection
//! - [`SolverCascade`]: CAPTCHA provider chain
//! - [`BookingEngine`]: portal state machine
//! - [`Config`]: TOML application configuration

pub mod booking;
pub mod captcha;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod notify;
pub mod pacing;
pub mod store;

pub use booking::{
    AttemptSlot, BookingEngine, BookingOutcome, BookingSession, BookingState, ChromiumPortal,
    Portal,
};
pub use captcha::{AudioChallenge, SolverCascade};
pub use config::Config;
pub use error::{ApiError, BookingError, ConfigError, NotifyError, SolveError};
pub use events::Event;
pub use monitor::{AvailabilityApi, CheckVisaSlotsApi, SlotMonitor, SlotSnapshot};
pub use notify::{LogSink, NotificationSink, TelegramSink};
pub use pacing::Pacer;
pub use store::{Credentials, SecurityAnswerMap};
