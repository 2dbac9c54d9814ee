//! Booking state machine.
//!
//! A booking attempt drives the appointment portal through a linear
//! sequence of states from login to confirmation. Exactly one attempt
//! runs at a time ([`AttemptSlot`]); an attempt is bounded both by retry
//! counters and by a wall-clock budget, and always ends in one of the
//! three terminal states.

pub mod browser;
pub mod engine;
pub mod portal;

pub use browser::{ChromiumPortal, PortalSelectors};
pub use engine::BookingEngine;
pub use portal::Portal;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::BookingError;

/// States of one booking attempt, in the order the engine visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingState {
    Idle,
    LoggingIn,
    Navigating,
    SelectingSlot,
    SolvingCaptcha,
    AnsweringSecurityQuestions,
    Confirming,
    /// Terminal: the appointment is confirmed.
    Booked,
    /// Terminal: an unrecoverable error ended the attempt.
    Failed,
    /// Terminal: the attempt was given up without a system fault
    /// (race lost, captcha retries exhausted, budget exceeded).
    Abandoned,
}

impl BookingState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingState::Booked | BookingState::Failed | BookingState::Abandoned
        )
    }
}

/// How an attempt ended, with the human-readable reason for the two
/// non-success terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason")]
pub enum BookingOutcome {
    Booked,
    Abandoned(String),
    Failed(String),
}

impl BookingOutcome {
    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> BookingState {
        match self {
            BookingOutcome::Booked => BookingState::Booked,
            BookingOutcome::Abandoned(_) => BookingState::Abandoned,
            BookingOutcome::Failed(_) => BookingState::Failed,
        }
    }

    /// Classify a terminal error. Expected contention and exhausted
    /// bounds abandon the attempt; everything else is a failure.
    pub fn from_error(err: &BookingError) -> Self {
        match err {
            BookingError::RaceLost(_)
            | BookingError::CaptchaExhausted { .. }
            | BookingError::BudgetExceeded { .. } => BookingOutcome::Abandoned(err.to_string()),
            other => BookingOutcome::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for BookingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingOutcome::Booked => write!(f, "booked"),
            BookingOutcome::Abandoned(reason) => write!(f, "abandoned ({reason})"),
            BookingOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Mutable record of one attempt, updated as the engine advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSession {
    pub id: String,
    pub consulate_id: String,
    pub state: BookingState,
    /// Transient-login retries consumed so far.
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub outcome: Option<BookingOutcome>,
}

impl BookingSession {
    pub fn new(consulate_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            consulate_id: consulate_id.into(),
            state: BookingState::Idle,
            retry_count: 0,
            last_error: None,
            outcome: None,
        }
    }
}

/// Process-wide guard ensuring at most one booking attempt runs at a
/// time. Clones share the same slot.
#[derive(Clone, Default)]
pub struct AttemptSlot {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one attempt; dropping it frees the slot.
pub struct AttemptGuard {
    _guard: OwnedMutexGuard<()>,
}

impl AttemptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or report that an attempt is already in flight.
    pub fn try_acquire(&self) -> Result<AttemptGuard, BookingError> {
        self.inner
            .clone()
            .try_lock_owned()
            .map(|guard| AttemptGuard { _guard: guard })
            .map_err(|_| BookingError::AttemptInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        assert!(BookingState::Booked.is_terminal());
        assert!(BookingState::Failed.is_terminal());
        assert!(BookingState::Abandoned.is_terminal());
        assert!(!BookingState::Idle.is_terminal());
        assert!(!BookingState::Confirming.is_terminal());
    }

    #[test]
    fn race_loss_abandons_rather_than_fails() {
        let outcome = BookingOutcome::from_error(&BookingError::RaceLost("slot taken".into()));
        assert!(matches!(outcome, BookingOutcome::Abandoned(_)));
        assert_eq!(outcome.state(), BookingState::Abandoned);
    }

    #[test]
    fn auth_rejection_is_a_failure() {
        let outcome = BookingOutcome::from_error(&BookingError::Auth("bad password".into()));
        assert!(matches!(outcome, BookingOutcome::Failed(_)));
    }

    #[test]
    fn attempt_slot_admits_one_attempt() {
        let slot = AttemptSlot::new();
        let guard = slot.try_acquire().expect("first acquire");
        let second = slot.clone().try_acquire();
        assert!(matches!(second, Err(BookingError::AttemptInProgress)));
        drop(guard);
        assert!(slot.try_acquire().is_ok());
    }

    #[test]
    fn new_session_starts_idle() {
        let session = BookingSession::new("122");
        assert_eq!(session.state, BookingState::Idle);
        assert_eq!(session.retry_count, 0);
        assert!(session.outcome.is_none());
    }
}
