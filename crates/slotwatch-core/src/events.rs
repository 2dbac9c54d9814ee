use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::BookingOutcome;
use crate::monitor::LocationKind;

/// Every observable state change produces an Event. The notification
/// sink receives a subset of these; the rest exist for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A consulate went from zero to positive availability.
    SlotsOpened {
        consulate_id: String,
        consulate_name: String,
        location_kind: LocationKind,
        available_count: u32,
        at: DateTime<Utc>,
    },
    /// A consulate went from positive availability back to zero.
    SlotsClosed {
        consulate_id: String,
        consulate_name: String,
        at: DateTime<Utc>,
    },
    /// Availability changed without crossing zero (e.g. 5 -> 3).
    SlotCountChanged {
        consulate_id: String,
        consulate_name: String,
        previous_count: u32,
        available_count: u32,
        at: DateTime<Utc>,
    },
    /// An opening was observed inside the cooldown window and the
    /// notification was suppressed.
    NotificationSuppressed {
        consulate_id: String,
        seconds_remaining: u64,
        at: DateTime<Utc>,
    },
    /// A poll cycle failed; the loop decides whether to retry or stop.
    PollFailed {
        message: String,
        fatal: bool,
        at: DateTime<Utc>,
    },
    /// A booking attempt started for a consulate.
    BookingStarted {
        session_id: String,
        consulate_id: String,
        at: DateTime<Utc>,
    },
    /// The cascade produced an accepted transcript.
    CaptchaSolved {
        provider: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
    /// A booking attempt reached a terminal state.
    BookingFinished {
        session_id: String,
        consulate_id: String,
        outcome: BookingOutcome,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Whether this event is worth pushing to the external sink.
    /// Satellite openings and housekeeping events stay local.
    pub fn is_notifiable(&self) -> bool {
        match self {
            Event::SlotsOpened { location_kind, .. } => *location_kind == LocationKind::Main,
            Event::BookingFinished { .. } => true,
            // A fatal poll failure stops the monitor; the operator needs
            // to hear about that.
            Event::PollFailed { fatal, .. } => *fatal,
            _ => false,
        }
    }
}
