//! Notification sinks.
//!
//! The core only needs a `send(event) -> delivered | failed` contract;
//! delivery failure is the caller's to log, never to abort on.

pub mod telegram;

pub use telegram::TelegramSink;

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;
use crate::events::Event;

/// Delivers structured availability/booking events to an external
/// channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Tracing-only sink, used when no external channel is configured and in
/// tests.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, event: &Event) -> Result<(), NotifyError> {
        info!(event = ?event, "notification");
        Ok(())
    }
}

/// Render an event as a short human-readable message.
pub fn render_message(event: &Event) -> String {
    match event {
        Event::SlotsOpened {
            consulate_name,
            available_count,
            at,
            ..
        } => format!(
            "VISA SLOTS AVAILABLE!\n{consulate_name}: {available_count} slots\nChecked at: {}",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Event::SlotsClosed { consulate_name, .. } => {
            format!("{consulate_name}: availability is gone")
        }
        Event::BookingFinished {
            consulate_id,
            outcome,
            ..
        } => format!("Booking attempt for consulate {consulate_id}: {outcome}"),
        Event::PollFailed { message, fatal, .. } if *fatal => {
            format!("Monitoring stopped: {message}")
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::LocationKind;
    use chrono::Utc;

    #[test]
    fn renders_opened_event_with_count() {
        let event = Event::SlotsOpened {
            consulate_id: "122".into(),
            consulate_name: "Chennai".into(),
            location_kind: LocationKind::Main,
            available_count: 4,
            at: Utc::now(),
        };
        let message = render_message(&event);
        assert!(message.contains("Chennai"));
        assert!(message.contains("4 slots"));
    }

    #[tokio::test]
    async fn log_sink_always_delivers() {
        let event = Event::SlotsClosed {
            consulate_id: "122".into(),
            consulate_name: "Chennai".into(),
            at: Utc::now(),
        };
        assert!(LogSink.send(&event).await.is_ok());
    }
}
