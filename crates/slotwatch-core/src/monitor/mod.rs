//! Slot monitor -- polls the availability API, detects edges and gates
//! notifications behind a per-consulate cooldown.
//!
//! The monitor owns all of its state (previous snapshots, last-notified
//! timestamps); nothing lives in module globals, so tests can run several
//! independent monitors side by side.

pub mod api;
mod snapshot;

pub use api::{AvailabilityApi, CheckVisaSlotsApi};
pub use snapshot::{LocationKind, SlotSnapshot, Transition};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::Event;
use crate::notify::NotificationSink;

/// Outcome of one poll cycle.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Events produced this cycle, already cooldown-gated.
    pub events: Vec<Event>,
    /// Main-location snapshots with any positive count, forwarded every
    /// cycle so an idle booking engine can act immediately.
    pub bookable: Vec<SlotSnapshot>,
}

/// Watches availability for the configured consulates.
pub struct SlotMonitor<A: AvailabilityApi> {
    api: A,
    cooldown: ChronoDuration,
    previous: HashMap<String, SlotSnapshot>,
    last_notified: HashMap<String, DateTime<Utc>>,
}

impl<A: AvailabilityApi> SlotMonitor<A> {
    pub fn new(api: A, cooldown: Duration) -> Self {
        Self {
            api,
            cooldown: ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::seconds(300)),
            previous: HashMap::new(),
            last_notified: HashMap::new(),
        }
    }

    /// Run one poll cycle against the wall clock.
    pub async fn tick(&mut self) -> Result<TickReport, ApiError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one poll cycle, with the decision clock supplied by the caller.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport, ApiError> {
        let snapshots = self.api.fetch().await?;
        let mut report = TickReport::default();

        for snapshot in snapshots {
            let transition = Transition::between(self.previous.get(&snapshot.consulate_id), &snapshot);
            match transition {
                Transition::Opened => self.on_opened(&snapshot, now, &mut report),
                Transition::Closed => {
                    debug!(consulate = %snapshot.consulate_name, "availability closed");
                    report.events.push(Event::SlotsClosed {
                        consulate_id: snapshot.consulate_id.clone(),
                        consulate_name: snapshot.consulate_name.clone(),
                        at: now,
                    });
                }
                Transition::CountChanged => {
                    let previous_count = self
                        .previous
                        .get(&snapshot.consulate_id)
                        .map(|s| s.available_count)
                        .unwrap_or(0);
                    report.events.push(Event::SlotCountChanged {
                        consulate_id: snapshot.consulate_id.clone(),
                        consulate_name: snapshot.consulate_name.clone(),
                        previous_count,
                        available_count: snapshot.available_count,
                        at: now,
                    });
                }
                Transition::Unchanged => {}
            }

            // Any positive main-location count is a booking trigger,
            // regardless of which edge (if any) was crossed.
            if snapshot.has_availability() && snapshot.location_kind == LocationKind::Main {
                report.bookable.push(snapshot.clone());
            }

            self.previous.insert(snapshot.consulate_id.clone(), snapshot);
        }

        Ok(report)
    }

    fn on_opened(&mut self, snapshot: &SlotSnapshot, now: DateTime<Utc>, report: &mut TickReport) {
        info!(
            consulate = %snapshot.consulate_name,
            count = snapshot.available_count,
            kind = ?snapshot.location_kind,
            "availability opened"
        );

        if snapshot.location_kind == LocationKind::Satellite {
            // Recorded for observability; satellite locations never notify.
            report.events.push(Event::SlotsOpened {
                consulate_id: snapshot.consulate_id.clone(),
                consulate_name: snapshot.consulate_name.clone(),
                location_kind: snapshot.location_kind,
                available_count: snapshot.available_count,
                at: now,
            });
            return;
        }

        // Cooldown check-and-update is atomic here because a single
        // monitor instance owns this map; ticks never race themselves.
        if let Some(last) = self.last_notified.get(&snapshot.consulate_id) {
            let elapsed = now - *last;
            if elapsed < self.cooldown {
                let remaining = (self.cooldown - elapsed).num_seconds().max(0) as u64;
                debug!(
                    consulate = %snapshot.consulate_name,
                    remaining_secs = remaining,
                    "notification suppressed by cooldown"
                );
                report.events.push(Event::NotificationSuppressed {
                    consulate_id: snapshot.consulate_id.clone(),
                    seconds_remaining: remaining,
                    at: now,
                });
                return;
            }
        }

        self.last_notified.insert(snapshot.consulate_id.clone(), now);
        report.events.push(Event::SlotsOpened {
            consulate_id: snapshot.consulate_id.clone(),
            consulate_name: snapshot.consulate_name.clone(),
            location_kind: snapshot.location_kind,
            available_count: snapshot.available_count,
            at: now,
        });
    }

    /// Continuous polling loop. Transient API failures back off and
    /// continue; a fatal failure stops the loop and surfaces to the
    /// caller. Sink failures are logged and never abort the loop.
    ///
    /// When `bookable_tx` is given, positive main-location snapshots are
    /// forwarded there each cycle; a full or closed channel drops them
    /// (the next cycle will re-forward while availability lasts).
    pub async fn run(
        &mut self,
        interval: Duration,
        sink: &dyn NotificationSink,
        bookable_tx: Option<mpsc::Sender<SlotSnapshot>>,
    ) -> Result<(), ApiError> {
        let mut consecutive_failures = 0u32;
        loop {
            match self.tick().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    for event in &report.events {
                        if event.is_notifiable() {
                            if let Err(e) = sink.send(event).await {
                                warn!(error = %e, "notification delivery failed");
                            }
                        }
                    }
                    if let Some(tx) = &bookable_tx {
                        for snapshot in report.bookable {
                            let _ = tx.try_send(snapshot);
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "availability API failed fatally, stopping monitor");
                    let event = Event::PollFailed {
                        message: e.to_string(),
                        fatal: true,
                        at: Utc::now(),
                    };
                    if let Err(send_err) = sink.send(&event).await {
                        warn!(error = %send_err, "could not deliver the stop notification");
                    }
                    return Err(e);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, failures = consecutive_failures, "poll failed, will retry");
                }
            }

            tokio::time::sleep(backoff_interval(interval, consecutive_failures)).await;
        }
    }
}

/// Poll delay after `failures` consecutive transient failures: the base
/// interval doubled per failure, capped at eight times the base.
fn backoff_interval(base: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return base;
    }
    let factor = 2u32.saturating_pow(failures.min(3));
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted API double: returns one batch of snapshots per tick.
    struct ScriptedApi {
        batches: Mutex<std::vec::IntoIter<Vec<SlotSnapshot>>>,
    }

    impl ScriptedApi {
        fn new(batches: Vec<Vec<SlotSnapshot>>) -> Self {
            Self {
                batches: Mutex::new(batches.into_iter()),
            }
        }
    }

    #[async_trait]
    impl AvailabilityApi for ScriptedApi {
        async fn fetch(&self) -> Result<Vec<SlotSnapshot>, ApiError> {
            self.batches
                .lock()
                .unwrap()
                .next()
                .ok_or_else(|| ApiError::Transient("script exhausted".into()))
        }
    }

    fn snap(id: &str, kind: LocationKind, count: u32) -> SlotSnapshot {
        SlotSnapshot {
            consulate_id: id.into(),
            consulate_name: format!("Consulate {id}"),
            location_kind: kind,
            available_count: count,
            observed_at: Utc::now(),
        }
    }

    fn opened_events(report: &TickReport) -> usize {
        report
            .events
            .iter()
            .filter(|e| matches!(e, Event::SlotsOpened { .. }) && e.is_notifiable())
            .count()
    }

    #[tokio::test]
    async fn zero_to_zero_never_notifies() {
        let api = ScriptedApi::new(vec![
            vec![snap("122", LocationKind::Main, 0)],
            vec![snap("122", LocationKind::Main, 0)],
        ]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
        let now = Utc::now();
        assert_eq!(opened_events(&monitor.tick_at(now).await.unwrap()), 0);
        assert_eq!(
            opened_events(&monitor.tick_at(now + ChronoDuration::seconds(60)).await.unwrap()),
            0
        );
    }

    #[tokio::test]
    async fn opening_notifies_once_within_cooldown() {
        let api = ScriptedApi::new(vec![
            vec![snap("122", LocationKind::Main, 0)],
            vec![snap("122", LocationKind::Main, 3)],
            vec![snap("122", LocationKind::Main, 0)],
            vec![snap("122", LocationKind::Main, 2)],
        ]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
        let t0 = Utc::now();

        assert_eq!(opened_events(&monitor.tick_at(t0).await.unwrap()), 0);
        let second = monitor.tick_at(t0 + ChronoDuration::seconds(60)).await.unwrap();
        assert_eq!(opened_events(&second), 1);
        // Close and re-open 120s later, still inside the 300s cooldown.
        monitor.tick_at(t0 + ChronoDuration::seconds(120)).await.unwrap();
        let fourth = monitor.tick_at(t0 + ChronoDuration::seconds(180)).await.unwrap();
        assert_eq!(opened_events(&fourth), 0);
        assert!(fourth
            .events
            .iter()
            .any(|e| matches!(e, Event::NotificationSuppressed { .. })));
        // The suppressed opening is still a booking trigger.
        assert_eq!(fourth.bookable.len(), 1);
    }

    #[tokio::test]
    async fn reopening_after_cooldown_notifies_again() {
        let api = ScriptedApi::new(vec![
            vec![snap("122", LocationKind::Main, 4)],
            vec![snap("122", LocationKind::Main, 0)],
            vec![snap("122", LocationKind::Main, 1)],
        ]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
        let t0 = Utc::now();

        assert_eq!(opened_events(&monitor.tick_at(t0).await.unwrap()), 1);
        monitor.tick_at(t0 + ChronoDuration::seconds(200)).await.unwrap();
        let reopened = monitor.tick_at(t0 + ChronoDuration::seconds(400)).await.unwrap();
        assert_eq!(opened_events(&reopened), 1);
    }

    #[tokio::test]
    async fn satellite_openings_are_recorded_but_not_notifiable() {
        let api = ScriptedApi::new(vec![vec![snap("122-vac", LocationKind::Satellite, 9)]]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
        let report = monitor.tick_at(Utc::now()).await.unwrap();

        assert_eq!(report.events.len(), 1);
        assert!(!report.events[0].is_notifiable());
        assert!(report.bookable.is_empty());
    }

    #[tokio::test]
    async fn cooldown_is_per_consulate() {
        let api = ScriptedApi::new(vec![vec![
            snap("122", LocationKind::Main, 2),
            snap("125", LocationKind::Main, 7),
        ]]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
        let report = monitor.tick_at(Utc::now()).await.unwrap();
        assert_eq!(opened_events(&report), 2);
        assert_eq!(report.bookable.len(), 2);
    }

    #[tokio::test]
    async fn count_decrease_without_zero_does_not_reopen() {
        let api = ScriptedApi::new(vec![
            vec![snap("122", LocationKind::Main, 5)],
            vec![snap("122", LocationKind::Main, 3)],
            vec![snap("122", LocationKind::Main, 5)],
        ]);
        let mut monitor = SlotMonitor::new(api, Duration::from_secs(0));
        let t0 = Utc::now();

        assert_eq!(opened_events(&monitor.tick_at(t0).await.unwrap()), 1);
        let dip = monitor.tick_at(t0 + ChronoDuration::seconds(60)).await.unwrap();
        assert_eq!(opened_events(&dip), 0);
        assert!(dip
            .events
            .iter()
            .any(|e| matches!(e, Event::SlotCountChanged { .. })));
        // Still forwarded to the booking trigger.
        assert_eq!(dip.bookable.len(), 1);
        let recover = monitor.tick_at(t0 + ChronoDuration::seconds(120)).await.unwrap();
        assert_eq!(opened_events(&recover), 0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(60);
        assert_eq!(backoff_interval(base, 0), base);
        assert_eq!(backoff_interval(base, 1), Duration::from_secs(120));
        assert_eq!(backoff_interval(base, 2), Duration::from_secs(240));
        assert_eq!(backoff_interval(base, 3), Duration::from_secs(480));
        assert_eq!(backoff_interval(base, 10), Duration::from_secs(480));
    }
}
