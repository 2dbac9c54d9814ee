use clap::Subcommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use slotwatch_core::booking::{AttemptSlot, BookingEngine, ChromiumPortal};
use slotwatch_core::captcha::SolverCascade;
use slotwatch_core::monitor::{CheckVisaSlotsApi, SlotMonitor, SlotSnapshot};
use slotwatch_core::pacing::Pacer;
use slotwatch_core::notify::NotificationSink;
use slotwatch_core::store::{Credentials, SecurityAnswerMap};
use slotwatch_core::{BookingOutcome, Config};

#[derive(Subcommand)]
pub enum RunAction {
    /// Monitor continuously and attempt a booking whenever slots open
    Start {
        /// Portal base URL
        #[arg(long)]
        portal_url: String,
        /// Attempt bookings automatically even if the config says not to
        #[arg(long)]
        auto_book: bool,
    },
}

pub fn run(action: RunAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RunAction::Start {
            portal_url,
            auto_book,
        } => start(&portal_url, auto_book),
    }
}

fn start(portal_url: &str, auto_book_flag: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let auto_book = auto_book_flag || config.booking.auto_book;
    let api_key = super::availability_api_key()?;

    if auto_book {
        // Fail fast on booking preconditions before the loop starts.
        Credentials::load()?;
        SecurityAnswerMap::load()?;
    } else {
        info!("auto-book disabled; monitoring and notifying only");
    }

    // One pacer instance: API polls and portal actions share the budget.
    let pacer = Arc::new(Pacer::from_config(&config.pacing));
    let api = CheckVisaSlotsApi::new(
        &config.api,
        api_key,
        config.monitor.consulates.clone(),
        pacer.clone(),
    );
    let mut monitor = SlotMonitor::new(api, Duration::from_secs(config.monitor.cooldown_secs));
    let interval = Duration::from_secs(config.monitor.poll_interval_secs);
    let sink: Arc<dyn NotificationSink> = Arc::from(super::sink());

    let rt = super::runtime()?;
    rt.block_on(async {
        let (tx, rx) = mpsc::channel::<SlotSnapshot>(8);
        let bookable_tx = auto_book.then_some(tx);

        let monitor_sink = sink.clone();
        let monitor_task = tokio::spawn(async move {
            monitor.run(interval, monitor_sink.as_ref(), bookable_tx).await
        });

        if auto_book && booking_loop(rx, portal_url, &config, pacer, sink.clone()).await? {
            monitor_task.abort();
            return Ok(());
        }

        // Monitoring-only, or the bookable channel closed: surface the
        // monitor's own exit reason.
        match monitor_task.await {
            Ok(result) => result.map_err(Into::into),
            Err(e) => Err(e.into()),
        }
    })
}

/// Consumes bookable snapshots, one attempt at a time. Returns `true`
/// once an appointment is booked, `false` when the channel closes first.
async fn booking_loop(
    mut rx: mpsc::Receiver<SlotSnapshot>,
    portal_url: &str,
    config: &Config,
    pacer: Arc<Pacer>,
    sink: Arc<dyn NotificationSink>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let slot = AttemptSlot::new();

    while let Some(snapshot) = rx.recv().await {
        let _guard = match slot.try_acquire() {
            Ok(guard) => guard,
            Err(_) => continue,
        };
        info!(
            consulate = %snapshot.consulate_name,
            count = snapshot.available_count,
            "availability seen, starting booking attempt"
        );

        let portal = match ChromiumPortal::launch(portal_url).await {
            Ok(portal) => portal,
            Err(e) => {
                warn!(error = %e, "browser launch failed, skipping this opening");
                continue;
            }
        };

        let mut engine = BookingEngine::new(
            portal,
            SolverCascade::from_config(&config.captcha),
            Credentials::load()?,
            SecurityAnswerMap::load()?,
            pacer.clone(),
            config.booking.clone(),
        );
        let report = engine.run_attempt(&snapshot.consulate_id).await;
        engine.into_portal().shutdown().await;

        for event in &report.events {
            if event.is_notifiable() {
                if let Err(e) = sink.send(event).await {
                    warn!(error = %e, "notification delivery failed");
                }
            }
        }

        if matches!(report.outcome(), BookingOutcome::Booked) {
            info!(consulate = %snapshot.consulate_name, "booked, stopping");
            return Ok(true);
        }
    }
    Ok(false)
}
