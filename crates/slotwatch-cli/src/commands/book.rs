use clap::Subcommand;
use std::sync::Arc;

use slotwatch_core::booking::{AttemptSlot, BookingEngine, ChromiumPortal};
use slotwatch_core::captcha::SolverCascade;
use slotwatch_core::pacing::Pacer;
use slotwatch_core::store::{Credentials, SecurityAnswerMap};
use slotwatch_core::{BookingOutcome, Config};

#[derive(Subcommand)]
pub enum BookAction {
    /// Run one booking attempt against the portal
    Attempt {
        /// Consulate id to book (e.g. "122")
        consulate_id: String,
        /// Portal base URL
        #[arg(long)]
        portal_url: String,
        /// Print the full session record as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: BookAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        BookAction::Attempt {
            consulate_id,
            portal_url,
            json,
        } => attempt(&consulate_id, &portal_url, json),
    }
}

fn attempt(consulate_id: &str, portal_url: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let credentials = Credentials::load()?;
    let answers = SecurityAnswerMap::load()?;
    let slot = AttemptSlot::new();
    let _guard = slot.try_acquire()?;

    let rt = super::runtime()?;
    rt.block_on(async {
        let portal = ChromiumPortal::launch(portal_url).await?;
        let mut engine = BookingEngine::new(
            portal,
            SolverCascade::from_config(&config.captcha),
            credentials,
            answers,
            Arc::new(Pacer::from_config(&config.pacing)),
            config.booking.clone(),
        );

        let report = engine.run_attempt(consulate_id).await;
        engine.into_portal().shutdown().await;

        let sink = super::sink();
        for event in &report.events {
            if event.is_notifiable() {
                if let Err(e) = sink.send(event).await {
                    tracing::warn!(error = %e, "notification delivery failed");
                }
            }
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&report.session)?);
        } else {
            match report.outcome() {
                BookingOutcome::Booked => println!("booked"),
                other => println!("{other}"),
            }
        }

        if matches!(report.outcome(), BookingOutcome::Booked) {
            Ok(())
        } else {
            Err(format!("attempt ended: {}", report.outcome()).into())
        }
    })
}
