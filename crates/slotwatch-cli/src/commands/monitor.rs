use clap::Subcommand;
use std::sync::Arc;
use std::time::Duration;

use slotwatch_core::monitor::{CheckVisaSlotsApi, SlotMonitor};
use slotwatch_core::pacing::Pacer;
use slotwatch_core::Config;

#[derive(Subcommand)]
pub enum MonitorAction {
    /// Poll continuously and push notifications
    Start,
    /// Run a single poll cycle and print the events as JSON
    Once,
}

pub fn run(action: MonitorAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let api_key = super::availability_api_key()?;
    let pacer = Arc::new(Pacer::from_config(&config.pacing));
    let api = CheckVisaSlotsApi::new(&config.api, api_key, config.monitor.consulates.clone(), pacer);
    let mut monitor = SlotMonitor::new(api, Duration::from_secs(config.monitor.cooldown_secs));

    let rt = super::runtime()?;
    match action {
        MonitorAction::Start => {
            let sink = super::sink();
            let interval = Duration::from_secs(config.monitor.poll_interval_secs);
            rt.block_on(monitor.run(interval, sink.as_ref(), None))?;
            Ok(())
        }
        MonitorAction::Once => {
            let report = rt.block_on(monitor.tick())?;
            println!("{}", serde_json::to_string_pretty(&report.events)?);
            Ok(())
        }
    }
}
