pub mod auth;
pub mod book;
pub mod config;
pub mod monitor;
pub mod run;

use slotwatch_core::notify::{LogSink, NotificationSink, TelegramSink};
use slotwatch_core::store::keyring_store;

/// Blocking runtime for async commands; the CLI entrypoint stays sync.
pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Telegram sink when configured, otherwise log-only.
pub fn sink() -> Box<dyn NotificationSink> {
    match TelegramSink::from_keyring() {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::info!(reason = %e, "telegram not configured, logging notifications only");
            Box::new(LogSink)
        }
    }
}

/// The availability API key is an init-time precondition for monitoring.
pub fn availability_api_key() -> Result<String, Box<dyn std::error::Error>> {
    keyring_store::get("availability_api_key")?
        .ok_or_else(|| "availability API key not set; run `auth api set --key <KEY>`".into())
}
