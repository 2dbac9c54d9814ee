//! Telegram notification sink -- bot-API `sendMessage` delivery.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::NotifyError;
use crate::events::Event;
use crate::notify::{render_message, NotificationSink};
use crate::store::keyring_store;

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelegramSink {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramSink {
    /// Load bot token and chat id from the OS keyring
    /// (`telegram_bot_token`, `telegram_chat_id`).
    pub fn from_keyring() -> Result<Self, NotifyError> {
        let bot_token = keyring_store::get("telegram_bot_token")
            .ok()
            .flatten()
            .ok_or_else(|| NotifyError::NotConfigured("telegram_bot_token not in keyring".into()))?;
        let chat_id = keyring_store::get("telegram_chat_id")
            .ok()
            .flatten()
            .ok_or_else(|| NotifyError::NotConfigured("telegram_chat_id not in keyring".into()))?;
        Ok(Self::new(TELEGRAM_API, bot_token, chat_id))
    }

    pub fn new(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Persist Telegram settings to the OS keyring.
    pub fn store(bot_token: &str, chat_id: &str) -> Result<(), NotifyError> {
        keyring_store::set("telegram_bot_token", bot_token)
            .and_then(|_| keyring_store::set("telegram_chat_id", chat_id))
            .map_err(|e| NotifyError::Request(e.to_string()))
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, event: &Event) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": render_message(event),
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            })
        }
    }
}
