//! Availability API client.
//!
//! A single batched request covers every watched consulate. The response
//! lists per-location slot counts; satellite VAC rows are reported with a
//! `" VAC"` suffix on the location name.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApiConfig, ConsulateConfig};
use crate::error::ApiError;
use crate::monitor::snapshot::{LocationKind, SlotSnapshot};
use crate::pacing::Pacer;

/// Realistic desktop user agents, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Pick a user agent for this process.
pub fn pick_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Source of availability snapshots, one per configured consulate per poll.
#[async_trait]
pub trait AvailabilityApi: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SlotSnapshot>, ApiError>;
}

/// Production client for the checkvisaslots.com v3 endpoint.
pub struct CheckVisaSlotsApi {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    consulates: Vec<ConsulateConfig>,
    /// Shared with the portal driver so polls and browser actions draw
    /// from one request budget.
    pacer: Arc<Pacer>,
}

impl CheckVisaSlotsApi {
    pub fn new(
        config: &ApiConfig,
        api_key: String,
        consulates: Vec<ConsulateConfig>,
        pacer: Arc<Pacer>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(pick_user_agent())
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            consulates,
            pacer,
        }
    }

    fn parse(&self, body: &serde_json::Value) -> Result<Vec<SlotSnapshot>, ApiError> {
        let details = body
            .get("slotDetails")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ApiError::Fatal("response is missing the slotDetails array".to_string())
            })?;

        let observed_at = Utc::now();
        let mut snapshots = Vec::new();

        for consulate in &self.consulates {
            let upper = consulate.name.to_uppercase();
            let vac = format!("{upper} VAC");
            let mut main_count = 0u32;
            let mut vac_count: Option<u32> = None;

            for row in details {
                let location = row.get("visa_location").and_then(|v| v.as_str()).unwrap_or("");
                let count = row
                    .get("slots")
                    .and_then(|v| v.as_u64())
                    .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                    .unwrap_or(0);
                if location.eq_ignore_ascii_case(&upper) {
                    main_count = count;
                } else if location.eq_ignore_ascii_case(&vac) {
                    vac_count = Some(count);
                }
            }

            snapshots.push(SlotSnapshot {
                consulate_id: consulate.id.clone(),
                consulate_name: consulate.name.clone(),
                location_kind: consulate.kind,
                available_count: main_count,
                observed_at,
            });

            // Satellite rows ride along for observability only.
            if let Some(count) = vac_count {
                snapshots.push(SlotSnapshot {
                    consulate_id: format!("{}-vac", consulate.id),
                    consulate_name: format!("{} VAC", consulate.name),
                    location_kind: LocationKind::Satellite,
                    available_count: count,
                    observed_at,
                });
            }
        }

        Ok(snapshots)
    }
}

#[async_trait]
impl AvailabilityApi for CheckVisaSlotsApi {
    async fn fetch(&self) -> Result<Vec<SlotSnapshot>, ApiError> {
        self.pacer.pace().await;
        let response = self
            .client
            .get(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("accept", "*/*")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ApiError::Transient(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ApiError::Fatal(format!("API key rejected: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ApiError::Fatal(format!("unexpected HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Fatal(format!("malformed response body: {e}")))?;
        self.parse(&body)
    }
}
