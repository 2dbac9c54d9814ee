//! Speech-recognition providers.
//!
//! Each provider is an independent backend behind the same trait so the
//! cascade can treat them interchangeably and tests can substitute
//! doubles. Credentials come from the OS keyring, looked up at
//! construction time; an unconfigured provider fails its attempt and the
//! cascade moves on.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::captcha::audio::PreparedAudio;
use crate::error::ProviderError;
use crate::store::keyring_store;

const GOOGLE_ENDPOINT: &str = "http://www.google.com/speech-api/v2/recognize";
const WIT_ENDPOINT: &str = "https://api.wit.ai/speech";
const TWOCAPTCHA_BASE: &str = "http://2captcha.com";

/// A best-effort transcription of an audio challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Transcript {
    fn checked(text: String, confidence: Option<f32>) -> Result<Self, ProviderError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::EmptyTranscript);
        }
        Ok(Self { text, confidence })
    }
}

/// One recognition backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Unique identifier (e.g. "google", "wit", "2captcha").
    fn name(&self) -> &'static str;

    /// One attempt at transcribing the prepared audio. The cascade never
    /// retries the same provider within a challenge.
    async fn transcribe(&self, audio: &PreparedAudio) -> Result<Transcript, ProviderError>;
}

/// Google's free web speech endpoint.
pub struct GoogleSpeech {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GoogleSpeech {
    /// Load the API key from the OS keyring (`google_speech_key`).
    pub fn new() -> Self {
        let api_key = keyring_store::get("google_speech_key").ok().flatten();
        Self {
            client: Client::new(),
            endpoint: GOOGLE_ENDPOINT.to_string(),
            api_key,
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
        }
    }
}

impl Default for GoogleSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechProvider for GoogleSpeech {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn transcribe(&self, audio: &PreparedAudio) -> Result<Transcript, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("google_speech_key not in keyring".into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("client", "chromium"), ("lang", "en-US"), ("key", key)])
            .header("content-type", audio.format.mime())
            .body(audio.bytes.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("HTTP {}", response.status())));
        }

        // The endpoint streams one JSON object per line; the last
        // non-empty result carries the transcript.
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let mut best: Option<(String, Option<f32>)> = None;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Some(alt) = value
                .get("result")
                .and_then(|r| r.get(0))
                .and_then(|r| r.get("alternative"))
                .and_then(|a| a.get(0))
            {
                let text = alt.get("transcript").and_then(|t| t.as_str());
                let confidence = alt.get("confidence").and_then(|c| c.as_f64()).map(|c| c as f32);
                if let Some(text) = text {
                    best = Some((text.to_string(), confidence));
                }
            }
        }

        match best {
            Some((text, confidence)) => Transcript::checked(text, confidence),
            None => Err(ProviderError::EmptyTranscript),
        }
    }
}

/// Wit.ai speech endpoint (free tier, bearer token).
pub struct WitAi {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl WitAi {
    /// Load the bearer token from the OS keyring (`wit_ai_token`).
    pub fn new() -> Self {
        let token = keyring_store::get("wit_ai_token").ok().flatten();
        Self {
            client: Client::new(),
            endpoint: WIT_ENDPOINT.to_string(),
            token,
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            token: Some(token.into()),
        }
    }
}

impl Default for WitAi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechProvider for WitAi {
    fn name(&self) -> &'static str {
        "wit"
    }

    async fn transcribe(&self, audio: &PreparedAudio) -> Result<Transcript, ProviderError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("wit_ai_token not in keyring".into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header("content-type", audio.format.mime())
            .body(audio.bytes.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("HTTP {}", response.status())));
        }

        // Wit streams partial results as concatenated JSON objects; the
        // final object's "text" is the full transcript.
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let mut last_text: Option<String> = None;
        let stream = serde_json::Deserializer::from_str(&body).into_iter::<serde_json::Value>();
        for value in stream.flatten() {
            if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                last_text = Some(text.to_string());
            }
        }

        match last_text {
            Some(text) => Transcript::checked(text, None),
            None => Err(ProviderError::EmptyTranscript),
        }
    }
}

/// Paid 2captcha fallback: submit the audio, then poll for a human/ML
/// transcription. Reserved for when the free providers fail, to bound cost.
pub struct TwoCaptcha {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

impl TwoCaptcha {
    /// Load the API key from the OS keyring (`twocaptcha_api_key`).
    pub fn new() -> Self {
        let api_key = keyring_store::get("twocaptcha_api_key").ok().flatten();
        Self {
            client: Client::new(),
            base_url: TWOCAPTCHA_BASE.to_string(),
            api_key,
            poll_interval: Duration::from_secs(5),
            max_polls: 12,
        }
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: Some(api_key.into()),
            poll_interval,
            max_polls,
        }
    }
}

impl Default for TwoCaptcha {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechProvider for TwoCaptcha {
    fn name(&self) -> &'static str {
        "2captcha"
    }

    async fn transcribe(&self, audio: &PreparedAudio) -> Result<Transcript, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("twocaptcha_api_key not in keyring".into()))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio.bytes);
        let submit: serde_json::Value = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&[
                ("key", key),
                ("method", "audio"),
                ("body", encoded.as_str()),
                ("lang", "en"),
                ("json", "1"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if submit.get("status").and_then(|s| s.as_i64()) != Some(1) {
            return Err(ProviderError::Request(format!("submission rejected: {submit}")));
        }
        let task_id = submit
            .get("request")
            .and_then(|r| r.as_str())
            .ok_or(ProviderError::EmptyTranscript)?
            .to_string();
        debug!(task_id = %task_id, "2captcha task submitted");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let result: serde_json::Value = self
                .client
                .get(format!("{}/res.php", self.base_url))
                .query(&[
                    ("key", key),
                    ("action", "get"),
                    ("id", task_id.as_str()),
                    ("json", "1"),
                ])
                .send()
                .await
                .map_err(|e| ProviderError::Request(e.to_string()))?
                .json()
                .await
                .map_err(|e| ProviderError::Request(e.to_string()))?;

            match result.get("status").and_then(|s| s.as_i64()) {
                Some(1) => {
                    let text = result
                        .get("request")
                        .and_then(|r| r.as_str())
                        .unwrap_or_default()
                        .to_string();
                    return Transcript::checked(text, None);
                }
                _ => {
                    let pending = result
                        .get("request")
                        .and_then(|r| r.as_str())
                        .unwrap_or_default();
                    if pending != "CAPCHA_NOT_READY" {
                        return Err(ProviderError::Request(format!("2captcha error: {pending}")));
                    }
                }
            }
        }

        Err(ProviderError::Timeout(
            self.poll_interval * self.max_polls,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::audio::{prepare, wav_fixture, AudioChallenge};

    fn prepared() -> PreparedAudio {
        prepare(&AudioChallenge::new(wav_fixture())).unwrap()
    }

    #[test]
    fn blank_transcript_is_a_failure() {
        assert!(matches!(
            Transcript::checked("   ".into(), None),
            Err(ProviderError::EmptyTranscript)
        ));
    }

    #[tokio::test]
    async fn google_parses_streamed_result_lines() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/recognize")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "k".into()))
            .with_status(200)
            .with_body(
                "{\"result\":[]}\n{\"result\":[{\"alternative\":[{\"transcript\":\"seven three one\",\"confidence\":0.91}],\"final\":true}],\"result_index\":0}\n",
            )
            .create_async()
            .await;

        let provider = GoogleSpeech::with_endpoint(format!("{}/recognize", server.url()), "k");
        let transcript = provider.transcribe(&prepared()).await.unwrap();
        assert_eq!(transcript.text, "seven three one");
        assert!(transcript.confidence.unwrap() > 0.9);
    }

    #[tokio::test]
    async fn google_without_key_is_not_configured() {
        let provider = GoogleSpeech {
            client: Client::new(),
            endpoint: "http://localhost/unused".into(),
            api_key: None,
        };
        assert!(matches!(
            provider.transcribe(&prepared()).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn wit_takes_the_final_streamed_text() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/speech")
            .with_status(200)
            .with_body(r#"{"text":"seven"} {"text":"seven three"} {"text":"seven three one"}"#)
            .create_async()
            .await;

        let provider = WitAi::with_endpoint(format!("{}/speech", server.url()), "token");
        let transcript = provider.transcribe(&prepared()).await.unwrap();
        assert_eq!(transcript.text, "seven three one");
    }

    #[tokio::test]
    async fn twocaptcha_submits_then_polls() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/in.php")
            .with_status(200)
            .with_body(r#"{"status":1,"request":"42"}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/res.php")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "42".into()))
            .with_status(200)
            .with_body(r#"{"status":1,"request":"nine one five"}"#)
            .create_async()
            .await;

        let provider =
            TwoCaptcha::with_base_url(server.url(), "key", Duration::from_millis(1), 3);
        let transcript = provider.transcribe(&prepared()).await.unwrap();
        assert_eq!(transcript.text, "nine one five");
    }

    #[tokio::test]
    async fn twocaptcha_gives_up_after_max_polls() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/in.php")
            .with_status(200)
            .with_body(r#"{"status":1,"request":"42"}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/res.php")
            .with_status(200)
            .with_body(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#)
            .expect(2)
            .create_async()
            .await;

        let provider =
            TwoCaptcha::with_base_url(server.url(), "key", Duration::from_millis(1), 2);
        assert!(matches!(
            provider.transcribe(&prepared()).await,
            Err(ProviderError::Timeout(_))
        ));
    }
}
