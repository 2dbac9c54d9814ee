//! CAPTCHA solver cascade.
//!
//! Providers are tried in a fixed priority order: free recognition
//! backends first, the paid fallback last. Each provider gets exactly one
//! timeout-wrapped attempt per challenge so total wall-clock time stays
//! bounded; the first accepted transcript short-circuits the chain.

pub mod audio;
pub mod provider;

pub use audio::{prepare, AudioChallenge, AudioFormat, PreparedAudio};
pub use provider::{GoogleSpeech, SpeechProvider, Transcript, TwoCaptcha, WitAi};

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CaptchaConfig;
use crate::error::SolveError;

/// Record of one cascade run. Ephemeral: created per challenge, dropped
/// after use, never persisted (the payload is biometric-adjacent).
#[derive(Debug, Clone)]
pub struct CaptchaAttempt {
    pub providers_tried: Vec<&'static str>,
    pub transcript: Option<Transcript>,
    pub succeeded: bool,
}

/// A successful cascade run: the accepted transcript and which provider
/// produced it.
#[derive(Debug, Clone)]
pub struct Solved {
    pub transcript: Transcript,
    pub provider: &'static str,
}

/// Ordered fallback chain over interchangeable recognition backends.
pub struct SolverCascade {
    providers: Vec<Box<dyn SpeechProvider>>,
    provider_timeout: Duration,
}

impl SolverCascade {
    pub fn new(providers: Vec<Box<dyn SpeechProvider>>, provider_timeout: Duration) -> Self {
        Self {
            providers,
            provider_timeout,
        }
    }

    /// Build the production chain: free services first, the paid
    /// fallback only when enabled.
    pub fn from_config(config: &CaptchaConfig) -> Self {
        let mut providers: Vec<Box<dyn SpeechProvider>> =
            vec![Box::new(GoogleSpeech::new()), Box::new(WitAi::new())];
        if config.paid_fallback {
            providers.push(Box::new(TwoCaptcha::new()));
        }
        Self::new(providers, Duration::from_secs(config.provider_timeout_secs))
    }

    /// Run the cascade over one challenge. Preprocessing failure is fatal
    /// for the whole run ([`SolveError::BadAudio`]); provider exhaustion
    /// is [`SolveError::AllProvidersFailed`].
    pub async fn solve(&self, challenge: &AudioChallenge) -> Result<Solved, SolveError> {
        let prepared = audio::prepare(challenge)?;
        let mut attempt = CaptchaAttempt {
            providers_tried: Vec::new(),
            transcript: None,
            succeeded: false,
        };

        for provider in &self.providers {
            attempt.providers_tried.push(provider.name());
            debug!(provider = provider.name(), "trying provider");

            let result =
                tokio::time::timeout(self.provider_timeout, provider.transcribe(&prepared)).await;

            match result {
                Ok(Ok(transcript)) => {
                    info!(
                        provider = provider.name(),
                        text = %transcript.text,
                        "transcription accepted"
                    );
                    attempt.transcript = Some(transcript.clone());
                    attempt.succeeded = true;
                    return Ok(Solved {
                        transcript,
                        provider: provider.name(),
                    });
                }
                Ok(Err(e)) => {
                    // One attempt per provider; advance rather than retry.
                    warn!(provider = provider.name(), error = %e, "provider failed");
                }
                Err(_) => {
                    warn!(
                        provider = provider.name(),
                        timeout = ?self.provider_timeout,
                        "provider timed out"
                    );
                }
            }
        }

        Err(SolveError::AllProvidersFailed {
            tried: attempt
                .providers_tried
                .iter()
                .map(|n| n.to_string())
                .collect(),
        })
    }
}
