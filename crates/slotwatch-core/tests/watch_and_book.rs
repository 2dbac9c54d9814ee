//! End-to-end flow: the monitor observes an opening and the booking
//! engine carries the attempt to a terminal state, all against scripted
//! doubles.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use slotwatch_core::booking::{BookingEngine, Portal};
use slotwatch_core::pacing::Pacer;
use slotwatch_core::captcha::{AudioChallenge, PreparedAudio, SolverCascade, SpeechProvider, Transcript};
use slotwatch_core::config::{BookingConfig, PacingConfig};
use slotwatch_core::error::{ApiError, BookingError, ProviderError};
use slotwatch_core::monitor::{AvailabilityApi, LocationKind, SlotMonitor, SlotSnapshot};
use slotwatch_core::store::{Credentials, SecurityAnswerMap};
use slotwatch_core::{BookingOutcome, BookingState, Event};

fn wav_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

struct ScriptedApi {
    counts: Mutex<std::vec::IntoIter<u32>>,
}

impl ScriptedApi {
    fn new(counts: Vec<u32>) -> Self {
        Self {
            counts: Mutex::new(counts.into_iter()),
        }
    }
}

#[async_trait]
impl AvailabilityApi for ScriptedApi {
    async fn fetch(&self) -> Result<Vec<SlotSnapshot>, ApiError> {
        let count = self
            .counts
            .lock()
            .unwrap()
            .next()
            .ok_or_else(|| ApiError::Transient("script exhausted".into()))?;
        Ok(vec![SlotSnapshot {
            consulate_id: "122".into(),
            consulate_name: "Chennai".into(),
            location_kind: LocationKind::Main,
            available_count: count,
            observed_at: Utc::now(),
        }])
    }
}

/// Provider that fails a scripted number of times before transcribing.
struct FlakyProvider {
    failures_left: Mutex<u32>,
}

#[async_trait]
impl SpeechProvider for FlakyProvider {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn transcribe(&self, _audio: &PreparedAudio) -> Result<Transcript, ProviderError> {
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(ProviderError::EmptyTranscript);
        }
        Ok(Transcript {
            text: "three nine one".into(),
            confidence: Some(0.9),
        })
    }
}

#[derive(Default)]
struct ScriptedPortal {
    login_errors: VecDeque<BookingError>,
    login_calls: u32,
    captcha_gated: bool,
    questions: Vec<String>,
}

#[async_trait]
impl Portal for ScriptedPortal {
    async fn login(&mut self, _username: &str, _password: &str) -> Result<(), BookingError> {
        self.login_calls += 1;
        match self.login_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn open_scheduling(&mut self) -> Result<(), BookingError> {
        Ok(())
    }

    async fn select_slot(&mut self, _consulate_id: &str) -> Result<(), BookingError> {
        Ok(())
    }

    async fn captcha_challenge(&mut self) -> Result<Option<AudioChallenge>, BookingError> {
        if self.captcha_gated {
            Ok(Some(AudioChallenge::new(wav_bytes())))
        } else {
            Ok(None)
        }
    }

    async fn submit_captcha(&mut self, _transcript: &str) -> Result<bool, BookingError> {
        Ok(true)
    }

    async fn security_questions(&mut self) -> Result<Vec<String>, BookingError> {
        Ok(self.questions.clone())
    }

    async fn submit_answer(&mut self, _question: &str, _answer: &str) -> Result<(), BookingError> {
        Ok(())
    }

    async fn confirm(&mut self) -> Result<(), BookingError> {
        Ok(())
    }
}

fn quiet_pacer() -> Arc<Pacer> {
    Arc::new(Pacer::with_seed(
        &PacingConfig {
            max_requests: 10_000,
            window_secs: 60,
            min_action_delay_ms: 0,
            max_action_delay_ms: 0,
        },
        99,
    ))
}

fn booking_config() -> BookingConfig {
    BookingConfig {
        max_login_retries: 3,
        max_captcha_retries: 3,
        backoff_base_ms: 0,
        attempt_budget_secs: 30,
        auto_book: true,
    }
}

fn engine(portal: ScriptedPortal, providers: Vec<Box<dyn SpeechProvider>>) -> BookingEngine<ScriptedPortal> {
    let mut answers = SecurityAnswerMap::new();
    answers.insert("What is your mother's maiden name?", "smith");
    BookingEngine::new(
        portal,
        SolverCascade::new(providers, Duration::from_secs(5)),
        Credentials::new("user@example.com", "hunter2"),
        answers,
        quiet_pacer(),
        booking_config(),
    )
}

/// The sequence 0, 0, 3, 3, 0 with a 300s cooldown and 60s polls must
/// notify exactly once, at the first positive observation.
#[tokio::test]
async fn five_poll_sequence_notifies_exactly_once() {
    let api = ScriptedApi::new(vec![0, 0, 3, 3, 0]);
    let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));

    let t0 = Utc::now();
    let mut notifiable_openings = 0;
    for i in 0..5 {
        let report = monitor
            .tick_at(t0 + ChronoDuration::seconds(60 * i))
            .await
            .unwrap();
        notifiable_openings += report
            .events
            .iter()
            .filter(|e| matches!(e, Event::SlotsOpened { .. }) && e.is_notifiable())
            .count();
    }
    assert_eq!(notifiable_openings, 1);
}

/// Opening seen by the monitor, CAPTCHA solved on the third provider
/// attempt (two failures then success, within the retry bound of 3), and
/// the attempt finishes Booked.
#[tokio::test]
async fn opening_flows_through_to_a_booked_attempt() {
    let api = ScriptedApi::new(vec![0, 2]);
    let mut monitor = SlotMonitor::new(api, Duration::from_secs(300));
    let t0 = Utc::now();

    monitor.tick_at(t0).await.unwrap();
    let report = monitor
        .tick_at(t0 + ChronoDuration::seconds(60))
        .await
        .unwrap();
    assert_eq!(report.bookable.len(), 1);
    let snapshot = &report.bookable[0];

    let portal = ScriptedPortal {
        captcha_gated: true,
        questions: vec!["What is your Mother's Maiden Name?".into()],
        ..Default::default()
    };
    let flaky = FlakyProvider {
        failures_left: Mutex::new(2),
    };
    let mut engine = engine(portal, vec![Box::new(flaky)]);
    let attempt = engine.run_attempt(&snapshot.consulate_id).await;

    assert_eq!(attempt.session.state, BookingState::Booked);
    assert!(attempt
        .events
        .iter()
        .any(|e| matches!(e, Event::CaptchaSolved { attempts: 3, .. })));
}

/// With every provider failing on every challenge, the retry bound of 3
/// is hit and the attempt ends Abandoned, never Failed.
#[tokio::test]
async fn unsolvable_captcha_abandons_within_the_bound() {
    let portal = ScriptedPortal {
        captcha_gated: true,
        ..Default::default()
    };
    let flaky = FlakyProvider {
        failures_left: Mutex::new(u32::MAX),
    };
    let mut engine = engine(portal, vec![Box::new(flaky)]);
    let attempt = engine.run_attempt("122").await;

    assert_eq!(attempt.session.state, BookingState::Abandoned);
    assert!(matches!(
        attempt.session.outcome,
        Some(BookingOutcome::Abandoned(_))
    ));
}

/// Credential rejection is never retried; transient failures are retried
/// exactly the configured number of times.
#[tokio::test]
async fn login_retry_policy_distinguishes_auth_from_transient() {
    let portal = ScriptedPortal {
        login_errors: VecDeque::from([BookingError::Auth("rejected".into())]),
        ..Default::default()
    };
    let mut auth_engine = engine(portal, vec![]);
    let attempt = auth_engine.run_attempt("122").await;
    assert_eq!(attempt.session.state, BookingState::Failed);
    assert_eq!(auth_engine.into_portal().login_calls, 1);

    let portal = ScriptedPortal {
        login_errors: (0..5)
            .map(|_| BookingError::Transient("reset".into()))
            .collect(),
        ..Default::default()
    };
    let mut transient_engine = engine(portal, vec![]);
    let attempt = transient_engine.run_attempt("122").await;
    assert_eq!(attempt.session.state, BookingState::Failed);
    assert_eq!(attempt.session.retry_count, 3);
    assert_eq!(transient_engine.into_portal().login_calls, 4);
}
