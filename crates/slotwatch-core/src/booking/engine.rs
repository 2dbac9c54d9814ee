//! The booking engine: drives a [`Portal`] through the attempt state
//! machine and classifies every ending as Booked, Failed or Abandoned.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::booking::portal::Portal;
use crate::booking::{BookingOutcome, BookingSession, BookingState};
use crate::captcha::{AudioChallenge, SolverCascade};
use crate::config::BookingConfig;
use crate::error::BookingError;
use crate::events::Event;
use crate::pacing::Pacer;
use crate::store::answers::SecurityAnswerMap;
use crate::store::credentials::Credentials;

/// Everything one finished attempt produced: the terminal session record
/// and the events the caller should forward to its sink.
#[derive(Debug)]
pub struct AttemptReport {
    pub session: BookingSession,
    pub events: Vec<Event>,
}

impl AttemptReport {
    pub fn outcome(&self) -> &BookingOutcome {
        self.session
            .outcome
            .as_ref()
            .expect("finished attempt always carries an outcome")
    }
}

pub struct BookingEngine<P: Portal> {
    portal: P,
    cascade: SolverCascade,
    credentials: Credentials,
    answers: SecurityAnswerMap,
    pacer: Arc<Pacer>,
    config: BookingConfig,
    events: Vec<Event>,
}

impl<P: Portal> BookingEngine<P> {
    pub fn new(
        portal: P,
        cascade: SolverCascade,
        credentials: Credentials,
        answers: SecurityAnswerMap,
        pacer: Arc<Pacer>,
        config: BookingConfig,
    ) -> Self {
        Self {
            portal,
            cascade,
            credentials,
            answers,
            pacer,
            config,
            events: Vec::new(),
        }
    }

    /// Reclaim the portal, e.g. to shut a browser session down cleanly.
    pub fn into_portal(self) -> P {
        self.portal
    }

    /// Run one complete attempt for `consulate_id`. Always returns a
    /// report with a terminal session; errors are folded into the
    /// outcome rather than propagated.
    pub async fn run_attempt(&mut self, consulate_id: &str) -> AttemptReport {
        let mut session = BookingSession::new(consulate_id);
        self.events.clear();
        self.events.push(Event::BookingStarted {
            session_id: session.id.clone(),
            consulate_id: consulate_id.to_string(),
            at: Utc::now(),
        });
        info!(session_id = %session.id, consulate_id, "booking attempt started");

        let budget_secs = self.config.attempt_budget_secs;
        let result = match tokio::time::timeout(
            Duration::from_secs(budget_secs),
            self.drive(&mut session),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BookingError::BudgetExceeded { budget_secs }),
        };

        let outcome = match result {
            Ok(()) => BookingOutcome::Booked,
            Err(err) => {
                session.last_error = Some(err.to_string());
                BookingOutcome::from_error(&err)
            }
        };
        session.state = outcome.state();
        session.outcome = Some(outcome.clone());

        match &outcome {
            BookingOutcome::Booked => {
                info!(session_id = %session.id, consulate_id, "appointment booked")
            }
            other => warn!(session_id = %session.id, consulate_id, outcome = %other, "attempt ended"),
        }

        self.events.push(Event::BookingFinished {
            session_id: session.id.clone(),
            consulate_id: consulate_id.to_string(),
            outcome,
            at: Utc::now(),
        });

        AttemptReport {
            session,
            events: std::mem::take(&mut self.events),
        }
    }

    async fn drive(&mut self, session: &mut BookingSession) -> Result<(), BookingError> {
        self.advance(session, BookingState::LoggingIn);
        self.login_with_retry(session).await?;

        self.advance(session, BookingState::Navigating);
        self.pacer.pace().await;
        self.portal.open_scheduling().await?;

        self.advance(session, BookingState::SelectingSlot);
        self.pacer.pace().await;
        self.portal.select_slot(&session.consulate_id).await?;

        self.pacer.pace().await;
        if let Some(challenge) = self.portal.captcha_challenge().await? {
            self.advance(session, BookingState::SolvingCaptcha);
            self.captcha_gate(challenge).await?;
        }

        self.advance(session, BookingState::AnsweringSecurityQuestions);
        for question in self.portal.security_questions().await? {
            // Never guess: an unknown question ends the attempt.
            let answer = self
                .answers
                .lookup(&question)
                .ok_or_else(|| BookingError::MissingAnswer(question.clone()))?
                .to_string();
            self.pacer.pace().await;
            self.portal.submit_answer(&question, &answer).await?;
        }

        self.advance(session, BookingState::Confirming);
        self.pacer.pace().await;
        self.portal.confirm().await?;
        Ok(())
    }

    /// Login with bounded exponential backoff. Only transient failures
    /// are retried; credential rejection fails immediately.
    async fn login_with_retry(&mut self, session: &mut BookingSession) -> Result<(), BookingError> {
        let max_retries = self.config.max_login_retries;
        loop {
            self.pacer.pace().await;
            let result = self
                .portal
                .login(&self.credentials.username, self.credentials.password())
                .await;
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && session.retry_count < max_retries => {
                    let delay = self
                        .pacer
                        .backoff(self.config.backoff_base_ms, session.retry_count);
                    session.retry_count += 1;
                    warn!(
                        retry = session.retry_count,
                        max_retries,
                        delay = ?delay,
                        error = %err,
                        "login failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Solve-and-submit loop over fresh challenges, bounded by the
    /// configured retry count.
    async fn captcha_gate(&mut self, first: AudioChallenge) -> Result<(), BookingError> {
        let max = self.config.max_captcha_retries.max(1);
        let mut challenge = first;

        for attempt in 1..=max {
            match self.cascade.solve(&challenge).await {
                Ok(solved) => {
                    self.pacer.pace().await;
                    if self.portal.submit_captcha(&solved.transcript.text).await? {
                        self.events.push(Event::CaptchaSolved {
                            provider: solved.provider.to_string(),
                            attempts: attempt,
                            at: Utc::now(),
                        });
                        return Ok(());
                    }
                    warn!(attempt, provider = solved.provider, "portal rejected transcript");
                }
                Err(err) => warn!(attempt, error = %err, "cascade failed on this challenge"),
            }

            if attempt < max {
                self.pacer.pace().await;
                challenge = self.portal.captcha_challenge().await?.ok_or_else(|| {
                    BookingError::PortalChanged("captcha gate disappeared between retries".into())
                })?;
            }
        }

        Err(BookingError::CaptchaExhausted { attempts: max })
    }

    fn advance(&mut self, session: &mut BookingSession, next: BookingState) {
        info!(session_id = %session.id, from = ?session.state, to = ?next, "state change");
        session.state = next;
    }
}
