//! Portal abstraction.
//!
//! The booking engine drives the appointment portal through this trait
//! so the state machine can be exercised against a scripted double while
//! the real implementation lives in [`crate::booking::browser`].

use async_trait::async_trait;

use crate::captcha::AudioChallenge;
use crate::error::BookingError;

/// One appointment portal session, consumed by a single booking attempt.
#[async_trait]
pub trait Portal: Send {
    /// Authenticate with the portal.
    async fn login(&mut self, username: &str, password: &str) -> Result<(), BookingError>;

    /// Navigate from the landing page to the scheduling page.
    async fn open_scheduling(&mut self) -> Result<(), BookingError>;

    /// Select the first open slot for the given consulate.
    async fn select_slot(&mut self, consulate_id: &str) -> Result<(), BookingError>;

    /// Fetch the current audio challenge, or `None` when this page has no
    /// captcha gate. Calling again after a rejected submission must
    /// return a fresh challenge.
    async fn captcha_challenge(&mut self) -> Result<Option<AudioChallenge>, BookingError>;

    /// Submit a captcha transcript. `Ok(false)` means the portal rejected
    /// the text and a new challenge should be requested.
    async fn submit_captcha(&mut self, transcript: &str) -> Result<bool, BookingError>;

    /// Security questions the portal is asking, in presentation order.
    /// Empty when the portal skipped this step.
    async fn security_questions(&mut self) -> Result<Vec<String>, BookingError>;

    /// Answer one security question.
    async fn submit_answer(&mut self, question: &str, answer: &str) -> Result<(), BookingError>;

    /// Final confirmation click. Fails with [`BookingError::RaceLost`]
    /// when the slot was taken between selection and confirmation.
    async fn confirm(&mut self) -> Result<(), BookingError>;
}
