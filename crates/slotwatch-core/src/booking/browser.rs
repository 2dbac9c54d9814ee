//! Headless-browser portal driver built on chromiumoxide.
//!
//! Selectors live in one struct so a portal markup change is a one-place
//! fix. Every "element should be here" miss maps to
//! [`BookingError::PortalChanged`]; CDP/transport failures map to
//! [`BookingError::Transient`].

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::booking::portal::Portal;
use crate::captcha::AudioChallenge;
use crate::error::BookingError;

const ELEMENT_WAIT: Duration = Duration::from_secs(10);
const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// CSS selectors for the appointment portal, the volatile part of the
/// driver.
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    pub username_input: String,
    pub password_input: String,
    pub login_button: String,
    pub login_error: String,
    pub scheduling_link: String,
    pub slot_button: String,
    pub captcha_audio_link: String,
    pub captcha_input: String,
    pub captcha_submit: String,
    pub captcha_error: String,
    pub question_label: String,
    pub answer_input: String,
    pub answer_submit: String,
    pub confirm_button: String,
    pub confirmation_banner: String,
    pub race_banner: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username_input: "input#username".into(),
            password_input: "input#password".into(),
            login_button: "button[type='submit']".into(),
            login_error: ".login-error, .alert-danger".into(),
            scheduling_link: "a[href*='schedule']".into(),
            // {id} is replaced with the consulate id at selection time.
            slot_button: "button.slot[data-consulate='{id}']".into(),
            captcha_audio_link: "a.captcha-audio[href]".into(),
            captcha_input: "input#captcha-response".into(),
            captcha_submit: "button#captcha-verify".into(),
            captcha_error: ".captcha-error".into(),
            question_label: "label.security-question".into(),
            answer_input: "input.security-answer".into(),
            answer_submit: "button#answers-submit".into(),
            confirm_button: "button#confirm-appointment".into(),
            confirmation_banner: ".confirmation-success".into(),
            race_banner: ".slot-unavailable".into(),
        }
    }
}

pub struct ChromiumPortal {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    http: reqwest::Client,
    base_url: String,
    selectors: PortalSelectors,
    answered: usize,
}

impl ChromiumPortal {
    /// Launch a headless browser session pointed at `base_url`.
    pub async fn launch(base_url: impl Into<String>) -> Result<Self, BookingError> {
        Self::launch_with(base_url, PortalSelectors::default()).await
    }

    pub async fn launch_with(
        base_url: impl Into<String>,
        selectors: PortalSelectors,
    ) -> Result<Self, BookingError> {
        let config = BrowserConfig::builder()
            .window_size(1366, 768)
            .arg(format!(
                "--user-agent={}",
                crate::monitor::api::pick_user_agent()
            ))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--disable-infobars")
            .build()
            .map_err(BookingError::Transient)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;

        // Drive the CDP event stream until the browser goes away.
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler,
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            selectors,
            answered: 0,
        })
    }

    /// Close the browser and stop the event pump.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        self.handler.abort();
    }

    async fn goto(&self, path: &str) -> Result<(), BookingError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Poll for an element until it appears or the wait elapses.
    async fn wait_for(&self, selector: &str) -> Result<Element, BookingError> {
        let deadline = Instant::now() + ELEMENT_WAIT;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(BookingError::PortalChanged(format!(
                    "element {selector:?} did not appear"
                )));
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }

    async fn is_present(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), BookingError> {
        let element = self.wait_for(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BookingError> {
        self.wait_for(selector)
            .await?
            .click()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Portal for ChromiumPortal {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), BookingError> {
        self.goto("/login").await?;
        self.type_into(&self.selectors.username_input, username)
            .await?;
        self.type_into(&self.selectors.password_input, password)
            .await?;
        self.click(&self.selectors.login_button).await?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;

        if self.is_present(&self.selectors.login_error).await {
            return Err(BookingError::Auth("portal rejected the login form".into()));
        }
        Ok(())
    }

    async fn open_scheduling(&mut self) -> Result<(), BookingError> {
        self.click(&self.selectors.scheduling_link).await?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn select_slot(&mut self, consulate_id: &str) -> Result<(), BookingError> {
        let selector = self.selectors.slot_button.replace("{id}", consulate_id);
        self.click(&selector).await
    }

    async fn captcha_challenge(&mut self) -> Result<Option<AudioChallenge>, BookingError> {
        if !self.is_present(&self.selectors.captcha_audio_link).await {
            return Ok(None);
        }
        let link = self.wait_for(&self.selectors.captcha_audio_link).await?;
        let href = link
            .attribute("href")
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?
            .ok_or_else(|| {
                BookingError::PortalChanged("captcha audio link has no href".into())
            })?;

        let url = if href.starts_with("http") {
            href
        } else {
            format!("{}{}", self.base_url, href)
        };
        debug!(%url, "fetching captcha audio");
        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BookingError::Transient(e.to_string()))?
            .bytes()
            .await?;

        Ok(Some(AudioChallenge::with_source(bytes.to_vec(), url)))
    }

    async fn submit_captcha(&mut self, transcript: &str) -> Result<bool, BookingError> {
        self.type_into(&self.selectors.captcha_input, transcript)
            .await?;
        self.click(&self.selectors.captcha_submit).await?;
        Ok(!self.is_present(&self.selectors.captcha_error).await)
    }

    async fn security_questions(&mut self) -> Result<Vec<String>, BookingError> {
        self.answered = 0;
        let labels = self
            .page
            .find_elements(&self.selectors.question_label)
            .await
            .unwrap_or_default();

        let mut questions = Vec::with_capacity(labels.len());
        for label in labels {
            let text = label
                .inner_text()
                .await
                .map_err(|e| BookingError::Transient(e.to_string()))?
                .unwrap_or_default();
            if !text.trim().is_empty() {
                questions.push(text);
            }
        }
        Ok(questions)
    }

    async fn submit_answer(&mut self, question: &str, answer: &str) -> Result<(), BookingError> {
        // Answer inputs are positional: the nth input follows the nth label.
        let inputs = self
            .page
            .find_elements(&self.selectors.answer_input)
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        let input = inputs.get(self.answered).ok_or_else(|| {
            BookingError::PortalChanged(format!("no answer input for question {question:?}"))
        })?;
        input
            .click()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        input
            .type_str(answer)
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;
        self.answered += 1;

        // Submit once the last question is answered.
        if self.answered == inputs.len() {
            self.click(&self.selectors.answer_submit).await?;
        }
        Ok(())
    }

    async fn confirm(&mut self) -> Result<(), BookingError> {
        self.click(&self.selectors.confirm_button).await?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| BookingError::Transient(e.to_string()))?;

        if self.is_present(&self.selectors.race_banner).await {
            return Err(BookingError::RaceLost(
                "slot no longer available at confirmation".into(),
            ));
        }
        if self.is_present(&self.selectors.confirmation_banner).await {
            return Ok(());
        }
        Err(BookingError::PortalChanged(
            "confirmation page shows neither success nor race banner".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_selector_is_parameterized_by_consulate() {
        let selectors = PortalSelectors::default();
        let resolved = selectors.slot_button.replace("{id}", "122");
        assert_eq!(resolved, "button.slot[data-consulate='122']");
    }
}
