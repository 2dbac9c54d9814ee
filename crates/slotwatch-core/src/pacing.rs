//! Request pacing.
//!
//! A process-wide sliding-window rate limiter keeps the aggregate request
//! rate under a safe threshold, and randomized inter-action delays make
//! browser interactions look less mechanical. Both the API poller and the
//! portal driver go through the same pacer.

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::PacingConfig;

pub struct Pacer {
    max_requests: usize,
    window: Duration,
    delay_ms: (u64, u64),
    requests: Mutex<VecDeque<Instant>>,
    rng: Mutex<Mcg128Xsl64>,
}

impl Pacer {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self::build(config, Mcg128Xsl64::from_entropy())
    }

    /// Deterministic pacer for reproducible runs and tests.
    pub fn with_seed(config: &PacingConfig, seed: u64) -> Self {
        Self::build(config, Mcg128Xsl64::seed_from_u64(seed))
    }

    fn build(config: &PacingConfig, rng: Mcg128Xsl64) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            delay_ms: (config.min_action_delay_ms, config.max_action_delay_ms),
            requests: Mutex::new(VecDeque::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Wait until the rate budget admits one more request, then apply a
    /// randomized inter-action delay. Call before every external action.
    pub async fn pace(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().unwrap();
                let now = Instant::now();
                while let Some(oldest) = requests.front() {
                    if now.duration_since(*oldest) >= self.window {
                        requests.pop_front();
                    } else {
                        break;
                    }
                }
                if requests.len() < self.max_requests {
                    requests.push_back(now);
                    None
                } else {
                    // Budget exhausted; sleep until the oldest request
                    // ages out of the window.
                    let oldest = *requests.front().expect("non-empty at capacity");
                    Some(self.window.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    debug!(wait = ?wait, "rate budget exhausted, pausing");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let delay = self.action_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// One randomized delay draw from the configured bounds.
    pub fn action_delay(&self) -> Duration {
        let (min, max) = self.delay_ms;
        if max == 0 {
            return Duration::ZERO;
        }
        let ms = self.rng.lock().unwrap().gen_range(min..=max);
        Duration::from_millis(ms)
    }

    /// Exponential backoff for retry `attempt` (0-based) with up to 25%
    /// added jitter.
    pub fn backoff(&self, base_ms: u64, attempt: u32) -> Duration {
        let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        let jitter = self.rng.lock().unwrap().gen_range(0..=exp / 4);
        Duration::from_millis(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: usize, window_secs: u64, min_ms: u64, max_ms: u64) -> PacingConfig {
        PacingConfig {
            max_requests,
            window_secs,
            min_action_delay_ms: min_ms,
            max_action_delay_ms: max_ms,
        }
    }

    #[test]
    fn action_delay_stays_in_bounds() {
        let pacer = Pacer::with_seed(&config(10, 60, 100, 300), 7);
        for _ in 0..50 {
            let delay = pacer.action_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn zero_bounds_mean_no_delay() {
        let pacer = Pacer::with_seed(&config(10, 60, 0, 0), 7);
        assert_eq!(pacer.action_delay(), Duration::ZERO);
    }

    #[test]
    fn seeded_pacers_are_reproducible() {
        let a = Pacer::with_seed(&config(10, 60, 100, 5_000), 42);
        let b = Pacer::with_seed(&config(10, 60, 100, 5_000), 42);
        for _ in 0..10 {
            assert_eq!(a.action_delay(), b.action_delay());
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let pacer = Pacer::with_seed(&config(10, 60, 0, 0), 1);
        let first = pacer.backoff(100, 0);
        let third = pacer.backoff(100, 2);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(125));
        assert!(third >= Duration::from_millis(400));
        assert!(third <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn budget_is_enforced_within_the_window() {
        // Two requests per 1s window, no action delay: the third
        // pace() must wait for the first to age out.
        let pacer = Pacer::with_seed(
            &PacingConfig {
                max_requests: 2,
                window_secs: 1,
                min_action_delay_ms: 0,
                max_action_delay_ms: 0,
            },
            3,
        );

        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(500));
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
