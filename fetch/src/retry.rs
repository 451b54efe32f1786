use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;
use tokio::time::sleep;

use super::error::FetchError;

const MIN_WAIT_SECS: f64 = 0.1;

/// Exponential backoff with jitter for transient upstream failures.
///
/// Each retry waits the longer of the doubling backoff and the server's
/// `Retry-After` hint, plus a uniform jitter. Permanent errors propagate
/// immediately; once attempts are exhausted the last transient error is
/// returned.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_base_secs: f64,
    pub backoff_cap_secs: f64,
    pub jitter_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 6,
            backoff_base_secs: 1.0,
            backoff_cap_secs: 30.0,
            jitter_secs: 0.3,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut backoff = self.backoff_base_secs;

        for attempt_number in 0..=self.retries {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt_number < self.retries => {
                    let hint = err.retry_hint().map_or(0.0, |d| d.as_secs_f64());
                    let wait = (hint.max(backoff) + self.jitter()).max(MIN_WAIT_SECS);
                    warn!(
                        "transient fetch failure ({err}); retry {} of {} in {wait:.1}s",
                        attempt_number + 1,
                        self.retries
                    );
                    sleep(Duration::from_secs_f64(wait)).await;
                    backoff = (backoff * 2.0).min(self.backoff_cap_secs);
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("loop returns on the final attempt")
    }

    fn jitter(&self) -> f64 {
        if self.jitter_secs <= 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..self.jitter_secs)
        }
    }
}
