use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Combined concurrency gate and pacing clock for upstream requests.
///
/// At most `max_concurrent` permits are out at once, and consecutive permit
/// grants are separated by at least `min_delay`, so bursts are spread out
/// even when concurrency is 1. Cloning shares the underlying limiter.
#[derive(Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    next_grant: Arc<Mutex<Instant>>,
    min_delay: Duration,
}

/// Held for the duration of one upstream request.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            next_grant: Arc::new(Mutex::new(Instant::now())),
            min_delay,
        }
    }

    pub async fn acquire(&self) -> RatePermit {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");

        // Waiters queue on the pacing lock; each grant pushes the next
        // allowed grant time forward by min_delay.
        let mut next_grant = self.next_grant.lock().await;
        let now = Instant::now();
        if *next_grant > now {
            sleep_until(*next_grant).await;
        }
        *next_grant = Instant::now() + self.min_delay;
        drop(next_grant);

        RatePermit { _permit: permit }
    }
}
