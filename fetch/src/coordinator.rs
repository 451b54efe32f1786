use std::future::Future;

use log::warn;
use serde_json::Value;

use super::cache::{fnv1a_64, CacheContext, CacheStore, Fetched, Source};
use super::error::FetchError;
use super::limiter::RateLimiter;
use super::retry::RetryPolicy;

/// Cache-first fetch coordinator.
///
/// A cache hit returns immediately without touching the limiter. On a miss
/// the request runs under a rate-limiter permit with retry, and the result
/// is written back. Cache read and write failures are logged and otherwise
/// ignored, so a broken cache degrades to a slower session instead of a
/// failed one.
pub struct Fetcher<S> {
    store: S,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl<S: CacheStore> Fetcher<S> {
    pub fn new(store: S, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            store,
            limiter,
            policy,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn fetch<C, F, Fut>(&self, context: &C, request: F) -> Result<Fetched, FetchError>
    where
        C: CacheContext,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        let key = fnv1a_64(context.key().as_bytes());

        match self.store.get(key) {
            Ok(Some(value)) => {
                return Ok(Fetched {
                    value,
                    source: Source::Cache,
                })
            }
            Ok(None) => {}
            Err(err) => warn!("cache read failed for '{}': {err:#}", context.key()),
        }

        let value = self
            .policy
            .run(|| async {
                let _permit = self.limiter.acquire().await;
                request().await
            })
            .await?;

        if let Err(err) = self.store.put(key, &value) {
            warn!("cache write failed for '{}': {err:#}", context.key());
        }

        Ok(Fetched {
            value,
            source: Source::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct Ctx(&'static str);

    impl CacheContext for Ctx {
        fn key(&self) -> String {
            self.0.to_string()
        }
    }

    fn fetcher() -> Fetcher<MemoryStore> {
        Fetcher::new(
            MemoryStore::new(),
            RateLimiter::new(2, Duration::from_millis(0)),
            RetryPolicy::default(),
        )
    }

    struct FailingStore;

    impl CacheStore for FailingStore {
        fn get(&self, _key: u64) -> anyhow::Result<Option<Value>> {
            Err(anyhow!("disk unavailable"))
        }

        fn put(&self, _key: u64, _value: &Value) -> anyhow::Result<()> {
            Err(anyhow!("disk unavailable"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_fetch_is_served_from_cache() {
        let fetcher = fetcher();
        let calls = AtomicU32::new(0);
        let request = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!({"moves": ["e4"]})) }
        };

        let first = fetcher.fetch(&Ctx("explorer|start"), request).await.unwrap();
        let second = fetcher.fetch(&Ctx("explorer|start"), request).await.unwrap();

        assert_eq!(first.source, Source::Network);
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.value, json!({"moves": ["e4"]}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_contexts_do_not_collide() {
        let fetcher = fetcher();

        fetcher
            .fetch(&Ctx("eval|a"), || async { Ok(json!(1)) })
            .await
            .unwrap();
        let other = fetcher
            .fetch(&Ctx("eval|b"), || async { Ok(json!(2)) })
            .await
            .unwrap();

        assert_eq!(other.source, Source::Network);
        assert_eq!(other.value, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_failures_degrade_to_network() {
        let fetcher = Fetcher::new(
            FailingStore,
            RateLimiter::new(1, Duration::from_millis(0)),
            RetryPolicy::default(),
        );

        let fetched = fetcher
            .fetch(&Ctx("stats|start"), || async { Ok(json!({"games": 3})) })
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Network);
        assert_eq!(fetched.value, json!({"games": 3}));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_request_waits_out_the_hint_then_returns_network() {
        let fetcher = Fetcher::new(
            MemoryStore::new(),
            RateLimiter::new(1, Duration::from_millis(0)),
            RetryPolicy {
                jitter_secs: 0.0,
                ..RetryPolicy::default()
            },
        );
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let fetched = fetcher
            .fetch(&Ctx("stats|throttled"), || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(FetchError::Transient {
                            status: 429,
                            retry_after: Some(Duration::from_secs(2)),
                        })
                    } else {
                        Ok(json!({"games": 7}))
                    }
                }
            })
            .await
            .unwrap();

        // The second attempt honors the 2s hint, and the payload comes back
        // from the network, not the cache.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(fetched.source, Source::Network);
        assert_eq!(fetched.value, json!({"games": 7}));
    }

    #[tokio::test(start_paused = true)]
    async fn request_errors_propagate_after_retries() {
        let fetcher = Fetcher::new(
            MemoryStore::new(),
            RateLimiter::new(1, Duration::from_millis(0)),
            RetryPolicy {
                retries: 1,
                ..RetryPolicy::default()
            },
        );

        let result = fetcher
            .fetch(&Ctx("explorer|bad"), || async {
                Err(FetchError::Transient {
                    status: 503,
                    retry_after: None,
                })
            })
            .await;

        assert!(matches!(result, Err(FetchError::Transient { .. })));
    }
}
