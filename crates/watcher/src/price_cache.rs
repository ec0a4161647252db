//! Single-entry, time-bounded cache in front of an external price feed.
//!
//! Refreshes are bounded: at most `max_attempts` fetches with a linearly
//! growing delay between them. When every attempt fails the last known value
//! is served, however old; with no value ever fetched the result is `None`.

use crate::config::PriceConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PriceFetchError {
    #[error("rate limited by price feed")]
    RateLimited,
    #[error("price feed request failed: {0}")]
    Http(String),
    #[error("invalid price payload: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch(&self) -> Result<f64, PriceFetchError>;
}

/// Reads one numeric field out of a JSON document served over HTTP GET.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: String,
    pointer: String,
}

impl HttpPriceFeed {
    pub fn new(config: &PriceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("betcache/0.1")
            .build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
            pointer: config.price_pointer.clone(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch(&self) -> Result<f64, PriceFetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PriceFetchError::Http(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceFetchError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(PriceFetchError::Http(format!("status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PriceFetchError::Invalid(e.to_string()))?;
        extract_price(&body, &self.pointer)
    }
}

pub fn extract_price(body: &Value, pointer: &str) -> Result<f64, PriceFetchError> {
    body.pointer(pointer)
        .and_then(Value::as_f64)
        .ok_or_else(|| PriceFetchError::Invalid(format!("no numeric value at {}", pointer)))
}

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    value: f64,
    fetched_at: Instant,
}

pub struct PriceCache {
    feed: Arc<dyn PriceFeed>,
    entry: Mutex<Option<PriceEntry>>,
    ttl: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl PriceCache {
    pub fn new(feed: Arc<dyn PriceFeed>, config: &PriceConfig) -> Self {
        Self::with_policy(
            feed,
            Duration::from_secs(config.ttl_seconds),
            config.max_attempts,
            Duration::from_millis(config.backoff_ms),
        )
    }

    pub fn with_policy(
        feed: Arc<dyn PriceFeed>,
        ttl: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            feed,
            entry: Mutex::new(None),
            ttl,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Current price, refreshing when the cached value has expired.
    pub async fn get(&self) -> Option<f64> {
        // Held across the refresh so concurrent callers share one fetch.
        let mut entry = self.entry.lock().await;

        if let Some(cached) = *entry {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!(price = cached.value, "serving cached price");
                return Some(cached.value);
            }
        }

        for attempt in 1..=self.max_attempts {
            match self.feed.fetch().await {
                Ok(value) if value.is_finite() && value > 0.0 => {
                    info!(price = value, attempt, "price refreshed");
                    *entry = Some(PriceEntry {
                        value,
                        fetched_at: Instant::now(),
                    });
                    return Some(value);
                }
                Ok(value) => {
                    warn!(price = value, attempt, "price feed returned a non-positive value");
                }
                Err(PriceFetchError::RateLimited) => {
                    warn!(attempt, "price feed rate limited");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "price fetch failed");
                }
            }

            if attempt < self.max_attempts {
                sleep(self.backoff * attempt).await;
            }
        }

        match *entry {
            Some(stale) => {
                warn!(
                    price = stale.value,
                    age_secs = stale.fetched_at.elapsed().as_secs(),
                    "price refresh exhausted, serving stale value"
                );
                Some(stale.value)
            }
            None => {
                warn!("price refresh exhausted and no cached value");
                None
            }
        }
    }

    /// The cached value without triggering a refresh.
    pub async fn peek(&self) -> Option<f64> {
        let entry = *self.entry.lock().await;
        entry.map(|e| e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct ScriptedFeed {
        script: StdMutex<VecDeque<Result<f64, PriceFetchError>>>,
        calls: StdMutex<u32>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Result<f64, PriceFetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                calls: StdMutex::new(0),
            })
        }

        fn push(&self, result: Result<f64, PriceFetchError>) {
            self.script.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PriceFeed for ScriptedFeed {
        async fn fetch(&self) -> Result<f64, PriceFetchError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PriceFetchError::Http("script exhausted".to_string())))
        }
    }

    fn cache(feed: Arc<ScriptedFeed>) -> PriceCache {
        PriceCache::with_policy(feed, Duration::from_secs(600), 3, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_skips_network() {
        let feed = ScriptedFeed::new(vec![Ok(3000.0)]);
        let cache = cache(feed.clone());

        assert_eq!(cache.get().await, Some(3000.0));
        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get().await, Some(3000.0));
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_value_refreshes() {
        let feed = ScriptedFeed::new(vec![Ok(3000.0), Ok(3100.0)]);
        let cache = cache(feed.clone());

        assert_eq!(cache.get().await, Some(3000.0));
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.get().await, Some(3100.0));
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_value() {
        let feed = ScriptedFeed::new(vec![Ok(3000.0)]);
        let cache = cache(feed.clone());
        assert_eq!(cache.get().await, Some(3000.0));

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.get().await, Some(3000.0));
        assert_eq!(feed.calls(), 1 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_value_and_failing_feed_is_unavailable() {
        let feed = ScriptedFeed::new(vec![]);
        let cache = cache(feed.clone());
        assert_eq!(cache.get().await, None);
        assert_eq!(feed.calls(), 3);
        assert_eq!(cache.peek().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly() {
        let feed = ScriptedFeed::new(vec![]);
        let cache = cache(feed);
        let started = Instant::now();
        cache.get().await;
        // 1s after the first failure, 2s after the second, none after the last.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_and_invalid_values_are_retried() {
        let feed = ScriptedFeed::new(vec![Err(PriceFetchError::RateLimited), Ok(-1.0)]);
        feed.push(Ok(2500.0));
        let cache = cache(feed.clone());
        assert_eq!(cache.get().await, Some(2500.0));
        assert_eq!(feed.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nan_is_invalid() {
        let feed = ScriptedFeed::new(vec![Ok(f64::NAN), Ok(0.0), Ok(f64::INFINITY)]);
        let cache = cache(feed);
        assert_eq!(cache.get().await, None);
    }

    #[test]
    fn test_extract_price() {
        let body = json!({"ethereum": {"usd": 3012.5}});
        assert_eq!(extract_price(&body, "/ethereum/usd").unwrap(), 3012.5);
        assert!(matches!(
            extract_price(&json!({"ethereum": {"usd": "n/a"}}), "/ethereum/usd"),
            Err(PriceFetchError::Invalid(_))
        ));
        assert!(extract_price(&json!({}), "/ethereum/usd").is_err());
    }
}
