use betcache_types::{defaults, Address};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub rpc_url: String,
    pub factory_address: Address,
    /// Negative: last N blocks. Zero: genesis. Positive: that block.
    /// Only consulted when no checkpoint exists yet.
    pub starting_block: i64,
    pub poll_interval_seconds: u64,
    pub rpc_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub price: PriceConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub api_url: String,
    /// JSON pointer to the numeric price inside the response body.
    pub price_pointer: String,
    pub ttl_seconds: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub max_subscribers: usize,
    pub housekeeping_interval_seconds: u64,
    pub subscriber_buffer: usize,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Timer periods must be non-zero; zero falls back to `default`.
fn non_zero_period(name: &str, seconds: u64, default: u64) -> u64 {
    if seconds == 0 {
        warn!(name, default, "period of 0 seconds is not allowed, using default");
        return default;
    }
    seconds
}

fn env_period(name: &str, default: u64) -> u64 {
    non_zero_period(name, env_or(name, default), default)
}

impl WatcherConfig {
    /// Never zero, even when the field was set to 0 directly.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

impl FanoutConfig {
    /// Never zero, even when the field was set to 0 directly.
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_seconds.max(1))
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let factory_address = match std::env::var("FACTORY_CONTRACT_ADDRESS") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(
                    value = %raw,
                    error = %e,
                    "invalid FACTORY_CONTRACT_ADDRESS, using zero address"
                );
                Address::ZERO
            }),
            Err(_) => Address::ZERO,
        };
        if factory_address.is_zero() {
            warn!("FACTORY_CONTRACT_ADDRESS not set or is zero address");
        }

        Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "http://localhost:8545".to_string()),
            factory_address,
            starting_block: env_or("STARTING_BLOCK", 0),
            poll_interval_seconds: env_period(
                "POLL_INTERVAL_SECONDS",
                defaults::POLL_INTERVAL_SECONDS,
            ),
            rpc_timeout_seconds: env_or("RPC_TIMEOUT_SECONDS", 30),
            max_retries: env_or("RPC_MAX_RETRIES", 0),
            retry_delay_seconds: env_or("RETRY_DELAY_SECONDS", 1),
            price: PriceConfig::default(),
            fanout: FanoutConfig::default(),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("PRICE_API_URL").unwrap_or_else(|_| {
                "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd"
                    .to_string()
            }),
            price_pointer: std::env::var("PRICE_JSON_POINTER")
                .unwrap_or_else(|_| "/ethereum/usd".to_string()),
            ttl_seconds: env_or("PRICE_TTL_SECONDS", defaults::PRICE_TTL_SECONDS),
            max_attempts: env_or("PRICE_MAX_ATTEMPTS", defaults::PRICE_MAX_ATTEMPTS),
            backoff_ms: env_or("PRICE_BACKOFF_MS", defaults::PRICE_BACKOFF_MS),
            timeout_seconds: env_or("PRICE_TIMEOUT_SECONDS", 10),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_subscribers: env_or("WS_MAX_CONNECTIONS", defaults::MAX_SUBSCRIBERS),
            housekeeping_interval_seconds: env_period(
                "WS_HOUSEKEEPING_SECONDS",
                defaults::HOUSEKEEPING_INTERVAL_SECONDS,
            ),
            subscriber_buffer: env_or("WS_SUBSCRIBER_BUFFER", defaults::SUBSCRIBER_BUFFER),
        }
    }
}
