use crate::config::WatcherConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Minimal JSON-RPC client for an Ethereum-compatible node.
pub struct RpcClient {
    client: reqwest::Client,
    rpc_url: String,
    max_retries: u32,
    retry_delay_seconds: u64,
}

impl RpcClient {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_seconds))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            max_retries: config.max_retries,
            retry_delay_seconds: config.retry_delay_seconds,
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(self.retry_delay_seconds * attempt as u64);
                warn!(
                    method,
                    attempt,
                    max_retries = self.max_retries,
                    "RPC call failed, retrying in {}s: {}",
                    delay.as_secs(),
                    last_error
                        .as_ref()
                        .map(|e: &anyhow::Error| e.to_string())
                        .unwrap_or_default()
                );
                sleep(delay).await;
            }

            match self.try_call(&payload).await {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(method, "RPC call succeeded after {} retries", attempt);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt == self.max_retries && self.max_retries > 0 {
                        error!(method, "RPC call failed after {} retries", self.max_retries);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("RPC call failed")))
    }

    async fn try_call(&self, payload: &Value) -> Result<Value> {
        let response: Value = self
            .client
            .post(&self.rpc_url)
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let error_msg = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown RPC error");
            let error_code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);

            if error_code == -32005 || error_code == 429 {
                return Err(anyhow::anyhow!("Rate limited: {}", error_msg));
            }

            return Err(anyhow::anyhow!("RPC error ({}): {}", error_code, error_msg));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing result"))
    }

    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("eth_blockNumber result is not a string"))?;
        crate::abi::parse_quantity(hex_str)
    }

    pub async fn get_logs(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Value>> {
        let params = serde_json::json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": address,
            "topics": [topic0]
        }]);

        let result = self.call("eth_getLogs", params).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// `eth_call` against the latest block; returns the raw return data.
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let params = serde_json::json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.call("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("eth_call result is not a string"))?;
        crate::abi::parse_hex_bytes(hex_str)
    }

    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<Value>> {
        let result = self
            .call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }
}
