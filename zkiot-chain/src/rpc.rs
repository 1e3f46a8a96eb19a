//! EVM JSON-RPC transport
//!
//! Thin JSON-RPC 2.0 client over HTTP. Transport failures are retried with
//! exponential backoff up to the configured attempt cap; node-side errors
//! are surfaced immediately (nonce discipline is the caller's concern).

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChainError, ChainResult};

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
    #[allow(dead_code)]
    id: Option<u64>,
}

/// JSON-RPC error body
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `eth_call`/`eth_estimateGas` parameter object
#[derive(Debug, Clone, Serialize)]
pub struct CallRequest {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One log entry from a receipt
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Transaction receipt as reported by the node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub gas_used: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|q| parse_quantity(q).ok())
            .map(|v| v as u64)
    }

    pub fn gas_used_u64(&self) -> Option<u64> {
        self.gas_used
            .as_deref()
            .and_then(|q| parse_quantity(q).ok())
            .map(|v| v as u64)
    }

    /// Post-Byzantium status field: 0x1 success, 0x0 revert
    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_deref(), Some("0x1") | Some("0x01"))
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(q: &str) -> ChainResult<u128> {
    let stripped = q
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Encoding(format!("quantity without 0x prefix: {}", q)))?;
    u128::from_str_radix(stripped, 16)
        .map_err(|e| ChainError::Encoding(format!("bad quantity {}: {}", q, e)))
}

/// Format a quantity for the wire
pub fn to_quantity(v: u128) -> String {
    format!("0x{:x}", v)
}

/// JSON-RPC client for one endpoint
pub struct EvmRpc {
    client: Client,
    url: String,
    request_id: AtomicU64,
    max_attempts: u32,
    max_backoff: Duration,
}

impl EvmRpc {
    pub fn new(
        url: String,
        timeout: Duration,
        max_attempts: u32,
        max_backoff: Duration,
    ) -> ChainResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            url,
            request_id: AtomicU64::new(0),
            max_attempts: max_attempts.max(1),
            max_backoff,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ChainResult<T> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, url = %self.url, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(classify_rpc_error(err));
        }
        body.result.ok_or_else(|| ChainError::Rpc {
            code: -1,
            message: format!("{} returned neither result nor error", method),
        })
    }

    /// Call with transient-failure retry and capped exponential backoff
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ChainResult<T> {
        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let backoff =
                    Duration::from_secs(1u64 << (attempt - 1).min(16)).min(self.max_backoff);
                warn!(method, attempt, backoff_secs = backoff.as_secs(), "rpc retry");
                tokio::time::sleep(backoff).await;
            }
            match self.call_once(method, params.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        // Exhausted transient retries: reclassified as permanent.
        Err(ChainError::RetryExhausted {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
    }

    // ==================== Typed methods ====================

    pub async fn chain_id(&self) -> ChainResult<u64> {
        let q: String = self.call("eth_chainId", serde_json::json!([])).await?;
        Ok(parse_quantity(&q)? as u64)
    }

    pub async fn block_number(&self) -> ChainResult<u64> {
        let q: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        Ok(parse_quantity(&q)? as u64)
    }

    pub async fn gas_price(&self) -> ChainResult<u128> {
        let q: String = self.call("eth_gasPrice", serde_json::json!([])).await?;
        parse_quantity(&q)
    }

    /// Account nonce at the given block tag (`"pending"` for sending)
    pub async fn transaction_count(&self, address: &str, tag: &str) -> ChainResult<u64> {
        let q: String = self
            .call("eth_getTransactionCount", serde_json::json!([address, tag]))
            .await?;
        Ok(parse_quantity(&q)? as u64)
    }

    pub async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64> {
        let q: String = self.call("eth_estimateGas", serde_json::json!([call])).await?;
        Ok(parse_quantity(&q)? as u64)
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<String> {
        let hex_tx = format!("0x{}", hex::encode(raw));
        self.call("eth_sendRawTransaction", serde_json::json!([hex_tx]))
            .await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> ChainResult<Option<TxReceipt>> {
        self.call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }

    pub async fn balance(&self, address: &str) -> ChainResult<u128> {
        let q: String = self
            .call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        parse_quantity(&q)
    }
}

fn classify_rpc_error(err: RpcErrorBody) -> ChainError {
    let lowered = err.message.to_lowercase();
    if lowered.contains("nonce too low") || lowered.contains("nonce is too low") {
        return ChainError::NonceTooLow;
    }
    ChainError::Rpc {
        code: err.code,
        message: err.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x2a").unwrap(), 42);
        assert_eq!(parse_quantity("0xde0b6b3a7640000").unwrap(), 10u128.pow(18));
        assert!(parse_quantity("42").is_err());
        assert_eq!(to_quantity(42), "0x2a");
    }

    #[test]
    fn test_nonce_too_low_classification() {
        let err = classify_rpc_error(RpcErrorBody {
            code: -32000,
            message: "nonce too low: next nonce 5".to_string(),
        });
        assert!(matches!(err, ChainError::NonceTooLow));

        let err = classify_rpc_error(RpcErrorBody {
            code: 3,
            message: "execution reverted".to_string(),
        });
        assert!(matches!(err, ChainError::Rpc { code: 3, .. }));
    }

    #[test]
    fn test_receipt_accessors() {
        let receipt: TxReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "status": "0x1",
            "logs": []
        }))
        .unwrap();
        assert_eq!(receipt.block_number_u64(), Some(16));
        assert_eq!(receipt.gas_used_u64(), Some(21_000));
        assert!(receipt.succeeded());
    }

    #[test]
    fn test_call_request_skips_empty_fields() {
        let call = CallRequest {
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            data: None,
            value: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("value").is_none());
    }
}
