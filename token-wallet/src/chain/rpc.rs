//! JSON-RPC Client
//!
//! Talks to a single EVM node over HTTP. Node error strings are mapped onto
//! [`ChainError`] here and nowhere else.

use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use tw_crypto_secp256k1::Address;

use super::{Bytes, CallRequest, ChainClient, ChainError, Receipt, TxHash};

/// Timeout for RPC requests
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;

/// Geth's code for reverted `eth_call`/`eth_estimateGas`
const EXECUTION_REVERTED_CODE: i64 = 3;

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<U256>,
    status: Option<U256>,
}

/// Map a node error onto the wallet's error kinds.
pub(crate) fn map_rpc_error(code: i64, message: &str) -> ChainError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        ChainError::InsufficientFunds
    } else if code == USER_REJECTED_CODE {
        ChainError::UserRejected
    } else if code == EXECUTION_REVERTED_CODE || lower.contains("execution reverted") {
        ChainError::Reverted(message.to_string())
    } else {
        ChainError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

fn to_u64(value: U256, what: &str) -> Result<u64, ChainError> {
    if value.bits() > 64 {
        return Err(ChainError::InvalidResponse(format!("{what} does not fit in 64 bits")));
    }
    Ok(value.low_u64())
}

/// Single-node JSON-RPC client.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ChainError> {
        Self::with_timeout(url, RPC_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request. A `null` result deserializes into `T` as-is, so
    /// callers that can legitimately get `null` ask for an `Option`.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        debug!(method, id, latency_ms = start.elapsed().as_millis() as u64, "RPC call");

        if !response.status().is_success() {
            return Err(ChainError::Network(format!("HTTP error: {}", response.status())));
        }

        let json_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = json_response.error {
            warn!(method, code = error.code, "RPC error: {}", error.message);
            return Err(map_rpc_error(error.code, &error.message));
        }

        serde_json::from_value(json_response.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::InvalidResponse(format!("{method}: {e}")))
    }
}

impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: U256 = self.request("eth_chainId", json!([])).await?;
        to_u64(id, "chain id")
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.request("eth_getBalance", json!([address, "latest"])).await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.request("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, ChainError> {
        self.request("eth_estimateGas", json!([request])).await
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, ChainError> {
        self.request("eth_getTransactionCount", json!([address, "pending"]))
            .await
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        let data: Bytes = self.request("eth_call", json!([request, "latest"])).await?;
        Ok(data.0)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        let raw_hex = format!("0x{}", hex::encode(raw));
        self.request("eth_sendRawTransaction", json!([raw_hex])).await
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        // Some nodes return a receipt stub for pending transactions.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        Ok(Some(Receipt {
            block_number: to_u64(block_number, "block number")?,
            // Pre-Byzantium receipts carry no status; treat them as success.
            succeeded: receipt.status.map_or(true, |s| !s.is_zero()),
        }))
    }
}
