//! Node access.
//!
//! [`ChainClient`] is the narrow interface the rest of the wallet uses to
//! read chain state and relay signed transactions. [`JsonRpcClient`] is the
//! HTTP JSON-RPC implementation; tests substitute their own.

mod rpc;

pub use rpc::JsonRpcClient;

use primitive_types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, future::Future, str::FromStr};
use tw_crypto_secp256k1::Address;

use crate::error::ErrorClass;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Insufficient funds for transfer and fee")]
    InsufficientFunds,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Invalid response from node: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::Network(_) | ChainError::InvalidResponse(_) => ErrorClass::Network,
            ChainError::Rpc { .. } | ChainError::Reverted(_) => ErrorClass::Relay,
            ChainError::InsufficientFunds => ErrorClass::InsufficientFunds,
            ChainError::UserRejected => ErrorClass::UserRejected,
        }
    }
}

/// Arbitrary bytes, serialized as `0x`-prefixed hex.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map(Bytes).map_err(de::Error::custom)
    }
}

/// A 32-byte transaction hash.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Parameters for `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl CallRequest {
    /// A read-only contract call.
    pub fn call(to: Address, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to,
            value: None,
            data: Some(Bytes(data)),
        }
    }
}

/// The parts of a transaction receipt the wallet cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block_number: u64,
    /// `false` when the transaction was mined but reverted.
    pub succeeded: bool,
}

/// Read access to an EVM node plus raw transaction relay.
///
/// Every call is a single request; implementations do not retry.
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn get_balance(&self, address: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn estimate_gas(
        &self,
        request: &CallRequest,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    /// Next nonce for `address`, counting pending transactions.
    fn get_transaction_count(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn call(&self, request: &CallRequest) -> impl Future<Output = Result<Vec<u8>, ChainError>> + Send;

    fn send_raw_transaction(
        &self,
        raw: &[u8],
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// `None` while the transaction is not yet mined.
    fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<Receipt>, ChainError>> + Send;
}
