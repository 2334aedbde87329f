//! Transaction history from a block explorer.
//!
//! Nodes cannot list an account's transactions, so history comes from an
//! indexer behind [`HistoryProvider`]. [`EtherscanClient`] uses the
//! Etherscan V2 multichain API. Without an API key it returns an empty page
//! flagged as degraded rather than failing.

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::Deserialize;
use serde_json::Value;
use futures::join;
use std::{cmp::Reverse, future::Future, time::Duration};
use tracing::{debug, warn};
use tw_crypto_secp256k1::Address;

use crate::chain::TxHash;
use crate::error::ErrorClass;
use crate::record::{Direction, TransactionRecord, TxStatus};
use crate::units::NATIVE_DECIMALS;

/// Etherscan V2 multichain endpoint
pub const ETHERSCAN_V2_URL: &str = "https://api.etherscan.io/v2/api";

/// Timeout for explorer requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Explorer unreachable: {0}")]
    Network(String),

    #[error("Explorer API error: {0}")]
    Api(String),

    #[error("Invalid explorer response: {0}")]
    InvalidResponse(String),
}

impl HistoryError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Network
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub transactions: Vec<TransactionRecord>,
    /// Set when history is unavailable (e.g. no API key) and the empty
    /// list does not mean the account has no transactions.
    pub degraded: bool,
    /// Set when part of a combined query failed and the list may be
    /// missing entries.
    pub incomplete: bool,
}

impl HistoryPage {
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

pub trait HistoryProvider: Send + Sync {
    /// Native-currency transactions involving `address`.
    fn list_transactions(
        &self,
        address: Address,
        limit: usize,
    ) -> impl Future<Output = Result<HistoryPage, HistoryError>> + Send;

    /// ERC-20 transfers involving `address`, optionally for one contract.
    fn list_token_transfers(
        &self,
        address: Address,
        token: Option<Address>,
        limit: usize,
    ) -> impl Future<Output = Result<HistoryPage, HistoryError>> + Send;
}

/// Transfers of `token` when one is given, otherwise native transactions
/// and token transfers together.
pub async fn fetch_history<H: HistoryProvider>(
    provider: &H,
    address: Address,
    token: Option<Address>,
    limit: usize,
) -> Result<HistoryPage, HistoryError> {
    match token {
        Some(token) => provider.list_token_transfers(address, Some(token), limit).await,
        None => combined_history(provider, address, limit).await,
    }
}

/// Native transactions and all token transfers, fetched concurrently.
///
/// Both queries run to completion. A failed one is logged and skipped and
/// the page is marked incomplete; only when both fail is an error returned.
/// `limit` applies to each query. Entries are merged newest first.
pub async fn combined_history<H: HistoryProvider>(
    provider: &H,
    address: Address,
    limit: usize,
) -> Result<HistoryPage, HistoryError> {
    let (native, tokens) = join!(
        provider.list_transactions(address, limit),
        provider.list_token_transfers(address, None, limit)
    );

    let mut page = HistoryPage::default();
    let mut errors = Vec::new();
    for (kind, result) in [("native", native), ("token", tokens)] {
        match result {
            Ok(part) => {
                page.degraded |= part.degraded;
                page.transactions.extend(part.transactions);
            }
            Err(e) => {
                warn!(kind, "Failed to fetch history: {}", e);
                errors.push(e);
            }
        }
    }

    if errors.len() == 2 {
        return Err(errors.swap_remove(0));
    }
    page.incomplete = !errors.is_empty();
    page.transactions.sort_by_key(|record| Reverse((record.block_number, record.timestamp)));
    Ok(page)
}

/// Envelope shared by every Etherscan `account` endpoint.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: Value,
}

/// Fields common to `txlist` and `tokentx` entries. Everything is a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtherscanTx {
    hash: String,
    block_number: String,
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(default)]
    is_error: String,
    #[serde(default, rename = "txreceipt_status")]
    receipt_status: String,
    #[serde(default)]
    contract_address: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

/// Unwrap the envelope. "No transactions found" is an empty list, not an
/// error.
fn parse_response(response: EtherscanResponse) -> Result<Vec<EtherscanTx>, HistoryError> {
    if response.status == "1" {
        return serde_json::from_value(response.result)
            .map_err(|e| HistoryError::InvalidResponse(e.to_string()));
    }

    let empty_result = response.result.as_array().is_some_and(|a| a.is_empty());
    if response.message.starts_with("No transactions found") || empty_result {
        return Ok(Vec::new());
    }

    let detail = match &response.result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Err(HistoryError::Api(format!("{}: {}", response.message, detail)))
}

/// Map one explorer entry onto a record from `owner`'s point of view.
///
/// Entries with unparseable fields are skipped.
fn to_record(owner: &Address, tx: &EtherscanTx, symbol: &str, decimals: u8) -> Option<TransactionRecord> {
    let hash: TxHash = tx.hash.parse().ok()?;
    let from = Address::parse(&tx.from).ok()?;
    // Contract creations have an empty `to`.
    let to = if tx.to.is_empty() {
        Address::parse(&tx.contract_address).ok()?
    } else {
        Address::parse(&tx.to).ok()?
    };

    let (direction, counterparty) = if to == *owner && from != *owner {
        (Direction::Received, from)
    } else {
        (Direction::Sent, to)
    };

    let status = if tx.is_error == "1" || tx.receipt_status == "0" {
        TxStatus::Failed
    } else {
        TxStatus::Confirmed
    };

    let timestamp = tx
        .time_stamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Some(TransactionRecord {
        hash,
        status,
        block_number: tx.block_number.parse().ok(),
        counterparty,
        direction,
        amount: U256::from_dec_str(&tx.value).ok()?,
        asset_symbol: symbol.to_string(),
        decimals,
        timestamp,
    })
}

fn map_entries<'a, F>(owner: &Address, entries: &'a [EtherscanTx], asset: F) -> Vec<TransactionRecord>
where
    F: Fn(&'a EtherscanTx) -> (&'a str, u8),
{
    entries
        .iter()
        .filter_map(|tx| {
            let (symbol, decimals) = asset(tx);
            let record = to_record(owner, tx, symbol, decimals);
            if record.is_none() {
                warn!(hash = %tx.hash, "Skipping malformed explorer entry");
            }
            record
        })
        .collect()
}

/// Etherscan V2 API client for one chain.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
    native_symbol: String,
}

impl EtherscanClient {
    pub fn new(
        chain_id: u64,
        api_key: Option<String>,
        native_symbol: impl Into<String>,
    ) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| HistoryError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: ETHERSCAN_V2_URL.to_string(),
            chain_id,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            native_symbol: native_symbol.into(),
        })
    }

    /// Point at a different endpoint (e.g. a self-hosted mirror).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(
        &self,
        api_key: &str,
        action: &str,
        address: Address,
        contract: Option<Address>,
        limit: usize,
    ) -> Result<Vec<EtherscanTx>, HistoryError> {
        let mut query: Vec<(&str, String)> = vec![
            ("chainid", self.chain_id.to_string()),
            ("module", "account".to_string()),
            ("action", action.to_string()),
            ("address", address.to_lower_hex()),
            ("startblock", "0".to_string()),
            ("endblock", "99999999".to_string()),
            ("page", "1".to_string()),
            ("offset", limit.to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(contract) = contract {
            query.push(("contractaddress", contract.to_lower_hex()));
        }
        debug!(action, address = %address, "Explorer request");
        query.push(("apikey", api_key.to_string()));

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| HistoryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HistoryError::Network(format!("HTTP error: {}", response.status())));
        }

        let body: EtherscanResponse = response
            .json()
            .await
            .map_err(|e| HistoryError::InvalidResponse(e.to_string()))?;

        let mut entries = parse_response(body)?;
        entries.truncate(limit);
        Ok(entries)
    }

    fn api_key_or_degraded(&self, limit: usize) -> Option<&str> {
        if limit == 0 {
            return None;
        }
        match self.api_key.as_deref() {
            Some(key) => Some(key),
            None => {
                warn!("No Etherscan API key configured; transaction history unavailable");
                None
            }
        }
    }
}

impl HistoryProvider for EtherscanClient {
    async fn list_transactions(
        &self,
        address: Address,
        limit: usize,
    ) -> Result<HistoryPage, HistoryError> {
        let Some(api_key) = self.api_key_or_degraded(limit) else {
            return Ok(HistoryPage {
                degraded: self.api_key.is_none(),
                ..HistoryPage::default()
            });
        };

        let entries = self.fetch(api_key, "txlist", address, None, limit).await?;
        let symbol = self.native_symbol.as_str();
        Ok(HistoryPage {
            transactions: map_entries(&address, &entries, |_| (symbol, NATIVE_DECIMALS)),
            ..HistoryPage::default()
        })
    }

    async fn list_token_transfers(
        &self,
        address: Address,
        token: Option<Address>,
        limit: usize,
    ) -> Result<HistoryPage, HistoryError> {
        let Some(api_key) = self.api_key_or_degraded(limit) else {
            return Ok(HistoryPage {
                degraded: self.api_key.is_none(),
                ..HistoryPage::default()
            });
        };

        let entries = self.fetch(api_key, "tokentx", address, token, limit).await?;
        Ok(HistoryPage {
            transactions: map_entries(&address, &entries, |tx| {
                (
                    tx.token_symbol.as_str(),
                    tx.token_decimal.parse().unwrap_or(NATIVE_DECIMALS),
                )
            }),
            ..HistoryPage::default()
        })
    }
}
