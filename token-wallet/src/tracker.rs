//! Transaction Lifecycle Tracker
//!
//! Watches a relayed transaction until the node reports a receipt. The
//! current record lives in a `watch` channel, so observers can take a
//! snapshot at any time or await changes.
//!
//! Waiting is cancelled by dropping the `await_confirmation` future. That
//! only stops observation; the transaction itself cannot be recalled.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::chain::{ChainClient, ChainError};
use crate::error::ErrorClass;
use crate::record::{TransactionRecord, TxStatus};

/// Default delay between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default bound on the whole wait
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Timed out after {0:?} waiting for confirmation; the transaction may still be mined")]
    Timeout(Duration),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl TrackerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TrackerError::Timeout(_) => ErrorClass::Network,
            TrackerError::Chain(e) => e.class(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// Follows one transaction from `Pending` to a terminal status.
pub struct TransactionTracker<'a, C> {
    chain: &'a C,
    config: TrackerConfig,
    state: watch::Sender<TransactionRecord>,
}

impl<'a, C: ChainClient> TransactionTracker<'a, C> {
    pub fn new(chain: &'a C, record: TransactionRecord, config: TrackerConfig) -> Self {
        let (state, _) = watch::channel(record);
        Self {
            chain,
            config,
            state,
        }
    }

    /// Snapshot of the record as last observed.
    pub fn current(&self) -> TransactionRecord {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> TxStatus {
        self.state.borrow().status
    }

    /// Receive every status change from now on.
    pub fn subscribe(&self) -> watch::Receiver<TransactionRecord> {
        self.state.subscribe()
    }

    /// Poll for a receipt until the transaction is mined or the timeout
    /// elapses. On timeout the record stays `Pending`.
    ///
    /// Node errors end the wait immediately; nothing is retried.
    pub async fn await_confirmation(&self) -> Result<TransactionRecord, TrackerError> {
        if self.status().is_terminal() {
            return Ok(self.current());
        }

        match tokio::time::timeout(self.config.timeout, self.poll_until_mined()).await {
            Ok(result) => result,
            Err(_) => Err(TrackerError::Timeout(self.config.timeout)),
        }
    }

    async fn poll_until_mined(&self) -> Result<TransactionRecord, TrackerError> {
        let hash = self.state.borrow().hash;
        loop {
            if let Some(receipt) = self.chain.get_transaction_receipt(hash).await? {
                let status = if receipt.succeeded {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                };
                self.state
                    .send_if_modified(|record| record.advance(status, Some(receipt.block_number)));
                info!(%hash, %status, block = receipt.block_number, "Transaction mined");
                return Ok(self.current());
            }

            debug!(%hash, "Receipt not available yet");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
