//! Transaction records shared by the intent builder, tracker and history.

use chrono::{DateTime, Utc};
use primitive_types::U256;
use std::fmt;
use tw_crypto_secp256k1::Address;

use crate::chain::TxHash;
use crate::units::format_amount;

/// Lifecycle of a submitted transaction.
///
/// `Pending` may move to `Confirmed` or `Failed`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        *self == next || (*self == TxStatus::Pending && next.is_terminal())
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxStatus::Pending => "Pending",
            TxStatus::Confirmed => "Confirmed",
            TxStatus::Failed => "Failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Sent => "Sent",
            Direction::Received => "Received",
        })
    }
}

/// One transaction as seen from the wallet's account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub counterparty: Address,
    pub direction: Direction,
    /// Smallest units of the asset.
    pub amount: U256,
    pub asset_symbol: String,
    pub decimals: u8,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// A freshly relayed outgoing transaction.
    pub fn pending_sent(
        hash: TxHash,
        recipient: Address,
        amount: U256,
        asset_symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            hash,
            status: TxStatus::Pending,
            block_number: None,
            counterparty: recipient,
            direction: Direction::Sent,
            amount,
            asset_symbol: asset_symbol.into(),
            decimals,
            timestamp: Some(Utc::now()),
        }
    }

    /// Apply a status change, ignoring anything that would move backwards
    /// or leave a terminal state. Returns whether the record changed.
    pub fn advance(&mut self, status: TxStatus, block_number: Option<u64>) -> bool {
        if self.status == status || !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        if block_number.is_some() {
            self.block_number = block_number;
        }
        true
    }

    /// Amount with its symbol, e.g. `0.5 ETH`.
    pub fn display_amount(&self) -> String {
        format_amount(self.amount, self.decimals, &self.asset_symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> TransactionRecord {
        TransactionRecord::pending_sent(
            TxHash([1; 32]),
            Address::from_bytes([2; 20]),
            U256::from(500_000_000_000_000_000u64),
            "ETH",
            18,
        )
    }

    #[test]
    fn test_allowed_transitions() {
        use TxStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Confirmed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut record = pending();
        assert!(record.advance(TxStatus::Confirmed, Some(100)));
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.block_number, Some(100));

        assert!(!record.advance(TxStatus::Failed, Some(101)));
        assert!(!record.advance(TxStatus::Pending, None));
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.block_number, Some(100));
    }

    #[test]
    fn test_display_amount() {
        assert_eq!(pending().display_amount(), "0.5 ETH");
    }
}
