//! Error classification shared by every component.
//!
//! Each component owns a closed error enum (`VaultError`, `ValidationError`,
//! `ChainError`, `HistoryError`, `TransferError`, `TrackerError`). They all
//! map onto one coarse [`ErrorClass`] so callers can branch on the kind of
//! failure without matching every variant.

use std::fmt;

/// Coarse failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed address, amount, secret or wallet name.
    InvalidInput,
    /// Wrong password or a signer that does not own the source account.
    AuthFailure,
    /// Balance cannot cover the amount and fee.
    InsufficientFunds,
    /// Node or explorer unreachable, or an unexpected response.
    Network,
    /// The user declined to confirm.
    UserRejected,
    /// The node refused the signed transaction.
    Relay,
    /// Reading or writing the wallet directory failed.
    Storage,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::InvalidInput => "invalid input",
            ErrorClass::AuthFailure => "authentication failure",
            ErrorClass::InsufficientFunds => "insufficient funds",
            ErrorClass::Network => "network error",
            ErrorClass::UserRejected => "rejected by user",
            ErrorClass::Relay => "relay error",
            ErrorClass::Storage => "storage error",
            ErrorClass::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
