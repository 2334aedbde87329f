//! Token Wallet
//!
//! A thin wallet for Ethereum-compatible networks. It keeps its own keys,
//! encrypted on local disk, and talks to an untrusted node over JSON-RPC
//! for everything else.
//!
//! ## Security Model
//!
//! - Private keys never leave the wallet; signing happens locally
//! - Key files are encrypted with Argon2id + ChaCha20-Poly1305
//! - Every transfer is priced and shown before it is signed
//! - A transfer is relayed at most once
//!
//! ## Components
//!
//! - [`vault`]: encrypted key storage
//! - [`validate`]: address and amount validation
//! - [`intent`]: transfer pricing, confirmation and submission
//! - [`tracker`]: confirmation tracking

pub mod balance;
pub mod chain;
pub mod config;
pub mod error;
mod evm;
pub mod history;
pub mod intent;
pub mod keys;
pub mod record;
pub mod token;
pub mod tracker;
pub mod tx;
pub mod units;
pub mod validate;
pub mod vault;

pub mod commands;

pub use chain::{ChainClient, ChainError, JsonRpcClient, TxHash};
pub use config::{Config, Network};
pub use error::ErrorClass;
pub use history::{EtherscanClient, HistoryPage, HistoryProvider};
pub use intent::{TransferBuilder, TransferDraft, TransferError};
pub use keys::{KeyMaterials, Signer};
pub use record::{TransactionRecord, TxStatus};
pub use tracker::{TrackerConfig, TransactionTracker};
pub use tw_crypto_secp256k1::Address;
pub use vault::{Vault, VaultError};
