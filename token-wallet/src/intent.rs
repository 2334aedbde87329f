//! Transfer Intent Builder
//!
//! A transfer moves through a fixed sequence of types, and each step
//! consumes the previous one:
//!
//! ```text
//! TransferDraft --estimate--> EstimatedTransfer --confirm--> ConfirmedTransfer --submit--> TransactionRecord
//! ```
//!
//! Input is validated when the draft is built, before any network request.
//! Fees and balances are checked at estimation and again at submission.
//! Because submission consumes the confirmed transfer, one intent can only
//! ever be relayed once.

use futures::try_join;
use primitive_types::U256;
use tracing::{debug, info, warn};
use tw_crypto_secp256k1::Address;

use crate::chain::{CallRequest, ChainClient, ChainError};
use crate::error::ErrorClass;
use crate::keys::Signer;
use crate::record::TransactionRecord;
use crate::token::{encode_transfer, Erc20};
use crate::tx::LegacyTransaction;
use crate::units::{format_units, NATIVE_DECIMALS};
use crate::validate::{check_amount_syntax, parse_positive_amount, validate_address, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error(
        "Insufficient funds: need {} {symbol}, balance is {} {symbol}",
        format_units(*.required, *.decimals),
        format_units(*.available, *.decimals)
    )]
    InsufficientFunds {
        required: U256,
        available: U256,
        symbol: String,
        decimals: u8,
    },

    #[error(
        "Insufficient {symbol} balance: need {}, have {}",
        format_units(*.required, *.decimals),
        format_units(*.available, *.decimals)
    )]
    InsufficientTokenBalance {
        required: U256,
        available: U256,
        symbol: String,
        decimals: u8,
    },

    #[error(
        "Insufficient {symbol} to pay the network fee: need {}, have {}",
        format_units(*.required, NATIVE_DECIMALS),
        format_units(*.available, NATIVE_DECIMALS)
    )]
    InsufficientFeeFunds {
        required: U256,
        available: U256,
        symbol: String,
    },

    #[error(
        "Network fee rose from {} to {} since confirmation; review the transfer again",
        format_units(*.confirmed, NATIVE_DECIMALS),
        format_units(*.current, NATIVE_DECIMALS)
    )]
    StaleEstimate { confirmed: U256, current: U256 },

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Signer {signer} cannot send from {expected}")]
    SignerMismatch { signer: Address, expected: Address },

    #[error("Failed to relay transaction: {0}")]
    Relay(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Amount plus fee does not fit in 256 bits")]
    Overflow,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransferError::InvalidInput(e) => e.class(),
            TransferError::InsufficientFunds { .. }
            | TransferError::InsufficientTokenBalance { .. }
            | TransferError::InsufficientFeeFunds { .. } => ErrorClass::InsufficientFunds,
            TransferError::StaleEstimate { .. } | TransferError::Relay(_) => ErrorClass::Relay,
            TransferError::UserRejected => ErrorClass::UserRejected,
            TransferError::SignerMismatch { .. } => ErrorClass::AuthFailure,
            TransferError::Signing(_) => ErrorClass::Internal,
            TransferError::Overflow => ErrorClass::InvalidInput,
            TransferError::Chain(e) => e.class(),
        }
    }
}

/// What is being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Native,
    /// ERC-20 transfer on the given contract.
    Token(Address),
}

/// Validated user input for a transfer, not yet priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDraft {
    source: Address,
    recipient: Address,
    amount: String,
    kind: TransferKind,
}

impl TransferDraft {
    /// Validate the recipient, the optional token contract and the amount.
    ///
    /// Native amounts are fully parsed here. Token amounts are only checked
    /// for syntax; they are scaled once the contract's decimals are known.
    pub fn new(
        source: Address,
        to: &str,
        amount: &str,
        token: Option<&str>,
    ) -> Result<Self, TransferError> {
        let recipient = validate_address(to)?;
        let kind = match token {
            Some(token) => TransferKind::Token(validate_address(token)?),
            None => TransferKind::Native,
        };

        match kind {
            TransferKind::Native => {
                parse_positive_amount(amount, NATIVE_DECIMALS)?;
            }
            TransferKind::Token(_) => check_amount_syntax(amount)?,
        }

        Ok(Self {
            source,
            recipient,
            amount: amount.trim().to_string(),
            kind,
        })
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }
}

/// A fully priced transfer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    kind: TransferKind,
    source: Address,
    recipient: Address,
    amount: U256,
    estimated_fee: U256,
    asset_symbol: String,
    decimals: u8,
}

impl TransferIntent {
    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    /// Amount in the asset's smallest unit.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Fee in wei at estimation time.
    pub fn estimated_fee(&self) -> U256 {
        self.estimated_fee
    }

    pub fn asset_symbol(&self) -> &str {
        &self.asset_symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// Fee preview and the balances it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_limit: U256,
    pub gas_price: U256,
    /// `gas_limit * gas_price`, in wei.
    pub fee: U256,
    /// Native currency the transfer consumes: amount plus fee for native
    /// transfers, the fee alone for tokens.
    pub total_cost: U256,
    /// Native balance of the source account.
    pub native_balance: U256,
    /// Token balance of the source account, for token transfers.
    pub token_balance: Option<U256>,
}

/// Decides whether a priced transfer should go ahead.
///
/// The CLI prompts the user; tests and `--yes` answer directly. Any
/// `Fn(&TransferIntent, &FeeEstimate) -> bool` works.
pub trait Confirm {
    fn confirm(&self, intent: &TransferIntent, estimate: &FeeEstimate) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&TransferIntent, &FeeEstimate) -> bool,
{
    fn confirm(&self, intent: &TransferIntent, estimate: &FeeEstimate) -> bool {
        self(intent, estimate)
    }
}

/// A priced transfer waiting for the user's decision.
#[derive(Debug, Clone)]
pub struct EstimatedTransfer {
    intent: TransferIntent,
    estimate: FeeEstimate,
}

impl EstimatedTransfer {
    pub fn intent(&self) -> &TransferIntent {
        &self.intent
    }

    pub fn estimate(&self) -> &FeeEstimate {
        &self.estimate
    }

    /// Ask `confirmer`; a refusal is `UserRejected`.
    pub fn confirm(self, confirmer: &impl Confirm) -> Result<ConfirmedTransfer, TransferError> {
        if !confirmer.confirm(&self.intent, &self.estimate) {
            info!("Transfer rejected at confirmation");
            return Err(TransferError::UserRejected);
        }
        Ok(ConfirmedTransfer {
            intent: self.intent,
            estimate: self.estimate,
        })
    }
}

/// A transfer the user approved. Consumed by [`TransferBuilder::submit`].
#[derive(Debug)]
pub struct ConfirmedTransfer {
    intent: TransferIntent,
    estimate: FeeEstimate,
}

impl ConfirmedTransfer {
    pub fn intent(&self) -> &TransferIntent {
        &self.intent
    }

    pub fn estimate(&self) -> &FeeEstimate {
        &self.estimate
    }
}

/// Prices, signs and relays transfers through a [`ChainClient`].
pub struct TransferBuilder<'a, C> {
    chain: &'a C,
    native_symbol: String,
}

impl<'a, C: ChainClient> TransferBuilder<'a, C> {
    pub fn new(chain: &'a C, native_symbol: impl Into<String>) -> Self {
        Self {
            chain,
            native_symbol: native_symbol.into(),
        }
    }

    /// Price a draft and check that the source account can afford it.
    pub async fn estimate(&self, draft: TransferDraft) -> Result<EstimatedTransfer, TransferError> {
        let (amount, asset_symbol, decimals) = match draft.kind {
            TransferKind::Native => (
                parse_positive_amount(&draft.amount, NATIVE_DECIMALS)?,
                self.native_symbol.clone(),
                NATIVE_DECIMALS,
            ),
            TransferKind::Token(address) => {
                let token = Erc20::new(self.chain, address);
                let (symbol, decimals) = try_join!(token.symbol(), token.decimals())?;
                (parse_positive_amount(&draft.amount, decimals)?, symbol, decimals)
            }
        };

        let mut intent = TransferIntent {
            kind: draft.kind,
            source: draft.source,
            recipient: draft.recipient,
            amount,
            estimated_fee: U256::zero(),
            asset_symbol,
            decimals,
        };

        let estimate = self.quote(&intent).await?;
        intent.estimated_fee = estimate.fee;

        debug!(
            gas_limit = %estimate.gas_limit,
            gas_price = %estimate.gas_price,
            fee = %estimate.fee,
            "Estimated transfer"
        );

        Ok(EstimatedTransfer { intent, estimate })
    }

    /// Re-price, sign and relay a confirmed transfer.
    ///
    /// Fails without relaying if the signer is not the source account, if
    /// funds no longer suffice, or if the fee now exceeds what the user
    /// confirmed. A relayed transaction is never resubmitted.
    pub async fn submit(
        &self,
        confirmed: ConfirmedTransfer,
        signer: &Signer,
    ) -> Result<TransactionRecord, TransferError> {
        let ConfirmedTransfer {
            intent,
            estimate: confirmed_estimate,
        } = confirmed;

        if signer.address() != intent.source {
            return Err(TransferError::SignerMismatch {
                signer: signer.address(),
                expected: intent.source,
            });
        }

        let fresh = self.quote(&intent).await?;
        if fresh.fee > confirmed_estimate.fee {
            return Err(TransferError::StaleEstimate {
                confirmed: confirmed_estimate.fee,
                current: fresh.fee,
            });
        }

        let (nonce, chain_id) = try_join!(
            self.chain.get_transaction_count(intent.source),
            self.chain.chain_id()
        )?;

        let (to, value, data) = match intent.kind {
            TransferKind::Native => (intent.recipient, intent.amount, Vec::new()),
            TransferKind::Token(token) => (
                token,
                U256::zero(),
                encode_transfer(&intent.recipient, intent.amount),
            ),
        };

        let tx = LegacyTransaction {
            nonce,
            gas_price: fresh.gas_price,
            gas_limit: fresh.gas_limit,
            to,
            value,
            data,
            chain_id,
        };
        let signed = tx
            .sign(signer)
            .map_err(|e| TransferError::Signing(e.to_string()))?;

        let hash = match self.chain.send_raw_transaction(signed.raw()).await {
            Ok(hash) => hash,
            Err(ChainError::InsufficientFunds) => {
                return Err(TransferError::InsufficientFunds {
                    required: fresh.total_cost,
                    available: fresh.native_balance,
                    symbol: self.native_symbol.clone(),
                    decimals: NATIVE_DECIMALS,
                })
            }
            Err(ChainError::UserRejected) => return Err(TransferError::UserRejected),
            Err(e) => return Err(TransferError::Relay(e.to_string())),
        };

        if hash != signed.hash() {
            warn!(node = %hash, local = %signed.hash(), "Node reported an unexpected transaction hash");
        }

        info!(
            hash = %hash,
            to = %intent.recipient,
            amount = %format_units(intent.amount, intent.decimals),
            symbol = %intent.asset_symbol,
            "Transaction submitted"
        );

        Ok(TransactionRecord::pending_sent(
            hash,
            intent.recipient,
            intent.amount,
            intent.asset_symbol,
            intent.decimals,
        ))
    }

    /// Fetch balances, gas price and gas limit for `intent` and check
    /// affordability.
    async fn quote(&self, intent: &TransferIntent) -> Result<FeeEstimate, TransferError> {
        match intent.kind {
            TransferKind::Native => self.quote_native(intent).await,
            TransferKind::Token(address) => self.quote_token(intent, address).await,
        }
    }

    async fn quote_native(&self, intent: &TransferIntent) -> Result<FeeEstimate, TransferError> {
        let (balance, gas_price) =
            try_join!(self.chain.get_balance(intent.source), self.chain.gas_price())?;

        let insufficient = |required| TransferError::InsufficientFunds {
            required,
            available: balance,
            symbol: self.native_symbol.clone(),
            decimals: NATIVE_DECIMALS,
        };

        if intent.amount > balance {
            return Err(insufficient(intent.amount));
        }

        let request = CallRequest {
            from: Some(intent.source),
            to: intent.recipient,
            value: Some(intent.amount),
            data: None,
        };
        let gas_limit = match self.chain.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(ChainError::InsufficientFunds) => return Err(insufficient(intent.amount)),
            Err(e) => return Err(e.into()),
        };

        let fee = gas_limit
            .checked_mul(gas_price)
            .ok_or(TransferError::Overflow)?;
        let total = intent
            .amount
            .checked_add(fee)
            .ok_or(TransferError::Overflow)?;
        if total > balance {
            return Err(insufficient(total));
        }

        Ok(FeeEstimate {
            gas_limit,
            gas_price,
            fee,
            total_cost: total,
            native_balance: balance,
            token_balance: None,
        })
    }

    async fn quote_token(
        &self,
        intent: &TransferIntent,
        address: Address,
    ) -> Result<FeeEstimate, TransferError> {
        let token = Erc20::new(self.chain, address);
        let (token_balance, native_balance, gas_price) = try_join!(
            token.balance_of(&intent.source),
            self.chain.get_balance(intent.source),
            self.chain.gas_price()
        )?;

        // Estimating a transfer the token would reject only yields a revert.
        if intent.amount > token_balance {
            return Err(TransferError::InsufficientTokenBalance {
                required: intent.amount,
                available: token_balance,
                symbol: intent.asset_symbol.clone(),
                decimals: intent.decimals,
            });
        }

        let request = token.transfer_request(intent.source, &intent.recipient, intent.amount);
        let gas_limit = self.chain.estimate_gas(&request).await?;

        let fee = gas_limit
            .checked_mul(gas_price)
            .ok_or(TransferError::Overflow)?;
        if fee > native_balance {
            return Err(TransferError::InsufficientFeeFunds {
                required: fee,
                available: native_balance,
                symbol: self.native_symbol.clone(),
            });
        }

        Ok(FeeEstimate {
            gas_limit,
            gas_price,
            fee,
            total_cost: fee,
            native_balance,
            token_balance: Some(token_balance),
        })
    }
}
