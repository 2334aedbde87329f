//! Transaction Building and Signing
//!
//! Legacy (type 0) transactions with EIP-155 replay protection, encoded with
//! alloy's consensus types. Signing happens locally with the account key;
//! only the signed bytes ever leave the wallet.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{self, keccak256, Signature, TxKind};
use primitive_types::U256;
use tw_crypto_secp256k1::{Address, RecoverableSignature};

use crate::chain::TxHash;
use crate::evm::{to_alloy_address, to_alloy_u256};
use crate::keys::Signer;

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("{0} does not fit in a legacy transaction")]
    FieldOverflow(&'static str),

    #[error(transparent)]
    Signing(#[from] tw_crypto_secp256k1::Error),
}

/// An unsigned legacy transaction bound to one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    raw: Vec<u8>,
    hash: TxHash,
    signature: RecoverableSignature,
}

impl SignedTransaction {
    /// RLP-encoded signed transaction.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Keccak-256 of the raw bytes; what the node will report as the hash.
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn signature(&self) -> &RecoverableSignature {
        &self.signature
    }
}

impl LegacyTransaction {
    /// EIP-155 signing hash: keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])).
    pub fn signing_hash(&self) -> Result<[u8; 32], TxError> {
        Ok(self.to_consensus()?.signature_hash().0)
    }

    /// Sign with `signer`; the chain id is folded into `v` on encoding.
    pub fn sign(&self, signer: &Signer) -> Result<SignedTransaction, TxError> {
        let tx = self.to_consensus()?;
        let signature = signer.sign_hash(&tx.signature_hash().0)?;

        let parity_signature = Signature::new(
            primitives::U256::from_be_bytes(signature.r),
            primitives::U256::from_be_bytes(signature.s),
            signature.recovery_id == 1,
        );
        let raw = TxEnvelope::from(tx.into_signed(parity_signature)).encoded_2718();

        Ok(SignedTransaction {
            hash: TxHash(keccak256(&raw).0),
            raw,
            signature,
        })
    }

    fn to_consensus(&self) -> Result<TxLegacy, TxError> {
        Ok(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: narrow_u64(self.nonce, "nonce")?,
            gas_price: narrow_u128(self.gas_price, "gas price")?,
            gas_limit: narrow_u64(self.gas_limit, "gas limit")?,
            to: TxKind::Call(to_alloy_address(&self.to)),
            value: to_alloy_u256(self.value),
            input: self.data.clone().into(),
        })
    }
}

fn narrow_u64(value: U256, field: &'static str) -> Result<u64, TxError> {
    if value > U256::from(u64::MAX) {
        return Err(TxError::FieldOverflow(field));
    }
    Ok(value.low_u64())
}

fn narrow_u128(value: U256, field: &'static str) -> Result<u128, TxError> {
    if value > U256::from(u128::MAX) {
        return Err(TxError::FieldOverflow(field));
    }
    Ok(value.low_u128())
}
