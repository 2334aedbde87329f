// Copyright (c) 2024 The Botho Foundation

#![deny(unsafe_code)]

//! Secp256k1 keys for EVM-compatible accounts.
//!
//! Keys are derived from BIP-39 mnemonics along the BIP-44 Ethereum path
//! `m/44'/60'/0'/0/{index}`, or loaded from raw 32-byte scalars. Signing is
//! done over 32-byte prehashes and always returns the recovery id, which is
//! what transaction encodings need to fold into `v`.
//!
//! # Examples
//!
//! ```
//! use tw_crypto_secp256k1::Secp256k1Keypair;
//!
//! let mnemonic = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
//! let keypair = Secp256k1Keypair::from_mnemonic(mnemonic, "", 0).unwrap();
//!
//! assert_eq!(
//!     keypair.address().to_string(),
//!     "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
//! );
//! ```

mod address;

pub use address::{Address, AddressError, ADDRESS_LEN};

use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic, Seed};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

/// Errors that can occur during key operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("Key derivation failed: {0}")]
    DerivationError(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Signing failed: {0}")]
    SigningError(String),
}

/// Length of a raw secp256k1 private key.
pub const PRIVATE_KEY_LEN: usize = 32;

/// A 64-byte `r || s` signature plus its recovery id (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

/// A secp256k1 keypair.
#[derive(Clone)]
pub struct Secp256k1Keypair {
    signing_key: SigningKey,
}

impl core::fmt::Debug for Secp256k1Keypair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secp256k1Keypair {{ address: {} }}", self.address())
    }
}

impl Secp256k1Keypair {
    /// Derive a keypair from a BIP-39 English mnemonic.
    ///
    /// `passphrase` is the optional BIP-39 "25th word"; pass `""` for none.
    pub fn from_mnemonic(phrase: &str, passphrase: &str, index: u32) -> Result<Self, Error> {
        let mnemonic =
            Mnemonic::from_phrase(phrase, Language::English).map_err(|_| Error::InvalidMnemonic)?;

        let seed = Seed::new(&mnemonic, passphrase);
        Self::from_seed(seed.as_bytes(), index)
    }

    /// Derive a keypair from a 64-byte BIP-39 seed at `m/44'/60'/0'/0/{index}`.
    pub fn from_seed(seed: &[u8], index: u32) -> Result<Self, Error> {
        let path: DerivationPath = format!("m/44'/60'/0'/0/{index}")
            .parse()
            .map_err(|e: bip32::Error| Error::DerivationError(e.to_string()))?;

        let xprv = XPrv::derive_from_path(seed, &path)
            .map_err(|e| Error::DerivationError(e.to_string()))?;

        Ok(Self {
            signing_key: xprv.private_key().clone(),
        })
    }

    /// Load a keypair from raw private key bytes.
    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LEN]) -> Result<Self, Error> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Raw private key bytes, zeroized when the wrapper is dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LEN]> {
        let mut out = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// Uncompressed public key (`0x04 || x || y`).
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        encode_uncompressed(self.signing_key.verifying_key())
    }

    /// The account address controlled by this key.
    pub fn address(&self) -> Address {
        Address::from_uncompressed_public_key(&self.public_key_uncompressed())
    }

    /// Sign a 32-byte prehash, returning a low-S signature with recovery id.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, Error> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| Error::SigningError(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

fn encode_uncompressed(key: &VerifyingKey) -> [u8; 65] {
    let point = key.to_encoded_point(false);
    let mut result = [0u8; 65];
    result.copy_from_slice(point.as_bytes());
    result
}

/// Recover the signer's address from a prehash and signature.
pub fn recover_address(hash: &[u8; 32], signature: &RecoverableSignature) -> Option<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);

    let recovery_id = RecoveryId::try_from(signature.recovery_id).ok()?;
    let sig = K256Signature::from_slice(&rs).ok()?;
    let verifying_key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id).ok()?;

    Some(Address::from_uncompressed_public_key(&encode_uncompressed(
        &verifying_key,
    )))
}
