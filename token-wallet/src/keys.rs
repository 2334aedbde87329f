//! Key Management
//!
//! Handles BIP39 mnemonic generation and import of existing secrets for
//! EVM accounts. Keys are derived at the first BIP-44 Ethereum index
//! (`m/44'/60'/0'/0/0`), the account every mainstream wallet shows first.
//!
//! Security: Mnemonic phrases and raw key bytes are held in `Zeroizing`
//! wrappers that overwrite memory with zeros when dropped.

use bip39::{Language, Mnemonic};
use rand::{rngs::OsRng, RngCore};
use tw_crypto_secp256k1::{Address, RecoverableSignature, Secp256k1Keypair, PRIVATE_KEY_LEN};
use zeroize::Zeroizing;

use crate::vault::VaultError;

/// Entropy for a 12-word mnemonic.
const MNEMONIC_ENTROPY_BYTES: usize = 16;

/// Word counts a BIP-39 phrase may have.
const MNEMONIC_WORD_COUNTS: &[usize] = &[12, 15, 18, 21, 24];

/// Account index used for generated and imported phrases.
const ACCOUNT_INDEX: u32 = 0;

/// A secret entered by the user: either a raw private key or a recovery phrase.
pub enum Secret {
    PrivateKey(Zeroizing<[u8; PRIVATE_KEY_LEN]>),
    Mnemonic(Zeroizing<String>),
}

impl Secret {
    /// Classify user input.
    ///
    /// 64 hex digits (optionally `0x`-prefixed) are a private key; anything
    /// with 12, 15, 18, 21 or 24 whitespace-separated words is a mnemonic.
    pub fn parse(input: &str) -> Result<Self, VaultError> {
        let trimmed = input.trim();
        let hex_digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_digits.len() == 2 * PRIVATE_KEY_LEN
            && hex_digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
            hex::decode_to_slice(hex_digits, &mut bytes[..])
                .map_err(|_| VaultError::InvalidSecret)?;
            return Ok(Secret::PrivateKey(bytes));
        }

        let word_count = trimmed.split_whitespace().count();
        if MNEMONIC_WORD_COUNTS.contains(&word_count) {
            // The phrase must never exist outside a zeroizing buffer
            let mut normalized = Zeroizing::new(String::with_capacity(trimmed.len()));
            for (i, word) in trimmed.split_whitespace().enumerate() {
                if i > 0 {
                    normalized.push(' ');
                }
                normalized.extend(word.chars().flat_map(char::to_lowercase));
            }
            return Ok(Secret::Mnemonic(normalized));
        }

        Err(VaultError::InvalidSecret)
    }
}

/// Decrypted key material for one account.
///
/// Holds the signing key and, when the account came from a phrase, the
/// phrase itself so it can be shown once for backup.
pub struct KeyMaterials {
    keypair: Secp256k1Keypair,
    mnemonic_phrase: Option<Zeroizing<String>>,
}

impl KeyMaterials {
    /// Generate a new account from a random 12-word mnemonic.
    pub fn generate() -> Result<Self, VaultError> {
        let mut entropy = Zeroizing::new([0u8; MNEMONIC_ENTROPY_BYTES]);
        OsRng
            .try_fill_bytes(&mut entropy[..])
            .map_err(|e| VaultError::Entropy(e.to_string()))?;

        let mnemonic = Mnemonic::from_entropy(&entropy[..], Language::English)
            .map_err(|e| VaultError::Entropy(e.to_string()))?;

        Self::from_phrase(Zeroizing::new(mnemonic.phrase().to_string()))
    }

    /// Import a private key or mnemonic phrase.
    pub fn import(input: &str) -> Result<Self, VaultError> {
        match Secret::parse(input)? {
            Secret::PrivateKey(bytes) => Self::from_private_key(&bytes),
            Secret::Mnemonic(phrase) => Self::from_phrase(phrase),
        }
    }

    /// Load from raw private key bytes.
    pub fn from_private_key(bytes: &[u8; PRIVATE_KEY_LEN]) -> Result<Self, VaultError> {
        let keypair = Secp256k1Keypair::from_bytes(bytes).map_err(|_| VaultError::InvalidSecret)?;
        Ok(Self {
            keypair,
            mnemonic_phrase: None,
        })
    }

    fn from_phrase(phrase: Zeroizing<String>) -> Result<Self, VaultError> {
        let keypair = Secp256k1Keypair::from_mnemonic(&phrase, "", ACCOUNT_INDEX)
            .map_err(|_| VaultError::InvalidSecret)?;
        Ok(Self {
            keypair,
            mnemonic_phrase: Some(phrase),
        })
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// The recovery phrase, when the account was created from one.
    pub fn mnemonic_phrase(&self) -> Option<&str> {
        self.mnemonic_phrase.as_deref().map(String::as_str)
    }

    /// Get the words of the recovery phrase, if any.
    pub fn mnemonic_words(&self) -> Vec<&str> {
        self.mnemonic_phrase()
            .map(|phrase| phrase.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub(crate) fn private_key_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LEN]> {
        self.keypair.to_bytes()
    }

    /// A signing capability for this account.
    pub fn signer(&self) -> Signer {
        Signer {
            keypair: self.keypair.clone(),
        }
    }
}

/// A capability to sign for exactly one account.
///
/// Obtained from [`crate::vault::Vault::unlock`] or
/// [`KeyMaterials::signer`]. Does not expose the key bytes.
#[derive(Clone)]
pub struct Signer {
    keypair: Secp256k1Keypair,
}

impl Signer {
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Sign a 32-byte prehash.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, tw_crypto_secp256k1::Error> {
        self.keypair.sign_hash(hash)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signer({})", self.address())
    }
}
