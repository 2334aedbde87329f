//! Encrypted Key Vault
//!
//! Stores one private key per named record using:
//! - Argon2id for password-based key derivation
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Each record lives in `<dir>/<slug>.json`. Writes go through a temp file
//! in the same directory and a no-clobber rename, so a crash never leaves a
//! half-written record and an existing record is never replaced by
//! `encrypt_and_store`.

use argon2::{password_hash::SaltString, Argon2, PasswordHasher};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use tw_crypto_secp256k1::{Address, PRIVATE_KEY_LEN};
use zeroize::Zeroizing;

use crate::error::ErrorClass;
use crate::keys::{KeyMaterials, Signer};

/// Current payload format version
const PAYLOAD_VERSION: u32 = 1;

/// Name of the only supported KDF
const KDF_ARGON2ID: &str = "argon2id";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid private key or mnemonic phrase")]
    InvalidSecret,

    #[error("Invalid wallet name {0:?}: use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("A wallet named {0:?} already exists")]
    DuplicateName(String),

    #[error("Wallet {0:?} not found")]
    NotFound(String),

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Wallet record is corrupt: {0}")]
    CorruptRecord(String),

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Wallet storage error: {0}")]
    Io(#[from] io::Error),
}

impl VaultError {
    pub fn class(&self) -> ErrorClass {
        match self {
            VaultError::InvalidSecret | VaultError::InvalidName(_) | VaultError::DuplicateName(_) => {
                ErrorClass::InvalidInput
            }
            VaultError::WrongPassword => ErrorClass::AuthFailure,
            VaultError::NotFound(_) | VaultError::CorruptRecord(_) | VaultError::Io(_) => {
                ErrorClass::Storage
            }
            VaultError::Entropy(_) | VaultError::Encryption(_) => ErrorClass::Internal,
        }
    }
}

/// Argon2id cost parameters, stored with each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Encrypted private key with everything needed to decrypt it except the
/// password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Payload format version
    version: u32,

    /// Key derivation function name
    kdf: String,

    kdf_params: KdfParams,

    /// Argon2 salt (PHC base64)
    salt: String,

    /// ChaCha20-Poly1305 nonce (12 bytes, hex encoded)
    nonce: String,

    /// Encrypted private key (hex encoded)
    ciphertext: String,
}

impl EncryptedPayload {
    /// Encrypt `secret` under `password`.
    pub fn seal(secret: &[u8], password: &str, params: KdfParams) -> Result<Self, VaultError> {
        let mut rng = rand::thread_rng();

        let mut salt_bytes = [0u8; SALT_LEN];
        rng.fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let key = derive_key(password, salt.as_str(), &params)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
            .map_err(|_| VaultError::Encryption("failed to create cipher".into()))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, secret)
            .map_err(|_| VaultError::Encryption("encryption failed".into()))?;

        Ok(Self {
            version: PAYLOAD_VERSION,
            kdf: KDF_ARGON2ID.to_string(),
            kdf_params: params,
            salt: salt.to_string(),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt the payload. A tag mismatch is reported as `WrongPassword`.
    pub fn open(&self, password: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if self.version != PAYLOAD_VERSION {
            return Err(VaultError::CorruptRecord(format!(
                "unsupported payload version {} (expected {})",
                self.version, PAYLOAD_VERSION
            )));
        }
        if self.kdf != KDF_ARGON2ID {
            return Err(VaultError::CorruptRecord(format!(
                "unsupported kdf {:?}",
                self.kdf
            )));
        }

        let key = derive_key(password, &self.salt, &self.kdf_params)?;

        let nonce_bytes = hex::decode(&self.nonce)
            .map_err(|_| VaultError::CorruptRecord("invalid nonce format".into()))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|_| VaultError::CorruptRecord("invalid ciphertext format".into()))?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(VaultError::CorruptRecord("invalid nonce length".into()));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
            .map_err(|_| VaultError::Encryption("failed to create cipher".into()))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_slice())
            .map_err(|_| VaultError::WrongPassword)?;

        Ok(Zeroizing::new(plaintext))
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf_params
    }
}

/// Derive a 32-byte encryption key from password using Argon2id
fn derive_key(
    password: &str,
    salt: &str,
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
    let salt = SaltString::from_b64(salt)
        .map_err(|_| VaultError::CorruptRecord("invalid salt format".into()))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| VaultError::CorruptRecord(format!("invalid Argon2 parameters: {e}")))?,
    );

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::Encryption(format!("key derivation failed: {e}")))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| VaultError::Encryption("no hash output".into()))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&hash_output.as_bytes()[..KEY_LEN]);

    Ok(key)
}

/// A named, encrypted key as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub name: String,
    pub address: Address,
    pub encrypted: EncryptedPayload,
    pub created_at: DateTime<Utc>,
}

/// Listing entry; never contains key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    pub slug: String,
    pub name: String,
    pub address: Address,
    pub created_at: DateTime<Utc>,
}

/// Normalize a wallet name into a file-name-safe slug.
///
/// Lowercases, collapses whitespace runs into `-`, and drops every
/// character outside `[a-z0-9-_]`.
pub fn slugify(name: &str) -> Result<String, VaultError> {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect::<String>();

    if slug.is_empty() {
        return Err(VaultError::InvalidName(name.to_string()));
    }
    Ok(slug)
}

/// Directory of encrypted key records.
#[derive(Debug, Clone)]
pub struct Vault {
    dir: PathBuf,
    kdf: KdfParams,
}

impl Vault {
    pub fn new(dir: impl Into<PathBuf>, kdf: KdfParams) -> Self {
        Self {
            dir: dir.into(),
            kdf,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `name`.
    pub fn record_path(&self, name: &str) -> Result<PathBuf, VaultError> {
        Ok(self.dir.join(format!("{}.json", slugify(name)?)))
    }

    /// Check if a record exists for `name`.
    pub fn exists(&self, name: &str) -> Result<bool, VaultError> {
        Ok(self.record_path(name)?.is_file())
    }

    /// Encrypt `materials` under `password` and persist them as `name`.
    ///
    /// Fails with `DuplicateName` if a record with the same slug exists.
    pub fn encrypt_and_store(
        &self,
        materials: &KeyMaterials,
        name: &str,
        password: &str,
    ) -> Result<KeyRecord, VaultError> {
        let path = self.record_path(name)?;
        if path.exists() {
            return Err(VaultError::DuplicateName(name.to_string()));
        }

        let key_bytes = materials.private_key_bytes();
        let record = KeyRecord {
            name: name.trim().to_string(),
            address: materials.address(),
            encrypted: EncryptedPayload::seal(&key_bytes[..], password, self.kdf)?,
            created_at: Utc::now(),
        };

        self.write_record(&path, &record, false)
            .map_err(|e| match e {
                VaultError::Io(ref io) if io.kind() == io::ErrorKind::AlreadyExists => {
                    VaultError::DuplicateName(name.to_string())
                }
                other => other,
            })?;

        info!(wallet = %record.name, address = %record.address, "Stored encrypted wallet");
        Ok(record)
    }

    /// Load a record without decrypting it.
    pub fn load(&self, name: &str) -> Result<KeyRecord, VaultError> {
        let path = self.record_path(name)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&json)
            .map_err(|e| VaultError::CorruptRecord(format!("failed to parse wallet file: {e}")))
    }

    /// Decrypt the record for `name` and return a signer for its account.
    pub fn unlock(&self, name: &str, password: &str) -> Result<Signer, VaultError> {
        let record = self.load(name)?;
        let materials = decrypt_record(&record, password)?;
        debug!(wallet = %record.name, "Unlocked wallet");
        Ok(materials.signer())
    }

    /// Re-encrypt the record for `name` under a new password.
    pub fn change_password(
        &self,
        name: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), VaultError> {
        let mut record = self.load(name)?;
        let materials = decrypt_record(&record, old_password)?;

        let key_bytes = materials.private_key_bytes();
        record.encrypted = EncryptedPayload::seal(&key_bytes[..], new_password, self.kdf)?;

        let path = self.record_path(name)?;
        self.write_record(&path, &record, true)?;

        info!(wallet = %record.name, "Changed wallet password");
        Ok(())
    }

    /// List all records, sorted by slug. Never decrypts.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn list(&self) -> Result<Vec<WalletSummary>, VaultError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut wallets = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            let record: KeyRecord = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable wallet file: {}", e);
                    continue;
                }
            };

            wallets.push(WalletSummary {
                slug,
                name: record.name,
                address: record.address,
                created_at: record.created_at,
            });
        }

        wallets.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(wallets)
    }

    fn write_record(&self, path: &Path, record: &KeyRecord, replace: bool) -> Result<(), VaultError> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| VaultError::Encryption(format!("failed to serialize record: {e}")))?;

        // NamedTempFile is created with mode 0600 on unix.
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;

        if replace {
            file.persist(path).map_err(|e| e.error)?;
        } else {
            file.persist_noclobber(path).map_err(|e| e.error)?;
        }

        debug!(path = %path.display(), "Wrote wallet record");
        Ok(())
    }
}

fn decrypt_record(record: &KeyRecord, password: &str) -> Result<KeyMaterials, VaultError> {
    let plaintext = record.encrypted.open(password)?;

    let key_bytes: Zeroizing<[u8; PRIVATE_KEY_LEN]> = Zeroizing::new(
        plaintext
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::CorruptRecord("decrypted key has wrong length".into()))?,
    );

    let materials = KeyMaterials::from_private_key(&key_bytes)
        .map_err(|_| VaultError::CorruptRecord("decrypted key is not a valid scalar".into()))?;

    if materials.address() != record.address {
        return Err(VaultError::CorruptRecord(format!(
            "decrypted key controls {} but record says {}",
            materials.address(),
            record.address
        )));
    }

    Ok(materials)
}
