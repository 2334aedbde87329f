//! Integration tests for token-wallet
//!
//! These tests exercise the components together against an in-memory chain:
//! - Wallet lifecycle (generate, import, store, unlock, sign)
//! - Input validation
//! - Transfer estimation, confirmation and submission
//! - Confirmation tracking
//! - Balance fan-out and history fan-out

use alloy::sol_types::SolValue;
use primitive_types::U256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use token_wallet::{
    balance::{native_balances, token_balances},
    chain::{CallRequest, ChainClient, ChainError, Receipt, TxHash},
    error::ErrorClass,
    history::{
        combined_history, fetch_history, EtherscanClient, HistoryError, HistoryPage,
        HistoryProvider,
    },
    intent::{FeeEstimate, TransferBuilder, TransferDraft, TransferError, TransferIntent},
    keys::KeyMaterials,
    record::{Direction, TransactionRecord, TxStatus},
    token::{encode_transfer, BALANCE_OF_SELECTOR, DECIMALS_SELECTOR, NAME_SELECTOR, SYMBOL_SELECTOR},
    tracker::{TrackerConfig, TrackerError, TransactionTracker},
    validate::{parse_amount, validate_address, ValidationError},
    vault::{KdfParams, Vault, VaultError},
    Address,
};

const TEST_PASSWORD: &str = "secure-test-password-123!";
const CHAIN_ID: u64 = 11155111;

// EIP-155 example key and its account
const TEST_PRIVATE_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";
const TEST_KEY_ADDRESS: &str = "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F";

const RECIPIENT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Cheap Argon2 parameters so tests stay fast
fn test_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

fn test_vault() -> (TempDir, Vault) {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(dir.path().join("wallets"), test_kdf());
    (dir, vault)
}

fn keccak(data: &[u8]) -> [u8; 32] {
    alloy::primitives::keccak256(data).0
}

fn wei(units: u64) -> U256 {
    U256::from(units)
}

// ============================================================================
// Mock Chain
// ============================================================================

struct MockToken {
    symbol: String,
    decimals: u8,
    balances: HashMap<Address, U256>,
}

/// In-memory node. Every request bumps a counter so tests can assert that
/// nothing reached the network.
struct MockChain {
    gas_limit: U256,
    gas_price: Mutex<U256>,
    balances: HashMap<Address, U256>,
    tokens: HashMap<Address, MockToken>,
    failing_tokens: HashSet<Address>,
    send_error: Option<ChainError>,
    receipts: Mutex<VecDeque<Result<Option<Receipt>, ChainError>>>,
    requests: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockChain {
    fn new() -> Self {
        Self {
            gas_limit: wei(21_000),
            gas_price: Mutex::new(wei(1_000_000_000)),
            balances: HashMap::new(),
            tokens: HashMap::new(),
            failing_tokens: HashSet::new(),
            send_error: None,
            receipts: Mutex::new(VecDeque::new()),
            requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn with_gas(mut self, gas_limit: u64, gas_price: u64) -> Self {
        self.gas_limit = wei(gas_limit);
        self.gas_price = Mutex::new(wei(gas_price));
        self
    }

    fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.balances.insert(address, balance);
        self
    }

    fn with_token(mut self, token: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens.insert(
            token,
            MockToken {
                symbol: symbol.to_string(),
                decimals,
                balances: HashMap::new(),
            },
        );
        self
    }

    fn with_token_balance(mut self, token: Address, owner: Address, balance: U256) -> Self {
        if let Some(entry) = self.tokens.get_mut(&token) {
            entry.balances.insert(owner, balance);
        }
        self
    }

    fn with_failing_token(mut self, token: Address) -> Self {
        self.failing_tokens.insert(token);
        self
    }

    fn with_send_error(mut self, error: ChainError) -> Self {
        self.send_error = Some(error);
        self
    }

    fn set_gas_price(&self, gas_price: u64) {
        *self.gas_price.lock().unwrap() = wei(gas_price);
    }

    fn push_receipt(&self, receipt: Result<Option<Receipt>, ChainError>) {
        self.receipts.lock().unwrap().push_back(receipt);
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn hit(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

fn uint_word(value: U256) -> Vec<u8> {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word.to_vec()
}

/// ABI encoding of a single `string` return value
fn abi_string(s: &str) -> Vec<u8> {
    (s.to_string(),).abi_encode_params()
}

impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.hit();
        Ok(CHAIN_ID)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.hit();
        Ok(self.balances.get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.hit();
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<U256, ChainError> {
        self.hit();
        Ok(self.gas_limit)
    }

    async fn get_transaction_count(&self, _address: Address) -> Result<U256, ChainError> {
        self.hit();
        Ok(wei(self.sent.lock().unwrap().len() as u64))
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        self.hit();
        if self.failing_tokens.contains(&request.to) {
            return Err(ChainError::Reverted("mock failure".into()));
        }
        let token = self
            .tokens
            .get(&request.to)
            .ok_or_else(|| ChainError::Reverted("no contract".into()))?;
        let data = request.data.as_ref().map(|d| d.as_slice()).unwrap_or_default();
        let selector: [u8; 4] = data[..4].try_into().unwrap();

        match selector {
            BALANCE_OF_SELECTOR => {
                let owner: [u8; 20] = data[16..36].try_into().unwrap();
                let owner = Address::from_bytes(owner);
                Ok(uint_word(token.balances.get(&owner).copied().unwrap_or_default()))
            }
            DECIMALS_SELECTOR => Ok(uint_word(wei(token.decimals as u64))),
            SYMBOL_SELECTOR => Ok(abi_string(&token.symbol)),
            NAME_SELECTOR => Ok(abi_string(&format!("{} Token", token.symbol))),
            _ => Err(ChainError::Reverted("unknown selector".into())),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        self.hit();
        if let Some(e) = &self.send_error {
            return Err(e.clone());
        }
        self.sent.lock().unwrap().push(raw.to_vec());
        Ok(TxHash(keccak(raw)))
    }

    async fn get_transaction_receipt(&self, _hash: TxHash) -> Result<Option<Receipt>, ChainError> {
        self.hit();
        self.receipts.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn approve(_: &TransferIntent, _: &FeeEstimate) -> bool {
    true
}

fn reject(_: &TransferIntent, _: &FeeEstimate) -> bool {
    false
}

// ============================================================================
// Wallet Lifecycle Tests
// ============================================================================

mod wallet_lifecycle {
    use super::*;

    #[test]
    fn test_generate_store_unlock() {
        let (_dir, vault) = test_vault();

        let materials = KeyMaterials::generate().unwrap();
        assert_eq!(materials.mnemonic_words().len(), 12);

        let record = vault
            .encrypt_and_store(&materials, "Main Wallet", TEST_PASSWORD)
            .unwrap();
        assert_eq!(record.address, materials.address());
        assert!(vault.dir().join("main-wallet.json").is_file());

        let signer = vault.unlock("Main Wallet", TEST_PASSWORD).unwrap();
        assert_eq!(signer.address(), materials.address());
    }

    #[test]
    fn test_import_private_key_round_trip() {
        let (_dir, vault) = test_vault();

        let materials = KeyMaterials::import(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(materials.address().to_checksum(), TEST_KEY_ADDRESS);
        assert!(materials.mnemonic_phrase().is_none());

        vault.encrypt_and_store(&materials, "imported", TEST_PASSWORD).unwrap();
        let signer = vault.unlock("imported", TEST_PASSWORD).unwrap();
        assert_eq!(signer.address().to_checksum(), TEST_KEY_ADDRESS);
    }

    #[test]
    fn test_wrong_password_is_auth_failure() {
        let (_dir, vault) = test_vault();
        let materials = KeyMaterials::generate().unwrap();
        vault.encrypt_and_store(&materials, "main", TEST_PASSWORD).unwrap();

        let err = vault.unlock("main", "wrong-password").unwrap_err();
        assert!(matches!(err, VaultError::WrongPassword));
        assert_eq!(err.class(), ErrorClass::AuthFailure);
    }

    #[test]
    fn test_duplicate_name_keeps_original() {
        let (_dir, vault) = test_vault();
        let first = KeyMaterials::generate().unwrap();
        let second = KeyMaterials::generate().unwrap();

        vault.encrypt_and_store(&first, "main", TEST_PASSWORD).unwrap();
        let err = vault
            .encrypt_and_store(&second, "MAIN", "another-password")
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateName(_)));

        let signer = vault.unlock("main", TEST_PASSWORD).unwrap();
        assert_eq!(signer.address(), first.address());
    }

    #[test]
    fn test_list_is_idempotent() {
        let (_dir, vault) = test_vault();
        assert!(vault.list().unwrap().is_empty());

        for name in ["savings", "alpha", "trading"] {
            let materials = KeyMaterials::generate().unwrap();
            vault.encrypt_and_store(&materials, name, TEST_PASSWORD).unwrap();
        }

        let first = vault.list().unwrap();
        let second = vault.list().unwrap();
        assert_eq!(first, second);

        let names: Vec<_> = first.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["alpha", "savings", "trading"]);
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_amount_with_trailing_zeros() {
        assert_eq!(parse_amount("1.000100", 6).unwrap(), wei(1_000_100));
    }

    #[test]
    fn test_amount_rejects_garbage_and_negative() {
        for input in ["abc", "-1"] {
            let err = parse_amount(input, 18).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidAmount { .. }));
            assert_eq!(err.class(), ErrorClass::InvalidInput);
        }
    }

    #[test]
    fn test_address_prefix_optional() {
        let with_prefix = validate_address(RECIPIENT).unwrap();
        let without_prefix = validate_address(&RECIPIENT[2..]).unwrap();
        assert_eq!(with_prefix, without_prefix);
    }

    #[test]
    fn test_address_wrong_length_rejected() {
        let short = format!("0x{}", "a".repeat(39));
        let long = format!("0x{}", "a".repeat(41));
        for input in [short, long] {
            assert!(matches!(
                validate_address(&input),
                Err(ValidationError::InvalidAddress { .. })
            ));
        }
    }
}

// ============================================================================
// Transfer Tests
// ============================================================================

mod transfers {
    use super::*;

    fn source() -> KeyMaterials {
        KeyMaterials::import(TEST_PRIVATE_KEY).unwrap()
    }

    fn token_address() -> Address {
        Address::from_bytes([0xcc; 20])
    }

    #[tokio::test]
    async fn test_native_amount_plus_fee_exceeds_balance() {
        let keys = source();
        // Fee is exactly 1 wei
        let chain = MockChain::new()
            .with_gas(1, 1)
            .with_balance(keys.address(), wei(100));
        let builder = TransferBuilder::new(&chain, "ETH");

        // 100 wei
        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.0000000000000001", None).unwrap();
        let err = builder.estimate(draft).await.unwrap_err();

        match &err {
            TransferError::InsufficientFunds {
                required,
                available,
                ..
            } => {
                assert_eq!(*required, wei(101));
                assert_eq!(*available, wei(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.class(), ErrorClass::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_native_exact_balance_is_enough() {
        let keys = source();
        let chain = MockChain::new()
            .with_gas(1, 1)
            .with_balance(keys.address(), wei(101));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.0000000000000001", None).unwrap();
        let estimated = builder.estimate(draft).await.unwrap();

        assert_eq!(estimated.intent().amount(), wei(100));
        assert_eq!(estimated.intent().estimated_fee(), wei(1));
        assert_eq!(estimated.estimate().fee, wei(1));
        assert_eq!(estimated.estimate().total_cost, wei(101));
        assert_eq!(estimated.intent().asset_symbol(), "ETH");
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_chain() {
        let keys = source();
        let chain = MockChain::new().with_balance(keys.address(), wei(1_000_000));

        let bad_address = TransferDraft::new(keys.address(), "0x1234", "1", None);
        assert!(matches!(bad_address, Err(TransferError::InvalidInput(_))));

        let bad_amount = TransferDraft::new(keys.address(), RECIPIENT, "abc", None);
        assert!(matches!(bad_amount, Err(TransferError::InvalidInput(_))));

        let token_hex = token_address().to_checksum();
        let zero_token = TransferDraft::new(keys.address(), RECIPIENT, "0", Some(&token_hex));
        assert!(matches!(zero_token, Err(TransferError::InvalidInput(_))));

        assert_eq!(chain.requests(), 0);
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_submit_relays_once() {
        let keys = source();
        let chain = MockChain::new().with_balance(keys.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();
        let record = builder.submit(confirmed, &keys.signer()).await.unwrap();

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(record.hash, TxHash(keccak(&sent[0])));
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.direction, Direction::Sent);
        assert_eq!(record.counterparty, validate_address(RECIPIENT).unwrap());
        assert_eq!(record.display_amount(), "0.01 ETH");
    }

    #[tokio::test]
    async fn test_user_rejection_sends_nothing() {
        let keys = source();
        let chain = MockChain::new().with_balance(keys.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let err = builder.estimate(draft).await.unwrap().confirm(&reject).unwrap_err();

        assert!(matches!(err, TransferError::UserRejected));
        assert_eq!(err.class(), ErrorClass::UserRejected);
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fee_increase_is_stale() {
        let keys = source();
        let chain = MockChain::new()
            .with_gas(21_000, 1_000_000_000)
            .with_balance(keys.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();

        chain.set_gas_price(2_000_000_000);
        let err = builder.submit(confirmed, &keys.signer()).await.unwrap_err();

        match err {
            TransferError::StaleEstimate { confirmed, current } => {
                assert_eq!(confirmed, wei(21_000_000_000_000));
                assert_eq!(current, wei(42_000_000_000_000));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fee_decrease_is_accepted() {
        let keys = source();
        let chain = MockChain::new()
            .with_gas(21_000, 2_000_000_000)
            .with_balance(keys.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();

        chain.set_gas_price(1_000_000_000);
        builder.submit(confirmed, &keys.signer()).await.unwrap();
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_signer_must_match_source() {
        let keys = source();
        let other = KeyMaterials::generate().unwrap();
        let chain = MockChain::new().with_balance(keys.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();
        let err = builder.submit(confirmed, &other.signer()).await.unwrap_err();

        assert!(matches!(err, TransferError::SignerMismatch { .. }));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_relay_insufficient_funds_is_mapped() {
        let keys = source();
        let chain = MockChain::new()
            .with_balance(keys.address(), wei(10u64.pow(18)))
            .with_send_error(ChainError::InsufficientFunds);
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();
        let err = builder.submit(confirmed, &keys.signer()).await.unwrap_err();

        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
        assert_eq!(err.class(), ErrorClass::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_relay_rpc_error_is_relay_class() {
        let keys = source();
        let chain = MockChain::new()
            .with_balance(keys.address(), wei(10u64.pow(18)))
            .with_send_error(ChainError::Rpc {
                code: -32000,
                message: "nonce too low".into(),
            });
        let builder = TransferBuilder::new(&chain, "ETH");

        let draft = TransferDraft::new(keys.address(), RECIPIENT, "0.01", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();
        let err = builder.submit(confirmed, &keys.signer()).await.unwrap_err();

        assert!(matches!(err, TransferError::Relay(_)));
        assert_eq!(err.class(), ErrorClass::Relay);
    }

    #[tokio::test]
    async fn test_token_transfer_submit() {
        let keys = source();
        let token = token_address();
        let chain = MockChain::new()
            .with_balance(keys.address(), wei(10u64.pow(18)))
            .with_token(token, "USDC", 6)
            .with_token_balance(token, keys.address(), wei(5_000_000));
        let builder = TransferBuilder::new(&chain, "ETH");

        let token_hex = token.to_checksum();
        let draft = TransferDraft::new(keys.address(), RECIPIENT, "2.5", Some(&token_hex)).unwrap();
        let estimated = builder.estimate(draft).await.unwrap();
        assert_eq!(estimated.intent().amount(), wei(2_500_000));
        assert_eq!(estimated.intent().asset_symbol(), "USDC");
        assert_eq!(estimated.estimate().token_balance, Some(wei(5_000_000)));
        assert_eq!(estimated.estimate().total_cost, estimated.estimate().fee);

        let record = builder
            .submit(estimated.confirm(&approve).unwrap(), &keys.signer())
            .await
            .unwrap();
        assert_eq!(record.display_amount(), "2.5 USDC");

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        let calldata = encode_transfer(&validate_address(RECIPIENT).unwrap(), wei(2_500_000));
        assert!(contains(&sent[0], &calldata));
        assert!(contains(&sent[0], token.as_bytes()));
    }

    #[tokio::test]
    async fn test_token_balance_too_low() {
        let keys = source();
        let token = token_address();
        let chain = MockChain::new()
            .with_balance(keys.address(), wei(10u64.pow(18)))
            .with_token(token, "USDC", 6)
            .with_token_balance(token, keys.address(), wei(1_000_000));
        let builder = TransferBuilder::new(&chain, "ETH");

        let token_hex = token.to_checksum();
        let draft = TransferDraft::new(keys.address(), RECIPIENT, "2", Some(&token_hex)).unwrap();
        let err = builder.estimate(draft).await.unwrap_err();

        assert!(matches!(err, TransferError::InsufficientTokenBalance { .. }));
        assert_eq!(err.class(), ErrorClass::InsufficientFunds);
        assert_eq!(err.to_string(), "Insufficient USDC balance: need 2.0, have 1.0");
    }

    #[tokio::test]
    async fn test_token_fee_not_covered() {
        let keys = source();
        let token = token_address();
        let chain = MockChain::new()
            .with_gas(50_000, 1_000_000_000)
            .with_balance(keys.address(), wei(1_000))
            .with_token(token, "USDC", 6)
            .with_token_balance(token, keys.address(), wei(5_000_000));
        let builder = TransferBuilder::new(&chain, "ETH");

        let token_hex = token.to_checksum();
        let draft = TransferDraft::new(keys.address(), RECIPIENT, "1", Some(&token_hex)).unwrap();
        let err = builder.estimate(draft).await.unwrap_err();

        assert!(matches!(err, TransferError::InsufficientFeeFunds { .. }));
        assert_eq!(err.class(), ErrorClass::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_token_precision_checked_against_decimals() {
        let keys = source();
        let token = token_address();
        let chain = MockChain::new()
            .with_balance(keys.address(), wei(10u64.pow(18)))
            .with_token(token, "USDC", 6)
            .with_token_balance(token, keys.address(), wei(5_000_000));
        let builder = TransferBuilder::new(&chain, "ETH");

        let token_hex = token.to_checksum();
        let draft =
            TransferDraft::new(keys.address(), RECIPIENT, "1.0000001", Some(&token_hex)).unwrap();
        let err = builder.estimate(draft).await.unwrap_err();

        assert!(matches!(
            err,
            TransferError::InvalidInput(ValidationError::InvalidAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_stored_wallet_can_send() {
        let (_dir, vault) = test_vault();
        let materials = source();
        vault.encrypt_and_store(&materials, "main", TEST_PASSWORD).unwrap();

        let chain = MockChain::new().with_balance(materials.address(), wei(10u64.pow(18)));
        let builder = TransferBuilder::new(&chain, "ETH");

        let summary = vault.list().unwrap().remove(0);
        let draft = TransferDraft::new(summary.address, RECIPIENT, "0.5", None).unwrap();
        let confirmed = builder.estimate(draft).await.unwrap().confirm(&approve).unwrap();

        let signer = vault.unlock(&summary.slug, TEST_PASSWORD).unwrap();
        builder.submit(confirmed, &signer).await.unwrap();
        assert_eq!(chain.sent().len(), 1);
    }
}

// ============================================================================
// Tracker Tests
// ============================================================================

mod tracking {
    use super::*;

    fn pending() -> TransactionRecord {
        TransactionRecord::pending_sent(
            TxHash([7; 32]),
            Address::from_bytes([2; 20]),
            wei(1),
            "ETH",
            18,
        )
    }

    fn config(timeout_secs: u64) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_secs(4),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_after_polling() {
        let chain = MockChain::new();
        chain.push_receipt(Ok(None));
        chain.push_receipt(Ok(None));
        chain.push_receipt(Ok(Some(Receipt {
            block_number: 42,
            succeeded: true,
        })));

        let tracker = TransactionTracker::new(&chain, pending(), config(60));
        let mut updates = tracker.subscribe();

        let record = tracker.await_confirmation().await.unwrap();
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.block_number, Some(42));
        assert_eq!(chain.requests(), 3);

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().status, TxStatus::Confirmed);
        assert_eq!(tracker.current(), record);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_is_failed() {
        let chain = MockChain::new();
        chain.push_receipt(Ok(Some(Receipt {
            block_number: 9,
            succeeded: false,
        })));

        let tracker = TransactionTracker::new(&chain, pending(), config(60));
        let record = tracker.await_confirmation().await.unwrap();
        assert_eq!(record.status, TxStatus::Failed);
        assert_eq!(tracker.status(), TxStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_pending() {
        let chain = MockChain::new();
        let tracker = TransactionTracker::new(&chain, pending(), config(20));

        let err = tracker.await_confirmation().await.unwrap_err();
        assert!(matches!(err, TrackerError::Timeout(_)));
        assert_eq!(tracker.status(), TxStatus::Pending);
        assert!(chain.requests() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_not_retried() {
        let chain = MockChain::new();
        chain.push_receipt(Err(ChainError::Network("connection refused".into())));

        let tracker = TransactionTracker::new(&chain, pending(), config(60));
        let err = tracker.await_confirmation().await.unwrap_err();

        assert!(matches!(err, TrackerError::Chain(ChainError::Network(_))));
        assert_eq!(err.class(), ErrorClass::Network);
        assert_eq!(chain.requests(), 1);
        assert_eq!(tracker.status(), TxStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_observation_only() {
        let chain = MockChain::new();
        let tracker = TransactionTracker::new(&chain, pending(), config(300));

        let waited =
            tokio::time::timeout(Duration::from_secs(10), tracker.await_confirmation()).await;
        assert!(waited.is_err());
        assert_eq!(tracker.status(), TxStatus::Pending);

        chain.push_receipt(Ok(Some(Receipt {
            block_number: 5,
            succeeded: true,
        })));
        let record = tracker.await_confirmation().await.unwrap();
        assert_eq!(record.status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_terminal_record_not_polled() {
        let chain = MockChain::new();
        let mut record = pending();
        assert!(record.advance(TxStatus::Confirmed, Some(3)));

        let tracker = TransactionTracker::new(&chain, record.clone(), config(60));
        assert_eq!(tracker.await_confirmation().await.unwrap(), record);
        assert_eq!(chain.requests(), 0);
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut record = pending();
        assert!(record.advance(TxStatus::Failed, Some(1)));
        assert!(!record.advance(TxStatus::Confirmed, Some(2)));
        assert!(!record.advance(TxStatus::Pending, None));
        assert_eq!(record.status, TxStatus::Failed);
        assert_eq!(record.block_number, Some(1));
    }
}

// ============================================================================
// Balance Tests
// ============================================================================

mod balances {
    use super::*;

    #[tokio::test]
    async fn test_token_fan_out_keeps_successes() {
        let owner = Address::from_bytes([0x11; 20]);
        let usdc = Address::from_bytes([0xaa; 20]);
        let broken = Address::from_bytes([0xbb; 20]);
        let dai = Address::from_bytes([0xdd; 20]);

        let chain = MockChain::new()
            .with_token(usdc, "USDC", 6)
            .with_token_balance(usdc, owner, wei(1_500_000))
            .with_token(broken, "BRK", 18)
            .with_failing_token(broken)
            .with_token(dai, "DAI", 18)
            .with_token_balance(dai, owner, wei(2 * 10u64.pow(18)));

        let results = token_balances(&chain, owner, &[usdc, broken, dai]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].token.symbol, "USDC");
        assert_eq!(results[0].token.name, "USDC Token");
        assert_eq!(results[0].balance, wei(1_500_000));
        assert_eq!(results[1].token.symbol, "DAI");
        assert_eq!(results[1].token.decimals, 18);
    }

    #[tokio::test]
    async fn test_native_fan_out() {
        let a = Address::from_bytes([0x01; 20]);
        let b = Address::from_bytes([0x02; 20]);
        let chain = MockChain::new().with_balance(a, wei(5));

        let results = native_balances(&chain, &[a, b]).await;
        assert_eq!(results, vec![(a, wei(5)), (b, U256::zero())]);
    }
}

// ============================================================================
// History Tests
// ============================================================================

mod history {
    use super::*;

    /// Serves one native and one token record, or fails the legs it is
    /// told to fail.
    #[derive(Default)]
    struct MockHistory {
        calls: Mutex<Vec<(&'static str, Option<Address>, usize)>>,
        fail_native: bool,
        fail_tokens: bool,
    }

    fn record(block: u64, symbol: &str) -> TransactionRecord {
        TransactionRecord {
            hash: TxHash([block as u8; 32]),
            status: TxStatus::Confirmed,
            block_number: Some(block),
            counterparty: Address::from_bytes([0x22; 20]),
            direction: Direction::Received,
            amount: wei(1),
            asset_symbol: symbol.to_string(),
            decimals: 18,
            timestamp: None,
        }
    }

    impl HistoryProvider for MockHistory {
        async fn list_transactions(
            &self,
            _address: Address,
            limit: usize,
        ) -> Result<HistoryPage, HistoryError> {
            self.calls.lock().unwrap().push(("txlist", None, limit));
            if self.fail_native {
                return Err(HistoryError::Network("explorer down".into()));
            }
            Ok(HistoryPage {
                transactions: vec![record(10, "ETH")],
                ..HistoryPage::default()
            })
        }

        async fn list_token_transfers(
            &self,
            _address: Address,
            token: Option<Address>,
            limit: usize,
        ) -> Result<HistoryPage, HistoryError> {
            self.calls.lock().unwrap().push(("tokentx", token, limit));
            if self.fail_tokens {
                return Err(HistoryError::Api("NOTOK: rate limited".into()));
            }
            Ok(HistoryPage {
                transactions: vec![record(20, "USDC")],
                ..HistoryPage::default()
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_token() {
        let provider = MockHistory::default();
        let owner = Address::from_bytes([0x11; 20]);
        let token = Address::from_bytes([0xaa; 20]);

        fetch_history(&provider, owner, Some(token), 5).await.unwrap();

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("tokentx", Some(token), 5)]);
    }

    #[tokio::test]
    async fn test_combined_history_merges_newest_first() {
        let provider = MockHistory::default();
        let owner = Address::from_bytes([0x11; 20]);

        let page = fetch_history(&provider, owner, None, 10).await.unwrap();

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&("txlist", None, 10)));
        assert!(calls.contains(&("tokentx", None, 10)));

        let symbols: Vec<_> = page
            .transactions
            .iter()
            .map(|r| r.asset_symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["USDC", "ETH"]);
        assert!(!page.incomplete);
        assert!(!page.degraded);
    }

    #[tokio::test]
    async fn test_combined_history_keeps_successful_leg() {
        let provider = MockHistory {
            fail_tokens: true,
            ..MockHistory::default()
        };
        let owner = Address::from_bytes([0x11; 20]);

        let page = combined_history(&provider, owner, 10).await.unwrap();
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].asset_symbol, "ETH");
        assert!(page.incomplete);
        // Both legs were attempted despite the failure
        assert_eq!(provider.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_combined_history_fails_when_every_leg_fails() {
        let provider = MockHistory {
            fail_native: true,
            fail_tokens: true,
            ..MockHistory::default()
        };
        let owner = Address::from_bytes([0x11; 20]);

        let err = combined_history(&provider, owner, 10).await.unwrap_err();
        assert_eq!(err, HistoryError::Network("explorer down".into()));
        assert_eq!(err.class(), ErrorClass::Network);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_degraded_not_error() {
        let client = EtherscanClient::new(CHAIN_ID, None, "ETH").unwrap();
        let owner = validate_address(RECIPIENT).unwrap();

        let page = fetch_history(&client, owner, None, 10).await.unwrap();
        assert!(page.degraded);
        assert!(page.transactions.is_empty());

        let page = fetch_history(&client, owner, Some(owner), 10).await.unwrap();
        assert!(page.degraded);
    }
}
