//! Balance queries.
//!
//! Several tokens (or several accounts) are queried concurrently. Every leg
//! runs to completion; failed legs are logged and dropped so one broken
//! token contract does not hide the others.

use futures::future::join_all;
use primitive_types::U256;
use tracing::warn;
use tw_crypto_secp256k1::Address;

use crate::chain::{ChainClient, ChainError};
use crate::token::{Erc20, TokenBalance};

/// Native balance of one account.
pub async fn native_balance<C: ChainClient>(chain: &C, address: Address) -> Result<U256, ChainError> {
    chain.get_balance(address).await
}

/// One token's balance and metadata.
pub async fn token_balance<C: ChainClient>(
    chain: &C,
    owner: Address,
    token: Address,
) -> Result<TokenBalance, ChainError> {
    Erc20::new(chain, token).balance_with_info(&owner).await
}

/// Balances of `owner` in each of `tokens`, in input order, skipping any
/// token whose queries failed.
pub async fn token_balances<C: ChainClient>(
    chain: &C,
    owner: Address,
    tokens: &[Address],
) -> Vec<TokenBalance> {
    let results = join_all(
        tokens
            .iter()
            .map(|token| token_balance(chain, owner, *token)),
    )
    .await;

    tokens
        .iter()
        .zip(results)
        .filter_map(|(token, result)| match result {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(token = %token, "Failed to fetch token balance: {}", e);
                None
            }
        })
        .collect()
}

/// Native balances of several accounts, in input order, skipping failures.
pub async fn native_balances<C: ChainClient>(
    chain: &C,
    addresses: &[Address],
) -> Vec<(Address, U256)> {
    let results = join_all(addresses.iter().map(|address| chain.get_balance(*address))).await;

    addresses
        .iter()
        .zip(results)
        .filter_map(|(address, result)| match result {
            Ok(balance) => Some((*address, balance)),
            Err(e) => {
                warn!(address = %address, "Failed to fetch balance: {}", e);
                None
            }
        })
        .collect()
}
