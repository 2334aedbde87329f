//! ERC-20 contract access.
//!
//! Calldata and return values are encoded from the [`IERC20`] interface
//! below. Only the handful of functions a wallet needs are covered.

use alloy::sol_types::SolCall;
use futures::try_join;
use primitive_types::U256;
use tw_crypto_secp256k1::Address;

use crate::chain::{Bytes, CallRequest, ChainClient, ChainError};
use crate::evm::{from_alloy_u256, to_alloy_address, to_alloy_u256};

alloy::sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }
}

pub const BALANCE_OF_SELECTOR: [u8; 4] = IERC20::balanceOfCall::SELECTOR;
pub const TRANSFER_SELECTOR: [u8; 4] = IERC20::transferCall::SELECTOR;
pub const DECIMALS_SELECTOR: [u8; 4] = IERC20::decimalsCall::SELECTOR;
pub const SYMBOL_SELECTOR: [u8; 4] = IERC20::symbolCall::SELECTOR;
pub const NAME_SELECTOR: [u8; 4] = IERC20::nameCall::SELECTOR;

/// Token metadata read from the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A token balance with the metadata needed to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: TokenInfo,
    pub balance: U256,
}

pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    IERC20::balanceOfCall {
        owner: to_alloy_address(owner),
    }
    .abi_encode()
}

pub fn encode_transfer(to: &Address, amount: U256) -> Vec<u8> {
    IERC20::transferCall {
        to: to_alloy_address(to),
        amount: to_alloy_u256(amount),
    }
    .abi_encode()
}

/// Decode the return data of call `C`.
pub fn decode_returns<C: SolCall>(data: &[u8]) -> Result<C::Return, ChainError> {
    C::abi_decode_returns(data).map_err(|e| ChainError::InvalidResponse(e.to_string()))
}

/// Decode a `string` return value.
///
/// Some older tokens return `bytes32` instead of a dynamic string; a single
/// word is read as NUL-padded text.
pub fn decode_text<C: SolCall<Return = String>>(data: &[u8]) -> Result<String, ChainError> {
    if let Ok(word) = <&[u8; 32]>::try_from(data) {
        let end = word.iter().position(|b| *b == 0).unwrap_or(word.len());
        return Ok(String::from_utf8_lossy(&word[..end]).into_owned());
    }
    decode_returns::<C>(data)
}

/// An ERC-20 contract reached through a [`ChainClient`].
pub struct Erc20<'a, C> {
    chain: &'a C,
    address: Address,
}

impl<'a, C: ChainClient> Erc20<'a, C> {
    pub fn new(chain: &'a C, address: Address) -> Self {
        Self { chain, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.chain.call(&CallRequest::call(self.address, data)).await
    }

    pub async fn balance_of(&self, owner: &Address) -> Result<U256, ChainError> {
        let data = self.call(encode_balance_of(owner)).await?;
        decode_returns::<IERC20::balanceOfCall>(&data).map(from_alloy_u256)
    }

    pub async fn decimals(&self) -> Result<u8, ChainError> {
        let data = self.call(IERC20::decimalsCall {}.abi_encode()).await?;
        decode_returns::<IERC20::decimalsCall>(&data)
    }

    pub async fn symbol(&self) -> Result<String, ChainError> {
        let data = self.call(IERC20::symbolCall {}.abi_encode()).await?;
        decode_text::<IERC20::symbolCall>(&data)
    }

    pub async fn name(&self) -> Result<String, ChainError> {
        let data = self.call(IERC20::nameCall {}.abi_encode()).await?;
        decode_text::<IERC20::nameCall>(&data)
    }

    /// Name, symbol and decimals, fetched concurrently.
    pub async fn info(&self) -> Result<TokenInfo, ChainError> {
        let (name, symbol, decimals) = try_join!(self.name(), self.symbol(), self.decimals())?;
        Ok(TokenInfo {
            address: self.address,
            name,
            symbol,
            decimals,
        })
    }

    /// Metadata and `owner`'s balance.
    pub async fn balance_with_info(&self, owner: &Address) -> Result<TokenBalance, ChainError> {
        let (token, balance) = try_join!(self.info(), self.balance_of(owner))?;
        Ok(TokenBalance { token, balance })
    }

    /// The call that moves `amount` from `from` to `to`.
    pub fn transfer_request(&self, from: Address, to: &Address, amount: U256) -> CallRequest {
        CallRequest {
            from: Some(from),
            to: self.address,
            value: None,
            data: Some(Bytes(encode_transfer(to, amount))),
        }
    }
}
