//! Conversions between the wallet's own types and alloy's primitives.
//!
//! The wallet keeps `primitive_types::U256` and the crypto crate's
//! [`Address`] throughout; alloy types only appear where transactions and
//! calldata are encoded.

use alloy::primitives;
use primitive_types::U256;
use tw_crypto_secp256k1::Address;

pub(crate) fn to_alloy_address(address: &Address) -> primitives::Address {
    primitives::Address::from(*address.as_bytes())
}

pub(crate) fn to_alloy_u256(value: U256) -> primitives::U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    primitives::U256::from_be_bytes(buf)
}

pub(crate) fn from_alloy_u256(value: primitives::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}
