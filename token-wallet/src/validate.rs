//! Address and amount validation.
//!
//! Every user-supplied address and amount passes through here before any
//! other component sees it. Amounts come out as exact smallest-unit
//! [`U256`] values; no floating point is involved at any step.

use primitive_types::U256;
use tw_crypto_secp256k1::{Address, AddressError};

use crate::error::ErrorClass;

/// Why an amount string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a decimal number")]
    NotNumeric,

    #[error("amount must not be negative")]
    Negative,

    #[error("amount must be greater than zero")]
    Zero,

    #[error("amount exceeds precision of {0} decimals")]
    ExceedsPrecision(u8),

    #[error("amount is too large")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: AddressError },

    #[error("Invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: AmountError },
}

impl ValidationError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::InvalidInput
    }
}

/// Parse a `0x`-prefixed or bare 40-hex-digit address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; single-case input is
/// accepted as-is.
pub fn validate_address(input: &str) -> Result<Address, ValidationError> {
    Address::parse(input.trim()).map_err(|reason| ValidationError::InvalidAddress {
        input: input.to_string(),
        reason,
    })
}

/// Parse a decimal amount into smallest units with `decimals` places.
///
/// Trailing fractional zeros beyond `decimals` are tolerated (`"1.500"` with
/// 2 decimals is 150); any other excess precision is an error.
pub fn parse_amount(input: &str, decimals: u8) -> Result<U256, ValidationError> {
    let invalid = |reason| ValidationError::InvalidAmount {
        input: input.to_string(),
        reason,
    };

    let (whole, frac) = split_decimal(input).map_err(invalid)?;

    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(invalid(AmountError::ExceedsPrecision(decimals)));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole.trim_start_matches('0'));
    digits.push_str(frac);
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    digits.push_str(&"0".repeat(decimals as usize - frac.len()));

    U256::from_dec_str(&digits).map_err(|_| invalid(AmountError::Overflow))
}

/// Check that `input` looks like a positive decimal amount without scaling
/// it.
///
/// Token amounts can only be scaled once the contract's decimals are known;
/// this lets callers reject garbage and zero before making any network
/// request.
pub fn check_amount_syntax(input: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidAmount {
        input: input.to_string(),
        reason,
    };

    let (whole, frac) = split_decimal(input).map_err(invalid)?;
    if whole.bytes().chain(frac.bytes()).all(|b| b == b'0') {
        return Err(invalid(AmountError::Zero));
    }
    Ok(())
}

/// Like [`parse_amount`] but also rejects zero.
pub fn parse_positive_amount(input: &str, decimals: u8) -> Result<U256, ValidationError> {
    let value = parse_amount(input, decimals)?;
    if value.is_zero() {
        return Err(ValidationError::InvalidAmount {
            input: input.to_string(),
            reason: AmountError::Zero,
        });
    }
    Ok(value)
}

fn split_decimal(input: &str) -> Result<(&str, &str), AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::NotNumeric);
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::NotNumeric);
    }

    Ok((whole, frac))
}
