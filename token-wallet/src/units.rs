//! Display helpers for amounts.

use primitive_types::U256;

/// Decimals of the native currency on every supported network.
pub const NATIVE_DECIMALS: u8 = 18;

/// Format a smallest-unit amount as a decimal string.
///
/// Trailing fractional zeros are dropped but at least one fractional digit
/// is kept, so one ether formats as `1.0` and 100 wei as `0.0000000000000001`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    if decimals == 0 {
        return digits;
    }

    let decimals = decimals as usize;
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };

    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Format an amount followed by its asset symbol, e.g. `0.5 ETH`.
pub fn format_amount(value: U256, decimals: u8, symbol: &str) -> String {
    format!("{} {}", format_units(value, decimals), symbol)
}
