//! Wei formatting and parsing
//!
//! Integer-only conversions between wei and decimal ether strings.

use crate::error::{ShieldError, ShieldResult};
use crate::types::{Wei, WEI_PER_ETH};

const ETH_DECIMALS: usize = 18;

/// Format wei as a decimal ether string without trailing zeros
pub fn format_ether(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETH;
    let frac = wei % WEI_PER_ETH;

    if frac == 0 {
        return format!("{}.0", whole);
    }

    let frac_str = format!("{:0width$}", frac, width = ETH_DECIMALS);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// Parse a decimal ether string ("0.05", "1", "1.") into wei
pub fn parse_ether(input: &str) -> ShieldResult<Wei> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ShieldError::invalid_input("Amount is empty"));
    }

    let (whole_str, frac_str) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if frac_str.len() > ETH_DECIMALS {
        return Err(ShieldError::invalid_input(format!(
            "Too many decimals in amount: {}",
            trimmed
        )));
    }

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole_str)
        || !all_digits(frac_str)
        || (whole_str.is_empty() && frac_str.is_empty())
    {
        return Err(ShieldError::invalid_input(format!("Invalid amount: {}", trimmed)));
    }

    let whole: Wei = if whole_str.is_empty() {
        0
    } else {
        whole_str
            .parse()
            .map_err(|_| ShieldError::invalid_input(format!("Amount too large: {}", trimmed)))?
    };

    let frac: Wei = if frac_str.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac_str, width = ETH_DECIMALS);
        padded
            .parse()
            .map_err(|_| ShieldError::invalid_input(format!("Invalid amount: {}", trimmed)))?
    };

    whole
        .checked_mul(WEI_PER_ETH)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| ShieldError::invalid_input(format!("Amount too large: {}", trimmed)))
}

/// Parse a `0x`-prefixed hex quantity as returned by JSON-RPC
pub fn parse_hex_quantity(value: &str) -> ShieldResult<Wei> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ShieldError::parse_error(format!("Quantity is not hex: {}", value)))?;

    if digits.is_empty() {
        return Ok(0);
    }

    Wei::from_str_radix(digits, 16)
        .map_err(|_| ShieldError::parse_error(format!("Invalid hex quantity: {}", value)))
}
