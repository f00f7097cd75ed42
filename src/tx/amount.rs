//! Exact decimal coin amounts. No floating point anywhere.

use crate::error::{Result, WalletError};

pub const SATS_PER_COIN: u64 = 100_000_000;
const DECIMALS: usize = 8;

/// Parse `"1.5"`, `"0.00000001"`, `"12"` into satoshis.
pub fn parse_coins(value: &str) -> Result<u64> {
    let value = value.trim();
    let invalid = || WalletError::InvalidFormat(format!("invalid coin amount '{value}'"));
    if value.is_empty() || value.starts_with('-') || value.starts_with('+') {
        return Err(invalid());
    }
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > DECIMALS {
        return Err(WalletError::InvalidFormat(format!(
            "'{value}' has more than {DECIMALS} decimal places"
        )));
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_sats: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = DECIMALS);
        padded.parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(SATS_PER_COIN)
        .and_then(|s| s.checked_add(frac_sats))
        .ok_or_else(invalid)
}

/// Render satoshis as a decimal coin string without trailing zeros.
pub fn format_sats(sats: u64) -> String {
    let whole = sats / SATS_PER_COIN;
    let frac = sats % SATS_PER_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
