//! Money Module
//!
//! Balances and transfer amounts are fixed-point `Decimal` values with
//! [`BALANCE_DECIMALS`] fractional digits, matching the `NUMERIC(20,2)`
//! balance column. Floating point never touches a balance.
//!
//! ## Design Principles
//! 1. Explicit Error Handling: no silent rounding or truncation
//! 2. Strict client input: `"5."` and `".5"` are rejected
//!
//! ## Usage
//! ```rust
//! use minledger::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("500.5").unwrap();
//! assert_eq!(format_amount(amount), "500.50");
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

/// Fractional digits carried by every balance
pub const BALANCE_DECIMALS: u32 = 2;

/// Money parsing / validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client → Decimal
// ============================================================================

/// Parse a client-provided amount string into a validated `Decimal`.
///
/// # Errors
/// * `InvalidFormat` - empty, signed, or malformed input
/// * `PrecisionOverflow` - more than [`BALANCE_DECIMALS`] fractional digits
/// * `InvalidAmount` - zero
/// * `Overflow` - does not fit in a `Decimal`
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            if frac.contains('.') {
                return Err(MoneyError::InvalidFormat("multiple decimal points".into()));
            }
            (whole, frac)
        }
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }

    if frac.len() > BALANCE_DECIMALS as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: BALANCE_DECIMALS,
        });
    }

    let value: Decimal = amount_str.parse().map_err(|_| MoneyError::Overflow)?;
    validate_amount(value)
}

/// Validate an amount for a transfer: strictly positive, at most
/// [`BALANCE_DECIMALS`] significant fractional digits.
///
/// Trailing zeros beyond the scale are accepted (`1.500` is `1.50`); the
/// returned value is rescaled to exactly [`BALANCE_DECIMALS`].
pub fn validate_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = amount.normalize();
    if normalized.scale() > BALANCE_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: BALANCE_DECIMALS,
        });
    }

    let mut scaled = normalized;
    scaled.rescale(BALANCE_DECIMALS);
    Ok(scaled)
}

// ============================================================================
// Format: Decimal → Display string
// ============================================================================

/// Format an amount with exactly [`BALANCE_DECIMALS`] fractional digits
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount;
    value.rescale(BALANCE_DECIMALS);
    value.to_string()
}
