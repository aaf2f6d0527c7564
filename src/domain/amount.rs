//! Token amounts in base units.
//!
//! On-chain quantities are 256-bit unsigned integers. They are carried as
//! [`U256`] in memory and persisted / serialized as base-10 strings so no
//! precision is lost in PostgreSQL or JSON.

pub use alloy::primitives::U256;

use crate::error::IndexerError;

/// Formats an amount as a base-10 string without sign or exponent.
#[must_use]
pub fn format_amount(amount: U256) -> String {
    amount.to_string()
}

/// Parses a base-10 unsigned integer string into a [`U256`].
///
/// Only ASCII digits are accepted: no sign, no `0x` prefix, no exponent,
/// no separators.
///
/// # Errors
///
/// Returns [`IndexerError::Decode`] when the string is empty, contains a
/// non-digit character, or does not fit in 256 bits.
pub fn parse_amount(raw: &str) -> Result<U256, IndexerError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexerError::Decode(format!("invalid amount: {raw:?}")));
    }
    U256::from_str_radix(raw, 10)
        .map_err(|e| IndexerError::Decode(format!("invalid amount {raw:?}: {e}")))
}

/// Parses an optional stored amount column.
///
/// # Errors
///
/// Returns [`IndexerError::Decode`] if the value is present but malformed.
pub fn parse_optional_amount(raw: Option<&str>) -> Result<Option<U256>, IndexerError> {
    raw.map(parse_amount).transpose()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn formats_full_width_values() {
        assert_eq!(format_amount(U256::MAX).len(), 78);
        assert_eq!(format_amount(U256::ZERO), "0");
    }

    #[test]
    fn parses_max_value_back() {
        let Ok(parsed) = parse_amount(&format_amount(U256::MAX)) else {
            panic!("max value should parse");
        };
        assert_eq!(parsed, U256::MAX);
    }

    #[test]
    fn rejects_non_decimal_forms() {
        for raw in ["", "-1", "1e18", "0x10", "1_000", " 1", "1.5"] {
            assert!(parse_amount(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overflow() {
        let too_big = format!("{}0", format_amount(U256::MAX));
        assert!(parse_amount(&too_big).is_err());
    }

    #[test]
    fn optional_amount_passes_none_through() {
        assert!(matches!(parse_optional_amount(None), Ok(None)));
        assert!(matches!(parse_optional_amount(Some("7")), Ok(Some(v)) if v == U256::from(7)));
    }
}
