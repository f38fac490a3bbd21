//! Ledger account address parsing and comparison.
//!
//! Addresses are 20-byte hex strings with a `0x` prefix. Comparison is
//! case-insensitive (checksummed and lowercase forms are the same account),
//! and everything persisted is stored lowercase.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// The all-zero address. Used as the payer of an anonymous royalty tip.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Regex pattern for a `0x`-prefixed 20-byte hex address.
pub const ADDRESS_PATTERN: &str = r"^0x[0-9a-fA-F]{40}$";

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ADDRESS_PATTERN).expect("valid regex"));

/// Return `true` if `value` is a well-formed address.
pub fn is_valid_address(value: &str) -> bool {
    ADDRESS_RE.is_match(value)
}

/// Validate and lowercase an address. `field` names the input in the error.
pub fn normalize_address(value: &str, field: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if !is_valid_address(trimmed) {
        return Err(CoreError::Validation(format!(
            "{field} must be a 0x-prefixed 20-byte hex address (got '{trimmed}')"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Case-insensitive address equality.
pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn accepts_checksummed_and_lowercase() {
        assert!(is_valid_address(CHECKSUMMED));
        assert!(is_valid_address(&CHECKSUMMED.to_ascii_lowercase()));
        assert!(is_valid_address(ZERO_ADDRESS));
    }

    #[test]
    fn rejects_malformed() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_valid_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAe"));
        assert!(!is_valid_address("0xZZAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        let normalized = normalize_address(&format!("  {CHECKSUMMED} "), "creator_address").unwrap();
        assert_eq!(normalized, CHECKSUMMED.to_ascii_lowercase());
    }

    #[test]
    fn normalize_names_the_field_in_errors() {
        let err = normalize_address("nope", "signer").unwrap_err();
        assert!(err.to_string().contains("signer"));
    }

    #[test]
    fn same_address_ignores_case() {
        assert!(same_address(CHECKSUMMED, &CHECKSUMMED.to_ascii_lowercase()));
        assert!(!same_address(CHECKSUMMED, ZERO_ADDRESS));
    }
}
