//! SHA-256 digests used for duplicate detection and metadata integrity.
//!
//! The content hash of a narrative is computed exactly once, at job
//! creation, and reused verbatim as the media hash during ledger
//! registration.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Content hash of a raw narrative. No normalization is applied.
pub fn content_hash(text: &str) -> String {
    sha256_hex(text.as_bytes())
}

/// Format a hex digest as a `0x`-prefixed 32-byte word for the ledger.
pub fn to_bytes32(hex_digest: &str) -> String {
    if hex_digest.starts_with("0x") {
        hex_digest.to_string()
    } else {
        format!("0x{hex_digest}")
    }
}
