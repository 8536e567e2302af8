//! SHA-256 checksums for raw payloads.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 of a byte payload
pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the checksum of a JSON value in its compact serialized form
pub fn json_checksum(value: &serde_json::Value) -> String {
    compute_checksum(value.to_string().as_bytes())
}
