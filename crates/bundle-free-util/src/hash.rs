use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the SHA-256 hash of a string, returning the hex-encoded digest.
#[must_use]
pub fn sha256_str(data: &str) -> String {
    sha256_bytes(data.as_bytes())
}
