use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex. Used as the chunk's storage key.
pub fn generate_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// BLAKE3 of `data` as lowercase hex. Stored alongside a placement to
/// check the persisted bytes independently of the content hash.
pub fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    checksum(data).eq_ignore_ascii_case(expected)
}
