use sha2::{Digest, Sha256};
use xtd_consensus::Hash256;

pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Display form of a hash: byte-reversed hex, as the RPC layer prints ids.
pub fn hash_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_is_double_sha256() {
        let data = b"xtd";
        assert_eq!(sha256d(data), sha256(&sha256(data)));
    }

    #[test]
    fn hex_is_byte_reversed() {
        let mut hash = [0u8; 32];
        hash[0] = 0xab;
        hash[31] = 0x01;
        let hex = hash_to_hex(&hash);
        assert!(hex.starts_with("01"));
        assert!(hex.ends_with("ab"));
        assert_eq!(hex.len(), 64);
    }
}
