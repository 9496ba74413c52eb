//! Transaction outpoint type.

use xtd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};

/// Unique name of one output of one transaction.
///
/// The derived ordering (hash bytes, then index) is what the mempool's
/// spent-output index relies on for per-transaction range scans.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.hash);
        encoder.write_u32_le(self.index);
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let hash = decoder.read_hash_le()?;
        let index = decoder.read_u32_le()?;
        Ok(Self { hash, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_hash_then_index() {
        let low = OutPoint::new([1u8; 32], 7);
        let mid = OutPoint::new([2u8; 32], 0);
        let high = OutPoint::new([2u8; 32], 1);
        assert!(low < mid);
        assert!(mid < high);
    }

    #[test]
    fn null_round_trip() {
        let null = OutPoint::null();
        assert!(null.is_null());
        assert!(!OutPoint::new([0u8; 32], 0).is_null());
    }
}
