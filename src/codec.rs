//! Canonical 80-byte block header pre-image.
//!
//! Layout, all integers little-endian:
//!
//! | offset | size | field       |
//! |--------|------|-------------|
//! | 0      | 4    | version     |
//! | 4      | 32   | parent hash |
//! | 36     | 32   | merkle root |
//! | 68     | 4    | time        |
//! | 72     | 4    | nbits       |
//! | 76     | 4    | nonce       |
use bitcoin::hash_types::TxMerkleNode;
use bitcoin::hashes::Hash;
use bitcoin::pow::CompactTarget;
use bitcoin::{block, consensus, BlockHash};

use crate::{
    chain::Chain,
    error::HeaderError,
    hash::{HashProvider, PowHash},
};

/// Size of the serialized header.
pub const HEADER_SIZE: usize = 80;

const HASH_SIZE: usize = 32;

const _: () = assert!(HEADER_SIZE == 4 + HASH_SIZE + HASH_SIZE + 4 + 4 + 4);

/// The fields that make up the pre-image.
///
/// `timestamp` is wider than the wire slot; [`encode`] keeps its low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitcoinFields {
    /// Block version as carried on the wire.
    pub block_version: i32,
    /// Hash of the previous block.
    pub parent: BlockHash,
    /// Merkle root of the block's transactions.
    pub merkle_root: TxMerkleNode,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Compact difficulty target.
    pub bits: CompactTarget,
    /// Nonce.
    pub nonce: u32,
}

impl BitcoinFields {
    /// Serialize into the 80-byte pre-image.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        encode(self)
    }
}

/// Serialize typed fields into the 80-byte pre-image.
pub fn encode(fields: &BitcoinFields) -> [u8; HEADER_SIZE] {
    write(
        fields.block_version,
        &fields.parent.to_byte_array(),
        &fields.merkle_root.to_byte_array(),
        fields.timestamp as u32,
        fields.bits.to_consensus(),
        fields.nonce,
    )
}

/// Serialize raw fields, checking that both hash slots hold exactly 32 bytes.
pub fn encode_slices(
    version: i32,
    parent: &[u8],
    merkle_root: &[u8],
    time: u32,
    bits: u32,
    nonce: u32,
) -> Result<[u8; HEADER_SIZE], HeaderError> {
    let parent = fixed(parent, "parent hash")?;
    let merkle_root = fixed(merkle_root, "merkle root")?;
    Ok(write(version, &parent, &merkle_root, time, bits, nonce))
}

/// Parse an 80-byte pre-image.
pub fn decode(bytes: &[u8]) -> Result<BitcoinFields, HeaderError> {
    if bytes.len() != HEADER_SIZE {
        return Err(HeaderError::FieldSize {
            field: "header",
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    let raw: block::Header = consensus::encode::deserialize(bytes)?;
    Ok(BitcoinFields {
        block_version: raw.version.to_consensus(),
        parent: raw.prev_blockhash,
        merkle_root: raw.merkle_root,
        timestamp: u64::from(raw.time),
        bits: raw.bits,
        nonce: raw.nonce,
    })
}

/// Identity hash of a pre-image.
pub fn block_hash<P: HashProvider + ?Sized>(
    provider: &P,
    chain: Chain,
    bytes: &[u8; HEADER_SIZE],
) -> Result<BlockHash, HeaderError> {
    Ok(provider.block_hash(chain, bytes)?)
}

/// Proof-of-work hash of a pre-image.
pub fn pow_hash<P: HashProvider + ?Sized>(
    provider: &P,
    chain: Chain,
    bytes: &[u8; HEADER_SIZE],
) -> Result<PowHash, HeaderError> {
    Ok(provider.pow_hash(chain, bytes)?)
}

fn fixed(bytes: &[u8], field: &'static str) -> Result<[u8; HASH_SIZE], HeaderError> {
    bytes.try_into().map_err(|_| HeaderError::FieldSize {
        field,
        expected: HASH_SIZE,
        actual: bytes.len(),
    })
}

fn write(
    version: i32,
    parent: &[u8; HASH_SIZE],
    merkle_root: &[u8; HASH_SIZE],
    time: u32,
    bits: u32,
    nonce: u32,
) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&version.to_le_bytes());
    out[4..36].copy_from_slice(parent);
    out[36..68].copy_from_slice(merkle_root);
    out[68..72].copy_from_slice(&time.to_le_bytes());
    out[72..76].copy_from_slice(&bits.to_le_bytes());
    out[76..80].copy_from_slice(&nonce.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> BitcoinFields {
        BitcoinFields {
            block_version: 0x2000_0000,
            parent: BlockHash::from_byte_array([0x11; 32]),
            merkle_root: TxMerkleNode::from_byte_array([0x22; 32]),
            timestamp: 1_700_000_000,
            bits: CompactTarget::from_consensus(0x1703_a30c),
            nonce: 0xdead_beef,
        }
    }

    #[test]
    fn layout_is_little_endian_and_packed() {
        let bytes = sample().encode();
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0x20]);
        assert!(bytes[4..36].iter().all(|b| *b == 0x11));
        assert!(bytes[36..68].iter().all(|b| *b == 0x22));
        assert_eq!(&bytes[68..72], &1_700_000_000u32.to_le_bytes());
        assert_eq!(&bytes[72..76], &[0x0c, 0xa3, 0x03, 0x17]);
        assert_eq!(&bytes[76..80], &[0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn matches_consensus_encoding() {
        let f = sample();
        let raw = block::Header {
            version: block::Version::from_consensus(f.block_version),
            prev_blockhash: f.parent,
            merkle_root: f.merkle_root,
            time: f.timestamp as u32,
            bits: f.bits,
            nonce: f.nonce,
        };
        assert_eq!(consensus::encode::serialize(&raw), f.encode().to_vec());
    }

    #[test]
    fn rejects_wrong_slot_sizes() {
        let err = encode_slices(1, &[0u8; 31], &[0u8; 32], 0, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            HeaderError::FieldSize { field: "parent hash", expected: 32, actual: 31 }
        ));
        let err = encode_slices(1, &[0u8; 32], &[0u8; 33], 0, 0, 0).unwrap_err();
        assert!(matches!(err, HeaderError::FieldSize { field: "merkle root", actual: 33, .. }));
        assert!(matches!(decode(&[0u8; 79]), Err(HeaderError::FieldSize { .. })));
    }

    proptest! {
        #[test]
        fn slices_and_fields_agree(
            version in any::<i32>(),
            parent in any::<[u8; 32]>(),
            merkle in any::<[u8; 32]>(),
            time in any::<u32>(),
            bits in any::<u32>(),
            nonce in any::<u32>(),
        ) {
            let from_slices = encode_slices(version, &parent, &merkle, time, bits, nonce).unwrap();
            let decoded = decode(&from_slices).unwrap();
            prop_assert_eq!(decoded.encode(), from_slices);
            prop_assert_eq!(decoded.timestamp, u64::from(time));
        }
    }
}
