//! Row layouts for the filter tables.
//!
//! Tip rows are keyed by the filter-type byte; per-block rows by the
//! filter-type byte followed by the block hash in internal byte order.
use bitcoin::bip158::{BlockFilter, FilterHash, FilterHeader};
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use std::fmt;

use crate::chain::FilterType;
use crate::error::StoreError;

/// A (height, block hash) pair marking how far a table has advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Height, `-1` for the blank position.
    pub height: i64,
    /// Block at that height.
    pub hash: BlockHash,
}

impl Position {
    const ENCODED_LEN: usize = 8 + 32;

    /// Position at `height`.
    pub const fn new(height: i64, hash: BlockHash) -> Self {
        Self { height, hash }
    }

    /// The "nothing stored yet" position.
    pub fn blank() -> Self {
        Self::new(-1, BlockHash::all_zeros())
    }

    /// Whether this is the blank position.
    pub fn is_blank(&self) -> bool {
        self.height < 0
    }

    pub(crate) fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..].copy_from_slice(self.hash.as_byte_array());
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(StoreError::Corrupt(format!(
                "position row is {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[..8]);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[8..]);
        Ok(Self::new(i64::from_le_bytes(height), BlockHash::from_byte_array(hash)))
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}

/// Filter header of one block together with the filter hash it commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterHeaderRecord {
    /// Block the filter belongs to.
    pub block_hash: BlockHash,
    /// Rolling filter header at this block.
    pub header: FilterHeader,
    /// Hash of the block's filter.
    pub filter_hash: FilterHash,
}

impl FilterHeaderRecord {
    const VALUE_LEN: usize = 64;

    /// Record for `filter`, chained onto `previous`.
    pub fn next(block_hash: BlockHash, filter: &BlockFilter, previous: &FilterHeader) -> Self {
        let filter_hash = self::filter_hash(filter);
        Self {
            block_hash,
            header: filter_hash.filter_header(previous),
            filter_hash,
        }
    }

    pub(crate) fn encode_value(&self) -> [u8; Self::VALUE_LEN] {
        let mut out = [0u8; Self::VALUE_LEN];
        out[..32].copy_from_slice(self.header.as_byte_array());
        out[32..].copy_from_slice(self.filter_hash.as_byte_array());
        out
    }

    pub(crate) fn decode_value(block_hash: BlockHash, bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != Self::VALUE_LEN {
            return Err(StoreError::Corrupt(format!(
                "filter header row for {block_hash} is {} bytes, expected {}",
                bytes.len(),
                Self::VALUE_LEN
            )));
        }
        let mut header = [0u8; 32];
        header.copy_from_slice(&bytes[..32]);
        let mut filter_hash = [0u8; 32];
        filter_hash.copy_from_slice(&bytes[32..]);
        Ok(Self {
            block_hash,
            header: FilterHeader::from_byte_array(header),
            filter_hash: FilterHash::from_byte_array(filter_hash),
        })
    }
}

/// Hash of a filter's serialized bytes, as committed to by filter headers.
pub fn filter_hash(filter: &BlockFilter) -> FilterHash {
    FilterHash::hash(&filter.content)
}

pub(crate) fn tip_key(filter_type: FilterType) -> [u8; 1] {
    [filter_type.as_u8()]
}

pub(crate) fn block_key(filter_type: FilterType, block: &BlockHash) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = filter_type.as_u8();
    key[1..].copy_from_slice(block.as_byte_array());
    key
}
