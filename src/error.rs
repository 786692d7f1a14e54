//! Error types for headers, storage and filter chain state.
use bitcoin::BlockHash;
use thiserror::Error;

use crate::chain::{Chain, FilterType};

/// Failures from a [`HashProvider`](crate::hash::HashProvider).
#[derive(Debug, Error)]
pub enum HashError {
    /// The scrypt parameters or output length were rejected.
    #[error("scrypt: {0}")]
    Scrypt(String),
}

/// Errors raised while building, decoding or serializing a header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The proof-of-work hash does not meet the target encoded in nbits.
    #[error("Invalid proof of work")]
    InvalidProofOfWork,

    /// The compact target decodes to zero or to a negative mantissa.
    #[error("invalid nbits: {0:#010x}")]
    InvalidBits(u32),

    /// A fixed-size slot of the 80-byte pre-image got the wrong number of bytes.
    #[error("{field} must be {expected} bytes, got {actual}")]
    FieldSize {
        /// Name of the offending field.
        field: &'static str,
        /// Size of the slot.
        expected: usize,
        /// Size that was supplied.
        actual: usize,
    },

    /// Every nonce was tried without meeting the target.
    #[error("Nonce not found")]
    NonceNotFound,

    /// The timestamp does not fit the 32-bit wire field.
    #[error("timestamp {0} does not fit in 32 bits")]
    TimestampOverflow(u64),

    /// Proof-of-work validation may only be skipped on the unit-test chain.
    #[error("{0} headers must be validated")]
    ValidationRequired(Chain),

    /// Unrecognised chain tag in a persisted record.
    #[error("unknown chain tag {0}")]
    UnknownChain(u32),

    /// Unrecognised status tag in a persisted record.
    #[error("unknown header status {0}")]
    UnknownStatus(u32),

    /// The parameter table carries no genesis block for this chain.
    #[error("no genesis parameters for {0}")]
    NoGenesis(Chain),

    /// The genesis fields hash to something other than the published genesis hash.
    #[error("{chain} genesis hashes to {actual}, expected {expected}")]
    GenesisMismatch {
        /// Chain being built.
        chain: Chain,
        /// Published genesis hash.
        expected: BlockHash,
        /// Hash computed from the fields.
        actual: BlockHash,
    },

    /// The header's parent hash does not match the header it is being attached to.
    #[error("header {child} does not descend from {parent}")]
    NotChild {
        /// Hash of the header being attached.
        child: BlockHash,
        /// Hash of the proposed parent.
        parent: BlockHash,
    },

    /// The header already sits at a different height.
    #[error("header {hash} is already attached at height {height}")]
    AlreadyAttached {
        /// Hash of the header.
        hash: BlockHash,
        /// Its current height.
        height: i64,
    },

    /// A header at height 0 must carry [`Status::Checkpoint`](crate::header::Status::Checkpoint).
    #[error("height 0 requires checkpoint status, got {0:?}")]
    GenesisStatus(crate::header::Status),

    /// A persisted work value disagrees with the work implied by nbits.
    #[error("stored work does not match nbits {bits:#010x}")]
    WorkMismatch {
        /// Compact target of the header.
        bits: u32,
    },

    /// Consensus decoding of the 80-byte form failed.
    #[error("header decode: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),

    /// The structured record could not be (de)serialized.
    #[error("header record: {0}")]
    Record(#[from] serde_json::Error),

    /// Writing the serialized form failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The hashing provider failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Errors from the key-value store backing the filter tables.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[cfg(feature = "store-sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row has an unexpected shape.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Fatal conditions detected while opening the filter chain state.
///
/// These mean the store is corrupt or the chain parameters are wrong.
/// Callers should stop using the store rather than retry.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The store failed while seeding genesis rows.
    #[error("store failure during genesis import: {0}")]
    Store(#[from] StoreError),

    /// The genesis filter could not be derived from the chain parameters.
    #[error("cannot build genesis filter for {chain} {filter_type:?}: {reason}")]
    Genesis {
        /// Chain being opened.
        chain: Chain,
        /// Filter type being seeded.
        filter_type: FilterType,
        /// What went wrong.
        reason: String,
    },

    /// A genesis row is absent after import.
    #[error("genesis {what} missing for {chain} {filter_type:?}")]
    GenesisMissing {
        /// Chain being opened.
        chain: Chain,
        /// Filter type being checked.
        filter_type: FilterType,
        /// Which row is missing.
        what: &'static str,
    },

    /// The stored genesis filter does not hash to the stored genesis filter header.
    #[error("genesis filter for {chain} {filter_type:?} fails validation")]
    GenesisInvalid {
        /// Chain being opened.
        chain: Chain,
        /// Filter type being checked.
        filter_type: FilterType,
    },
}
