//! Structured, persisted form of a header.
//!
//! Hashes are never stored: [`Header::from_record`] recomputes them from the
//! wire fields, so a tampered record or a changed hashing provider surfaces as
//! a hash mismatch (or a failed proof of work) instead of being trusted.
use bitcoin::hashes::Hash;
use bitcoin::Work;
use serde::{Deserialize, Serialize};

use super::{Header, HeaderParts, Status};
use crate::{chain::Chain, codec, error::HeaderError, hash::HashProvider, pow};

/// Envelope shared by all chain families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    /// Envelope version.
    pub version: u32,
    /// [`Chain::tag`] of the header's chain.
    pub chain: u32,
    /// Position of the header in the local chain.
    pub local: LocalRecord,
    /// Bitcoin-family wire fields.
    pub bitcoin: BitcoinRecord,
}

/// Chain position and accumulated work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Record part version.
    pub version: u32,
    /// Height, `-1` when unattached.
    pub height: i64,
    /// [`Status::tag`] of the local status.
    pub status: u32,
    /// [`Status::tag`] of the inherited status.
    pub inherited_status: u32,
    /// Own work, 32 bytes big-endian.
    #[serde(with = "hex::serde")]
    pub work: Vec<u8>,
    /// Parent's cumulative work, 32 bytes big-endian.
    #[serde(with = "hex::serde")]
    pub inherited_work: Vec<u8>,
}

/// Bitcoin-family header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinRecord {
    /// Sub-version.
    pub version: u32,
    /// Block version.
    pub block_version: i32,
    /// Parent hash, internal byte order.
    #[serde(with = "hex::serde")]
    pub previous_header: Vec<u8>,
    /// Merkle root, internal byte order.
    #[serde(with = "hex::serde")]
    pub merkle_hash: Vec<u8>,
    /// Seconds since the Unix epoch.
    pub timestamp: u32,
    /// Compact target.
    pub nbits: u32,
    /// Nonce.
    pub nonce: u32,
}

const LOCAL_VERSION: u32 = 1;

impl Header {
    /// Structured form of this header.
    ///
    /// Fails with [`HeaderError::TimestampOverflow`] when the timestamp does
    /// not fit the 32-bit record field.
    pub fn to_record(&self) -> Result<HeaderRecord, HeaderError> {
        let timestamp = u32::try_from(self.fields.timestamp)
            .map_err(|_| HeaderError::TimestampOverflow(self.fields.timestamp))?;
        Ok(HeaderRecord {
            version: self.version,
            chain: self.chain.tag(),
            local: LocalRecord {
                version: LOCAL_VERSION,
                height: self.height,
                status: self.local.tag(),
                inherited_status: self.inherited.tag(),
                work: self.work.to_be_bytes().to_vec(),
                inherited_work: self.inherited_work.to_be_bytes().to_vec(),
            },
            bitcoin: BitcoinRecord {
                version: self.sub_version,
                block_version: self.fields.block_version,
                previous_header: self.fields.parent.to_byte_array().to_vec(),
                merkle_hash: self.fields.merkle_root.to_byte_array().to_vec(),
                timestamp,
                nbits: self.fields.bits.to_consensus(),
                nonce: self.fields.nonce,
            },
        })
    }

    /// Rebuild a header from its record, recomputing identity and PoW hashes.
    ///
    /// Proof of work is checked on every chain except [`Chain::UnitTest`].
    /// The stored own work must equal the work implied by nbits; inherited
    /// work depends on ancestors and is re-derived by [`Header::attach_to`].
    pub fn from_record<P: HashProvider + ?Sized>(
        provider: &P,
        record: &HeaderRecord,
    ) -> Result<Self, HeaderError> {
        let chain = Chain::from_tag(record.chain).ok_or(HeaderError::UnknownChain(record.chain))?;
        let b = &record.bitcoin;
        let preimage = codec::encode_slices(
            b.block_version,
            &b.previous_header,
            &b.merkle_hash,
            b.timestamp,
            b.nbits,
            b.nonce,
        )?;
        let fields = codec::decode(&preimage)?;
        let work = pow::work(fields.bits, chain)?;
        if work_from(&record.local.work, "work")? != work {
            return Err(HeaderError::WorkMismatch { bits: b.nbits });
        }

        Header::new(
            HeaderParts {
                version: record.version,
                chain,
                hash: codec::block_hash(provider, chain, &preimage)?,
                pow: codec::pow_hash(provider, chain, &preimage)?,
                height: record.local.height,
                local: Status::from_tag(record.local.status)?,
                inherited: Status::from_tag(record.local.inherited_status)?,
                work,
                inherited_work: work_from(&record.local.inherited_work, "inherited work")?,
                sub_version: b.version,
                fields,
            },
            chain != Chain::UnitTest,
        )
    }
}

fn work_from(bytes: &[u8], field: &'static str) -> Result<Work, HeaderError> {
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| HeaderError::FieldSize {
        field,
        expected: 32,
        actual: bytes.len(),
    })?;
    Ok(Work::from_be_bytes(bytes))
}
