//! Block header entity.
//!
//! A [`Header`] is an immutable value. It comes from one of four places:
//! - [`HeaderBuilder::mine`] searches nonces until the proof of work holds;
//! - [`Header::decode`] parses 80 wire bytes;
//! - [`Header::from_record`] rebuilds a persisted [`HeaderRecord`], recomputing both hashes;
//! - `clone()`.
//!
//! Headers built with validation always satisfy `numeric_hash() < target()`,
//! except on chains whose proof of work lives outside the header
//! ([`ChainParams::aux_pow`](crate::chain::ChainParams::aux_pow)).
use std::{fmt, io};

use bitcoin::hash_types::TxMerkleNode;
use bitcoin::pow::CompactTarget;
use bitcoin::{BlockHash, Work};
use chrono::{Local, TimeZone};
use tracing::debug;

use crate::{
    chain::{Chain, GenesisParams},
    codec::{self, BitcoinFields, HEADER_SIZE},
    error::HeaderError,
    hash::{HashProvider, PowHash},
    pow::{self, NumericHash},
};

mod builder;
mod record;

pub use builder::HeaderBuilder;
pub use record::{BitcoinRecord, HeaderRecord, LocalRecord};

/// Version of the header envelope written into records.
pub const HEADER_VERSION: u32 = 1;

/// Version of the bitcoin-specific part of a record.
pub const BITCOIN_VERSION: u32 = 1;

/// Where a header stands relative to the best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Failed validation.
    Error,
    /// Ordinary header.
    Normal,
    /// Not connected to a known ancestor.
    Disconnected,
    /// Conflicts with a checkpoint.
    CheckpointBanned,
    /// Matches a checkpoint (genesis included).
    Checkpoint,
}

impl Status {
    /// Numeric tag used in records.
    pub fn tag(self) -> u32 {
        match self {
            Status::Error => 0,
            Status::Normal => 1,
            Status::Disconnected => 2,
            Status::CheckpointBanned => 3,
            Status::Checkpoint => 4,
        }
    }

    /// Inverse of [`Status::tag`].
    pub fn from_tag(tag: u32) -> Result<Self, HeaderError> {
        Ok(match tag {
            0 => Status::Error,
            1 => Status::Normal,
            2 => Status::Disconnected,
            3 => Status::CheckpointBanned,
            4 => Status::Checkpoint,
            other => return Err(HeaderError::UnknownStatus(other)),
        })
    }
}

/// Output format for [`Header::serialize_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The raw 80-byte pre-image.
    Bitcoin,
    /// JSON-encoded [`HeaderRecord`].
    Record,
}

/// Every field of a header, as accepted by [`Header::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderParts {
    /// Envelope version.
    pub version: u32,
    /// Chain the header belongs to.
    pub chain: Chain,
    /// Identity hash.
    pub hash: BlockHash,
    /// Proof-of-work hash.
    pub pow: PowHash,
    /// Height, `-1` when unattached.
    pub height: i64,
    /// Status of this header.
    pub local: Status,
    /// Status contributed by its ancestors.
    pub inherited: Status,
    /// Work of this header alone.
    pub work: Work,
    /// Cumulative work of the parent.
    pub inherited_work: Work,
    /// Version of the bitcoin-specific record part.
    pub sub_version: u32,
    /// Wire fields.
    pub fields: BitcoinFields,
}

/// A validated block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: u32,
    chain: Chain,
    hash: BlockHash,
    pow: PowHash,
    height: i64,
    local: Status,
    inherited: Status,
    work: Work,
    inherited_work: Work,
    sub_version: u32,
    fields: BitcoinFields,
}

impl Header {
    /// Assemble a header from explicit parts.
    ///
    /// With `validate` the proof of work is checked. Skipping validation is
    /// only allowed on [`Chain::UnitTest`]. A header at height 0 must be a
    /// [`Status::Checkpoint`].
    pub fn new(parts: HeaderParts, validate: bool) -> Result<Self, HeaderError> {
        if !validate && parts.chain != Chain::UnitTest {
            return Err(HeaderError::ValidationRequired(parts.chain));
        }
        if parts.height == 0 && parts.local != Status::Checkpoint {
            return Err(HeaderError::GenesisStatus(parts.local));
        }
        let header = Self {
            version: parts.version,
            chain: parts.chain,
            hash: parts.hash,
            pow: parts.pow,
            height: parts.height,
            local: parts.local,
            inherited: parts.inherited,
            work: parts.work,
            inherited_work: parts.inherited_work,
            sub_version: parts.sub_version,
            fields: parts.fields,
        };
        if validate {
            header.check_pow()?;
        }
        Ok(header)
    }

    /// Build from wire fields and precomputed hashes.
    ///
    /// A genesis header sits at height 0 with [`Status::Checkpoint`]; anything
    /// else starts unattached at height -1.
    pub fn with_hashes(
        chain: Chain,
        sub_version: u32,
        hash: BlockHash,
        pow: PowHash,
        fields: BitcoinFields,
        is_genesis: bool,
    ) -> Result<Self, HeaderError> {
        let (height, local) = if is_genesis {
            (0, Status::Checkpoint)
        } else {
            (-1, Status::Normal)
        };
        let work = pow::work(fields.bits, chain)?;
        Self::new(
            HeaderParts {
                version: HEADER_VERSION,
                chain,
                hash,
                pow,
                height,
                local,
                inherited: Status::Normal,
                work,
                inherited_work: pow::zero_work(),
                sub_version,
                fields,
            },
            true,
        )
    }

    /// Build from wire fields, hashing them with `provider`.
    pub fn from_fields<P: HashProvider + ?Sized>(
        provider: &P,
        chain: Chain,
        sub_version: u32,
        fields: BitcoinFields,
        is_genesis: bool,
    ) -> Result<Self, HeaderError> {
        let preimage = fields.encode();
        let hash = codec::block_hash(provider, chain, &preimage)?;
        let pow = codec::pow_hash(provider, chain, &preimage)?;
        Self::with_hashes(chain, sub_version, hash, pow, fields, is_genesis)
    }

    /// The chain's genesis header, checked against the published genesis hash.
    pub fn genesis<P: HashProvider + ?Sized>(provider: &P, chain: Chain) -> Result<Self, HeaderError> {
        let params = chain.params().genesis.ok_or(HeaderError::NoGenesis(chain))?;
        let (expected, fields) = genesis_fields(&params).ok_or(HeaderError::NoGenesis(chain))?;
        let header = Self::from_fields(provider, chain, BITCOIN_VERSION, fields, true)?;
        if header.hash != expected {
            return Err(HeaderError::GenesisMismatch {
                chain,
                expected,
                actual: header.hash,
            });
        }
        Ok(header)
    }

    /// Parse and validate an unattached header from its 80 wire bytes.
    pub fn decode<P: HashProvider + ?Sized>(
        provider: &P,
        chain: Chain,
        bytes: &[u8],
    ) -> Result<Self, HeaderError> {
        let fields = codec::decode(bytes)?;
        Self::from_fields(provider, chain, BITCOIN_VERSION, fields, false)
    }

    /// Pin an unattached header at a height known from elsewhere, such as a
    /// stored tip. Height 0 makes it a [`Status::Checkpoint`].
    pub fn anchor_at(mut self, height: i64) -> Result<Self, HeaderError> {
        if self.height >= 0 && self.height != height {
            return Err(HeaderError::AlreadyAttached {
                hash: self.hash,
                height: self.height,
            });
        }
        self.height = height;
        if height == 0 {
            self.local = Status::Checkpoint;
        }
        Ok(self)
    }

    /// Place this header directly above `parent`.
    ///
    /// The height becomes `parent.height() + 1` and the parent's cumulative
    /// work and effective status are inherited.
    pub fn attach_to(mut self, parent: &Header) -> Result<Self, HeaderError> {
        if self.fields.parent != parent.hash || self.chain != parent.chain {
            return Err(HeaderError::NotChild {
                child: self.hash,
                parent: parent.hash,
            });
        }
        let height = if parent.height < 0 { -1 } else { parent.height + 1 };
        if self.height >= 0 && self.height != height {
            return Err(HeaderError::AlreadyAttached {
                hash: self.hash,
                height: self.height,
            });
        }
        self.height = height;
        self.inherited = match parent.effective_status() {
            Status::Normal | Status::Checkpoint => Status::Normal,
            other => other,
        };
        self.inherited_work = parent.cumulative_work();
        Ok(self)
    }

    fn check_pow(&self) -> Result<(), HeaderError> {
        if self.chain.params().aux_pow {
            // PoW for these chains is carried and checked outside the header.
            debug!(target: "headers", chain = %self.chain, hash = %self.hash, "skipping target check");
            return Ok(());
        }
        if self.numeric_hash() < self.target()? {
            Ok(())
        } else {
            Err(HeaderError::InvalidProofOfWork)
        }
    }

    /// Envelope version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Chain this header belongs to.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Identity hash.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Proof-of-work hash.
    pub fn pow_hash(&self) -> PowHash {
        self.pow
    }

    /// Hash of the previous block.
    pub fn parent_hash(&self) -> BlockHash {
        self.fields.parent
    }

    /// Height in the chain, `-1` when unattached.
    pub fn height(&self) -> i64 {
        self.height
    }

    /// Status of this header.
    pub fn local_status(&self) -> Status {
        self.local
    }

    /// Status inherited from ancestors.
    pub fn inherited_status(&self) -> Status {
        self.inherited
    }

    /// Inherited status when it is abnormal, otherwise the local one.
    pub fn effective_status(&self) -> Status {
        match self.inherited {
            Status::Normal | Status::Checkpoint => self.local,
            other => other,
        }
    }

    /// Work of this header alone.
    pub fn work(&self) -> Work {
        self.work
    }

    /// Cumulative work of the parent.
    pub fn inherited_work(&self) -> Work {
        self.inherited_work
    }

    /// Cumulative work up to and including this header.
    pub fn cumulative_work(&self) -> Work {
        self.inherited_work + self.work
    }

    /// Version of the bitcoin-specific record part.
    pub fn sub_version(&self) -> u32 {
        self.sub_version
    }

    /// Block version from the wire.
    pub fn block_version(&self) -> i32 {
        self.fields.block_version
    }

    /// Merkle root.
    pub fn merkle_root(&self) -> TxMerkleNode {
        self.fields.merkle_root
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.fields.timestamp
    }

    /// Compact target.
    pub fn bits(&self) -> CompactTarget {
        self.fields.bits
    }

    /// Nonce.
    pub fn nonce(&self) -> u32 {
        self.fields.nonce
    }

    /// Wire fields.
    pub fn fields(&self) -> &BitcoinFields {
        &self.fields
    }

    /// Largest proof-of-work hash the header's nbits admit.
    pub fn target(&self) -> Result<NumericHash, HeaderError> {
        pow::target(self.fields.bits)
    }

    /// Proof-of-work hash as a number.
    pub fn numeric_hash(&self) -> NumericHash {
        NumericHash::from_hash(&self.pow)
    }

    /// The 80-byte pre-image.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        self.fields.encode()
    }

    /// Write the header in the requested format.
    pub fn serialize_to<W: io::Write>(&self, mut writer: W, format: Format) -> Result<(), HeaderError> {
        match format {
            Format::Bitcoin => writer.write_all(&self.encode())?,
            Format::Record => serde_json::to_writer(writer, &self.to_record()?)?,
        }
        Ok(())
    }

    /// Multi-line human readable dump.
    pub fn print(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  version: {}", self.fields.block_version)?;
        writeln!(f, "  parent block hash: {}", self.fields.parent)?;
        writeln!(f, "  merkle hash: {}", self.fields.merkle_root)?;
        writeln!(f, "  time: {}", local_time(self.fields.timestamp))?;
        writeln!(f, "  nBits: {:#010x}", self.fields.bits.to_consensus())?;
        write!(f, "  nonce: {}", self.fields.nonce)
    }
}

fn local_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Local.timestamp_opt(s, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %:z").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub(crate) fn genesis_fields(g: &GenesisParams) -> Option<(BlockHash, BitcoinFields)> {
    use bitcoin::hashes::Hash;

    let hash = BlockHash::from_byte_array(display_hex(g.hash)?);
    let fields = BitcoinFields {
        block_version: g.version,
        parent: BlockHash::all_zeros(),
        merkle_root: TxMerkleNode::from_byte_array(display_hex(g.merkle_root)?),
        timestamp: u64::from(g.time),
        bits: CompactTarget::from_consensus(g.bits),
        nonce: g.nonce,
    };
    Some((hash, fields))
}

// Display hex is byte-reversed relative to the internal order.
fn display_hex(s: &str) -> Option<[u8; 32]> {
    let mut bytes: [u8; 32] = hex::decode(s).ok()?.try_into().ok()?;
    bytes.reverse();
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::NativeHasher;
    use bitcoin::hashes::Hash;
    use std::str::FromStr;

    #[test]
    fn bitcoin_genesis() {
        let genesis = Header::genesis(&NativeHasher, Chain::Bitcoin).unwrap();
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.local_status(), Status::Checkpoint);
        assert_eq!(
            genesis.hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(genesis.parent_hash(), BlockHash::all_zeros());
        assert_eq!(genesis.nonce(), 2_083_236_893);
        assert!(genesis.numeric_hash() < genesis.target().unwrap());
        assert_eq!(genesis.cumulative_work(), genesis.work());
    }

    #[test]
    fn every_bundled_genesis_validates() {
        for chain in Chain::ALL {
            match Header::genesis(&NativeHasher, chain) {
                Ok(h) => assert_eq!(h.height(), 0, "{chain}"),
                Err(HeaderError::NoGenesis(c)) => assert_eq!(c, Chain::Pkt),
                Err(e) => panic!("{chain}: {e}"),
            }
        }
    }

    #[test]
    fn litecoin_identity_differs_from_pow() {
        let genesis = Header::genesis(&NativeHasher, Chain::Litecoin).unwrap();
        assert_eq!(
            genesis.hash().to_string(),
            "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2"
        );
        assert_ne!(genesis.hash().to_byte_array(), genesis.pow_hash());
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let (_, mut fields) = genesis_fields(&Chain::Bitcoin.params().genesis.unwrap()).unwrap();
        fields.nonce += 1;
        let err = Header::from_fields(&NativeHasher, Chain::Bitcoin, BITCOIN_VERSION, fields, false)
            .unwrap_err();
        assert!(matches!(err, HeaderError::InvalidProofOfWork));
    }

    #[test]
    fn aux_pow_chain_is_exempt() {
        let fields = BitcoinFields {
            block_version: 1,
            parent: BlockHash::from_byte_array([3; 32]),
            merkle_root: TxMerkleNode::from_byte_array([4; 32]),
            timestamp: 1_566_000_000,
            bits: CompactTarget::from_consensus(0x1d00ffff),
            nonce: 1,
        };
        let pkt = Header::from_fields(&NativeHasher, Chain::Pkt, BITCOIN_VERSION, fields, false).unwrap();
        assert!(pkt.numeric_hash() >= pkt.target().unwrap());

        let err = Header::from_fields(&NativeHasher, Chain::Bitcoin, BITCOIN_VERSION, fields, false)
            .unwrap_err();
        assert!(matches!(err, HeaderError::InvalidProofOfWork));
    }

    #[test]
    fn skipping_validation_is_unit_test_only() {
        let genesis = Header::genesis(&NativeHasher, Chain::Bitcoin).unwrap();
        let parts = |chain| HeaderParts {
            version: HEADER_VERSION,
            chain,
            hash: genesis.hash(),
            pow: [0xff; 32],
            height: 5,
            local: Status::Normal,
            inherited: Status::Normal,
            work: genesis.work(),
            inherited_work: pow::zero_work(),
            sub_version: BITCOIN_VERSION,
            fields: *genesis.fields(),
        };
        assert!(matches!(
            Header::new(parts(Chain::Bitcoin), false),
            Err(HeaderError::ValidationRequired(Chain::Bitcoin))
        ));
        assert!(Header::new(parts(Chain::UnitTest), false).is_ok());
        assert!(matches!(
            Header::new(parts(Chain::UnitTest), true),
            Err(HeaderError::InvalidProofOfWork)
        ));
    }

    #[test]
    fn decode_from_wire() {
        let genesis = Header::genesis(&NativeHasher, Chain::Bitcoin).unwrap();
        let decoded = Header::decode(&NativeHasher, Chain::Bitcoin, &genesis.encode()).unwrap();
        assert_eq!(decoded.hash(), genesis.hash());
        assert_eq!(decoded.height(), -1);
        assert_eq!(decoded.local_status(), Status::Normal);
    }

    #[test]
    fn attach_accumulates_work() {
        let genesis = Header::genesis(&NativeHasher, Chain::UnitTest).unwrap();
        let child = HeaderBuilder::new(Chain::UnitTest, TxMerkleNode::all_zeros(), genesis.hash(), -1)
            .timestamp(1_296_688_700)
            .mine(&NativeHasher)
            .unwrap()
            .attach_to(&genesis)
            .unwrap();
        assert_eq!(child.height(), 1);
        assert_eq!(child.inherited_work(), genesis.cumulative_work());
        assert!(child.cumulative_work() > genesis.cumulative_work());

        let stranger = BlockHash::from_str(
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        )
        .unwrap();
        let orphan = HeaderBuilder::new(Chain::UnitTest, TxMerkleNode::all_zeros(), stranger, -1)
            .mine(&NativeHasher)
            .unwrap();
        assert!(matches!(orphan.attach_to(&genesis), Err(HeaderError::NotChild { .. })));
    }

    #[test]
    fn reattaching_at_another_height_fails() {
        let genesis = Header::genesis(&NativeHasher, Chain::UnitTest).unwrap();
        let child = HeaderBuilder::new(Chain::UnitTest, TxMerkleNode::all_zeros(), genesis.hash(), 7)
            .timestamp(1_296_688_700)
            .mine(&NativeHasher)
            .unwrap();
        assert!(matches!(
            child.clone().attach_to(&genesis),
            Err(HeaderError::AlreadyAttached { height: 7, .. })
        ));

        let attached = child.anchor_at(-1).unwrap_err();
        assert!(matches!(attached, HeaderError::AlreadyAttached { height: 7, .. }));
    }

    #[test]
    fn anchor_pins_height() {
        let genesis = Header::genesis(&NativeHasher, Chain::UnitTest).unwrap();
        let wire = Header::decode(&NativeHasher, Chain::UnitTest, &genesis.encode()).unwrap();
        assert_eq!(wire.height(), -1);

        let anchored = wire.anchor_at(0).unwrap();
        assert_eq!(anchored.height(), 0);
        assert_eq!(anchored.local_status(), Status::Checkpoint);

        let child = HeaderBuilder::new(Chain::UnitTest, TxMerkleNode::all_zeros(), genesis.hash(), -1)
            .timestamp(1_296_688_700)
            .mine(&NativeHasher)
            .unwrap()
            .attach_to(&anchored)
            .unwrap();
        assert_eq!(child.height(), 1);
        assert_eq!(child.clone().anchor_at(1).unwrap(), child);
    }

    #[test]
    fn height_zero_requires_checkpoint() {
        let genesis = Header::genesis(&NativeHasher, Chain::UnitTest).unwrap();
        let parts = |local| HeaderParts {
            version: HEADER_VERSION,
            chain: Chain::UnitTest,
            hash: genesis.hash(),
            pow: genesis.pow_hash(),
            height: 0,
            local,
            inherited: Status::Normal,
            work: genesis.work(),
            inherited_work: pow::zero_work(),
            sub_version: BITCOIN_VERSION,
            fields: *genesis.fields(),
        };
        assert!(matches!(
            Header::new(parts(Status::Normal), true),
            Err(HeaderError::GenesisStatus(Status::Normal))
        ));
        assert_eq!(Header::new(parts(Status::Checkpoint), true).unwrap(), genesis);
    }

    #[test]
    fn print_lists_fields() {
        let genesis = Header::genesis(&NativeHasher, Chain::Bitcoin).unwrap();
        let out = genesis.print();
        assert!(out.contains("version: 1"));
        assert!(out.contains("4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"));
        assert!(out.contains("nBits: 0x1d00ffff"));
        assert!(out.contains("nonce: 2083236893"));
        assert_eq!(out.lines().count(), 6);
    }

    #[test]
    fn serialize_bitcoin_format_is_raw() {
        let genesis = Header::genesis(&NativeHasher, Chain::Bitcoin).unwrap();
        let mut buf = Vec::new();
        genesis.serialize_to(&mut buf, Format::Bitcoin).unwrap();
        assert_eq!(buf, genesis.encode().to_vec());
    }
}
