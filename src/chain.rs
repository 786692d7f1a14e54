//! Supported chains and the parameter table that drives per-chain behaviour.
//!
//! Chain-specific rules (hash functions, proof-of-work exemptions, difficulty
//! floor, genesis data, filter types) live in one static [`ChainParams`] per
//! [`Chain`] instead of being spread across the header code.
use std::fmt;

use bitcoin::Work;
use serde::{Deserialize, Serialize};

/// A block chain this crate knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    /// Bitcoin mainnet.
    Bitcoin,
    /// Bitcoin testnet3.
    BitcoinTestnet3,
    /// Bitcoin default signet.
    BitcoinSignet,
    /// Litecoin mainnet (scrypt proof of work).
    Litecoin,
    /// PKT (PacketCrypt auxiliary proof of work).
    Pkt,
    /// Synthetic chain for tests; the only chain that may skip PoW validation.
    UnitTest,
}

impl Chain {
    /// Every supported chain.
    pub const ALL: [Chain; 6] = [
        Chain::Bitcoin,
        Chain::BitcoinTestnet3,
        Chain::BitcoinSignet,
        Chain::Litecoin,
        Chain::Pkt,
        Chain::UnitTest,
    ];

    /// Parameter table entry for this chain.
    pub fn params(self) -> &'static ChainParams {
        match self {
            Chain::Bitcoin => &BITCOIN,
            Chain::BitcoinTestnet3 => &BITCOIN_TESTNET3,
            Chain::BitcoinSignet => &BITCOIN_SIGNET,
            Chain::Litecoin => &LITECOIN,
            Chain::Pkt => &PKT,
            Chain::UnitTest => &UNIT_TEST,
        }
    }

    /// Numeric tag used in persisted header records.
    pub fn tag(self) -> u32 {
        match self {
            Chain::Bitcoin => 1,
            Chain::BitcoinTestnet3 => 2,
            Chain::Litecoin => 5,
            Chain::Pkt => 7,
            Chain::BitcoinSignet => 9,
            Chain::UnitTest => 0xffff,
        }
    }

    /// Inverse of [`Chain::tag`].
    pub fn from_tag(tag: u32) -> Option<Chain> {
        Chain::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// Work of a header sitting exactly at the chain's proof-of-work limit.
    pub fn min_work(self) -> Work {
        crate::pow::limit_work(self.params().pow_limit)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.params().name)
    }
}

/// Hash function family used for a block's identity or its proof of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// SHA-256 applied twice.
    Sha256d,
    /// scrypt with N = 1024, r = 1, p = 1 and the header as both password and salt.
    Scrypt,
}

/// Compact filter types, by their BIP157 wire discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FilterType {
    /// BIP158 basic filter.
    Basic = 0x00,
}

impl FilterType {
    /// Wire discriminant, also used as the store key prefix.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire discriminant.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(FilterType::Basic),
            _ => None,
        }
    }
}

/// Hard-coded genesis block data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisParams {
    /// Published genesis block hash, display (reversed) hex.
    pub hash: &'static str,
    /// Block version.
    pub version: i32,
    /// Merkle root, display (reversed) hex.
    pub merkle_root: &'static str,
    /// Block time.
    pub time: u32,
    /// Compact target.
    pub bits: u32,
    /// Nonce.
    pub nonce: u32,
    /// Script of the single coinbase output, hex. Feeds the genesis compact filter.
    pub output_script: &'static str,
}

/// Per-chain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Human readable name.
    pub name: &'static str,
    /// Hash used for the block identity.
    pub block_hash: HashKind,
    /// Hash compared against the target.
    pub pow_hash: HashKind,
    /// Proof of work is carried outside the header and is not checked here.
    pub aux_pow: bool,
    /// Easiest permitted target, compact form. New headers are mined against it.
    pub pow_limit: u32,
    /// Genesis block, when bundled.
    pub genesis: Option<GenesisParams>,
    /// Compact filter types served for this chain.
    pub filter_types: &'static [FilterType],
}

const SATOSHI_OUTPUT: &str = "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac";
const BITCOIN_MERKLE: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

static BITCOIN: ChainParams = ChainParams {
    name: "bitcoin",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Sha256d,
    aux_pow: false,
    pow_limit: 0x1d00ffff,
    genesis: Some(GenesisParams {
        hash: "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        version: 1,
        merkle_root: BITCOIN_MERKLE,
        time: 1_231_006_505,
        bits: 0x1d00ffff,
        nonce: 2_083_236_893,
        output_script: SATOSHI_OUTPUT,
    }),
    filter_types: &[FilterType::Basic],
};

static BITCOIN_TESTNET3: ChainParams = ChainParams {
    name: "bitcoin testnet3",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Sha256d,
    aux_pow: false,
    pow_limit: 0x1d00ffff,
    genesis: Some(GenesisParams {
        hash: "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        version: 1,
        merkle_root: BITCOIN_MERKLE,
        time: 1_296_688_602,
        bits: 0x1d00ffff,
        nonce: 414_098_458,
        output_script: SATOSHI_OUTPUT,
    }),
    filter_types: &[FilterType::Basic],
};

static BITCOIN_SIGNET: ChainParams = ChainParams {
    name: "bitcoin signet",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Sha256d,
    aux_pow: false,
    pow_limit: 0x1e0377ae,
    genesis: Some(GenesisParams {
        hash: "00000008819873e925422c1ff0f99f7cc9bbb232af63a077a480a3633bee1ef6",
        version: 1,
        merkle_root: BITCOIN_MERKLE,
        time: 1_598_918_400,
        bits: 0x1e0377ae,
        nonce: 52_613_770,
        output_script: SATOSHI_OUTPUT,
    }),
    filter_types: &[FilterType::Basic],
};

static LITECOIN: ChainParams = ChainParams {
    name: "litecoin",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Scrypt,
    aux_pow: false,
    pow_limit: 0x1e0fffff,
    genesis: Some(GenesisParams {
        hash: "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2",
        version: 1,
        merkle_root: "97ddfbbae6be97fd6cdf3e7ca13232a3afff2353e29badfab7f73011edd4ced9",
        time: 1_317_972_665,
        bits: 0x1e0ffff0,
        nonce: 2_084_524_493,
        output_script: "41040184710fa689ad5023690c80f3a49c8f13f8d45b8c857fbcbc8bc4a8e4d3eb4b10f4d4604fa08dce601aaf0f470216fe1b51850b4acf21b179c45070ac7b03a9ac",
    }),
    filter_types: &[FilterType::Basic],
};

// Genesis not bundled: PKT headers arrive from peers already anchored.
static PKT: ChainParams = ChainParams {
    name: "pkt",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Sha256d,
    aux_pow: true,
    pow_limit: 0x1f0fffff,
    genesis: None,
    filter_types: &[],
};

// Shares the regtest genesis so fixtures mine instantly.
static UNIT_TEST: ChainParams = ChainParams {
    name: "unit test",
    block_hash: HashKind::Sha256d,
    pow_hash: HashKind::Sha256d,
    aux_pow: false,
    pow_limit: 0x207fffff,
    genesis: Some(GenesisParams {
        hash: "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
        version: 1,
        merkle_root: BITCOIN_MERKLE,
        time: 1_296_688_602,
        bits: 0x207fffff,
        nonce: 2,
        output_script: SATOSHI_OUTPUT,
    }),
    filter_types: &[FilterType::Basic],
};
