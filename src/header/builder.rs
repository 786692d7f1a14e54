//! Nonce search for new headers.
use bitcoin::hash_types::TxMerkleNode;
use bitcoin::pow::CompactTarget;
use bitcoin::BlockHash;
use tracing::{debug, warn};

use super::{Header, HeaderParts, Status, BITCOIN_VERSION, HEADER_VERSION};
use crate::{
    chain::Chain,
    codec::{self, BitcoinFields},
    error::HeaderError,
    hash::{HashProvider, PowHash},
    pow::{self, NumericHash},
};

/// A header under construction.
///
/// Owns the mutable nonce while searching; [`HeaderBuilder::mine`] consumes it
/// and returns an immutable [`Header`], so a half-mined header can't be
/// shared between threads.
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    chain: Chain,
    height: i64,
    fields: BitcoinFields,
}

impl HeaderBuilder {
    /// Start a header on `chain` above `parent`, timestamped now and targeting
    /// the chain's proof-of-work limit.
    pub fn new(chain: Chain, merkle_root: TxMerkleNode, parent: BlockHash, height: i64) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            chain,
            height,
            fields: BitcoinFields {
                block_version: 1,
                parent,
                merkle_root,
                timestamp: now,
                bits: CompactTarget::from_consensus(chain.params().pow_limit),
                nonce: 0,
            },
        }
    }

    /// Override the block version.
    pub fn block_version(mut self, version: i32) -> Self {
        self.fields.block_version = version;
        self
    }

    /// Override the timestamp.
    pub fn timestamp(mut self, secs: u64) -> Self {
        self.fields.timestamp = secs;
        self
    }

    /// Override the difficulty.
    pub fn bits(mut self, bits: CompactTarget) -> Self {
        self.fields.bits = bits;
        self
    }

    /// First nonce to try (default 0).
    pub fn nonce(mut self, start: u32) -> Self {
        self.fields.nonce = start;
        self
    }

    /// Try nonces upward until the proof-of-work hash falls below the target.
    ///
    /// Fails with [`HeaderError::NonceNotFound`] once `u32::MAX` has been tried.
    pub fn mine<P: HashProvider + ?Sized>(mut self, provider: &P) -> Result<Header, HeaderError> {
        let target = pow::target(self.fields.bits)?;
        let start = self.fields.nonce;
        loop {
            let preimage = self.fields.encode();
            let pow = codec::pow_hash(provider, self.chain, &preimage)?;
            if NumericHash::from_hash(&pow) < target {
                let hash = codec::block_hash(provider, self.chain, &preimage)?;
                debug!(
                    target: "headers",
                    chain = %self.chain,
                    %hash,
                    nonce = self.fields.nonce,
                    tries = u64::from(self.fields.nonce - start) + 1,
                    "mined header"
                );
                return self.finish(hash, pow);
            }
            self.fields.nonce = match self.fields.nonce.checked_add(1) {
                Some(n) => n,
                None => {
                    warn!(target: "headers", chain = %self.chain, start, "nonce space exhausted");
                    return Err(HeaderError::NonceNotFound);
                }
            };
        }
    }

    fn finish(self, hash: BlockHash, pow: PowHash) -> Result<Header, HeaderError> {
        let local = if self.height == 0 {
            Status::Checkpoint
        } else {
            Status::Normal
        };
        Header::new(
            HeaderParts {
                version: HEADER_VERSION,
                chain: self.chain,
                hash,
                pow,
                height: self.height,
                local,
                inherited: Status::Normal,
                work: pow::work(self.fields.bits, self.chain)?,
                inherited_work: pow::zero_work(),
                sub_version: BITCOIN_VERSION,
                fields: self.fields,
            },
            true,
        )
    }
}
