//! Hashing providers for header identity and proof of work.
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::BlockHash;

use crate::{
    chain::{Chain, HashKind},
    error::HashError,
};

/// Proof-of-work hash in internal byte order.
pub type PowHash = [u8; 32];

/// Computes the two hashes a header needs from its 80-byte pre-image.
///
/// Kept behind a trait so header code carries no cryptography and tests can
/// substitute a provider that never meets the target.
pub trait HashProvider: Send + Sync {
    /// Identity hash of the header.
    fn block_hash(&self, chain: Chain, preimage: &[u8]) -> Result<BlockHash, HashError>;

    /// Hash compared against the difficulty target.
    fn pow_hash(&self, chain: Chain, preimage: &[u8]) -> Result<PowHash, HashError>;
}

/// In-process provider dispatching on [`ChainParams`](crate::chain::ChainParams) hash kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHasher;

impl NativeHasher {
    fn digest(kind: HashKind, data: &[u8]) -> Result<[u8; 32], HashError> {
        match kind {
            HashKind::Sha256d => Ok(sha256d::Hash::hash(data).to_byte_array()),
            HashKind::Scrypt => {
                let params = scrypt::Params::new(10, 1, 1, 32)
                    .map_err(|e| HashError::Scrypt(e.to_string()))?;
                let mut out = [0u8; 32];
                scrypt::scrypt(data, data, &params, &mut out)
                    .map_err(|e| HashError::Scrypt(e.to_string()))?;
                Ok(out)
            }
        }
    }
}

impl HashProvider for NativeHasher {
    fn block_hash(&self, chain: Chain, preimage: &[u8]) -> Result<BlockHash, HashError> {
        let bytes = Self::digest(chain.params().block_hash, preimage)?;
        Ok(BlockHash::from_byte_array(bytes))
    }

    fn pow_hash(&self, chain: Chain, preimage: &[u8]) -> Result<PowHash, HashError> {
        Self::digest(chain.params().pow_hash, preimage)
    }
}
