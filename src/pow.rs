//! Difficulty math: compact targets, numeric hashes and work.
use bitcoin::pow::{CompactTarget, Target};
use bitcoin::Work;

use crate::{chain::Chain, error::HeaderError};

/// A 256-bit hash or target read as an unsigned integer, so hashes and
/// targets compare with `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NumericHash(Target);

impl NumericHash {
    /// Interpret a hash in internal (little-endian) byte order.
    pub fn from_hash(bytes: &[u8; 32]) -> Self {
        Self(Target::from_le_bytes(*bytes))
    }

    /// Big-endian bytes, most significant first.
    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Work represented by this value used as a target.
    pub fn to_work(self) -> Work {
        self.0.to_work()
    }
}

/// Decode `nbits` into the largest hash value it admits.
///
/// Zero, negative and overflowing encodings are rejected, so every `Ok` target
/// is non-zero and `to_work` never divides by zero.
pub fn target(bits: CompactTarget) -> Result<NumericHash, HeaderError> {
    let raw = bits.to_consensus();
    let exponent = raw >> 24;
    let mantissa = raw & 0x00ff_ffff;

    if mantissa == 0 || mantissa > 0x007f_ffff {
        return Err(HeaderError::InvalidBits(raw));
    }
    let overflow = exponent > 34
        || (mantissa > 0xff && exponent > 33)
        || (mantissa > 0xffff && exponent > 32);
    if overflow {
        return Err(HeaderError::InvalidBits(raw));
    }

    let t = Target::from_compact(bits);
    if t == Target::ZERO {
        // small exponents shift the whole mantissa out
        return Err(HeaderError::InvalidBits(raw));
    }
    Ok(NumericHash(t))
}

/// Work contributed by one header with difficulty `bits` on `chain`.
///
/// Never below the work of the chain's proof-of-work limit.
pub fn work(bits: CompactTarget, chain: Chain) -> Result<Work, HeaderError> {
    let own = target(bits)?.to_work();
    Ok(own.max(chain.min_work()))
}

/// Work of a header at exactly `limit`, used as a chain's floor.
pub(crate) fn limit_work(limit: u32) -> Work {
    Target::from_compact(CompactTarget::from_consensus(limit)).to_work()
}

/// Zero work, the inherited work of an unattached header.
pub fn zero_work() -> Work {
    Work::from_be_bytes([0u8; 32])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(v: u32) -> CompactTarget {
        CompactTarget::from_consensus(v)
    }

    #[test]
    fn decodes_mainnet_limit() {
        let t = target(bits(0x1d00ffff)).unwrap();
        let mut expected = [0u8; 32];
        expected[4] = 0xff;
        expected[5] = 0xff;
        assert_eq!(t.to_be_bytes(), expected);
    }

    #[test]
    fn rejects_degenerate_bits() {
        for raw in [0, 0x1d000000, 0x1d800000, 0x0100_00ff, 0x2300_ffff, 0xff12_3456] {
            assert!(
                matches!(target(bits(raw)), Err(HeaderError::InvalidBits(v)) if v == raw),
                "{raw:#x}"
            );
        }
    }

    #[test]
    fn mainnet_genesis_work() {
        // 0x1d00ffff => 0x100010001
        let w = work(bits(0x1d00ffff), Chain::Bitcoin).unwrap();
        let mut expected = [0u8; 32];
        expected[27] = 0x01;
        expected[29] = 0x01;
        expected[31] = 0x01;
        assert_eq!(w.to_be_bytes(), expected);
    }

    #[test]
    fn work_is_floored_and_monotonic() {
        let floor = Chain::Bitcoin.min_work();
        // easier than the mainnet limit
        assert_eq!(work(bits(0x207fffff), Chain::Bitcoin).unwrap(), floor);

        let easy = work(bits(0x1d00ffff), Chain::Bitcoin).unwrap();
        let hard = work(bits(0x1b0404cb), Chain::Bitcoin).unwrap();
        assert!(hard > easy);
    }

    #[test]
    fn numeric_hash_orders_by_magnitude() {
        let mut low = [0u8; 32];
        low[0] = 0xff; // least significant byte
        let mut high = [0u8; 32];
        high[31] = 0x01; // most significant byte
        assert!(NumericHash::from_hash(&low) < NumericHash::from_hash(&high));
    }
}
