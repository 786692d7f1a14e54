//! Rolling BIP-157 filter headers.
//!
//! Each block's filter header commits to its filter hash and to the previous
//! block's filter header, so one header pins every filter below it.
use anyhow::{bail, Result};
use bitcoin::bip158::{FilterHash, FilterHeader};

use crate::filters::FilterHeaderRecord;

/// Rolling filter-header chain state.
///
/// `tip` is the filter header of the last block applied.
///
/// Rolling update formula (BIP157):
///   H_n = HASH256( F_n || H_{n-1} )
/// where F_n is the filter hash (HASH256 of the raw filter bytes).
pub(crate) struct FilterHeaderChain {
    pub tip: FilterHeader,
}

impl FilterHeaderChain {
    /// Start from the filter header of the block below the first one applied.
    pub fn new(previous: FilterHeader) -> Self {
        Self { tip: previous }
    }

    /// Advance by one block and return its filter header.
    pub fn next(&mut self, filter_hash: &FilterHash) -> FilterHeader {
        self.tip = filter_hash.filter_header(&self.tip);
        self.tip
    }

    /// Check that `records` extend the chain one block at a time.
    ///
    /// On failure the tip is left at the last record that verified.
    pub fn verify(&mut self, records: &[FilterHeaderRecord]) -> Result<()> {
        for (i, record) in records.iter().enumerate() {
            let expected = record.filter_hash.filter_header(&self.tip);
            // Block hashes are not part of the commitment; only the order is.
            if expected != record.header {
                bail!(
                    "filter header mismatch for block {} (batch index {i}): got {}, expected {expected}",
                    record.block_hash,
                    record.header
                );
            }
            self.tip = expected;
        }
        Ok(())
    }
}
