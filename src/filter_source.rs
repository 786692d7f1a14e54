//! Abstractions for fetching compact filter data from the network (HTTP or P2P).
use async_trait::async_trait;
use bitcoin::bip158::{FilterHash, FilterHeader};
use bitcoin::BlockHash;

use crate::chain::FilterType;

/// A `cfheaders` response: the filter header preceding the batch plus one
/// filter hash per block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfHeadersBatch {
    /// Height of the block `filter_hashes[0]` belongs to.
    pub start_height: u32,
    /// Filter header of the block at `start_height - 1`.
    pub previous_header: FilterHeader,
    /// Consecutive filter hashes.
    pub filter_hashes: Vec<FilterHash>,
}

/// Network provider for compact-filter sync.
#[async_trait]
pub trait FilterSource: Send + Sync {
    /// Fetch filter hashes from `start_h` up to and including the block `stop_hash`.
    async fn get_cfheaders(
        &self,
        filter_type: FilterType,
        start_h: u32,
        stop_hash: BlockHash,
    ) -> anyhow::Result<CfHeadersBatch>;

    /// Fetch the raw BIP-158 filter bytes for a given `block` hash.
    async fn get_cfilter(&self, filter_type: FilterType, block: BlockHash) -> anyhow::Result<Vec<u8>>;
}
