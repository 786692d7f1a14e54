//! Orchestrator for BIP-157 filter sync:
//! 1) fetch the next window of block headers, check their proof of work and
//!    link each one to its parent,
//! 2) fetch filter hashes for the window and chain them onto our tip,
//! 3) fetch each block's filter and check it against its filter hash,
//! 4) commit filter headers, filters and both tips in one transaction.
use crate::{
    cfheaders::FilterHeaderChain,
    chain::FilterType,
    config::{Config, CFHEADERS_BATCH},
    filter_source::FilterSource,
    filters::{filter_hash, FilterHeaderRecord, Filters, Position},
    hash::{HashProvider, NativeHasher},
    header::Header,
    headers::HeaderSource,
    store::KeyValueStore,
};
use anyhow::{ensure, Context};
use bitcoin::bip158::BlockFilter;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

/// Sync driver. `S` = store, `F` = network filter source, `H` = header chain.
pub struct FilterSync<S, F, H> {
    filters: Arc<Filters<S>>,
    source: F,
    headers: H,
    hasher: Arc<dyn HashProvider>,
    batch: u32,
}

impl<S, F, H> FilterSync<S, F, H>
where
    S: KeyValueStore + 'static,
    F: FilterSource + 'static,
    H: HeaderSource + 'static,
{
    /// Create a driver over opened filter state, a filter source, and a headers provider.
    pub fn new(filters: Arc<Filters<S>>, source: F, headers: H) -> Self {
        Self {
            filters,
            source,
            headers,
            hasher: Arc::new(NativeHasher),
            batch: CFHEADERS_BATCH,
        }
    }

    /// Blocks per round trip, clamped to `1..=2000`.
    pub fn with_batch_size(mut self, batch: u32) -> Self {
        self.batch = batch.clamp(1, CFHEADERS_BATCH);
        self
    }

    /// Apply [`Config::sync_batch`].
    pub fn with_config(self, config: &Config) -> Self {
        self.with_batch_size(config.sync_batch)
    }

    /// Hash headers with `hasher` instead of [`NativeHasher`].
    pub fn with_hash_provider(mut self, hasher: Arc<dyn HashProvider>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Filter state being advanced.
    pub fn filters(&self) -> &Arc<Filters<S>> {
        &self.filters
    }

    async fn blocking<T, G>(&self, f: G) -> anyhow::Result<T>
    where
        G: FnOnce(&Filters<S>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let filters = Arc::clone(&self.filters);
        Ok(task::spawn_blocking(move || f(&filters)).await?)
    }

    /// Fetch and validate the unattached header at `height`.
    async fn header_at(&self, height: u32) -> anyhow::Result<Header> {
        let raw = self
            .headers
            .header_at_height(height)
            .await
            .with_context(|| format!("header_at_height({height})"))?;
        let header = Header::decode(self.hasher.as_ref(), self.filters.chain(), &raw)
            .with_context(|| format!("invalid header @height {height}"))?;
        Ok(header)
    }

    /// Advance `filter_type` from the stored filter tip to the header source's tip.
    ///
    /// Returns the new filter tip. Each window is committed before the next
    /// is requested, so an error leaves the store at the last full window.
    ///
    /// # Errors
    /// Returns an error if the source sends a batch that does not extend our
    /// filter header chain, a filter that does not match its filter hash, or
    /// if the store cannot persist a window.
    pub async fn run_to_tip(&self, filter_type: FilterType) -> anyhow::Result<Position> {
        let chain = self.filters.chain();
        let mut tip = self.blocking(move |f| f.current_tip(filter_type)).await?;
        ensure!(!tip.is_blank(), "{chain} has no {filter_type:?} filter tip");
        let mut previous = self
            .blocking(move |f| f.load_filter_header(filter_type, &tip.hash))
            .await?
            .with_context(|| format!("missing filter header for tip {tip}"))?;

        let chain_tip = self.headers.tip_height().await?;
        debug!(target: "filter_sync", %chain, ?filter_type, %tip, chain_tip, "starting sync");
        if tip.height >= i64::from(chain_tip) {
            return Ok(tip);
        }

        // Anchor the header chain at our filter tip; everything above links to it.
        let mut parent = self.header_at(u32::try_from(tip.height)?).await?.anchor_at(tip.height)?;
        ensure!(
            parent.hash() == tip.hash,
            "header source has {} at height {}, filter tip is {tip}",
            parent.hash(),
            tip.height
        );

        while tip.height < i64::from(chain_tip) {
            let start = u32::try_from(tip.height + 1)?;
            let stop = start.saturating_add(self.batch - 1).min(chain_tip);
            let expected = (stop - start + 1) as usize;

            let mut blocks = Vec::with_capacity(expected);
            let mut linked = parent.clone();
            for height in start..=stop {
                let header = self
                    .header_at(height)
                    .await?
                    .attach_to(&linked)
                    .with_context(|| format!("header @height {height} does not link to its parent"))?;
                blocks.push(header.hash());
                linked = header;
            }
            let stop_hash = linked.hash();

            let batch = self
                .source
                .get_cfheaders(filter_type, start, stop_hash)
                .await
                .with_context(|| format!("get_cfheaders(start={start}, stop_h={stop})"))?;
            ensure!(
                batch.start_height == start,
                "cfheaders batch start mismatch: got {}, expected {start}",
                batch.start_height
            );
            ensure!(
                batch.filter_hashes.len() == expected,
                "cfheaders batch @{start} has {} filter hashes, expected {expected}",
                batch.filter_hashes.len()
            );
            ensure!(
                batch.previous_header == previous,
                "cfheaders batch @{start} does not extend filter header {previous}"
            );

            let mut rolling = FilterHeaderChain::new(previous);
            let mut records = Vec::with_capacity(expected);
            let mut window = Vec::with_capacity(expected);
            for ((height, block_hash), committed) in (start..=stop).zip(blocks).zip(&batch.filter_hashes) {
                let raw = self
                    .source
                    .get_cfilter(filter_type, block_hash)
                    .await
                    .with_context(|| format!("get_cfilter({block_hash})"))?;
                let filter = BlockFilter::new(&raw);
                ensure!(
                    filter_hash(&filter) == *committed,
                    "filter for {block_hash} @height {height} does not match its filter hash"
                );
                records.push(FilterHeaderRecord {
                    block_hash,
                    header: rolling.next(committed),
                    filter_hash: *committed,
                });
                window.push((block_hash, filter));
            }

            let next = Position::new(i64::from(stop), stop_hash);
            let stored = self
                .blocking(move |f| f.store_filters_with_tip(filter_type, &records, &window, next))
                .await?;
            ensure!(stored, "failed to store filters {start}..={stop}");

            info!(
                target: "filter_sync",
                %chain,
                ?filter_type,
                start,
                stop,
                filter_header = %rolling.tip,
                "advanced filters"
            );
            previous = rolling.tip;
            parent = linked;
            tip = next;
        }

        Ok(tip)
    }
}
