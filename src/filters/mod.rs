//! Persisted compact-filter chain state.
//!
//! [`Filters`] owns four tables per filter type: a filter-header tip, a
//! filter tip, one filter-header row per block and one filter row per block.
//! Opening it seeds the genesis rows for every filter type the chain supports.
//!
//! Read operations log store failures and degrade to "absent" (blank tip,
//! `None`, `false`). Write operations report success as a `bool`; compound
//! writes commit in a single transaction so a failure leaves nothing behind.
use bitcoin::bip158::{BlockFilter, FilterHash, FilterHeader};
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::cfheaders::FilterHeaderChain;
use crate::chain::{Chain, FilterType};
use crate::error::{StartupError, StoreError};
use crate::store::{KeyValueStore, Table, Transaction};

mod genesis;
mod rows;

pub use genesis::{genesis_filter, GenesisFilter};
pub use rows::{filter_hash, FilterHeaderRecord, Position};
use rows::{block_key, tip_key};

/// Compact-filter chain state on top of a [`KeyValueStore`].
pub struct Filters<S> {
    chain: Chain,
    store: S,
    genesis_lock: Mutex<()>,
}

impl<S: KeyValueStore> Filters<S> {
    /// Open the filter state of `chain`, importing genesis rows where missing.
    ///
    /// Fails if the store cannot be written or if the stored genesis filter
    /// does not validate against its filter header. Either way the store is
    /// unusable for this chain.
    pub fn open(chain: Chain, store: S) -> Result<Self, StartupError> {
        let filters = Self {
            chain,
            store,
            genesis_lock: Mutex::new(()),
        };
        filters.import_genesis()?;
        Ok(filters)
    }

    /// Chain this state belongs to.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Filter types maintained for the chain.
    pub fn filter_types(&self) -> &'static [FilterType] {
        self.chain.params().filter_types
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn import_genesis(&self) -> Result<(), StartupError> {
        let _guard = self.genesis_lock.lock();
        for &filter_type in self.filter_types() {
            let genesis = genesis_filter(self.chain, filter_type)?;
            let header_tip = self.try_position(Table::FilterHeaderTips, filter_type)?;
            let tip = self.try_position(Table::FilterTips, filter_type)?;

            if header_tip.is_none() || tip.is_none() {
                info!(
                    target: "filters",
                    chain = %self.chain,
                    ?filter_type,
                    block = %genesis.block_hash,
                    "importing genesis filter"
                );
                let key = block_key(filter_type, &genesis.block_hash);
                let record = FilterHeaderRecord {
                    block_hash: genesis.block_hash,
                    header: genesis.header,
                    filter_hash: filter_hash(&genesis.filter),
                };
                let position = Position::new(0, genesis.block_hash).encode();

                let mut tx = self.store.transaction()?;
                tx.store(Table::FilterHeaders, &key, &record.encode_value())?;
                tx.store(Table::Filters, &key, &genesis.filter.content)?;
                if header_tip.is_none() {
                    tx.store(Table::FilterHeaderTips, &tip_key(filter_type), &position)?;
                }
                if tip.is_none() {
                    tx.store(Table::FilterTips, &tip_key(filter_type), &position)?;
                }
                tx.finalize(true)?;
            }

            self.verify_genesis(filter_type, &genesis)?;
        }
        Ok(())
    }

    fn verify_genesis(&self, filter_type: FilterType, genesis: &GenesisFilter) -> Result<(), StartupError> {
        let missing = |what| StartupError::GenesisMissing {
            chain: self.chain,
            filter_type,
            what,
        };
        let key = block_key(filter_type, &genesis.block_hash);
        let content = self.store.load(Table::Filters, &key)?.ok_or_else(|| missing("filter"))?;
        let row = self
            .store
            .load(Table::FilterHeaders, &key)?
            .ok_or_else(|| missing("filter header"))?;
        let record = FilterHeaderRecord::decode_value(genesis.block_hash, &row)?;

        let filter = BlockFilter::new(&content);
        let valid = filter_hash(&filter) == record.filter_hash
            && filter.filter_header(&FilterHeader::all_zeros()) == record.header
            && record.header == genesis.header;
        if !valid {
            error!(
                target: "filters",
                chain = %self.chain,
                ?filter_type,
                "stored genesis filter does not match its filter header"
            );
            return Err(StartupError::GenesisInvalid {
                chain: self.chain,
                filter_type,
            });
        }
        Ok(())
    }

    fn try_position(&self, table: Table, filter_type: FilterType) -> Result<Option<Position>, StoreError> {
        match self.store.load(table, &tip_key(filter_type))? {
            Some(bytes) => Ok(Some(Position::decode(&bytes)?).filter(|p| !p.is_blank())),
            None => Ok(None),
        }
    }

    fn position(&self, table: Table, filter_type: FilterType) -> Position {
        match self.try_position(table, filter_type) {
            Ok(position) => position.unwrap_or_else(Position::blank),
            Err(error) => {
                error!(target: "filters", ?filter_type, table = table.name(), %error, "failed to load tip");
                Position::blank()
            }
        }
    }

    /// Best filter-header tip, or [`Position::blank`].
    pub fn current_header_tip(&self, filter_type: FilterType) -> Position {
        self.position(Table::FilterHeaderTips, filter_type)
    }

    /// Best filter tip, or [`Position::blank`].
    pub fn current_tip(&self, filter_type: FilterType) -> Position {
        self.position(Table::FilterTips, filter_type)
    }

    fn exists(&self, table: Table, filter_type: FilterType, block: &BlockHash) -> bool {
        self.store
            .exists(table, &block_key(filter_type, block))
            .unwrap_or_else(|error| {
                error!(target: "filters", ?filter_type, %block, %error, "lookup failed");
                false
            })
    }

    /// Whether the filter of `block` is stored.
    pub fn have_filter(&self, filter_type: FilterType, block: &BlockHash) -> bool {
        self.exists(Table::Filters, filter_type, block)
    }

    /// Whether the filter header of `block` is stored.
    pub fn have_filter_header(&self, filter_type: FilterType, block: &BlockHash) -> bool {
        self.exists(Table::FilterHeaders, filter_type, block)
    }

    /// Filter of `block`, if stored.
    pub fn load_filter(&self, filter_type: FilterType, block: &BlockHash) -> Option<BlockFilter> {
        match self.store.load(Table::Filters, &block_key(filter_type, block)) {
            Ok(Some(content)) => Some(BlockFilter::new(&content)),
            Ok(None) => {
                debug!(target: "filters", ?filter_type, %block, "filter not found");
                None
            }
            Err(error) => {
                error!(target: "filters", ?filter_type, %block, %error, "failed to load filter");
                None
            }
        }
    }

    /// Filters of `blocks`, positionally; absent filters are `None`.
    pub fn load_filters(&self, filter_type: FilterType, blocks: &[BlockHash]) -> Vec<Option<BlockFilter>> {
        blocks.iter().map(|block| self.load_filter(filter_type, block)).collect()
    }

    fn load_record(&self, filter_type: FilterType, block: &BlockHash) -> Option<FilterHeaderRecord> {
        let row = match self.store.load(Table::FilterHeaders, &block_key(filter_type, block)) {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(target: "filters", ?filter_type, %block, "filter header not found");
                return None;
            }
            Err(error) => {
                error!(target: "filters", ?filter_type, %block, %error, "failed to load filter header");
                return None;
            }
        };
        FilterHeaderRecord::decode_value(*block, &row)
            .map_err(|error| error!(target: "filters", ?filter_type, %block, %error, "bad filter header row"))
            .ok()
    }

    /// Filter hash committed to by the filter header of `block`.
    pub fn load_filter_hash(&self, filter_type: FilterType, block: &BlockHash) -> Option<FilterHash> {
        self.load_record(filter_type, block).map(|r| r.filter_hash)
    }

    /// Filter header of `block`.
    pub fn load_filter_header(&self, filter_type: FilterType, block: &BlockHash) -> Option<FilterHeader> {
        self.load_record(filter_type, block).map(|r| r.header)
    }

    fn set_position(&self, table: Table, filter_type: FilterType, position: Position) -> bool {
        match self.store.store(table, &tip_key(filter_type), &position.encode()) {
            Ok(()) => {
                debug!(target: "filters", ?filter_type, table = table.name(), %position, "tip updated");
                true
            }
            Err(error) => {
                error!(target: "filters", ?filter_type, table = table.name(), %error, "failed to update tip");
                false
            }
        }
    }

    /// Overwrite the filter-header tip.
    pub fn set_header_tip(&self, filter_type: FilterType, position: Position) -> bool {
        self.set_position(Table::FilterHeaderTips, filter_type, position)
    }

    /// Overwrite the filter tip.
    pub fn set_tip(&self, filter_type: FilterType, position: Position) -> bool {
        self.set_position(Table::FilterTips, filter_type, position)
    }

    /// Store filter headers, filters and (unless `tip` is blank) both tips in
    /// one transaction.
    ///
    /// Rejected without writing anything when a filter does not hash to the
    /// filter hash of a header record for the same block in `headers`.
    pub fn store_filters_with_tip(
        &self,
        filter_type: FilterType,
        headers: &[FilterHeaderRecord],
        filters: &[(BlockHash, BlockFilter)],
        tip: Position,
    ) -> bool {
        let committed: HashMap<BlockHash, FilterHash> =
            headers.iter().map(|r| (r.block_hash, r.filter_hash)).collect();
        for (block, filter) in filters {
            if let Some(expected) = committed.get(block) {
                if filter_hash(filter) != *expected {
                    warn!(
                        target: "filters",
                        ?filter_type,
                        %block,
                        "filter does not match its filter header"
                    );
                    return false;
                }
            }
        }

        match self.write_batch(filter_type, headers, filters, tip) {
            Ok(()) => {
                debug!(
                    target: "filters",
                    ?filter_type,
                    headers = headers.len(),
                    filters = filters.len(),
                    %tip,
                    "stored batch"
                );
                true
            }
            Err(error) => {
                error!(target: "filters", ?filter_type, %error, "failed to store batch");
                false
            }
        }
    }

    fn write_batch(
        &self,
        filter_type: FilterType,
        headers: &[FilterHeaderRecord],
        filters: &[(BlockHash, BlockFilter)],
        tip: Position,
    ) -> Result<(), StoreError> {
        let mut tx = self.store.transaction()?;
        for record in headers {
            tx.store(
                Table::FilterHeaders,
                &block_key(filter_type, &record.block_hash),
                &record.encode_value(),
            )?;
        }
        for (block, filter) in filters {
            tx.store(Table::Filters, &block_key(filter_type, block), &filter.content)?;
        }
        if !tip.is_blank() {
            let position = tip.encode();
            tx.store(Table::FilterHeaderTips, &tip_key(filter_type), &position)?;
            tx.store(Table::FilterTips, &tip_key(filter_type), &position)?;
        }
        tx.finalize(true)
    }

    /// Store filters only, leaving tips untouched.
    pub fn store_filters(&self, filter_type: FilterType, filters: &[(BlockHash, BlockFilter)]) -> bool {
        self.store_filters_with_tip(filter_type, &[], filters, Position::blank())
    }

    /// Store filter headers after checking that they chain onto `previous`.
    pub fn store_headers(
        &self,
        filter_type: FilterType,
        previous: FilterHeader,
        headers: &[FilterHeaderRecord],
    ) -> bool {
        if let Err(error) = FilterHeaderChain::new(previous).verify(headers) {
            warn!(target: "filters", ?filter_type, %error, "rejecting filter headers");
            return false;
        }
        self.store_filters_with_tip(filter_type, headers, &[], Position::blank())
    }
}
