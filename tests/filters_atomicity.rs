use bitcoin::bip158::BlockFilter;
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use niebla_cfstate::error::{StartupError, StoreError};
use niebla_cfstate::filters::{filter_hash, genesis_filter};
use niebla_cfstate::prelude::*;
use niebla_cfstate::store::{memory::MemoryTransaction, Table, Transaction};
use proptest::prelude::*;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

const BASIC: FilterType = FilterType::Basic;

/// Memory store whose transactions fail after a set number of writes, or at commit.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    writes_allowed: Arc<AtomicUsize>,
    fail_commit: Arc<AtomicBool>,
}

impl FlakyStore {
    fn new() -> Self {
        let store = Self::default();
        store.writes_allowed.store(usize::MAX, Ordering::SeqCst);
        store
    }
}

struct FlakyTx {
    inner: MemoryTransaction,
    writes_allowed: usize,
    fail_commit: bool,
}

impl KeyValueStore for FlakyStore {
    type Tx = FlakyTx;

    fn load(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.load(table, key)
    }

    fn store(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.store(table, key, value)
    }

    fn transaction(&self) -> Result<Self::Tx, StoreError> {
        Ok(FlakyTx {
            inner: self.inner.transaction()?,
            writes_allowed: self.writes_allowed.load(Ordering::SeqCst),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        })
    }
}

impl Transaction for FlakyTx {
    fn store(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if self.writes_allowed == 0 {
            return Err(StoreError::Corrupt("injected write failure".into()));
        }
        self.writes_allowed -= 1;
        self.inner.store(table, key, value)
    }

    fn finalize(self, commit: bool) -> Result<(), StoreError> {
        if commit && self.fail_commit {
            self.inner.finalize(false)?;
            return Err(StoreError::Corrupt("injected commit failure".into()));
        }
        self.inner.finalize(commit)
    }
}

fn block(n: u8) -> BlockHash {
    BlockHash::from_byte_array([n; 32])
}

fn batch(n: u8) -> (Vec<FilterHeaderRecord>, Vec<(BlockHash, BlockFilter)>) {
    let mut previous = genesis_filter(Chain::UnitTest, BASIC).unwrap().header;
    let mut headers = Vec::new();
    let mut filters = Vec::new();
    for i in 1..=n {
        let filter = BlockFilter::new(&[1, i, 0x42]);
        let record = FilterHeaderRecord::next(block(i), &filter, &previous);
        previous = record.header;
        headers.push(record);
        filters.push((block(i), filter));
    }
    (headers, filters)
}

type Snapshot = (Vec<usize>, Position, Position);

fn snapshot(store: &FlakyStore, filters: &Filters<FlakyStore>) -> Snapshot {
    (
        Table::ALL.iter().map(|t| store.inner.row_count(*t)).collect(),
        filters.current_header_tip(BASIC),
        filters.current_tip(BASIC),
    )
}

proptest! {
    #[test]
    fn failed_batches_leave_no_trace(n in 1u8..6, writes_allowed in 0usize..16, fail_commit in any::<bool>()) {
        let store = FlakyStore::new();
        let filters = Filters::open(Chain::UnitTest, store.clone()).unwrap();
        let before = snapshot(&store, &filters);

        store.writes_allowed.store(writes_allowed, Ordering::SeqCst);
        store.fail_commit.store(fail_commit, Ordering::SeqCst);

        let (headers, batch) = batch(n);
        let tip = Position::new(i64::from(n), block(n));
        let stored = filters.store_filters_with_tip(BASIC, &headers, &batch, tip);

        // one header row and one filter row per block, plus two tips
        let writes = 2 * usize::from(n) + 2;
        prop_assert_eq!(stored, writes_allowed >= writes && !fail_commit);
        if stored {
            prop_assert_eq!(filters.current_tip(BASIC), tip);
            prop_assert_eq!(filters.current_header_tip(BASIC), tip);
            for (hash, filter) in &batch {
                let loaded = filters.load_filter(BASIC, hash);
                prop_assert_eq!(loaded.as_ref(), Some(filter));
                prop_assert!(filters.have_filter_header(BASIC, hash));
            }
        } else {
            prop_assert_eq!(snapshot(&store, &filters), before);
        }
    }

    #[test]
    fn broken_header_chains_are_never_stored(n in 2u8..6, broken in 0usize..5) {
        let store = FlakyStore::new();
        let filters = Filters::open(Chain::UnitTest, store.clone()).unwrap();
        let before = snapshot(&store, &filters);
        let genesis = genesis_filter(Chain::UnitTest, BASIC).unwrap().header;

        let (mut headers, _) = batch(n);
        let broken = broken % headers.len();
        headers[broken].filter_hash = filter_hash(&BlockFilter::new(&[9, 9]));

        prop_assert!(!filters.store_headers(BASIC, genesis, &headers));
        prop_assert_eq!(snapshot(&store, &filters), before);
    }
}

#[test]
fn failed_genesis_import_is_fatal() {
    let store = FlakyStore::new();
    store.writes_allowed.store(1, Ordering::SeqCst);
    assert!(matches!(
        Filters::open(Chain::UnitTest, store.clone()),
        Err(StartupError::Store(_))
    ));
    assert_eq!(store.inner.row_count(Table::Filters), 0);
    assert_eq!(store.inner.row_count(Table::FilterHeaders), 0);
}
