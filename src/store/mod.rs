//! Persistence interfaces and implementations for the filter tables
//! (tips, filter headers and filter bodies).
use crate::error::StoreError;

pub mod memory;
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;

pub use memory::MemoryStore;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;

/// Tables owned by [`Filters`](crate::filters::Filters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Best filter-header tip, keyed by filter type.
    FilterHeaderTips,
    /// Best filter tip, keyed by filter type.
    FilterTips,
    /// Filter header and filter hash, keyed by filter type and block hash.
    FilterHeaders,
    /// Raw GCS filter bytes, keyed by filter type and block hash.
    Filters,
}

impl Table {
    /// Every table.
    pub const ALL: [Table; 4] = [
        Table::FilterHeaderTips,
        Table::FilterTips,
        Table::FilterHeaders,
        Table::Filters,
    ];

    /// Stable name, used as the SQL table name.
    pub fn name(self) -> &'static str {
        match self {
            Table::FilterHeaderTips => "filter_header_tips",
            Table::FilterTips => "filter_tips",
            Table::FilterHeaders => "filter_headers",
            Table::Filters => "filters",
        }
    }
}

/// Table-oriented key-value store with atomic multi-key transactions.
///
/// Single [`store`](KeyValueStore::store) calls are atomic per row. Writes
/// issued through one [`Transaction`] become visible together on commit or
/// not at all.
pub trait KeyValueStore: Send + Sync {
    /// Transaction handle.
    type Tx: Transaction;

    /// Read one row.
    fn load(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether a row exists.
    fn exists(&self, table: Table, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.load(table, key)?.is_some())
    }

    /// Insert or replace one row.
    fn store(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Open a write transaction.
    fn transaction(&self) -> Result<Self::Tx, StoreError>;
}

/// A batch of writes that commits atomically.
///
/// Dropping a transaction without finalizing it discards its writes.
pub trait Transaction {
    /// Queue an insert-or-replace.
    fn store(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Commit (`true`) or discard (`false`) every queued write.
    fn finalize(self, commit: bool) -> Result<(), StoreError>;
}
