//! In-process store, for tests and ephemeral wallets.
use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use super::{KeyValueStore, Table, Transaction};
use crate::error::StoreError;

type Rows = HashMap<(Table, Vec<u8>), Vec<u8>>;

/// `HashMap` store behind a read-write lock.
///
/// Clones share the same rows, which is how tests "reopen" a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<Rows>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: Table) -> usize {
        self.rows.read().keys().filter(|(t, _)| *t == table).count()
    }
}

impl KeyValueStore for MemoryStore {
    type Tx = MemoryTransaction;

    fn load(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.rows.read().get(&(table, key.to_vec())).cloned())
    }

    fn store(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.rows.write().insert((table, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn transaction(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTransaction {
            rows: Arc::clone(&self.rows),
            pending: Vec::new(),
        })
    }
}

/// Writes buffered until [`Transaction::finalize`], then applied under one write lock.
#[derive(Debug)]
pub struct MemoryTransaction {
    rows: Arc<RwLock<Rows>>,
    pending: Vec<(Table, Vec<u8>, Vec<u8>)>,
}

impl Transaction for MemoryTransaction {
    fn store(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.pending.push((table, key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn finalize(self, commit: bool) -> Result<(), StoreError> {
        if commit {
            let mut rows = self.rows.write();
            for (table, key, value) in self.pending {
                rows.insert((table, key), value);
            }
        }
        Ok(())
    }
}
