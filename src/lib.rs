#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! niebla-cfstate: block headers and compact-filter (BIP-157/158) chain state
//! for Bitcoin-family light clients.
//!
//! ## Headers
//! - [`Header`]: immutable 80-byte header with its identity hash, proof-of-work
//!   hash, height, status and accumulated work.
//! - [`HeaderBuilder`]: sets fields and searches nonces until the proof of work holds.
//! - [`HeaderRecord`]: persisted form; hashes are recomputed on load.
//! - [`HashProvider`]: identity and proof-of-work hashing (sha256d, scrypt).
//!
//! ## Filters
//! - [`Filters`]: per-filter-type tips, filter headers and filters on top of a
//!   [`KeyValueStore`]; seeds the genesis filter on open.
//! - [`FilterSync`] (feature `runtime`): pulls `cfheaders`/`cfilter` from your
//!   [`FilterSource`] up to the tip of your [`HeaderSource`].
//!
//! ## Minimal usage
//! ```rust,ignore
//! use niebla_cfstate::prelude::*;
//! use std::sync::Arc;
//!
//! async fn run(source: impl FilterSource + 'static, headers: impl HeaderSource + 'static) -> anyhow::Result<()> {
//!     let config = Config::from_path("cfstate.json")?;
//!     let store = SqliteStore::open(&config.store)?;
//!     let filters = Arc::new(Filters::open(config.chain, store)?);
//!
//!     let sync = FilterSync::new(filters.clone(), source, headers).with_config(&config);
//!     let tip = sync.run_to_tip(FilterType::Basic).await?;
//!     let filter = filters.load_filter(FilterType::Basic, &tip.hash);
//!     Ok(())
//! }
//! ```
/// Chain parameters, filter types and hashing kinds.
pub mod chain;

/// 80-byte header pre-image encoding.
pub mod codec;

/// Runtime configuration.
pub mod config;

/// Error types.
pub mod error;

/// Persisted compact-filter chain state.
pub mod filters;

/// Identity and proof-of-work hashing.
pub mod hash;

/// Block header entity, builder and records.
pub mod header;

/// Compact targets, work and numeric hashes.
pub mod pow;

/// Persistence layer (traits, in-memory and SQLite implementations).
pub mod store;

/// Traits and types for fetching cfheaders and cfilters from the network.
#[cfg(feature = "runtime")]
pub mod filter_source;

/// Block header lookup abstraction (height → hash).
#[cfg(feature = "runtime")]
pub mod headers;

/// Driver that advances [`Filters`] from a [`FilterSource`].
#[cfg(feature = "runtime")]
pub mod sync;

// Internal helpers:
mod cfheaders;

// Public re-exports
pub use chain::{Chain, FilterType};
pub use config::Config;
pub use error::{HashError, HeaderError, StartupError, StoreError};
pub use filters::{FilterHeaderRecord, Filters, Position};
pub use hash::{HashProvider, NativeHasher};
pub use header::{Header, HeaderBuilder, HeaderRecord, Status};
pub use store::{KeyValueStore, MemoryStore, Table, Transaction};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;

#[cfg(feature = "runtime")]
pub use filter_source::{CfHeadersBatch, FilterSource};
#[cfg(feature = "runtime")]
pub use headers::HeaderSource;
#[cfg(feature = "runtime")]
pub use sync::FilterSync;

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{
        Chain, Config, FilterHeaderRecord, FilterType, Filters, Header, HeaderBuilder, KeyValueStore,
        MemoryStore, NativeHasher, Position,
    };

    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;

    #[cfg(feature = "runtime")]
    pub use crate::{CfHeadersBatch, FilterSource, FilterSync, HeaderSource};
}
