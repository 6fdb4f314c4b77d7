//! Historical archive of blocks, transactions and logs for the JSON-RPC
//! relayer, laid out in a single ordered keyspace.
//!
//! [`Store`] owns the storage engine and its background compaction. All
//! mutation goes through a [`Writer`]; queries go through a [`Reader`] bound
//! to one consistent snapshot.

pub mod api;
mod backend;
mod cache;
pub mod config;
mod context;
pub mod error;
pub mod filters;
pub mod logscan;
mod reader;
pub mod response;
mod store;
mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::StoreConfig;
pub use context::{Interruption, Page, QueryContext};
pub use error::StoreError;
pub use filters::{FilterStateStore, InMemoryFilterStore};
pub use logscan::LogFilter;
pub use reader::Reader;
pub use store::{EngineType, Store};
pub use writer::Writer;
