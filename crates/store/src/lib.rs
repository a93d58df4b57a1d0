#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::MemoryStore;

pub mod errors;
pub use errors::{StoreError, StoreResult};

pub mod collections;
pub use collections::CollectionSet;

pub mod transport;
pub use transport::{EmbeddedStore, EmbeddedTransport, HttpTransport, StoreSession, StoreTransport};

pub mod mutation;
pub mod response;

pub mod adapter;
pub use adapter::{StoreAdapter, CHILD_BATCH_SIZE, DEFAULT_MAX_DOCS_PER_TXN};
