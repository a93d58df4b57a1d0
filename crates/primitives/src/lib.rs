#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod block;
pub use block::BlockDocument;

pub mod transaction;
pub use transaction::{AccessListEntryDocument, TransactionDocument};

pub mod log;
pub use log::LogDocument;

pub mod receipt;
pub use receipt::ReceiptRecord;

pub mod payload;
pub use payload::BlockPayload;
