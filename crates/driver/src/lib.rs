#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[cfg(feature = "metrics")]
pub mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::*;

mod macros;

pub mod errors;
pub use errors::{ProcessError, ProcessResult};

pub mod prefetch;
pub use prefetch::{PrefetchedBlock, Prefetcher};

pub mod processor;
pub use processor::{BlockResult, Processor, ProcessorConfig, EXISTING_DOC_ID};

pub mod resume;
pub use resume::resolve_start_block;
