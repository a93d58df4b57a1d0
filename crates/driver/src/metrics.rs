//! Metrics for the ingestion pipeline.

use lazy_static::lazy_static;
use prometheus::{self, register_counter, Counter};

lazy_static! {
    /// Tracks the number of blocks committed to the store.
    pub static ref INDEXED_BLOCKS: Counter = register_counter!(
        "silt_indexed_blocks",
        "Number of blocks committed to the store"
    ).expect("Indexed Blocks failed to register");

    /// Tracks the number of blocks skipped because they were already
    /// present.
    pub static ref SKIPPED_BLOCKS: Counter = register_counter!(
        "silt_skipped_blocks",
        "Number of blocks already present in the store"
    ).expect("Skipped Blocks failed to register");

    /// Tracks the number of blocks that failed to commit.
    pub static ref FAILED_BLOCKS: Counter = register_counter!(
        "silt_failed_blocks",
        "Number of blocks that failed to commit"
    ).expect("Failed Blocks failed to register");
}
