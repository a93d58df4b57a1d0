//! The startup resume protocol.

use silt_store::{StoreAdapter, StoreError, StoreResult, StoreTransport};
use tracing::info;

/// Resolves the block number the pipeline should start at: one past the
/// highest block already persisted, or the configured start block when the
/// store is empty.
pub async fn resolve_start_block<T: StoreTransport>(
    store: &StoreAdapter<T>,
    configured_start: u64,
) -> StoreResult<u64> {
    match store.highest_block_number().await {
        Ok(highest) => {
            info!(target: "processor", highest, "resuming one past the highest stored block");
            Ok(highest + 1)
        }
        Err(StoreError::DocumentNotFound) => {
            info!(target: "processor", configured_start, "store is empty, starting at configured block");
            Ok(configured_start)
        }
        Err(err) => Err(err),
    }
}
