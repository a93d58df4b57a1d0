//! This module contains the errors surfaced by the pipeline driver.

use silt_store::StoreError;
use thiserror::Error;

/// A result type for pipeline operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// An error that stops the pipeline.
///
/// Per-block failures never surface here; they advance the watermark with a
/// warning instead. Only cancellation and wiring failures are terminal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The shutdown signal fired.
    #[error("pipeline cancelled")]
    Cancelled,
    /// A pipeline channel closed unexpectedly.
    #[error("pipeline channel closed: {0}")]
    ChannelClosed(String),
    /// The store failed before the pipeline could start.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
