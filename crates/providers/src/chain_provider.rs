//! This module defines the [ChainProvider] trait.

use async_trait::async_trait;
use silt_primitives::{BlockDocument, ReceiptRecord, TransactionDocument};
use thiserror::Error;

/// A result type for [ChainProvider] operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// An error returned by a [ChainProvider].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The requested block does not exist on the node yet.
    #[error("block {0} not found")]
    BlockNotFound(u64),
    /// The node has no receipt for the given transaction.
    #[error("receipt not found for transaction {0}")]
    ReceiptNotFound(String),
    /// A transport-level failure. Retryable.
    #[error("network error: {0}")]
    Network(String),
    /// The node returned data the client could not interpret.
    #[error("malformed chain data: {0}")]
    Data(String),
}

impl ProviderError {
    /// Whether the error means the requested data has not been produced yet.
    ///
    /// Node implementations differ in how they phrase this, so transport
    /// errors are additionally classified by message contents.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BlockNotFound(_) | Self::ReceiptNotFound(_) => true,
            Self::Network(msg) | Self::Data(msg) => {
                msg.contains("not found") || msg.contains("does not exist")
            }
        }
    }
}

/// Describes a data source that can serve Ethereum-family chain data to the
/// ingestion pipeline.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Returns the number of the latest block known to the node.
    async fn latest_block_number(&self) -> ProviderResult<u64>;

    /// Returns the block at the given number together with its full
    /// transactions, converted into document form.
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> ProviderResult<(BlockDocument, Vec<TransactionDocument>)>;

    /// Returns the receipt for the given transaction hash.
    async fn transaction_receipt(&self, tx_hash: &str) -> ProviderResult<ReceiptRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ProviderError::BlockNotFound(7).is_not_found());
        assert!(ProviderError::ReceiptNotFound("0xaa".to_string()).is_not_found());
        assert!(ProviderError::Network("header does not exist".to_string()).is_not_found());
        assert!(ProviderError::Data("block not found".to_string()).is_not_found());
        assert!(!ProviderError::Network("connection refused".to_string()).is_not_found());
    }

    #[test]
    fn test_display_carries_not_found() {
        let err = ProviderError::BlockNotFound(1000);
        assert!(err.to_string().contains("not found"));
    }
}
