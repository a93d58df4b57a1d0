//! The per-transaction receipt payload.

use crate::LogDocument;
use alloy_consensus::TxReceipt;
use alloy_rpc_types::TransactionReceipt;

/// The subset of a transaction receipt the indexer persists: execution
/// outcome fields folded into the owning transaction document, plus the
/// emitted logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptRecord {
    /// Hash of the transaction this receipt belongs to.
    pub transaction_hash: String,
    /// Cumulative gas used in the block up to and including this
    /// transaction, decimal string.
    pub cumulative_gas_used: String,
    /// Effective gas price paid, decimal string.
    pub effective_gas_price: String,
    /// Whether execution succeeded.
    pub status: bool,
    /// Logs emitted by the transaction, in order.
    pub logs: Vec<LogDocument>,
}

impl ReceiptRecord {
    /// Converts an RPC receipt into its record form.
    pub fn from_rpc(receipt: &TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash.to_string(),
            cumulative_gas_used: receipt.inner.cumulative_gas_used().to_string(),
            effective_gas_price: receipt.effective_gas_price.to_string(),
            status: receipt.status(),
            logs: receipt.inner.logs().iter().map(LogDocument::from_rpc).collect(),
        }
    }
}
