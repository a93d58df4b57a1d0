//! The assembled unit of work for a single block.

use crate::{BlockDocument, ReceiptRecord, TransactionDocument};

/// A fully fetched block: the block document, its transactions, and one
/// receipt per transaction, in transaction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPayload {
    /// The block document.
    pub block: BlockDocument,
    /// Transactions in block order.
    pub transactions: Vec<TransactionDocument>,
    /// Receipts aligned with `transactions`.
    pub receipts: Vec<ReceiptRecord>,
}

impl BlockPayload {
    /// Total number of documents the payload expands to in the store: the
    /// block itself, every transaction, every log, and every access-list
    /// entry.
    pub fn document_count(&self) -> usize {
        1 + self.transactions.len()
            + self.receipts.iter().map(|r| r.logs.len()).sum::<usize>()
            + self.transactions.iter().map(|t| t.access_list.len()).sum::<usize>()
    }

    /// Merges each receipt's outcome fields into its transaction document.
    /// Receipts are matched positionally and verified by hash.
    pub fn merge_receipts(&mut self) {
        for (tx, receipt) in self.transactions.iter_mut().zip(self.receipts.iter()) {
            if tx.hash == receipt.transaction_hash {
                tx.apply_receipt(receipt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogDocument;

    #[test]
    fn test_document_count() {
        let payload = BlockPayload {
            block: BlockDocument::default(),
            transactions: vec![
                TransactionDocument {
                    access_list: vec![Default::default()],
                    ..Default::default()
                },
                TransactionDocument::default(),
            ],
            receipts: vec![
                ReceiptRecord { logs: vec![LogDocument::default(); 3], ..Default::default() },
                ReceiptRecord::default(),
            ],
        };
        // 1 block + 2 transactions + 3 logs + 1 access-list entry.
        assert_eq!(payload.document_count(), 7);
    }

    #[test]
    fn test_merge_receipts_matches_by_hash() {
        let mut payload = BlockPayload {
            block: BlockDocument::default(),
            transactions: vec![TransactionDocument {
                hash: "0xaa".to_string(),
                ..Default::default()
            }],
            receipts: vec![ReceiptRecord {
                transaction_hash: "0xaa".to_string(),
                cumulative_gas_used: "21000".to_string(),
                status: true,
                ..Default::default()
            }],
        };
        payload.merge_receipts();
        assert!(payload.transactions[0].status);
        assert_eq!(payload.transactions[0].cumulative_gas_used, "21000");
    }
}
