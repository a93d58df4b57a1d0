//! The normalized log document.

use alloy_rpc_types::Log;

/// An event log as persisted to the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDocument {
    /// Address the log was emitted from.
    pub address: String,
    /// Ordered indexed topics, zero to four 32-byte hex strings.
    pub topics: Vec<String>,
    /// Unindexed log payload, hex string.
    pub data: String,
    /// Number of the enclosing block.
    pub block_number: i64,
    /// Hash of the emitting transaction.
    pub transaction_hash: String,
    /// Position of the emitting transaction within its block.
    pub transaction_index: i64,
    /// Hash of the enclosing block.
    pub block_hash: String,
    /// Position of the log within its block.
    pub log_index: i64,
    /// Whether the log was removed by a reorg. Serialized as a string.
    pub removed: bool,
}

impl LogDocument {
    /// Converts an RPC log into its document form.
    pub fn from_rpc(log: &Log) -> Self {
        Self {
            address: log.inner.address.to_string(),
            topics: log.inner.data.topics().iter().map(|t| t.to_string()).collect(),
            data: log.inner.data.data.to_string(),
            block_number: log.block_number.unwrap_or_default() as i64,
            transaction_hash: log
                .transaction_hash
                .map(|h| h.to_string())
                .unwrap_or_default(),
            transaction_index: log.transaction_index.unwrap_or_default() as i64,
            block_hash: log.block_hash.map(|h| h.to_string()).unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default() as i64,
            removed: log.removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, LogData, B256};

    fn test_log() -> Log {
        let data = LogData::new_unchecked(
            vec![B256::with_last_byte(0xa1), B256::with_last_byte(0xa2)],
            Bytes::from(vec![0x01, 0x02]),
        );
        Log {
            inner: alloy_primitives::Log { address: Address::with_last_byte(0x66), data },
            block_hash: Some(B256::with_last_byte(2)),
            block_number: Some(1337),
            block_timestamp: None,
            transaction_hash: Some(B256::with_last_byte(0xaa)),
            transaction_index: Some(1),
            log_index: Some(3),
            removed: false,
        }
    }

    #[test]
    fn test_log_document_from_rpc() {
        let doc = LogDocument::from_rpc(&test_log());
        assert_eq!(doc.topics.len(), 2);
        assert_eq!(doc.data, "0x0102");
        assert_eq!(doc.block_number, 1337);
        assert_eq!(doc.transaction_index, 1);
        assert_eq!(doc.log_index, 3);
        assert!(!doc.removed);
    }

    #[test]
    fn test_log_document_pending_fields_default() {
        let mut log = test_log();
        log.block_number = None;
        log.transaction_hash = None;
        log.log_index = None;
        let doc = LogDocument::from_rpc(&log);
        assert_eq!(doc.block_number, 0);
        assert_eq!(doc.transaction_hash, "");
        assert_eq!(doc.log_index, 0);
    }
}
