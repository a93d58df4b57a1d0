//! The collection-aware store adapter and the batched write orchestrator.

use crate::{
    collections::CollectionSet,
    mutation::{
        access_list_entry_fields, block_fields, log_fields, transaction_fields, GqlValue,
        MutationBuilder,
    },
    response::doc_id_for_alias,
    transport::{StoreSession, StoreTransport},
    StoreError, StoreResult,
};
use serde_json::Value;
use silt_primitives::{
    AccessListEntryDocument, BlockDocument, BlockPayload, LogDocument, TransactionDocument,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Default ceiling on documents committed in a single store transaction.
pub const DEFAULT_MAX_DOCS_PER_TXN: usize = 256;

/// Number of child documents per transaction on the sharded write path.
pub const CHILD_BATCH_SIZE: usize = 64;

/// Writes and reads the document collections through a [StoreTransport].
///
/// Single-document operations are idempotent: an `already exists` response
/// that carries the existing document ID is returned as success. The
/// batched path instead surfaces [StoreError::AlreadyExists] so callers can
/// skip the whole block.
#[derive(Debug)]
pub struct StoreAdapter<T> {
    transport: T,
    collections: CollectionSet,
    max_docs_per_txn: usize,
}

impl<T: StoreTransport> StoreAdapter<T> {
    /// Creates an adapter with default collection names and transaction
    /// sizing.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            collections: CollectionSet::default(),
            max_docs_per_txn: DEFAULT_MAX_DOCS_PER_TXN,
        }
    }

    /// Overrides the collection names.
    pub fn with_collections(mut self, collections: CollectionSet) -> Self {
        self.collections = collections;
        self
    }

    /// Overrides the per-transaction document ceiling.
    pub fn with_max_docs_per_txn(mut self, max_docs_per_txn: usize) -> Self {
        self.max_docs_per_txn = max_docs_per_txn.max(1);
        self
    }

    /// Returns the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Creates a block document and returns its ID.
    pub async fn create_block(&self, block: &BlockDocument) -> StoreResult<String> {
        self.create_one("block0", &self.collections.block, &block_fields(block)).await
    }

    /// Creates a transaction document referencing its block.
    pub async fn create_transaction(
        &self,
        tx: &TransactionDocument,
        block_doc_id: &str,
    ) -> StoreResult<String> {
        self.create_one(
            "tx0",
            &self.collections.transaction,
            &transaction_fields(tx, Some(block_doc_id)),
        )
        .await
    }

    /// Creates a log document referencing its block and transaction.
    pub async fn create_log(
        &self,
        log: &LogDocument,
        block_doc_id: &str,
        tx_doc_id: &str,
    ) -> StoreResult<String> {
        self.create_one(
            "log0",
            &self.collections.log,
            &log_fields(log, Some(block_doc_id), Some(tx_doc_id)),
        )
        .await
    }

    /// Creates an access-list entry document referencing its transaction.
    pub async fn create_access_list_entry(
        &self,
        entry: &AccessListEntryDocument,
        tx_doc_id: &str,
    ) -> StoreResult<String> {
        self.create_one(
            "ale0",
            &self.collections.access_list_entry,
            &access_list_entry_fields(entry, Some(tx_doc_id)),
        )
        .await
    }

    /// Fills a transaction's block reference after the fact. Used only by
    /// the non-batched legacy write path.
    pub async fn update_transaction_block(
        &self,
        tx_hash: &str,
        block_doc_id: &str,
    ) -> StoreResult<String> {
        let mut builder = MutationBuilder::new();
        builder.update(
            "tx0",
            &self.collections.transaction,
            &[("hash", GqlValue::Str(tx_hash.to_string()))],
            &[("block", GqlValue::Str(block_doc_id.to_string()))],
        );
        let data = self.transport.execute_in_txn(&builder.build()).await?;
        require_doc_id(&data, "tx0")
    }

    /// Fills a log's block and transaction references after the fact. Used
    /// only by the non-batched legacy write path.
    pub async fn update_log_refs(
        &self,
        log_index: i64,
        tx_hash: &str,
        block_doc_id: &str,
        tx_doc_id: &str,
    ) -> StoreResult<String> {
        let mut builder = MutationBuilder::new();
        builder.update(
            "log0",
            &self.collections.log,
            &[
                ("logIndex", GqlValue::Int(log_index)),
                ("transactionHash", GqlValue::Str(tx_hash.to_string())),
            ],
            &[
                ("block", GqlValue::Str(block_doc_id.to_string())),
                ("transaction", GqlValue::Str(tx_doc_id.to_string())),
            ],
        );
        let data = self.transport.execute_in_txn(&builder.build()).await?;
        require_doc_id(&data, "log0")
    }

    /// Reads the highest committed block number.
    ///
    /// Returns [StoreError::DocumentNotFound] when the store holds no
    /// blocks, which the startup resume protocol maps to the configured
    /// start block.
    pub async fn highest_block_number(&self) -> StoreResult<u64> {
        let request = format!(
            "query {{ {}(order: {{number: DESC}}, limit: 1) {{ number }} }}",
            self.collections.block
        );
        let data = self.transport.query(&request).await?;
        let number = data
            .get(&self.collections.block)
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("number"))
            .and_then(Value::as_i64)
            .ok_or(StoreError::DocumentNotFound)?;
        Ok(number as u64)
    }

    /// Commits a block with all of its children.
    ///
    /// Small graphs are committed atomically in one store transaction; a
    /// graph whose document count exceeds the per-transaction ceiling is
    /// sharded: the block first, then transactions, logs, and access-list
    /// entries in batches, each batch its own transaction. Returns the
    /// block's document ID. [StoreError::AlreadyExists] means the block was
    /// committed before and nothing was written.
    pub async fn create_block_batch(&self, payload: &BlockPayload) -> StoreResult<String> {
        let documents = payload.document_count();
        if documents <= self.max_docs_per_txn {
            debug!(
                target: "store",
                number = payload.block.number,
                documents,
                "writing block graph in one transaction"
            );
            self.write_combined(payload).await
        } else {
            debug!(
                target: "store",
                number = payload.block.number,
                documents,
                "block graph exceeds transaction ceiling, sharding"
            );
            self.write_sharded(payload).await
        }
    }

    /// Creates a single document in its own transaction, treating an
    /// `already exists` response that names the document as success.
    async fn create_one(
        &self,
        alias: &str,
        collection: &str,
        fields: &[(&str, GqlValue)],
    ) -> StoreResult<String> {
        let mut builder = MutationBuilder::new();
        builder.create(alias, collection, fields);
        match self.transport.execute_in_txn(&builder.build()).await {
            Ok(data) => require_doc_id(&data, alias),
            Err(StoreError::AlreadyExists { doc_id: Some(id) }) => Ok(id),
            Err(err) => Err(err),
        }
    }

    /// The fast path: the whole graph inside one store transaction, parent
    /// first so children reference it at creation time.
    async fn write_combined(&self, payload: &BlockPayload) -> StoreResult<String> {
        let mut session = self.transport.session().await?;
        match self.write_graph(session.as_mut(), payload).await {
            Ok(block_id) => {
                session.commit().await?;
                Ok(block_id)
            }
            Err(err) => {
                session.discard().await;
                Err(err)
            }
        }
    }

    async fn write_graph(
        &self,
        session: &mut (dyn StoreSession + '_),
        payload: &BlockPayload,
    ) -> StoreResult<String> {
        let mut builder = MutationBuilder::new();
        builder.create("block0", &self.collections.block, &block_fields(&payload.block));
        let data = session.execute(&builder.build()).await?;
        let block_id = require_doc_id(&data, "block0")?;

        let mut tx_ids = HashMap::new();
        if !payload.transactions.is_empty() {
            let mut builder = MutationBuilder::new();
            for (i, tx) in payload.transactions.iter().enumerate() {
                builder.create(
                    &format!("tx{i}"),
                    &self.collections.transaction,
                    &transaction_fields(tx, Some(block_id.as_str())),
                );
            }
            let data = session.execute(&builder.build()).await?;
            collect_tx_ids(&data, &payload.transactions, 0, &mut tx_ids);
        }

        let mut builder = MutationBuilder::new();
        let mut log_alias = 0usize;
        for receipt in &payload.receipts {
            let Some(tx_id) = tx_ids.get(&receipt.transaction_hash) else { continue };
            for log in &receipt.logs {
                builder.create(
                    &format!("log{log_alias}"),
                    &self.collections.log,
                    &log_fields(log, Some(block_id.as_str()), Some(tx_id.as_str())),
                );
                log_alias += 1;
            }
        }
        let mut ale_alias = 0usize;
        for tx in &payload.transactions {
            let Some(tx_id) = tx_ids.get(&tx.hash) else { continue };
            for entry in &tx.access_list {
                builder.create(
                    &format!("ale{ale_alias}"),
                    &self.collections.access_list_entry,
                    &access_list_entry_fields(entry, Some(tx_id.as_str())),
                );
                ale_alias += 1;
            }
        }
        if !builder.is_empty() {
            session.execute(&builder.build()).await?;
        }
        Ok(block_id)
    }

    /// The sharded path for large blocks: block first in its own
    /// transaction, then children in batches. A failed batch is logged and
    /// skipped; children whose parent transaction failed are dropped rather
    /// than left dangling.
    async fn write_sharded(&self, payload: &BlockPayload) -> StoreResult<String> {
        let mut builder = MutationBuilder::new();
        builder.create("block0", &self.collections.block, &block_fields(&payload.block));
        let data = self.transport.execute_in_txn(&builder.build()).await?;
        let block_id = require_doc_id(&data, "block0")?;

        let mut tx_ids = HashMap::new();
        for (chunk_index, chunk) in
            payload.transactions.chunks(CHILD_BATCH_SIZE).enumerate()
        {
            let offset = chunk_index * CHILD_BATCH_SIZE;
            let mut builder = MutationBuilder::new();
            for (i, tx) in chunk.iter().enumerate() {
                builder.create(
                    &format!("tx{}", offset + i),
                    &self.collections.transaction,
                    &transaction_fields(tx, Some(block_id.as_str())),
                );
            }
            match self.transport.execute_in_txn(&builder.build()).await {
                Ok(data) => collect_tx_ids(&data, chunk, offset, &mut tx_ids),
                Err(err) => {
                    warn!(
                        target: "store",
                        number = payload.block.number,
                        chunk = chunk_index,
                        "transaction batch failed, skipping: {err}"
                    );
                }
            }
        }

        let linked_logs: Vec<(&LogDocument, &String)> = payload
            .receipts
            .iter()
            .filter_map(|receipt| {
                tx_ids.get(&receipt.transaction_hash).map(|tx_id| (receipt, tx_id))
            })
            .flat_map(|(receipt, tx_id)| receipt.logs.iter().map(move |log| (log, tx_id)))
            .collect();
        for (chunk_index, chunk) in linked_logs.chunks(CHILD_BATCH_SIZE).enumerate() {
            let offset = chunk_index * CHILD_BATCH_SIZE;
            let mut builder = MutationBuilder::new();
            for (i, (log, tx_id)) in chunk.iter().enumerate() {
                builder.create(
                    &format!("log{}", offset + i),
                    &self.collections.log,
                    &log_fields(log, Some(block_id.as_str()), Some(tx_id.as_str())),
                );
            }
            if let Err(err) = self.transport.execute_in_txn(&builder.build()).await {
                warn!(
                    target: "store",
                    number = payload.block.number,
                    chunk = chunk_index,
                    "log batch failed, skipping: {err}"
                );
            }
        }

        let linked_entries: Vec<(&AccessListEntryDocument, &String)> = payload
            .transactions
            .iter()
            .filter_map(|tx| tx_ids.get(&tx.hash).map(|tx_id| (tx, tx_id)))
            .flat_map(|(tx, tx_id)| tx.access_list.iter().map(move |entry| (entry, tx_id)))
            .collect();
        for (chunk_index, chunk) in linked_entries.chunks(CHILD_BATCH_SIZE).enumerate() {
            let offset = chunk_index * CHILD_BATCH_SIZE;
            let mut builder = MutationBuilder::new();
            for (i, (entry, tx_id)) in chunk.iter().enumerate() {
                builder.create(
                    &format!("ale{}", offset + i),
                    &self.collections.access_list_entry,
                    &access_list_entry_fields(entry, Some(tx_id.as_str())),
                );
            }
            if let Err(err) = self.transport.execute_in_txn(&builder.build()).await {
                warn!(
                    target: "store",
                    number = payload.block.number,
                    chunk = chunk_index,
                    "access-list batch failed, skipping: {err}"
                );
            }
        }

        Ok(block_id)
    }
}

/// Records the document ID of every transaction whose aliased sub-mutation
/// produced one. Aliases missing from the response mean the sub-mutation
/// failed silently; those transactions stay unlinked.
fn collect_tx_ids(
    data: &Value,
    transactions: &[TransactionDocument],
    offset: usize,
    tx_ids: &mut HashMap<String, String>,
) {
    for (i, tx) in transactions.iter().enumerate() {
        if let Some(id) = doc_id_for_alias(data, &format!("tx{}", offset + i)) {
            tx_ids.insert(tx.hash.clone(), id);
        }
    }
}

fn require_doc_id(data: &Value, alias: &str) -> StoreResult<String> {
    doc_id_for_alias(data, alias)
        .ok_or_else(|| StoreError::QueryFailed(format!("response carried no _docID for {alias}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::MemoryStore, EmbeddedTransport};
    use silt_primitives::ReceiptRecord;

    fn adapter(store: &MemoryStore) -> StoreAdapter<EmbeddedTransport<MemoryStore>> {
        StoreAdapter::new(EmbeddedTransport::new(store.clone()))
    }

    fn payload(number: i64, tx_count: usize, logs_per_tx: usize) -> BlockPayload {
        let transactions: Vec<TransactionDocument> = (0..tx_count)
            .map(|i| TransactionDocument {
                hash: format!("0xt{number:x}-{i:x}"),
                block_number: number,
                transaction_index: i as i64,
                ..Default::default()
            })
            .collect();
        let receipts: Vec<ReceiptRecord> = transactions
            .iter()
            .map(|tx| ReceiptRecord {
                transaction_hash: tx.hash.clone(),
                status: true,
                logs: (0..logs_per_tx)
                    .map(|l| LogDocument {
                        transaction_hash: tx.hash.clone(),
                        block_number: number,
                        log_index: l as i64,
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect();
        BlockPayload {
            block: BlockDocument {
                number,
                hash: format!("0xb{number:x}"),
                ..Default::default()
            },
            transactions,
            receipts,
        }
    }

    #[tokio::test]
    async fn test_empty_block_fast_path() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        adapter.create_block_batch(&payload(100, 0, 0)).await.unwrap();
        assert_eq!(store.document_count("Block"), 1);
        assert_eq!(store.committed_transactions(), 1);
    }

    #[tokio::test]
    async fn test_fast_path_links_children() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        let block_id = adapter.create_block_batch(&payload(101, 2, 3)).await.unwrap();

        assert_eq!(store.document_count("Block"), 1);
        assert_eq!(store.document_count("Transaction"), 2);
        assert_eq!(store.document_count("Log"), 6);
        // The whole graph went through a single store transaction.
        assert_eq!(store.committed_transactions(), 1);

        for tx in store.documents("Transaction") {
            assert_eq!(tx.fields.get("block").and_then(|v| v.as_str()), Some(block_id.as_str()));
        }
        for log in store.documents("Log") {
            let tx_id = log.fields.get("transaction").and_then(|v| v.as_str()).unwrap();
            assert!(store.document_by_id("Transaction", tx_id).is_some());
            assert_eq!(
                log.fields.get("block").and_then(|v| v.as_str()),
                Some(block_id.as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_fast_path_is_atomic() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        store.fail_matching(
            "log0: create_Log",
            StoreError::QueryFailed("disk full".to_string()),
        );
        adapter.create_block_batch(&payload(102, 1, 1)).await.unwrap_err();
        assert_eq!(store.document_count("Block"), 0);
        assert_eq!(store.document_count("Transaction"), 0);
        assert_eq!(store.committed_transactions(), 0);
    }

    #[tokio::test]
    async fn test_replay_reports_already_exists_and_writes_nothing() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        let payload = payload(200, 2, 1);
        let doc_id = adapter.create_block_batch(&payload).await.unwrap();

        let err = adapter.create_block_batch(&payload).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists { doc_id: Some(doc_id) });
        assert_eq!(store.document_count("Transaction"), 2);
        assert_eq!(store.document_count("Log"), 2);
    }

    #[tokio::test]
    async fn test_large_block_takes_sharded_path() {
        let store = MemoryStore::new();
        let adapter = adapter(&store).with_max_docs_per_txn(16);
        // 1 + 70 transactions + 70 logs = 141 documents > 16.
        adapter.create_block_batch(&payload(300, 70, 1)).await.unwrap();

        assert_eq!(store.document_count("Block"), 1);
        assert_eq!(store.document_count("Transaction"), 70);
        assert_eq!(store.document_count("Log"), 70);
        // 1 block txn + 2 transaction batches + 2 log batches.
        assert_eq!(store.committed_transactions(), 5);

        for log in store.documents("Log") {
            let tx_id = log.fields.get("transaction").and_then(|v| v.as_str()).unwrap();
            assert!(store.document_by_id("Transaction", tx_id).is_some());
        }
    }

    #[tokio::test]
    async fn test_sharded_path_skips_failed_batch_and_drops_orphans() {
        let store = MemoryStore::new();
        let adapter = adapter(&store).with_max_docs_per_txn(16);
        // Fail the second transaction batch (aliases tx64..tx69).
        store.fail_matching(
            "tx64: create_Transaction",
            StoreError::QueryFailed("batch rejected".to_string()),
        );
        let result = adapter.create_block_batch(&payload(301, 70, 1)).await;

        // The block itself committed, so the write reports success.
        assert!(result.is_ok());
        assert_eq!(store.document_count("Transaction"), 64);
        // Logs of the six failed transactions are dropped, never dangling.
        assert_eq!(store.document_count("Log"), 64);
        for log in store.documents("Log") {
            let tx_id = log.fields.get("transaction").and_then(|v| v.as_str()).unwrap();
            assert!(store.document_by_id("Transaction", tx_id).is_some());
        }
    }

    #[tokio::test]
    async fn test_access_list_entries_written_with_references() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        let mut payload = payload(400, 1, 0);
        payload.transactions[0].tx_type = "1".to_string();
        payload.transactions[0].access_list = vec![AccessListEntryDocument {
            address: "0xdead".to_string(),
            storage_keys: vec!["0x01".to_string()],
        }];
        adapter.create_block_batch(&payload).await.unwrap();

        let entries = store.documents("AccessListEntry");
        assert_eq!(entries.len(), 1);
        let tx_id = entries[0].fields.get("transaction").and_then(|v| v.as_str()).unwrap();
        assert!(store.document_by_id("Transaction", tx_id).is_some());
    }

    #[tokio::test]
    async fn test_highest_block_number() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        assert_eq!(
            adapter.highest_block_number().await.unwrap_err(),
            StoreError::DocumentNotFound
        );
        for number in [500, 498, 499] {
            adapter.create_block_batch(&payload(number, 0, 0)).await.unwrap();
        }
        assert_eq!(adapter.highest_block_number().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_legacy_single_document_path() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        let block = BlockDocument { number: 7, hash: "0xb7".to_string(), ..Default::default() };
        let block_id = adapter.create_block(&block).await.unwrap();
        // Re-creating the same block replays idempotently.
        assert_eq!(adapter.create_block(&block).await.unwrap(), block_id);

        let tx = TransactionDocument { hash: "0xt7".to_string(), ..Default::default() };
        let tx_id = adapter.create_transaction(&tx, &block_id).await.unwrap();
        adapter.update_transaction_block("0xt7", &block_id).await.unwrap();

        let log = LogDocument {
            transaction_hash: "0xt7".to_string(),
            log_index: 0,
            ..Default::default()
        };
        adapter.create_log(&log, &block_id, &tx_id).await.unwrap();
        adapter.update_log_refs(0, "0xt7", &block_id, &tx_id).await.unwrap();

        let logs = store.documents("Log");
        assert_eq!(logs[0].fields.get("transaction").and_then(|v| v.as_str()), Some(tx_id.as_str()));
    }

    #[tokio::test]
    async fn test_block_fields_round_trip_through_the_store() {
        let store = MemoryStore::new();
        let adapter = adapter(&store);
        let block = BlockDocument {
            hash: "0xb1".to_string(),
            number: 19,
            timestamp: "1700000000".to_string(),
            extra_data: "se\\o web3 \"quoted\"".to_string(),
            base_fee_per_gas: String::new(),
            uncles: vec!["0xu1".to_string(), "0xu2".to_string()],
            ..Default::default()
        };
        let payload = BlockPayload { block: block.clone(), ..Default::default() };
        let doc_id = adapter.create_block_batch(&payload).await.unwrap();

        let stored = store.document_by_id("Block", &doc_id).unwrap();
        let text = |name: &str| {
            stored.fields.get(name).and_then(|v| v.as_str()).unwrap().to_string()
        };
        assert_eq!(stored.fields.get("number").and_then(|v| v.as_i64), Some(19));
        assert_eq!(text("hash"), block.hash);
        assert_eq!(text("timestamp"), block.timestamp);
        assert_eq!(text("extraData"), block.extra_data);
        assert_eq!(text("baseFeePerGas"), "");
        assert_eq!(
            stored.fields.get("uncles"),
            Some(&serde_json::json!(["0xu1", "0xu2"]))
        );
    }

    #[tokio::test]
    async fn test_collection_prefixes_respected() {
        let store = MemoryStore::new();
        let adapter = StoreAdapter::new(EmbeddedTransport::new(store.clone()))
            .with_collections(CollectionSet::prefixed("Ethereum__Mainnet"));
        adapter.create_block_batch(&payload(1, 1, 0)).await.unwrap();
        assert_eq!(store.document_count("Ethereum__Mainnet__Block"), 1);
        assert_eq!(store.document_count("Ethereum__Mainnet__Transaction"), 1);
        assert_eq!(adapter.highest_block_number().await.unwrap(), 1);
    }
}
