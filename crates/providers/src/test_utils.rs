//! Test utilities for the chain provider traits.

use crate::{ChainProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use silt_primitives::{BlockDocument, BlockPayload, ReceiptRecord, TransactionDocument};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

/// A mock chain provider for testing.
///
/// Blocks are seeded as [BlockPayload]s; receipts are served from the
/// payload's receipt list by transaction hash. Errors can be scripted
/// per block number and are consumed one per call, so a block can fail a
/// fixed number of times before succeeding. Optional per-block delays let
/// tests force out-of-order fetch completion.
#[derive(Debug, Clone, Default)]
pub struct TestChainProvider {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    latest: u64,
    payloads: HashMap<u64, BlockPayload>,
    receipts: HashMap<String, ReceiptRecord>,
    scripted_errors: HashMap<u64, VecDeque<ProviderError>>,
    delays: HashMap<u64, Duration>,
    block_requests: Vec<u64>,
}

impl TestChainProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a block payload; its receipts become fetchable by hash and the
    /// latest block number advances to cover it.
    pub fn insert_payload(&self, payload: BlockPayload) {
        let mut inner = self.inner.lock().unwrap();
        let number = payload.block.number as u64;
        inner.latest = inner.latest.max(number);
        for receipt in &payload.receipts {
            inner.receipts.insert(receipt.transaction_hash.clone(), receipt.clone());
        }
        inner.payloads.insert(number, payload);
    }

    /// Scripts an error for the next fetch of the given block. Repeated
    /// calls queue further errors, consumed one per fetch attempt.
    pub fn push_error(&self, number: u64, error: ProviderError) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted_errors.entry(number).or_default().push_back(error);
    }

    /// Delays every fetch of the given block by `delay`.
    pub fn set_delay(&self, number: u64, delay: Duration) {
        self.inner.lock().unwrap().delays.insert(number, delay);
    }

    /// Overrides the reported latest block number.
    pub fn set_latest(&self, number: u64) {
        self.inner.lock().unwrap().latest = number;
    }

    /// Returns every block number requested so far, in call order.
    pub fn block_requests(&self) -> Vec<u64> {
        self.inner.lock().unwrap().block_requests.clone()
    }
}

#[async_trait]
impl ChainProvider for TestChainProvider {
    async fn latest_block_number(&self) -> ProviderResult<u64> {
        Ok(self.inner.lock().unwrap().latest)
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> ProviderResult<(BlockDocument, Vec<TransactionDocument>)> {
        let (delay, scripted) = {
            let mut inner = self.inner.lock().unwrap();
            inner.block_requests.push(number);
            let scripted =
                inner.scripted_errors.get_mut(&number).and_then(|queue| queue.pop_front());
            (inner.delays.get(&number).copied(), scripted)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = scripted {
            return Err(error);
        }
        let inner = self.inner.lock().unwrap();
        inner
            .payloads
            .get(&number)
            .map(|payload| (payload.block.clone(), payload.transactions.clone()))
            .ok_or(ProviderError::BlockNotFound(number))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> ProviderResult<ReceiptRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| ProviderError::ReceiptNotFound(tx_hash.to_string()))
    }
}
