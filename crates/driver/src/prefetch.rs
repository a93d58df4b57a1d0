//! The windowed block prefetcher.

use futures::{stream, StreamExt, TryStreamExt};
use silt_primitives::{BlockPayload, ReceiptRecord};
use silt_providers::{ChainProvider, ProviderError};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;
use tracing::trace;

/// A completed prefetch: the block number and either the assembled payload
/// or the error the fetch ran into. Errors travel to the processor, which
/// decides whether to re-request the block.
#[derive(Debug)]
pub struct PrefetchedBlock {
    /// The requested block number.
    pub number: u64,
    /// The fetched payload, or the fetch error.
    pub payload: Result<BlockPayload, ProviderError>,
}

/// Prefetches blocks and their receipts concurrently while delivering them
/// downstream in strict block-number order.
///
/// Fetch tasks complete in arbitrary order into an internal buffer;
/// [Prefetcher::next_prefetched] only releases the lowest outstanding
/// number and then advances. The in-flight window is bounded by how the
/// caller paces [Prefetcher::request_block] against consumption.
#[derive(Debug)]
pub struct Prefetcher<P> {
    provider: Arc<P>,
    receipt_concurrency: usize,
    state: Arc<State>,
    next_to_emit: u64,
}

#[derive(Debug, Default)]
struct State {
    completed: Mutex<HashMap<u64, PrefetchedBlock>>,
    notify: Notify,
}

impl<P: ChainProvider + 'static> Prefetcher<P> {
    /// Creates a prefetcher fetching up to `receipt_concurrency` receipts of
    /// one block concurrently.
    pub fn new(provider: Arc<P>, receipt_concurrency: usize) -> Self {
        Self {
            provider,
            receipt_concurrency: receipt_concurrency.max(1),
            state: Arc::new(State::default()),
            next_to_emit: 0,
        }
    }

    /// Starts fetch tasks for the window `[start, start + window)` and arms
    /// delivery to begin at `start`.
    pub fn seed(&mut self, start: u64, window: usize) {
        self.next_to_emit = start;
        for number in start..start + window as u64 {
            self.request_block(number);
        }
    }

    /// Enqueues a fetch task for the given block. Re-requesting a number
    /// that was already delivered (a failed fetch the processor wants to
    /// retry) rewinds delivery to that number; blocks buffered past it are
    /// kept and re-emitted in order afterwards.
    pub fn request_block(&mut self, number: u64) {
        if number < self.next_to_emit {
            self.next_to_emit = number;
        }
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let receipt_concurrency = self.receipt_concurrency;
        tokio::spawn(async move {
            let payload = fetch_payload(&*provider, receipt_concurrency, number).await;
            trace!(target: "prefetch", number, ok = payload.is_ok(), "prefetch completed");
            state
                .completed
                .lock()
                .unwrap()
                .insert(number, PrefetchedBlock { number, payload });
            state.notify.notify_one();
        });
    }

    /// Waits for the next block in number order and returns it, advancing
    /// the delivery counter.
    pub async fn next_prefetched(&mut self) -> PrefetchedBlock {
        loop {
            let notified = self.state.notify.notified();
            if let Some(block) = self.state.completed.lock().unwrap().remove(&self.next_to_emit)
            {
                self.next_to_emit += 1;
                return block;
            }
            notified.await;
        }
    }
}

/// Fetches a block with its transactions, then every receipt with bounded
/// parallelism, preserving transaction order.
async fn fetch_payload<P: ChainProvider>(
    provider: &P,
    receipt_concurrency: usize,
    number: u64,
) -> Result<BlockPayload, ProviderError> {
    let (block, transactions) = provider.block_with_transactions(number).await?;
    let receipts = stream::iter(transactions.iter().map(|tx| tx.hash.clone()))
        .map(|hash| fetch_receipt(provider, hash))
        .buffered(receipt_concurrency)
        .try_collect()
        .await?;
    let mut payload = BlockPayload { block, transactions, receipts };
    payload.merge_receipts();
    Ok(payload)
}

async fn fetch_receipt<P: ChainProvider>(
    provider: &P,
    hash: String,
) -> Result<ReceiptRecord, ProviderError> {
    provider.transaction_receipt(&hash).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_primitives::{BlockDocument, ReceiptRecord, TransactionDocument};
    use silt_providers::TestChainProvider;
    use std::time::Duration;

    fn payload(number: i64, tx_count: usize) -> BlockPayload {
        let transactions: Vec<TransactionDocument> = (0..tx_count)
            .map(|i| TransactionDocument {
                hash: format!("0xt{number:x}-{i:x}"),
                block_number: number,
                ..Default::default()
            })
            .collect();
        let receipts = transactions
            .iter()
            .map(|tx| ReceiptRecord {
                transaction_hash: tx.hash.clone(),
                cumulative_gas_used: "21000".to_string(),
                status: true,
                ..Default::default()
            })
            .collect();
        BlockPayload {
            block: BlockDocument { number, hash: format!("0xb{number:x}"), ..Default::default() },
            transactions,
            receipts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_despite_out_of_order_completion() {
        let provider = TestChainProvider::new();
        for number in 10..14 {
            provider.insert_payload(payload(number, 1));
        }
        // Earlier blocks finish last.
        provider.set_delay(10, Duration::from_millis(400));
        provider.set_delay(11, Duration::from_millis(300));
        provider.set_delay(12, Duration::from_millis(200));

        let mut prefetcher = Prefetcher::new(Arc::new(provider), 4);
        prefetcher.seed(10, 4);
        for expected in 10..14 {
            let block = prefetcher.next_prefetched().await;
            assert_eq!(block.number, expected);
            assert!(block.payload.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipts_merged_into_transactions() {
        let provider = TestChainProvider::new();
        provider.insert_payload(payload(5, 3));
        let mut prefetcher = Prefetcher::new(Arc::new(provider), 2);
        prefetcher.seed(5, 1);

        let block = prefetcher.next_prefetched().await;
        let fetched = block.payload.unwrap();
        assert_eq!(fetched.receipts.len(), 3);
        for tx in &fetched.transactions {
            assert!(tx.status);
            assert_eq!(tx.cumulative_gas_used, "21000");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_delivered_in_slot_order() {
        let provider = TestChainProvider::new();
        provider.insert_payload(payload(20, 0));
        provider.insert_payload(payload(22, 0));
        // Block 21 is missing entirely.

        let mut prefetcher = Prefetcher::new(Arc::new(provider), 4);
        prefetcher.seed(20, 3);
        assert!(prefetcher.next_prefetched().await.payload.is_ok());
        let failed = prefetcher.next_prefetched().await;
        assert_eq!(failed.number, 21);
        assert_eq!(failed.payload.unwrap_err(), ProviderError::BlockNotFound(21));
        assert!(prefetcher.next_prefetched().await.payload.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerequest_after_failure() {
        let provider = TestChainProvider::new();
        provider.insert_payload(payload(30, 0));
        provider.push_error(30, ProviderError::Network("connection reset".to_string()));

        let mut prefetcher = Prefetcher::new(Arc::new(provider.clone()), 4);
        prefetcher.seed(30, 1);
        let failed = prefetcher.next_prefetched().await;
        assert!(failed.payload.is_err());

        // The processor re-requests the same slot after a failure; delivery
        // rewinds to it.
        prefetcher.request_block(30);
        let block = prefetcher.next_prefetched().await;
        assert_eq!(block.number, 30);
        assert!(block.payload.is_ok());
        assert_eq!(provider.block_requests(), vec![30, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_failure_fails_the_block() {
        let provider = TestChainProvider::new();
        let mut seeded = payload(40, 2);
        seeded.receipts.pop();
        let missing = seeded.transactions[1].hash.clone();
        provider.insert_payload(seeded);

        let mut prefetcher = Prefetcher::new(Arc::new(provider), 4);
        prefetcher.seed(40, 1);
        let block = prefetcher.next_prefetched().await;
        assert_eq!(block.payload.unwrap_err(), ProviderError::ReceiptNotFound(missing));
    }
}
