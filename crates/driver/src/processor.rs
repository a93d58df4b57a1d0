//! The concurrent block processor: a feeder draining the prefetcher, a
//! worker pool persisting block graphs, and a commit-order reducer that
//! emits progress in strict block-number order.

use crate::{inc_indexed, prefetch::Prefetcher, ProcessError, ProcessResult};
use silt_primitives::BlockPayload;
use silt_providers::ChainProvider;
use silt_store::{StoreAdapter, StoreTransport};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Sentinel document ID reported for blocks that were already present.
pub const EXISTING_DOC_ID: &str = "existing";

/// Pause before re-requesting a block the node has not produced yet.
const TIP_BACKOFF: Duration = Duration::from_secs(3);

/// Maximum store-conflict retries per block.
const CONFLICT_RETRIES: u32 = 3;

/// Base of the linear conflict backoff: 50ms, 100ms, 150ms.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// Tuning knobs for the processor.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Number of concurrent write workers.
    pub workers: usize,
    /// Size of the prefetch window.
    pub prefetch_window: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { workers: 4, prefetch_window: 16 }
    }
}

/// The outcome of one block's write attempt, keyed by block number for the
/// reducer.
#[derive(Debug, Clone)]
pub struct BlockResult {
    /// The block number.
    pub number: u64,
    /// The block's document ID; [EXISTING_DOC_ID] when the block was
    /// already present.
    pub doc_id: String,
    /// Whether the block counts as committed.
    pub success: bool,
    /// Whether the block was already present before this attempt.
    pub already_existed: bool,
    /// The write error, for failed blocks.
    pub error: Option<String>,
}

impl BlockResult {
    fn created(number: u64, doc_id: String) -> Self {
        Self { number, doc_id, success: true, already_existed: false, error: None }
    }

    fn existing(number: u64) -> Self {
        Self {
            number,
            doc_id: EXISTING_DOC_ID.to_string(),
            success: true,
            already_existed: true,
            error: None,
        }
    }

    fn failed(number: u64, error: String) -> Self {
        Self { number, doc_id: String::new(), success: false, already_existed: false, error: Some(error) }
    }
}

/// Drives the ingestion pipeline: prefetched blocks are persisted by a
/// worker pool and reported downstream in strict block-number order.
#[derive(Debug)]
pub struct Processor<P, T> {
    prefetcher: Prefetcher<P>,
    store: Arc<StoreAdapter<T>>,
    config: ProcessorConfig,
}

impl<P, T> Processor<P, T>
where
    P: ChainProvider + 'static,
    T: StoreTransport + 'static,
{
    /// Creates a new [Processor].
    pub fn new(
        prefetcher: Prefetcher<P>,
        store: Arc<StoreAdapter<T>>,
        config: ProcessorConfig,
    ) -> Self {
        Self { prefetcher, store, config }
    }

    /// Processes blocks starting at `start_block` until the shutdown signal
    /// fires.
    ///
    /// `on_progress` is invoked exactly once per committed block, in the
    /// sequence `start_block, start_block + 1, ...` with no gaps. Failed
    /// blocks advance the watermark without a progress call. On shutdown
    /// the feeder stops, the workers drain, the reducer flushes, and
    /// [ProcessError::Cancelled] is returned.
    pub async fn run<F>(
        mut self,
        start_block: u64,
        mut shutdown: watch::Receiver<bool>,
        on_progress: F,
    ) -> ProcessResult<()>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let workers = self.config.workers.max(1);
        let window = self.config.prefetch_window.max(1);
        info!(
            target: "processor",
            start_block,
            workers,
            window,
            "starting ingestion pipeline"
        );

        let (work_tx, work_rx) = mpsc::channel::<BlockPayload>(workers);
        let (result_tx, result_rx) = mpsc::channel::<BlockResult>(2 * workers);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let reducer = tokio::spawn(reduce_results(result_rx, start_block, on_progress));

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let store = Arc::clone(&self.store);
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let payload = { work_rx.lock().await.recv().await };
                    let Some(payload) = payload else { break };
                    let result = write_block(&store, payload).await;
                    debug!(
                        target: "writer",
                        worker = worker_id,
                        number = result.number,
                        success = result.success,
                        "processed block"
                    );
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }));
        }

        self.prefetcher.seed(start_block, window);
        let mut next_to_request = start_block + window as u64;
        let outcome = loop {
            let prefetched = tokio::select! {
                _ = shutdown.changed() => break ProcessError::Cancelled,
                prefetched = self.prefetcher.next_prefetched() => prefetched,
            };
            match prefetched.payload {
                Ok(payload) => {
                    if work_tx.send(payload).await.is_err() {
                        break ProcessError::ChannelClosed("worker pool is gone".to_string());
                    }
                    self.prefetcher.request_block(next_to_request);
                    next_to_request += 1;
                }
                Err(err) if err.is_not_found() => {
                    // Tip of the chain: the block has not been produced
                    // yet. Pause and ask again for the same number.
                    debug!(
                        target: "processor",
                        number = prefetched.number,
                        "block not available yet, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break ProcessError::Cancelled,
                        _ = tokio::time::sleep(TIP_BACKOFF) => {}
                    }
                    self.prefetcher.request_block(prefetched.number);
                }
                Err(err) => {
                    warn!(
                        target: "processor",
                        number = prefetched.number,
                        "prefetch failed: {err}"
                    );
                    let failed = BlockResult::failed(prefetched.number, err.to_string());
                    if result_tx.send(failed).await.is_err() {
                        break ProcessError::ChannelClosed("reducer is gone".to_string());
                    }
                    self.prefetcher.request_block(next_to_request);
                    next_to_request += 1;
                }
            }
        };

        // Drain in dependency order: close the work channel, let the
        // workers finish, then let the reducer flush the tail.
        drop(work_tx);
        drop(result_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = reducer.await;
        info!(target: "processor", "pipeline stopped: {outcome}");
        Err(outcome)
    }
}

/// Persists one block graph, absorbing `already exists` as success and
/// retrying transaction conflicts with linear backoff.
async fn write_block<T: StoreTransport>(
    store: &StoreAdapter<T>,
    payload: BlockPayload,
) -> BlockResult {
    let number = payload.block.number as u64;
    let mut attempt = 0u32;
    loop {
        match store.create_block_batch(&payload).await {
            Ok(doc_id) => break BlockResult::created(number, doc_id),
            Err(err) if err.is_already_exists() => break BlockResult::existing(number),
            Err(err) if err.is_conflict() && attempt < CONFLICT_RETRIES => {
                attempt += 1;
                let backoff = CONFLICT_BACKOFF * attempt;
                warn!(
                    target: "writer",
                    number,
                    attempt,
                    "transaction conflict, retrying in {backoff:?}"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => break BlockResult::failed(number, err.to_string()),
        }
    }
}

/// Applies worker results in strict block-number order. Results arriving
/// out of order are parked until the watermark reaches them.
async fn reduce_results<F>(
    mut results: mpsc::Receiver<BlockResult>,
    start_block: u64,
    mut on_progress: F,
) -> u64
where
    F: FnMut(u64) + Send + 'static,
{
    let mut pending: HashMap<u64, BlockResult> = HashMap::new();
    let mut next_to_commit = start_block;
    while let Some(result) = results.recv().await {
        pending.insert(result.number, result);
        while let Some(result) = pending.remove(&next_to_commit) {
            if result.success {
                if result.already_existed {
                    info!(
                        target: "reducer",
                        number = result.number,
                        "block already indexed, skipping"
                    );
                    inc_indexed!(SKIPPED_BLOCKS);
                } else {
                    info!(
                        target: "reducer",
                        number = result.number,
                        doc_id = %result.doc_id,
                        "indexed block"
                    );
                    inc_indexed!(INDEXED_BLOCKS);
                }
                on_progress(result.number);
            } else {
                warn!(
                    target: "reducer",
                    number = result.number,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "block failed, advancing past it"
                );
                inc_indexed!(FAILED_BLOCKS);
            }
            next_to_commit += 1;
        }
    }
    next_to_commit
}
