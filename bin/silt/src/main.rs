//! The indexer binary: wires the RPC provider, the store adapter, and the
//! ingestion pipeline together and runs until interrupted.

#![warn(missing_debug_implementations, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::Parser;
use silt_driver::{
    resolve_start_block, Prefetcher, ProcessError, Processor, ProcessorConfig,
};
use silt_providers::ChainProvider;
use silt_providers_alloy::AlloyChainProvider;
use silt_store::{CollectionSet, HttpTransport, StoreAdapter};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::info;

mod cli;
use cli::{init_tracing_subscriber, SiltCli};

/// How often and how long to probe the store before giving up at startup.
const READY_ATTEMPTS: usize = 30;
const READY_DELAY: Duration = Duration::from_secs(1);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cfg = SiltCli::parse();
    init_tracing_subscriber(cfg.v)?;

    if let Some(ws_url) = cfg.ws_url.clone() {
        info!(target: "silt", url = %ws_url, "connecting to node over websocket");
        let provider = silt_providers_alloy::connect_ws(&ws_url).await?;
        run(cfg, provider).await
    } else {
        info!(target: "silt", url = %cfg.node_url, "connecting to node over http");
        let url = cfg.node_url.parse().context("invalid node url")?;
        let provider = match cfg.api_key.as_deref() {
            Some(api_key) => AlloyChainProvider::new_http_with_api_key(url, api_key)?,
            None => AlloyChainProvider::new_http(url),
        };
        run(cfg, provider).await
    }
}

async fn run<P: ChainProvider + 'static>(cfg: SiltCli, provider: P) -> Result<()> {
    let transport = HttpTransport::new(&cfg.store_url)?;
    transport
        .wait_ready(READY_ATTEMPTS, READY_DELAY)
        .await
        .context("document store did not become ready")?;

    let collections = cfg
        .collection_prefix
        .as_deref()
        .map(CollectionSet::prefixed)
        .unwrap_or_default();
    let store = Arc::new(
        StoreAdapter::new(transport)
            .with_collections(collections)
            .with_max_docs_per_txn(cfg.max_docs_per_txn),
    );

    let start_block = resolve_start_block(&store, cfg.start_block).await?;
    let prefetcher = Prefetcher::new(Arc::new(provider), cfg.receipt_concurrency);
    let processor = Processor::new(
        prefetcher,
        store,
        ProcessorConfig { workers: cfg.workers, prefetch_window: cfg.prefetch_window },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(target: "silt", "interrupt received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let result = processor
        .run(start_block, shutdown_rx, |number| {
            if number % 1000 == 0 {
                info!(target: "silt", number, "progress watermark");
            }
        })
        .await;
    match result {
        Ok(()) | Err(ProcessError::Cancelled) => {
            info!(target: "silt", "exiting indexer");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
