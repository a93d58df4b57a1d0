//! This module contains all CLI-specific code for the indexer binary.

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use silt_store::DEFAULT_MAX_DOCS_PER_TXN;
use tracing::Level;

/// The indexer binary CLI application arguments.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct SiltCli {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count)]
    pub v: u8,
    /// Address of the Ethereum JSON-RPC endpoint to index from.
    #[clap(long, env = "GETH_RPC_URL")]
    pub node_url: String,
    /// Optional WebSocket endpoint; preferred over HTTP when set.
    #[clap(long, env = "GETH_WS_URL")]
    pub ws_url: Option<String>,
    /// Optional API key sent with every RPC request.
    #[clap(long, env = "GETH_API_KEY")]
    pub api_key: Option<String>,
    /// Address of the document store's HTTP endpoint.
    #[clap(long, default_value = "http://localhost:9181")]
    pub store_url: String,
    /// Block to start from when the store is empty. Ignored otherwise.
    #[clap(long, default_value_t = 0)]
    pub start_block: u64,
    /// Number of concurrent write workers.
    #[clap(long, default_value_t = 4)]
    pub workers: usize,
    /// Number of blocks fetched ahead of the write stage.
    #[clap(long, default_value_t = 16)]
    pub prefetch_window: usize,
    /// Number of receipts of one block fetched concurrently.
    #[clap(long, default_value_t = 8)]
    pub receipt_concurrency: usize,
    /// Ceiling on documents committed in a single store transaction.
    #[clap(long, default_value_t = DEFAULT_MAX_DOCS_PER_TXN)]
    pub max_docs_per_txn: usize,
    /// Optional chain prefix for the collection names, e.g.
    /// "Ethereum__Mainnet".
    #[clap(long)]
    pub collection_prefix: Option<String>,
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
pub fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
