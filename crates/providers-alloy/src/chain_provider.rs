//! Providers that use alloy transports on the backend.

use crate::inc_counter;
use alloy_provider::{Provider, ReqwestProvider, RootProvider, WsConnect};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types::{BlockTransactions, BlockTransactionsKind};
use alloy_transport::Transport;
use alloy_transport_http::Http;
use async_trait::async_trait;
use lru::LruCache;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use silt_primitives::{BlockDocument, ReceiptRecord, TransactionDocument};
use silt_providers::{ChainProvider, ProviderError, ProviderResult};
use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

const CACHE_SIZE: usize = 16;

/// Number of step-back retries applied when the node reports a transient
/// transaction-type error at the tip of the chain.
const TIP_TYPE_RETRIES: usize = 3;

/// The header carrying the optional API key.
const API_KEY_HEADER: &str = "x-api-key";

/// The [AlloyChainProvider] is a concrete implementation of the
/// [ChainProvider] trait, providing data over Ethereum JSON-RPC using an
/// alloy provider as the backend. The transport is generic so the same
/// provider serves HTTP ([ReqwestProvider]) and WebSocket connections.
#[derive(Debug, Clone)]
pub struct AlloyChainProvider<T: Transport + Clone = Http<Client>> {
    /// The inner Ethereum JSON-RPC provider.
    inner: RootProvider<T>,
    /// Recently fetched blocks by number. Re-requests of a block that was
    /// already fetched (tip backoff, failed-write retries) are served from
    /// here without another round trip.
    block_cache: Arc<Mutex<LruCache<u64, (BlockDocument, Vec<TransactionDocument>)>>>,
}

impl<T: Transport + Clone> AlloyChainProvider<T> {
    /// Creates a new [AlloyChainProvider] with the given alloy provider.
    pub fn new(inner: RootProvider<T>) -> Self {
        Self {
            inner,
            block_cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_SIZE).unwrap(),
            ))),
        }
    }

    /// Returns the chain ID.
    pub async fn chain_id(&self) -> ProviderResult<u64> {
        self.inner.get_chain_id().await.map_err(|e| ProviderError::Network(e.to_string()))
    }

    /// Fetches a block with full transactions, without retry handling.
    async fn fetch_block(
        &self,
        number: u64,
    ) -> ProviderResult<(BlockDocument, Vec<TransactionDocument>)> {
        let block = self
            .inner
            .get_block_by_number(number.into(), BlockTransactionsKind::Full)
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?
            .ok_or(ProviderError::BlockNotFound(number))?;

        let transactions = match &block.transactions {
            BlockTransactions::Full(txs) => {
                txs.iter().map(TransactionDocument::from_rpc).collect()
            }
            _ => {
                return Err(ProviderError::Data(
                    "node returned transaction hashes where full transactions were requested"
                        .to_string(),
                ))
            }
        };
        Ok((BlockDocument::from_rpc(&block), transactions))
    }
}

impl AlloyChainProvider {
    /// Creates a new HTTP-backed [AlloyChainProvider] from the provided
    /// [reqwest::Url].
    pub fn new_http(url: reqwest::Url) -> Self {
        Self::new(ReqwestProvider::new_http(url))
    }

    /// Creates a new HTTP-backed [AlloyChainProvider] that sends the given
    /// API key with every request.
    pub fn new_http_with_api_key(url: reqwest::Url, api_key: &str) -> ProviderResult<Self> {
        let mut value = HeaderValue::from_str(api_key)
            .map_err(|e| ProviderError::Data(format!("invalid api key: {e}")))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, value);
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let http = Http::with_client(client, url);
        Ok(Self::new(RootProvider::new(RpcClient::new(http, true))))
    }
}

/// Connects to the given WebSocket endpoint and returns a provider backed by
/// the pubsub transport.
pub async fn connect_ws(
    url: &str,
) -> ProviderResult<AlloyChainProvider<impl Transport + Clone>> {
    let client = ClientBuilder::default()
        .ws(WsConnect::new(url))
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;
    Ok(AlloyChainProvider::new(RootProvider::new(client)))
}

/// Whether the node error is one of the transient transaction-type errors
/// seen at the tip of the chain.
fn is_tip_type_error(message: &str) -> bool {
    message.contains("transaction type not supported")
        || message.contains("invalid transaction type")
}

#[async_trait]
impl<T: Transport + Clone> ChainProvider for AlloyChainProvider<T> {
    async fn latest_block_number(&self) -> ProviderResult<u64> {
        inc_counter!(PROVIDER_CALLS, "latest_block_number");
        self.inner.get_block_number().await.map_err(|e| {
            inc_counter!(PROVIDER_ERRORS, "latest_block_number", "network");
            ProviderError::Network(e.to_string())
        })
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> ProviderResult<(BlockDocument, Vec<TransactionDocument>)> {
        if let Some(cached) = self.block_cache.lock().unwrap().get(&number) {
            return Ok(cached.clone());
        }
        inc_counter!(PROVIDER_CALLS, "block_with_transactions");

        // Some nodes briefly report "transaction type not supported" or
        // "invalid transaction type" for blocks at the very tip. Stepping
        // one block back per attempt masks the inconsistency.
        let mut probe = number;
        let mut attempt = 0;
        let fetched = loop {
            match self.fetch_block(probe).await {
                Err(ProviderError::Network(msg)) | Err(ProviderError::Data(msg))
                    if attempt < TIP_TYPE_RETRIES && is_tip_type_error(&msg) =>
                {
                    attempt += 1;
                    probe = probe.saturating_sub(1);
                    warn!(
                        target: "alloy_provider",
                        number,
                        probe,
                        attempt,
                        "transient transaction type error at tip, stepping back"
                    );
                }
                Err(err) => {
                    inc_counter!(PROVIDER_ERRORS, "block_with_transactions", "fetch");
                    return Err(err);
                }
                Ok(fetched) => break fetched,
            }
        };

        debug!(
            target: "alloy_provider",
            number = fetched.0.number,
            transactions = fetched.1.len(),
            "fetched block"
        );
        self.block_cache.lock().unwrap().put(number, fetched.clone());
        Ok(fetched)
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> ProviderResult<ReceiptRecord> {
        inc_counter!(PROVIDER_CALLS, "transaction_receipt");
        let hash = tx_hash
            .parse()
            .map_err(|e| ProviderError::Data(format!("invalid transaction hash {tx_hash}: {e}")))?;
        let receipt = self
            .inner
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| {
                inc_counter!(PROVIDER_ERRORS, "transaction_receipt", "network");
                ProviderError::Network(e.to_string())
            })?
            .ok_or_else(|| ProviderError::ReceiptNotFound(tx_hash.to_string()))?;
        Ok(ReceiptRecord::from_rpc(&receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_provider() -> AlloyChainProvider {
        AlloyChainProvider::new_http("http://localhost:8545".parse().unwrap())
    }

    #[test]
    fn test_tip_type_error_classifier() {
        assert!(is_tip_type_error("transaction type not supported"));
        assert!(is_tip_type_error("rpc: invalid transaction type detected"));
        assert!(!is_tip_type_error("block not found"));
    }

    #[tokio::test]
    async fn test_block_cache_serves_repeat_requests() {
        let provider = offline_provider();
        let block = BlockDocument { number: 42, hash: "0xbeef".to_string(), ..Default::default() };
        provider.block_cache.lock().unwrap().put(42, (block.clone(), vec![]));

        // Served from cache; no endpoint is listening on the URL above.
        let (cached, txs) = provider.block_with_transactions(42).await.unwrap();
        assert_eq!(cached, block);
        assert!(txs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_receipt_hash_is_data_error() {
        let provider = offline_provider();
        let err = provider.transaction_receipt("nonsense").await.unwrap_err();
        assert!(matches!(err, ProviderError::Data(_)));
    }
}
