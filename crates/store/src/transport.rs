//! Transports that carry GraphQL requests to the document store.
//!
//! Two modes exist: an adapter over an in-process store handle (explicit
//! transactions, required by the batched write paths) and a remote HTTP
//! endpoint (each request is its own server-side transaction).

use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call timeout applied in remote HTTP mode.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the store's GraphQL endpoint.
const GRAPHQL_PATH: &str = "/api/v0/graphql";

/// An open store transaction. Requests executed on the same session are
/// committed or discarded together, provided the transport supports
/// multi-request transactions.
#[async_trait]
pub trait StoreSession: Send {
    /// Executes a GraphQL request on this transaction and returns the
    /// response `data` map.
    async fn execute(&mut self, request: &str) -> StoreResult<Value>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards the transaction.
    async fn discard(self: Box<Self>);
}

/// A connection to the document store.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Opens a store transaction.
    async fn session(&self) -> StoreResult<Box<dyn StoreSession + '_>>;

    /// Executes a read-only GraphQL query.
    async fn query(&self, request: &str) -> StoreResult<Value>;

    /// Executes a single request inside its own transaction.
    async fn execute_in_txn(&self, request: &str) -> StoreResult<Value> {
        let mut session = self.session().await?;
        match session.execute(request).await {
            Ok(data) => {
                session.commit().await?;
                Ok(data)
            }
            Err(err) => {
                session.discard().await;
                Err(err)
            }
        }
    }
}

/// The in-process store handle the embedded mode drives: explicit
/// transactions with execute-on-transaction semantics, plus a transaction-less
/// query path.
#[async_trait]
pub trait EmbeddedStore: Send + Sync {
    /// The store's transaction handle.
    type Txn: Send;

    /// Opens a transaction.
    async fn begin(&self) -> StoreResult<Self::Txn>;

    /// Executes a GraphQL request on the given transaction.
    async fn execute(&self, txn: &mut Self::Txn, request: &str) -> StoreResult<Value>;

    /// Commits the transaction.
    async fn commit(&self, txn: Self::Txn) -> StoreResult<()>;

    /// Discards the transaction.
    async fn discard(&self, txn: Self::Txn);

    /// Executes a read-only query outside any transaction.
    async fn query(&self, request: &str) -> StoreResult<Value>;
}

/// A [StoreTransport] over an in-process [EmbeddedStore].
#[derive(Debug, Clone)]
pub struct EmbeddedTransport<S> {
    store: S,
}

impl<S: EmbeddedStore> EmbeddedTransport<S> {
    /// Wraps an embedded store handle.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

struct EmbeddedSession<'a, S: EmbeddedStore> {
    store: &'a S,
    txn: S::Txn,
}

#[async_trait]
impl<S: EmbeddedStore> StoreSession for EmbeddedSession<'_, S> {
    async fn execute(&mut self, request: &str) -> StoreResult<Value> {
        self.store.execute(&mut self.txn, request).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.store.commit(this.txn).await
    }

    async fn discard(self: Box<Self>) {
        let this = *self;
        this.store.discard(this.txn).await;
    }
}

#[async_trait]
impl<S: EmbeddedStore> StoreTransport for EmbeddedTransport<S> {
    async fn session(&self) -> StoreResult<Box<dyn StoreSession + '_>> {
        let txn = self.store.begin().await?;
        Ok(Box::new(EmbeddedSession { store: &self.store, txn }))
    }

    async fn query(&self, request: &str) -> StoreResult<Value> {
        self.store.query(request).await
    }
}

/// A [StoreTransport] over the store's remote HTTP endpoint.
///
/// Remote mode cannot span several requests with one transaction: each
/// request executes in its own server-side transaction, so only the
/// single-request operations are fully transactional here.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl HttpTransport {
    /// Creates a transport against the store at `base_url`.
    pub fn new(base_url: &str) -> StoreResult<Self> {
        let base: reqwest::Url = base_url
            .parse()
            .map_err(|e| StoreError::Transport(format!("invalid store url {base_url}: {e}")))?;
        let endpoint = base
            .join(GRAPHQL_PATH)
            .map_err(|e| StoreError::Transport(format!("invalid store url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    /// Polls the store until it answers a trivial query, waiting `delay`
    /// between at most `attempts` probes.
    pub async fn wait_ready(&self, attempts: usize, delay: Duration) -> StoreResult<()> {
        for attempt in 1..=attempts {
            match self.post("query { __typename }").await {
                Ok(_) => {
                    debug!(target: "store", attempt, "store is ready");
                    return Ok(());
                }
                Err(err) => {
                    warn!(target: "store", attempt, "store not ready: {err}");
                }
            }
            tokio::time::sleep(delay).await;
        }
        Err(StoreError::Transport(format!("store not ready after {attempts} attempts")))
    }

    async fn post(&self, request: &str) -> StoreResult<Value> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "query": request }))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!("store returned HTTP {status}")));
        }
        let body: GraphQlResponse =
            response.json().await.map_err(|e| StoreError::Transport(e.to_string()))?;
        into_data(body)
    }
}

struct HttpSession<'a> {
    transport: &'a HttpTransport,
}

#[async_trait]
impl StoreSession for HttpSession<'_> {
    async fn execute(&mut self, request: &str) -> StoreResult<Value> {
        self.transport.post(request).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }

    async fn discard(self: Box<Self>) {}
}

#[async_trait]
impl StoreTransport for HttpTransport {
    async fn session(&self) -> StoreResult<Box<dyn StoreSession + '_>> {
        Ok(Box::new(HttpSession { transport: self }))
    }

    async fn query(&self, request: &str) -> StoreResult<Value> {
        self.post(request).await
    }
}

fn into_data(body: GraphQlResponse) -> StoreResult<Value> {
    if let Some(errors) = body.errors {
        if let Some(first) = errors.first() {
            return Err(StoreError::from_store_message(&first.message));
        }
    }
    body.data.ok_or_else(|| StoreError::QueryFailed("response carried no data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_data_classifies_store_errors() {
        let body = GraphQlResponse {
            data: None,
            errors: Some(vec![GraphQlError {
                message: "a document with the given ID already exists (DocID: bae-7)".to_string(),
            }]),
        };
        let err = into_data(body).unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists { doc_id: Some("bae-7".to_string()) });
    }

    #[test]
    fn test_into_data_returns_data() {
        let body = GraphQlResponse { data: Some(json!({"a": 1})), errors: None };
        assert_eq!(into_data(body).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_into_data_without_data_or_errors() {
        let body = GraphQlResponse { data: None, errors: None };
        assert!(matches!(into_data(body).unwrap_err(), StoreError::QueryFailed(_)));
    }

    #[test]
    fn test_http_transport_endpoint() {
        let transport = HttpTransport::new("http://localhost:9181").unwrap();
        assert_eq!(transport.endpoint.as_str(), "http://localhost:9181/api/v0/graphql");
    }
}
