//! This module contains the error types returned by the store adapter.

use thiserror::Error;

/// A result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// An error returned by the store adapter or its transports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The document is already present. Not a failure at the batched level;
    /// carries the existing document ID when the store reported one.
    #[error("already exists")]
    AlreadyExists {
        /// The document ID embedded in the store's error message, if any.
        doc_id: Option<String>,
    },
    /// The store detected a conflicting concurrent transaction.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    /// The queried document does not exist.
    #[error("document not found")]
    DocumentNotFound,
    /// The store rejected or failed to execute the request.
    #[error("query failed: {0}")]
    QueryFailed(String),
    /// The transport to the store failed.
    #[error("store transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Classifies a raw store error message.
    ///
    /// The embedded store reports failures as strings; the pipeline's
    /// behavior is keyed off well-known fragments of those messages.
    pub fn from_store_message(message: &str) -> Self {
        if message.contains("already exists") {
            Self::AlreadyExists { doc_id: crate::response::parse_doc_id(message) }
        } else if message.contains("transaction conflict") {
            Self::Conflict(message.to_string())
        } else {
            Self::QueryFailed(message.to_string())
        }
    }

    /// Whether the error marks a document that is already present.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether the error is a retryable optimistic-concurrency conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_already_exists_with_doc_id() {
        let err = StoreError::from_store_message(
            "a document with the given ID already exists (DocID: bae-1f2a)",
        );
        assert_eq!(err, StoreError::AlreadyExists { doc_id: Some("bae-1f2a".to_string()) });
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_classify_already_exists_without_doc_id() {
        let err = StoreError::from_store_message("document already exists");
        assert_eq!(err, StoreError::AlreadyExists { doc_id: None });
    }

    #[test]
    fn test_classify_conflict() {
        let err = StoreError::from_store_message("transaction conflict. Please retry");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_classify_other_as_query_failed() {
        let err = StoreError::from_store_message("unknown field \"bogus\"");
        assert!(matches!(err, StoreError::QueryFailed(_)));
    }

    #[test]
    fn test_display_contains_sentinel_fragments() {
        assert!(StoreError::AlreadyExists { doc_id: None }
            .to_string()
            .contains("already exists"));
        assert!(StoreError::Conflict("c".to_string())
            .to_string()
            .contains("transaction conflict"));
    }
}
