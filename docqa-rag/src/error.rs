//! Error types for the `docqa-rag` crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in retrieval, indexing, and answering.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RagError {
    /// Chunking or pipeline parameters are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A malformed request reached a boundary operation (empty question, `k == 0`).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A transient failure of the embedding provider.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingService {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider refused the request because a quota or rate limit was hit.
    #[error("Embedding quota exceeded ({provider}): {message}")]
    EmbeddingQuotaExceeded {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store could not be reached or failed the operation.
    #[error("Vector store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length does not match the collection's dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the collection (or embedder).
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// The assembled prompt exceeds the generation model's input limit.
    #[error("Context too large: prompt is {size} characters, limit is {limit}")]
    ContextTooLarge {
        /// Size of the assembled prompt in characters.
        size: usize,
        /// Configured limit in characters.
        limit: usize,
    },

    /// A transient failure of the generation provider.
    #[error("Generation service error ({provider}): {message}")]
    GenerationService {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A query arrived before the index was built.
    #[error("Index not ready: {0}")]
    IndexNotReady(String),
}

impl RagError {
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingService { provider: provider.into(), message: message.into() }
    }

    pub fn store(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { backend: backend.into(), message: message.into() }
    }

    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationService { provider: provider.into(), message: message.into() }
    }

    /// Whether the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingService { .. } | Self::StoreUnavailable { .. } | Self::GenerationService { .. }
        )
    }

    /// The stable classification used in boundary payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::EmbeddingService { .. } => ErrorKind::EmbeddingServiceError,
            Self::EmbeddingQuotaExceeded { .. } => ErrorKind::EmbeddingQuotaExceeded,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::ContextTooLarge { .. } => ErrorKind::ContextTooLarge,
            Self::GenerationService { .. } => ErrorKind::GenerationServiceError,
            Self::IndexNotReady(_) => ErrorKind::IndexNotReady,
        }
    }
}

/// Error classes as reported across the query and indexing boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    InvalidRequest,
    EmbeddingServiceError,
    EmbeddingQuotaExceeded,
    StoreUnavailable,
    DimensionMismatch,
    ContextTooLarge,
    GenerationServiceError,
    IndexNotReady,
}

impl ErrorKind {
    /// Whether a caller may simply try the same request again later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::EmbeddingServiceError
                | Self::StoreUnavailable
                | Self::GenerationServiceError
                | Self::IndexNotReady
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_failures_are_transient() {
        assert!(RagError::embedding("stub", "503").is_transient());
        assert!(RagError::store("memory", "down").is_transient());
        assert!(RagError::generation("stub", "timeout").is_transient());

        assert!(!RagError::InvalidConfig("overlap".into()).is_transient());
        assert!(
            !RagError::EmbeddingQuotaExceeded { provider: "stub".into(), message: "429".into() }
                .is_transient()
        );
        assert!(!RagError::DimensionMismatch { expected: 3, actual: 4 }.is_transient());
        assert!(!RagError::ContextTooLarge { size: 10, limit: 5 }.is_transient());
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let kind = RagError::embedding("stub", "boom").kind();
        assert_eq!(serde_json::to_value(kind).unwrap(), "embedding_service_error");
        assert_eq!(
            serde_json::to_value(ErrorKind::ContextTooLarge).unwrap(),
            "context_too_large"
        );
    }
}
