//! Query-time retrieval: embed the question, fetch the nearest passages.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::with_timeout;
use crate::vectorstore::VectorStore;

/// Embeds questions and searches one collection of a vector store.
///
/// Holds no mutable state; concurrent queries share one retriever.
pub struct Retriever {
    collection: String,
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(
        collection: impl Into<String>,
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { collection: collection.into(), config, embedding_provider, vector_store })
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve_default(&self, question: &str) -> Result<RetrievalResult> {
        self.retrieve(question, self.config.top_k).await
    }

    /// Return at most `k` passages ranked by descending similarity to `question`.
    ///
    /// Upstream failures are returned as-is after retries; an empty result
    /// only ever means the store had nothing to return.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for an empty question or `k == 0`.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".into()));
        }
        if k == 0 {
            return Err(RagError::InvalidRequest("k must be greater than zero".into()));
        }

        let timeout = self.config.call_timeout;
        let provider = &self.embedding_provider;
        let store = &self.vector_store;

        let query_embedding = self
            .config
            .retry
            .run("embed_query", || {
                with_timeout(timeout, provider.embed_query(question), || {
                    RagError::embedding(
                        provider.name(),
                        format!("query embedding timed out after {timeout:?}"),
                    )
                })
            })
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))?;

        if query_embedding.len() != provider.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: provider.dimensions(),
                actual: query_embedding.len(),
            });
        }

        let results = self
            .config
            .retry
            .run("search", || {
                with_timeout(timeout, store.search(&self.collection, &query_embedding, k), || {
                    RagError::store(store.name(), format!("search timed out after {timeout:?}"))
                })
            })
            .await
            .inspect_err(|e| {
                error!(collection = %self.collection, error = %e, "vector store search failed")
            })?;

        debug!(top_score = results.first().map(|r| r.score), "search completed");
        info!(collection = %self.collection, k, result_count = results.len(), "retrieval completed");

        Ok(RetrievalResult::new(results))
    }
}
