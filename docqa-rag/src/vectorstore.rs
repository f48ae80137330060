//! Vector store trait for storing and searching indexed passages.

use async_trait::async_trait;

use crate::document::{IndexedPassage, SearchResult};
use crate::error::Result;

/// A storage backend for embedded passages with similarity search.
///
/// Implementations manage named collections of [`IndexedPassage`]s keyed by
/// `(document_id, chunk index)`. Similarity is cosine similarity; results are
/// ranked by descending score with ties broken by ascending chunk key.
///
/// Vectors whose length differs from the collection's dimensionality are
/// rejected with [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &passages).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Store passages, replacing every previously stored passage of each
    /// document that appears in `passages`.
    ///
    /// After the call a document's stored passages are exactly the ones
    /// given, so chunks left over from an older version of the document
    /// disappear.
    async fn upsert(&self, collection: &str, passages: &[IndexedPassage]) -> Result<()>;

    /// Remove every passage of a document.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()>;

    /// Return the `top_k` passages most similar to `embedding`.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Count stored passages, optionally only those of one document.
    async fn count(&self, collection: &str, document_id: Option<&str>) -> Result<usize>;

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str {
        "vector-store"
    }
}
