//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. Every mutation happens
//! under one write lock, so replacing a document's passages is atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{ChunkKey, IndexedPassage, SearchResult, rank_results};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "memory";

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    passages: BTreeMap<ChunkKey, IndexedPassage>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as collection name → chunk key → passage.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::store(BACKEND, format!("collection '{collection}' does not exist"))
}

fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, passages: BTreeMap::new() });
        check_dimensions(collection.dimensions, dimensions)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn upsert(&self, collection: &str, passages: &[IndexedPassage]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        // Validate everything before touching the collection.
        for passage in passages {
            check_dimensions(store.dimensions, passage.embedding.len())?;
        }

        let mut replaced: Vec<&str> = passages.iter().map(|p| p.chunk.document_id.as_str()).collect();
        replaced.sort_unstable();
        replaced.dedup();
        store.passages.retain(|key, _| replaced.binary_search(&key.document_id.as_str()).is_err());

        for passage in passages {
            store.passages.insert(passage.chunk.key(), passage.clone());
        }

        debug!(collection, count = passages.len(), documents = replaced.len(), "upserted passages");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.passages.retain(|key, _| key.document_id != document_id);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        check_dimensions(store.dimensions, embedding.len())?;

        let mut scored: Vec<SearchResult> = store
            .passages
            .values()
            .map(|passage| SearchResult {
                chunk: passage.chunk.clone(),
                score: cosine_similarity(&passage.embedding, embedding),
            })
            .collect();

        rank_results(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, collection: &str, document_id: Option<&str>) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(match document_id {
            Some(id) => store.passages.keys().filter(|key| key.document_id == id).count(),
            None => store.passages.len(),
        })
    }

    fn name(&self) -> &str {
        BACKEND
    }
}
