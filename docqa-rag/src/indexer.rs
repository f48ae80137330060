//! Bulk indexing: document → chunks → embeddings → vector store.
//!
//! Each document is indexed independently. A failing document is recorded in
//! the [`IndexReport`] and the rest of the batch carries on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chunking::FixedSizeChunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, IndexedPassage};
use crate::embedding::EmbeddingProvider;
use crate::error::{ErrorKind, RagError, Result};
use crate::retry::with_timeout;
use crate::vectorstore::VectorStore;

/// Why one document of a batch was not indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexFailure {
    pub document_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of an [`Indexer::index`] run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexReport {
    /// Documents whose passages are now stored.
    pub documents_processed: usize,
    /// Chunks created and stored across those documents.
    pub chunks_created: usize,
    /// Documents that failed, in input order.
    pub failures: Vec<IndexFailure>,
}

impl IndexReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Async mutex per document id, so two writers never interleave a
/// delete-then-insert for the same document.
#[derive(Debug, Default)]
struct DocumentLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    fn get(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(document_id) {
            return lock.clone();
        }
        // Drop entries nobody holds before adding a new one.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(document_id.to_string(), lock.clone());
        lock
    }
}

/// Drives chunking, embedding and storage for batches of documents.
///
/// The vector store is an owned resource handed in at construction; the
/// indexer writes to one collection of it.
pub struct Indexer {
    collection: String,
    config: RagConfig,
    chunker: FixedSizeChunker,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    locks: DocumentLocks,
}

impl Indexer {
    /// Create an indexer writing into `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        collection: impl Into<String>,
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            collection: collection.into(),
            config,
            chunker,
            embedding_provider,
            vector_store,
            locks: DocumentLocks::default(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index a batch of documents.
    ///
    /// Up to `index_concurrency` documents are in flight at once. Failures
    /// are collected per document; this method itself never fails.
    pub async fn index(&self, documents: &[Document]) -> IndexReport {
        // Built up front so the returned future stays `Send` for any lifetime.
        let mut pending: Vec<BoxFuture<'_, (&str, Result<usize>)>> = Vec::with_capacity(documents.len());
        for document in documents {
            pending.push(Box::pin(async move { (document.id.as_str(), self.index_document(document).await) }));
        }
        let outcomes: Vec<(&str, Result<usize>)> =
            stream::iter(pending).buffered(self.config.index_concurrency).collect().await;

        let mut report = IndexReport::default();
        for (document_id, outcome) in outcomes {
            match outcome {
                Ok(chunk_count) => {
                    report.documents_processed += 1;
                    report.chunks_created += chunk_count;
                }
                Err(e) => report.failures.push(IndexFailure {
                    document_id: document_id.to_string(),
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        }

        info!(
            collection = %self.collection,
            documents_processed = report.documents_processed,
            chunks_created = report.chunks_created,
            failures = report.failures.len(),
            "indexing run finished"
        );
        report
    }

    /// Index one document, replacing whatever was stored for its id.
    ///
    /// Returns the number of chunks stored. A document with empty text ends
    /// up with no stored passages.
    pub async fn index_document(&self, document: &Document) -> Result<usize> {
        let lock = self.locks.get(&document.id);
        let _guard = lock.lock().await;

        let chunks = self.chunker.for_document(document)?.chunk(document).inspect_err(|e| {
            warn!(document.id = %document.id, error = %e, "chunking failed");
        })?;

        if chunks.is_empty() {
            self.remove_document(&document.id).await?;
            info!(document.id = %document.id, chunk_count = 0, "indexed document (empty)");
            return Ok(0);
        }

        let embeddings = self.embed_chunks(&chunks).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during indexing");
        })?;

        let passages: Vec<IndexedPassage> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedPassage { chunk, embedding })
            .collect();

        let store = &self.vector_store;
        let timeout = self.config.call_timeout;
        self.config
            .retry
            .run("upsert", || {
                with_timeout(timeout, store.upsert(&self.collection, &passages), || {
                    RagError::store(store.name(), format!("upsert timed out after {timeout:?}"))
                })
            })
            .await
            .inspect_err(|e| {
                error!(document.id = %document.id, error = %e, "upsert failed during indexing");
            })?;

        let chunk_count = passages.len();
        info!(document.id = %document.id, chunk_count, "indexed document");
        Ok(chunk_count)
    }

    /// Remove every stored passage of a document.
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        let lock = self.locks.get(document_id);
        let _guard = lock.lock().await;
        self.remove_document(document_id).await?;
        info!(document.id = %document_id, "deleted document");
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        let store = &self.vector_store;
        let timeout = self.config.call_timeout;
        self.config
            .retry
            .run("delete_document", || {
                with_timeout(timeout, store.delete_document(&self.collection, document_id), || {
                    RagError::store(store.name(), format!("delete timed out after {timeout:?}"))
                })
            })
            .await
    }

    /// Embed chunk texts in batches, checking count and dimensionality.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let provider = &self.embedding_provider;
        let timeout = self.config.call_timeout;
        let expected_dimensions = provider.dimensions();
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self
                .config
                .retry
                .run("embed_batch", || async {
                    let vectors = with_timeout(timeout, provider.embed_batch(&texts), || {
                        RagError::embedding(
                            provider.name(),
                            format!("embedding timed out after {timeout:?}"),
                        )
                    })
                    .await?;
                    if vectors.len() != texts.len() {
                        return Err(RagError::embedding(
                            provider.name(),
                            format!("got {} embeddings for {} texts", vectors.len(), texts.len()),
                        ));
                    }
                    Ok(vectors)
                })
                .await?;

            if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dimensions) {
                return Err(RagError::DimensionMismatch {
                    expected: expected_dimensions,
                    actual: bad.len(),
                });
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;
    use crate::retry::RetryPolicy;

    fn config() -> RagConfig {
        RagConfig::builder()
            .chunk_size(16)
            .chunk_overlap(4)
            .embed_batch_size(2)
            .retry(RetryPolicy::immediate(3))
            .build()
            .unwrap()
    }

    async fn setup(
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> (Indexer, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", embedder.dimensions()).await.unwrap();
        let indexer = Indexer::new("docs", config(), embedder, store.clone()).unwrap();
        (indexer, store)
    }

    /// Records the size of every batch it is asked to embed.
    struct RecordingEmbedder {
        inner: HashEmbeddingProvider,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            let mut out = Vec::new();
            for text in texts {
                out.push(self.inner.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    /// Claims one dimensionality, produces another.
    struct LyingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LyingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    /// Fails with a transient error on the first `failures` calls.
    struct FlakyEmbedder {
        inner: HashEmbeddingProvider,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(RagError::embedding("flaky", "503 Service Unavailable"));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    #[tokio::test]
    async fn embeds_in_configured_batch_sizes() {
        let embedder = Arc::new(RecordingEmbedder {
            inner: HashEmbeddingProvider::new(32),
            batches: Mutex::new(Vec::new()),
        });
        let (indexer, store) = setup(embedder.clone()).await;

        // 40 chars, size 16, step 12 → windows at 0, 12, 24 (ends at 40).
        let text = "a".repeat(40);
        let created = indexer.index_document(&Document::new("d", text)).await.unwrap();

        assert_eq!(created, 3);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 1]);
        assert_eq!(store.count("docs", Some("d")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn shrinking_a_document_removes_stale_chunks() {
        let (indexer, store) = setup(Arc::new(HashEmbeddingProvider::new(32))).await;

        indexer.index_document(&Document::new("d", "x".repeat(60))).await.unwrap();
        let before = store.count("docs", Some("d")).await.unwrap();
        indexer.index_document(&Document::new("d", "short")).await.unwrap();

        assert!(before > 1);
        assert_eq!(store.count("docs", Some("d")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_document_clears_its_passages() {
        let (indexer, store) = setup(Arc::new(HashEmbeddingProvider::new(32))).await;
        indexer.index_document(&Document::new("d", "some text")).await.unwrap();
        assert_eq!(indexer.index_document(&Document::new("d", "")).await.unwrap(), 0);
        assert_eq!(store.count("docs", Some("d")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_vector_length_is_a_dimension_mismatch() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", 4).await.unwrap();
        let indexer = Indexer::new("docs", config(), Arc::new(LyingEmbedder), store).unwrap();

        let report = indexer.index(&[Document::new("d", "text")]).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::DimensionMismatch);
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbeddingProvider::new(32),
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let (indexer, _store) = setup(embedder).await;

        let report = indexer.index(&[Document::new("d", "retry me")]).await;
        assert!(report.is_complete());
        assert_eq!(report.documents_processed, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported_as_failures() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbeddingProvider::new(32),
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let (indexer, _store) = setup(embedder.clone()).await;

        let report = indexer.index(&[Document::new("d", "never works")]).await;
        assert_eq!(report.documents_processed, 0);
        assert_eq!(report.failures[0].kind, ErrorKind::EmbeddingServiceError);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn delete_removes_a_document() {
        let (indexer, store) = setup(Arc::new(HashEmbeddingProvider::new(32))).await;
        indexer.index_document(&Document::new("d", "to be removed")).await.unwrap();
        indexer.delete("d").await.unwrap();
        assert_eq!(store.count("docs", None).await.unwrap(), 0);
    }
}
