//! Boundary facade over the whole pipeline.
//!
//! [`RagService`] owns the vector store handle and the readiness flag, and
//! exposes the indexing, query and health operations that the HTTP server
//! and CLI call.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagService, RagConfig, InMemoryVectorStore, HashEmbeddingProvider, EchoGenerationProvider};
//!
//! let service = RagService::builder()
//!     .collection("docs")
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_provider(Arc::new(EchoGenerationProvider))
//!     .build()?;
//!
//! service.ensure_collection().await?;
//! service.index(&documents).await;
//! let response = service.query(QueryRequest::new("When is the project due?")).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::answer::Answerer;
use crate::config::RagConfig;
use crate::document::{Document, SourceRef};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::indexer::{IndexReport, Indexer};
use crate::prompt::PromptAssembler;
use crate::retriever::Retriever;
use crate::retry::with_timeout;
use crate::vectorstore::VectorStore;

/// A question posed at the query boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub question: String,
    /// Overrides the configured `top_k` for this query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), top_k: None }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }
}

/// A successful answer at the query boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// False when nothing relevant was retrieved and the answer is ungrounded.
    pub context_found: bool,
}

/// Readiness of the service; `index_ready` turns true after the first build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub index_ready: bool,
    pub collection: String,
}

/// The retrieval-augmented question answering service.
///
/// Lifecycle: `ensure_collection → index → query* → optional rebuild`.
/// Queries share no mutable state and may run fully in parallel.
pub struct RagService {
    collection: String,
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    indexer: Indexer,
    retriever: Retriever,
    assembler: PromptAssembler,
    answerer: Answerer,
    ready: AtomicBool,
}

impl RagService {
    /// Create a new [`RagServiceBuilder`].
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Create the collection if it is missing.
    ///
    /// A collection that already holds passages was built by an earlier run
    /// and is queryable right away.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the existing collection was
    /// built with a different embedding dimensionality.
    pub async fn ensure_collection(&self) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        let store = &self.vector_store;
        let timeout = self.config.call_timeout;

        self.config
            .retry
            .run("create_collection", || {
                with_timeout(timeout, store.create_collection(&self.collection, dimensions), || {
                    RagError::store(store.name(), format!("create collection timed out after {timeout:?}"))
                })
            })
            .await
            .inspect_err(|e| error!(collection = %self.collection, error = %e, "failed to create collection"))?;

        let existing = self
            .config
            .retry
            .run("count", || {
                with_timeout(timeout, store.count(&self.collection, None), || {
                    RagError::store(store.name(), format!("count timed out after {timeout:?}"))
                })
            })
            .await?;

        if existing > 0 {
            self.ready.store(true, Ordering::Release);
        }
        info!(
            collection = %self.collection,
            dimensions,
            existing_passages = existing,
            index_ready = self.is_ready(),
            "collection ready"
        );
        Ok(())
    }

    /// Index documents into the collection; see [`Indexer::index`].
    pub async fn index(&self, documents: &[Document]) -> IndexReport {
        let report = self.indexer.index(documents).await;
        if report.documents_processed > 0 {
            self.ready.store(true, Ordering::Release);
        }
        report
    }

    /// Drop and recreate the collection, then index `documents` into it.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<IndexReport> {
        warn!(collection = %self.collection, "dropping collection for rebuild");
        self.ready.store(false, Ordering::Release);
        let store = &self.vector_store;
        let timeout = self.config.call_timeout;
        self.config
            .retry
            .run("delete_collection", || {
                with_timeout(timeout, store.delete_collection(&self.collection), || {
                    RagError::store(store.name(), format!("delete collection timed out after {timeout:?}"))
                })
            })
            .await
            .inspect_err(|e| error!(collection = %self.collection, error = %e, "failed to drop collection"))?;
        self.ensure_collection().await?;
        Ok(self.index(documents).await)
    }

    /// Remove one document's passages from the collection.
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        self.indexer.delete(document_id).await
    }

    /// Answer one question: retrieve, assemble, generate.
    ///
    /// An empty retrieval is not an error; it comes back with
    /// `context_found == false`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotReady`] if no index has been built yet,
    /// otherwise whatever the failing pipeline stage returned.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        if !self.is_ready() {
            return Err(RagError::IndexNotReady(format!(
                "collection '{}' has not been indexed yet",
                self.collection
            )));
        }

        let k = request.top_k.unwrap_or(self.config.top_k);
        let retrieved = self.retriever.retrieve(&request.question, k).await?;
        let prompt = self.assembler.assemble(&request.question, &retrieved)?;
        let answer = self.answerer.answer(&prompt).await?;

        if !answer.context_found {
            warn!(collection = %self.collection, "query answered without retrieved context");
        }

        Ok(QueryResponse {
            answer: answer.text,
            sources: answer.sources,
            context_found: answer.context_found,
        })
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".into(),
            index_ready: self.is_ready(),
            collection: self.collection.clone(),
        }
    }
}

/// Builder for constructing a [`RagService`].
///
/// The embedding provider, vector store and generation provider are
/// required; the collection defaults to `documents` and the configuration to
/// [`RagConfig::default`].
#[derive(Default)]
pub struct RagServiceBuilder {
    collection: Option<String>,
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    generation_options: GenerationOptions,
}

impl RagServiceBuilder {
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation_options = options;
        self
    }

    /// Build the [`RagService`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a required component is missing
    /// or the configuration does not validate.
    pub fn build(self) -> Result<RagService> {
        let collection = self.collection.unwrap_or_else(|| "documents".to_string());
        if collection.trim().is_empty() {
            return Err(RagError::InvalidConfig("collection name must not be empty".into()));
        }
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::InvalidConfig("embedding_provider is required".into()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::InvalidConfig("vector_store is required".into()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::InvalidConfig("generation_provider is required".into()))?;

        let indexer = Indexer::new(
            collection.clone(),
            config.clone(),
            embedding_provider.clone(),
            vector_store.clone(),
        )?;
        let retriever = Retriever::new(
            collection.clone(),
            config.clone(),
            embedding_provider.clone(),
            vector_store.clone(),
        )?;
        let assembler = PromptAssembler::new(config.max_prompt_chars);
        let answerer = Answerer::new(generation_provider, config.call_timeout, config.retry)
            .with_options(self.generation_options);

        Ok(RagService {
            collection,
            config,
            embedding_provider,
            vector_store,
            indexer,
            retriever,
            assembler,
            answerer,
            ready: AtomicBool::new(false),
        })
    }
}
