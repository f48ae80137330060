//! # docqa-rag
//!
//! Retrieval-augmented question answering over a private document collection.
//!
//! ## Overview
//!
//! Documents are split into overlapping character windows, embedded, and
//! stored in a vector store. A question is embedded the same way, the
//! nearest passages are fetched, and a prompt built from them is sent to a
//! generative model.
//!
//! - [`FixedSizeChunker`] - sliding-window chunking
//! - [`EmbeddingProvider`] / [`GenerationProvider`] / [`VectorStore`] - capability traits
//! - [`Indexer`] - document → chunks → embeddings → store, with partial-failure reports
//! - [`Retriever`] - question → top-k passages
//! - [`PromptAssembler`] and [`Answerer`] - context plus question → answer
//! - [`RagService`] - the indexing, query and health boundary
//!
//! ## Features
//!
//! | feature | adds |
//! |---------|------|
//! | `cohere` | [`cohere::CohereEmbeddingProvider`], [`cohere::CohereGenerationProvider`] |
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] |
//! | `qdrant` | [`qdrant::QdrantVectorStore`] |
//!
//! [`HashEmbeddingProvider`], [`EchoGenerationProvider`] and
//! [`InMemoryVectorStore`] are always available and need no network.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod inmemory;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod service;
pub mod vectorstore;

#[cfg(any(feature = "cohere", feature = "openai"))]
mod http;

#[cfg(feature = "cohere")]
pub mod cohere;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use answer::{Answer, Answerer};
pub use chunking::{FixedSizeChunker, TextWindow, chunk_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkKey, ChunkingParams, Document, IndexedPassage, RetrievalResult, SearchResult,
    SourceRef,
};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{ErrorKind, RagError, Result};
pub use generation::{EchoGenerationProvider, GenerationOptions, GenerationProvider};
pub use indexer::{IndexFailure, IndexReport, Indexer};
pub use inmemory::InMemoryVectorStore;
pub use prompt::{AugmentedPrompt, PromptAssembler};
pub use retriever::Retriever;
pub use retry::RetryPolicy;
pub use service::{HealthStatus, QueryRequest, QueryResponse, RagService, RagServiceBuilder};
pub use vectorstore::VectorStore;
