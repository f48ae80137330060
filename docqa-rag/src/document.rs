//! Data types for documents, chunks, and search results.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-document override of the configured chunk size and overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingParams {
    /// Maximum number of characters per chunk.
    pub max_size: usize,
    /// Number of characters shared with the preceding chunk.
    pub overlap: usize,
}

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document, e.g. its file name.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    /// Optional chunking override for this document only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking: Option<ChunkingParams>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            source_uri: None,
            chunking: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the source URI.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// Chunk this document with its own size and overlap instead of the configured ones.
    pub fn with_chunking(mut self, max_size: usize, overlap: usize) -> Self {
        self.chunking = Some(ChunkingParams { max_size, overlap });
        self
    }
}

/// Identity of a chunk: its document and its position in that document's chunk sequence.
///
/// The derived ordering (document id, then index) is the tie-break order for
/// passages with equal similarity scores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub document_id: String,
    pub index: usize,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.document_id, self.index)
    }
}

/// A bounded passage of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk in the document's chunk sequence.
    pub index: usize,
    /// Character offset of the chunk's first character within the document.
    pub offset: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey { document_id: self.document_id.clone(), index: self.index }
    }
}

/// A chunk together with its embedding, as persisted by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedPassage {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A retrieved passage paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk. Stores are not required to return the stored embedding.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Rank results by descending score, breaking ties by ascending chunk key.
pub fn rank_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.index.cmp(&b.chunk.index))
    });
}

/// Ranked passages returned for one query, highest similarity first, at most `k` long.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub results: Vec<SearchResult>,
}

impl RetrievalResult {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }

    /// Provenance entries in ranked order.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.results.iter().map(SourceRef::from).collect()
    }
}

/// Where a piece of context came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub document_id: String,
    pub chunk_id: String,
    pub offset: usize,
    pub score: f32,
}

impl From<&SearchResult> for SourceRef {
    fn from(result: &SearchResult) -> Self {
        Self {
            document_id: result.chunk.document_id.clone(),
            chunk_id: result.chunk.id.clone(),
            offset: result.chunk.offset,
            score: result.score,
        }
    }
}
