//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Point ids are UUIDv5 values derived from chunk ids, so re-indexing a
//! document writes to the same points. Replacing a document deletes its
//! points by `document_id` payload filter before upserting; the two calls are
//! not atomic, which is why the indexer serializes writes per document.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334", None)?;
//! store.create_collection("docs", 1024).await?;
//! store.upsert("docs", &passages).await?;
//! let results = store.search("docs", &query_embedding, 5).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::document::{Chunk, IndexedPassage, SearchResult, rank_results};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// Extra points fetched beyond `top_k`.
///
/// Qdrant cuts by score alone, so passages tied at the k-th score would be
/// picked in Qdrant's order. Over-fetching lets the chunk-key tie-break choose
/// among them; a tie wider than this slack is still cut by Qdrant.
const TIE_SLACK: usize = 16;

/// Rank by score then chunk key, keeping the first `top_k`.
fn select_top_k(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    rank_results(&mut results);
    results.truncate(top_k);
    results
}

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Wraps a [`qdrant_client::Qdrant`] client and maps collections to Qdrant
/// collections with cosine distance. Chunk text and provenance are stored as
/// Qdrant payload.
pub struct QdrantVectorStore {
    client: Qdrant,
    /// Vector size per collection, learned on creation or from the server.
    dimensions: RwLock<HashMap<String, usize>>,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(Self::map_err)?;
        Ok(Self::from_client(client))
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client, dimensions: RwLock::new(HashMap::new()) }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::store(BACKEND, e.to_string())
    }

    /// Deterministic point id for a chunk id.
    pub fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches("document_id", document_id.to_string())])
    }

    /// Vector size of an existing collection as reported by the server.
    async fn remote_dimensions(&self, name: &str) -> Result<Option<usize>> {
        let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
        let size = info
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        Ok(size)
    }

    async fn expected_dimensions(&self, collection: &str) -> Result<Option<usize>> {
        if let Some(dims) = self.dimensions.read().await.get(collection) {
            return Ok(Some(*dims));
        }
        let remote = self.remote_dimensions(collection).await?;
        if let Some(dims) = remote {
            self.dimensions.write().await.insert(collection.to_string(), dims);
        }
        Ok(remote)
    }

    async fn check_dimensions(&self, collection: &str, actual: usize) -> Result<()> {
        match self.expected_dimensions(collection).await? {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn to_point(passage: &IndexedPassage) -> Result<PointStruct> {
        let chunk = &passage.chunk;
        let payload = Payload::try_from(json!({
            "chunk_id": chunk.id,
            "document_id": chunk.document_id,
            "index": chunk.index,
            "offset": chunk.offset,
            "text": chunk.text,
            "metadata": chunk.metadata,
        }))
        .map_err(Self::map_err)?;

        Ok(PointStruct::new(Self::point_id(&chunk.id), passage.embedding.clone(), payload))
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_usize(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
            Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    fn to_chunk(payload: &HashMap<String, QdrantValue>) -> Chunk {
        let string = |key: &str| payload.get(key).and_then(Self::extract_string).unwrap_or_default();
        let number = |key: &str| payload.get(key).and_then(Self::extract_usize).unwrap_or_default();

        let metadata: HashMap<String, String> = payload
            .get("metadata")
            .and_then(|v| match &v.kind {
                Some(Kind::StructValue(s)) => Some(
                    s.fields
                        .iter()
                        .filter_map(|(k, v)| Self::extract_string(v).map(|s| (k.clone(), s)))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Chunk {
            id: string("chunk_id"),
            document_id: string("document_id"),
            index: number("index"),
            offset: number("offset"),
            text: string("text"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return self.check_dimensions(name, dimensions).await;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;
        self.dimensions.write().await.insert(name.to_string(), dimensions);

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        self.dimensions.write().await.remove(name);
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(Self::map_err)
    }

    async fn upsert(&self, collection: &str, passages: &[IndexedPassage]) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }

        for passage in passages {
            self.check_dimensions(collection, passage.embedding.len()).await?;
        }
        let points = passages.iter().map(Self::to_point).collect::<Result<Vec<_>>>()?;

        let mut documents: Vec<&str> = passages.iter().map(|p| p.chunk.document_id.as_str()).collect();
        documents.sort_unstable();
        documents.dedup();
        for document_id in &documents {
            self.delete_document(collection, document_id).await?;
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = passages.len(), documents = documents.len(), "upserted passages to qdrant");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(Self::document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, document.id = document_id, "deleted document points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.check_dimensions(collection, embedding.len()).await?;

        let limit = top_k.saturating_add(TIE_SLACK);
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| SearchResult { chunk: Self::to_chunk(&scored.payload), score: scored.score })
            .collect();
        Ok(select_top_k(results, top_k))
    }

    async fn count(&self, collection: &str, document_id: Option<&str>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(collection).exact(true);
        if let Some(id) = document_id {
            request = request.filter(Self::document_filter(id));
        }
        let response = self.client.count(request).await.map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        let a = QdrantVectorStore::point_id("report.pdf_0");
        let b = QdrantVectorStore::point_id("report.pdf_0");
        let c = QdrantVectorStore::point_id("report.pdf_1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    fn scored(document_id: &str, index: usize, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: format!("{document_id}_{index}"),
                document_id: document_id.into(),
                index,
                offset: 0,
                text: String::new(),
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[test]
    fn ties_at_the_cutoff_keep_the_lowest_chunk_keys() {
        // Order as Qdrant might return it: equal scores in arbitrary order.
        let results = vec![
            scored("a", 0, 0.9),
            scored("c", 0, 0.5),
            scored("b", 1, 0.5),
            scored("b", 0, 0.5),
        ];
        let kept: Vec<_> = select_top_k(results, 2).into_iter().map(|r| r.chunk.id).collect();
        assert_eq!(kept, ["a_0", "b_0"]);
    }

    #[test]
    fn payload_round_trips_into_a_chunk() {
        let passage = IndexedPassage {
            chunk: Chunk {
                id: "notes_2".into(),
                document_id: "notes".into(),
                index: 2,
                offset: 800,
                text: "The project deadline is Friday".into(),
                metadata: HashMap::from([("lang".to_string(), "en".to_string())]),
            },
            embedding: vec![0.1, 0.2],
        };
        let point = QdrantVectorStore::to_point(&passage).unwrap();
        let chunk = QdrantVectorStore::to_chunk(&point.payload);
        assert_eq!(chunk, passage.chunk);
    }
}
