//! Cohere embedding and generation providers using the Cohere v2 REST API.
//!
//! This module is only available when the `cohere` feature is enabled.
//!
//! Cohere embeds documents and queries with different input types; the
//! embedding provider sends `search_document` for indexed text and
//! `search_query` for questions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::http::{Upstream, classify_status, error_detail};

/// The default Cohere API base URL.
const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "embed-english-v3.0";

/// Dimensionality of the v3 English embedding models.
const DEFAULT_DIMENSIONS: usize = 1024;

/// The default chat model used for answers.
const DEFAULT_GENERATION_MODEL: &str = "command-r-plus";

/// Cohere accepts at most this many texts per embed call.
const MAX_TEXTS_PER_CALL: usize = 96;

const PROVIDER: &str = "Cohere";

fn api_key_from_env() -> Result<String> {
    let key = std::env::var("CO_API_KEY")
        .map_err(|_| RagError::InvalidConfig("CO_API_KEY environment variable not set".into()))?;
    if key.is_empty() {
        return Err(RagError::InvalidConfig("CO_API_KEY must not be empty".into()));
    }
    Ok(key)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum InputType {
    SearchDocument,
    SearchQuery,
}

/// An [`EmbeddingProvider`] backed by the Cohere embed API.
///
/// # Configuration
///
/// - `model` – defaults to `embed-english-v3.0` (1024 dimensions).
/// - `api_key` – from the constructor or the `CO_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::cohere::CohereEmbeddingProvider;
///
/// let provider = CohereEmbeddingProvider::from_env()?;
/// let embedding = provider.embed_query("what is acne?").await?;
/// ```
pub struct CohereEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl CohereEmbeddingProvider {
    /// Create a new provider with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfig("Cohere API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: COHERE_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new provider using the `CO_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the model name and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Point the provider at a different API host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn embed_texts(&self, texts: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_TEXTS_PER_CALL) {
            vectors.extend(self.embed_call(batch, input_type).await?);
        }
        Ok(vectors)
    }

    async fn embed_call(&self, texts: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            ?input_type,
            "embedding batch"
        );

        let body = EmbedRequest {
            model: &self.model,
            texts,
            input_type,
            embedding_types: ["float"],
        };

        let response = self
            .client
            .post(format!("{}/v2/embed", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "embed API error");
            return Err(classify_status(Upstream::Embedding, PROVIDER, status, detail));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        if parsed.embeddings.float.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "API returned {} embeddings for {} texts",
                    parsed.embeddings.float.len(),
                    texts.len()
                ),
            ));
        }

        Ok(parsed.embeddings.float)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [&'a str],
    input_type: InputType,
    embedding_types: [&'static str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedByType,
}

#[derive(Deserialize)]
struct EmbedByType {
    float: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for CohereEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text], InputType::SearchDocument).await?;
        vectors.pop().ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_texts(texts, InputType::SearchDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text], InputType::SearchQuery).await?;
        vectors.pop().ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// A [`GenerationProvider`] backed by the Cohere chat API.
///
/// Sends the assembled prompt as a single user message and returns the
/// concatenated text content of the reply.
pub struct CohereGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CohereGenerationProvider {
    /// Create a new provider with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfig("Cohere API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: COHERE_BASE_URL.into(),
            model: DEFAULT_GENERATION_MODEL.into(),
        })
    }

    /// Create a new provider using the `CO_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl GenerationProvider for CohereGenerationProvider {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "chat request");

        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v2/chat", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::generation(PROVIDER, format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "chat API error");
            return Err(classify_status(Upstream::Generation, PROVIDER, status, detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::generation(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        let text: String = parsed.message.content.into_iter().filter_map(|item| item.text).collect();
        Ok(text)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
