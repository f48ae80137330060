//! Server configuration read from the environment.

use std::fmt;
use std::sync::Arc;

use docqa_rag::cohere::{CohereEmbeddingProvider, CohereGenerationProvider};
use docqa_rag::openai::OpenAIEmbeddingProvider;
use docqa_rag::qdrant::QdrantVectorStore;
use docqa_rag::{
    EchoGenerationProvider, EmbeddingProvider, GenerationProvider, HashEmbeddingProvider,
    InMemoryVectorStore, RagConfig, RagError, RagService, Result, VectorStore,
};

const DEFAULT_HASH_DIMENSIONS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Cohere,
    OpenAI,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBackend {
    Cohere,
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Qdrant,
}

/// How answers are rendered in query responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnswerFormat {
    #[default]
    Plain,
    /// Newlines become `<br>` for browser front-ends.
    Html,
}

impl AnswerFormat {
    pub fn render(self, answer: String) -> String {
        match self {
            Self::Plain => answer,
            Self::Html => answer.replace('\n', "<br>"),
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub collection: String,
    pub embedding: EmbeddingBackend,
    pub generation: GenerationBackend,
    pub vector_store: StoreBackend,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub generation_model: Option<String>,
    pub cohere_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub answer_format: AnswerFormat,
    pub rag: RagConfig,
}

// Keys stay out of logs and panics.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("collection", &self.collection)
            .field("embedding", &self.embedding)
            .field("generation", &self.generation)
            .field("vector_store", &self.vector_store)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("generation_model", &self.generation_model)
            .field("cohere_api_key", &redact(&self.cohere_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &redact(&self.qdrant_api_key))
            .field("answer_format", &self.answer_format)
            .field("rag", &self.rag)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            collection: "documents".to_string(),
            embedding: EmbeddingBackend::Hash,
            generation: GenerationBackend::Echo,
            vector_store: StoreBackend::Memory,
            embedding_model: None,
            embedding_dimensions: None,
            generation_model: None,
            cohere_api_key: None,
            openai_api_key: None,
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            answer_format: AnswerFormat::Plain,
            rag: RagConfig::default(),
        }
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> RagError {
    RagError::InvalidConfig(format!("{key}={value:?} is invalid, expected {expected}"))
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Without explicit choices the backends follow the credentials present:
    /// Cohere when `CO_API_KEY` is set, Qdrant when `QDRANT_URL` is set, and
    /// the offline hash embedder, echo generator and in-memory store otherwise.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| -> Result<Option<usize>> {
            var(key)
                .map(|v| v.parse::<usize>().map_err(|_| invalid(key, &v, "a non-negative integer")))
                .transpose()
        };

        let defaults = Self::default();
        let cohere_api_key = var("CO_API_KEY");
        let openai_api_key = var("OPENAI_API_KEY");
        let qdrant_url = var("QDRANT_URL");

        let port = match var("DOCQA_PORT") {
            Some(v) => v.parse::<u16>().map_err(|_| invalid("DOCQA_PORT", &v, "a port number"))?,
            None => defaults.port,
        };

        let embedding = match var("DOCQA_EMBEDDING_PROVIDER").as_deref() {
            Some("cohere") => EmbeddingBackend::Cohere,
            Some("openai") => EmbeddingBackend::OpenAI,
            Some("hash") => EmbeddingBackend::Hash,
            Some(other) => {
                return Err(invalid("DOCQA_EMBEDDING_PROVIDER", other, "cohere, openai or hash"));
            }
            None if cohere_api_key.is_some() => EmbeddingBackend::Cohere,
            None => EmbeddingBackend::Hash,
        };

        let generation = match var("DOCQA_GENERATION_PROVIDER").as_deref() {
            Some("cohere") => GenerationBackend::Cohere,
            Some("echo") => GenerationBackend::Echo,
            Some(other) => return Err(invalid("DOCQA_GENERATION_PROVIDER", other, "cohere or echo")),
            None if cohere_api_key.is_some() => GenerationBackend::Cohere,
            None => GenerationBackend::Echo,
        };

        let vector_store = match var("DOCQA_VECTOR_STORE").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("qdrant") => StoreBackend::Qdrant,
            Some(other) => return Err(invalid("DOCQA_VECTOR_STORE", other, "memory or qdrant")),
            None if qdrant_url.is_some() => StoreBackend::Qdrant,
            None => StoreBackend::Memory,
        };

        let answer_format = match var("DOCQA_ANSWER_FORMAT").as_deref() {
            Some("plain") | None => AnswerFormat::Plain,
            Some("html") => AnswerFormat::Html,
            Some(other) => return Err(invalid("DOCQA_ANSWER_FORMAT", other, "plain or html")),
        };

        let mut rag = RagConfig::builder();
        if let Some(size) = number("DOCQA_CHUNK_SIZE")? {
            rag = rag.chunk_size(size);
        }
        if let Some(overlap) = number("DOCQA_CHUNK_OVERLAP")? {
            rag = rag.chunk_overlap(overlap);
        }
        if let Some(k) = number("DOCQA_TOP_K")? {
            rag = rag.top_k(k);
        }

        let config = Self {
            host: var("DOCQA_HOST").unwrap_or(defaults.host),
            port,
            collection: var("DOCQA_COLLECTION").unwrap_or(defaults.collection),
            embedding,
            generation,
            vector_store,
            embedding_model: var("DOCQA_EMBEDDING_MODEL"),
            embedding_dimensions: number("DOCQA_EMBEDDING_DIMENSIONS")?,
            generation_model: var("DOCQA_GENERATION_MODEL"),
            cohere_api_key,
            openai_api_key,
            qdrant_url: qdrant_url.unwrap_or(defaults.qdrant_url),
            qdrant_api_key: var("QDRANT_API_KEY"),
            answer_format,
            rag: rag.build()?,
        };
        config.check_credentials()?;
        Ok(config)
    }

    fn check_credentials(&self) -> Result<()> {
        let needs_cohere = self.embedding == EmbeddingBackend::Cohere
            || self.generation == GenerationBackend::Cohere;
        if needs_cohere && self.cohere_api_key.is_none() {
            return Err(RagError::InvalidConfig("CO_API_KEY is required for the cohere provider".into()));
        }
        if self.embedding == EmbeddingBackend::OpenAI && self.openai_api_key.is_none() {
            return Err(RagError::InvalidConfig(
                "OPENAI_API_KEY is required for the openai embedding provider".into(),
            ));
        }
        Ok(())
    }

    fn cohere_key(&self) -> Result<String> {
        self.cohere_api_key
            .clone()
            .ok_or_else(|| RagError::InvalidConfig("CO_API_KEY is not set".into()))
    }

    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(match self.embedding {
            EmbeddingBackend::Cohere => {
                let mut provider = CohereEmbeddingProvider::new(self.cohere_key()?)?;
                if let Some(model) = &self.embedding_model {
                    let dimensions = self.embedding_dimensions.unwrap_or(provider.dimensions());
                    provider = provider.with_model(model.clone(), dimensions);
                }
                Arc::new(provider)
            }
            EmbeddingBackend::OpenAI => {
                let key = self.openai_api_key.clone().ok_or_else(|| {
                    RagError::InvalidConfig("OPENAI_API_KEY is not set".into())
                })?;
                let mut provider = OpenAIEmbeddingProvider::new(key)?;
                if let Some(model) = &self.embedding_model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(dimensions) = self.embedding_dimensions {
                    provider = provider.with_dimensions(dimensions);
                }
                Arc::new(provider)
            }
            EmbeddingBackend::Hash => Arc::new(HashEmbeddingProvider::new(
                self.embedding_dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS),
            )),
        })
    }

    pub fn generation_provider(&self) -> Result<Arc<dyn GenerationProvider>> {
        Ok(match self.generation {
            GenerationBackend::Cohere => {
                let mut provider = CohereGenerationProvider::new(self.cohere_key()?)?;
                if let Some(model) = &self.generation_model {
                    provider = provider.with_model(model.clone());
                }
                Arc::new(provider)
            }
            GenerationBackend::Echo => Arc::new(EchoGenerationProvider),
        })
    }

    pub fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(match self.vector_store {
            StoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
            StoreBackend::Qdrant => {
                Arc::new(QdrantVectorStore::new(&self.qdrant_url, self.qdrant_api_key.clone())?)
            }
        })
    }

    /// Assemble the [`RagService`] described by this configuration.
    pub fn build_service(&self) -> Result<RagService> {
        RagService::builder()
            .collection(self.collection.clone())
            .config(self.rag.clone())
            .embedding_provider(self.embedding_provider()?)
            .vector_store(self.vector_store()?)
            .generation_provider(self.generation_provider()?)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_runs_offline() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.embedding, EmbeddingBackend::Hash);
        assert_eq!(config.generation, GenerationBackend::Echo);
        assert_eq!(config.vector_store, StoreBackend::Memory);
        assert_eq!(config.collection, "documents");
        assert_eq!(config.port, 8000);
        assert_eq!(config.rag, RagConfig::default());
    }

    #[test]
    fn credentials_select_hosted_backends() {
        let config = config_from(&[
            ("CO_API_KEY", "secret-key"),
            ("QDRANT_URL", "http://qdrant:6334"),
            ("DOCQA_COLLECTION", "second"),
        ])
        .unwrap();
        assert_eq!(config.embedding, EmbeddingBackend::Cohere);
        assert_eq!(config.generation, GenerationBackend::Cohere);
        assert_eq!(config.vector_store, StoreBackend::Qdrant);
        assert_eq!(config.qdrant_url, "http://qdrant:6334");
        assert_eq!(config.collection, "second");
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = config_from(&[("CO_API_KEY", "secret-key")]).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn chunking_variables_are_validated() {
        let config =
            config_from(&[("DOCQA_CHUNK_SIZE", "256"), ("DOCQA_CHUNK_OVERLAP", "32"), ("DOCQA_TOP_K", "6")])
                .unwrap();
        assert_eq!(config.rag.chunk_size, 256);
        assert_eq!(config.rag.chunk_overlap, 32);
        assert_eq!(config.rag.top_k, 6);

        let err = config_from(&[("DOCQA_CHUNK_SIZE", "100"), ("DOCQA_CHUNK_OVERLAP", "100")]);
        assert!(matches!(err, Err(RagError::InvalidConfig(_))));
        let err = config_from(&[("DOCQA_TOP_K", "many")]);
        assert!(matches!(err, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_backends_and_missing_keys_are_rejected() {
        assert!(config_from(&[("DOCQA_VECTOR_STORE", "faiss")]).is_err());
        assert!(config_from(&[("DOCQA_EMBEDDING_PROVIDER", "cohere")]).is_err());
        assert!(config_from(&[("DOCQA_EMBEDDING_PROVIDER", "openai")]).is_err());
        assert!(config_from(&[("DOCQA_ANSWER_FORMAT", "markdown")]).is_err());
    }

    #[test]
    fn html_format_replaces_newlines() {
        assert_eq!(AnswerFormat::Html.render("a\nb".into()), "a<br>b");
        assert_eq!(AnswerFormat::Plain.render("a\nb".into()), "a\nb");
    }

    #[test]
    fn offline_service_builds() {
        let config = config_from(&[("DOCQA_EMBEDDING_DIMENSIONS", "32")]).unwrap();
        let service = config.build_service().unwrap();
        assert_eq!(service.collection(), "documents");
    }
}
