//! Shared HTTP failure classification for the hosted provider adapters.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::RagError;

/// Which upstream capability a failed call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upstream {
    Embedding,
    Generation,
}

impl Upstream {
    pub(crate) fn transient(self, provider: &str, message: String) -> RagError {
        match self {
            Self::Embedding => RagError::embedding(provider, message),
            Self::Generation => RagError::generation(provider, message),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn error_detail(body: String) -> String {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error: Some(detail), .. }) => detail.message,
        Ok(ErrorBody { message: Some(message), .. }) => message,
        _ => body,
    }
}

/// Map a non-success status to the error taxonomy.
///
/// Quota and rate limits are not retried; auth, missing model and malformed
/// requests point at configuration; everything else is treated as transient.
pub(crate) fn classify_status(
    upstream: Upstream,
    provider: &str,
    status: StatusCode,
    detail: String,
) -> RagError {
    let message = format!("API returned {status}: {detail}");
    match status.as_u16() {
        402 | 429 => match upstream {
            Upstream::Embedding => {
                RagError::EmbeddingQuotaExceeded { provider: provider.to_string(), message }
            }
            Upstream::Generation => upstream.transient(provider, message),
        },
        400 | 401 | 403 | 404 | 422 => {
            RagError::InvalidConfig(format!("{provider} rejected the request: {message}"))
        }
        _ => upstream.transient(provider, message),
    }
}
