//! Generation provider trait: prompt in, text out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prompt::{CONTEXT_END, CONTEXT_START};

/// Optional knobs passed through to the generative model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A generative language model behind a single text-to-text call.
///
/// Implementations must surface provider failures as errors, never as
/// placeholder text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str {
        "generator"
    }
}

/// Offline generator that answers with the context block of the prompt.
///
/// Lets the whole pipeline run without a model: the "answer" is the
/// retrieved context itself, or the no-context notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerationProvider;

#[async_trait]
impl GenerationProvider for EchoGenerationProvider {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        let context = prompt
            .split_once(CONTEXT_START)
            .and_then(|(_, rest)| rest.split_once(CONTEXT_END))
            .map(|(context, _)| context.trim())
            .unwrap_or_else(|| prompt.trim());
        Ok(context.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_the_context_block() {
        let prompt = format!("intro\n{CONTEXT_START}\nthe facts\n{CONTEXT_END}\nQuestion: q");
        let answer = EchoGenerationProvider.generate(&prompt, &GenerationOptions::default()).await;
        assert_eq!(answer.unwrap(), "the facts");
    }

    #[tokio::test]
    async fn echo_without_markers_returns_prompt() {
        let answer =
            EchoGenerationProvider.generate("  plain  ", &GenerationOptions::default()).await;
        assert_eq!(answer.unwrap(), "plain");
    }
}
