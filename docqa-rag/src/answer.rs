//! The final pipeline stage: prompt to generated answer.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::SourceRef;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::prompt::AugmentedPrompt;
use crate::retry::{RetryPolicy, with_timeout};

/// Generated text with the provenance of the prompt it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// False when the answer was generated without any retrieved context.
    pub context_found: bool,
}

/// Sends assembled prompts to a [`GenerationProvider`].
///
/// Provider errors propagate to the caller once retries are exhausted.
pub struct Answerer {
    generator: Arc<dyn GenerationProvider>,
    options: GenerationOptions,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl Answerer {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self { generator, options: GenerationOptions::default(), call_timeout, retry }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn answer(&self, prompt: &AugmentedPrompt) -> Result<Answer> {
        let generator = &self.generator;
        let timeout = self.call_timeout;

        let text = self
            .retry
            .run("generate", || {
                with_timeout(timeout, generator.generate(&prompt.text, &self.options), || {
                    RagError::generation(
                        generator.name(),
                        format!("generation timed out after {timeout:?}"),
                    )
                })
            })
            .await
            .inspect_err(|e| error!(provider = generator.name(), error = %e, "generation failed"))?;

        info!(
            provider = generator.name(),
            answer_chars = text.chars().count(),
            context_found = prompt.context_found,
            "answer generated"
        );

        Ok(Answer { text, sources: prompt.sources.clone(), context_found: prompt.context_found })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct ScriptedGenerator {
        failures: usize,
        error: RagError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(self.error.clone());
            }
            Ok(format!("answer to: {}", prompt.len()))
        }
    }

    fn prompt() -> AugmentedPrompt {
        AugmentedPrompt { text: "prompt".into(), sources: Vec::new(), context_found: false }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let generator = Arc::new(ScriptedGenerator {
            failures: 2,
            error: RagError::generation("test", "503"),
            calls: AtomicUsize::new(0),
        });
        let answerer =
            Answerer::new(generator.clone(), Duration::from_secs(1), RetryPolicy::immediate(3));

        let answer = answerer.answer(&prompt()).await.unwrap();
        assert_eq!(answer.text, "answer to: 6");
        assert!(!answer.context_found);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn configuration_errors_propagate_immediately() {
        let generator = Arc::new(ScriptedGenerator {
            failures: usize::MAX,
            error: RagError::InvalidConfig("bad key".into()),
            calls: AtomicUsize::new(0),
        });
        let answerer =
            Answerer::new(generator.clone(), Duration::from_secs(1), RetryPolicy::immediate(3));

        let err = answerer.answer(&prompt()).await.unwrap_err();
        assert_eq!(err, RagError::InvalidConfig("bad key".into()));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out_as_transient() {
        struct Stalled;

        #[async_trait]
        impl GenerationProvider for Stalled {
            async fn generate(&self, _: &str, _: &GenerationOptions) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            }
        }

        let answerer = Answerer::new(Arc::new(Stalled), Duration::from_secs(1), RetryPolicy::none());
        let err = answerer.answer(&prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationService { .. }));
    }
}
