//! Prompt assembly: retrieved passages plus the question in one template.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{RetrievalResult, SourceRef};
use crate::error::{RagError, Result};

/// Opens the context block of an assembled prompt.
pub const CONTEXT_START: &str = "=== CONTEXT ===";
/// Closes the context block of an assembled prompt.
pub const CONTEXT_END: &str = "=== END CONTEXT ===";

/// Stands in for the context block when retrieval found nothing.
pub const NO_CONTEXT_NOTICE: &str = "No relevant context was found in the document collection.";

const INSTRUCTIONS: &str = "You answer questions about a private document collection. \
Use only the information in the context below. If the context does not contain the answer, \
say that you cannot answer from the available documents. Do not make up facts.";

const NO_CONTEXT_INSTRUCTIONS: &str =
    "Tell the user that the documents do not contain information to answer the question.";

/// A fully assembled generation prompt and the passages it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AugmentedPrompt {
    pub text: String,
    /// Passages included in the context block, in ranked order.
    pub sources: Vec<SourceRef>,
    /// False when the retrieval result was empty.
    pub context_found: bool,
}

/// Merges ranked passages and a question into an [`AugmentedPrompt`].
///
/// Never drops passages to fit: an oversized prompt is an error.
#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler {
    max_prompt_chars: usize,
}

impl PromptAssembler {
    pub fn new(max_prompt_chars: usize) -> Self {
        Self { max_prompt_chars }
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Assemble the prompt for `question` from `result`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ContextTooLarge`] if the prompt has more than
    /// `max_prompt_chars` characters.
    pub fn assemble(&self, question: &str, result: &RetrievalResult) -> Result<AugmentedPrompt> {
        let mut text = String::new();
        text.push_str(INSTRUCTIONS);
        text.push_str("\n\n");
        text.push_str(CONTEXT_START);
        text.push('\n');

        if result.is_empty() {
            text.push_str(NO_CONTEXT_NOTICE);
            text.push('\n');
        } else {
            for (i, hit) in result.iter().enumerate() {
                if i > 0 {
                    text.push('\n');
                }
                // Writing to a String cannot fail.
                let _ = writeln!(
                    text,
                    "[source: {}, chunk {}]\n{}",
                    hit.chunk.document_id, hit.chunk.index, hit.chunk.text
                );
            }
        }

        text.push_str(CONTEXT_END);
        text.push_str("\n\n");
        if result.is_empty() {
            text.push_str(NO_CONTEXT_INSTRUCTIONS);
            text.push_str("\n\n");
        }
        text.push_str("Question: ");
        text.push_str(question);
        text.push_str("\nAnswer:");

        let size = text.chars().count();
        if size > self.max_prompt_chars {
            return Err(RagError::ContextTooLarge { size, limit: self.max_prompt_chars });
        }

        debug!(passages = result.len(), prompt_chars = size, "assembled prompt");
        Ok(AugmentedPrompt { text, sources: result.sources(), context_found: !result.is_empty() })
    }
}
