use std::fmt::Write;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A retrieved chunk passed to answer generation, carrying its citation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub path: String,
    pub ordinal: usize,
    /// 1-based inclusive line span in the source file.
    pub line_range: (usize, usize),
    pub score: f32,
    pub text: String,
    /// Set when `text` was cut to the character budget.
    pub truncated: bool,
}

/// Text to fixed-length vector. Must be deterministic for identical input
/// within one model configuration.
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or cannot produce an embedding.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &str;
}

/// Prose answer synthesis over already-filtered context.
pub trait AnswerGenerator: Send + Sync {
    /// Answer `question` using only `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    fn generate(
        &self,
        question: &str,
        context: &[ContextChunk],
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &str;
}

const GROUNDED_SYSTEM_PROMPT: &str = "\
You answer questions about a code repository using only the code chunks provided.
Cite the file path for every claim. If the chunks do not contain the answer, say
that the indexed code does not cover it. Never invent code, symbols, or paths
that are absent from the chunks.";

/// Build a chat transcript for generators backed by a chat-completion API.
#[must_use]
pub fn grounded_messages(question: &str, context: &[ContextChunk]) -> Vec<Message> {
    let mut user = String::from("Relevant code chunks:\n\n");
    for chunk in context {
        let _ = writeln!(
            user,
            "### {} (chunk #{}, lines {}-{}, score={:.3})",
            chunk.path, chunk.ordinal, chunk.line_range.0, chunk.line_range.1, chunk.score,
        );
        user.push_str("```\n");
        user.push_str(&chunk.text);
        if !chunk.text.ends_with('\n') {
            user.push('\n');
        }
        user.push_str("```\n\n");
    }
    user.push_str("---\n\nQuestion: ");
    user.push_str(question);

    vec![
        Message {
            role: Role::System,
            content: GROUNDED_SYSTEM_PROMPT.into(),
        },
        Message {
            role: Role::User,
            content: user,
        },
    ]
}
