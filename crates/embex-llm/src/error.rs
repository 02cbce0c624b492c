use std::time::Duration;

/// Failures reported by an embedding or answer-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable")]
    Unavailable,

    #[error("rate limited")]
    RateLimited,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
