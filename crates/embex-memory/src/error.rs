#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("vector store error: {0}")]
    VectorStore(#[from] crate::vector_store::VectorStoreError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("LLM error: {0}")]
    Llm(#[from] embex_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("id prefix {prefix:?} matches {matches} memories")]
    AmbiguousId { prefix: String, matches: usize },

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_id_display() {
        let err = MemoryError::AmbiguousId {
            prefix: "ab".into(),
            matches: 3,
        };
        assert_eq!(err.to_string(), "id prefix \"ab\" matches 3 memories");
    }

    #[test]
    fn llm_error_converts() {
        let err: MemoryError = embex_llm::LlmError::Unavailable.into();
        assert!(matches!(err, MemoryError::Llm(_)));
    }
}
