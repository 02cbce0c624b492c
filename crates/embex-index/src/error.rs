//! Error types for embex-index.

use std::num::TryFromIntError;

/// Errors that can occur during indexing, history and retrieval operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading or writing project files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Vector index error.
    #[error("vector store error: {0}")]
    VectorStore(#[from] embex_memory::VectorStoreError),

    /// Embedding or generation provider failed or timed out.
    #[error("LLM error: {0}")]
    Llm(#[from] embex_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown path, or unknown version of a known path.
    #[error("{}", not_found_message(.path, .version))]
    NotFound { path: String, version: Option<u32> },

    /// A stored record could not be read back.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Path escapes the project root or is otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    #[error("{0}")]
    Other(String),
}

fn not_found_message(path: &str, version: &Option<u32>) -> String {
    match version {
        Some(v) => format!("version {v} of {path} not found"),
        None => format!("{path} not found"),
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_with_version() {
        let e = IndexError::NotFound {
            path: "a.py".into(),
            version: Some(3),
        };
        assert_eq!(e.to_string(), "version 3 of a.py not found");
    }

    #[test]
    fn not_found_without_version() {
        let e = IndexError::NotFound {
            path: "a.py".into(),
            version: None,
        };
        assert_eq!(e.to_string(), "a.py not found");
    }
}
