use std::path::PathBuf;

use embex_index::IndexError;
use embex_llm::LlmError;
use embex_memory::MemoryError;

/// Coarse classification used by callers to pick an outcome or exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AmbiguousId,
    ProviderFailure,
    CorruptRecord,
    InvalidConfiguration,
    Storage,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no embex project found at or above {}", .0.display())]
    NoProject(PathBuf),

    #[error("project already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),
}

impl CoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Index(e) => index_kind(e),
            Self::Memory(e) => memory_kind(e),
            Self::Llm(_) => ErrorKind::ProviderFailure,
            Self::Io(_) => ErrorKind::Io,
            Self::TomlDe(_) | Self::TomlSer(_) | Self::InvalidConfig(_) => {
                ErrorKind::InvalidConfiguration
            }
            Self::NoProject(_) => ErrorKind::NotFound,
            Self::AlreadyInitialized(_) => ErrorKind::InvalidConfiguration,
        }
    }
}

fn index_kind(e: &IndexError) -> ErrorKind {
    match e {
        IndexError::NotFound { .. } => ErrorKind::NotFound,
        IndexError::Llm(_) => ErrorKind::ProviderFailure,
        IndexError::CorruptRecord(_) | IndexError::IntConversion(_) => ErrorKind::CorruptRecord,
        IndexError::InvalidConfig(_) | IndexError::InvalidPath(_) | IndexError::Pattern(_) => {
            ErrorKind::InvalidConfiguration
        }
        IndexError::Io(_) | IndexError::Watcher(_) => ErrorKind::Io,
        IndexError::Sqlite(_)
        | IndexError::Migration(_)
        | IndexError::VectorStore(_)
        | IndexError::Json(_)
        | IndexError::Other(_) => ErrorKind::Storage,
    }
}

fn memory_kind(e: &MemoryError) -> ErrorKind {
    match e {
        MemoryError::NotFound(_) => ErrorKind::NotFound,
        MemoryError::AmbiguousId { .. } => ErrorKind::AmbiguousId,
        MemoryError::Llm(_) => ErrorKind::ProviderFailure,
        MemoryError::Json(_) => ErrorKind::CorruptRecord,
        MemoryError::Sqlite(_)
        | MemoryError::VectorStore(_)
        | MemoryError::Migration(_)
        | MemoryError::Other(_) => ErrorKind::Storage,
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
