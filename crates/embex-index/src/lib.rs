//! Incremental code indexing, per-file version history and filtered retrieval.
//!
//! Files are checked against a checksum ledger, snapshotted into an
//! append-only version log, split into structural chunks, embedded and stored
//! in a vector collection. Queries run through a retrieve → threshold →
//! truncate pipeline that yields cited context for an answer generator.

pub mod checksum;
pub mod chunker;
pub mod context;
pub mod diff;
pub mod error;
pub mod files;
pub mod grep;
pub mod history;
pub mod indexer;
pub mod languages;
pub mod locks;
pub mod outline;
pub mod retriever;
pub mod store;
pub mod structure;
pub(crate) mod tagger;
pub mod watcher;

pub use checksum::{ChecksumCache, FileRecord, content_checksum};
pub use chunker::{Chunk, ChunkStrategy, ChunkerConfig, StructuralChunker};
pub use diff::{DiffLine, DiffLineKind, FileDiff};
pub use error::{IndexError, Result};
pub use files::{FileFilter, FileRules};
pub use grep::{Pattern, PatternMatch, search_pattern};
pub use history::{HistoryStats, HistoryStore, SnapshotOutcome, Version, VersionInfo};
pub use indexer::{
    CodeIndexer, FileFailure, FileOutcome, FolderRestoreReport, IndexReport, IndexerConfig,
    RestoreOutcome,
};
pub use outline::{FileOutline, OutlineEntry};
pub use retriever::{ContextRetriever, RetrievalParams, RetrievedContext, SimilarFile};
pub use store::{CODE_COLLECTION, CodeStore, SearchHit, StoredChunk};
pub use watcher::{IndexWatcher, WatchConfig};

/// Open the project index database and apply its schema.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn open_index_db(path: &str) -> Result<sqlx::SqlitePool> {
    let pool = embex_memory::sqlite::connect(path).await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}
