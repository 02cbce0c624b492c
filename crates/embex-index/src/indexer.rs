//! Project indexing orchestrator: detect change → snapshot → chunk → embed → store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use embex_llm::{Embedder, LlmError};
use embex_memory::VectorStore;
use futures::StreamExt;
use sqlx::SqlitePool;

use crate::checksum::{ChecksumCache, content_checksum};
use crate::chunker::{Chunk, ChunkerConfig, StructuralChunker};
use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::files::FileFilter;
use crate::history::HistoryStore;
use crate::locks::PathLocks;
use crate::outline::FileOutline;
use crate::store::CodeStore;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    pub history_enabled: bool,
    /// Retained versions per file; 0 keeps everything.
    pub max_versions_per_file: u32,
    /// Files processed concurrently during a full scan.
    pub workers: usize,
    pub embed_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            history_enabled: true,
            max_versions_per_file: 50,
            workers: 4,
            embed_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Checksum matched the cache; no embedding calls were made.
    Unchanged,
    Reindexed { version: u32, chunks: usize },
    /// File vanished from disk; its chunks and checksum record were dropped.
    Removed { chunks: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_reindexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_written: usize,
    /// Files skipped this run; they are retried on the next scan.
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub path: String,
    pub version: u32,
    pub checksum: String,
    pub bytes: usize,
    /// Set when the file was written but could not be re-embedded; the next
    /// scan picks it up.
    pub reindex_warning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderRestoreReport {
    pub restored: Vec<RestoreOutcome>,
    pub skipped: Vec<FileFailure>,
}

/// Orchestrates code indexing over a project tree.
///
/// All work on one path (reindex, removal, restore) runs under that path's
/// lock, so the checksum cache, version log and chunk set of a file change
/// in a fixed order and never interleave.
pub struct CodeIndexer<E: Embedder> {
    files: FileFilter,
    cache: ChecksumCache,
    history: HistoryStore,
    store: CodeStore,
    chunker: StructuralChunker,
    embedder: Arc<E>,
    locks: Arc<PathLocks>,
    config: IndexerConfig,
}

impl<E: Embedder> CodeIndexer<E> {
    /// `pool` must already carry the index schema (see [`crate::open_index_db`]).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the chunker settings or worker count are unusable.
    pub fn new(
        pool: SqlitePool,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<E>,
        files: FileFilter,
        config: IndexerConfig,
    ) -> Result<Self> {
        config.chunker.validate()?;
        if config.workers == 0 {
            return Err(IndexError::InvalidConfig("workers must be at least 1".into()));
        }
        Ok(Self {
            files,
            cache: ChecksumCache::new(pool.clone()),
            history: HistoryStore::new(pool, config.max_versions_per_file),
            store: CodeStore::new(vectors),
            chunker: StructuralChunker::default(),
            embedder,
            locks: Arc::new(PathLocks::new()),
            config,
        })
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: StructuralChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Share `locks` with another indexer over the same stores, so that a
    /// rebuilt indexer and one still held by a running watcher serialise on
    /// the same paths.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<PathLocks>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<PathLocks> {
        &self.locks
    }

    #[must_use]
    pub fn files(&self) -> &FileFilter {
        &self.files
    }

    #[must_use]
    pub fn cache(&self) -> &ChecksumCache {
        &self.cache
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[must_use]
    pub fn store(&self) -> &CodeStore {
        &self.store
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<E> {
        &self.embedder
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Full project scan with incremental change detection.
    ///
    /// Per-file failures are collected in the report; the scan itself only
    /// fails if the project cannot be walked or stale entries cannot be listed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing tracked files fails.
    pub async fn index_project(&self) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        let files = self.files.clone();
        let paths = tokio::task::spawn_blocking(move || files.walk())
            .await
            .map_err(|e| IndexError::Other(format!("walk task failed: {e}")))?;
        tracing::info!(files = paths.len(), "scan started");

        let outcomes: Vec<(String, Result<FileOutcome>)> = futures::stream::iter(paths.clone())
            .map(|rel| async move {
                let outcome = self.index_path(&rel).await;
                (rel, outcome)
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        for (path, outcome) in outcomes {
            report.files_scanned += 1;
            match outcome {
                Ok(FileOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(FileOutcome::Reindexed { chunks, .. }) => {
                    report.files_reindexed += 1;
                    report.chunks_written += chunks;
                }
                Ok(FileOutcome::Removed { .. }) => report.files_removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path, "skipping file: {e}");
                    report.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        let on_disk: BTreeSet<&String> = paths.iter().collect();
        let mut known: BTreeSet<String> = self.cache.tracked_paths().await?.into_iter().collect();
        known.extend(self.store.indexed_files().await?);
        for stale in known.iter().filter(|p| !on_disk.contains(p)) {
            match self.forget_path(stale).await {
                Ok(_) => report.files_removed += 1,
                Err(e) => report.failures.push(FileFailure {
                    path: stale.clone(),
                    error: e.to_string(),
                }),
            }
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            scanned = report.files_scanned,
            reindexed = report.files_reindexed,
            unchanged = report.files_unchanged,
            removed = report.files_removed,
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "scan finished"
        );
        Ok(report)
    }

    /// Bring one project-relative path up to date with the disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the embedder fails or
    /// times out, or a store write fails. The checksum record is only updated
    /// after the new chunk set is stored, so a failed file is retried later.
    pub async fn index_path(&self, rel: &str) -> Result<FileOutcome> {
        let _guard = self.locks.lock(rel).await;
        self.index_locked(rel, self.config.history_enabled).await
    }

    /// Drop chunks and checksum record for `rel`; version history is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails.
    pub async fn forget_path(&self, rel: &str) -> Result<FileOutcome> {
        let _guard = self.locks.lock(rel).await;
        self.forget_locked(rel).await
    }

    /// Write version `version` (or the head) of `rel` back to disk.
    ///
    /// The restored content becomes the head without creating a version, so
    /// the save it causes is seen as unchanged. Works for deleted files.
    ///
    /// # Errors
    ///
    /// `NotFound` if the version does not exist, checked before touching disk.
    /// IO errors if the file cannot be written.
    pub async fn restore_file(&self, rel: &str, version: Option<u32>) -> Result<RestoreOutcome> {
        let abs = self.files.resolve(rel)?;
        let _guard = self.locks.lock(rel).await;

        let number = match version {
            Some(v) => v,
            None => self
                .history
                .head_version(rel)
                .await?
                .ok_or_else(|| IndexError::NotFound {
                    path: rel.to_owned(),
                    version: None,
                })?,
        };
        let snapshot = self.history.version(rel, number).await?;

        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&abs, snapshot.content.as_bytes()).await?;
        self.history.set_head(rel, number).await?;

        let reindex_warning = match self.index_locked(rel, false).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %rel, version = number, "restored but not reindexed: {e}");
                Some(e.to_string())
            }
        };

        tracing::info!(path = %rel, version = number, "file restored");
        Ok(RestoreOutcome {
            path: rel.to_owned(),
            version: number,
            bytes: snapshot.content.len(),
            checksum: snapshot.checksum,
            reindex_warning,
        })
    }

    /// Restore every tracked file under `folder`. Files lacking the requested
    /// version are skipped and reported.
    ///
    /// # Errors
    ///
    /// `NotFound` if no tracked file lives under `folder`.
    pub async fn restore_folder(
        &self,
        folder: &str,
        version: Option<u32>,
    ) -> Result<FolderRestoreReport> {
        let paths = self.history.files_in_folder(folder).await?;
        if paths.is_empty() {
            return Err(IndexError::NotFound {
                path: folder.to_owned(),
                version: None,
            });
        }

        let mut report = FolderRestoreReport::default();
        for path in paths {
            match self.restore_file(&path, version).await {
                Ok(outcome) => report.restored.push(outcome),
                Err(e) => {
                    tracing::debug!(path = %path, "restore skipped: {e}");
                    report.skipped.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Static outline of the file currently on disk at `rel`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, IO errors if it cannot be read.
    pub async fn outline(&self, rel: &str) -> Result<FileOutline> {
        let abs = self.files.resolve(rel)?;
        let bytes = match tokio::fs::read(&abs).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound {
                    path: rel.to_owned(),
                    version: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8_lossy(&bytes);
        Ok(FileOutline::build(rel, &content, self.chunker.registry()))
    }

    /// Remove all chunks and checksum records. History is untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        let n = self.cache.clear().await?;
        tracing::info!(records = n, "index reset");
        Ok(())
    }

    async fn index_locked(&self, rel: &str, take_snapshot: bool) -> Result<FileOutcome> {
        let abs = self.files.resolve(rel)?;
        let bytes = match tokio::fs::read(&abs).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.forget_locked(rel).await;
            }
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let checksum = content_checksum(&content);

        if !self.cache.needs_reindex(rel, &checksum).await {
            tracing::debug!(path = %rel, "unchanged");
            return Ok(FileOutcome::Unchanged);
        }

        let version = if take_snapshot {
            self.history.snapshot(rel, &content).await?.version()
        } else {
            self.history.head_version(rel).await?.unwrap_or(0)
        };

        let chunks = self.chunker.chunk(rel, &content, &self.config.chunker);
        let vectors = self.embed_chunks(&chunks).await?;
        let written = self.store.replace_file_chunks(rel, &chunks, vectors).await?;
        self.cache.record_indexed(rel, &checksum, version).await?;

        tracing::debug!(path = %rel, version, chunks = written, "reindexed");
        Ok(FileOutcome::Reindexed {
            version,
            chunks: written,
        })
    }

    async fn forget_locked(&self, rel: &str) -> Result<FileOutcome> {
        let chunks = self.store.remove_file_chunks(rel).await?;
        if self.cache.forget(rel).await? || chunks > 0 {
            tracing::debug!(path = %rel, chunks, "removed from index");
        }
        Ok(FileOutcome::Removed { chunks })
    }

    /// Embed every chunk before anything is written, so a provider failure
    /// leaves the previous chunk set in place.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let text = contextualize_for_embedding(chunk);
            let vector = tokio::time::timeout(self.config.embed_timeout, self.embedder.embed(&text))
                .await
                .map_err(|_| LlmError::Timeout(self.config.embed_timeout))??;
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileRules;
    use embex_llm::mock::MockProvider;
    use embex_memory::InMemoryVectorStore;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        provider: MockProvider,
        indexer: CodeIndexer<MockProvider>,
    }

    async fn fixture_with(provider: MockProvider, config: IndexerConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::open_index_db(":memory:").await.unwrap();
        let files = FileFilter::new(dir.path(), &FileRules::default()).unwrap();
        let indexer = CodeIndexer::new(
            pool,
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(provider.clone()),
            files,
            config,
        )
        .unwrap();
        Fixture {
            dir,
            provider,
            indexer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockProvider::default(), IndexerConfig::default()).await
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn default_config() {
        let c = IndexerConfig::default();
        assert_eq!(c.chunker.chunk_size, 200);
        assert_eq!(c.max_versions_per_file, 50);
        assert!(c.history_enabled);
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let pool = crate::open_index_db(":memory:").await.unwrap();
        let res = CodeIndexer::new(
            pool,
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            FileFilter::new("/p", &FileRules::default()).unwrap(),
            IndexerConfig {
                workers: 0,
                ..IndexerConfig::default()
            },
        );
        assert!(matches!(res, Err(IndexError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn empty_file_issues_no_embed_calls() {
        let f = fixture().await;
        write(f.dir.path(), "empty.py", "");
        let out = f.indexer.index_path("empty.py").await.unwrap();
        assert_eq!(out, FileOutcome::Reindexed { version: 1, chunks: 0 });
        assert_eq!(f.provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn checksum_version_tracks_history_head() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "x = 1\n");
        f.indexer.index_path("a.py").await.unwrap();
        write(f.dir.path(), "a.py", "x = 2\n");
        f.indexer.index_path("a.py").await.unwrap();

        let rec = f.indexer.cache().get("a.py").await.unwrap().unwrap();
        let latest = f.indexer.history().latest_version("a.py").await.unwrap();
        assert_eq!(Some(rec.version), latest);
        assert_eq!(rec.version, 2);
    }

    #[tokio::test]
    async fn embed_failure_keeps_previous_state() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "x = 1\n");
        f.indexer.index_path("a.py").await.unwrap();
        let before = f.indexer.cache().get("a.py").await.unwrap().unwrap();

        write(f.dir.path(), "a.py", "x = 2\n");
        f.provider.set_fail_embed(true);
        assert!(f.indexer.index_path("a.py").await.is_err());

        let after = f.indexer.cache().get("a.py").await.unwrap().unwrap();
        assert_eq!(before, after);
        let chunks = f.indexer.store().file_chunks("a.py").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "x = 1\n");

        f.provider.set_fail_embed(false);
        let out = f.indexer.index_path("a.py").await.unwrap();
        assert!(matches!(out, FileOutcome::Reindexed { version: 2, .. }));
        assert_eq!(f.indexer.history().list_versions("a.py").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn embed_timeout_is_provider_failure() {
        let f = fixture_with(
            MockProvider::default().with_delay(200),
            IndexerConfig {
                embed_timeout: Duration::from_millis(10),
                ..IndexerConfig::default()
            },
        )
        .await;
        write(f.dir.path(), "a.py", "x = 1\n");
        assert!(matches!(
            f.indexer.index_path("a.py").await.unwrap_err(),
            IndexError::Llm(LlmError::Timeout(_))
        ));
        assert!(f.indexer.cache().get("a.py").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_reports_failures_and_continues() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "a = 1\n");
        write(f.dir.path(), "b.py", "b = 2\n");
        f.provider.set_fail_embed(true);
        let report = f.indexer.index_project().await.unwrap();
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.failures.len(), 2);

        f.provider.set_fail_embed(false);
        let report = f.indexer.index_project().await.unwrap();
        assert_eq!(report.files_reindexed, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn deleted_file_drops_chunks_keeps_history() {
        let f = fixture().await;
        write(f.dir.path(), "src/a.py", "a = 1\n");
        f.indexer.index_project().await.unwrap();
        std::fs::remove_file(f.dir.path().join("src/a.py")).unwrap();

        let report = f.indexer.index_project().await.unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(f.indexer.store().chunk_count("src/a.py").await.unwrap(), 0);
        assert!(f.indexer.cache().get("src/a.py").await.unwrap().is_none());
        assert_eq!(
            f.indexer.history().list_versions("src/a.py").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn vanished_file_is_removed_on_single_path_update() {
        let f = fixture().await;
        write(f.dir.path(), "src/gone.py", "gone = 1\n");
        f.indexer.index_path("src/gone.py").await.unwrap();
        std::fs::remove_file(f.dir.path().join("src/gone.py")).unwrap();

        let out = f.indexer.index_path("src/gone.py").await.unwrap();
        assert_eq!(out, FileOutcome::Removed { chunks: 1 });
        assert_eq!(f.indexer.store().chunk_count("src/gone.py").await.unwrap(), 0);
        assert!(f.indexer.cache().get("src/gone.py").await.unwrap().is_none());
        let versions = f.indexer.history().list_versions("src/gone.py").await.unwrap();
        assert_eq!(versions.len(), 1);

        // Removing again is harmless.
        assert_eq!(
            f.indexer.index_path("src/gone.py").await.unwrap(),
            FileOutcome::Removed { chunks: 0 }
        );
    }

    #[tokio::test]
    async fn shared_locks_serialise_across_indexers() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "a = 1\n");
        let pool = crate::open_index_db(":memory:").await.unwrap();
        let rebuilt = CodeIndexer::new(
            pool,
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(f.provider.clone()),
            f.indexer.files().clone(),
            IndexerConfig::default(),
        )
        .unwrap()
        .with_locks(Arc::clone(f.indexer.locks()));

        let guard = f.indexer.locks().lock("a.py").await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), rebuilt.index_path("a.py")).await;
        assert!(blocked.is_err());
        drop(guard);
        assert!(matches!(
            rebuilt.index_path("a.py").await.unwrap(),
            FileOutcome::Reindexed { .. }
        ));
    }

    #[tokio::test]
    async fn restore_missing_version_leaves_disk_alone() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "current\n");
        f.indexer.index_path("a.py").await.unwrap();
        assert!(matches!(
            f.indexer.restore_file("a.py", Some(7)).await.unwrap_err(),
            IndexError::NotFound { version: Some(7), .. }
        ));
        assert_eq!(
            std::fs::read_to_string(f.dir.path().join("a.py")).unwrap(),
            "current\n"
        );
    }

    #[tokio::test]
    async fn restore_reindexes_without_new_version() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "one = 1\n");
        f.indexer.index_path("a.py").await.unwrap();
        write(f.dir.path(), "a.py", "two = 2\n");
        f.indexer.index_path("a.py").await.unwrap();

        let out = f.indexer.restore_file("a.py", Some(1)).await.unwrap();
        assert_eq!(out.version, 1);
        assert!(out.reindex_warning.is_none());

        assert_eq!(f.indexer.history().list_versions("a.py").await.unwrap().len(), 2);
        assert_eq!(f.indexer.history().head_version("a.py").await.unwrap(), Some(1));
        let chunks = f.indexer.store().file_chunks("a.py").await.unwrap();
        assert_eq!(chunks[0].text, "one = 1\n");

        // The save caused by the restore is a no-op for the watcher path.
        assert_eq!(
            f.indexer.index_path("a.py").await.unwrap(),
            FileOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn restore_with_failing_embedder_still_writes() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "one = 1\n");
        f.indexer.index_path("a.py").await.unwrap();
        write(f.dir.path(), "a.py", "two = 2\n");
        f.indexer.index_path("a.py").await.unwrap();

        f.provider.set_fail_embed(true);
        let out = f.indexer.restore_file("a.py", Some(1)).await.unwrap();
        assert!(out.reindex_warning.is_some());
        assert_eq!(
            std::fs::read_to_string(f.dir.path().join("a.py")).unwrap(),
            "one = 1\n"
        );

        // A later pass snapshots against the restored head: no new version.
        f.provider.set_fail_embed(false);
        f.indexer.index_path("a.py").await.unwrap();
        assert_eq!(f.indexer.history().list_versions("a.py").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn restore_folder_skips_missing_versions() {
        let f = fixture().await;
        write(f.dir.path(), "src/a.py", "a1\n");
        write(f.dir.path(), "src/b.py", "b1\n");
        f.indexer.index_project().await.unwrap();
        write(f.dir.path(), "src/a.py", "a2\n");
        f.indexer.index_project().await.unwrap();

        let report = f.indexer.restore_folder("src", Some(2)).await.unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].path, "src/a.py");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "src/b.py");

        assert!(matches!(
            f.indexer.restore_folder("nowhere", None).await.unwrap_err(),
            IndexError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn history_disabled_records_version_zero() {
        let f = fixture_with(
            MockProvider::default(),
            IndexerConfig {
                history_enabled: false,
                ..IndexerConfig::default()
            },
        )
        .await;
        write(f.dir.path(), "a.py", "x\n");
        let out = f.indexer.index_path("a.py").await.unwrap();
        assert_eq!(out, FileOutcome::Reindexed { version: 0, chunks: 1 });
        assert!(!f.indexer.history().is_tracked("a.py").await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_index_but_not_history() {
        let f = fixture().await;
        write(f.dir.path(), "a.py", "x\n");
        f.indexer.index_project().await.unwrap();
        f.indexer.reset().await.unwrap();
        assert_eq!(f.indexer.store().total_chunks().await.unwrap(), 0);
        assert_eq!(f.indexer.cache().count().await.unwrap(), 0);
        assert!(f.indexer.history().is_tracked("a.py").await.unwrap());
    }
}
