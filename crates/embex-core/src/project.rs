//! The project handle: one object owning a project's stores and collaborators.
//!
//! Nothing here is global. Every operation goes through a [`Project`] opened
//! on a root directory, so several projects can live in one process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use embex_index::history::folder_prefix;
use embex_index::{
    CodeIndexer, ContextRetriever, FileDiff, FileFilter, FileOutcome, FileOutline,
    FolderRestoreReport, IndexReport, IndexWatcher, Pattern, PatternMatch, RestoreOutcome,
    RetrievedContext, SimilarFile, Version, VersionInfo, open_index_db,
};
use embex_llm::{AnswerGenerator, ContextChunk, Embedder};
use embex_memory::{
    MemoryEntry, MemoryId, MemoryStore, RecalledMemory, SqliteVectorStore, VectorStore,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::{self, Config, INDEX_DB, MEMORY_DB};
use crate::error::{CoreError, Result};
use crate::status::{ProjectStatus, db_size};

const MOST_CHANGED_SHOWN: usize = 5;

/// Result of [`Project::ask`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AskOutcome {
    Answered {
        answer: String,
        sources: Vec<ContextChunk>,
        total_retrieved: usize,
    },
    /// Nothing cleared the relevance threshold; the generator was not called.
    NoRelevantContext { total_retrieved: usize },
}

/// Pattern search mode for [`Project::search_pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    Literal,
    Regex,
}

/// An initialised embex project rooted at a directory.
///
/// `P` supplies both embeddings and answer generation.
pub struct Project<P: Embedder + AnswerGenerator + 'static> {
    root: PathBuf,
    config: Config,
    provider: Arc<P>,
    index_pool: SqlitePool,
    vectors: Arc<dyn VectorStore>,
    indexer: Arc<CodeIndexer<P>>,
    retriever: ContextRetriever<P>,
    memory: MemoryStore<P>,
}

impl<P: Embedder + AnswerGenerator + 'static> Project<P> {
    /// Create `.embex/` under `root` with a default configuration and open it.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if a configuration exists, otherwise any error
    /// from [`Project::open`].
    pub async fn init(root: &Path, provider: Arc<P>) -> Result<Self> {
        let path = config::config_path(root);
        if path.exists() {
            return Err(CoreError::AlreadyInitialized(root.to_path_buf()));
        }
        let mut config = Config::default();
        if let Some(name) = root.file_name().and_then(|n| n.to_str()) {
            config.project_name = name.to_owned();
        }
        config.save(&path)?;
        tracing::info!(root = %root.display(), "project initialized");
        Self::open(root, provider).await
    }

    /// Open the project whose configuration lives at `root/.embex/embex.toml`.
    ///
    /// # Errors
    ///
    /// `NoProject` if `root` holds no configuration; configuration, storage
    /// or migration errors otherwise.
    pub async fn open(root: &Path, provider: Arc<P>) -> Result<Self> {
        let path = config::config_path(root);
        if !path.is_file() {
            return Err(CoreError::NoProject(root.to_path_buf()));
        }
        let config = Config::load(&path)?;
        Self::with_config(root, config, provider).await
    }

    /// Open the nearest project at or above `start`.
    ///
    /// # Errors
    ///
    /// `NoProject` if no ancestor is a project root.
    pub async fn discover(start: &Path, provider: Arc<P>) -> Result<Self> {
        let root = config::find_project_root(start)
            .ok_or_else(|| CoreError::NoProject(start.to_path_buf()))?;
        Self::open(&root, provider).await
    }

    /// Open the stores under `root/.embex` using an already loaded `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a store cannot be opened.
    pub async fn with_config(root: &Path, config: Config, provider: Arc<P>) -> Result<Self> {
        config.validate()?;
        let root = std::fs::canonicalize(root)?;
        let state = config::state_dir(&root);
        tokio::fs::create_dir_all(&state).await?;

        let index_pool = open_index_db(&state.join(INDEX_DB).to_string_lossy()).await?;
        let vectors: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::new(index_pool.clone())
                .await
                .map_err(embex_index::IndexError::from)?,
        );
        let indexer = build_indexer(&root, &config, &index_pool, &vectors, &provider)?;
        let retriever = ContextRetriever::new(indexer.store().clone(), Arc::clone(&provider))
            .with_embed_timeout(config.embed_timeout());
        let memory_db = state.join(MEMORY_DB);
        let memory = MemoryStore::open(&memory_db.to_string_lossy(), Arc::clone(&provider))
            .await?
            .with_embed_timeout(config.embed_timeout());

        tracing::debug!(root = %root.display(), "project opened");
        Ok(Self {
            root,
            config,
            provider,
            index_pool,
            vectors,
            indexer: Arc::new(indexer),
            retriever,
            memory,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn indexer(&self) -> &Arc<CodeIndexer<P>> {
        &self.indexer
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryStore<P> {
        &self.memory
    }

    /// Normalise a user-supplied path to the project-relative form used as
    /// the key in every store.
    ///
    /// # Errors
    ///
    /// `InvalidPath` if an absolute path lies outside the project.
    pub fn relative_path(&self, path: &str) -> Result<String> {
        let p = Path::new(path);
        if p.is_absolute() {
            return Ok(self.indexer.files().relative(p)?);
        }
        Ok(FileFilter::normalize(path)?)
    }

    /// Incremental scan of the whole project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project cannot be walked; per-file failures
    /// are reported inside the [`IndexReport`].
    pub async fn scan(&self) -> Result<IndexReport> {
        Ok(self.indexer.index_project().await?)
    }

    /// Reindex a single file, or drop it if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be indexed.
    pub async fn scan_file(&self, path: &str) -> Result<FileOutcome> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.index_path(&rel).await?)
    }

    /// Start watching the project root. Stop it with [`IndexWatcher::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file-system watcher cannot be started.
    pub fn watch(&self) -> Result<IndexWatcher> {
        Ok(IndexWatcher::start(
            Arc::clone(&self.indexer),
            &self.config.watch_config(),
        )?)
    }

    /// Drop every chunk and checksum record; the next scan reindexes all
    /// files. Version history is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails.
    pub async fn reset_index(&self) -> Result<()> {
        Ok(self.indexer.reset().await?)
    }

    /// Persist an extra excluded directory and apply it to later scans.
    /// Returns false if it was already excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be saved.
    pub fn exclude_dir(&mut self, dir: &str) -> Result<bool> {
        let mut config = self.config.clone();
        if !config.add_excluded_dir(dir) {
            return Ok(false);
        }
        self.apply_config(config)?;
        Ok(true)
    }

    /// Persist an extra excluded filename glob and apply it to later scans.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad glob, or an error saving the configuration.
    pub fn exclude_pattern(&mut self, pattern: &str) -> Result<bool> {
        let mut config = self.config.clone();
        if !config.add_excluded_pattern(pattern)? {
            return Ok(false);
        }
        self.apply_config(config)?;
        Ok(true)
    }

    /// Watchers already running keep the rules they started with, but share
    /// the per-path locks of the rebuilt indexer.
    fn apply_config(&mut self, config: Config) -> Result<()> {
        let indexer = build_indexer(
            &self.root,
            &config,
            &self.index_pool,
            &self.vectors,
            &self.provider,
        )?
        .with_locks(Arc::clone(self.indexer.locks()));
        config.save(&config::config_path(&self.root))?;
        self.indexer = Arc::new(indexer);
        self.config = config;
        Ok(())
    }

    /// Relevance-filtered context for `text`, without calling the generator.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad parameters, or a provider/store error.
    pub async fn query(
        &self,
        text: &str,
        top_k: Option<usize>,
        folder_scope: Option<&str>,
    ) -> Result<RetrievedContext> {
        let params = self.config.retrieval_params(top_k, None, folder_scope);
        Ok(self.retriever.retrieve(text, &params).await?)
    }

    /// Retrieve, filter, then answer from the surviving chunks only.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad parameters, or a provider/store error.
    pub async fn ask(
        &self,
        question: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
        folder_scope: Option<&str>,
    ) -> Result<AskOutcome> {
        let params = self.config.retrieval_params(top_k, threshold, folder_scope);
        let ctx = self.retriever.retrieve(question, &params).await?;
        if ctx.is_empty() {
            tracing::info!(
                retrieved = ctx.total_retrieved,
                "no chunk above relevance threshold"
            );
            return Ok(AskOutcome::NoRelevantContext {
                total_retrieved: ctx.total_retrieved,
            });
        }
        let answer = self.provider.generate(question, &ctx.chunks).await?;
        Ok(AskOutcome::Answered {
            answer,
            sources: ctx.chunks,
            total_retrieved: ctx.total_retrieved,
        })
    }

    /// Imports, top-level declarations and docs of `path` as it is on disk.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist.
    pub async fn outline(&self, path: &str) -> Result<FileOutline> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.outline(&rel).await?)
    }

    /// Files most similar to `path`, one entry per file.
    ///
    /// # Errors
    ///
    /// `NotFound` if `path` is not indexed.
    pub async fn similar_files(&self, path: &str, top_k: usize) -> Result<Vec<SimilarFile>> {
        let rel = self.relative_path(path)?;
        Ok(self.retriever.similar_to(&rel, top_k).await?)
    }

    /// Literal or regex search over indexed code.
    ///
    /// # Errors
    ///
    /// `InvalidConfig`-class error for an invalid regex, or a store error.
    pub async fn search_pattern(
        &self,
        pattern: &str,
        mode: PatternMode,
        folder: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PatternMatch>> {
        let pattern = match mode {
            PatternMode::Literal => Pattern::literal(pattern),
            PatternMode::Regex => Pattern::regex(pattern)?,
        };
        Ok(embex_index::search_pattern(self.indexer.store(), &pattern, folder, limit).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if the path has no history.
    pub async fn list_versions(&self, path: &str) -> Result<Vec<Version>> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.history().list_versions(&rel).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if the version does not exist.
    pub async fn get_version(&self, path: &str, version: u32) -> Result<Version> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.history().version(&rel, version).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if either version does not exist.
    pub async fn diff(&self, path: &str, from: u32, to: u32) -> Result<FileDiff> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.history().diff(&rel, from, to).await?)
    }

    /// Write a stored version back to disk; `None` means the head version.
    /// The write does not add a version.
    ///
    /// # Errors
    ///
    /// `NotFound` before touching disk if the version does not exist.
    pub async fn restore(&self, path: &str, version: Option<u32>) -> Result<RestoreOutcome> {
        let rel = self.relative_path(path)?;
        Ok(self.indexer.restore_file(&rel, version).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if no tracked file lives under `folder`.
    pub async fn restore_folder(
        &self,
        folder: &str,
        version: Option<u32>,
    ) -> Result<FolderRestoreReport> {
        let rel = if folder_prefix(folder).is_empty() {
            String::new()
        } else {
            self.relative_path(folder)?
        };
        Ok(self.indexer.restore_folder(&rel, version).await?)
    }

    /// Newest versions across all files.
    ///
    /// # Errors
    ///
    /// Returns an error if the history store cannot be read.
    pub async fn recent_changes(&self, limit: usize) -> Result<Vec<VersionInfo>> {
        Ok(self.indexer.history().recent_versions(limit).await?)
    }

    /// # Errors
    ///
    /// Returns a provider error if the text cannot be embedded; nothing is stored.
    pub async fn remember(
        &self,
        text: &str,
        tags: &[String],
        agent: Option<&str>,
    ) -> Result<MemoryEntry> {
        Ok(self.memory.add(text, tags, agent).await?)
    }

    /// # Errors
    ///
    /// Returns a provider error if the query cannot be embedded.
    pub async fn recall(
        &self,
        text: &str,
        top_k: Option<usize>,
        agent: Option<&str>,
    ) -> Result<Vec<RecalledMemory>> {
        let top_k = top_k.unwrap_or(self.config.memory.recall_top_k);
        Ok(self
            .memory
            .recall(text, top_k, agent, self.config.memory.recall_min_score)
            .await?)
    }

    /// # Errors
    ///
    /// Returns an error if the memory store cannot be read.
    pub async fn list_memories(
        &self,
        agent: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryEntry>> {
        let limit = limit.unwrap_or(self.config.memory.list_limit);
        Ok(self.memory.list(agent, limit).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if nothing matches `id_prefix`, `AmbiguousId` if several do.
    pub async fn forget(&self, id_prefix: &str) -> Result<MemoryId> {
        Ok(self.memory.forget(id_prefix).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the memory store cannot be written.
    pub async fn clear_memories(&self, agent: Option<&str>) -> Result<u64> {
        Ok(self.memory.clear(agent).await?)
    }

    /// # Errors
    ///
    /// Returns an error if any store cannot be read.
    pub async fn status(&self) -> Result<ProjectStatus> {
        let state = config::state_dir(&self.root);
        Ok(ProjectStatus {
            project_name: self.config.project_name.clone(),
            root: self.root.clone(),
            embedding_model: self.config.embedding.model.clone(),
            tracked_files: self.indexer.cache().count().await?,
            indexed_files: self.indexer.store().indexed_files().await?.len(),
            total_chunks: self.indexer.store().total_chunks().await?,
            history: self.indexer.history().stats(MOST_CHANGED_SHOWN).await?,
            memories: self.memory.count(None).await?,
            index_db_bytes: db_size(&state.join(INDEX_DB)),
            memory_db_bytes: db_size(&state.join(MEMORY_DB)),
        })
    }
}

fn build_indexer<P: Embedder>(
    root: &Path,
    config: &Config,
    pool: &SqlitePool,
    vectors: &Arc<dyn VectorStore>,
    provider: &Arc<P>,
) -> Result<CodeIndexer<P>> {
    let files = FileFilter::new(root, &config.file_rules())?;
    Ok(CodeIndexer::new(
        pool.clone(),
        Arc::clone(vectors),
        Arc::clone(provider),
        files,
        config.indexer_config(),
    )?)
}
