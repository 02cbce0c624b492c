use std::time::Duration;

use embex_index::{
    ChunkStrategy, ChunkerConfig, FileRules, IndexerConfig, RetrievalParams, WatchConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_project_name() -> String {
    "project".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            history: HistoryConfig::default(),
            rag: RagConfig::default(),
            watch: WatchSection::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Seconds before an embedding call counts as a provider failure.
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}

fn default_embed_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    200
}

fn default_overlap() -> usize {
    20
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Oldest versions beyond this count are deleted; 0 keeps all.
    #[serde(default = "default_max_versions")]
    pub max_versions_per_file: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_versions() -> u32 {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions_per_file: default_max_versions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

fn default_top_k() -> usize {
    8
}

fn default_relevance_threshold() -> f32 {
    0.30
}

fn default_max_chunk_chars() -> usize {
    1200
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

/// `[watch]`: which files are eligible and how the watcher schedules work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchSection {
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_exclude_files")]
    pub exclude_files: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Full rescan period while watching; 0 disables it.
    #[serde(default)]
    pub rescan_interval_secs: u64,
}

fn default_include_extensions() -> Vec<String> {
    FileRules::default().include_extensions
}

fn default_exclude_dirs() -> Vec<String> {
    FileRules::default().exclude_dirs
}

fn default_exclude_files() -> Vec<String> {
    FileRules::default().exclude_files
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            include_extensions: default_include_extensions(),
            exclude_dirs: default_exclude_dirs(),
            exclude_files: default_exclude_files(),
            debounce_ms: default_debounce_ms(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            rescan_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,
    #[serde(default = "default_recall_min_score")]
    pub recall_min_score: f32,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_recall_top_k() -> usize {
    5
}

fn default_recall_min_score() -> f32 {
    0.20
}

fn default_list_limit() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_top_k: default_recall_top_k(),
            recall_min_score: default_recall_min_score(),
            list_limit: default_list_limit(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn file_rules(&self) -> FileRules {
        FileRules {
            include_extensions: self.watch.include_extensions.clone(),
            exclude_dirs: self.watch.exclude_dirs.clone(),
            exclude_files: self.watch.exclude_files.clone(),
        }
    }

    #[must_use]
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunker: ChunkerConfig {
                strategy: self.chunking.strategy,
                chunk_size: self.chunking.chunk_size,
                overlap: self.chunking.overlap,
            },
            history_enabled: self.history.enabled,
            max_versions_per_file: self.history.max_versions_per_file,
            workers: self.watch.workers,
            embed_timeout: self.embed_timeout(),
        }
    }

    /// Retrieval parameters from `[rag]`, with per-call overrides.
    #[must_use]
    pub fn retrieval_params(
        &self,
        top_k: Option<usize>,
        threshold: Option<f32>,
        folder_scope: Option<&str>,
    ) -> RetrievalParams {
        RetrievalParams {
            top_k: top_k.unwrap_or(self.rag.top_k),
            threshold: threshold.unwrap_or(self.rag.relevance_threshold),
            folder_scope: folder_scope.map(str::to_owned),
            max_chunk_chars: self.rag.max_chunk_chars,
        }
    }

    #[must_use]
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce: Duration::from_millis(self.watch.debounce_ms),
            queue_capacity: self.watch.queue_capacity,
            workers: self.watch.workers,
            rescan_interval: (self.watch.rescan_interval_secs > 0)
                .then(|| Duration::from_secs(self.watch.rescan_interval_secs)),
        }
    }
}
