use std::str::FromStr;

use embex_index::ChunkStrategy;

use super::Config;

/// Parse `key` if set; an unparsable value is logged and ignored.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    match v.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let v = std::env::var(key).ok()?;
    Some(
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EMBEX_PROJECT_NAME") {
            self.project_name = v;
        }
        if let Ok(v) = std::env::var("EMBEX_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(secs) = env_parse("EMBEX_EMBEDDING_TIMEOUT") {
            self.embedding.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("EMBEX_CHUNK_STRATEGY") {
            match v.trim().to_ascii_lowercase().as_str() {
                "structural" => self.chunking.strategy = ChunkStrategy::Structural,
                "fixed" => self.chunking.strategy = ChunkStrategy::Fixed,
                _ => tracing::warn!("ignoring invalid EMBEX_CHUNK_STRATEGY value: {v}"),
            }
        }
        if let Some(size) = env_parse("EMBEX_CHUNK_SIZE") {
            self.chunking.chunk_size = size;
        }
        if let Some(overlap) = env_parse("EMBEX_CHUNK_OVERLAP") {
            self.chunking.overlap = overlap;
        }
        if let Some(enabled) = env_parse("EMBEX_HISTORY_ENABLED") {
            self.history.enabled = enabled;
        }
        if let Some(max) = env_parse("EMBEX_HISTORY_MAX_VERSIONS") {
            self.history.max_versions_per_file = max;
        }
        if let Some(top_k) = env_parse("EMBEX_RAG_TOP_K") {
            self.rag.top_k = top_k;
        }
        if let Some(threshold) = env_parse("EMBEX_RAG_RELEVANCE_THRESHOLD") {
            self.rag.relevance_threshold = threshold;
        }
        if let Some(chars) = env_parse("EMBEX_RAG_MAX_CHUNK_CHARS") {
            self.rag.max_chunk_chars = chars;
        }
        if let Some(exts) = env_list("EMBEX_WATCH_INCLUDE_EXTENSIONS") {
            self.watch.include_extensions = exts;
        }
        if let Some(dirs) = env_list("EMBEX_WATCH_EXCLUDE_DIRS") {
            self.watch.exclude_dirs = dirs;
        }
        if let Some(ms) = env_parse("EMBEX_WATCH_DEBOUNCE_MS") {
            self.watch.debounce_ms = ms;
        }
        if let Some(workers) = env_parse("EMBEX_WATCH_WORKERS") {
            self.watch.workers = workers;
        }
        if let Some(secs) = env_parse("EMBEX_WATCH_RESCAN_INTERVAL") {
            self.watch.rescan_interval_secs = secs;
        }
        if let Some(top_k) = env_parse("EMBEX_MEMORY_RECALL_TOP_K") {
            self.memory.recall_top_k = top_k;
        }
        if let Some(score) = env_parse("EMBEX_MEMORY_RECALL_MIN_SCORE") {
            self.memory.recall_min_score = score;
        }
    }
}
