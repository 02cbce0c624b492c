mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use embex_index::IndexError;
use embex_index::files::STATE_DIR;

use crate::error::{CoreError, Result};

pub const CONFIG_FILE: &str = "embex.toml";
pub const INDEX_DB: &str = "index.db";
pub const MEMORY_DB: &str = "memory.db";

/// `<root>/.embex`
#[must_use]
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

/// `<root>/.embex/embex.toml`
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    state_dir(root).join(CONFIG_FILE)
}

/// Nearest ancestor of `start` (inclusive) holding `.embex/embex.toml`.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| config_path(dir).is_file())
        .map(Path::to_path_buf)
}

fn in_section(section: &str, e: IndexError) -> CoreError {
    match e {
        IndexError::InvalidConfig(msg) => CoreError::InvalidConfig(format!("[{section}] {msg}")),
        other => other.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// the resulting values fail [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject malformed thresholds and sizes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        self.indexer_config()
            .chunker
            .validate()
            .map_err(|e| in_section("chunking", e))?;
        self.retrieval_params(None, None, None)
            .validate()
            .map_err(|e| in_section("rag", e))?;
        if !(0.0..=1.0).contains(&self.memory.recall_min_score) {
            return Err(CoreError::InvalidConfig(format!(
                "[memory] recall_min_score {} is outside [0, 1]",
                self.memory.recall_min_score
            )));
        }
        if self.memory.recall_top_k == 0 || self.memory.list_limit == 0 {
            return Err(CoreError::InvalidConfig(
                "[memory] recall_top_k and list_limit must be at least 1".into(),
            ));
        }
        if self.watch.workers == 0 || self.watch.queue_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "[watch] workers and queue_capacity must be at least 1".into(),
            ));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "[embedding] timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Add a directory name to `[watch] exclude_dirs`. Returns false if it
    /// was already listed.
    pub fn add_excluded_dir(&mut self, dir: &str) -> bool {
        let dir = dir.trim().trim_matches('/');
        if dir.is_empty() || self.watch.exclude_dirs.iter().any(|d| d == dir) {
            return false;
        }
        self.watch.exclude_dirs.push(dir.to_owned());
        true
    }

    /// Add a filename glob to `[watch] exclude_files`. Returns false if it was
    /// already listed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `pattern` is not a valid glob.
    pub fn add_excluded_pattern(&mut self, pattern: &str) -> Result<bool> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(false);
        }
        glob::Pattern::new(pattern)
            .map_err(|e| CoreError::InvalidConfig(format!("bad exclude glob {pattern:?}: {e}")))?;
        if self.watch.exclude_files.iter().any(|p| p == pattern) {
            return Ok(false);
        }
        self.watch.exclude_files.push(pattern.to_owned());
        Ok(true)
    }
}
