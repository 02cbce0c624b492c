//! Point-in-time summary of a project's stores.

use std::fmt;
use std::path::{Path, PathBuf};

use embex_index::HistoryStats;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStatus {
    pub project_name: String,
    pub root: PathBuf,
    pub embedding_model: String,
    /// Files with a checksum record.
    pub tracked_files: u64,
    /// Files with at least one chunk in the vector index.
    pub indexed_files: usize,
    pub total_chunks: u64,
    pub history: HistoryStats,
    pub memories: u64,
    pub index_db_bytes: u64,
    pub memory_db_bytes: u64,
}

/// Size of an `SQLite` database including its WAL and shared-memory files.
pub(crate) fn db_size(path: &Path) -> u64 {
    ["", "-wal", "-shm"]
        .iter()
        .filter_map(|suffix| {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            std::fs::metadata(PathBuf::from(name)).ok()
        })
        .map(|m| m.len())
        .sum()
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "project   {} ({})", self.project_name, self.root.display())?;
        writeln!(f, "model     {}", self.embedding_model)?;
        writeln!(
            f,
            "index     {} files tracked, {} indexed, {} chunks, {}",
            self.tracked_files,
            self.indexed_files,
            self.total_chunks,
            human_bytes(self.index_db_bytes)
        )?;
        writeln!(
            f,
            "history   {} files, {} versions, {} stored",
            self.history.files,
            self.history.versions,
            human_bytes(self.history.total_bytes)
        )?;
        for (path, versions) in &self.history.most_changed {
            writeln!(f, "          {versions:>4}  {path}")?;
        }
        write!(
            f,
            "memory    {} entries, {}",
            self.memories,
            human_bytes(self.memory_db_bytes)
        )
    }
}
