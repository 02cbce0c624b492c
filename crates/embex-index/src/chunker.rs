//! Line-oriented chunking: semantic units first, fixed windows as fallback.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};
use crate::structure::{BoundaryRegistry, Unit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[default]
    Structural,
    Fixed,
}

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub strategy: ChunkStrategy,
    /// Window length in lines, also the cap on a single semantic unit (default: 200).
    pub chunk_size: usize,
    /// Lines shared by consecutive windows (default: 20).
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Structural,
            chunk_size: 200,
            overlap: 20,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `chunk_size` is zero or `overlap >= chunk_size`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IndexError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(IndexError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// One contiguous span of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub path: String,
    /// 0-based, contiguous within one chunking pass.
    pub ordinal: usize,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    /// `function`, `class`, `declaration`, `module` or `window`.
    pub kind: String,
    pub name: Option<String>,
    pub language: Option<Lang>,
    pub text: String,
}

/// Splits files using the boundary registry, never failing.
#[derive(Debug, Clone, Default)]
pub struct StructuralChunker {
    registry: BoundaryRegistry,
}

impl StructuralChunker {
    #[must_use]
    pub fn new(registry: BoundaryRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &BoundaryRegistry {
        &self.registry
    }

    /// Chunk `content`. Empty or whitespace-only content yields no chunks.
    ///
    /// An invalid `config` is clamped (size at least 1, overlap below size)
    /// rather than rejected; callers validate configuration up front.
    #[must_use]
    pub fn chunk(&self, path: &str, content: &str, config: &ChunkerConfig) -> Vec<Chunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let size = config.chunk_size.max(1);
        let overlap = config.overlap.min(size - 1);
        let lines = LineIndex::new(content);
        let language = detect_language(Path::new(path));

        let units = match config.strategy {
            ChunkStrategy::Fixed => None,
            ChunkStrategy::Structural => self.registry.detector_for(Path::new(path)).units(content),
        }
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| {
            vec![Unit {
                start: 0,
                end: lines.len(),
                kind: "window",
                name: None,
            }]
        });

        let mut chunks = Vec::new();
        for unit in units {
            let end = unit.end.min(lines.len());
            if unit.start >= end {
                continue;
            }
            for (start, stop) in windows(unit.start, end, size, overlap) {
                let (start_byte, end_byte) = lines.byte_span(start, stop);
                let text = &content[start_byte..end_byte];
                if unit.kind != "window" && text.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    path: path.to_owned(),
                    ordinal: chunks.len(),
                    start_line: start + 1,
                    end_line: stop,
                    start_byte,
                    end_byte,
                    kind: unit.kind.to_owned(),
                    name: unit.name.clone(),
                    language,
                    text: text.to_owned(),
                });
            }
        }
        chunks
    }
}

/// Fixed-window line ranges over `lo..hi`; the last window may be shorter.
fn windows(lo: usize, hi: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let step = size.saturating_sub(overlap).max(1);
    let mut start = lo;
    loop {
        let end = (start + size).min(hi);
        out.push((start, end));
        if end >= hi {
            break;
        }
        start += step;
    }
    out
}

/// Byte offsets of each line (terminator included).
struct LineIndex {
    spans: Vec<(usize, usize)>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut spans = Vec::new();
        let mut offset = 0;
        for line in content.split_inclusive('\n') {
            spans.push((offset, offset + line.len()));
            offset += line.len();
        }
        Self { spans }
    }

    fn len(&self) -> usize {
        self.spans.len()
    }

    /// Byte span covering lines `start..end` (0-based, end exclusive, non-empty).
    fn byte_span(&self, start: usize, end: usize) -> (usize, usize) {
        (self.spans[start].0, self.spans[end - 1].1)
    }
}
