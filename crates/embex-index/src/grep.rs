//! Literal or regex search over indexed chunk text.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::Result;
use crate::store::{CodeStore, StoredChunk};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternMatch {
    pub path: String,
    /// 1-based line in the file.
    pub line: usize,
    pub chunk_lines: (usize, usize),
    pub language: Option<String>,
    pub preview: String,
}

/// Compiled search pattern; both modes ignore case.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    #[must_use]
    pub fn literal(text: &str) -> Self {
        Self::Literal(text.to_lowercase())
    }

    /// # Errors
    ///
    /// Returns `Pattern` if the expression does not compile.
    pub fn regex(expr: &str) -> Result<Self> {
        Ok(Self::Regex(
            RegexBuilder::new(expr).case_insensitive(true).build()?,
        ))
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(needle) => line.to_lowercase().contains(needle.as_str()),
            Self::Regex(re) => re.is_match(line),
        }
    }
}

/// First matching line of each chunk, deduplicated across overlapping
/// chunks, in path/line order, at most `limit` results.
///
/// # Errors
///
/// Returns an error if the chunk store cannot be read.
pub async fn search_pattern(
    store: &CodeStore,
    pattern: &Pattern,
    folder: Option<&str>,
    limit: usize,
) -> Result<Vec<PatternMatch>> {
    let chunks = store.chunks_in(folder).await?;
    Ok(match_chunks(&chunks, pattern, limit))
}

fn match_chunks(chunks: &[StoredChunk], pattern: &Pattern, limit: usize) -> Vec<PatternMatch> {
    let mut seen: HashSet<(&str, usize)> = HashSet::new();
    let mut out = Vec::new();
    for chunk in chunks {
        let Some((offset, line)) = chunk
            .text
            .lines()
            .enumerate()
            .find(|(_, l)| pattern.is_match(l))
        else {
            continue;
        };
        let abs = chunk.start_line + offset;
        if !seen.insert((chunk.path.as_str(), abs)) {
            continue;
        }
        out.push(PatternMatch {
            path: chunk.path.clone(),
            line: abs,
            chunk_lines: (chunk.start_line, chunk.end_line),
            language: chunk.language.clone(),
            preview: line.trim().chars().take(120).collect(),
        });
        if out.len() >= limit {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexError;

    fn chunk(path: &str, start: usize, text: &str) -> StoredChunk {
        StoredChunk {
            id: format!("{path}:{start}"),
            path: path.into(),
            ordinal: 0,
            start_line: start,
            end_line: start + text.lines().count() - 1,
            kind: "window".into(),
            name: None,
            language: Some("python".into()),
            tags: vec![],
            text: text.into(),
        }
    }

    #[test]
    fn literal_is_case_insensitive_with_absolute_lines() {
        let chunks = [chunk("a.py", 10, "x = 1\ndef Login():\n    pass\n")];
        let m = match_chunks(&chunks, &Pattern::literal("login"), 10);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].line, 11);
        assert_eq!(m[0].preview, "def Login():");
    }

    #[test]
    fn regex_matches() {
        let chunks = [chunk("a.py", 1, "def f():\n    return 42\n")];
        let m = match_chunks(&chunks, &Pattern::regex(r"return\s+\d+").unwrap(), 10);
        assert_eq!(m[0].line, 2);
    }

    #[test]
    fn invalid_regex_is_error() {
        assert!(matches!(
            Pattern::regex("(").unwrap_err(),
            IndexError::Pattern(_)
        ));
    }

    #[test]
    fn overlapping_chunks_are_deduplicated() {
        let chunks = [
            chunk("a.py", 1, "a\nneedle\n"),
            chunk("a.py", 2, "needle\nb\n"),
        ];
        assert_eq!(match_chunks(&chunks, &Pattern::literal("needle"), 10).len(), 1);
    }

    #[test]
    fn limit_applies() {
        let chunks = [chunk("a.py", 1, "hit\n"), chunk("b.py", 1, "hit\n")];
        assert_eq!(match_chunks(&chunks, &Pattern::literal("hit"), 1).len(), 1);
    }
}
