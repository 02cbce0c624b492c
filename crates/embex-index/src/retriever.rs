//! Retrieve → filter → assemble: the grounded context handed to an answer generator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use embex_llm::{ContextChunk, Embedder, LlmError};
use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::store::{CodeStore, SearchHit};

/// Leading characters of a file embedded by [`ContextRetriever::similar_to`].
const SIMILAR_LEAD_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Candidates fetched from the index before filtering.
    pub top_k: usize,
    /// Minimum similarity in `[0, 1]` for a candidate to survive.
    pub threshold: f32,
    /// Directory prefix; `None` searches the whole project.
    pub folder_scope: Option<String>,
    /// Per-chunk character budget.
    pub max_chunk_chars: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 8,
            threshold: 0.30,
            folder_scope: None,
            max_chunk_chars: 1200,
        }
    }
}

impl RetrievalParams {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero `top_k` or `max_chunk_chars`, or a
    /// threshold outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(IndexError::InvalidConfig("top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(IndexError::InvalidConfig(format!(
                "relevance threshold {} is outside [0, 1]",
                self.threshold
            )));
        }
        if self.max_chunk_chars == 0 {
            return Err(IndexError::InvalidConfig(
                "max_chunk_chars must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Filtered, truncated, ordered context. An empty `chunks` is a valid
/// "nothing relevant" outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub chunks: Vec<ContextChunk>,
    pub total_retrieved: usize,
    pub total_relevant: usize,
}

impl RetrievedContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarFile {
    pub path: String,
    pub score: f32,
    pub language: Option<String>,
    pub preview: String,
}

pub struct ContextRetriever<E: Embedder> {
    store: CodeStore,
    embedder: Arc<E>,
    embed_timeout: Duration,
}

impl<E: Embedder> ContextRetriever<E> {
    #[must_use]
    pub fn new(store: CodeStore, embedder: Arc<E>) -> Self {
        Self {
            store,
            embedder,
            embed_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Run the retrieval filter for `query`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad parameters, a provider error if the query
    /// cannot be embedded, or a store error.
    pub async fn retrieve(&self, query: &str, params: &RetrievalParams) -> Result<RetrievedContext> {
        params.validate()?;
        let hits = self
            .search(query, params.top_k, params.folder_scope.as_deref())
            .await?;
        let ctx = filter_hits(hits, params.threshold, params.max_chunk_chars);
        tracing::debug!(
            retrieved = ctx.total_retrieved,
            relevant = ctx.total_relevant,
            "retrieval filtered"
        );
        Ok(ctx)
    }

    /// Raw nearest chunks, unfiltered.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or search fails.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        folder: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;
        self.store.search(vector, top_k, folder).await
    }

    /// Files whose chunks lie closest to the opening of `path`, best first,
    /// one entry per file, `path` itself excluded.
    ///
    /// # Errors
    ///
    /// `NotFound` if `path` has no indexed chunks.
    pub async fn similar_to(&self, path: &str, top_k: usize) -> Result<Vec<SimilarFile>> {
        let chunks = self.store.file_chunks(path).await?;
        if chunks.is_empty() {
            return Err(IndexError::NotFound {
                path: path.to_owned(),
                version: None,
            });
        }
        let mut lead = String::new();
        for c in &chunks {
            lead.push_str(&c.text);
            if lead.len() >= SIMILAR_LEAD_CHARS {
                break;
            }
        }
        let lead = truncate_chars(&lead, SIMILAR_LEAD_CHARS).0;

        let vector = self.embed(lead).await?;
        let hits = self
            .store
            .search(vector, top_k.saturating_mul(4).max(top_k + 5), None)
            .await?;

        let mut best: HashMap<String, SimilarFile> = HashMap::new();
        for hit in hits.into_iter().filter(|h| h.chunk.path != path) {
            let entry = best
                .entry(hit.chunk.path.clone())
                .or_insert_with(|| SimilarFile {
                    path: hit.chunk.path.clone(),
                    score: hit.score,
                    language: hit.chunk.language.clone(),
                    preview: preview(&hit.chunk.text),
                });
            if hit.score > entry.score {
                entry.score = hit.score;
                entry.preview = preview(&hit.chunk.text);
            }
        }
        let mut files: Vec<SimilarFile> = best.into_values().collect();
        files.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        files.truncate(top_k);
        Ok(files)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = tokio::time::timeout(self.embed_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| LlmError::Timeout(self.embed_timeout))??;
        Ok(vector)
    }
}

/// Threshold, truncate and order raw hits.
#[must_use]
pub fn filter_hits(hits: Vec<SearchHit>, threshold: f32, max_chunk_chars: usize) -> RetrievedContext {
    let total_retrieved = hits.len();
    let mut chunks: Vec<ContextChunk> = hits
        .into_iter()
        .filter(|h| h.score >= threshold)
        .map(|h| {
            let (text, truncated) = truncate_chars(&h.chunk.text, max_chunk_chars);
            ContextChunk {
                path: h.chunk.path,
                ordinal: h.chunk.ordinal,
                line_range: (h.chunk.start_line, h.chunk.end_line),
                score: h.score,
                text: text.to_owned(),
                truncated,
            }
        })
        .collect();
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    RetrievedContext {
        total_relevant: chunks.len(),
        total_retrieved,
        chunks,
    }
}

/// First `max` characters of `text`, never splitting a code point.
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate_chars(line.trim(), 80).0.to_owned()
}

/// Format retrieved chunks as XML for injection into a prompt.
#[must_use]
pub fn format_as_context(ctx: &RetrievedContext) -> String {
    if ctx.chunks.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for chunk in &ctx.chunks {
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" ordinal=\"{}\" lines=\"{}-{}\" score=\"{:.2}\">",
            chunk.path, chunk.ordinal, chunk.line_range.0, chunk.line_range.1, chunk.score,
        );
        out.push_str(&chunk.text);
        if chunk.truncated {
            out.push_str("\n  ...");
        }
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}
