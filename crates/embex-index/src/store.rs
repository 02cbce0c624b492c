//! Code chunk collection on top of a [`VectorStore`].

use std::collections::BTreeSet;
use std::sync::Arc;

use embex_memory::vector_store::Payload;
use embex_memory::{FieldValue, ScrolledPoint, VectorFilter, VectorPoint, VectorStore};
use serde_json::json;

use crate::chunker::Chunk;
use crate::context::chunk_display_header;
use crate::error::Result;
use crate::history::folder_prefix;
use crate::tagger::auto_tag;

pub const CODE_COLLECTION: &str = "embex_code_chunks";

/// Deterministic point id for a chunk slot, so a re-index overwrites in place.
#[must_use]
pub fn chunk_point_id(path: &str, ordinal: usize) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_URL,
        format!("{path}#{ordinal}").as_bytes(),
    )
    .to_string()
}

/// A chunk as read back from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub path: String,
    pub ordinal: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: String,
    pub name: Option<String>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: StoredChunk,
    pub score: f32,
}

impl StoredChunk {
    /// One-line citation such as `src/a.py :: login (lines 3-9)`.
    #[must_use]
    pub fn header(&self) -> String {
        chunk_display_header(
            &self.path,
            self.name.as_deref(),
            &self.kind,
            (self.start_line, self.end_line),
        )
    }

    fn from_payload(id: String, p: &Payload) -> Option<Self> {
        let get_str = |key: &str| p.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        let get_int = |key: &str| {
            p.get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
        };

        Some(Self {
            id,
            path: get_str("path")?,
            ordinal: get_int("ordinal")?,
            start_line: get_int("start_line")?,
            end_line: get_int("end_line")?,
            kind: get_str("kind").unwrap_or_default(),
            name: get_str("name"),
            language: get_str("language"),
            tags: p
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|t| t.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default(),
            text: get_str("text")?,
        })
    }
}

fn chunk_payload(chunk: &Chunk) -> Payload {
    let fields = json!({
        "path": chunk.path,
        "ordinal": chunk.ordinal,
        "start_line": chunk.start_line,
        "end_line": chunk.end_line,
        "start_byte": chunk.start_byte,
        "end_byte": chunk.end_byte,
        "kind": chunk.kind,
        "name": chunk.name,
        "language": chunk.language.map(|l| l.id()),
        "tags": auto_tag(&chunk.text),
        "text": chunk.text,
    });
    match fields {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Payload::new(),
    }
}

fn path_filter(path: &str) -> VectorFilter {
    VectorFilter::must("path", FieldValue::Text(path.to_owned()))
}

/// Directory-prefix filter; `None` when the scope covers the whole project.
#[must_use]
pub fn folder_filter(folder: Option<&str>) -> Option<VectorFilter> {
    let prefix = folder_prefix(folder?);
    if prefix.is_empty() {
        None
    } else {
        Some(VectorFilter::must("path", FieldValue::Prefix(prefix)))
    }
}

/// Code chunks of one project, disjoint from agent memories.
#[derive(Clone)]
pub struct CodeStore {
    vectors: Arc<dyn VectorStore>,
    collection: String,
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl CodeStore {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            vectors,
            collection: CODE_COLLECTION.into(),
        }
    }

    /// Replace every chunk of `path` with `chunks` in one step.
    ///
    /// `vectors[i]` is the embedding of `chunks[i]`. Concurrent readers see
    /// either the previous set or the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector store rejects the write; the previous
    /// chunk set is left in place then.
    pub async fn replace_file_chunks(
        &self,
        path: &str,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if chunks.is_empty() {
            self.remove_file_chunks(path).await?;
            return Ok(0);
        }
        if let Some(first) = vectors.first() {
            self.vectors
                .ensure_collection(&self.collection, u64::try_from(first.len())?)
                .await?;
        }

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk_point_id(path, chunk.ordinal),
                vector,
                payload: chunk_payload(chunk),
            })
            .collect();
        let n = points.len();
        self.vectors
            .replace(&self.collection, path_filter(path), points)
            .await?;
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_file_chunks(&self, path: &str) -> Result<u64> {
        Ok(self
            .vectors
            .delete_by_filter(&self.collection, path_filter(path))
            .await?)
    }

    /// Nearest chunks to `vector`, optionally limited to a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        folder: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let hits = self
            .vectors
            .search(
                &self.collection,
                vector,
                u64::try_from(limit)?,
                folder_filter(folder),
            )
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let chunk = StoredChunk::from_payload(h.id, &h.payload)?;
                Some(SearchHit {
                    chunk,
                    score: h.score,
                })
            })
            .collect())
    }

    /// Stored chunks under `folder`, ordered by path then ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the scroll fails.
    pub async fn chunks_in(&self, folder: Option<&str>) -> Result<Vec<StoredChunk>> {
        let points = self
            .vectors
            .scroll(&self.collection, folder_filter(folder))
            .await?;
        Ok(decode_sorted(points))
    }

    /// # Errors
    ///
    /// Returns an error if the scroll fails.
    pub async fn file_chunks(&self, path: &str) -> Result<Vec<StoredChunk>> {
        let points = self
            .vectors
            .scroll(&self.collection, Some(path_filter(path)))
            .await?;
        Ok(decode_sorted(points))
    }

    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub async fn chunk_count(&self, path: &str) -> Result<u64> {
        Ok(self
            .vectors
            .count(&self.collection, Some(path_filter(path)))
            .await?)
    }

    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub async fn total_chunks(&self) -> Result<u64> {
        Ok(self.vectors.count(&self.collection, None).await?)
    }

    /// Distinct paths that currently have chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the scroll fails.
    pub async fn indexed_files(&self) -> Result<Vec<String>> {
        let paths: BTreeSet<String> = self
            .chunks_in(None)
            .await?
            .into_iter()
            .map(|c| c.path)
            .collect();
        Ok(paths.into_iter().collect())
    }

    /// Drop the whole collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.vectors.delete_collection(&self.collection).await?)
    }
}

fn decode_sorted(points: Vec<ScrolledPoint>) -> Vec<StoredChunk> {
    let mut chunks: Vec<StoredChunk> = points
        .into_iter()
        .filter_map(|p| StoredChunk::from_payload(p.id, &p.payload))
        .collect();
    chunks.sort_by(|a, b| a.path.cmp(&b.path).then(a.ordinal.cmp(&b.ordinal)));
    chunks
}
