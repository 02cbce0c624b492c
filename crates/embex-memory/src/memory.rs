use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use embex_llm::{Embedder, LlmError};
use sqlx::SqlitePool;

use crate::error::MemoryError;
use crate::sqlite::now_rfc3339;
use crate::sqlite_vector_store::SqliteVectorStore;
use crate::types::{MemoryEntry, MemoryId, RecalledMemory};
use crate::vector_store::{FieldValue, VectorFilter, VectorPoint, VectorStore};

/// Collection holding memory embeddings. Never shared with code chunks.
pub const MEMORY_COLLECTION: &str = "embex_memories";

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

type MemoryRow = (String, String, String, Option<String>, String);

/// Free-text agent memories: `SQLite` rows are the source of truth, the
/// vector collection only ranks them. Vectors without a row are ignored.
pub struct MemoryStore<E: Embedder> {
    pool: SqlitePool,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    embed_timeout: Duration,
}

impl<E: Embedder> MemoryStore<E> {
    /// Open `memory.db` at `path` with its own `SQLite` vector store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &str, embedder: Arc<E>) -> Result<Self, MemoryError> {
        let pool = crate::sqlite::connect(path).await?;
        let vectors = SqliteVectorStore::new(pool.clone()).await?;
        Self::new(pool, Arc::new(vectors), embedder).await
    }

    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(
        pool: SqlitePool,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<E>,
    ) -> Result<Self, MemoryError> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self {
            pool,
            vectors,
            embedder,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed(text)).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(LlmError::Timeout(self.embed_timeout).into()),
        }
    }

    /// Embed and persist a new memory.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails (nothing is stored) or the write fails.
    pub async fn add(
        &self,
        content: &str,
        tags: &[String],
        agent: Option<&str>,
    ) -> Result<MemoryEntry, MemoryError> {
        let vector = self.embed(content).await?;
        let id = MemoryId::generate();
        let created_at = now_rfc3339();

        let mut payload = HashMap::from([("id".to_owned(), serde_json::json!(id.as_str()))]);
        if let Some(agent) = agent {
            payload.insert("agent".into(), serde_json::json!(agent));
        }
        self.vectors
            .ensure_collection(MEMORY_COLLECTION, vector.len() as u64)
            .await?;
        self.vectors
            .upsert(
                MEMORY_COLLECTION,
                vec![VectorPoint {
                    id: id.0.clone(),
                    vector,
                    payload,
                }],
            )
            .await?;

        sqlx::query(
            "INSERT INTO memories (id, content, tags, agent, checksum, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(content)
        .bind(serde_json::to_string(tags)?)
        .bind(agent)
        .bind(blake3::hash(content.as_bytes()).to_hex().as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %id.short(), agent = ?agent, "memory stored");
        Ok(MemoryEntry {
            id,
            content: content.to_owned(),
            tags: tags.to_vec(),
            agent: agent.map(str::to_owned),
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        })
    }

    /// Semantic recall, best first, dropping hits scored below `min_score`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the stores fail.
    pub async fn recall(
        &self,
        query: &str,
        top_k: usize,
        agent: Option<&str>,
        min_score: f32,
    ) -> Result<Vec<RecalledMemory>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let filter = agent.map(|a| VectorFilter::must("agent", FieldValue::Text(a.to_owned())));
        let hits = self
            .vectors
            .search(MEMORY_COLLECTION, vector, top_k as u64, filter)
            .await?;

        let mut recalled = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().filter(|h| h.score >= min_score) {
            match self.get(&hit.id).await? {
                Some(entry) => recalled.push(RecalledMemory {
                    entry,
                    score: hit.score,
                }),
                None => tracing::debug!(id = %hit.id, "ignoring vector without memory row"),
            }
        }
        Ok(recalled)
    }

    /// Fetch one memory by exact id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let row: Option<MemoryRow> = sqlx::query_as(
            "SELECT id, content, tags, agent, created_at FROM memories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(entry_from_row))
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(
        &self,
        agent: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<MemoryRow> = sqlx::query_as(
            "SELECT id, content, tags, agent, created_at FROM memories \
             WHERE (?1 IS NULL OR agent = ?1) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(agent)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(entry_from_row).collect())
    }

    /// Delete the single memory whose id starts with `prefix`.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches, `AmbiguousId` when several do.
    pub async fn forget(&self, prefix: &str) -> Result<MemoryId, MemoryError> {
        if prefix.is_empty() {
            return Err(MemoryError::NotFound(String::new()));
        }
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM memories WHERE substr(id, 1, length(?1)) = ?1")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        let id = match ids.as_slice() {
            [] => return Err(MemoryError::NotFound(prefix.to_owned())),
            [one] => one.clone(),
            many => {
                return Err(MemoryError::AmbiguousId {
                    prefix: prefix.to_owned(),
                    matches: many.len(),
                });
            }
        };

        sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;
        if let Err(e) = self
            .vectors
            .delete_by_ids(MEMORY_COLLECTION, vec![id.clone()])
            .await
        {
            tracing::warn!(id = %id, "memory vector left behind: {e}");
        }
        tracing::debug!(id = %id, "memory forgotten");
        Ok(MemoryId(id))
    }

    /// Remove all memories, or only those owned by `agent`. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails.
    pub async fn clear(&self, agent: Option<&str>) -> Result<u64, MemoryError> {
        let deleted = sqlx::query("DELETE FROM memories WHERE (?1 IS NULL OR agent = ?1)")
            .bind(agent)
            .execute(&self.pool)
            .await?
            .rows_affected();
        match agent {
            Some(a) => {
                self.vectors
                    .delete_by_filter(
                        MEMORY_COLLECTION,
                        VectorFilter::must("agent", FieldValue::Text(a.to_owned())),
                    )
                    .await?;
            }
            None => self.vectors.delete_collection(MEMORY_COLLECTION).await?,
        }
        tracing::info!(deleted, agent = ?agent, "memories cleared");
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self, agent: Option<&str>) -> Result<u64, MemoryError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE (?1 IS NULL OR agent = ?1)")
            .bind(agent)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn entry_from_row((id, content, tags, agent, created_at): MemoryRow) -> Option<MemoryEntry> {
    let Some(created_at) = parse_timestamp(&created_at) else {
        tracing::warn!(id = %id, "skipping memory with unreadable timestamp");
        return None;
    };
    let tags = serde_json::from_str(&tags).unwrap_or_else(|e| {
        tracing::warn!(id = %id, "unreadable memory tags: {e}");
        Vec::new()
    });
    Some(MemoryEntry {
        id: MemoryId(id),
        content,
        tags,
        agent,
        created_at,
    })
}
