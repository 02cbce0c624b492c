use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::sqlite::begin_write;
use crate::vector_store::{
    BoxFuture, Payload, ScoredVectorPoint, ScrolledPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError, cosine_similarity, matches_filter, sort_by_score,
};

/// Encode a float vector as little-endian `f32` bytes.
#[must_use]
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Vector store persisted in the project's `SQLite` database.
///
/// Search is an exact scan over the collection, which is adequate for
/// single-repository scale.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Wrap `pool` and create the vector tables if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self, VectorStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_collections (\
                 name TEXT PRIMARY KEY NOT NULL, \
                 dimensions INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .map_err(connection)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_points (\
                 collection TEXT NOT NULL REFERENCES vector_collections(name) ON DELETE CASCADE, \
                 id TEXT NOT NULL, \
                 vector BLOB NOT NULL, \
                 payload TEXT NOT NULL, \
                 PRIMARY KEY (collection, id))",
        )
        .execute(&pool)
        .await
        .map_err(connection)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn dimensions(&self, collection: &str) -> Result<Option<u64>, sqlx::Error> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dimensions FROM vector_collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dims.map(|d| u64::try_from(d).unwrap_or(0)))
    }

    async fn load(
        &self,
        collection: &str,
        with_vectors: bool,
    ) -> Result<Vec<(String, Vec<f32>, Payload)>, VectorStoreError> {
        let sql = if with_vectors {
            "SELECT id, vector, payload FROM vector_points WHERE collection = ?"
        } else {
            "SELECT id, x'', payload FROM vector_points WHERE collection = ?"
        };
        let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(sql)
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;
        rows.into_iter()
            .map(|(id, blob, payload)| Ok((id, blob_to_vec(&blob), parse_payload(&payload)?)))
            .collect()
    }

    async fn check_dims(
        &self,
        collection: &str,
        points: &[VectorPoint],
    ) -> Result<(), VectorStoreError> {
        let expected = self
            .dimensions(collection)
            .await
            .map_err(|e| VectorStoreError::Upsert(e.to_string()))?
            .ok_or_else(|| VectorStoreError::Upsert(format!("collection {collection} not found")))?;
        for p in points {
            let actual = p.vector.len() as u64;
            if actual != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: collection.to_owned(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

fn connection(e: sqlx::Error) -> VectorStoreError {
    VectorStoreError::Connection(e.to_string())
}

fn parse_payload(raw: &str) -> Result<Payload, VectorStoreError> {
    serde_json::from_str(raw).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

async fn insert_points(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    points: &[VectorPoint],
) -> Result<(), VectorStoreError> {
    for p in points {
        let payload = serde_json::to_string(&p.payload)
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO vector_points (collection, id, vector, payload) VALUES (?, ?, ?, ?) \
             ON CONFLICT(collection, id) DO UPDATE SET \
             vector = excluded.vector, payload = excluded.payload",
        )
        .bind(collection)
        .bind(&p.id)
        .bind(vec_to_blob(&p.vector))
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
    }
    Ok(())
}

async fn delete_matching(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    filter: &VectorFilter,
) -> Result<u64, VectorStoreError> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT id, payload FROM vector_points WHERE collection = ?")
            .bind(collection)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
    let mut deleted = 0;
    for (id, raw) in rows {
        if !matches_filter(&parse_payload(&raw)?, filter) {
            continue;
        }
        sqlx::query("DELETE FROM vector_points WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(&id)
            .execute(&mut **tx)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
        deleted += 1;
    }
    Ok(deleted)
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let dims = i64::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query(
                "INSERT INTO vector_collections (name, dimensions) VALUES (?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(dims)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let dims = self
                .dimensions(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(dims.is_some())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut tx = begin_write(&self.pool).await.map_err(connection)?;
            sqlx::query("DELETE FROM vector_points WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query("DELETE FROM vector_collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            tx.commit().await.map_err(connection)?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_dims(&collection, &points).await?;
            let mut tx = begin_write(&self.pool).await.map_err(connection)?;
            insert_points(&mut tx, &collection, &points).await?;
            tx.commit().await.map_err(connection)?;
            Ok(())
        })
    }

    fn replace(
        &self,
        collection: &str,
        filter: VectorFilter,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_dims(&collection, &points).await?;
            let mut tx = begin_write(&self.pool).await.map_err(connection)?;
            delete_matching(&mut tx, &collection, &filter).await?;
            insert_points(&mut tx, &collection, &points).await?;
            tx.commit().await.map_err(connection)?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let Some(expected) = self
                .dimensions(&collection)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?
            else {
                return Ok(Vec::new());
            };
            let actual = vector.len() as u64;
            if actual != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    collection,
                    expected,
                    actual,
                });
            }

            let f = filter.unwrap_or_default();
            let mut scored: Vec<ScoredVectorPoint> = self
                .load(&collection, true)
                .await?
                .into_iter()
                .filter(|(_, _, payload)| matches_filter(payload, &f))
                .map(|(id, stored, payload)| ScoredVectorPoint {
                    id,
                    score: cosine_similarity(&vector, &stored),
                    payload,
                })
                .collect();
            sort_by_score(&mut scored);
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let mut tx = begin_write(&self.pool).await.map_err(connection)?;
            for id in &ids {
                sqlx::query("DELETE FROM vector_points WHERE collection = ? AND id = ?")
                    .bind(&collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            }
            tx.commit().await.map_err(connection)?;
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut tx = begin_write(&self.pool).await.map_err(connection)?;
            let deleted = delete_matching(&mut tx, &collection, &filter).await?;
            tx.commit().await.map_err(connection)?;
            Ok(deleted)
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let Some(f) = filter else {
                let n: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM vector_points WHERE collection = ?")
                        .bind(&collection)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
                return Ok(u64::try_from(n).unwrap_or(0));
            };
            let rows = self.load(&collection, false).await?;
            Ok(rows
                .iter()
                .filter(|(_, _, payload)| matches_filter(payload, &f))
                .count() as u64)
        })
    }

    fn scroll(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScrolledPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let f = filter.unwrap_or_default();
            let mut out: Vec<ScrolledPoint> = self
                .load(&collection, false)
                .await?
                .into_iter()
                .filter(|(_, _, payload)| matches_filter(payload, &f))
                .map(|(id, _, payload)| ScrolledPoint { id, payload })
                .collect();
            out.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(out)
        })
    }
}
