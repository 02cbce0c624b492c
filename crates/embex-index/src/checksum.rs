//! Change-detection ledger: path → content hash + last indexed version.

use std::path::Path;

use sqlx::SqlitePool;

use crate::error::{IndexError, Result};

/// BLAKE3 of `content`, lowercase hex.
#[must_use]
pub fn content_checksum(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[must_use]
pub fn is_valid_checksum(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub checksum: String,
    pub version: u32,
    pub extension: String,
    pub indexed_at: String,
}

#[derive(Debug, Clone)]
pub struct ChecksumCache {
    pool: SqlitePool,
}

impl ChecksumCache {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// True when `path` has no usable record or its hash differs from `content`'s.
    pub async fn should_reindex(&self, path: &str, content: &str) -> bool {
        self.needs_reindex(path, &content_checksum(content)).await
    }

    /// Like [`Self::should_reindex`] with a precomputed checksum. Read
    /// failures and corrupt records answer `true`.
    pub async fn needs_reindex(&self, path: &str, checksum: &str) -> bool {
        match self.get(path).await {
            Ok(Some(record)) => record.checksum != checksum,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(path, "checksum record unreadable, reindexing: {e}");
                true
            }
        }
    }

    /// # Errors
    ///
    /// `CorruptRecord` if the stored row is malformed, or a database error.
    pub async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let row: Option<(String, String, i64, String, String)> = sqlx::query_as(
            "SELECT path, checksum, version, extension, indexed_at \
             FROM file_records WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        let Some((path, checksum, version, extension, indexed_at)) = row else {
            return Ok(None);
        };
        if !is_valid_checksum(&checksum) {
            return Err(IndexError::CorruptRecord(format!(
                "checksum for {path} is not a BLAKE3 hex digest"
            )));
        }
        let version = u32::try_from(version)
            .map_err(|_| IndexError::CorruptRecord(format!("version {version} for {path}")))?;
        Ok(Some(FileRecord {
            path,
            checksum,
            version,
            extension,
            indexed_at,
        }))
    }

    /// Idempotent upsert after a successful index pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn record_indexed(&self, path: &str, checksum: &str, version: u32) -> Result<()> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO file_records (path, checksum, version, extension, indexed_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(path) DO UPDATE SET \
             checksum = excluded.checksum, version = excluded.version, \
             extension = excluded.extension, indexed_at = excluded.indexed_at",
        )
        .bind(path)
        .bind(checksum)
        .bind(i64::from(version))
        .bind(extension)
        .bind(embex_memory::sqlite::now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the record for a deleted file. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn forget(&self, path: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM file_records WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tracked_paths(&self) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar("SELECT path FROM file_records ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(n)?)
    }

    /// Project reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM file_records")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache() -> ChecksumCache {
        ChecksumCache::new(crate::open_index_db(":memory:").await.unwrap())
    }

    #[test]
    fn checksum_is_blake3_hex() {
        let h = content_checksum("def f(): pass");
        assert!(is_valid_checksum(&h));
        assert_eq!(h, content_checksum("def f(): pass"));
        assert_ne!(h, content_checksum("def f(): return 1"));
    }

    #[test]
    fn malformed_checksums_rejected() {
        assert!(!is_valid_checksum("abc"));
        assert!(!is_valid_checksum(&"G".repeat(64)));
        assert!(!is_valid_checksum(&"A".repeat(64)));
    }

    #[tokio::test]
    async fn unknown_path_needs_reindex() {
        assert!(cache().await.should_reindex("a.py", "x").await);
    }

    #[tokio::test]
    async fn recorded_content_is_skipped_until_changed() {
        let c = cache().await;
        c.record_indexed("a.py", &content_checksum("v1"), 1)
            .await
            .unwrap();
        assert!(!c.should_reindex("a.py", "v1").await);
        assert!(c.should_reindex("a.py", "v2").await);
    }

    #[tokio::test]
    async fn record_indexed_is_idempotent_upsert() {
        let c = cache().await;
        let h = content_checksum("v1");
        c.record_indexed("src/a.py", &h, 1).await.unwrap();
        c.record_indexed("src/a.py", &h, 1).await.unwrap();
        c.record_indexed("src/a.py", &content_checksum("v2"), 2)
            .await
            .unwrap();
        assert_eq!(c.count().await.unwrap(), 1);
        let rec = c.get("src/a.py").await.unwrap().unwrap();
        assert_eq!(rec.version, 2);
        assert_eq!(rec.extension, ".py");
    }

    #[tokio::test]
    async fn corrupt_record_fails_open() {
        let c = cache().await;
        sqlx::query(
            "INSERT INTO file_records (path, checksum, version, extension, indexed_at) \
             VALUES ('a.py', 'garbage', 1, '.py', '')",
        )
        .execute(&c.pool)
        .await
        .unwrap();
        assert!(matches!(
            c.get("a.py").await.unwrap_err(),
            IndexError::CorruptRecord(_)
        ));
        assert!(c.should_reindex("a.py", "anything").await);
    }

    #[tokio::test]
    async fn should_reindex_has_no_side_effects() {
        let c = cache().await;
        let _ = c.should_reindex("a.py", "x").await;
        assert_eq!(c.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forget_and_clear() {
        let c = cache().await;
        c.record_indexed("a.py", &content_checksum("a"), 1).await.unwrap();
        c.record_indexed("b.py", &content_checksum("b"), 1).await.unwrap();
        assert!(c.forget("a.py").await.unwrap());
        assert!(!c.forget("a.py").await.unwrap());
        assert_eq!(c.tracked_paths().await.unwrap(), vec!["b.py".to_owned()]);
        assert_eq!(c.clear().await.unwrap(), 1);
    }
}
