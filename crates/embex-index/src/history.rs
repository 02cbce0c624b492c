//! Append-only per-file version log with a movable head pointer.
//!
//! Version numbers for a path grow by one per recorded change and are never
//! reused. The head is the version the working file is believed to hold:
//! a snapshot moves it to the new version, a restore moves it back. Old
//! versions beyond the retention cap are deleted outright.

use std::path::Path;

use embex_memory::sqlite::begin_write;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::checksum::content_checksum;
use crate::diff::FileDiff;
use crate::error::{IndexError, Result};
use crate::languages::detect_language;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub path: String,
    pub number: u32,
    pub content: String,
    pub checksum: String,
    pub created_at: String,
    pub size_bytes: u64,
    pub line_count: u64,
}

/// Version metadata without the snapshot body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub path: String,
    pub number: u32,
    pub checksum: String,
    pub created_at: String,
    pub size_bytes: u64,
    pub line_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Content matched the head; nothing recorded.
    Unchanged { head: u32 },
    Created { version: u32, pruned: u64 },
}

impl SnapshotOutcome {
    /// The version now holding the file's content.
    #[must_use]
    pub fn version(self) -> u32 {
        match self {
            Self::Unchanged { head } => head,
            Self::Created { version, .. } => version,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub files: u64,
    pub versions: u64,
    pub total_bytes: u64,
    /// Paths with the most versions, descending.
    pub most_changed: Vec<(String, u64)>,
}

type VersionTuple = (String, i64, String, String, String, i64, i64);

fn version_from_tuple(t: VersionTuple) -> Result<Version> {
    Ok(Version {
        number: to_version(&t.0, t.1)?,
        path: t.0,
        content: t.2,
        checksum: t.3,
        created_at: t.4,
        size_bytes: u64::try_from(t.5)?,
        line_count: u64::try_from(t.6)?,
    })
}

fn to_version(path: &str, raw: i64) -> Result<u32> {
    u32::try_from(raw)
        .map_err(|_| IndexError::CorruptRecord(format!("version number {raw} for {path}")))
}

/// Normalise a folder scope to a `dir/` prefix; `""`/`"."` mean the whole project.
#[must_use]
pub fn folder_prefix(folder: &str) -> String {
    let trimmed = folder.trim().trim_start_matches("./").trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
    max_versions: u32,
}

impl HistoryStore {
    /// `max_versions == 0` disables pruning.
    #[must_use]
    pub fn new(pool: SqlitePool, max_versions: u32) -> Self {
        Self { pool, max_versions }
    }

    /// Record `content` as a new version unless it matches the head.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is recorded then.
    pub async fn snapshot(&self, path: &str, content: &str) -> Result<SnapshotOutcome> {
        let checksum = content_checksum(content);
        let now = embex_memory::sqlite::now_rfc3339();
        let language = detect_language(Path::new(path)).map_or("", |l| l.id());

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query(
            "INSERT INTO file_history (path, head_version, last_version, language, first_seen, last_modified) \
             VALUES (?, 0, 0, ?, ?, ?) ON CONFLICT(path) DO NOTHING",
        )
        .bind(path)
        .bind(language)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let (head, last): (i64, i64) =
            sqlx::query_as("SELECT head_version, last_version FROM file_history WHERE path = ?")
                .bind(path)
                .fetch_one(&mut *tx)
                .await?;

        if head > 0 {
            let head_checksum: Option<String> = sqlx::query_scalar(
                "SELECT checksum FROM file_versions WHERE path = ? AND version = ?",
            )
            .bind(path)
            .bind(head)
            .fetch_optional(&mut *tx)
            .await?;
            if head_checksum.as_deref() == Some(checksum.as_str()) {
                tx.commit().await?;
                return Ok(SnapshotOutcome::Unchanged {
                    head: to_version(path, head)?,
                });
            }
        }

        let new_version = last + 1;
        sqlx::query(
            "INSERT INTO file_versions (path, version, content, checksum, size_bytes, line_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(path)
        .bind(new_version)
        .bind(content)
        .bind(&checksum)
        .bind(i64::try_from(content.len())?)
        .bind(i64::try_from(content.lines().count())?)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE file_history SET head_version = ?, last_version = ?, last_modified = ? \
             WHERE path = ?",
        )
        .bind(new_version)
        .bind(new_version)
        .bind(&now)
        .bind(path)
        .execute(&mut *tx)
        .await?;

        let mut pruned = 0;
        if self.max_versions > 0 {
            let cutoff = new_version - i64::from(self.max_versions);
            if cutoff > 0 {
                pruned = sqlx::query("DELETE FROM file_versions WHERE path = ? AND version <= ?")
                    .bind(path)
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        tx.commit().await?;
        let version = to_version(path, new_version)?;
        tracing::debug!(path, version, pruned, "snapshot recorded");
        Ok(SnapshotOutcome::Created { version, pruned })
    }

    /// All retained versions, newest first.
    ///
    /// # Errors
    ///
    /// `NotFound` if the path has no history.
    pub async fn list_versions(&self, path: &str) -> Result<Vec<Version>> {
        let rows: Vec<VersionTuple> = sqlx::query_as(
            "SELECT path, version, content, checksum, created_at, size_bytes, line_count \
             FROM file_versions WHERE path = ? ORDER BY version DESC",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() && !self.is_tracked(path).await? {
            return Err(IndexError::NotFound {
                path: path.to_owned(),
                version: None,
            });
        }
        rows.into_iter().map(version_from_tuple).collect()
    }

    /// # Errors
    ///
    /// `NotFound` if the version does not exist (never recorded or pruned).
    pub async fn version(&self, path: &str, number: u32) -> Result<Version> {
        let row: Option<VersionTuple> = sqlx::query_as(
            "SELECT path, version, content, checksum, created_at, size_bytes, line_count \
             FROM file_versions WHERE path = ? AND version = ?",
        )
        .bind(path)
        .bind(i64::from(number))
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| IndexError::NotFound {
            path: path.to_owned(),
            version: Some(number),
        })?;
        version_from_tuple(row)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn head_version(&self, path: &str) -> Result<Option<u32>> {
        let head: Option<i64> =
            sqlx::query_scalar("SELECT head_version FROM file_history WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        head.filter(|h| *h > 0)
            .map(|h| to_version(path, h))
            .transpose()
    }

    /// Highest version number ever assigned to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn latest_version(&self, path: &str) -> Result<Option<u32>> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_version FROM file_history WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        last.filter(|v| *v > 0)
            .map(|v| to_version(path, v))
            .transpose()
    }

    /// Point the head at an existing version without recording anything.
    ///
    /// # Errors
    ///
    /// `NotFound` if the version does not exist.
    pub async fn set_head(&self, path: &str, number: u32) -> Result<()> {
        let res = sqlx::query(
            "UPDATE file_history SET head_version = ?1, last_modified = ?2 \
             WHERE path = ?3 AND EXISTS \
             (SELECT 1 FROM file_versions WHERE path = ?3 AND version = ?1)",
        )
        .bind(i64::from(number))
        .bind(embex_memory::sqlite::now_rfc3339())
        .bind(path)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(IndexError::NotFound {
                path: path.to_owned(),
                version: Some(number),
            });
        }
        Ok(())
    }

    /// Line diff from version `from` to version `to`.
    ///
    /// # Errors
    ///
    /// `NotFound` if either version does not exist.
    pub async fn diff(&self, path: &str, from: u32, to: u32) -> Result<FileDiff> {
        let old = self.version(path, from).await?;
        let new = if from == to {
            old.clone()
        } else {
            self.version(path, to).await?
        };
        Ok(FileDiff::compute(path, from, &old.content, to, &new.content))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn is_tracked(&self, path: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM file_history WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tracked_files(&self) -> Result<Vec<String>> {
        self.files_in_folder("").await
    }

    /// Paths with history under `folder` (a directory prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn files_in_folder(&self, folder: &str) -> Result<Vec<String>> {
        let prefix = folder_prefix(folder);
        let paths = sqlx::query_scalar(
            "SELECT path FROM file_history \
             WHERE substr(path, 1, length(?1)) = ?1 ORDER BY path",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    /// Newest versions across all files.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_versions(&self, limit: usize) -> Result<Vec<VersionInfo>> {
        let rows: Vec<(String, i64, String, String, i64, i64)> = sqlx::query_as(
            "SELECT path, version, checksum, created_at, size_bytes, line_count \
             FROM file_versions ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(path, v, checksum, created_at, size, lines)| {
                Ok(VersionInfo {
                    number: to_version(&path, v)?,
                    path,
                    checksum,
                    created_at,
                    size_bytes: u64::try_from(size)?,
                    line_count: u64::try_from(lines)?,
                })
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn stats(&self, top: usize) -> Result<HistoryStats> {
        let (files,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_history")
            .fetch_one(&self.pool)
            .await?;
        let (versions, total_bytes): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM file_versions")
                .fetch_one(&self.pool)
                .await?;
        let most_changed: Vec<(String, i64)> = sqlx::query_as(
            "SELECT path, COUNT(*) AS n FROM file_versions \
             GROUP BY path ORDER BY n DESC, path ASC LIMIT ?",
        )
        .bind(i64::try_from(top).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(HistoryStats {
            files: u64::try_from(files)?,
            versions: u64::try_from(versions)?,
            total_bytes: u64::try_from(total_bytes)?,
            most_changed: most_changed
                .into_iter()
                .map(|(p, n)| Ok((p, u64::try_from(n)?)))
                .collect::<Result<_>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(max: u32) -> HistoryStore {
        HistoryStore::new(crate::open_index_db(":memory:").await.unwrap(), max)
    }

    #[test]
    fn folder_prefix_normalises() {
        assert_eq!(folder_prefix(""), "");
        assert_eq!(folder_prefix("."), "");
        assert_eq!(folder_prefix("./src/"), "src/");
        assert_eq!(folder_prefix("src/auth"), "src/auth/");
    }

    #[tokio::test]
    async fn first_snapshot_is_version_one() {
        let h = store(50).await;
        let out = h.snapshot("a.py", "def f(): pass").await.unwrap();
        assert_eq!(out, SnapshotOutcome::Created { version: 1, pruned: 0 });
        assert_eq!(h.head_version("a.py").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn identical_content_is_not_recorded_again() {
        let h = store(50).await;
        h.snapshot("a.py", "x").await.unwrap();
        let out = h.snapshot("a.py", "x").await.unwrap();
        assert_eq!(out, SnapshotOutcome::Unchanged { head: 1 });
        assert_eq!(h.list_versions("a.py").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn versions_increase_without_gaps() {
        let h = store(50).await;
        for (i, body) in ["a", "b", "c"].iter().enumerate() {
            let out = h.snapshot("f.rs", body).await.unwrap();
            assert_eq!(out.version(), u32::try_from(i + 1).unwrap());
        }
        let numbers: Vec<_> = h
            .list_versions("f.rs")
            .await
            .unwrap()
            .iter()
            .map(|v| v.number)
            .collect();
        assert_eq!(numbers, [3, 2, 1]);
    }

    #[tokio::test]
    async fn retention_prunes_oldest() {
        let h = store(2).await;
        h.snapshot("f", "1").await.unwrap();
        h.snapshot("f", "2").await.unwrap();
        let out = h.snapshot("f", "3").await.unwrap();
        assert_eq!(out, SnapshotOutcome::Created { version: 3, pruned: 1 });
        let numbers: Vec<_> = h
            .list_versions("f")
            .await
            .unwrap()
            .iter()
            .map(|v| v.number)
            .collect();
        assert_eq!(numbers, [3, 2]);
        assert!(matches!(
            h.version("f", 1).await.unwrap_err(),
            IndexError::NotFound { version: Some(1), .. }
        ));
    }

    #[tokio::test]
    async fn restore_then_snapshot_is_noop() {
        let h = store(50).await;
        h.snapshot("f", "one").await.unwrap();
        h.snapshot("f", "two").await.unwrap();
        h.set_head("f", 1).await.unwrap();
        let restored = h.version("f", 1).await.unwrap().content;
        let out = h.snapshot("f", &restored).await.unwrap();
        assert_eq!(out, SnapshotOutcome::Unchanged { head: 1 });
        assert_eq!(h.list_versions("f").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn edit_after_restore_gets_next_number() {
        let h = store(50).await;
        h.snapshot("f", "one").await.unwrap();
        h.snapshot("f", "two").await.unwrap();
        h.set_head("f", 1).await.unwrap();
        let out = h.snapshot("f", "three").await.unwrap();
        assert_eq!(out.version(), 3);
        assert_eq!(h.latest_version("f").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn set_head_unknown_version_is_not_found() {
        let h = store(50).await;
        h.snapshot("f", "one").await.unwrap();
        assert!(matches!(
            h.set_head("f", 9).await.unwrap_err(),
            IndexError::NotFound { .. }
        ));
        assert_eq!(h.head_version("f").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn diff_same_version_is_empty() {
        let h = store(50).await;
        h.snapshot("f", "a\nb\n").await.unwrap();
        assert!(h.diff("f", 1, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diff_unknown_version_is_not_found() {
        let h = store(50).await;
        h.snapshot("f", "a").await.unwrap();
        assert!(matches!(
            h.diff("f", 1, 2).await.unwrap_err(),
            IndexError::NotFound { version: Some(2), .. }
        ));
    }

    #[tokio::test]
    async fn list_versions_of_unknown_path_is_not_found() {
        let h = store(50).await;
        assert!(matches!(
            h.list_versions("nope").await.unwrap_err(),
            IndexError::NotFound { version: None, .. }
        ));
    }

    #[tokio::test]
    async fn folder_listing_uses_directory_prefix() {
        let h = store(50).await;
        h.snapshot("src/a.py", "a").await.unwrap();
        h.snapshot("src/sub/b.py", "b").await.unwrap();
        h.snapshot("srcx/c.py", "c").await.unwrap();
        assert_eq!(
            h.files_in_folder("src").await.unwrap(),
            vec!["src/a.py".to_owned(), "src/sub/b.py".to_owned()]
        );
        assert_eq!(h.tracked_files().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn recent_versions_and_stats() {
        let h = store(50).await;
        h.snapshot("a", "1").await.unwrap();
        h.snapshot("a", "22").await.unwrap();
        h.snapshot("b", "333").await.unwrap();
        let recent = h.recent_versions(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "b");

        let stats = h.stats(5).await.unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.versions, 3);
        assert_eq!(stats.total_bytes, 6);
        assert_eq!(stats.most_changed[0], ("a".to_owned(), 2));
    }
}
