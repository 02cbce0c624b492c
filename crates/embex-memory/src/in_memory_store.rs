use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::vector_store::{
    BoxFuture, Payload, ScoredVectorPoint, ScrolledPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError, cosine_similarity, matches_filter, sort_by_score,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Payload,
}

struct InMemoryCollection {
    dimensions: u64,
    points: HashMap<String, StoredPoint>,
}

impl InMemoryCollection {
    fn check_dims(&self, name: &str, points: &[VectorPoint]) -> Result<(), VectorStoreError> {
        for p in points {
            let actual = p.vector.len() as u64;
            if actual != self.dimensions {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: name.to_owned(),
                    expected: self.dimensions,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, points: Vec<VectorPoint>) {
        for p in points {
            self.points.insert(
                p.id,
                StoredPoint {
                    vector: p.vector,
                    payload: p.payload,
                },
            );
        }
    }
}

/// Process-local vector store used in tests and for ephemeral projects.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, InMemoryCollection>> {
        self.collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, InMemoryCollection>> {
        self.collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.write()
                .entry(collection)
                .or_insert_with(|| InMemoryCollection {
                    dimensions: vector_size,
                    points: HashMap::new(),
                });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move { Ok(self.read().contains_key(&collection)) })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.write().remove(&collection);
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
            let mut cols = self.write();
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            col.check_dims(&collection, &points)?;
            col.insert(points);
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
            let mut cols = self.write();
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            col.check_dims(&collection, &points)?;
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            col.insert(points);
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
            let cols = self.read();
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let f = filter.unwrap_or_default();
            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &f))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
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
            let mut cols = self.write();
            if let Some(col) = cols.get_mut(&collection) {
                for id in &ids {
                    col.points.remove(id);
                }
            }
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
            let mut cols = self.write();
            let Some(col) = cols.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.points.len();
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            Ok((before - col.points.len()) as u64)
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.read();
            let Some(col) = cols.get(&collection) else {
                return Ok(0);
            };
            let f = filter.unwrap_or_default();
            Ok(col
                .points
                .values()
                .filter(|sp| matches_filter(&sp.payload, &f))
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
            let cols = self.read();
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };
            let f = filter.unwrap_or_default();
            let mut out: Vec<ScrolledPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &f))
                .map(|(id, sp)| ScrolledPoint {
                    id: id.clone(),
                    payload: sp.payload.clone(),
                })
                .collect();
            out.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::FieldValue;

    fn point(id: &str, vector: Vec<f32>, path: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([("path".into(), serde_json::json!(path))]),
        }
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store.ensure_collection("test", 3).await.unwrap();
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
        store.delete_collection("test").await.unwrap();
        assert!(!store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_and_search_orders_by_score() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "a.py"),
                    point("b", vec![0.0, 1.0, 0.0], "b.py"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_missing_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        let hits = store.search("nope", vec![1.0], 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimensions() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        let err = store
            .upsert("test", vec![point("a", vec![1.0, 0.0], "a.py")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn replace_swaps_only_matching_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a0", vec![1.0, 0.0], "a.py"),
                    point("a1", vec![1.0, 0.0], "a.py"),
                    point("b0", vec![0.0, 1.0], "b.py"),
                ],
            )
            .await
            .unwrap();

        store
            .replace(
                "test",
                VectorFilter::must("path", FieldValue::Text("a.py".into())),
                vec![point("a0-new", vec![1.0, 1.0], "a.py")],
            )
            .await
            .unwrap();

        let all = store.scroll("test", None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a0-new", "b0"]);
    }

    #[tokio::test]
    async fn replace_with_bad_dims_keeps_old_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert("test", vec![point("a0", vec![1.0, 0.0], "a.py")])
            .await
            .unwrap();
        let res = store
            .replace(
                "test",
                VectorFilter::must("path", FieldValue::Text("a.py".into())),
                vec![point("a0", vec![1.0], "a.py")],
            )
            .await;
        assert!(res.is_err());
        assert_eq!(store.count("test", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_filter_and_count() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0], "src/a.py"),
                    point("b", vec![1.0, 0.0], "src/b.py"),
                    point("c", vec![1.0, 0.0], "lib/c.py"),
                ],
            )
            .await
            .unwrap();
        let scoped = VectorFilter::must("path", FieldValue::Prefix("src/".into()));
        assert_eq!(store.count("test", Some(scoped.clone())).await.unwrap(), 2);
        assert_eq!(store.delete_by_filter("test", scoped).await.unwrap(), 2);
        assert_eq!(store.count("test", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_ids_removes_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0, 0.0], "a.py")])
            .await
            .unwrap();
        store.delete_by_ids("test", vec!["a".into()]).await.unwrap();
        assert_eq!(store.count("test", None).await.unwrap(), 0);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::default();
        assert!(format!("{store:?}").contains("InMemoryVectorStore"));
    }
}
