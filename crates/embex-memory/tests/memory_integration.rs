use std::sync::Arc;

use embex_llm::mock::MockProvider;
use embex_memory::{MEMORY_COLLECTION, MemoryError, MemoryStore, SqliteVectorStore, VectorStore};

async fn open(dir: &tempfile::TempDir, provider: MockProvider) -> MemoryStore<MockProvider> {
    let path = dir.path().join("memory.db");
    MemoryStore::open(path.to_str().unwrap(), Arc::new(provider))
        .await
        .unwrap()
}

#[tokio::test]
async fn memories_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir, MockProvider::default()).await;
        store
            .add("api keys rotate every monday", &["ops".into()], Some("planner"))
            .await
            .unwrap();
    }
    let store = open(&dir, MockProvider::default()).await;
    let listed = store.list(None, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].tags, vec!["ops".to_owned()]);

    let hits = store
        .recall("when do api keys rotate", 5, None, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
async fn forgotten_memory_is_never_recalled() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, MockProvider::default()).await;
    let kept = store.add("cache lives in redis", &[], None).await.unwrap();
    let gone = store.add("cache ttl is ten minutes", &[], None).await.unwrap();

    store.forget(gone.id.short()).await.unwrap();

    let hits = store.recall("cache", 10, None, 0.0).await.unwrap();
    assert!(hits.iter().all(|h| h.entry.id != gone.id));
    assert!(hits.iter().any(|h| h.entry.id == kept.id));
    assert!(matches!(
        store.forget(gone.id.as_str()).await.unwrap_err(),
        MemoryError::NotFound(_)
    ));
}

#[tokio::test]
async fn memory_db_holds_only_memory_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");
    let store = MemoryStore::open(path.to_str().unwrap(), Arc::new(MockProvider::default()))
        .await
        .unwrap();
    store.add("note", &[], None).await.unwrap();

    let pool = embex_memory::sqlite::connect(path.to_str().unwrap())
        .await
        .unwrap();
    let vectors = SqliteVectorStore::new(pool).await.unwrap();
    assert!(vectors.collection_exists(MEMORY_COLLECTION).await.unwrap());
    assert!(!vectors.collection_exists("embex_code_chunks").await.unwrap());
}
