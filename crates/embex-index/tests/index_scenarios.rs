use std::path::Path;
use std::sync::Arc;

use embex_index::{
    ChunkStrategy, ChunkerConfig, CodeIndexer, ContextRetriever, FileFilter, FileOutcome,
    FileRules, IndexerConfig, RetrievalParams, StructuralChunker, content_checksum,
    open_index_db,
};
use embex_llm::mock::MockProvider;
use embex_memory::{InMemoryVectorStore, SqliteVectorStore, VectorStore};

struct Project {
    dir: tempfile::TempDir,
    provider: MockProvider,
    indexer: CodeIndexer<MockProvider>,
}

async fn project() -> Project {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockProvider::default();
    let indexer = indexer_at(dir.path(), ":memory:", Arc::new(InMemoryVectorStore::new()), &provider).await;
    Project {
        dir,
        provider,
        indexer,
    }
}

async fn indexer_at(
    root: &Path,
    db: &str,
    vectors: Arc<dyn VectorStore>,
    provider: &MockProvider,
) -> CodeIndexer<MockProvider> {
    let pool = open_index_db(db).await.unwrap();
    CodeIndexer::new(
        pool,
        vectors,
        Arc::new(provider.clone()),
        FileFilter::new(root, &FileRules::default()).unwrap(),
        IndexerConfig::default(),
    )
    .unwrap()
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[tokio::test]
async fn edit_creates_version_two_and_replaces_the_chunk() {
    let p = project().await;
    write(p.dir.path(), "a.py", "def f(): pass");

    let report = p.indexer.index_project().await.unwrap();
    assert_eq!(report.files_reindexed, 1);
    assert_eq!(p.indexer.store().chunk_count("a.py").await.unwrap(), 1);
    let v1 = p.indexer.history().list_versions("a.py").await.unwrap();
    assert_eq!(v1.len(), 1);
    assert_eq!(v1[0].number, 1);

    write(p.dir.path(), "a.py", "def f(): return 1");
    p.indexer.index_project().await.unwrap();

    let versions = p.indexer.history().list_versions("a.py").await.unwrap();
    assert_eq!(versions[0].number, 2);
    assert_ne!(versions[0].checksum, versions[1].checksum);
    assert_eq!(versions[0].checksum, content_checksum("def f(): return 1"));
    assert_eq!(p.indexer.store().chunk_count("a.py").await.unwrap(), 1);
    let chunk = &p.indexer.store().file_chunks("a.py").await.unwrap()[0];
    assert_eq!(chunk.text, "def f(): return 1");
    assert_eq!(chunk.ordinal, 0);
}

#[tokio::test]
async fn unchanged_rescan_makes_no_embedding_calls() {
    let p = project().await;
    write(p.dir.path(), "src/a.py", "def a():\n    return 1\n");
    write(p.dir.path(), "src/b.rs", "fn b() -> u32 {\n    2\n}\n");
    write(p.dir.path(), "lib/c.go", "package c\n\nfunc C() int { return 3 }\n");
    p.indexer.index_project().await.unwrap();
    assert!(p.provider.embed_calls() > 0);

    p.provider.reset_counters();
    let report = p.indexer.index_project().await.unwrap();
    assert_eq!(report.files_unchanged, 3);
    assert_eq!(report.files_reindexed, 0);
    assert_eq!(p.provider.embed_calls(), 0);
    for rel in ["src/a.py", "src/b.rs", "lib/c.go"] {
        let body = std::fs::read_to_string(p.dir.path().join(rel)).unwrap();
        assert!(!p.indexer.cache().should_reindex(rel, &body).await);
    }
}

#[tokio::test]
async fn restoring_a_deleted_file_recreates_it_exactly() {
    let p = project().await;
    let body = "def keep():\n    return 'me'\n";
    write(p.dir.path(), "pkg/keep.py", body);
    p.indexer.index_project().await.unwrap();

    std::fs::remove_dir_all(p.dir.path().join("pkg")).unwrap();
    p.indexer.index_project().await.unwrap();
    assert_eq!(p.indexer.store().chunk_count("pkg/keep.py").await.unwrap(), 0);

    let out = p.indexer.restore_file("pkg/keep.py", Some(1)).await.unwrap();
    let on_disk = std::fs::read_to_string(p.dir.path().join("pkg/keep.py")).unwrap();
    assert_eq!(on_disk, body);
    assert_eq!(content_checksum(&on_disk), out.checksum);
    assert_eq!(p.indexer.store().chunk_count("pkg/keep.py").await.unwrap(), 1);
}

#[tokio::test]
async fn restore_then_rescan_adds_no_version() {
    let p = project().await;
    write(p.dir.path(), "a.py", "v = 1\n");
    p.indexer.index_project().await.unwrap();
    write(p.dir.path(), "a.py", "v = 2\n");
    p.indexer.index_project().await.unwrap();

    p.indexer.restore_file("a.py", Some(1)).await.unwrap();
    let report = p.indexer.index_project().await.unwrap();
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(p.indexer.history().list_versions("a.py").await.unwrap().len(), 2);

    // Editing after a restore continues numbering from the highest version.
    write(p.dir.path(), "a.py", "v = 3\n");
    let out = p.indexer.index_path("a.py").await.unwrap();
    assert!(matches!(out, FileOutcome::Reindexed { version: 3, .. }));
}

#[tokio::test]
async fn diff_of_a_version_with_itself_is_empty() {
    let p = project().await;
    write(p.dir.path(), "a.py", "x = 1\ny = 2\n");
    p.indexer.index_project().await.unwrap();
    write(p.dir.path(), "a.py", "x = 1\ny = 3\n");
    p.indexer.index_project().await.unwrap();

    for v in [1, 2] {
        assert!(p.indexer.history().diff("a.py", v, v).await.unwrap().is_empty());
    }
    let d = p.indexer.history().diff("a.py", 1, 2).await.unwrap();
    assert_eq!((d.removed(), d.added()), (1, 1));
}

#[tokio::test]
async fn threshold_keeps_the_two_relevant_chunks_in_order() {
    let provider = MockProvider::default().with_pinned("where is auth", vec![1.0, 0.0]);
    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let store = embex_index::CodeStore::new(Arc::clone(&vectors));
    let cfg = ChunkerConfig {
        strategy: ChunkStrategy::Fixed,
        ..ChunkerConfig::default()
    };
    let chunker = StructuralChunker::default();
    for (path, score) in [("high.py", 0.9_f32), ("mid.py", 0.5), ("low.py", 0.2)] {
        let chunks = chunker.chunk(path, "body = 1\n", &cfg);
        let v = vec![score, (1.0 - score * score).sqrt()];
        store.replace_file_chunks(path, &chunks, vec![v]).await.unwrap();
    }

    let retriever = ContextRetriever::new(store, Arc::new(provider));
    let params = RetrievalParams {
        top_k: 3,
        threshold: 0.3,
        ..RetrievalParams::default()
    };
    let ctx = retriever.retrieve("where is auth", &params).await.unwrap();
    assert_eq!(ctx.total_retrieved, 3);
    assert_eq!(ctx.total_relevant, 2);
    let paths: Vec<_> = ctx.chunks.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, ["high.py", "mid.py"]);
    assert!((ctx.chunks[0].score - 0.9).abs() < 1e-3);
}

#[tokio::test]
async fn retrieval_on_an_empty_project_is_empty_not_error() {
    let p = project().await;
    let retriever = ContextRetriever::new(p.indexer.store().clone(), Arc::new(MockProvider::default()));
    let ctx = retriever
        .retrieve("anything", &RetrievalParams::default())
        .await
        .unwrap();
    assert!(ctx.is_empty());
    assert_eq!(ctx.total_retrieved, 0);
}

#[tokio::test]
async fn many_files_index_concurrently_with_contiguous_ordinals() {
    let p = project().await;
    for i in 0..20 {
        let body: String = (0..(i + 1) * 30).map(|n| format!("x{n} = {n}\n")).collect();
        write(p.dir.path(), &format!("m/f{i}.py"), &body);
    }
    let report = p.indexer.index_project().await.unwrap();
    assert_eq!(report.files_reindexed, 20);
    assert!(report.failures.is_empty());

    for i in 0..20 {
        let chunks = p.indexer.store().file_chunks(&format!("m/f{i}.py")).await.unwrap();
        assert!(!chunks.is_empty());
        for (expected, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, expected);
        }
    }
}

#[tokio::test]
async fn state_survives_reopening_on_disk_stores() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".embex");
    std::fs::create_dir_all(&state).unwrap();
    let db = state.join("index.db");
    let db = db.to_str().unwrap();
    write(dir.path(), "a.py", "def f(): pass\n");

    let provider = MockProvider::default();
    {
        let pool = open_index_db(db).await.unwrap();
        let vectors = Arc::new(SqliteVectorStore::new(pool).await.unwrap());
        let idx = indexer_at(dir.path(), db, vectors, &provider).await;
        idx.index_project().await.unwrap();
    }

    provider.reset_counters();
    let pool = open_index_db(db).await.unwrap();
    let vectors = Arc::new(SqliteVectorStore::new(pool).await.unwrap());
    let idx = indexer_at(dir.path(), db, vectors, &provider).await;
    let report = idx.index_project().await.unwrap();
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(provider.embed_calls(), 0);
    assert_eq!(idx.store().chunk_count("a.py").await.unwrap(), 1);
    assert_eq!(idx.history().head_version("a.py").await.unwrap(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_on_a_shared_disk_database_never_lock_out_writers() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".embex");
    std::fs::create_dir_all(&state).unwrap();
    let db = state.join("index.db");
    for i in 0..40 {
        write(dir.path(), &format!("f{i}.py"), &format!("def f{i}():\n    return {i}\n"));
    }

    let pool = open_index_db(db.to_str().unwrap()).await.unwrap();
    let vectors = Arc::new(SqliteVectorStore::new(pool.clone()).await.unwrap());
    let indexer = CodeIndexer::new(
        pool,
        vectors,
        Arc::new(MockProvider::default()),
        FileFilter::new(dir.path(), &FileRules::default()).unwrap(),
        IndexerConfig::default(),
    )
    .unwrap();

    for round in 0..3 {
        let report = indexer.index_project().await.unwrap();
        assert!(report.failures.is_empty(), "round {round}: {:?}", report.failures);
        assert_eq!(report.files_reindexed, 40, "round {round}");
        for i in 0..40 {
            write(
                dir.path(),
                &format!("f{i}.py"),
                &format!("def f{i}():\n    return {}\n", i + round + 1),
            );
        }
    }

    let report = indexer.index_project().await.unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(indexer.store().indexed_files().await.unwrap().len(), 40);
    assert_eq!(indexer.history().list_versions("f7.py").await.unwrap().len(), 4);
}
