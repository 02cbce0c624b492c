//! File-system watcher feeding a bounded, per-path-coalescing worker pool.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use embex_llm::Embedder;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{Id, JoinSet};
use tokio::time::{Instant, Interval};

use crate::error::{IndexError, Result};
use crate::indexer::{CodeIndexer, FileOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub debounce: Duration,
    /// Pending changed paths before the notify thread blocks.
    pub queue_capacity: usize,
    /// Files reindexed concurrently.
    pub workers: usize,
    /// Periodic full scan; `None` disables it.
    pub rescan_interval: Option<Duration>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            queue_capacity: 256,
            workers: 4,
            rescan_interval: None,
        }
    }
}

/// Tracks which paths are being processed so bursts collapse to one rerun.
#[derive(Debug, Default)]
struct Coalescer {
    inflight: HashSet<String>,
    dirty: HashSet<String>,
}

impl Coalescer {
    /// True if `rel` should start now; otherwise it is marked for a rerun.
    fn offer(&mut self, rel: &str) -> bool {
        if self.inflight.contains(rel) {
            self.dirty.insert(rel.to_owned());
            false
        } else {
            self.inflight.insert(rel.to_owned());
            true
        }
    }

    /// Called when work on `rel` ends. True if it changed meanwhile and must
    /// run again (it stays in flight).
    fn finish(&mut self, rel: &str) -> bool {
        if self.dirty.remove(rel) {
            true
        } else {
            self.inflight.remove(rel);
            false
        }
    }
}

/// Running watcher. Dropping it also stops the loop, without waiting.
pub struct IndexWatcher {
    trigger: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// Watch the indexer's project root recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized or
    /// the configuration is unusable.
    pub fn start<E: Embedder + 'static>(
        indexer: Arc<CodeIndexer<E>>,
        config: &WatchConfig,
    ) -> Result<Self> {
        if config.workers == 0 || config.queue_capacity == 0 {
            return Err(IndexError::InvalidConfig(
                "watch workers and queue capacity must be at least 1".into(),
            ));
        }
        let (tx, rx) = mpsc::channel::<String>(config.queue_capacity);
        let filter = indexer.files().clone();
        let notify_tx = tx.clone();

        let mut debouncer = new_debouncer(
            config.debounce,
            move |events: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let paths: BTreeSet<String> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .filter_map(|e| filter.relative(&e.path).ok())
                    .filter(|rel| filter.is_eligible(rel))
                    .collect();

                for rel in paths {
                    if notify_tx.blocking_send(rel).is_err() {
                        break;
                    }
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(indexer.files().root(), notify::RecursiveMode::Recursive)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher {
            indexer,
            rx,
            shutdown_rx,
            permits: Arc::new(Semaphore::new(config.workers)),
            coalescer: Coalescer::default(),
            tasks: JoinSet::new(),
            task_paths: HashMap::new(),
            scans: JoinSet::new(),
            rescan: config
                .rescan_interval
                .filter(|d| !d.is_zero())
                .map(|d| tokio::time::interval_at(Instant::now() + d, d)),
        };
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            dispatcher.run().await;
        });

        tracing::info!("index watcher started");
        Ok(Self {
            trigger: tx,
            shutdown: shutdown_tx,
            handle,
        })
    }

    /// Queue a project-relative path as if the file system reported it.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher has stopped.
    pub async fn trigger(&self, rel: impl Into<String>) -> Result<()> {
        self.trigger
            .send(rel.into())
            .await
            .map_err(|_| IndexError::Other("index watcher stopped".into()))
    }

    /// Stop accepting events and wait for in-flight work to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("index watcher task failed: {e}");
        }
    }
}

struct Dispatcher<E: Embedder> {
    indexer: Arc<CodeIndexer<E>>,
    rx: mpsc::Receiver<String>,
    shutdown_rx: watch::Receiver<bool>,
    permits: Arc<Semaphore>,
    coalescer: Coalescer,
    tasks: JoinSet<()>,
    task_paths: HashMap<Id, String>,
    scans: JoinSet<()>,
    rescan: Option<Interval>,
}

impl<E: Embedder + 'static> Dispatcher<E> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                msg = self.rx.recv() => match msg {
                    Some(rel) => {
                        if self.coalescer.offer(&rel) {
                            self.spawn(rel);
                        }
                    }
                    None => break,
                },
                Some(done) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.finished(done);
                }
                Some(_) = self.scans.join_next(), if !self.scans.is_empty() => {}
                () = next_tick(self.rescan.as_mut()) => {
                    if self.scans.is_empty() {
                        let indexer = Arc::clone(&self.indexer);
                        self.scans.spawn(async move {
                            if let Err(e) = indexer.index_project().await {
                                tracing::warn!("periodic rescan failed: {e}");
                            }
                        });
                    }
                }
            }
        }

        tracing::info!(in_flight = self.tasks.len(), "index watcher draining");
        self.rx.close();
        while let Some(done) = self.tasks.join_next_with_id().await {
            let Ok((id, ())) = done else { continue };
            self.task_paths.remove(&id);
        }
        while self.scans.join_next().await.is_some() {}
        tracing::info!("index watcher stopped");
    }

    fn spawn(&mut self, rel: String) {
        let indexer = Arc::clone(&self.indexer);
        let permits = Arc::clone(&self.permits);
        let path = rel.clone();
        let handle = self.tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            match indexer.index_path(&path).await {
                Ok(FileOutcome::Reindexed { version, chunks }) => {
                    tracing::info!(path = %path, version, chunks, "reindexed on change");
                }
                Ok(FileOutcome::Removed { chunks }) => {
                    tracing::info!(path = %path, chunks, "removed on delete");
                }
                Ok(FileOutcome::Unchanged) => {}
                Err(e) => tracing::warn!(path = %path, "reindex failed: {e}"),
            }
        });
        self.task_paths.insert(handle.id(), rel);
    }

    fn finished(&mut self, done: std::result::Result<(Id, ()), tokio::task::JoinError>) {
        let id = match done {
            Ok((id, ())) => id,
            Err(e) => {
                tracing::warn!("reindex task failed: {e}");
                e.id()
            }
        };
        if let Some(rel) = self.task_paths.remove(&id)
            && self.coalescer.finish(&rel)
        {
            self.spawn(rel);
        }
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}
