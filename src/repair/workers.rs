//! Upload workers that receive repaired chunks.

use super::chunk::UnfinishedChunk;
use crate::crypto::HostKey;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// A worker that uploads shards of repaired chunks to one host.
pub trait RepairWorker: Send + Sync {
    /// Queue `chunk` for upload. Must not block on the worker's own
    /// progress.
    fn queue_chunk_repair(&self, chunk: Arc<UnfinishedChunk>);
}

/// The set of upload workers, keyed by host.
///
/// Membership changes take the write lock; submissions fan out under the
/// read lock, so a submission sees a consistent snapshot of the pool.
#[derive(Default)]
pub struct WorkerPool {
    workers: RwLock<HashMap<HostKey, Arc<dyn RepairWorker>>>,
}

impl WorkerPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the worker for `host`.
    pub fn insert(&self, host: HostKey, worker: Arc<dyn RepairWorker>) {
        self.workers.write().insert(host, worker);
        debug!("Worker for host {host} added to pool");
    }

    /// Remove the worker for `host`.
    pub fn remove(&self, host: &HostKey) -> Option<Arc<dyn RepairWorker>> {
        let removed = self.workers.write().remove(host);
        if removed.is_some() {
            debug!("Worker for host {host} removed from pool");
        }
        removed
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// Whether the pool has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Point-in-time copy of the pool's workers.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn RepairWorker>> {
        self.workers.read().values().cloned().collect()
    }

    /// Give `chunk` to every worker. Returns how many workers received it.
    pub fn queue_chunk_repair(&self, chunk: &Arc<UnfinishedChunk>) -> usize {
        let workers = self.workers.read();
        for worker in workers.values() {
            worker.queue_chunk_repair(Arc::clone(chunk));
        }
        workers.len()
    }
}

/// A [`RepairWorker`] that buffers chunks for a consumer task.
#[derive(Default)]
pub struct ChunkQueue {
    queue: Mutex<VecDeque<Arc<UnfinishedChunk>>>,
    queued: Notify,
}

impl ChunkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest queued chunk, if any.
    pub fn try_next(&self) -> Option<Arc<UnfinishedChunk>> {
        self.queue.lock().pop_front()
    }

    /// Wait for the next queued chunk.
    pub async fn next(&self) -> Arc<UnfinishedChunk> {
        loop {
            let queued = self.queued.notified();
            if let Some(chunk) = self.try_next() {
                return chunk;
            }
            queued.await;
        }
    }

    /// Number of queued chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl RepairWorker for ChunkQueue {
    fn queue_chunk_repair(&self, chunk: Arc<UnfinishedChunk>) {
        self.queue.lock().push_back(chunk);
        self.queued.notify_waiters();
    }
}
