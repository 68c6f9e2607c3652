//! Memory accounting for in-flight repairs.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

/// Receives memory released by the repair pipeline.
pub trait MemoryAccountant: Send + Sync {
    /// Return `bytes` to the shared budget.
    fn credit(&self, bytes: u64);
}

/// A fixed memory budget shared by concurrent repairs.
///
/// Callers reserve before loading a chunk; the pipeline credits memory back
/// as buffers are released.
#[derive(Debug)]
pub struct MemoryManager {
    capacity: u64,
    available: Mutex<u64>,
    released: Notify,
}

impl MemoryManager {
    /// Create a manager with `capacity` bytes available.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Notify::new(),
        }
    }

    /// Total budget.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        *self.available.lock()
    }

    /// Reserve `bytes` if they are available right now.
    pub fn try_reserve(&self, bytes: u64) -> bool {
        let bytes = bytes.min(self.capacity);
        let mut available = self.available.lock();
        if *available < bytes {
            return false;
        }
        *available -= bytes;
        true
    }

    /// Wait until `bytes` can be reserved, then reserve them.
    ///
    /// Requests larger than the whole budget wait for the whole budget.
    pub async fn reserve(&self, bytes: u64) {
        loop {
            let released = self.released.notified();
            if self.try_reserve(bytes) {
                return;
            }
            released.await;
        }
    }
}

impl MemoryAccountant for MemoryManager {
    fn credit(&self, bytes: u64) {
        {
            let mut available = self.available.lock();
            *available = available.saturating_add(bytes).min(self.capacity);
            trace!("Memory credited: {bytes} bytes, {} available", *available);
        }
        self.released.notify_waiters();
    }
}
