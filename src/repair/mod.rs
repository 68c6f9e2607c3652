//! Chunk repair.
//!
//! A chunk that has lost redundancy is loaded (from the local copy if the
//! renter still has one, otherwise from the network), erasure coded, stripped
//! of the shards that are still stored, and handed to every upload worker.

mod chunk;
mod download;
mod memory;
mod pipeline;
mod workers;

pub use chunk::{ErasureCoder, RenterFile, UnfinishedChunk};
pub use download::{pending_download, DownloadCompletion, PendingDownload, SectionDownloader};
pub use memory::{MemoryAccountant, MemoryManager};
pub use pipeline::{ChunkRepairer, RepairOutcome};
pub use workers::{ChunkQueue, RepairWorker, WorkerPool};
