//! Turning an unfinished chunk into shards ready for upload.

use super::chunk::UnfinishedChunk;
use super::download::SectionDownloader;
use super::memory::MemoryAccountant;
use super::workers::WorkerPool;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Result of one [`ChunkRepairer::repair_chunk`] call.
///
/// Purely informational: the chunk is either handed to the workers or
/// dropped, and a later scan picks it up again.
#[derive(Debug)]
pub enum RepairOutcome {
    /// Shards were handed to the worker pool.
    Distributed {
        /// Workers that received the chunk.
        workers: usize,
        /// Bytes credited back to the memory accountant.
        memory_freed: u64,
    },
    /// The chunk's data could not be obtained.
    FetchFailed(Error),
    /// The chunk's data could not be erasure coded.
    EncodeFailed(Error),
    /// The encoder produced fewer shards than the chunk has slots.
    Inconsistent(Error),
}

impl RepairOutcome {
    /// Whether the chunk reached the worker pool.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::Distributed { .. })
    }
}

/// Prepares chunks for repair and hands them to the upload workers.
pub struct ChunkRepairer {
    downloads: Arc<dyn SectionDownloader>,
    memory: Arc<dyn MemoryAccountant>,
    workers: Arc<WorkerPool>,
    shutdown: CancellationToken,
}

impl ChunkRepairer {
    /// Create a repairer. `shutdown` aborts waits on in-flight downloads.
    #[must_use]
    pub fn new(
        downloads: Arc<dyn SectionDownloader>,
        memory: Arc<dyn MemoryAccountant>,
        workers: Arc<WorkerPool>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            downloads,
            memory,
            workers,
            shutdown,
        }
    }

    /// Run one repair attempt for `chunk`.
    pub async fn repair_chunk(&self, mut chunk: UnfinishedChunk) -> RepairOutcome {
        let allow_download = chunk.needs_download();

        if let Err(e) = self.fetch_logical_data(&mut chunk, allow_download).await {
            debug!(
                "Fetching logical data of chunk {} of {} failed: {e}",
                chunk.index, chunk.file.name
            );
            return RepairOutcome::FetchFailed(e);
        }

        let shards = match chunk.file.erasure_code.encode(&chunk.logical_chunk_data) {
            Ok(shards) => shards,
            Err(e) => {
                debug!(
                    "Encoding chunk {} of {} failed: {e}",
                    chunk.index, chunk.file.name
                );
                return RepairOutcome::EncodeFailed(e);
            }
        };

        let mut memory_freed = std::mem::take(&mut chunk.logical_chunk_data).len() as u64;

        if shards.len() < chunk.piece_usage.len() {
            let e = Error::InvariantViolation(format!(
                "chunk {} of {} encoded into {} shards but has {} piece slots",
                chunk.index,
                chunk.file.name,
                shards.len(),
                chunk.piece_usage.len()
            ));
            error!(critical = true, "{e}");
            self.memory.credit(memory_freed);
            return RepairOutcome::Inconsistent(e);
        }

        let mut physical: Vec<Option<Bytes>> = shards.into_iter().map(Some).collect();
        for (slot, placed) in physical.iter_mut().zip(&chunk.piece_usage) {
            if *placed {
                if let Some(shard) = slot.take() {
                    memory_freed += shard.len() as u64;
                }
            }
        }
        *chunk.physical_chunk_data_mut() = physical;

        if memory_freed > 0 {
            self.memory.credit(memory_freed);
        }

        let index = chunk.index;
        let chunk = Arc::new(chunk);
        let workers = self.workers.queue_chunk_repair(&chunk);
        trace!(
            "Chunk {index} of {} handed to {workers} workers",
            chunk.file.name
        );
        RepairOutcome::Distributed {
            workers,
            memory_freed,
        }
    }

    /// Load the chunk's raw data into `chunk.logical_chunk_data`.
    ///
    /// The local copy is preferred. When it is missing or unreadable the
    /// data is downloaded, but only if `allow_download` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotAvailableLocally`] or [`Error::LocalRead`]
    /// when the local copy cannot be used and downloading is not allowed,
    /// and any download error otherwise.
    pub async fn fetch_logical_data(
        &self,
        chunk: &mut UnfinishedChunk,
        allow_download: bool,
    ) -> Result<()> {
        let Some(path) = chunk.local_path.clone() else {
            if allow_download {
                return self.download_logical_data(chunk).await;
            }
            return Err(Error::FileNotAvailableLocally);
        };

        match read_local(&path, chunk.offset, chunk.length).await {
            Ok(data) => {
                chunk.logical_chunk_data = Bytes::from(data);
                Ok(())
            }
            Err(e) if allow_download => {
                debug!(
                    "Local copy {} unusable, downloading chunk {}: {e}",
                    path.display(),
                    chunk.index
                );
                self.download_logical_data(chunk).await
            }
            Err(e) => Err(Error::LocalRead(e)),
        }
    }

    /// Download the chunk's raw data from the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interrupted`] if shutdown fires first, the download's
    /// own error if it fails, and [`Error::Download`] if it returns the wrong
    /// number of bytes.
    pub async fn download_logical_data(&self, chunk: &mut UnfinishedChunk) -> Result<()> {
        let pending = self
            .downloads
            .download_section(&chunk.file, chunk.offset, chunk.length);

        let data = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(Error::Interrupted),
            result = pending.wait() => result?,
        };

        if data.len() as u64 != chunk.length {
            return Err(Error::Download(format!(
                "expected {} bytes for chunk {}, got {}",
                chunk.length,
                chunk.index,
                data.len()
            )));
        }
        chunk.logical_chunk_data = data;
        Ok(())
    }
}

async fn read_local(path: &Path, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let length = usize::try_from(length).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("chunk length {length} does not fit in memory"),
        )
    })?;
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut data = vec![0u8; length];
    file.read_exact(&mut data).await?;
    Ok(data)
}
