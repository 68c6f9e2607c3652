//! Chunks awaiting repair.

use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Erasure code used by a file.
///
/// The code is fixed per file: every chunk of the file encodes into
/// [`num_pieces`](Self::num_pieces) shards, any
/// [`min_pieces`](Self::min_pieces) of which reconstruct it.
pub trait ErasureCoder: Send + Sync {
    /// Total shards produced per chunk.
    fn num_pieces(&self) -> usize;

    /// Shards needed to reconstruct a chunk.
    fn min_pieces(&self) -> usize;

    /// Encode `data` into an ordered sequence of shards.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if the data cannot be encoded.
    fn encode(&self, data: &[u8]) -> Result<Vec<Bytes>>;
}

/// A file tracked by the renter.
pub struct RenterFile {
    /// Path of the file within the renter's namespace.
    pub name: String,
    /// Erasure code the file was uploaded with.
    pub erasure_code: Arc<dyn ErasureCoder>,
}

impl fmt::Debug for RenterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenterFile")
            .field("name", &self.name)
            .field("num_pieces", &self.erasure_code.num_pieces())
            .field("min_pieces", &self.erasure_code.min_pieces())
            .finish()
    }
}

/// One chunk of a file, queued for a single repair attempt.
///
/// The logical and physical buffers only exist while the repair is in
/// progress; they are emptied as soon as their contents are no longer
/// needed.
#[derive(Debug)]
pub struct UnfinishedChunk {
    /// File the chunk belongs to.
    pub file: Arc<RenterFile>,
    /// Index of the chunk within the file.
    pub index: u64,
    /// Local copy of the file, if the renter still has one.
    pub local_path: Option<PathBuf>,
    /// Offset of the chunk within the file.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub length: u64,
    /// Total shards the chunk should have.
    pub pieces_needed: usize,
    /// Shards required to reconstruct the chunk.
    pub minimum_pieces: usize,
    /// Shards already stored durably.
    pub pieces_completed: usize,
    /// One flag per shard slot; `true` means the shard is already placed.
    pub piece_usage: Vec<bool>,
    /// Raw chunk data, held between fetch and encode.
    pub logical_chunk_data: Bytes,
    /// Encoded shards still to be distributed; `None` once not needed.
    physical_chunk_data: Mutex<Vec<Option<Bytes>>>,
}

impl UnfinishedChunk {
    /// Create a chunk with no shards placed yet.
    #[must_use]
    pub fn new(file: Arc<RenterFile>, index: u64, offset: u64, length: u64) -> Self {
        let pieces_needed = file.erasure_code.num_pieces();
        let minimum_pieces = file.erasure_code.min_pieces();
        Self {
            file,
            index,
            local_path: None,
            offset,
            length,
            pieces_needed,
            minimum_pieces,
            pieces_completed: 0,
            piece_usage: vec![false; pieces_needed],
            logical_chunk_data: Bytes::new(),
            physical_chunk_data: Mutex::new(Vec::new()),
        }
    }

    /// Set the local copy to read from.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Mark the shard at `index` as already placed.
    #[must_use]
    pub fn with_piece_placed(mut self, index: usize) -> Self {
        if let Some(slot) = self.piece_usage.get_mut(index) {
            if !*slot {
                *slot = true;
                self.pieces_completed += 1;
            }
        }
        self
    }

    /// Whether enough redundancy is missing to justify a network download.
    ///
    /// Chunks missing no more than a quarter of their redundancy are only
    /// repaired from a local copy.
    #[must_use]
    pub fn needs_download(&self) -> bool {
        let threshold = self.pieces_needed.saturating_sub(self.minimum_pieces) / 4;
        self.pieces_completed + threshold < self.pieces_needed
    }

    /// Exclusive access to the shard slots while the chunk is owned.
    pub fn physical_chunk_data_mut(&mut self) -> &mut Vec<Option<Bytes>> {
        self.physical_chunk_data.get_mut()
    }

    /// Take the shard at `index` for upload, leaving its slot empty.
    pub fn take_piece(&self, index: usize) -> Option<Bytes> {
        self.physical_chunk_data
            .lock()
            .get_mut(index)
            .and_then(Option::take)
    }

    /// Lengths of the shard slots; `None` for empty slots.
    #[must_use]
    pub fn piece_lengths(&self) -> Vec<Option<usize>> {
        self.physical_chunk_data
            .lock()
            .iter()
            .map(|piece| piece.as_ref().map(Bytes::len))
            .collect()
    }
}
