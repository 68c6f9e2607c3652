//! Fallback persistence for revisions that are about to be sent.
//!
//! If the renter crashes while a signed revision is in flight, it cannot
//! tell whether the host received it. Before every send the current
//! revision and sector roots are written to disk, so a restarted renter
//! still has the last state both parties definitely agreed on.
//!
//! Records live in a sharded layout:
//!
//! ```text
//! {root}/revisions/{xx}/{contract}.rev
//! ```

use super::types::{ContractId, ContractRevision};
use crate::crypto::Hash;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Hook invoked with the current revision before a new one is sent.
#[async_trait]
pub trait RevisionSaver: Send + Sync {
    /// Persist `revision` together with the contract's committed roots.
    ///
    /// # Errors
    ///
    /// An error aborts the download before the new revision is sent.
    async fn save(&self, revision: &ContractRevision, merkle_roots: &[Hash]) -> Result<()>;
}

/// Plain closures work as savers for in-memory bookkeeping.
#[async_trait]
impl<F> RevisionSaver for F
where
    F: Fn(&ContractRevision, &[Hash]) -> Result<()> + Send + Sync,
{
    async fn save(&self, revision: &ContractRevision, merkle_roots: &[Hash]) -> Result<()> {
        self(revision, merkle_roots)
    }
}

/// A persisted fallback revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRecord {
    /// Last revision both parties agreed on.
    pub revision: ContractRevision,
    /// Sector roots committed under that revision.
    pub merkle_roots: Vec<Hash>,
}

/// File-backed [`RevisionSaver`].
#[derive(Debug, Clone)]
pub struct RevisionJournal {
    root_dir: PathBuf,
}

impl RevisionJournal {
    /// Open a journal rooted at `root_dir`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        fs::create_dir_all(root_dir.join("revisions"))
            .await
            .map_err(|e| Error::Persist(format!("Failed to create journal directory: {e}")))?;
        debug!("Opened revision journal at {:?}", root_dir);
        Ok(Self { root_dir })
    }

    /// Load the fallback record for a contract, if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or decoded.
    pub async fn load(&self, id: &ContractId) -> Result<Option<FallbackRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .await
            .map_err(|e| Error::Persist(format!("Failed to read fallback record: {e}")))?;
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("corrupt fallback record {id}: {e}")))
    }

    /// Get the root directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn record_path(&self, id: &ContractId) -> PathBuf {
        self.root_dir
            .join("revisions")
            .join(format!("{:02x}", id.0[0]))
            .join(format!("{id}.rev"))
    }
}

#[async_trait]
impl RevisionSaver for RevisionJournal {
    async fn save(&self, revision: &ContractRevision, merkle_roots: &[Hash]) -> Result<()> {
        let record = FallbackRecord {
            revision: revision.clone(),
            merkle_roots: merkle_roots.to_vec(),
        };
        let bytes = bincode::serialize(&record).map_err(|e| Error::Serialization(e.to_string()))?;

        let path = self.record_path(&revision.parent_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Persist(format!("Failed to create shard directory: {e}")))?;
        }

        // Temp file + rename keeps the previous record intact on a torn write.
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Persist(format!("Failed to create temp file: {e}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| Error::Persist(format!("Failed to write record: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Persist(format!("Failed to sync record: {e}")))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::Persist(format!("Failed to rename temp file: {e}")))?;

        debug!(
            "Saved fallback revision #{} for contract {} ({} roots)",
            revision.revision_number,
            revision.parent_id,
            merkle_roots.len()
        );
        Ok(())
    }
}
