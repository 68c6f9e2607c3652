//! Hand-off between the repair pipeline and the file download subsystem.

use super::chunk::RenterFile;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Downloads byte ranges of renter files from the network.
pub trait SectionDownloader: Send + Sync {
    /// Start downloading `length` bytes of `file` from `offset`.
    ///
    /// The download runs on its own; the returned handle resolves when it
    /// finishes.
    fn download_section(&self, file: &Arc<RenterFile>, offset: u64, length: u64) -> PendingDownload;
}

/// Create a linked completion signal and pending handle.
#[must_use]
pub fn pending_download() -> (DownloadCompletion, PendingDownload) {
    let (tx, rx) = oneshot::channel();
    (DownloadCompletion { tx }, PendingDownload { rx })
}

/// Sending half, held by the download subsystem.
#[derive(Debug)]
pub struct DownloadCompletion {
    tx: oneshot::Sender<Result<Bytes>>,
}

impl DownloadCompletion {
    /// Report the download's result. Ignored if nobody is waiting any more.
    pub fn finish(self, result: Result<Bytes>) {
        let _ = self.tx.send(result);
    }
}

/// A download that has been started.
#[derive(Debug)]
pub struct PendingDownload {
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl PendingDownload {
    /// A download that has already finished.
    #[must_use]
    pub fn ready(result: Result<Bytes>) -> Self {
        let (completion, pending) = pending_download();
        completion.finish(result);
        pending
    }

    /// Wait for the download to finish.
    ///
    /// # Errors
    ///
    /// Returns the download's own error, or [`Error::Download`] if the
    /// subsystem dropped the download without reporting a result.
    pub async fn wait(self) -> Result<Bytes> {
        self.rx
            .await
            .map_err(|_| Error::Download("download abandoned without a result".into()))?
    }
}
