//! Host metadata and interaction counters.
//!
//! Every download attempt that reaches a host counts as exactly one
//! successful or failed interaction. Scoring policy on top of the counts is
//! left to callers.

use crate::contract::Currency;
use crate::crypto::HostKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// What the renter knows about a host.
#[derive(Debug, Clone)]
pub struct HostEntry {
    /// Host identity.
    pub public_key: HostKey,
    /// `host:port` to dial.
    pub net_address: String,
    /// Host software version.
    pub version: String,
    /// Price per byte downloaded.
    pub download_bandwidth_price: Currency,
}

/// Sink for host reputation counters.
pub trait HostDirectory: Send + Sync {
    /// Record a successful interaction with `host`.
    fn increment_successful_interactions(&self, host: &HostKey);
    /// Record a failed interaction with `host`.
    fn increment_failed_interactions(&self, host: &HostKey);
}

/// Interaction counts for one host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionStats {
    /// Successful interactions.
    pub successful: u64,
    /// Failed interactions.
    pub failed: u64,
}

/// In-memory [`HostDirectory`].
#[derive(Debug, Default)]
pub struct HostDb {
    interactions: RwLock<HashMap<HostKey, InteractionStats>>,
}

impl HostDb {
    /// Create an empty host database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts for `host`, zero if it was never seen.
    #[must_use]
    pub fn interactions(&self, host: &HostKey) -> InteractionStats {
        self.interactions
            .read()
            .get(host)
            .copied()
            .unwrap_or_default()
    }
}

impl HostDirectory for HostDb {
    fn increment_successful_interactions(&self, host: &HostKey) {
        let mut interactions = self.interactions.write();
        let stats = interactions.entry(*host).or_default();
        stats.successful += 1;
        trace!("Host {host}: {} successful interactions", stats.successful);
    }

    fn increment_failed_interactions(&self, host: &HostKey) {
        let mut interactions = self.interactions.write();
        let stats = interactions.entry(*host).or_default();
        stats.failed += 1;
        trace!("Host {host}: {} failed interactions", stats.failed);
    }
}
