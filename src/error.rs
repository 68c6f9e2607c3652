//! Error types for renter-repair.

use crate::crypto::Hash;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Callers use the kind to decide whether a failure is worth retrying and
/// whether it reflects on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O (funds, malformed contract).
    Precondition,
    /// Dial, timeout, reset, or use of a closed session.
    Transport,
    /// The host broke or refused the protocol.
    Protocol,
    /// The host sent data that does not match what was requested.
    Integrity,
    /// A local fault: bad file parameters, persistence, encoding.
    Internal,
    /// Shutdown or cancellation preempted the operation.
    Interrupted,
}

/// Errors that can occur in renter-repair.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The contract is not tracked by the contract set.
    #[error("contract {} not present in contract set", hex::encode(.0))]
    ContractNotFound([u8; 32]),

    /// The contract does not have the expected shape.
    #[error("invalid contract: {0}")]
    InvalidContract(String),

    /// The contract cannot pay for another sector.
    #[error("contract has insufficient funds to support download: have {available}, need {required}")]
    InsufficientFunds {
        /// Funds remaining to the renter.
        available: u128,
        /// Price of one sector.
        required: u128,
    },

    /// Dialing the host failed.
    #[error("failed to dial host {address}: {reason}")]
    Dial {
        /// Host network address.
        address: String,
        /// Underlying failure.
        reason: String,
    },

    /// A protocol phase did not finish before its deadline.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The session was already closed.
    #[error("download session is closed")]
    SessionClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The host explicitly rejected a request.
    #[error("host rejected request: {0}")]
    HostRejected(String),

    /// The host and renter disagree on the latest revision.
    #[error("revision mismatch: ours is #{ours}, host has #{theirs}")]
    RevisionMismatch {
        /// Revision number held by the renter.
        ours: u64,
        /// Revision number reported by the host.
        theirs: u64,
    },

    /// The host advertised a price above what the session accepts.
    #[error("host sector price {advertised} exceeds accepted price {accepted}")]
    PriceTooHigh {
        /// Price the host advertised in its settings.
        advertised: u128,
        /// Leeway-adjusted price the renter is willing to pay.
        accepted: u128,
    },

    /// A signature did not verify.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The host sent a number of sectors other than one.
    #[error("host did not send the right number of sectors: expected 1, got {0}")]
    WrongSectorCount(usize),

    /// The sector had the wrong length.
    #[error("host did not send enough sector data: expected {expected} bytes, got {actual}")]
    SectorSizeMismatch {
        /// Expected sector length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// The sector's merkle root differs from the requested root.
    #[error("host sent bad sector data: expected root {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    SectorRootMismatch {
        /// Requested root.
        expected: Hash,
        /// Root of the received data.
        actual: Hash,
    },

    /// Persisting the fallback revision failed.
    #[error("failed to persist revision: {0}")]
    Persist(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The chunk has no local copy and downloading was not allowed.
    #[error("file not available locally")]
    FileNotAvailableLocally,

    /// Reading the chunk from its local file failed.
    #[error("failed to read file locally: {0}")]
    LocalRead(#[source] std::io::Error),

    /// The download subsystem failed to fetch a section.
    #[error("download failed: {0}")]
    Download(String),

    /// Erasure encoding failed.
    #[error("erasure encoding failed: {0}")]
    Encode(String),

    /// File parameters are inconsistent with the encoder output.
    #[error("internal consistency fault: {0}")]
    InvariantViolation(String),

    /// Shutdown or cancellation interrupted the operation.
    #[error("interrupted by shutdown")]
    Interrupted,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ContractNotFound(_)
            | Self::InvalidContract(_)
            | Self::InsufficientFunds { .. }
            | Self::FileNotAvailableLocally => ErrorKind::Precondition,
            Self::Dial { .. }
            | Self::Timeout(_)
            | Self::SessionClosed
            | Self::Io(_)
            | Self::LocalRead(_)
            | Self::Download(_) => ErrorKind::Transport,
            Self::Protocol(_)
            | Self::HostRejected(_)
            | Self::RevisionMismatch { .. }
            | Self::PriceTooHigh { .. }
            | Self::Crypto(_) => ErrorKind::Protocol,
            Self::WrongSectorCount(_)
            | Self::SectorSizeMismatch { .. }
            | Self::SectorRootMismatch { .. } => ErrorKind::Integrity,
            Self::Persist(_)
            | Self::Serialization(_)
            | Self::Encode(_)
            | Self::InvariantViolation(_) => ErrorKind::Internal,
            Self::Interrupted => ErrorKind::Interrupted,
        }
    }

    /// Whether this error came from recent-revision disagreement, which may
    /// not be the host's fault.
    #[must_use]
    pub fn is_revision_mismatch(&self) -> bool {
        matches!(self, Self::RevisionMismatch { .. })
    }

    /// Whether the host sent data that failed verification.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        self.kind() == ErrorKind::Integrity
    }
}
