//! Message types exchanged with a host.

use crate::contract::{ContractRevision, Currency};
use crate::crypto::Hash;
use crate::error::{Error, Result};
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};

/// RPC selector sent at the start of a session.
pub type Specifier = [u8; 16];

/// Selector for the download RPC.
pub const RPC_DOWNLOAD: Specifier = *b"Download\0\0\0\0\0\0\0\0";

/// Generic negotiation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Continue with the negotiation.
    Accept,
    /// Refuse, with a reason.
    Reject(String),
    /// End the session.
    Stop,
}

/// Random nonce the renter must sign to prove it owns the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionChallenge(pub [u8; 32]);

/// The host's latest revision of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRevision {
    /// Revision the host considers current.
    pub revision: ContractRevision,
}

/// Settings a host advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// `host:port` the host is reachable at.
    pub net_address: String,
    /// Host software version.
    pub version: String,
    /// Price per byte downloaded.
    pub download_bandwidth_price: Currency,
}

impl HostSettings {
    /// Bytes covered by the host's settings signature.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Host settings with the host's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSettings {
    /// Advertised settings.
    pub settings: HostSettings,
    /// Host signature over [`HostSettings::signing_bytes`].
    pub signature: Signature,
}

/// A request for a byte range of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAction {
    /// Root of the sector to read.
    pub merkle_root: Hash,
    /// Offset within the sector.
    pub offset: u64,
    /// Number of bytes to read.
    pub length: u64,
}

/// A revision proposed by the renter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRequest {
    /// The proposed revision.
    pub revision: ContractRevision,
    /// Renter signature over [`ContractRevision::signing_bytes`].
    pub renter_signature: Signature,
}

/// The host's answer to a [`RevisionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionResponse {
    /// Revision accepted and counter-signed.
    Accepted {
        /// Host signature over the revision.
        host_signature: Signature,
    },
    /// Revision accepted and counter-signed, and the host will end the
    /// session once the data is sent.
    AcceptedAndStop {
        /// Host signature over the revision.
        host_signature: Signature,
    },
    /// Revision refused.
    Rejected(String),
}
