//! Contract, revision and currency types.

use crate::crypto::{Hash, HostKey};
use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of proof outputs a renter-host contract carries (renter, host).
pub const PROOF_OUTPUTS: usize = 2;

/// An amount of currency in base units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Currency(pub u128);

impl Currency {
    /// Zero currency.
    pub const ZERO: Self = Self(0);

    /// Multiply by a byte count.
    #[must_use]
    pub fn mul_u64(self, n: u64) -> Self {
        Self(self.0.saturating_mul(u128::from(n)))
    }

    /// Inflate by `per_mille` thousandths, rounding down.
    ///
    /// `with_leeway(2)` is a 0.2% increase.
    #[must_use]
    pub fn with_leeway(self, per_mille: u32) -> Self {
        let factor = 1000 + u128::from(per_mille);
        Self(self.0.saturating_mul(factor) / 1000)
    }

    /// Subtract, returning `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Add, saturating at the maximum.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a file contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId(pub [u8; 32]);

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One revision of a file contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRevision {
    /// Contract being revised.
    pub parent_id: ContractId,
    /// Strictly increasing version number.
    pub revision_number: u64,
    /// Bytes of data stored under the contract.
    pub file_size: u64,
    /// Merkle root over all committed sector roots.
    pub file_merkle_root: Hash,
    /// Payouts if the host proves storage: `[renter, host]`.
    pub valid_proof_outputs: Vec<Currency>,
    /// Payouts if the host fails to prove storage: `[renter, host]`.
    pub missed_proof_outputs: Vec<Currency>,
}

impl ContractRevision {
    /// Funds left to the renter, if the revision is well formed.
    #[must_use]
    pub fn renter_funds(&self) -> Option<Currency> {
        self.valid_proof_outputs.first().copied()
    }

    /// Whether the revision carries exactly one renter and one host output
    /// in both output sets.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.valid_proof_outputs.len() == PROOF_OUTPUTS
            && self.missed_proof_outputs.len() == PROOF_OUTPUTS
    }

    /// Bytes covered by both parties' signatures.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Build the revision that pays `price` to the host for a download.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContract`] for a malformed revision and
    /// [`Error::InsufficientFunds`] if the renter cannot cover `price`.
    pub fn download_revision(&self, price: Currency) -> Result<Self> {
        if !self.is_well_formed() {
            return Err(Error::InvalidContract(format!(
                "expected {PROOF_OUTPUTS} proof outputs, got {} valid and {} missed",
                self.valid_proof_outputs.len(),
                self.missed_proof_outputs.len()
            )));
        }

        let insufficient = |available: Currency| Error::InsufficientFunds {
            available: available.0,
            required: price.0,
        };

        let mut rev = self.clone();
        rev.valid_proof_outputs[0] = self.valid_proof_outputs[0]
            .checked_sub(price)
            .ok_or_else(|| insufficient(self.valid_proof_outputs[0]))?;
        rev.valid_proof_outputs[1] = self.valid_proof_outputs[1].saturating_add(price);
        rev.missed_proof_outputs[0] = self.missed_proof_outputs[0]
            .checked_sub(price)
            .ok_or_else(|| insufficient(self.missed_proof_outputs[0]))?;
        rev.missed_proof_outputs[1] = self.missed_proof_outputs[1].saturating_add(price);
        rev.revision_number = self
            .revision_number
            .checked_add(1)
            .ok_or_else(|| Error::InvalidContract("revision number exhausted".into()))?;
        Ok(rev)
    }
}

/// A revision carrying signatures from both renter and host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRevision {
    /// The revision.
    pub revision: ContractRevision,
    /// Renter signature over [`ContractRevision::signing_bytes`].
    pub renter_signature: Signature,
    /// Host signature over [`ContractRevision::signing_bytes`].
    pub host_signature: Signature,
}

/// A renter's view of a file contract with one host.
#[derive(Debug, Clone)]
pub struct Contract {
    /// Contract identifier.
    pub id: ContractId,
    /// Key of the host on the other side of the contract.
    pub host_public_key: HostKey,
    /// Current accepted revision.
    pub last_revision: ContractRevision,
    /// Counter-signed form of `last_revision`, once one has been exchanged.
    pub last_revision_txn: Option<SignedRevision>,
    /// Renter's key for signing revisions.
    pub secret_key: SigningKey,
    /// Total spent on downloads.
    pub download_spending: Currency,
    /// Roots of every sector committed to the contract.
    pub merkle_roots: Vec<Hash>,
}

impl Contract {
    /// Funds left to the renter, zero if the revision is malformed.
    #[must_use]
    pub fn renter_funds(&self) -> Currency {
        self.last_revision.renter_funds().unwrap_or(Currency::ZERO)
    }

    /// Sign a revision with the renter's key.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision cannot be serialized.
    pub fn sign_revision(&self, revision: &ContractRevision) -> Result<Signature> {
        Ok(self.secret_key.sign(&revision.signing_bytes()?))
    }
}
