//! Hashing and signing primitives.
//!
//! Sectors are identified by the root of a binary SHA-256 merkle tree built
//! over 64-byte segments:
//!
//! ```text
//! leaf = SHA256(0x00 || segment)
//! node = SHA256(0x01 || left || right)
//! ```
//!
//! An odd node at the end of a level is promoted unchanged.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of one merkle leaf segment in bytes.
pub const SEGMENT_SIZE: usize = 64;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Hash arbitrary bytes.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

fn leaf_hash(segment: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(segment);
    Hash(hasher.finalize().into())
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.0);
    hasher.update(right.0);
    Hash(hasher.finalize().into())
}

/// Compute the merkle root of `data`.
///
/// This is the canonical content address of a sector. Empty input hashes to
/// the leaf hash of an empty segment.
#[must_use]
pub fn merkle_root(data: &[u8]) -> Hash {
    if data.is_empty() {
        return leaf_hash(&[]);
    }

    let mut level: Vec<Hash> = data.chunks(SEGMENT_SIZE).map(leaf_hash).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => node_hash(left, right),
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

/// Host identity: an ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostKey(pub [u8; 32]);

impl HostKey {
    /// Verify `signature` over `message` with this key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Crypto`] if the key is malformed or the
    /// signature does not verify.
    pub fn verify(&self, message: &[u8], signature: &ed25519_dalek::Signature) -> crate::Result<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| crate::Error::Crypto(format!("invalid host key: {e}")))?;
        key.verify_strict(message, signature)
            .map_err(|e| crate::Error::Crypto(format!("bad signature from {self}: {e}")))
    }
}

impl From<&ed25519_dalek::VerifyingKey> for HostKey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ed25519:{}", hex::encode(&self.0[..8]))
    }
}
