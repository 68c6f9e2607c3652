//! Renter side of the host download protocol.
//!
//! A download session follows a fixed message order:
//!
//! ```text
//! renter                                  host
//!   │── RPC selector ("Download") ────────▶│
//!   │── contract id ──────────────────────▶│
//!   │◀─────────────────────── challenge ───│
//!   │── challenge signature ──────────────▶│
//!   │◀──────────────────── accept/reject ──│
//!   │◀──────────────── latest revision ────│   recent-revision agreement
//!   │                                      │
//!   │   per sector:                        │
//!   │◀───────────────── signed settings ───│
//!   │── accept ───────────────────────────▶│
//!   │── [download action] ────────────────▶│
//!   │── revision + renter signature ──────▶│
//!   │◀──── accepted / accepted+stop / rejected
//!   │◀────────────────────── [sector] ─────│
//!   │                                      │
//!   │   close:                             │
//!   │◀───────────────── signed settings ───│
//!   │── stop ─────────────────────────────▶│
//! ```
//!
//! Every object is framed as an 8-byte little-endian length followed by
//! its bincode encoding. See [`wire`].

mod conn;
mod downloader;
pub mod messages;
mod negotiate;
pub mod wire;

pub use downloader::SectorDownloader;
pub use messages::{
    DownloadAction, HostRevision, HostSettings, Response, RevisionChallenge, RevisionRequest,
    RevisionResponse, SignedSettings, Specifier, RPC_DOWNLOAD,
};

/// Size of a sector in bytes (4 MiB).
pub const SECTOR_SIZE: u64 = 1 << 22;

/// Upper bound on the encoded sector list: one sector plus envelope.
pub const MAX_SECTOR_OBJECT: u64 = SECTOR_SIZE + 16;

/// Upper bound on every non-sector object.
pub const MAX_CONTROL_OBJECT: u64 = 16 * 1024;
