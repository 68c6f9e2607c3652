//! # renter-repair
//!
//! The repair core of a renter in a contract-based distributed storage
//! network.
//!
//! Hosts store 4 MiB sectors under storage contracts. The renter pays for
//! every download by revising the contract, and the host counter-signs each
//! revision before sending the data.
//!
//! ## Components
//!
//! - [`ContractSet`] - exclusive per-contract access for concurrent sessions
//! - [`SectorDownloader`] - one download session with one host: signed,
//!   monotonic payment revisions, integrity checks, cancellation
//! - [`ChunkRepairer`] - loads a degraded chunk, re-encodes it and hands the
//!   missing shards to the upload workers
//!
//! ## Example
//!
//! ```rust,no_run
//! use renter_repair::{ContractSet, HostDb, HostEntry, SectorDownloader};
//! use renter_repair::config::DownloaderConfig;
//! use renter_repair::contract::ContractId;
//! use renter_repair::crypto::Hash;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn fetch(
//!     host: HostEntry,
//!     id: ContractId,
//!     contracts: Arc<ContractSet>,
//!     root: Hash,
//! ) -> renter_repair::Result<bytes::Bytes> {
//!     let mut session = SectorDownloader::connect(
//!         host,
//!         id,
//!         contracts,
//!         Arc::new(HostDb::new()),
//!         DownloaderConfig::default(),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!     let sector = session.sector(&root).await?;
//!     session.close().await?;
//!     Ok(sector)
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod hostdb;
pub mod proto;
pub mod repair;

pub use config::{DownloaderConfig, RepairConfig};
pub use contract::{ContractSet, RevisionJournal, RevisionSaver};
pub use error::{Error, ErrorKind, Result};
pub use hostdb::{HostDb, HostDirectory, HostEntry};
pub use proto::{SectorDownloader, SECTOR_SIZE};
pub use repair::{
    ChunkRepairer, ErasureCoder, MemoryAccountant, MemoryManager, RepairOutcome, RepairWorker,
    SectionDownloader, UnfinishedChunk, WorkerPool,
};
