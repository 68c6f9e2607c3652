//! Sector download sessions.

use super::conn::HostConn;
use super::messages::{DownloadAction, RPC_DOWNLOAD};
use super::negotiate::{
    negotiate_revision, send_rpc_selector, start_download, verify_recent_revision,
    verify_settings, write_negotiation_stop, NegotiatedRevision,
};
use super::{MAX_SECTOR_OBJECT, SECTOR_SIZE};
use crate::config::DownloaderConfig;
use crate::contract::{
    Contract, ContractHandle, ContractId, ContractRevision, ContractSet, Currency, RevisionSaver,
};
use crate::crypto::{merkle_root, Hash};
use crate::error::{Error, Result};
use crate::hostdb::{HostDirectory, HostEntry};
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A download session with one host under one contract.
///
/// Each [`sector`](Self::sector) call pays the host for one sector by
/// revising the contract, then verifies the data against the requested
/// root before the revision is committed.
///
/// ## Concurrency
///
/// **Sessions are NOT internally synchronised.** `sector` and `close` take
/// `&mut self`; callers must serialise calls on one session. Separate
/// sessions on separate contracts run independently, and sessions sharing a
/// contract are serialised by the [`ContractSet`].
///
/// ## Cancellation
///
/// The token given to [`connect`](Self::connect) aborts the dial, and a
/// background watcher closes the session if it fires later. Any I/O in
/// progress then fails with [`Error::Interrupted`].
pub struct SectorDownloader {
    contract_id: ContractId,
    contracts: Arc<ContractSet>,
    host: HostEntry,
    hdb: Arc<dyn HostDirectory>,
    config: DownloaderConfig,
    conn: HostConn,
    /// Leeway-adjusted price of one sector.
    price_basis: Currency,
    saver: Option<Arc<dyn RevisionSaver>>,
    /// Set when the host asked to end the session during the current call.
    host_stopping: bool,
}

impl SectorDownloader {
    /// Dial `host` and open a download session on contract `id`.
    ///
    /// # Errors
    ///
    /// Fails without I/O if the contract is missing, malformed, or cannot
    /// pay for one sector. Otherwise fails on dial, handshake or revision
    /// disagreement ([`Error::RevisionMismatch`]); the socket is closed
    /// before returning.
    pub async fn connect(
        host: HostEntry,
        id: ContractId,
        contracts: Arc<ContractSet>,
        hdb: Arc<dyn HostDirectory>,
        config: DownloaderConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        let contract = contracts.view(&id).ok_or(Error::ContractNotFound(id.0))?;
        if !contract.last_revision.is_well_formed() {
            return Err(Error::InvalidContract(format!(
                "contract {id} does not have two proof outputs"
            )));
        }
        let sector_price = host.download_bandwidth_price.mul_u64(SECTOR_SIZE);
        if contract.renter_funds() < sector_price {
            return Err(Error::InsufficientFunds {
                available: contract.renter_funds().0,
                required: sector_price.0,
            });
        }

        let result = Self::handshake(&host, &contract, &config, &cancel).await;
        match &result {
            Ok(_) => hdb.increment_successful_interactions(&contract.host_public_key),
            // A revision mismatch might not be the host's fault.
            Err(e) if e.is_revision_mismatch() => {}
            Err(_) => hdb.increment_failed_interactions(&contract.host_public_key),
        }
        let conn = result?;

        info!(
            "Opened download session with host {} ({}) on contract {}",
            host.public_key, host.net_address, id
        );

        Ok(Self {
            contract_id: id,
            contracts,
            price_basis: sector_price.with_leeway(config.price_leeway_per_mille),
            host,
            hdb,
            config,
            conn,
            saver: None,
            host_stopping: false,
        })
    }

    /// Persist fallback revisions through `saver` before each payment.
    #[must_use]
    pub fn with_revision_saver(mut self, saver: Arc<dyn RevisionSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Dial, spawn the cancellation watcher, and agree on the latest
    /// revision.
    async fn handshake(
        host: &HostEntry,
        contract: &Contract,
        config: &DownloaderConfig,
        cancel: &CancellationToken,
    ) -> Result<HostConn> {
        let dial = tokio::time::timeout(
            config.dial_timeout(),
            TcpStream::connect(host.net_address.as_str()),
        );
        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Interrupted),
            res = dial => match res {
                Err(_) => {
                    return Err(Error::Dial {
                        address: host.net_address.clone(),
                        reason: format!("timed out after {:?}", config.dial_timeout()),
                    })
                }
                Ok(Err(e)) => {
                    return Err(Error::Dial {
                        address: host.net_address.clone(),
                        reason: e.to_string(),
                    })
                }
                Ok(Ok(stream)) => stream,
            },
        };

        let mut conn = HostConn::new(stream, cancel.clone(), config.recent_revision_timeout())?;
        spawn_cancel_watcher(&conn, cancel.clone(), host);

        let agreed = {
            let mut conn = conn.scoped(config.idle_timeout());
            match send_rpc_selector(&mut conn, RPC_DOWNLOAD).await {
                Ok(()) => verify_recent_revision(&mut conn, contract).await,
                Err(e) => Err(rpc_initiation_error(e)),
            }
        };
        if let Err(e) = agreed {
            conn.state().try_close();
            conn.state().terminate();
            return Err(e);
        }
        Ok(conn)
    }

    /// Download the sector with Merkle root `root`, paying the host for it.
    ///
    /// On success the contract's revision, signed revision and download
    /// spending are updated together. On any error the contract is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// - precondition: [`Error::ContractNotFound`], [`Error::InsufficientFunds`]
    /// - transport: [`Error::Timeout`], [`Error::Io`], [`Error::SessionClosed`]
    /// - protocol: [`Error::HostRejected`], [`Error::PriceTooHigh`], [`Error::Crypto`]
    /// - integrity: [`Error::WrongSectorCount`], [`Error::SectorSizeMismatch`],
    ///   [`Error::SectorRootMismatch`]
    /// - [`Error::Interrupted`] if cancelled
    pub async fn sector(&mut self, root: &Hash) -> Result<Bytes> {
        if self.conn.state().is_closed() {
            return Err(self.conn.closed_error());
        }

        let result = self.fetch_sector(root).await;

        // A graceful stop from the host is honoured only after the sector
        // has been read.
        if std::mem::take(&mut self.host_stopping) {
            info!("Host {} ended the download session", self.host.public_key);
            self.conn.state().try_close();
            self.conn.state().terminate();
        }
        result
    }

    async fn fetch_sector(&mut self, root: &Hash) -> Result<Bytes> {
        // Another session may hold the contract for a whole payload exchange.
        let mut contract = tokio::select! {
            biased;
            () = self.conn.state().killed().cancelled() => return Err(self.conn.closed_error()),
            handle = self.contracts.acquire(&self.contract_id) => {
                handle.ok_or(Error::ContractNotFound(self.contract_id.0))?
            }
        };

        let price = self.price_basis;
        if contract.renter_funds() < price {
            return Err(Error::InsufficientFunds {
                available: contract.renter_funds().0,
                required: price.0,
            });
        }
        let revision = contract.last_revision.download_revision(price)?;
        let renter_signature = contract.sign_revision(&revision)?;

        let result = self
            .exchange(&contract, root, &revision, renter_signature)
            .await;
        match &result {
            Ok(_) => self
                .hdb
                .increment_successful_interactions(&contract.host_public_key),
            Err(e) if e.is_revision_mismatch() => {}
            Err(e) => {
                warn!(
                    "Sector {} from host {} failed: {e}",
                    hex::encode(&root.0[..8]),
                    self.host.public_key
                );
                self.hdb
                    .increment_failed_interactions(&contract.host_public_key);
            }
        }
        let (negotiated, data) = result?;

        commit(&mut contract, revision, negotiated, price);
        Ok(data)
    }

    /// The network half of a sector download.
    async fn exchange(
        &mut self,
        contract: &ContractHandle,
        root: &Hash,
        revision: &ContractRevision,
        renter_signature: ed25519_dalek::Signature,
    ) -> Result<(NegotiatedRevision, Bytes)> {
        let config = &self.config;
        let mut conn = self.conn.scoped(config.idle_timeout());

        conn.extend_deadline(config.settings_timeout());
        start_download(&mut conn, &self.host, self.price_basis).await?;

        conn.extend_deadline(config.action_timeout());
        conn.write_object("download action", &download_actions(root)).await?;

        // The host may or may not see the new revision if we die while it is
        // in flight, so keep the last agreed one on disk first.
        if let Some(saver) = &self.saver {
            saver
                .save(&contract.last_revision, &contract.merkle_roots)
                .await?;
        }

        conn.extend_deadline(config.revision_timeout());
        let negotiated =
            negotiate_revision(&mut conn, revision, renter_signature, &self.host.public_key)
                .await?;
        self.host_stopping = negotiated.host_stopping;

        conn.extend_deadline(config.download_timeout());
        let sectors: Vec<Vec<u8>> = conn.read_object("sector data", MAX_SECTOR_OBJECT).await?;
        let [sector] = <[Vec<u8>; 1]>::try_from(sectors)
            .map_err(|sectors| Error::WrongSectorCount(sectors.len()))?;
        verify_sector(root, &sector)?;

        debug!(
            "Downloaded sector {} from host {}",
            hex::encode(&root.0[..8]),
            self.host.public_key
        );
        Ok((negotiated, Bytes::from(sector)))
    }

    /// Close the session.
    ///
    /// The first call sends a best-effort goodbye to the host; later calls,
    /// and calls after the session was cancelled, only make sure the socket
    /// is shut. Always succeeds.
    ///
    /// # Errors
    ///
    /// Currently never returns an error.
    pub async fn close(&mut self) -> Result<()> {
        if self.conn.state().try_close() {
            let mut conn = self.conn.scoped(self.config.idle_timeout());
            conn.extend_deadline(self.config.settings_timeout());
            // The session is going away regardless of what the host says.
            let _ = verify_settings(&mut conn, &self.host).await;
            let _ = write_negotiation_stop(&mut conn).await;
            drop(conn);
            info!(
                "Closed download session with host {} on contract {}",
                self.host.public_key, self.contract_id
            );
        }
        self.conn.state().terminate();
        Ok(())
    }

    /// Whether the session can no longer be used.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.state().is_closed()
    }

    /// The host this session talks to.
    #[must_use]
    pub fn host(&self) -> &HostEntry {
        &self.host
    }

    /// The contract this session pays from.
    #[must_use]
    pub fn contract_id(&self) -> &ContractId {
        &self.contract_id
    }

    /// Leeway-adjusted price paid per sector.
    #[must_use]
    pub fn sector_price(&self) -> Currency {
        self.price_basis
    }
}

impl Drop for SectorDownloader {
    fn drop(&mut self) {
        // Releases the watcher task and the socket.
        self.conn.state().terminate();
    }
}

/// The action list requesting the whole sector `root`.
fn download_actions(root: &Hash) -> Vec<DownloadAction> {
    vec![DownloadAction {
        merkle_root: *root,
        offset: 0,
        length: SECTOR_SIZE,
    }]
}

/// Classify a failure to send the RPC selector. Transport failures and
/// cancellation keep their own kind.
fn rpc_initiation_error(e: Error) -> Error {
    match e {
        Error::Interrupted | Error::SessionClosed | Error::Timeout(_) | Error::Io(_) => e,
        other => Error::Protocol(format!("couldn't initiate RPC: {other}")),
    }
}

/// Check the sector length and root.
fn verify_sector(root: &Hash, sector: &[u8]) -> Result<()> {
    let expected = usize::try_from(SECTOR_SIZE).unwrap_or(usize::MAX);
    if sector.len() != expected {
        return Err(Error::SectorSizeMismatch {
            expected,
            actual: sector.len(),
        });
    }
    let actual = merkle_root(sector);
    if actual != *root {
        return Err(Error::SectorRootMismatch {
            expected: *root,
            actual,
        });
    }
    Ok(())
}

/// Apply a paid revision to the contract.
fn commit(
    contract: &mut ContractHandle,
    revision: ContractRevision,
    negotiated: NegotiatedRevision,
    price: Currency,
) {
    contract.last_revision = revision;
    contract.last_revision_txn = Some(negotiated.signed);
    contract.download_spending = contract.download_spending.saturating_add(price);
}

/// Close the session if `cancel` fires after construction.
fn spawn_cancel_watcher(conn: &HostConn, cancel: CancellationToken, host: &HostEntry) {
    let state = Arc::clone(conn.state());
    let host_key = host.public_key;
    tokio::spawn(async move {
        state.killed().cancelled().await;
        if cancel.is_cancelled() && state.try_close() {
            debug!("Download session with host {host_key} cancelled");
        }
        state.terminate();
    });
}
