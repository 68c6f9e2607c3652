//! Individual protocol exchanges, each a few messages long.

use super::conn::HostConn;
use super::messages::{
    HostRevision, Response, RevisionChallenge, RevisionRequest, RevisionResponse, SignedSettings,
    Specifier,
};
use super::{MAX_CONTROL_OBJECT, SECTOR_SIZE};
use crate::contract::{Contract, ContractRevision, Currency, SignedRevision};
use crate::crypto::HostKey;
use crate::error::{Error, Result};
use crate::hostdb::HostEntry;
use ed25519_dalek::{Signature, Signer};
use tracing::{debug, warn};

/// Outcome of a successful revision exchange.
pub(crate) struct NegotiatedRevision {
    pub(crate) signed: SignedRevision,
    /// The host will end the session after this exchange.
    pub(crate) host_stopping: bool,
}

pub(crate) async fn send_rpc_selector(conn: &mut HostConn, rpc: Specifier) -> Result<()> {
    conn.write_object("RPC selector", &rpc).await
}

/// Prove ownership of the contract and check the host agrees on its latest
/// revision.
pub(crate) async fn verify_recent_revision(conn: &mut HostConn, contract: &Contract) -> Result<()> {
    conn.write_object("contract id", &contract.id).await?;

    let challenge: RevisionChallenge = conn.read_object("challenge", MAX_CONTROL_OBJECT).await?;
    let signature = contract.secret_key.sign(&challenge.0);
    conn.write_object("challenge response", &signature).await?;

    expect_accept(conn, "challenge acceptance").await?;

    let theirs: HostRevision = conn.read_object("recent revision", MAX_CONTROL_OBJECT).await?;
    let ours = &contract.last_revision;
    if theirs.revision.parent_id != ours.parent_id {
        return Err(Error::Protocol(format!(
            "host sent revision for contract {}, expected {}",
            theirs.revision.parent_id, ours.parent_id
        )));
    }
    if theirs.revision.revision_number != ours.revision_number
        || theirs.revision.file_merkle_root != ours.file_merkle_root
    {
        warn!(
            "Contract {}: host has revision #{}, we have #{}",
            contract.id, theirs.revision.revision_number, ours.revision_number
        );
        return Err(Error::RevisionMismatch {
            ours: ours.revision_number,
            theirs: theirs.revision.revision_number,
        });
    }

    debug!(
        "Contract {} agreed at revision #{}",
        contract.id, ours.revision_number
    );
    Ok(())
}

/// Read the host's settings and check they are signed by `host`.
pub(crate) async fn verify_settings(conn: &mut HostConn, host: &HostEntry) -> Result<SignedSettings> {
    let signed: SignedSettings = conn.read_object("host settings", MAX_CONTROL_OBJECT).await?;
    host.public_key
        .verify(&signed.settings.signing_bytes()?, &signed.signature)?;
    Ok(signed)
}

/// Confirm the host's current settings and tell it to continue.
///
/// A host advertising a sector price above `accepted_price` is refused.
pub(crate) async fn start_download(
    conn: &mut HostConn,
    host: &HostEntry,
    accepted_price: Currency,
) -> Result<()> {
    let signed = verify_settings(conn, host).await?;
    let advertised = signed.settings.download_bandwidth_price.mul_u64(SECTOR_SIZE);
    if advertised > accepted_price {
        let reason = format!("sector price {advertised} above {accepted_price}");
        // The error below is what matters; the host may already be gone.
        let _ = conn.write_object("settings rejection", &Response::Reject(reason)).await;
        return Err(Error::PriceTooHigh {
            advertised: advertised.0,
            accepted: accepted_price.0,
        });
    }
    conn.write_object("settings acceptance", &Response::Accept)
        .await
}

/// Send a signed revision and collect the host's counter-signature.
pub(crate) async fn negotiate_revision(
    conn: &mut HostConn,
    revision: &ContractRevision,
    renter_signature: Signature,
    host_key: &HostKey,
) -> Result<NegotiatedRevision> {
    let request = RevisionRequest {
        revision: revision.clone(),
        renter_signature,
    };
    conn.write_object("revision", &request).await?;

    let response: RevisionResponse = conn
        .read_object("revision response", MAX_CONTROL_OBJECT)
        .await?;
    let (host_signature, host_stopping) = match response {
        RevisionResponse::Accepted { host_signature } => (host_signature, false),
        RevisionResponse::AcceptedAndStop { host_signature } => (host_signature, true),
        RevisionResponse::Rejected(reason) => return Err(Error::HostRejected(reason)),
    };
    host_key.verify(&revision.signing_bytes()?, &host_signature)?;

    Ok(NegotiatedRevision {
        signed: SignedRevision {
            revision: revision.clone(),
            renter_signature,
            host_signature,
        },
        host_stopping,
    })
}

/// Tell the host the session is over.
pub(crate) async fn write_negotiation_stop(conn: &mut HostConn) -> Result<()> {
    conn.write_object("negotiation stop", &Response::Stop).await
}

async fn expect_accept(conn: &mut HostConn, phase: &'static str) -> Result<()> {
    match conn.read_object::<Response>(phase, MAX_CONTROL_OBJECT).await? {
        Response::Accept => Ok(()),
        Response::Reject(reason) => Err(Error::HostRejected(reason)),
        Response::Stop => Err(Error::HostRejected("host ended the negotiation".into())),
    }
}
