//! Download session scenarios.

use super::mock_host::{host_key, sector, HostLog, HostScript, MockHost, SectorReply};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use renter_repair::config::DownloaderConfig;
use renter_repair::contract::{
    Contract, ContractId, ContractRevision, Currency, RevisionJournal, RevisionSaver,
};
use renter_repair::crypto::{merkle_root, Hash, HostKey};
use renter_repair::hostdb::InteractionStats;
use renter_repair::{ContractSet, Error, ErrorKind, HostDb, SectorDownloader, SECTOR_SIZE};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONTRACT: ContractId = ContractId([0xC0; 32]);

fn renter_key() -> SigningKey {
    SigningKey::from_bytes(&[0x11; 32])
}

/// Sector price with the default leeway applied.
fn price_basis() -> Currency {
    Currency(1)
        .mul_u64(SECTOR_SIZE)
        .with_leeway(DownloaderConfig::default().price_leeway_per_mille)
}

fn revision(renter_funds: Currency) -> ContractRevision {
    ContractRevision {
        parent_id: CONTRACT,
        revision_number: 10,
        file_size: 2 * SECTOR_SIZE,
        file_merkle_root: Hash::of(b"file"),
        valid_proof_outputs: vec![renter_funds, Currency(500)],
        missed_proof_outputs: vec![renter_funds, Currency(0)],
    }
}

fn contract(renter_funds: Currency) -> Contract {
    Contract {
        id: CONTRACT,
        host_public_key: HostKey::from(&host_key().verifying_key()),
        last_revision: revision(renter_funds),
        last_revision_txn: None,
        secret_key: renter_key(),
        download_spending: Currency::ZERO,
        merkle_roots: vec![merkle_root(&sector(1)), merkle_root(&sector(2))],
    }
}

struct Fixture {
    host: MockHost,
    contracts: Arc<ContractSet>,
    hdb: Arc<HostDb>,
    sectors: Vec<Vec<u8>>,
}

impl Fixture {
    async fn new(script: HostScript, renter_funds: Currency) -> Self {
        super::init_logging();
        let sectors = vec![sector(1), sector(2)];
        let host = MockHost::spawn(
            script,
            revision(renter_funds),
            renter_key().verifying_key(),
            sectors.clone(),
        )
        .await;
        let contracts = Arc::new(ContractSet::new());
        contracts.insert(contract(renter_funds));
        Self {
            host,
            contracts,
            hdb: Arc::new(HostDb::new()),
            sectors,
        }
    }

    async fn funded(script: HostScript) -> Self {
        Self::new(script, Currency(price_basis().0 * 10)).await
    }

    async fn connect(&self, cancel: CancellationToken) -> renter_repair::Result<SectorDownloader> {
        SectorDownloader::connect(
            self.host.entry(Currency(1)),
            CONTRACT,
            Arc::clone(&self.contracts),
            self.hdb.clone(),
            DownloaderConfig::default(),
            cancel,
        )
        .await
    }

    fn root(&self, i: usize) -> Hash {
        merkle_root(&self.sectors[i])
    }

    fn stats(&self) -> InteractionStats {
        self.hdb.interactions(&self.host.public_key())
    }

    fn contract(&self) -> Contract {
        self.contracts.view(&CONTRACT).unwrap()
    }
}

fn counts(successful: u64, failed: u64) -> InteractionStats {
    InteractionStats { successful, failed }
}

#[tokio::test]
async fn test_sectors_download_and_pay() {
    let f = Fixture::funded(HostScript::default()).await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();
    assert_eq!(f.stats(), counts(1, 0));
    assert_eq!(session.sector_price(), price_basis());

    for i in [0, 1, 0] {
        let data = session.sector(&f.root(i)).await.unwrap();
        assert_eq!(&data[..], &f.sectors[i][..]);
    }
    session.close().await.unwrap();

    let end = f.contract();
    let paid = Currency(price_basis().0 * 3);
    assert_eq!(end.last_revision.revision_number, start.last_revision.revision_number + 3);
    assert_eq!(
        end.last_revision.valid_proof_outputs,
        vec![
            start.last_revision.valid_proof_outputs[0].checked_sub(paid).unwrap(),
            start.last_revision.valid_proof_outputs[1].saturating_add(paid),
        ]
    );
    assert_eq!(
        end.last_revision.missed_proof_outputs,
        vec![
            start.last_revision.missed_proof_outputs[0].checked_sub(paid).unwrap(),
            start.last_revision.missed_proof_outputs[1].saturating_add(paid),
        ]
    );
    assert_eq!(end.download_spending, paid);
    let txn = end.last_revision_txn.expect("signed revision recorded");
    assert_eq!(txn.revision, end.last_revision);
    assert_eq!(f.stats(), counts(4, 0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let log = f.host.log.lock();
    assert_eq!(log.actions.len(), 3);
    assert_eq!(log.revisions.last(), Some(&end.last_revision));
    assert!(log.graceful_close);
    assert!(log.errors.is_empty(), "host errors: {:?}", log.errors);
}

#[tokio::test]
async fn test_two_blobs_is_wrong_sector_count() {
    let f = Fixture::funded(HostScript {
        replies: vec![SectorReply::TwoBlobs],
        ..HostScript::default()
    })
    .await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    let err = session.sector(&f.root(0)).await.unwrap_err();

    assert!(matches!(err, Error::WrongSectorCount(2)), "got {err}");
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(f.stats(), counts(1, 1));
    let end = f.contract();
    assert_eq!(end.last_revision, start.last_revision);
    assert_eq!(end.renter_funds(), start.renter_funds());
    assert!(end.last_revision_txn.is_none());
    assert_eq!(end.download_spending, Currency::ZERO);
}

#[tokio::test]
async fn test_bad_sector_data_is_root_mismatch() {
    let f = Fixture::funded(HostScript {
        replies: vec![SectorReply::Corrupt],
        ..HostScript::default()
    })
    .await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    let err = session.sector(&f.root(0)).await.unwrap_err();

    match err {
        Error::SectorRootMismatch { expected, actual } => {
            assert_eq!(expected, f.root(0));
            assert_ne!(actual, expected);
        }
        other => panic!("expected root mismatch, got {other}"),
    }
    let end = f.contract();
    assert_eq!(end.last_revision, start.last_revision);
    assert_eq!(end.renter_funds(), start.renter_funds());
    assert_eq!(end.download_spending, Currency::ZERO);
    assert_eq!(f.stats(), counts(1, 1));
}

#[tokio::test]
async fn test_rejected_revision_not_committed() {
    let f = Fixture::funded(HostScript {
        replies: vec![SectorReply::RejectRevision],
        ..HostScript::default()
    })
    .await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    let err = session.sector(&f.root(0)).await.unwrap_err();

    assert!(matches!(err, Error::HostRejected(_)), "got {err}");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(f.contract().last_revision, start.last_revision);
    assert_eq!(f.stats(), counts(1, 1));
}

#[tokio::test]
async fn test_revision_mismatch_touches_no_counter() {
    let f = Fixture::funded(HostScript {
        revision_skew: 5,
        ..HostScript::default()
    })
    .await;

    let err = f.connect(CancellationToken::new()).await.err().unwrap();

    assert!(
        matches!(err, Error::RevisionMismatch { ours: 10, theirs: 15 }),
        "got {err}"
    );
    assert!(err.is_revision_mismatch());
    assert_eq!(f.stats(), counts(0, 0));
}

#[tokio::test]
async fn test_insufficient_funds_never_dials() {
    let f = Fixture::new(HostScript::default(), Currency(100)).await;

    let err = f.connect(CancellationToken::new()).await.err().unwrap();

    assert!(matches!(err, Error::InsufficientFunds { .. }), "got {err}");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(f.stats(), counts(0, 0));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(f.host.log.lock().connections, 0);
}

#[tokio::test]
async fn test_unknown_contract() {
    let f = Fixture::funded(HostScript::default()).await;

    let err = SectorDownloader::connect(
        f.host.entry(Currency(1)),
        ContractId([0xAB; 32]),
        Arc::clone(&f.contracts),
        f.hdb.clone(),
        DownloaderConfig::default(),
        CancellationToken::new(),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, Error::ContractNotFound(_)));
    assert_eq!(f.stats(), counts(0, 0));
}

#[tokio::test]
async fn test_price_above_basis_rejected() {
    let f = Fixture::funded(HostScript {
        advertised_price: Some(Currency(2)),
        ..HostScript::default()
    })
    .await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    let err = session.sector(&f.root(0)).await.unwrap_err();

    assert!(matches!(err, Error::PriceTooHigh { .. }), "got {err}");
    assert_eq!(f.contract().last_revision, start.last_revision);
    assert_eq!(f.stats(), counts(1, 1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.host.log.lock().rejections.len(), 1);
}

#[tokio::test]
async fn test_graceful_stop_commits_then_closes() {
    let f = Fixture::funded(HostScript {
        replies: vec![SectorReply::HonestThenStop],
        ..HostScript::default()
    })
    .await;
    let start = f.contract();
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    let data = session.sector(&f.root(1)).await.unwrap();

    assert_eq!(&data[..], &f.sectors[1][..]);
    assert!(session.is_closed());
    let end = f.contract();
    assert_eq!(end.last_revision.revision_number, start.last_revision.revision_number + 1);
    assert_eq!(end.download_spending, price_basis());
    assert_eq!(f.stats(), counts(2, 0));

    let err = session.sector(&f.root(0)).await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed), "got {err}");
    assert_eq!(f.stats(), counts(2, 0));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_close_twice() {
    let f = Fixture::funded(HostScript::default()).await;
    let mut session = f.connect(CancellationToken::new()).await.unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();

    assert!(session.is_closed());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.host.log.lock().graceful_close);
}

#[tokio::test]
async fn test_cancel_after_connect_interrupts() {
    let f = Fixture::funded(HostScript::default()).await;
    let cancel = CancellationToken::new();
    let mut session = f.connect(cancel.clone()).await.unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), async {
        while !session.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("watcher should close the session");

    let err = session.sector(&f.root(0)).await.unwrap_err();
    assert!(matches!(err, Error::Interrupted), "got {err}");
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert_eq!(f.stats(), counts(1, 0));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_cancel_before_connect() {
    let f = Fixture::funded(HostScript::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = f.connect(cancel).await.err().unwrap();
    assert!(matches!(err, Error::Interrupted), "got {err}");
}

/// Journal saver that records how many revisions the host had seen at
/// each save.
struct RecordingJournal {
    journal: RevisionJournal,
    host_log: Arc<Mutex<HostLog>>,
    seen_by_host: Mutex<Vec<usize>>,
}

#[async_trait]
impl RevisionSaver for RecordingJournal {
    async fn save(
        &self,
        revision: &ContractRevision,
        merkle_roots: &[Hash],
    ) -> renter_repair::Result<()> {
        let seen = self.host_log.lock().revisions.len();
        self.seen_by_host.lock().push(seen);
        self.journal.save(revision, merkle_roots).await
    }
}

#[tokio::test]
async fn test_cancelled_connect_does_not_wait_for_contract() {
    let f = Fixture::funded(HostScript::default()).await;
    let _held = f.contracts.acquire(&CONTRACT).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), f.connect(cancel))
        .await
        .expect("connect should not wait for the contract holder")
        .err()
        .unwrap();

    assert!(matches!(err, Error::Interrupted), "got {err}");
    assert_eq!(f.stats(), counts(0, 0));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(f.host.log.lock().connections, 0);
}

#[tokio::test]
async fn test_connect_while_contract_held() {
    let f = Fixture::funded(HostScript::default()).await;
    let held = f.contracts.acquire(&CONTRACT).await.unwrap();

    let mut session = tokio::time::timeout(
        Duration::from_secs(2),
        f.connect(CancellationToken::new()),
    )
    .await
    .expect("connect should not wait for the contract holder")
    .unwrap();
    assert_eq!(f.stats(), counts(1, 0));

    drop(held);
    session.sector(&f.root(0)).await.unwrap();
    assert_eq!(f.stats(), counts(2, 0));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_cancel_while_waiting_for_contract() {
    let f = Fixture::funded(HostScript::default()).await;
    let cancel = CancellationToken::new();
    let mut session = f.connect(cancel.clone()).await.unwrap();
    let _held = f.contracts.acquire(&CONTRACT).await.unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let root = f.root(0);
    let err = tokio::time::timeout(Duration::from_secs(2), session.sector(&root))
        .await
        .expect("cancel should end the wait for the contract")
        .unwrap_err();

    assert!(matches!(err, Error::Interrupted), "got {err}");
    assert_eq!(f.stats(), counts(1, 0));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(f.host.log.lock().actions.is_empty());
}

#[tokio::test]
async fn test_journal_written_before_revision_sent() {
    let f = Fixture::funded(HostScript::default()).await;
    let start = f.contract();
    let dir = tempfile::tempdir().unwrap();
    let journal = RevisionJournal::open(dir.path()).await.unwrap();

    let saver = Arc::new(RecordingJournal {
        journal: journal.clone(),
        host_log: Arc::clone(&f.host.log),
        seen_by_host: Mutex::new(Vec::new()),
    });

    let mut session = f
        .connect(CancellationToken::new())
        .await
        .unwrap()
        .with_revision_saver(saver.clone());
    session.sector(&f.root(0)).await.unwrap();
    session.sector(&f.root(1)).await.unwrap();

    // Each save happened before the host saw the matching revision.
    assert_eq!(*saver.seen_by_host.lock(), vec![0, 1]);

    let record = journal
        .load(&CONTRACT)
        .await
        .unwrap()
        .expect("record saved");
    assert_eq!(
        record.revision.revision_number,
        start.last_revision.revision_number + 1
    );
    assert_eq!(record.merkle_roots, start.merkle_roots);
}

#[tokio::test]
async fn test_failed_save_aborts_payment() {
    let f = Fixture::funded(HostScript::default()).await;
    let start = f.contract();
    let saver = |_: &ContractRevision, _: &[Hash]| -> renter_repair::Result<()> {
        Err(Error::Persist("disk full".into()))
    };

    let mut session = f
        .connect(CancellationToken::new())
        .await
        .unwrap()
        .with_revision_saver(Arc::new(saver));
    let err = session.sector(&f.root(0)).await.unwrap_err();

    assert!(matches!(err, Error::Persist(_)), "got {err}");
    assert_eq!(f.contract().last_revision, start.last_revision);
    assert_eq!(f.stats(), counts(1, 1));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(f.host.log.lock().revisions.is_empty());
}

#[tokio::test]
async fn test_sessions_on_one_contract_serialise_revisions() {
    let f = Fixture::funded(HostScript::default()).await;
    let start = f.contract();
    let mut a = f.connect(CancellationToken::new()).await.unwrap();
    let mut b = f.connect(CancellationToken::new()).await.unwrap();

    let (r0, r1) = (f.root(0), f.root(1));
    let (ra, rb) = tokio::join!(a.sector(&r0), b.sector(&r1));
    ra.unwrap();
    rb.unwrap();

    let end = f.contract();
    assert_eq!(end.last_revision.revision_number, start.last_revision.revision_number + 2);
    assert_eq!(end.download_spending, Currency(price_basis().0 * 2));
    assert_eq!(f.stats(), counts(4, 0));
}
