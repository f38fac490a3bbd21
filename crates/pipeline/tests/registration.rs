mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{completed_package, ledger_config, FlakyStore, CHAIN_ID, CREATOR, STRANGER};
use taleforge_core::license::LicenseConfig;
use taleforge_core::package::{Package, PackageStatus};
use taleforge_core::registration::RegistrationRecord;
use taleforge_core::store::{MemoryPackageStore, PackageStore};
use taleforge_events::EventBus;
use taleforge_pipeline::metadata::document_hash;
use taleforge_pipeline::{
    RegisterRequest, RegistrationCoordinator, RegistrationError, TransactionError,
};
use taleforge_providers::fake::{FakeContentStore, FakeLedger};
use taleforge_providers::ledger::LedgerError;

struct Fixture {
    store: Arc<MemoryPackageStore>,
    ledger: Arc<FakeLedger>,
    content: Arc<FakeContentStore>,
    events: Arc<EventBus>,
    coordinator: RegistrationCoordinator,
}

impl Fixture {
    fn new(ledger: FakeLedger) -> Self {
        Self::with_content(ledger, FakeContentStore::new())
    }

    fn with_content(ledger: FakeLedger, content: FakeContentStore) -> Self {
        let store = Arc::new(MemoryPackageStore::new());
        Self::assemble(store.clone(), store, ledger, content)
    }

    /// Coordinator writes go through `flaky`; `store` reads the backing store.
    fn over(ledger: FakeLedger, flaky: FlakyStore) -> Self {
        let flaky = Arc::new(flaky);
        Self::assemble(flaky.inner.clone(), flaky, ledger, FakeContentStore::new())
    }

    fn assemble(
        store: Arc<MemoryPackageStore>,
        backing: Arc<dyn PackageStore>,
        ledger: FakeLedger,
        content: FakeContentStore,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let content = Arc::new(content);
        let events = Arc::new(EventBus::default());
        let coordinator = RegistrationCoordinator::new(
            backing,
            ledger.clone(),
            content.clone(),
            events.clone(),
            ledger_config(),
        );
        Self {
            store,
            ledger,
            content,
            events,
            coordinator,
        }
    }

    async fn completed(&self) -> Package {
        completed_package(self.store.as_ref(), Some(CREATOR)).await
    }

    async fn register(&self, id: uuid::Uuid, signer: &str) -> Result<taleforge_pipeline::RegistrationOutcome, RegistrationError> {
        self.coordinator
            .register(RegisterRequest {
                package_id: id,
                signer: Some(signer.to_string()),
                license: LicenseConfig::default(),
            })
            .await
    }
}

#[tokio::test]
async fn completed_package_is_registered_and_recorded() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let mut events = f.events.subscribe();
    let package = f.completed().await;

    let outcome = f.register(package.id, CREATOR).await.unwrap();
    assert_eq!(outcome.asset_id, "0xasset0001");
    assert!(!outcome.already_registered);
    assert!(outcome.warning.is_none());
    assert_eq!(outcome.license_terms_id.as_deref(), Some("101"));

    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert_eq!(stored.asset_id.as_deref(), Some("0xasset0001"));
    assert_eq!(stored.owner_address.as_deref(), Some(CREATOR));
    assert_eq!(stored.tx_hash, outcome.tx_hash);
    assert_eq!(stored.status, PackageStatus::Completed);
    assert!(stored.registration_started_at.is_none());

    let minted = f.ledger.minted();
    assert_eq!(minted.len(), 1);
    assert_eq!(minted[0].media_hash, format!("0x{}", package.content_hash));
    assert_eq!(minted[0].recipient, CREATOR);

    let documents = f.content.documents();
    assert_eq!(documents.len(), 2);
    let display = documents
        .iter()
        .find(|(name, _)| name.ends_with("nft-metadata.json"))
        .map(|(_, doc)| doc)
        .unwrap();
    assert_eq!(display["name"], "The Star Whale");
    assert_eq!(minted[0].nft_metadata_hash, document_hash(display));

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, "asset.registered");
}

#[tokio::test]
async fn missing_signer_is_reported_first() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = f.completed().await;
    let result = f
        .coordinator
        .register(RegisterRequest {
            package_id: package.id,
            signer: None,
            license: LicenseConfig::default(),
        })
        .await;
    assert_matches!(result, Err(RegistrationError::SignerNotConnected));
    assert!(f.ledger.calls().is_empty());
}

#[tokio::test]
async fn unfinished_package_cannot_be_registered() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let mut package = f.completed().await;
    package.status = PackageStatus::Processing;
    let other = MemoryPackageStore::new();
    other.insert(&package).await.unwrap();
    let coordinator = RegistrationCoordinator::new(
        Arc::new(other),
        f.ledger.clone(),
        f.content.clone(),
        f.events.clone(),
        ledger_config(),
    );

    let result = coordinator
        .register(RegisterRequest {
            package_id: package.id,
            signer: Some(CREATOR.into()),
            license: LicenseConfig::default(),
        })
        .await;
    assert_matches!(
        result,
        Err(RegistrationError::PackageNotCompleted { status: PackageStatus::Processing })
    );
}

#[tokio::test]
async fn creator_mismatch_is_rejected_before_any_network_work() {
    let f = Fixture::new(FakeLedger::on_chain(1));
    let package = f.completed().await;

    assert_matches!(
        f.register(package.id, STRANGER).await,
        Err(RegistrationError::CreatorMismatch)
    );
    assert!(f.ledger.calls().is_empty());
    assert!(f.content.documents().is_empty());
}

#[tokio::test]
async fn package_without_creator_is_rejected() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = completed_package(f.store.as_ref(), None).await;
    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::MissingCreator)
    );
}

#[tokio::test]
async fn re_registration_by_the_same_owner_is_a_no_op() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = f.completed().await;

    let first = f.register(package.id, CREATOR).await.unwrap();
    let second = f.register(package.id, CREATOR).await.unwrap();

    assert!(second.already_registered);
    assert_eq!(second.asset_id, first.asset_id);
    assert_eq!(second.tx_hash, first.tx_hash);
    assert_eq!(f.ledger.transaction_count(), 1);
}

#[tokio::test]
async fn package_owned_by_someone_else_is_rejected() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = f.completed().await;
    f.store
        .finish_registration(
            package.id,
            &RegistrationRecord {
                asset_id: "0xforeign".into(),
                owner_address: STRANGER.into(),
                tx_hash: "0xtx".into(),
                license_terms_id: None,
            },
        )
        .await
        .unwrap();

    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::AlreadyRegisteredByAnother { asset_id }) if asset_id == "0xforeign"
    );
    assert_eq!(f.ledger.transaction_count(), 0);
}

#[tokio::test]
async fn invalid_license_is_rejected_before_the_network_check() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = f.completed().await;
    let result = f
        .coordinator
        .register(RegisterRequest {
            package_id: package.id,
            signer: Some(CREATOR.into()),
            license: LicenseConfig {
                commercial_use: false,
                commercial_remix: false,
                revenue_share_percent: 0,
                minting_fee: 5,
            },
        })
        .await;
    assert_matches!(result, Err(RegistrationError::InvalidLicense(_)));
    assert!(f.ledger.calls().is_empty());
}

#[tokio::test]
async fn wrong_chain_is_switched_before_registering() {
    let f = Fixture::new(FakeLedger::on_chain(1).with_known_chain(CHAIN_ID));
    let package = f.completed().await;

    f.register(package.id, CREATOR).await.unwrap();
    assert_eq!(f.ledger.current_chain(), CHAIN_ID);
    let calls = f.ledger.calls();
    assert_eq!(&calls[..3], ["chain_id", "switch_chain", "chain_id"]);
    assert!(!calls.contains(&"add_chain".to_string()));
}

#[tokio::test]
async fn unknown_chain_is_added_then_switched() {
    let f = Fixture::new(FakeLedger::on_chain(1));
    let package = f.completed().await;

    f.register(package.id, CREATOR).await.unwrap();
    assert_eq!(f.ledger.current_chain(), CHAIN_ID);
    assert_eq!(
        &f.ledger.calls()[..5],
        ["chain_id", "switch_chain", "add_chain", "switch_chain", "chain_id"]
    );
}

#[tokio::test]
async fn failed_switch_submits_nothing() {
    let f = Fixture::new(FakeLedger::on_chain(1).with_switch_failure());
    let package = f.completed().await;

    let err = f.register(package.id, CREATOR).await.unwrap_err();
    assert_matches!(err, RegistrationError::NetworkSwitchFailed);
    assert_eq!(err.to_string(), "failed to switch network");
    assert_eq!(f.ledger.transaction_count(), 0);
    assert!(f.content.documents().is_empty());
}

#[tokio::test]
async fn switch_that_does_not_take_effect_fails() {
    let f = Fixture::new(
        FakeLedger::on_chain(1)
            .with_known_chain(CHAIN_ID)
            .with_ignored_switch(),
    );
    let package = f.completed().await;
    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::NetworkSwitchFailed)
    );
    assert_eq!(f.ledger.transaction_count(), 0);
}

#[tokio::test]
async fn rejected_signature_releases_the_lease() {
    let f = Fixture::new(
        FakeLedger::on_chain(CHAIN_ID)
            .with_tx_error(|| LedgerError::Rejected("User rejected the request".into())),
    );
    let package = f.completed().await;

    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::Transaction(TransactionError::SignerRejected))
    );
    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert!(stored.registration_started_at.is_none());
    assert!(stored.asset_id.is_none());
}

#[tokio::test]
async fn minting_misconfiguration_is_distinct() {
    let f = Fixture::new(
        FakeLedger::on_chain(CHAIN_ID)
            .with_tx_error(|| LedgerError::MintingConfiguration("SPG contract not set".into())),
    );
    let package = f.completed().await;
    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::Transaction(TransactionError::MintingConfigurationFault(_)))
    );
}

#[tokio::test]
async fn metadata_failure_submits_nothing() {
    let f = Fixture::with_content(FakeLedger::on_chain(CHAIN_ID), FakeContentStore::failing_json());
    let package = f.completed().await;

    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::MetadataPublishFailed(_))
    );
    assert_eq!(f.ledger.transaction_count(), 0);
    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert!(stored.registration_started_at.is_none());
}

#[tokio::test]
async fn held_lease_blocks_a_second_attempt() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID));
    let package = f.completed().await;
    assert!(f
        .store
        .try_begin_registration(package.id, chrono::Utc::now())
        .await
        .unwrap());

    assert_matches!(
        f.register(package.id, CREATOR).await,
        Err(RegistrationError::RegistrationInProgress)
    );
    assert_eq!(f.ledger.transaction_count(), 0);
}

#[tokio::test]
async fn held_lease_reports_a_registration_that_finished_meanwhile() {
    let winner = RegistrationRecord {
        asset_id: "0xwinner".into(),
        owner_address: CREATOR.into(),
        tx_hash: "0xtxwinner".into(),
        license_terms_id: Some("7".into()),
    };
    let f = Fixture::over(
        FakeLedger::on_chain(CHAIN_ID),
        FlakyStore::new().losing_lease_to(winner),
    );
    let package = f.completed().await;

    let outcome = f.register(package.id, CREATOR).await.unwrap();
    assert!(outcome.already_registered);
    assert_eq!(outcome.asset_id, "0xwinner");
    assert_eq!(outcome.tx_hash.as_deref(), Some("0xtxwinner"));
    assert_eq!(f.ledger.transaction_count(), 0);
}

#[tokio::test]
async fn unreadable_chain_is_a_chain_fault_not_a_switch_failure() {
    let f = Fixture::new(FakeLedger::on_chain(CHAIN_ID).with_chain_read_failure());
    let package = f.completed().await;

    let err = f.register(package.id, CREATOR).await.unwrap_err();
    assert_matches!(
        &err,
        RegistrationError::Transaction(TransactionError::ChainFault(msg))
            if msg.contains("wallet provider unavailable")
    );
    assert_eq!(f.ledger.calls(), vec!["chain_id".to_string()]);
    assert_eq!(f.ledger.transaction_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: confirmed registrations that cannot be saved
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_save_failure_is_retried() {
    let f = Fixture::over(FakeLedger::on_chain(CHAIN_ID), FlakyStore::new().failing_finish(1));
    let package = f.completed().await;

    let outcome = f.register(package.id, CREATOR).await.unwrap();
    assert!(outcome.warning.is_none());
    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert_eq!(stored.asset_id.as_deref(), Some("0xasset0001"));
    assert!(stored.registration_started_at.is_none());
}

#[tokio::test]
async fn unsaved_registration_is_returned_on_retry_without_minting_again() {
    // Fails every save in the first attempt, then recovers.
    let f = Fixture::over(FakeLedger::on_chain(CHAIN_ID), FlakyStore::new().failing_finish(3));
    let package = f.completed().await;

    let first = f.register(package.id, CREATOR).await.unwrap();
    assert_eq!(first.asset_id, "0xasset0001");
    assert!(!first.already_registered);
    let warning = first.warning.as_deref().unwrap();
    assert!(warning.contains("0xasset0001"), "{warning}");
    assert!(warning.contains("could not be saved"), "{warning}");

    // The lease stays taken so nothing else can submit.
    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert!(stored.asset_id.is_none());
    assert!(stored.registration_started_at.is_some());

    let second = f.register(package.id, CREATOR).await.unwrap();
    assert!(second.already_registered);
    assert_eq!(second.asset_id, "0xasset0001");
    assert_eq!(second.tx_hash, first.tx_hash);
    assert!(second.warning.is_none());
    assert_eq!(f.ledger.transaction_count(), 1);

    let stored = f.store.get(package.id).await.unwrap().unwrap();
    assert_eq!(stored.asset_id.as_deref(), Some("0xasset0001"));
    assert_eq!(stored.owner_address.as_deref(), Some(CREATOR));
    assert!(stored.registration_started_at.is_none());
}

#[tokio::test]
async fn unsaved_registration_is_not_handed_to_another_signer() {
    let f = Fixture::over(FakeLedger::on_chain(CHAIN_ID), FlakyStore::new().failing_finish(3));
    let package = f.completed().await;
    f.register(package.id, CREATOR).await.unwrap();

    assert_matches!(
        f.register(package.id, STRANGER).await,
        Err(RegistrationError::AlreadyRegisteredByAnother { asset_id }) if asset_id == "0xasset0001"
    );
    assert_eq!(f.ledger.transaction_count(), 1);
}
