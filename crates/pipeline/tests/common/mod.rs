#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use taleforge_core::package::{ModelChoice, Package, PackageStatus, Record};
use taleforge_core::registration::RegistrationRecord;
use taleforge_core::store::{MemoryPackageStore, PackageStore, StoreError};
use taleforge_core::types::{PackageId, Timestamp};
use taleforge_events::{EventBus, ProgressHub};
use taleforge_pipeline::analysis::ANALYSIS_SYSTEM_PROMPT;
use taleforge_pipeline::narrative::STORY_SYSTEM_PROMPT;
use taleforge_pipeline::synthesis::ImageSynthesizer;
use taleforge_pipeline::{LedgerConfig, Orchestrator, PipelineConfig, PipelineServices, TextModels};
use taleforge_providers::fake::{FakeContentStore, FakeImageBackend, FakeText};
use taleforge_providers::ledger::ChainParams;

pub const WHALE: &str = "I dreamed of a whale made of stars flying over a desert at night, \
                         singing softly to the dunes while a lonely child followed its light.";

pub const CREATOR: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
pub const STRANGER: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";
pub const CHAIN_ID: u64 = 1315;

pub fn whale_analysis() -> serde_json::Value {
    json!({
        "title": "The Star Whale",
        "title_translated": "별고래",
        "summary": "A whale of starlight sings over a night desert while a child follows.",
        "summary_translated": "별빛 고래가 밤의 사막 위에서 노래하고 아이가 그 뒤를 따른다.",
        "characters": [
            {
                "name": "Star Whale",
                "name_translated": "별고래",
                "description": "A vast whale whose body is a constellation",
                "description_translated": "몸이 별자리로 이루어진 거대한 고래"
            },
            {
                "name": "Lonely Child",
                "name_translated": "외로운 아이",
                "description": "A child wandering the dunes",
                "description_translated": "모래 언덕을 헤매는 아이"
            }
        ],
        "world": {
            "setting": "A moonlit desert",
            "setting_translated": "달빛 사막",
            "atmosphere": "Quiet and luminous",
            "atmosphere_translated": "고요하고 빛나는"
        },
        "objects": ["constellation"],
        "objects_translated": ["별자리"],
        "locations": ["desert", "night sky"],
        "locations_translated": ["사막", "밤하늘"],
        "tones": ["dreamy", "melancholic"],
        "tones_translated": ["몽환적인", "우울한"],
        "genres": ["fantasy"],
        "genres_translated": ["판타지"],
        "emotions": ["longing"],
        "emotions_translated": ["그리움"]
    })
}

pub fn whale_story() -> serde_json::Value {
    json!({
        "synopsis": "Each night a whale of stars crosses the desert, and a child follows its song.",
        "synopsis_translated": "매일 밤 별고래가 사막을 건너고 아이는 그 노래를 따라간다.",
        "scene_bits": ["The dunes glow under the whale.", "The child hums along."],
        "scene_bits_translated": ["고래 아래 모래 언덕이 빛난다.", "아이가 따라 흥얼거린다."],
        "lore": { "origin": "Born from a falling star" },
        "lore_translated": "떨어지는 별에서 태어났다."
    })
}

/// Text model that answers each stage by its system prompt.
pub fn whale_text() -> FakeText {
    FakeText::new(|request| {
        Ok(if request.system == ANALYSIS_SYSTEM_PROMPT {
            whale_analysis().to_string()
        } else if request.system == STORY_SYSTEM_PROMPT {
            whale_story().to_string()
        } else {
            "A whale of starlight over moonlit dunes, dreamy and melancholic".to_string()
        })
    })
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        models: TextModels {
            standard: "standard-model".into(),
            advanced: "advanced-model".into(),
        },
        secondary_language: "Korean".into(),
    }
}

pub fn ledger_config() -> LedgerConfig {
    LedgerConfig {
        chain: ChainParams {
            chain_id: CHAIN_ID,
            chain_name: "Story Aeneid Testnet".into(),
            rpc_url: "https://rpc.test".into(),
            explorer_url: "https://explorer.test".into(),
            native_symbol: "IP".into(),
        },
        spg_contract: "0xc32a8a0ff3beddda58393d022af433e78739fabc".into(),
        currency_token: "0x1514000000000000000000000000000000000000".into(),
    }
}

/// Every collaborator of a pipeline run, kept concrete so tests can inspect
/// them.
pub struct Harness {
    pub store: Arc<MemoryPackageStore>,
    pub text: Arc<FakeText>,
    pub primary: Arc<FakeImageBackend>,
    pub secondary: Arc<FakeImageBackend>,
    pub content: Arc<FakeContentStore>,
    pub progress: Arc<ProgressHub>,
    pub events: Arc<EventBus>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            Arc::new(MemoryPackageStore::new()),
            whale_text(),
            FakeImageBackend::succeeding("primary"),
            FakeImageBackend::succeeding("secondary"),
            FakeContentStore::new(),
        )
    }

    pub fn build(
        store: Arc<MemoryPackageStore>,
        text: FakeText,
        primary: FakeImageBackend,
        secondary: FakeImageBackend,
        content: FakeContentStore,
    ) -> Self {
        Self::assemble(store.clone(), store, text, primary, secondary, content)
    }

    /// Run the pipeline against `flaky`; `store` still reads the backing
    /// memory store directly.
    pub fn over(flaky: Arc<FlakyStore>) -> Self {
        Self::assemble(
            flaky.inner.clone(),
            flaky,
            whale_text(),
            FakeImageBackend::succeeding("primary"),
            FakeImageBackend::succeeding("secondary"),
            FakeContentStore::new(),
        )
    }

    fn assemble(
        store: Arc<MemoryPackageStore>,
        backing: Arc<dyn PackageStore>,
        text: FakeText,
        primary: FakeImageBackend,
        secondary: FakeImageBackend,
        content: FakeContentStore,
    ) -> Self {
        let text = Arc::new(text);
        let primary = Arc::new(primary);
        let secondary = Arc::new(secondary);
        let content = Arc::new(content);
        let progress = Arc::new(ProgressHub::default());
        let events = Arc::new(EventBus::default());

        let services = PipelineServices {
            store: backing,
            text: text.clone(),
            images: ImageSynthesizer::new(primary.clone(), secondary.clone()),
            content: content.clone(),
            progress: progress.clone(),
            events: events.clone(),
            config: pipeline_config(),
        };

        Self {
            store,
            text,
            primary,
            secondary,
            content,
            progress,
            events,
            orchestrator: Orchestrator::new(Arc::new(services)),
        }
    }

    /// Insert a fresh draft for `text` and return it.
    pub async fn draft(&self, text: &str) -> Package {
        let package = Package::new_draft(
            Record::new("user-1", text),
            Some(CREATOR.to_string()),
            ModelChoice::Standard,
        );
        self.store.insert(&package).await.unwrap();
        package
    }

    /// Poll the store until the package reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: PackageId) -> Package {
        wait_for_terminal(self.store.as_ref(), id).await
    }
}

pub async fn wait_for_terminal(store: &dyn PackageStore, id: PackageId) -> Package {
    for _ in 0..500 {
        if let Some(package) = store.get(id).await.unwrap() {
            if package.status.is_terminal() {
                return package;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("package {id} never reached a terminal status");
}

/// A package that finished the pipeline, ready for registration.
pub async fn completed_package(store: &dyn PackageStore, creator: Option<&str>) -> Package {
    let harness = Harness::build(
        Arc::new(MemoryPackageStore::new()),
        whale_text(),
        FakeImageBackend::succeeding("primary"),
        FakeImageBackend::succeeding("secondary"),
        FakeContentStore::new(),
    );
    let mut draft = Package::new_draft(
        Record::new("user-1", WHALE),
        creator.map(str::to_string),
        ModelChoice::Standard,
    );
    harness.store.insert(&draft).await.unwrap();
    draft = harness.orchestrator.run(draft).await;
    assert_eq!(draft.status, PackageStatus::Completed);

    store.insert(&draft).await.unwrap();
    draft
}

// ---------------------------------------------------------------------------
// Failing store
// ---------------------------------------------------------------------------

/// Memory store whose writes can be made to fail on demand.
pub struct FlakyStore {
    pub inner: Arc<MemoryPackageStore>,
    terminal_failures: AtomicUsize,
    finish_failures: AtomicUsize,
    finish_attempts: AtomicUsize,
    lease_winner: Mutex<Option<RegistrationRecord>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryPackageStore::new()),
            terminal_failures: AtomicUsize::new(0),
            finish_failures: AtomicUsize::new(0),
            finish_attempts: AtomicUsize::new(0),
            lease_winner: Mutex::new(None),
        }
    }

    /// Reject the next `n` writes of a terminal status.
    pub fn failing_terminal_writes(self, n: usize) -> Self {
        self.terminal_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Reject the next `n` calls to `finish_registration`.
    pub fn failing_finish(self, n: usize) -> Self {
        self.finish_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Refuse the lease because `record` was registered by someone else
    /// in the meantime.
    pub fn losing_lease_to(self, record: RegistrationRecord) -> Self {
        *self.lease_winner.lock().unwrap() = Some(record);
        self
    }

    pub fn finish_attempts(&self) -> usize {
        self.finish_attempts.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn outage() -> StoreError {
        StoreError::Backend("connection reset".to_string())
    }
}

#[async_trait]
impl PackageStore for FlakyStore {
    async fn insert(&self, package: &Package) -> Result<(), StoreError> {
        self.inner.insert(package).await
    }

    async fn get(&self, id: PackageId) -> Result<Option<Package>, StoreError> {
        self.inner.get(id).await
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<Package>, StoreError> {
        self.inner.find_by_content_hash(content_hash).await
    }

    async fn find_by_asset_id(&self, asset_id: &str) -> Result<Option<Package>, StoreError> {
        self.inner.find_by_asset_id(asset_id).await
    }

    async fn release_content_hash(&self, id: PackageId) -> Result<(), StoreError> {
        self.inner.release_content_hash(id).await
    }

    async fn update_pipeline(&self, package: &Package) -> Result<(), StoreError> {
        if package.status.is_terminal() && Self::take_failure(&self.terminal_failures) {
            return Err(Self::outage());
        }
        self.inner.update_pipeline(package).await
    }

    async fn set_visibility(&self, id: PackageId, is_public: bool) -> Result<(), StoreError> {
        self.inner.set_visibility(id, is_public).await
    }

    async fn try_begin_registration(
        &self,
        id: PackageId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let winner = self.lease_winner.lock().unwrap().take();
        if let Some(record) = winner {
            self.inner.finish_registration(id, &record).await?;
            return Ok(false);
        }
        self.inner.try_begin_registration(id, now).await
    }

    async fn finish_registration(
        &self,
        id: PackageId,
        record: &RegistrationRecord,
    ) -> Result<(), StoreError> {
        self.finish_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.finish_failures) {
            return Err(Self::outage());
        }
        self.inner.finish_registration(id, record).await
    }

    async fn abort_registration(&self, id: PackageId) -> Result<(), StoreError> {
        self.inner.abort_registration(id).await
    }

    async fn set_license_terms(&self, id: PackageId, terms_id: &str) -> Result<(), StoreError> {
        self.inner.set_license_terms(id, terms_id).await
    }
}
