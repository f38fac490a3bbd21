//! In-process fakes for every provider trait.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for downstream crates. Every fake records what it was asked to
//! do so tests can assert on call order and payloads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use taleforge_core::package::ImageSize;

use crate::http::HttpError;
use crate::image::{GeneratedImage, ImageBackend, ImageError};
use crate::ledger::{
    AttachTermsReceipt, AttachTermsRequest, ChainParams, ClaimRoyaltyReceipt,
    ClaimRoyaltyRequest, LedgerClient, LedgerError, MintAndRegisterReceipt,
    MintAndRegisterRequest, MintLicenseReceipt, MintLicenseRequest, PayRoyaltyRequest, TxReceipt,
};
use crate::storage::{ContentStore, StorageError, StoredObject};
use crate::text::{CompletionRequest, TextCompletion, TextError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn outage(body: &str) -> HttpError {
    HttpError::Api {
        status: 503,
        body: body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

type TextResponder = Box<dyn Fn(&CompletionRequest) -> Result<String, TextError> + Send + Sync>;

/// Text completion answered by a closure.
pub struct FakeText {
    responder: TextResponder,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl FakeText {
    pub fn new(
        responder: impl Fn(&CompletionRequest) -> Result<String, TextError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same content.
    pub fn always(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_| Ok(content.clone()))
    }

    /// Fail every request with an upstream outage.
    pub fn failing() -> Self {
        Self::new(|_| Err(TextError::Http(outage("text model unavailable"))))
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TextCompletion for FakeText {
    async fn complete(&self, request: CompletionRequest) -> Result<String, TextError> {
        let result = (self.responder)(&request);
        lock(&self.calls).push(request);
        result
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Image backend that either always succeeds or always fails.
pub struct FakeImageBackend {
    name: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl FakeImageBackend {
    pub fn succeeding(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::succeeding(name)
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl ImageBackend for FakeImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, _size: ImageSize) -> Result<GeneratedImage, ImageError> {
        let n = {
            let mut prompts = lock(&self.prompts);
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if self.fail {
            return Err(ImageError::Http(outage(&format!("{} is down", self.name))));
        }
        Ok(GeneratedImage {
            url: format!("https://images.test/{}/{n}.png", self.name),
        })
    }
}

// ---------------------------------------------------------------------------
// Content store
// ---------------------------------------------------------------------------

/// Content store keeping everything in memory.
#[derive(Default)]
pub struct FakeContentStore {
    fail_files: bool,
    fail_json: bool,
    counter: AtomicUsize,
    files: Mutex<Vec<(String, String)>>,
    documents: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every file and JSON upload.
    pub fn failing() -> Self {
        Self {
            fail_files: true,
            fail_json: true,
            ..Self::default()
        }
    }

    /// Accept files but reject JSON documents.
    pub fn failing_json() -> Self {
        Self {
            fail_json: true,
            ..Self::default()
        }
    }

    /// `(source url, name)` of every file pinned so far.
    pub fn files(&self) -> Vec<(String, String)> {
        lock(&self.files).clone()
    }

    /// `(name, document)` of every JSON document pinned so far.
    pub fn documents(&self) -> Vec<(String, serde_json::Value)> {
        lock(&self.documents).clone()
    }

    fn next_object(&self) -> StoredObject {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let cid = format!("bafyfake{n:04}");
        StoredObject {
            url: self.gateway_url(&cid),
            cid,
        }
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn publish_from_url(&self, url: &str, name: &str) -> Result<StoredObject, StorageError> {
        if self.fail_files {
            return Err(StorageError::SourceFetch {
                url: url.to_string(),
                reason: "fake store rejects files".to_string(),
            });
        }
        lock(&self.files).push((url.to_string(), name.to_string()));
        Ok(self.next_object())
    }

    async fn publish_json(
        &self,
        document: &serde_json::Value,
        name: &str,
    ) -> Result<StoredObject, StorageError> {
        if self.fail_json {
            return Err(StorageError::Http(outage("fake store rejects documents")));
        }
        lock(&self.documents).push((name.to_string(), document.clone()));
        Ok(self.next_object())
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("https://gateway.test/ipfs/{cid}")
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

type ErrorFactory = Box<dyn Fn() -> LedgerError + Send + Sync>;

struct LedgerState {
    current_chain: u64,
    known_chains: HashSet<u64>,
    switch_fails: bool,
    switch_is_ignored: bool,
    add_chain_fails: bool,
    chain_read_fails: bool,
    owners: HashMap<String, String>,
    minted: Vec<MintAndRegisterRequest>,
    calls: Vec<String>,
    next_asset: usize,
}

/// Wallet and registry simulation.
///
/// Switching to a chain the wallet has not seen fails with
/// [`LedgerError::UnknownChain`] until [`add_chain`](LedgerClient::add_chain)
/// is called for it.
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    tx_error: Option<ErrorFactory>,
}

const TX_METHODS: [&str; 5] = [
    "mint_and_register",
    "attach_license_terms",
    "mint_license_tokens",
    "pay_royalty",
    "claim_royalty",
];

impl FakeLedger {
    /// Wallet currently on `chain_id`, which is the only chain it knows.
    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                current_chain: chain_id,
                known_chains: HashSet::from([chain_id]),
                switch_fails: false,
                switch_is_ignored: false,
                add_chain_fails: false,
                chain_read_fails: false,
                owners: HashMap::new(),
                minted: Vec::new(),
                calls: Vec::new(),
                next_asset: 1,
            }),
            tx_error: None,
        }
    }

    pub fn with_known_chain(self, chain_id: u64) -> Self {
        lock(&self.state).known_chains.insert(chain_id);
        self
    }

    /// Every switch request errors out.
    pub fn with_switch_failure(self) -> Self {
        lock(&self.state).switch_fails = true;
        self
    }

    /// Switch requests succeed but the wallet stays where it is.
    pub fn with_ignored_switch(self) -> Self {
        lock(&self.state).switch_is_ignored = true;
        self
    }

    pub fn with_add_chain_failure(self) -> Self {
        lock(&self.state).add_chain_fails = true;
        self
    }

    /// The wallet cannot report which chain it is on.
    pub fn with_chain_read_failure(self) -> Self {
        lock(&self.state).chain_read_fails = true;
        self
    }

    pub fn with_owner(self, asset_id: &str, owner: &str) -> Self {
        lock(&self.state)
            .owners
            .insert(asset_id.to_string(), owner.to_string());
        self
    }

    /// Make every transaction fail with the error `factory` builds.
    pub fn with_tx_error(mut self, factory: impl Fn() -> LedgerError + Send + Sync + 'static) -> Self {
        self.tx_error = Some(Box::new(factory));
        self
    }

    /// Method names in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of transactions submitted (successful or not).
    pub fn transaction_count(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| TX_METHODS.contains(&c.as_str()))
            .count()
    }

    pub fn minted(&self) -> Vec<MintAndRegisterRequest> {
        lock(&self.state).minted.clone()
    }

    pub fn current_chain(&self) -> u64 {
        lock(&self.state).current_chain
    }

    fn record(&self, method: &str) {
        lock(&self.state).calls.push(method.to_string());
    }

    fn submit(&self, method: &str) -> Result<String, LedgerError> {
        self.record(method);
        if let Some(factory) = &self.tx_error {
            return Err(factory());
        }
        Ok(format!("0xtx{:04}", lock(&self.state).calls.len()))
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn chain_id(&self, _signer: &str) -> Result<u64, LedgerError> {
        self.record("chain_id");
        let state = lock(&self.state);
        if state.chain_read_fails {
            return Err(LedgerError::Chain {
                code: Some(-32603),
                message: "wallet provider unavailable".to_string(),
            });
        }
        Ok(state.current_chain)
    }

    async fn switch_chain(&self, _signer: &str, chain_id: u64) -> Result<(), LedgerError> {
        self.record("switch_chain");
        let mut state = lock(&self.state);
        if state.switch_fails {
            return Err(LedgerError::Chain {
                code: Some(-32603),
                message: "wallet refused to switch".to_string(),
            });
        }
        if !state.known_chains.contains(&chain_id) {
            return Err(LedgerError::UnknownChain(chain_id));
        }
        if !state.switch_is_ignored {
            state.current_chain = chain_id;
        }
        Ok(())
    }

    async fn add_chain(&self, _signer: &str, params: &ChainParams) -> Result<(), LedgerError> {
        self.record("add_chain");
        let mut state = lock(&self.state);
        if state.add_chain_fails {
            return Err(LedgerError::Rejected("user rejected adding the chain".to_string()));
        }
        state.known_chains.insert(params.chain_id);
        Ok(())
    }

    async fn asset_owner(&self, asset_id: &str) -> Result<Option<String>, LedgerError> {
        self.record("asset_owner");
        Ok(lock(&self.state).owners.get(asset_id).cloned())
    }

    async fn mint_and_register(
        &self,
        signer: &str,
        request: &MintAndRegisterRequest,
    ) -> Result<MintAndRegisterReceipt, LedgerError> {
        let tx_hash = self.submit("mint_and_register")?;
        let mut state = lock(&self.state);
        let n = state.next_asset;
        state.next_asset += 1;
        let asset_id = format!("0xasset{n:04}");
        state.owners.insert(asset_id.clone(), signer.to_string());
        state.minted.push(request.clone());
        Ok(MintAndRegisterReceipt {
            asset_id,
            tx_hash,
            token_id: Some(n.to_string()),
            license_terms_id: Some(format!("{}", 100 + n)),
        })
    }

    async fn attach_license_terms(
        &self,
        _signer: &str,
        _request: &AttachTermsRequest,
    ) -> Result<AttachTermsReceipt, LedgerError> {
        let tx_hash = self.submit("attach_license_terms")?;
        Ok(AttachTermsReceipt {
            tx_hash,
            license_terms_id: "201".to_string(),
        })
    }

    async fn mint_license_tokens(
        &self,
        _signer: &str,
        request: &MintLicenseRequest,
    ) -> Result<MintLicenseReceipt, LedgerError> {
        let tx_hash = self.submit("mint_license_tokens")?;
        Ok(MintLicenseReceipt {
            tx_hash,
            license_token_ids: (1..=request.amount).map(|i| i.to_string()).collect(),
        })
    }

    async fn pay_royalty(
        &self,
        _signer: &str,
        _request: &PayRoyaltyRequest,
    ) -> Result<TxReceipt, LedgerError> {
        Ok(TxReceipt {
            tx_hash: self.submit("pay_royalty")?,
        })
    }

    async fn claim_royalty(
        &self,
        _signer: &str,
        _request: &ClaimRoyaltyRequest,
    ) -> Result<ClaimRoyaltyReceipt, LedgerError> {
        Ok(ClaimRoyaltyReceipt {
            tx_hash: self.submit("claim_royalty")?,
            claimed_amount: Some("0".to_string()),
        })
    }
}
