#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use taleforge_api::config::ServerConfig;
use taleforge_api::router::build_app_router;
use taleforge_api::state::AppState;
use taleforge_core::package::Package;
use taleforge_core::store::{MemoryPackageStore, PackageStore};
use taleforge_core::types::PackageId;
use taleforge_events::{EventBus, ProgressHub};
use taleforge_pipeline::analysis::ANALYSIS_SYSTEM_PROMPT;
use taleforge_pipeline::narrative::STORY_SYSTEM_PROMPT;
use taleforge_pipeline::synthesis::ImageSynthesizer;
use taleforge_pipeline::{
    LedgerConfig, LicensingCoordinator, Orchestrator, PipelineConfig, PipelineServices,
    RegistrationCoordinator, TextModels,
};
use taleforge_providers::fake::{FakeContentStore, FakeImageBackend, FakeLedger, FakeText};
use taleforge_providers::ledger::ChainParams;

pub const NARRATIVE: &str = "A lighthouse keeper finds a glass bottle full of tiny storms \
                             and decides to release them one by one over the silent sea.";

pub const CREATOR: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
pub const STRANGER: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";
pub const CHAIN_ID: u64 = 1315;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        progress_channel_max_secs: 300,
        database_url: None,
    }
}

fn lighthouse_text() -> FakeText {
    FakeText::new(|request| {
        Ok(if request.system == ANALYSIS_SYSTEM_PROMPT {
            json!({
                "title": "Bottled Storms",
                "title_translated": "병 속의 폭풍",
                "summary": "A keeper frees tiny storms over a quiet sea.",
                "summary_translated": "등대지기가 고요한 바다 위로 작은 폭풍을 풀어준다.",
                "characters": [{
                    "name": "Keeper",
                    "name_translated": "등대지기",
                    "description": "An old lighthouse keeper",
                    "description_translated": "늙은 등대지기"
                }],
                "world": {
                    "setting": "A lighthouse on a silent sea",
                    "setting_translated": "고요한 바다의 등대",
                    "atmosphere": "Hushed",
                    "atmosphere_translated": "숨죽인"
                },
                "objects": ["bottle"],
                "objects_translated": ["병"],
                "locations": ["lighthouse"],
                "locations_translated": ["등대"],
                "tones": ["whimsical"],
                "tones_translated": ["기발한"],
                "genres": ["fable"],
                "genres_translated": ["우화"],
                "emotions": ["wonder"],
                "emotions_translated": ["경이"]
            })
            .to_string()
        } else if request.system == STORY_SYSTEM_PROMPT {
            json!({
                "synopsis": "Every night the keeper uncorks one storm.",
                "synopsis_translated": "매일 밤 등대지기는 폭풍 하나를 꺼낸다.",
                "scene_bits": ["Thunder the size of a teacup."],
                "scene_bits_translated": ["찻잔만 한 천둥."],
                "lore": { "origin": "The bottle washed up after a shipwreck" },
                "lore_translated": "병은 난파선 뒤에 떠밀려 왔다."
            })
            .to_string()
        } else {
            "A lighthouse releasing tiny storms over a silent sea".to_string()
        })
    })
}

fn ledger_config() -> LedgerConfig {
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

/// The router plus the collaborators a test may want to inspect.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryPackageStore>,
    pub ledger: Arc<FakeLedger>,
    pub content: Arc<FakeContentStore>,
    pub progress: Arc<ProgressHub>,
}

/// Build the full application router over an in-memory store and fake
/// providers, through the same [`build_app_router`] that `main.rs` uses.
pub fn build_test_app() -> TestApp {
    build_test_app_with(FakeLedger::on_chain(CHAIN_ID))
}

pub fn build_test_app_with(ledger: FakeLedger) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryPackageStore::new());
    let ledger = Arc::new(ledger);
    let content = Arc::new(FakeContentStore::new());
    let progress = Arc::new(ProgressHub::default());
    let events = Arc::new(EventBus::default());

    let orchestrator = Orchestrator::new(Arc::new(PipelineServices {
        store: store.clone(),
        text: Arc::new(lighthouse_text()),
        images: ImageSynthesizer::new(
            Arc::new(FakeImageBackend::succeeding("primary")),
            Arc::new(FakeImageBackend::succeeding("secondary")),
        ),
        content: content.clone(),
        progress: progress.clone(),
        events: events.clone(),
        config: PipelineConfig {
            models: TextModels {
                standard: "standard-model".into(),
                advanced: "advanced-model".into(),
            },
            secondary_language: "Korean".into(),
        },
    }));

    let state = AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        pool: None,
        orchestrator,
        registration: Arc::new(RegistrationCoordinator::new(
            store.clone(),
            ledger.clone(),
            content.clone(),
            events.clone(),
            ledger_config(),
        )),
        licensing: Arc::new(LicensingCoordinator::new(
            store.clone(),
            ledger.clone(),
            events.clone(),
            ledger_config(),
        )),
        progress: progress.clone(),
        event_bus: events,
        shutdown: CancellationToken::new(),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        ledger,
        content,
        progress,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the store until the package reaches a terminal status.
pub async fn wait_for_terminal(app: &TestApp, id: PackageId) -> Package {
    for _ in 0..500 {
        if let Some(package) = app.store.get(id).await.unwrap() {
            if package.status.is_terminal() {
                return package;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("package {id} never reached a terminal status");
}

/// Submit [`NARRATIVE`] and wait for the pipeline to finish it.
pub async fn submit_and_finish(app: &TestApp, creator: Option<&str>) -> Package {
    let response = post_json(
        app,
        "/api/v1/jobs",
        json!({ "text": NARRATIVE, "user_id": "user-1", "creator_address": creator }),
    )
    .await;
    let json = body_json(response).await;
    let id: PackageId = json["data"]["job_id"].as_str().unwrap().parse().unwrap();
    wait_for_terminal(app, id).await
}
