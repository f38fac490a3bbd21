//! Job orchestration: narrative in, completed package out.
//!
//! [`Orchestrator::create_job`] validates and deduplicates the submission,
//! stores a draft package and detaches a task that runs the stages in
//! order:
//!
//! | Step | Key | Fatal on error |
//! |------|-----|----------------|
//! | 1 | `analyzing` | yes |
//! | 2 | `writing_story` | yes |
//! | 3 | `key_visual` | yes |
//! | 4 | `character_visual` | yes |
//! | 5 | `world_visual` | yes |
//! | 6 | `publishing` | no |
//!
//! Entering a stage persists the package with the new [`Progress`] and
//! publishes it on the [`ProgressHub`]; each stage's output is persisted
//! when it finishes. A job always ends `completed` or `failed`, followed by
//! the matching terminal event. The terminal write is retried; a job whose
//! completion cannot be saved is reported as failed.

use std::sync::Arc;
use std::time::Duration;

use taleforge_core::address::normalize_address;
use taleforge_core::analysis::Analysis;
use taleforge_core::hashing::content_hash;
use taleforge_core::package::{
    ModelChoice, Package, PackageStatus, Progress, Record, Visual, VisualKind, PIPELINE_STEPS,
    STEP_ANALYZING, STEP_CHARACTER_VISUAL, STEP_KEY_VISUAL, STEP_PUBLISHING, STEP_WORLD_VISUAL,
    STEP_WRITING_STORY,
};
use taleforge_core::prompt::compile_prompt;
use taleforge_core::store::{PackageStore, StoreError};
use taleforge_core::types::PackageId;
use taleforge_events::bus::{PACKAGE_COMPLETED, PACKAGE_CREATED, PACKAGE_FAILED};
use taleforge_events::{EventBus, JobEvent, PlatformEvent, ProgressHub};
use taleforge_providers::storage::ContentStore;
use taleforge_providers::text::TextCompletion;

use crate::analysis::analyze;
use crate::compactor::compact;
use crate::config::PipelineConfig;
use crate::error::{JobError, StageError};
use crate::narrative::write_story;
use crate::publisher::publish_visuals;
use crate::synthesis::ImageSynthesizer;

/// Shortest accepted narrative, in characters after trimming.
pub const MIN_TEXT_CHARS: usize = 50;

/// Longest accepted narrative, in characters after trimming.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Visuals generated for every package, in order.
/// Attempts at the terminal write before the job is reported unsaved.
const TERMINAL_WRITE_ATTEMPTS: u32 = 4;
const TERMINAL_WRITE_BACKOFF: Duration = Duration::from_millis(100);

const VISUAL_STAGES: [(VisualKind, &str); 3] = [
    (VisualKind::KeyVisual, STEP_KEY_VISUAL),
    (VisualKind::Character, STEP_CHARACTER_VISUAL),
    (VisualKind::World, STEP_WORLD_VISUAL),
];

/// A new narrative submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJob {
    pub text: String,
    pub user_id: String,
    pub model_choice: ModelChoice,
    pub creator_address: Option<String>,
}

/// Everything the pipeline talks to. Built once at startup.
pub struct PipelineServices {
    pub store: Arc<dyn PackageStore>,
    pub text: Arc<dyn TextCompletion>,
    pub images: ImageSynthesizer,
    pub content: Arc<dyn ContentStore>,
    pub progress: Arc<ProgressHub>,
    pub events: Arc<EventBus>,
    pub config: PipelineConfig,
}

/// 1-based step number of a stage key.
fn step_number(step_key: &str) -> u8 {
    PIPELINE_STEPS
        .iter()
        .position(|k| *k == step_key)
        .map(|i| i as u8 + 1)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct Orchestrator {
    services: Arc<PipelineServices>,
}

impl Orchestrator {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    // -----------------------------------------------------------------------
    // Job creation
    // -----------------------------------------------------------------------

    /// Validate, deduplicate and store a submission, then start it in the
    /// background. Returns the package id (which is also the job id).
    pub async fn create_job(&self, input: CreateJob) -> Result<PackageId, JobError> {
        let creator_address = validate(&input)?;
        let store = &self.services.store;

        let hash = content_hash(&input.text);
        if let Some(existing) = store.find_by_content_hash(&hash).await? {
            if existing.status == PackageStatus::Failed {
                tracing::info!(
                    previous_id = %existing.id,
                    "Resubmission of a failed narrative, releasing its content hash"
                );
                store.release_content_hash(existing.id).await?;
            } else {
                return Err(JobError::Duplicate {
                    existing_id: existing.id,
                });
            }
        }

        let package = Package::new_draft(
            Record::new(input.user_id.trim(), input.text),
            creator_address,
            input.model_choice,
        );
        match store.insert(&package).await {
            Ok(()) => {}
            Err(StoreError::DuplicateContent { existing }) => {
                return Err(JobError::Duplicate {
                    existing_id: existing,
                })
            }
            Err(e) => return Err(e.into()),
        }

        let id = package.id;
        tracing::info!(
            package_id = %id,
            user_id = %package.record.user_id,
            model = package.model_choice.name(),
            "Job created"
        );
        self.services.events.publish(
            PlatformEvent::new(PACKAGE_CREATED)
                .with_source("package", id)
                .with_actor(package.record.user_id.clone()),
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run(package).await;
        });

        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Drive a draft package to a terminal status and return it.
    pub async fn run(&self, mut package: Package) -> Package {
        if let Err(e) = package.transition_to(PackageStatus::Processing) {
            tracing::error!(package_id = %package.id, error = %e, "Job cannot start");
            return package;
        }
        self.enter_step(&mut package, Progress::queued()).await;

        let mut current_step = 0;
        match self.run_stages(&mut package, &mut current_step).await {
            Ok(()) => self.complete(&mut package).await,
            Err(e) => self.fail(&mut package, current_step, e).await,
        }
        package
    }

    async fn run_stages(
        &self,
        package: &mut Package,
        current_step: &mut u8,
    ) -> Result<(), StageError> {
        let services = &self.services;
        let model = services.config.models.for_choice(package.model_choice).to_string();
        let language = services.config.secondary_language.as_str();

        *current_step = step_number(STEP_ANALYZING);
        self.enter_step(package, Progress::step(*current_step, STEP_ANALYZING))
            .await;
        let analysis = analyze(services.text.as_ref(), &model, language, &package.record.text).await?;
        package.analysis = Some(analysis.clone());
        self.persist(package).await;

        *current_step = step_number(STEP_WRITING_STORY);
        self.enter_step(package, Progress::step(*current_step, STEP_WRITING_STORY))
            .await;
        let story = write_story(
            services.text.as_ref(),
            &model,
            language,
            &package.record.text,
            &analysis,
        )
        .await?;
        package.story = Some(story);
        self.persist(package).await;

        for (kind, step_key) in VISUAL_STAGES {
            *current_step = step_number(step_key);
            self.enter_step(package, Progress::step(*current_step, step_key))
                .await;
            let visual = self.generate_visual(kind, &analysis).await?;
            package.visuals.push(visual);
            self.persist(package).await;
        }

        *current_step = step_number(STEP_PUBLISHING);
        self.enter_step(package, Progress::step(*current_step, STEP_PUBLISHING))
            .await;
        let published =
            publish_visuals(services.content.as_ref(), package.id, &mut package.visuals).await;
        tracing::info!(
            package_id = %package.id,
            published,
            total = package.visuals.len(),
            "Visuals published"
        );
        Ok(())
    }

    async fn generate_visual(
        &self,
        kind: VisualKind,
        analysis: &Analysis,
    ) -> Result<Visual, StageError> {
        let services = &self.services;
        let compiled = compile_prompt(kind, analysis);
        let prompt = compact(
            services.text.as_ref(),
            &services.config.models.standard,
            &compiled,
        )
        .await;
        let image = services.images.synthesize(&prompt, kind.image_size()).await?;

        let (title, title_translated, description, description_translated) =
            visual_captions(kind, analysis);
        Ok(Visual {
            id: uuid::Uuid::new_v4(),
            kind,
            prompt,
            ephemeral_url: image.url,
            durable_url: None,
            durable_id: None,
            title,
            title_translated,
            description,
            description_translated,
        })
    }

    async fn complete(&self, package: &mut Package) {
        let mut finished = package.clone();
        if let Err(e) = finished.transition_to(PackageStatus::Completed) {
            tracing::error!(package_id = %package.id, error = %e, "Cannot complete job");
            return;
        }
        finished.record_progress(Progress::completed());
        if let Err(e) = self.persist_terminal(&finished).await {
            let step = step_number(STEP_PUBLISHING);
            self.fail(package, step, StageError::Unsaved(e)).await;
            return;
        }
        *package = finished;
        tracing::info!(package_id = %package.id, "Job completed");

        if let Some(event) = JobEvent::terminal_for(package) {
            self.services.progress.publish(event);
        }
        self.services.events.publish(
            PlatformEvent::new(PACKAGE_COMPLETED)
                .with_source("package", package.id)
                .with_actor(package.record.user_id.clone())
                .with_payload(serde_json::json!({ "visuals": package.visuals.len() })),
        );
    }

    async fn fail(&self, package: &mut Package, failed_step: u8, error: StageError) {
        let message = error.to_string();
        tracing::error!(
            package_id = %package.id,
            step = failed_step,
            error = %message,
            "Job failed"
        );
        if let Err(e) = package.transition_to(PackageStatus::Failed) {
            tracing::error!(package_id = %package.id, error = %e, "Cannot fail job");
            return;
        }
        package.record_progress(Progress::failed(failed_step));
        package.error_message = Some(message.clone());
        if let Err(e) = self.persist_terminal(package).await {
            tracing::error!(package_id = %package.id, error = %e, "Failed package could not be saved");
        }

        if let Some(event) = JobEvent::terminal_for(package) {
            self.services.progress.publish(event);
        }
        self.services.events.publish(
            PlatformEvent::new(PACKAGE_FAILED)
                .with_source("package", package.id)
                .with_actor(package.record.user_id.clone())
                .with_payload(serde_json::json!({ "error": message, "step": failed_step })),
        );
    }

    async fn enter_step(&self, package: &mut Package, progress: Progress) {
        tracing::debug!(
            package_id = %package.id,
            step = progress.current_step,
            step_key = %progress.step_key,
            "Entering pipeline step"
        );
        package.record_progress(progress.clone());
        self.persist(package).await;
        self.services.progress.publish(JobEvent::Progress {
            job_id: package.id,
            progress,
        });
    }

    /// Write a terminal status, retrying with backoff. A failed write whose
    /// status landed anyway counts as saved.
    async fn persist_terminal(&self, package: &Package) -> Result<(), StoreError> {
        let store = &self.services.store;
        let mut attempt = 1;
        loop {
            let err = match store.update_pipeline(package).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if let Ok(Some(stored)) = store.get(package.id).await {
                if stored.status == package.status {
                    return Ok(());
                }
            }
            if attempt >= TERMINAL_WRITE_ATTEMPTS {
                return Err(err);
            }
            tracing::warn!(
                package_id = %package.id,
                status = %package.status,
                attempt,
                error = %err,
                "Retrying terminal write"
            );
            tokio::time::sleep(TERMINAL_WRITE_BACKOFF * attempt).await;
            attempt += 1;
        }
    }

    async fn persist(&self, package: &Package) {
        if let Err(e) = self.services.store.update_pipeline(package).await {
            tracing::error!(package_id = %package.id, error = %e, "Failed to persist package");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Boundary checks for a submission. Returns the normalized creator
/// address.
fn validate(input: &CreateJob) -> Result<Option<String>, JobError> {
    let length = input.text.trim().chars().count();
    if length < MIN_TEXT_CHARS {
        return Err(JobError::Validation(format!(
            "Text must be at least {MIN_TEXT_CHARS} characters (got {length})"
        )));
    }
    if length > MAX_TEXT_CHARS {
        return Err(JobError::Validation(format!(
            "Text must be at most {MAX_TEXT_CHARS} characters (got {length})"
        )));
    }
    if input.user_id.trim().is_empty() {
        return Err(JobError::Validation("user_id must not be empty".to_string()));
    }
    input
        .creator_address
        .as_deref()
        .map(|addr| normalize_address(addr, "creator_address"))
        .transpose()
        .map_err(|e| JobError::Validation(e.to_string()))
}

/// Bilingual title and description for a visual.
fn visual_captions(kind: VisualKind, analysis: &Analysis) -> (String, String, String, String) {
    match kind {
        VisualKind::Character => match analysis.characters.first() {
            Some(c) => (
                c.name.clone(),
                c.name_translated.clone(),
                c.description.clone(),
                c.description_translated.clone(),
            ),
            None => (
                analysis.title.clone(),
                analysis.title_translated.clone(),
                analysis.summary.clone(),
                analysis.summary_translated.clone(),
            ),
        },
        VisualKind::World => (
            analysis.world.setting.clone(),
            analysis.world.setting_translated.clone(),
            analysis.world.atmosphere.clone(),
            analysis.world.atmosphere_translated.clone(),
        ),
        VisualKind::KeyVisual | VisualKind::Object => (
            analysis.title.clone(),
            analysis.title_translated.clone(),
            analysis.summary.clone(),
            analysis.summary_translated.clone(),
        ),
    }
}
