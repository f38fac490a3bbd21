//! The creative package aggregate and its pipeline lifecycle.
//!
//! A [`Package`] owns everything the pipeline produces for one narrative:
//! the immutable [`Record`], the analysis, the story and the visuals. After
//! ledger registration it also carries a back-reference to the on-chain
//! asset. It does not own that asset.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Analysis;
use crate::error::CoreError;
use crate::hashing::content_hash;
use crate::story::Story;
use crate::types::{PackageId, Timestamp};

// ---------------------------------------------------------------------------
// Pipeline steps
// ---------------------------------------------------------------------------

/// Number of pipeline stages reported in [`Progress::total_steps`].
pub const TOTAL_STEPS: u8 = 6;

pub const STEP_QUEUED: &str = "queued";
pub const STEP_ANALYZING: &str = "analyzing";
pub const STEP_WRITING_STORY: &str = "writing_story";
pub const STEP_KEY_VISUAL: &str = "key_visual";
pub const STEP_CHARACTER_VISUAL: &str = "character_visual";
pub const STEP_WORLD_VISUAL: &str = "world_visual";
pub const STEP_PUBLISHING: &str = "publishing";
pub const STEP_COMPLETED: &str = "completed";
pub const STEP_FAILED: &str = "failed";

/// Stage keys in execution order. Index `i` is reported as step `i + 1`.
pub const PIPELINE_STEPS: [&str; TOTAL_STEPS as usize] = [
    STEP_ANALYZING,
    STEP_WRITING_STORY,
    STEP_KEY_VISUAL,
    STEP_CHARACTER_VISUAL,
    STEP_WORLD_VISUAL,
    STEP_PUBLISHING,
];

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Creative-pipeline status. Transitions only move forward:
/// `draft -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Draft,
    Processing,
    Completed,
    Failed,
}

impl PackageStatus {
    pub const ALL: [PackageStatus; 4] = [
        Self::Draft,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown package status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Model choice
// ---------------------------------------------------------------------------

/// Which configured text model drives analysis and narration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    #[default]
    Standard,
    Advanced,
}

impl ModelChoice {
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "standard" => Ok(Self::Standard),
            "advanced" => Ok(Self::Advanced),
            other => Err(CoreError::Validation(format!(
                "Unknown model choice '{other}'. Must be one of: standard, advanced"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current_step: u8,
    pub total_steps: u8,
    pub step_key: String,
}

impl Progress {
    pub fn step(current_step: u8, step_key: &str) -> Self {
        Self {
            current_step,
            total_steps: TOTAL_STEPS,
            step_key: step_key.to_string(),
        }
    }

    pub fn queued() -> Self {
        Self::step(0, STEP_QUEUED)
    }

    pub fn completed() -> Self {
        Self::step(TOTAL_STEPS, STEP_COMPLETED)
    }

    /// Terminal marker recording the step that was running when the job failed.
    pub fn failed(at_step: u8) -> Self {
        Self::step(at_step, STEP_FAILED)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The submitted narrative. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub recorded_at: Timestamp,
}

impl Record {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            text: text.into(),
            recorded_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Visuals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    KeyVisual,
    Character,
    World,
    Object,
}

/// Pixel dimensions requested from an image backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The one size both image backends accept.
pub const SQUARE_1024: ImageSize = ImageSize {
    width: 1024,
    height: 1024,
};

impl VisualKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::KeyVisual => "key_visual",
            Self::Character => "character",
            Self::World => "world",
            Self::Object => "object",
        }
    }

    pub fn image_size(self) -> ImageSize {
        SQUARE_1024
    }
}

/// A generated image. Created with an ephemeral URL only; a durable
/// content-addressed URL may be attached later but never replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub id: Uuid,
    pub kind: VisualKind,
    pub prompt: String,
    pub ephemeral_url: String,
    pub durable_url: Option<String>,
    pub durable_id: Option<String>,
    pub title: String,
    pub title_translated: String,
    pub description: String,
    pub description_translated: String,
}

impl Visual {
    /// Upgrade the visual with a durable location.
    pub fn attach_durable(&mut self, durable_id: String, durable_url: String) {
        self.durable_id = Some(durable_id);
        self.durable_url = Some(durable_url);
    }

    /// Durable URL when available, otherwise the ephemeral one.
    pub fn best_url(&self) -> &str {
        self.durable_url.as_deref().unwrap_or(&self.ephemeral_url)
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub record: Record,
    pub content_hash: String,
    pub creator_address: Option<String>,
    pub model_choice: ModelChoice,
    pub analysis: Option<Analysis>,
    pub story: Option<Story>,
    pub visuals: Vec<Visual>,
    pub status: PackageStatus,
    pub progress: Option<Progress>,
    pub error_message: Option<String>,
    pub is_public: bool,
    pub asset_id: Option<String>,
    pub owner_address: Option<String>,
    pub license_terms_id: Option<String>,
    pub tx_hash: Option<String>,
    /// Set while a registration attempt holds the lease.
    pub registration_started_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Package {
    /// Build a fresh draft package for a record. The content hash is
    /// computed here and nowhere else.
    pub fn new_draft(
        record: Record,
        creator_address: Option<String>,
        model_choice: ModelChoice,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash(&record.text),
            record,
            creator_address,
            model_choice,
            analysis: None,
            story: None,
            visuals: Vec::new(),
            status: PackageStatus::Draft,
            progress: None,
            error_message: None,
            is_public: false,
            asset_id: None,
            owner_address: None,
            license_terms_id: None,
            tx_hash: None,
            registration_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting backwards or sideways transitions.
    pub fn transition_to(&mut self, next: PackageStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Package {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn record_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
        self.updated_at = chrono::Utc::now();
    }

    pub fn is_registered(&self) -> bool {
        self.asset_id.is_some()
    }

    pub fn visual(&self, kind: VisualKind) -> Option<&Visual> {
        self.visuals.iter().find(|v| v.kind == kind)
    }
}
