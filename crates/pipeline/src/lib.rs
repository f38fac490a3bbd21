//! Narrative-to-asset pipeline.
//!
//! - [`orchestrator`]: turns a submitted narrative into a completed package
//!   (analysis, story, three visuals, durable copies).
//! - [`progress_channel`]: ordered, time-bounded progress stream per job.
//! - [`registration`]: registers a completed package as a ledger asset.
//! - [`licensing`]: license terms, license purchases and royalties.
//!
//! Every external collaborator is injected as an `Arc<dyn Trait>` from
//! `taleforge-providers`.

pub mod analysis;
pub mod compactor;
pub mod config;
pub mod error;
pub mod licensing;
pub mod metadata;
pub mod narrative;
pub mod orchestrator;
pub mod progress_channel;
pub mod publisher;
pub mod registration;
pub mod synthesis;

pub use config::{LedgerConfig, PipelineConfig, TextModels};
pub use error::{JobError, StageError, TransactionError};
pub use orchestrator::{CreateJob, Orchestrator, PipelineServices};
pub use licensing::{LicensingCoordinator, LicensingError};
pub use registration::{RegisterRequest, RegistrationCoordinator, RegistrationError, RegistrationOutcome};
