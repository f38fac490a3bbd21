//! Pipeline error types.

use taleforge_core::store::StoreError;
use taleforge_core::types::PackageId;
use taleforge_providers::ledger::LedgerError;
use taleforge_providers::text::TextError;

use crate::synthesis::SynthesisError;

/// Why a pipeline stage failed. Any of these fails the job.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{stage} failed: the model returned no output")]
    EmptyOutput { stage: &'static str },

    #[error("{stage} failed: malformed model output: {reason}")]
    Malformed { stage: &'static str, reason: String },

    #[error("{stage} failed: {source}")]
    Model {
        stage: &'static str,
        #[source]
        source: TextError,
    },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("The finished package could not be saved: {0}")]
    Unsaved(#[source] StoreError),
}

/// Errors from job creation and progress subscription.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job request: {0}")]
    Validation(String),

    #[error("This narrative was already submitted as package {existing_id}")]
    Duplicate { existing_id: PackageId },

    #[error("Job {0} not found")]
    NotFound(PackageId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A ledger transaction that did not go through. Never retried
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("The transaction was rejected in the wallet. You can try again.")]
    SignerRejected,

    #[error("The wallet has insufficient funds to cover this transaction")]
    InsufficientFunds,

    #[error("Minting is misconfigured and needs an operator: {0}")]
    MintingConfigurationFault(String),

    /// Raw ledger failure, shown as-is.
    #[error("{0}")]
    ChainFault(String),
}

impl From<LedgerError> for TransactionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(_) => Self::SignerRejected,
            LedgerError::InsufficientFunds(_) => Self::InsufficientFunds,
            LedgerError::MintingConfiguration(msg) => Self::MintingConfigurationFault(msg),
            other => Self::ChainFault(other.to_string()),
        }
    }
}
