//! Pipeline and ledger settings, built by the binary from its environment.

use taleforge_core::package::ModelChoice;
use taleforge_providers::ledger::ChainParams;

/// Default language for `*_translated` fields.
pub const DEFAULT_SECONDARY_LANGUAGE: &str = "Korean";

/// Model names behind each [`ModelChoice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextModels {
    pub standard: String,
    pub advanced: String,
}

impl TextModels {
    pub fn for_choice(&self, choice: ModelChoice) -> &str {
        match choice {
            ModelChoice::Standard => &self.standard,
            ModelChoice::Advanced => &self.advanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub models: TextModels,
    /// Human-readable name of the secondary language, passed to the model.
    pub secondary_language: String,
}

/// Target chain and contracts for registration and licensing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub chain: ChainParams,
    /// Collection contract new asset tokens are minted from.
    pub spg_contract: String,
    /// Token address license fees and royalties are denominated in.
    pub currency_token: String,
}
