//! Ledger registration lifecycle.
//!
//! Kept separate from [`PackageStatus`](crate::package::PackageStatus): the
//! two state machines are linked only by the precondition that a package
//! must be `completed` before registration starts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a registration attempt may hold its lease before another
/// attempt is allowed to take over.
pub const REGISTRATION_LEASE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    Unregistered,
    NetworkVerifying,
    MetadataPublishing,
    AwaitingSignature,
    Submitted,
    Registered { asset_id: String },
}

impl RegistrationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::NetworkVerifying => "network_verifying",
            Self::MetadataPublishing => "metadata_publishing",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Submitted => "submitted",
            Self::Registered { .. } => "registered",
        }
    }

    /// Position in the happy path, used to assert forward-only movement.
    fn ordinal(&self) -> u8 {
        match self {
            Self::Unregistered => 0,
            Self::NetworkVerifying => 1,
            Self::MetadataPublishing => 2,
            Self::AwaitingSignature => 3,
            Self::Submitted => 4,
            Self::Registered { .. } => 5,
        }
    }

    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(&self, next: &RegistrationState) -> bool {
        next.ordinal() == self.ordinal() + 1
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered { asset_id } => write!(f, "registered({asset_id})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Everything persisted onto a package once the ledger confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub asset_id: String,
    pub owner_address: String,
    pub tx_hash: String,
    pub license_terms_id: Option<String>,
}
