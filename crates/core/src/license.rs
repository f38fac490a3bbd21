//! License flavor selection.
//!
//! The ledger supports a small closed set of license term templates. A
//! [`LicenseConfig`] (two switches, a revenue share and a minting fee)
//! resolves to exactly one [`LicenseFlavor`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound for revenue share, in whole percent.
pub const MAX_REVENUE_SHARE_PERCENT: u8 = 100;

/// Caller-facing license choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseConfig {
    pub commercial_use: bool,
    pub commercial_remix: bool,
    #[serde(default)]
    pub revenue_share_percent: u8,
    /// Minting fee in the smallest unit of the royalty currency.
    #[serde(default)]
    pub minting_fee: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LicenseFlavor {
    /// Free, attribution-only remixing; no commercial use.
    NonCommercialRemix,
    /// Paid commercial use; derivatives are not licensed.
    CommercialUse { minting_fee: u128 },
    /// Paid commercial use with derivatives sharing revenue upstream.
    CommercialRemix {
        minting_fee: u128,
        revenue_share_percent: u8,
    },
}

impl LicenseFlavor {
    pub fn name(self) -> &'static str {
        match self {
            Self::NonCommercialRemix => "non_commercial_remix",
            Self::CommercialUse { .. } => "commercial_use",
            Self::CommercialRemix { .. } => "commercial_remix",
        }
    }

    pub fn commercial_use(self) -> bool {
        !matches!(self, Self::NonCommercialRemix)
    }

    pub fn derivatives_allowed(self) -> bool {
        !matches!(self, Self::CommercialUse { .. })
    }

    pub fn minting_fee(self) -> u128 {
        match self {
            Self::NonCommercialRemix => 0,
            Self::CommercialUse { minting_fee } | Self::CommercialRemix { minting_fee, .. } => {
                minting_fee
            }
        }
    }

    pub fn revenue_share_percent(self) -> u8 {
        match self {
            Self::CommercialRemix {
                revenue_share_percent,
                ..
            } => revenue_share_percent,
            _ => 0,
        }
    }
}

impl LicenseConfig {
    /// Pick the license flavor these settings describe.
    pub fn resolve(&self) -> Result<LicenseFlavor, CoreError> {
        if self.revenue_share_percent > MAX_REVENUE_SHARE_PERCENT {
            return Err(CoreError::Validation(format!(
                "Revenue share must be between 0 and {MAX_REVENUE_SHARE_PERCENT} percent (got {})",
                self.revenue_share_percent
            )));
        }

        match (self.commercial_use, self.commercial_remix) {
            (false, _) => {
                if self.minting_fee > 0 || self.revenue_share_percent > 0 {
                    return Err(CoreError::Validation(
                        "Non-commercial licenses cannot carry a minting fee or revenue share"
                            .to_string(),
                    ));
                }
                Ok(LicenseFlavor::NonCommercialRemix)
            }
            (true, false) => {
                if self.revenue_share_percent > 0 {
                    return Err(CoreError::Validation(
                        "Revenue share requires commercial remixing to be enabled".to_string(),
                    ));
                }
                Ok(LicenseFlavor::CommercialUse {
                    minting_fee: self.minting_fee,
                })
            }
            (true, true) => {
                if self.revenue_share_percent == 0 {
                    return Err(CoreError::Validation(
                        "Commercial remix licenses need a revenue share of at least 1 percent"
                            .to_string(),
                    ));
                }
                Ok(LicenseFlavor::CommercialRemix {
                    minting_fee: self.minting_fee,
                    revenue_share_percent: self.revenue_share_percent,
                })
            }
        }
    }
}

/// License terms as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseTerms {
    pub flavor: LicenseFlavor,
    /// Token address royalties and fees are paid in.
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config(commercial_use: bool, commercial_remix: bool, share: u8, fee: u128) -> LicenseConfig {
        LicenseConfig {
            commercial_use,
            commercial_remix,
            revenue_share_percent: share,
            minting_fee: fee,
        }
    }

    #[test]
    fn non_commercial_resolves() {
        let flavor = config(false, false, 0, 0).resolve().unwrap();
        assert_eq!(flavor, LicenseFlavor::NonCommercialRemix);
        assert!(!flavor.commercial_use());
        assert!(flavor.derivatives_allowed());
    }

    #[test]
    fn commercial_use_resolves() {
        let flavor = config(true, false, 0, 1_000).resolve().unwrap();
        assert_eq!(flavor, LicenseFlavor::CommercialUse { minting_fee: 1_000 });
        assert!(!flavor.derivatives_allowed());
    }

    #[test]
    fn commercial_remix_resolves() {
        let flavor = config(true, true, 10, 5).resolve().unwrap();
        assert_matches!(
            flavor,
            LicenseFlavor::CommercialRemix { minting_fee: 5, revenue_share_percent: 10 }
        );
        assert_eq!(flavor.name(), "commercial_remix");
    }

    #[test]
    fn share_over_hundred_is_rejected() {
        assert_matches!(config(true, true, 101, 0).resolve(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn remix_without_share_is_rejected() {
        assert!(config(true, true, 0, 0).resolve().is_err());
    }

    #[test]
    fn non_commercial_with_fee_is_rejected() {
        assert!(config(false, false, 0, 10).resolve().is_err());
    }

    #[test]
    fn share_without_remix_is_rejected() {
        assert!(config(true, false, 5, 0).resolve().is_err());
    }

    #[test]
    fn terms_serialize_with_flavor_tag() {
        let terms = LicenseTerms {
            flavor: LicenseFlavor::CommercialUse { minting_fee: 7 },
            currency: "0x1514000000000000000000000000000000000000".into(),
        };
        let json = serde_json::to_value(&terms).unwrap();
        assert_eq!(json["flavor"]["kind"], "commercial_use");
        assert_eq!(json["flavor"]["minting_fee"], 7);
    }
}
