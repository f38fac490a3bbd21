//! Ledger access through a signer gateway.
//!
//! The gateway holds the connected wallet and exposes it over JSON-RPC 2.0:
//! the standard wallet methods for chain management plus a handful of
//! `ledger_*` methods that wrap the asset registry contracts. Every call
//! that signs names the signer address explicitly.
//!
//! RPC errors are classified once, in [`classify_rpc_error`], so callers can
//! tell a rejected signature from an operator-side minting misconfiguration.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use taleforge_core::license::{LicenseFlavor, LicenseTerms};

use crate::http::{parse_response, HttpError};

/// EIP-1193 "user rejected request".
pub const RPC_USER_REJECTED: i64 = 4001;
/// EIP-3326 "unrecognized chain id".
pub const RPC_UNRECOGNIZED_CHAIN: i64 = 4902;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Signer rejected the request: {0}")]
    Rejected(String),

    #[error("Chain {0} is not known to the signer")]
    UnknownChain(u64),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Minting configuration fault: {0}")]
    MintingConfiguration(String),

    #[error("Ledger error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Chain { code: Option<i64>, message: String },

    #[error("Malformed ledger response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Transport(#[from] HttpError),
}

/// Map a JSON-RPC error to a [`LedgerError`]. `chain_id` is the chain the
/// failing call referred to, if any.
pub fn classify_rpc_error(code: i64, message: &str, chain_id: Option<u64>) -> LedgerError {
    let lower = message.to_lowercase();

    if code == RPC_USER_REJECTED
        || lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected the request")
    {
        return LedgerError::Rejected(message.to_string());
    }
    if code == RPC_UNRECOGNIZED_CHAIN || lower.contains("unrecognized chain") {
        return LedgerError::UnknownChain(chain_id.unwrap_or_default());
    }
    if lower.contains("insufficient funds") || is_fee_shortfall(&lower) {
        return LedgerError::InsufficientFunds(message.to_string());
    }
    if lower.contains("spg")
        || lower.contains("minting fee not set")
        || lower.contains("nft contract")
        || lower.contains("not authorized to mint")
        || lower.contains("nft collection")
    {
        return LedgerError::MintingConfiguration(message.to_string());
    }
    LedgerError::Chain {
        code: Some(code),
        message: message.to_string(),
    }
}

/// A revert caused by the signer paying less than the fee a license or
/// collection demands. The signer can act on it, unlike a contract fault.
fn is_fee_shortfall(lower: &str) -> bool {
    (lower.contains("insufficient") && lower.contains("fee"))
        || lower.contains("fee too low")
        || lower.contains("below minting fee")
}

// ---------------------------------------------------------------------------
// Requests and receipts
// ---------------------------------------------------------------------------

/// Parameters for adding a chain to the signer's wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub native_symbol: String,
}

/// Combined mint + register + attach-license submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAndRegisterRequest {
    /// Collection contract the asset token is minted from.
    pub spg_contract: String,
    pub recipient: String,
    pub ip_metadata_uri: String,
    /// `0x`-prefixed SHA-256 of the domain metadata document.
    pub ip_metadata_hash: String,
    pub nft_metadata_uri: String,
    /// `0x`-prefixed SHA-256 of the display metadata document.
    pub nft_metadata_hash: String,
    /// `0x`-prefixed content hash of the narrative.
    pub media_hash: String,
    pub terms: LicenseTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintAndRegisterReceipt {
    pub asset_id: String,
    pub tx_hash: String,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub license_terms_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTermsRequest {
    pub asset_id: String,
    pub terms: LicenseTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachTermsReceipt {
    pub tx_hash: String,
    pub license_terms_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintLicenseRequest {
    pub licensor_asset_id: String,
    pub license_terms_id: String,
    pub amount: u32,
    pub receiver: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintLicenseReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub license_token_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayRoyaltyRequest {
    pub receiver_asset_id: String,
    /// Paying asset, or the zero address for an external payer.
    pub payer_asset_id: String,
    pub token: String,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRoyaltyRequest {
    pub asset_id: String,
    pub claimer: String,
    pub snapshot_ids: Vec<String>,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRoyaltyReceipt {
    pub tx_hash: String,
    /// Claimed amount as a decimal string in the token's smallest unit.
    #[serde(default)]
    pub claimed_amount: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Chain the signer's wallet is currently on.
    async fn chain_id(&self, signer: &str) -> Result<u64, LedgerError>;

    /// Ask the wallet to switch chains. Fails with
    /// [`LedgerError::UnknownChain`] when the wallet has never seen it.
    async fn switch_chain(&self, signer: &str, chain_id: u64) -> Result<(), LedgerError>;

    async fn add_chain(&self, signer: &str, params: &ChainParams) -> Result<(), LedgerError>;

    /// Current owner of a registered asset, `None` if it does not exist.
    async fn asset_owner(&self, asset_id: &str) -> Result<Option<String>, LedgerError>;

    async fn mint_and_register(
        &self,
        signer: &str,
        request: &MintAndRegisterRequest,
    ) -> Result<MintAndRegisterReceipt, LedgerError>;

    async fn attach_license_terms(
        &self,
        signer: &str,
        request: &AttachTermsRequest,
    ) -> Result<AttachTermsReceipt, LedgerError>;

    async fn mint_license_tokens(
        &self,
        signer: &str,
        request: &MintLicenseRequest,
    ) -> Result<MintLicenseReceipt, LedgerError>;

    async fn pay_royalty(
        &self,
        signer: &str,
        request: &PayRoyaltyRequest,
    ) -> Result<TxReceipt, LedgerError>;

    async fn claim_royalty(
        &self,
        signer: &str,
        request: &ClaimRoyaltyRequest,
    ) -> Result<ClaimRoyaltyReceipt, LedgerError>;
}

// ---------------------------------------------------------------------------
// JSON-RPC implementation
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 client for the signer gateway.
pub struct JsonRpcLedgerClient {
    client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Encode a chain id the way wallets expect it (`0x`-prefixed hex).
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

fn parse_chain_id(value: &serde_json::Value) -> Result<u64, LedgerError> {
    let malformed = || LedgerError::Malformed(format!("unexpected chain id {value}"));
    match value {
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| malformed()),
            None => s.parse().map_err(|_| malformed()),
        },
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

/// License terms as gateway JSON. Amounts travel as decimal strings since
/// they can exceed what a JSON number holds exactly.
fn terms_json(terms: &LicenseTerms) -> serde_json::Value {
    let flavor: LicenseFlavor = terms.flavor;
    serde_json::json!({
        "flavor": flavor.name(),
        "commercialUse": flavor.commercial_use(),
        "derivativesAllowed": flavor.derivatives_allowed(),
        "mintingFee": flavor.minting_fee().to_string(),
        "revenueSharePercent": flavor.revenue_share_percent(),
        "currency": terms.currency,
    })
}

impl JsonRpcLedgerClient {
    pub fn new(client: reqwest::Client, rpc_url: String) -> Self {
        Self {
            client,
            rpc_url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        chain_id: Option<u64>,
    ) -> Result<serde_json::Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, id, "Ledger RPC call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(HttpError::from)?;
        let parsed: RpcResponse = parse_response(response).await?;

        if let Some(err) = parsed.error {
            tracing::warn!(method, code = err.code, message = %err.message, "Ledger RPC error");
            return Err(classify_rpc_error(err.code, &err.message, chain_id));
        }
        Ok(parsed.result.unwrap_or(serde_json::Value::Null))
    }

    async fn call_typed<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let value = self.call(method, params, None).await?;
        serde_json::from_value(value).map_err(|e| LedgerError::Malformed(format!("{method}: {e}")))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn chain_id(&self, signer: &str) -> Result<u64, LedgerError> {
        let value = self
            .call("eth_chainId", serde_json::json!([{ "from": signer }]), None)
            .await?;
        parse_chain_id(&value)
    }

    async fn switch_chain(&self, signer: &str, chain_id: u64) -> Result<(), LedgerError> {
        self.call(
            "wallet_switchEthereumChain",
            serde_json::json!([{ "chainId": chain_id_hex(chain_id), "from": signer }]),
            Some(chain_id),
        )
        .await?;
        Ok(())
    }

    async fn add_chain(&self, signer: &str, params: &ChainParams) -> Result<(), LedgerError> {
        self.call(
            "wallet_addEthereumChain",
            serde_json::json!([{
                "chainId": chain_id_hex(params.chain_id),
                "chainName": params.chain_name,
                "rpcUrls": [params.rpc_url],
                "blockExplorerUrls": [params.explorer_url],
                "nativeCurrency": {
                    "name": params.native_symbol,
                    "symbol": params.native_symbol,
                    "decimals": 18,
                },
                "from": signer,
            }]),
            Some(params.chain_id),
        )
        .await?;
        Ok(())
    }

    async fn asset_owner(&self, asset_id: &str) -> Result<Option<String>, LedgerError> {
        let value = self
            .call("ledger_assetOwner", serde_json::json!([asset_id]), None)
            .await?;
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(owner) if owner.is_empty() => Ok(None),
            serde_json::Value::String(owner) => Ok(Some(owner)),
            other => Err(LedgerError::Malformed(format!("unexpected owner {other}"))),
        }
    }

    async fn mint_and_register(
        &self,
        signer: &str,
        request: &MintAndRegisterRequest,
    ) -> Result<MintAndRegisterReceipt, LedgerError> {
        self.call_typed(
            "ledger_mintAndRegisterIpAndAttachTerms",
            serde_json::json!([{
                "from": signer,
                "spgNftContract": request.spg_contract,
                "recipient": request.recipient,
                "ipMetadata": {
                    "ipMetadataURI": request.ip_metadata_uri,
                    "ipMetadataHash": request.ip_metadata_hash,
                    "nftMetadataURI": request.nft_metadata_uri,
                    "nftMetadataHash": request.nft_metadata_hash,
                },
                "mediaHash": request.media_hash,
                "terms": terms_json(&request.terms),
            }]),
        )
        .await
    }

    async fn attach_license_terms(
        &self,
        signer: &str,
        request: &AttachTermsRequest,
    ) -> Result<AttachTermsReceipt, LedgerError> {
        self.call_typed(
            "ledger_registerAndAttachTerms",
            serde_json::json!([{
                "from": signer,
                "ipId": request.asset_id,
                "terms": terms_json(&request.terms),
            }]),
        )
        .await
    }

    async fn mint_license_tokens(
        &self,
        signer: &str,
        request: &MintLicenseRequest,
    ) -> Result<MintLicenseReceipt, LedgerError> {
        self.call_typed(
            "ledger_mintLicenseTokens",
            serde_json::json!([{
                "from": signer,
                "licensorIpId": request.licensor_asset_id,
                "licenseTermsId": request.license_terms_id,
                "amount": request.amount,
                "receiver": request.receiver,
            }]),
        )
        .await
    }

    async fn pay_royalty(
        &self,
        signer: &str,
        request: &PayRoyaltyRequest,
    ) -> Result<TxReceipt, LedgerError> {
        self.call_typed(
            "ledger_payRoyaltyOnBehalf",
            serde_json::json!([{
                "from": signer,
                "receiverIpId": request.receiver_asset_id,
                "payerIpId": request.payer_asset_id,
                "token": request.token,
                "amount": request.amount.to_string(),
            }]),
        )
        .await
    }

    async fn claim_royalty(
        &self,
        signer: &str,
        request: &ClaimRoyaltyRequest,
    ) -> Result<ClaimRoyaltyReceipt, LedgerError> {
        self.call_typed(
            "ledger_claimRevenue",
            serde_json::json!([{
                "from": signer,
                "ipId": request.asset_id,
                "claimer": request.claimer,
                "snapshotIds": request.snapshot_ids,
                "token": request.token,
            }]),
        )
        .await
    }
}
