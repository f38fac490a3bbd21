//! Configuration loaded from environment variables.
//!
//! `main` calls `dotenvy::dotenv()` first, so a local `.env` works too.
//! Every setting has a development default except the provider
//! credentials and the collection contract.

use std::str::FromStr;

use taleforge_pipeline::config::DEFAULT_SECONDARY_LANGUAGE;
use taleforge_pipeline::{LedgerConfig, PipelineConfig, TextModels};
use taleforge_providers::ledger::ChainParams;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Reads one variable. `from_env` passes `std::env::var`; tests pass a map.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(lookup: Lookup<'_>, name: &str, default: &str) -> String {
    lookup(name).unwrap_or_else(|| default.to_string())
}

fn required(lookup: Lookup<'_>, name: &'static str) -> Result<String, ConfigError> {
    lookup(name).ok_or(ConfigError::Missing { name })
}

fn parsed<T>(lookup: Lookup<'_>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// Timeout for non-streaming requests in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Hard cap on a progress subscription in seconds (default: `300`).
    pub progress_channel_max_secs: u64,
    /// Postgres URL. The in-memory store is used when unset.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `PROGRESS_CHANNEL_MAX_SECS` | `300`                   |
    /// | `DATABASE_URL`              | unset (in-memory)       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let cors_origins = or_default(lookup, "CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let progress_channel_max_secs: u64 = parsed(lookup, "PROGRESS_CHANNEL_MAX_SECS", 300)?;
        if progress_channel_max_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PROGRESS_CHANNEL_MAX_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host: or_default(lookup, "HOST", "0.0.0.0"),
            port: parsed(lookup, "PORT", 3000)?,
            cors_origins,
            request_timeout_secs: parsed(lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            progress_channel_max_secs,
            database_url: lookup("DATABASE_URL"),
        })
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TextProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub standard_model: String,
    pub advanced_model: String,
    pub secondary_language: String,
}

#[derive(Debug, Clone)]
pub struct ImageProviderConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    pub jwt: String,
    pub api_url: String,
    pub gateway_url: String,
}

#[derive(Debug, Clone)]
pub struct LedgerProviderConfig {
    /// Signer gateway the JSON-RPC client talks to.
    pub rpc_url: String,
    pub chain_id: u64,
    pub chain_name: String,
    /// Public RPC URL handed to wallets that need to add the chain.
    pub public_rpc_url: String,
    pub explorer_url: String,
    pub native_symbol: String,
    pub spg_contract: String,
    pub currency_token: String,
}

/// Credentials and endpoints for every outbound collaborator.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub text: TextProviderConfig,
    pub primary_image: ImageProviderConfig,
    pub secondary_image: ImageProviderConfig,
    pub content: ContentStoreConfig,
    pub ledger: LedgerProviderConfig,
    /// Per-request timeout for provider HTTP calls.
    pub http_timeout_secs: u64,
}

impl ProviderConfig {
    /// | Env Var                    | Default                                 |
    /// |----------------------------|-----------------------------------------|
    /// | `OPENAI_API_KEY`           | required                                |
    /// | `OPENAI_BASE_URL`          | `https://api.openai.com/v1`             |
    /// | `TEXT_MODEL_STANDARD`      | `gpt-4o-mini`                           |
    /// | `TEXT_MODEL_ADVANCED`      | `gpt-4o`                                |
    /// | `SECONDARY_LANGUAGE`       | `Korean`                                |
    /// | `IMAGE_PRIMARY_MODEL`      | `gpt-image-1`                           |
    /// | `IMAGE_PRIMARY_BASE_URL`   | `OPENAI_BASE_URL`                       |
    /// | `IMAGE_SECONDARY_MODEL`    | `dall-e-3`                              |
    /// | `IMAGE_SECONDARY_BASE_URL` | `OPENAI_BASE_URL`                       |
    /// | `PINATA_JWT`               | required                                |
    /// | `PINATA_API_URL`           | `https://api.pinata.cloud`              |
    /// | `IPFS_GATEWAY_URL`         | `https://gateway.pinata.cloud`          |
    /// | `LEDGER_RPC_URL`           | `http://localhost:8545`                 |
    /// | `LEDGER_CHAIN_ID`          | `1315`                                  |
    /// | `LEDGER_CHAIN_NAME`        | `Story Aeneid Testnet`                  |
    /// | `LEDGER_PUBLIC_RPC_URL`    | `https://aeneid.storyrpc.io`            |
    /// | `LEDGER_EXPLORER_URL`      | `https://aeneid.storyscan.io`           |
    /// | `LEDGER_NATIVE_SYMBOL`     | `IP`                                    |
    /// | `SPG_NFT_CONTRACT`         | required                                |
    /// | `ROYALTY_CURRENCY_TOKEN`   | `0x1514000000000000000000000000000000000000` |
    /// | `PROVIDER_TIMEOUT_SECS`    | `120`                                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let base_url = or_default(lookup, "OPENAI_BASE_URL", "https://api.openai.com/v1");

        let text = TextProviderConfig {
            api_key: required(lookup, "OPENAI_API_KEY")?,
            standard_model: or_default(lookup, "TEXT_MODEL_STANDARD", "gpt-4o-mini"),
            advanced_model: or_default(lookup, "TEXT_MODEL_ADVANCED", "gpt-4o"),
            secondary_language: or_default(lookup, "SECONDARY_LANGUAGE", DEFAULT_SECONDARY_LANGUAGE),
            base_url: base_url.clone(),
        };
        let primary_image = ImageProviderConfig {
            base_url: or_default(lookup, "IMAGE_PRIMARY_BASE_URL", &base_url),
            model: or_default(lookup, "IMAGE_PRIMARY_MODEL", "gpt-image-1"),
        };
        let secondary_image = ImageProviderConfig {
            base_url: or_default(lookup, "IMAGE_SECONDARY_BASE_URL", &base_url),
            model: or_default(lookup, "IMAGE_SECONDARY_MODEL", "dall-e-3"),
        };
        let content = ContentStoreConfig {
            jwt: required(lookup, "PINATA_JWT")?,
            api_url: or_default(lookup, "PINATA_API_URL", "https://api.pinata.cloud"),
            gateway_url: or_default(lookup, "IPFS_GATEWAY_URL", "https://gateway.pinata.cloud"),
        };
        let ledger = LedgerProviderConfig {
            rpc_url: or_default(lookup, "LEDGER_RPC_URL", "http://localhost:8545"),
            chain_id: parsed(lookup, "LEDGER_CHAIN_ID", 1315)?,
            chain_name: or_default(lookup, "LEDGER_CHAIN_NAME", "Story Aeneid Testnet"),
            public_rpc_url: or_default(lookup, "LEDGER_PUBLIC_RPC_URL", "https://aeneid.storyrpc.io"),
            explorer_url: or_default(lookup, "LEDGER_EXPLORER_URL", "https://aeneid.storyscan.io"),
            native_symbol: or_default(lookup, "LEDGER_NATIVE_SYMBOL", "IP"),
            spg_contract: required(lookup, "SPG_NFT_CONTRACT")?,
            currency_token: or_default(
                lookup,
                "ROYALTY_CURRENCY_TOKEN",
                "0x1514000000000000000000000000000000000000",
            ),
        };

        Ok(Self {
            text,
            primary_image,
            secondary_image,
            content,
            ledger,
            http_timeout_secs: parsed(lookup, "PROVIDER_TIMEOUT_SECS", 120)?,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            models: TextModels {
                standard: self.text.standard_model.clone(),
                advanced: self.text.advanced_model.clone(),
            },
            secondary_language: self.text.secondary_language.clone(),
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            chain: ChainParams {
                chain_id: self.ledger.chain_id,
                chain_name: self.ledger.chain_name.clone(),
                rpc_url: self.ledger.public_rpc_url.clone(),
                explorer_url: self.ledger.explorer_url.clone(),
                native_symbol: self.ledger.native_symbol.clone(),
            },
            spg_contract: self.ledger.spg_contract.clone(),
            currency_token: self.ledger.currency_token.clone(),
        }
    }
}
