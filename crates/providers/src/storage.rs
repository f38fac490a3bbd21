//! Content-addressable storage (IPFS pinning).

use async_trait::async_trait;
use serde::Deserialize;

use crate::http::{ensure_success, join_url, parse_response, HttpError};

/// Where a published object can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Content identifier.
    pub cid: String,
    /// Durable gateway URL for the content.
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Failed to fetch source {url}: {reason}")]
    SourceFetch { url: String, reason: String },

    #[error("Pinning response did not include a content identifier")]
    MissingCid,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the bytes behind `url` and pin them under `name`.
    async fn publish_from_url(&self, url: &str, name: &str) -> Result<StoredObject, StorageError>;

    /// Pin a JSON document under `name`.
    async fn publish_json(
        &self,
        document: &serde_json::Value,
        name: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Gateway URL for a content identifier.
    fn gateway_url(&self, cid: &str) -> String;
}

// ---------------------------------------------------------------------------
// Pinata implementation
// ---------------------------------------------------------------------------

/// Pinata pinning API client. Durable URLs are `{gateway}/ipfs/{cid}`.
pub struct PinataClient {
    client: reqwest::Client,
    api_url: String,
    gateway_url: String,
    jwt: String,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash", default)]
    ipfs_hash: Option<String>,
}

impl PinataClient {
    pub fn new(client: reqwest::Client, api_url: String, gateway_url: String, jwt: String) -> Self {
        Self {
            client,
            api_url,
            gateway_url,
            jwt,
        }
    }

    fn stored(&self, response: PinResponse) -> Result<StoredObject, StorageError> {
        let cid = response
            .ipfs_hash
            .filter(|c| !c.is_empty())
            .ok_or(StorageError::MissingCid)?;
        Ok(StoredObject {
            url: self.gateway_url(&cid),
            cid,
        })
    }

    async fn fetch_source(&self, url: &str) -> Result<(Vec<u8>, String), StorageError> {
        let fetch_err = |reason: String| StorageError::SourceFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        Ok((bytes.to_vec(), content_type))
    }
}

#[async_trait]
impl ContentStore for PinataClient {
    async fn publish_from_url(&self, url: &str, name: &str) -> Result<StoredObject, StorageError> {
        let (bytes, content_type) = self.fetch_source(url).await?;
        tracing::debug!(name, size = bytes.len(), %content_type, "Pinning file");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(&content_type)
            .map_err(HttpError::from)?;
        let metadata = serde_json::json!({ "name": name }).to_string();
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("pinataMetadata", metadata);

        let response = self
            .client
            .post(join_url(&self.api_url, "pinning/pinFileToIPFS"))
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(HttpError::from)?;

        self.stored(parse_response(response).await?)
    }

    async fn publish_json(
        &self,
        document: &serde_json::Value,
        name: &str,
    ) -> Result<StoredObject, StorageError> {
        tracing::debug!(name, "Pinning JSON document");

        let body = serde_json::json!({
            "pinataContent": document,
            "pinataMetadata": { "name": name },
        });
        let response = self
            .client
            .post(join_url(&self.api_url, "pinning/pinJSONToIPFS"))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(HttpError::from)?;

        self.stored(parse_response(response).await?)
    }

    fn gateway_url(&self, cid: &str) -> String {
        join_url(&self.gateway_url, &format!("ipfs/{cid}"))
    }
}
