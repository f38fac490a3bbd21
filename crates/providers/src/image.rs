//! Image-generation backends.
//!
//! The pipeline holds two [`ImageBackend`]s, a primary and a secondary,
//! usually two [`OpenAiImageBackend`]s pointed at different models.

use async_trait::async_trait;
use serde::Deserialize;
use taleforge_core::package::ImageSize;

use crate::http::{join_url, parse_response, HttpError};

/// A freshly generated image. The URL is ephemeral: the provider may expire
/// it at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Image backend {backend} returned no image URL")]
    MissingUrl { backend: String },
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Label used in logs and error messages.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage, ImageError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Client for `POST {base_url}/images/generations`.
pub struct OpenAiImageBackend {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiImageBackend {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            base_url,
            api_key,
            model,
        }
    }

    fn request_body(&self, prompt: &str, size: ImageSize) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": size.to_string(),
        })
    }

    fn first_url(&self, response: ImagesResponse) -> Result<GeneratedImage, ImageError> {
        response
            .data
            .into_iter()
            .find_map(|d| d.url.filter(|u| !u.is_empty()))
            .map(|url| GeneratedImage { url })
            .ok_or_else(|| ImageError::MissingUrl {
                backend: self.name.clone(),
            })
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage, ImageError> {
        tracing::debug!(backend = %self.name, model = %self.model, %size, "Generating image");

        let response = self
            .client
            .post(join_url(&self.base_url, "images/generations"))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, size))
            .send()
            .await
            .map_err(HttpError::from)?;

        let parsed: ImagesResponse = parse_response(response).await?;
        self.first_url(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use taleforge_core::package::SQUARE_1024;

    fn backend() -> OpenAiImageBackend {
        OpenAiImageBackend::new(
            reqwest::Client::new(),
            "primary",
            "http://localhost".into(),
            "key".into(),
            "dall-e-3".into(),
        )
    }

    #[test]
    fn body_carries_model_and_size() {
        let body = backend().request_body("a whale", SQUARE_1024);
        assert_eq!(body["model"], "dall-e-3");
        assert_eq!(body["size"], "1024x1024");
        assert_eq!(body["n"], 1);
    }

    #[test]
    fn empty_data_is_missing_url() {
        let parsed: ImagesResponse =
            serde_json::from_value(serde_json::json!({ "data": [{ "url": "" }] })).unwrap();
        assert_matches!(
            backend().first_url(parsed),
            Err(ImageError::MissingUrl { backend }) if backend == "primary"
        );
    }

    #[test]
    fn first_url_is_used() {
        let parsed: ImagesResponse = serde_json::from_value(serde_json::json!({
            "data": [{ "url": "https://img/1.png" }, { "url": "https://img/2.png" }]
        }))
        .unwrap();
        assert_eq!(backend().first_url(parsed).unwrap().url, "https://img/1.png");
    }
}
