//! Text-completion client for OpenAI-compatible chat endpoints.

use async_trait::async_trait;
use serde::Deserialize;

use crate::http::{join_url, parse_response, HttpError};

/// One chat-completion call: a system prompt, a user message and the model
/// to run them against.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Ask the model for a single JSON object instead of free text.
    pub json_mode: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Completion response contained no choices")]
    NoChoices,
}

#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Run the completion and return the raw message content. An empty
    /// string is returned as-is; callers decide whether that is an error.
    async fn complete(&self, request: CompletionRequest) -> Result<String, TextError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiTextClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiTextClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn first_content(response: ChatResponse) -> Result<String, TextError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(TextError::NoChoices)?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl TextCompletion for OpenAiTextClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, TextError> {
        tracing::debug!(model = %request.model, json_mode = request.json_mode, "Requesting completion");

        let response = self
            .client
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(HttpError::from)?;

        let parsed: ChatResponse = parse_response(response).await?;
        Self::first_content(parsed)
    }
}
