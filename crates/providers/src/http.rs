//! Shared plumbing for the reqwest-based provider clients.

use std::time::Duration;

/// Errors from the HTTP transport layer, shared by every provider client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream returned a non-2xx status code.
    #[error("Upstream API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Build a [`reqwest::Client`] with a whole-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, HttpError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Return the response unchanged on a success status, otherwise an
/// [`HttpError::Api`] carrying the status and body text.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(HttpError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, HttpError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://x/v1/", "/images"), "http://x/v1/images");
        assert_eq!(join_url("http://x/v1", "images"), "http://x/v1/images");
    }
}
