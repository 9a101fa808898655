//! HTTP client for the QuantumViz backend.
//!
//! Every piece of real computation (prompt interpretation, code generation,
//! transcription, circuit simulation) lives behind a small set of endpoints
//! on the backend service. This module owns the shared `reqwest` client and
//! the uniform status handling; the submodules cover one concern each.

pub mod chat;
pub mod generate;
pub mod transcribe;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use generate::{GeneratedCode, HtmlFiles};
pub use transcribe::TranscribeError;

/// Errors from a backend call. Non-2xx responses are uniformly failures;
/// the body, when present, is carried in the message for logging only.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Network/transport error before a response arrived.
    Network(String),
    /// The backend answered with a non-success status.
    Api { status: u16, message: String },
    /// The response body could not be decoded.
    Parse(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(e) => write!(f, "Network error: {}", e),
            ApiError::Api { status, message } => {
                write!(f, "Backend error ({}): {}", status, message)
            }
            ApiError::Parse(e) => write!(f, "Failed to parse backend response: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// Client for the QuantumViz backend. One instance per process; the inner
/// `reqwest::Client` pools connections across requests.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a JSON body and decode a JSON response, with the uniform
    /// status-to-error mapping used by every endpoint.
    pub(crate) async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<Resp>()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(%url, status = status.as_u16(), body = %message, "backend call failed");
            Err(ApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = BackendClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/chatbot"), "http://localhost:8080/chatbot");
    }

    #[test]
    fn api_error_display_carries_status() {
        let err = ApiError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("502"));
        assert!(display.contains("bad gateway"));
    }
}
