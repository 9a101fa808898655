//! Circuit-generation calls: prompts, generated Qiskit code, image prompts,
//! and the URLs of the Bloch-sphere plots the backend serves.

use std::collections::BTreeMap;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{ApiError, BackendClient};

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    user_input: &'a str,
}

/// The backend has returned `html_files` both as a list of file names and
/// as a map of name to full HTML document; accept either shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HtmlFiles {
    Names(Vec<String>),
    Documents(BTreeMap<String, String>),
}

impl Default for HtmlFiles {
    fn default() -> Self {
        HtmlFiles::Names(Vec::new())
    }
}

impl HtmlFiles {
    pub fn is_empty(&self) -> bool {
        match self {
            HtmlFiles::Names(names) => names.is_empty(),
            HtmlFiles::Documents(docs) => docs.is_empty(),
        }
    }
}

/// Response from `/get_qiskit_code`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedCode {
    pub code: String,
    #[serde(default)]
    pub html_files: HtmlFiles,
}

fn image_mime(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

impl BackendClient {
    /// POST `/process-prompt` with the raw user input. The response shape is
    /// owned by the backend; it is handed back opaquely.
    pub async fn process_prompt(&self, user_input: &str) -> Result<serde_json::Value, ApiError> {
        self.post_json("/process-prompt", &PromptRequest { user_input })
            .await
    }

    /// POST `/get_qiskit_code` and decode the generated code payload.
    pub async fn get_qiskit_code(&self, user_input: &str) -> Result<GeneratedCode, ApiError> {
        self.post_json("/get_qiskit_code", &PromptRequest { user_input })
            .await
    }

    /// POST `/process-image` with an image prompt as a multipart form.
    pub async fn process_image(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value, ApiError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(image_mime(filename))
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        let form = Form::new().part("image", part);

        let url = self.url("/process-image");
        let response = self
            .http()
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(%url, status = status.as_u16(), body = %message, "image upload failed");
            Err(ApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// URL of the backend-rendered Bloch sphere for one qubit, suitable for
    /// embedding by the presentation layer.
    pub fn plot_url(&self, qubit: usize) -> String {
        self.plot_file_url(&format!("qubit_{}_bloch_sphere.html", qubit))
    }

    /// URL of a named plot document under the backend's `/plots/` prefix,
    /// for the file names `/get_qiskit_code` returns.
    pub fn plot_file_url(&self, name: &str) -> String {
        format!("{}/plots/{}", self.base_url(), name)
    }
}
