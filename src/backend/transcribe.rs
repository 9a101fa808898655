//! Transcription calls: captured audio in, plain text out.
//!
//! The accumulated chunk sequence is concatenated in emission order,
//! base64-encoded, and posted as JSON. The chunk sequence is consumed, so
//! a settled session can never be retranscribed. An empty sequence fails
//! before any network transfer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{ApiError, BackendClient};
use crate::audio::AudioChunk;

/// Errors from packaging or submitting a recording for transcription.
#[derive(Debug, Clone)]
pub enum TranscribeError {
    /// The session stopped with no captured audio; no request was made.
    EmptyRecording,
    Api(ApiError),
}

impl std::fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscribeError::EmptyRecording => write!(f, "Recording contained no audio"),
            TranscribeError::Api(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TranscribeError {}

impl From<ApiError> for TranscribeError {
    fn from(e: ApiError) -> Self {
        TranscribeError::Api(e)
    }
}

#[derive(Debug, Serialize)]
struct TranscribeRequest {
    audio_data: String,
}

/// The chat-widget variant of the same endpoint names its field differently.
#[derive(Debug, Serialize)]
struct ChatAudioRequest {
    audio_file: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcription: String,
}

/// Concatenate chunks in emission order. Audio is time-ordered, so the
/// result must be a byte-for-byte prefix concatenation.
fn concat_chunks(chunks: &[AudioChunk]) -> Vec<u8> {
    let total: usize = chunks.iter().map(AudioChunk::len).sum();
    let mut blob = Vec::with_capacity(total);
    for chunk in chunks {
        blob.extend_from_slice(chunk.as_bytes());
    }
    blob
}

/// Build the base64 transport payload, rejecting empty recordings before
/// any network transfer can happen.
pub fn encode_chunks(chunks: &[AudioChunk]) -> Result<String, TranscribeError> {
    let blob = concat_chunks(chunks);
    if blob.is_empty() {
        return Err(TranscribeError::EmptyRecording);
    }
    Ok(BASE64.encode(blob))
}

impl BackendClient {
    /// POST `/transcribe-audio` with the session's captured audio.
    /// Consumes the chunk sequence; transcription is at most once per session.
    pub async fn transcribe_audio(
        &self,
        chunks: Vec<AudioChunk>,
    ) -> Result<String, TranscribeError> {
        let audio_data = encode_chunks(&chunks)?;
        drop(chunks);

        tracing::info!(payload_len = audio_data.len(), "submitting audio for transcription");
        let response: TranscribeResponse = self
            .post_json("/transcribe-audio", &TranscribeRequest { audio_data })
            .await?;
        Ok(response.transcription)
    }

    /// POST `/chatbot-transcribe-audio`, the chat widget's variant of the
    /// transcription endpoint.
    pub async fn chat_transcribe_audio(
        &self,
        chunks: Vec<AudioChunk>,
    ) -> Result<String, TranscribeError> {
        let audio_file = encode_chunks(&chunks)?;
        drop(chunks);

        let response: TranscribeResponse = self
            .post_json("/chatbot-transcribe-audio", &ChatAudioRequest { audio_file })
            .await?;
        Ok(response.transcription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chunk(bytes: &[u8]) -> AudioChunk {
        AudioChunk::new(bytes.to_vec())
    }

    #[test]
    fn concatenation_preserves_emission_order() {
        let chunks = vec![chunk(b"A"), chunk(b"B"), chunk(b"C")];
        let payload = encode_chunks(&chunks).unwrap();
        assert_eq!(BASE64.decode(payload).unwrap(), b"ABC");
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(matches!(
            encode_chunks(&[]),
            Err(TranscribeError::EmptyRecording)
        ));
        // A sequence of empty chunks carries no audio either
        assert!(matches!(
            encode_chunks(&[chunk(b""), chunk(b"")]),
            Err(TranscribeError::EmptyRecording)
        ));
    }

    #[tokio::test]
    async fn empty_recording_never_reaches_the_network() {
        // An unroutable base URL: any attempted request would surface as an
        // Api/Network error rather than EmptyRecording.
        let client = BackendClient::new("http://127.0.0.1:9", Duration::from_millis(100)).unwrap();
        let result = client.transcribe_audio(Vec::new()).await;
        assert!(matches!(result, Err(TranscribeError::EmptyRecording)));
    }

    #[test]
    fn request_bodies_use_the_wire_field_names() {
        let body = serde_json::to_value(TranscribeRequest {
            audio_data: "QQ==".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "audio_data": "QQ==" }));

        let body = serde_json::to_value(ChatAudioRequest {
            audio_file: "QQ==".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "audio_file": "QQ==" }));
    }
}
