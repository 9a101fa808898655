//! Audio capture module for the voice-interaction controller.
//!
//! This module handles microphone input capture. Captured audio accumulates
//! as an ordered sequence of in-memory chunks (roughly one second of PCM
//! each); the sequence is drained once when the recording stops.

pub mod recorder;

pub use recorder::{AudioRecorder, RecordingHandle};

/// One incrementally captured unit of raw audio. Opaque to everything
/// downstream; only emission order matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(Vec<u8>);

impl AudioChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Errors that can occur while acquiring or running the capture device.
#[derive(Debug, Clone)]
pub enum CaptureError {
    PermissionDenied,
    DeviceUnavailable,
    UnsupportedConfig,
    StreamFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => {
                write!(f, "Access to the audio input device was denied")
            }
            CaptureError::DeviceUnavailable => write!(f, "No audio input device available"),
            CaptureError::UnsupportedConfig => write!(f, "No supported audio configuration"),
            CaptureError::StreamFailed(e) => write!(f, "Audio stream failed: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}
