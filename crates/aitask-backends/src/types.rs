//! Backend response types.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};

/// Image service response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesResponse {
    /// Base64-encoded PNG images, in generation order
    #[serde(default)]
    pub images: Vec<String>,
}

impl ImagesResponse {
    /// Decode every image, preserving order.
    pub fn decode(self) -> BackendResult<Vec<Vec<u8>>> {
        if self.images.is_empty() {
            return Err(BackendError::EmptyOutput("images"));
        }
        self.images.iter().map(|s| decode_base64(s)).collect()
    }
}

/// One generated audio clip.
///
/// The speech service returns either base64 text or a plain array of byte values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioBlob {
    Base64(String),
    Bytes(Vec<u8>),
}

impl AudioBlob {
    pub fn into_bytes(self) -> BackendResult<Vec<u8>> {
        match self {
            AudioBlob::Base64(s) => decode_base64(&s),
            AudioBlob::Bytes(bytes) => Ok(bytes),
        }
    }
}

/// Speech service response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResponse {
    #[serde(default)]
    pub audio: Vec<AudioBlob>,
}

impl AudioResponse {
    pub fn decode(self) -> BackendResult<Vec<Vec<u8>>> {
        if self.audio.is_empty() {
            return Err(BackendError::EmptyOutput("audio"));
        }
        self.audio.into_iter().map(AudioBlob::into_bytes).collect()
    }
}

/// Transcription service response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub text: String,
}

/// Decode standard base64, tolerating surrounding whitespace.
pub fn decode_base64(encoded: &str) -> BackendResult<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| BackendError::Decode(e.to_string()))
}
