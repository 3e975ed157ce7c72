//! Client for the generation and transcription services.
//!
//! Three HTTP services sit behind this crate:
//! - image service: `txt2img` and `img2img`, answering with base64 images
//! - speech service: text-to-speech, answering with audio blobs
//! - transcription service: multipart audio upload, answering with text
//!
//! Responses are decoded to raw bytes here so callers only deal with payloads.

pub mod client;
pub mod error;
pub mod types;

pub use client::{BackendConfig, GenerationClient};
pub use error::{BackendError, BackendResult};
pub use types::{AudioBlob, AudioResponse, ImagesResponse, TranscriptResponse};
