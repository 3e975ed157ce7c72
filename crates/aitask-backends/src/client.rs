//! Generation backend HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};
use crate::types::{AudioResponse, ImagesResponse, TranscriptResponse};

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Image service base URL (txt2img, img2img)
    pub image_api_url: String,
    /// Text-to-speech service base URL
    pub tts_api_url: String,
    /// Speech-to-text service base URL
    pub stt_api_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// First retry delay, doubled on each attempt
    pub retry_base_delay: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            image_api_url: "http://127.0.0.1:7860".to_string(),
            tts_api_url: "http://127.0.0.1:8084".to_string(),
            stt_api_url: "http://127.0.0.1:8083".to_string(),
            timeout: Duration::from_secs(600), // diffusion runs are slow
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image_api_url: std::env::var("IMAGE_API_URL").unwrap_or(defaults.image_api_url),
            tts_api_url: std::env::var("TTS_API_URL").unwrap_or(defaults.tts_api_url),
            stt_api_url: std::env::var("STT_API_URL").unwrap_or(defaults.stt_api_url),
            timeout: std::env::var("BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("BACKEND_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Client for the generation and transcription services.
#[derive(Clone)]
pub struct GenerationClient {
    http: Client,
    config: BackendConfig,
}

impl GenerationClient {
    /// Create a new backend client.
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("aitask-backends/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Text-to-image. Returns decoded PNG bytes in generation order.
    pub async fn txt2img(&self, payload: &Value) -> BackendResult<Vec<Vec<u8>>> {
        let url = endpoint(&self.config.image_api_url, "/generate/txt2img");
        let response: ImagesResponse = self.post_json(&url, payload).await?;
        response.decode()
    }

    /// Image-to-image. Same response shape as [`Self::txt2img`].
    pub async fn img2img(&self, payload: &Value) -> BackendResult<Vec<Vec<u8>>> {
        let url = endpoint(&self.config.image_api_url, "/generate/img2img");
        let response: ImagesResponse = self.post_json(&url, payload).await?;
        response.decode()
    }

    /// Text-to-speech. Returns decoded WAV bytes in generation order.
    pub async fn speech(&self, payload: &Value) -> BackendResult<Vec<Vec<u8>>> {
        let url = endpoint(&self.config.tts_api_url, "/speech");
        let response: AudioResponse = self.post_json(&url, payload).await?;
        response.decode()
    }

    /// Upload a WAV file as multipart field `file` and return the transcript.
    pub async fn transcribe(&self, audio_path: &Path) -> BackendResult<String> {
        let url = endpoint(&self.config.stt_api_url, "/transcribe");
        let data = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        debug!("Sending {} bytes for transcription to {}", data.len(), url);

        let response = self
            .with_retry(|| async {
                let part = Part::bytes(data.clone())
                    .file_name(file_name.clone())
                    .mime_str("audio/wav")?;
                let form = Form::new().part("file", part);
                let response = self.http.post(&url).multipart(form).send().await?;
                Self::read_json::<TranscriptResponse>(response).await
            })
            .await?;

        Ok(response.text)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, payload: &Value) -> BackendResult<T> {
        debug!("Sending generation request to {}", url);

        self.with_retry(|| async {
            let response = self.http.post(url).json(payload).send().await?;
            Self::read_json(response).await
        })
        .await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_http_status(status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::invalid_response(e.to_string()))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> BackendResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = BackendResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "Backend request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| BackendError::invalid_response("retries exhausted")))
    }
}
