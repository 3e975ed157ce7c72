//! Backend invokers, one per task type.
//!
//! An invoker turns a task payload into a backend call and returns the URLs
//! of the stored artifacts, in backend output order.

use std::path::Path;
use std::sync::Arc;

use aitask_backends::GenerationClient;
use aitask_models::{indexed_output_name, staged_audio_name, transcript_name, ArtifactKind, Task, TaskType};
use aitask_storage::{ArtifactGateway, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{TaskError, TaskResult};

#[async_trait]
pub trait Invoker: Send + Sync {
    /// Reject payloads that can never succeed, before any claim or backend call.
    fn validate(&self, _task: &Task) -> TaskResult<()> {
        Ok(())
    }

    async fn invoke(&self, task: &Task) -> TaskResult<Vec<String>>;

    /// Remove staged files left behind when `invoke` was cancelled.
    async fn cleanup(&self, _task: &Task) {}
}

/// Shared handles every invoker needs.
#[derive(Clone)]
pub struct InvokerContext {
    pub backends: GenerationClient,
    pub gateway: Arc<ArtifactGateway>,
    pub account: String,
}

impl InvokerContext {
    pub fn new(backends: GenerationClient, gateway: Arc<ArtifactGateway>, account: impl Into<String>) -> Self {
        Self {
            backends,
            gateway,
            account: account.into(),
        }
    }

    /// Upload each output as `output_{taskId}_{index}.{ext}`, preserving order.
    async fn upload_outputs(&self, task: &Task, outputs: Vec<Vec<u8>>, kind: ArtifactKind) -> TaskResult<Vec<String>> {
        let mut urls = Vec::with_capacity(outputs.len());
        for (index, bytes) in outputs.iter().enumerate() {
            let name = indexed_output_name(&task.id, index, kind);
            let url = self
                .gateway
                .upload(bytes, &self.account, &task.id, &name)
                .await?;
            urls.push(url);
        }
        Ok(urls)
    }
}

/// Invoker for the worker's configured task type.
pub fn invoker_for(task_type: TaskType, ctx: InvokerContext) -> Arc<dyn Invoker> {
    match task_type {
        TaskType::TextToImage => Arc::new(TextToImage { ctx }),
        TaskType::ImageToImage => Arc::new(ImageToImage { ctx }),
        TaskType::TextToSpeech => Arc::new(TextToSpeech { ctx }),
        TaskType::SpeechToText => Arc::new(SpeechToText { ctx }),
    }
}

fn payload(task: &Task) -> TaskResult<&Value> {
    task.data
        .as_ref()
        .ok_or_else(|| TaskError::validation("task has no data"))
}

pub struct TextToImage {
    ctx: InvokerContext,
}

#[async_trait]
impl Invoker for TextToImage {
    async fn invoke(&self, task: &Task) -> TaskResult<Vec<String>> {
        let images = self.ctx.backends.txt2img(payload(task)?).await?;
        debug!(task_id = %task.id, "Backend returned {} images", images.len());
        self.ctx.upload_outputs(task, images, ArtifactKind::Image).await
    }
}

pub struct ImageToImage {
    ctx: InvokerContext,
}

#[async_trait]
impl Invoker for ImageToImage {
    async fn invoke(&self, task: &Task) -> TaskResult<Vec<String>> {
        let images = self.ctx.backends.img2img(payload(task)?).await?;
        debug!(task_id = %task.id, "Backend returned {} images", images.len());
        self.ctx.upload_outputs(task, images, ArtifactKind::Image).await
    }
}

pub struct TextToSpeech {
    ctx: InvokerContext,
}

#[async_trait]
impl Invoker for TextToSpeech {
    async fn invoke(&self, task: &Task) -> TaskResult<Vec<String>> {
        let clips = self.ctx.backends.speech(payload(task)?).await?;
        debug!(task_id = %task.id, "Backend returned {} audio clips", clips.len());
        self.ctx.upload_outputs(task, clips, ArtifactKind::Audio).await
    }
}

/// Downloads `data.input`, transcribes it, stores the transcript as text.
pub struct SpeechToText {
    ctx: InvokerContext,
}

impl SpeechToText {
    fn input_key(task: &Task) -> TaskResult<&str> {
        match task.data_str("input") {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TaskError::validation("speech2txt requires data.input (object key)")),
        }
    }

    async fn transcribe_staged(
        &self,
        task: &Task,
        input_key: &str,
        audio_path: &Path,
        transcript_path: &Path,
    ) -> TaskResult<Vec<String>> {
        self.ctx.gateway.download(input_key, audio_path).await?;

        let text = self.ctx.backends.transcribe(audio_path).await?;
        debug!(task_id = %task.id, "Transcript is {} chars", text.len());

        tokio::fs::write(transcript_path, text.as_bytes())
            .await
            .map_err(|e| StorageError::staging_failed(format!("{}: {}", transcript_path.display(), e)))?;

        let url = self
            .ctx
            .gateway
            .upload_staged(transcript_path, &self.ctx.account, &transcript_name(&task.id))
            .await?;
        Ok(vec![url])
    }
}

#[async_trait]
impl Invoker for SpeechToText {
    fn validate(&self, task: &Task) -> TaskResult<()> {
        Self::input_key(task).map(|_| ())
    }

    async fn invoke(&self, task: &Task) -> TaskResult<Vec<String>> {
        let input_key = Self::input_key(task)?;
        let staging = self.ctx.gateway.staging();
        let audio_path = staging.allocate(&staged_audio_name(&task.id));
        let transcript_path = staging.allocate(&transcript_name(&task.id));

        let result = self
            .transcribe_staged(task, input_key, &audio_path, &transcript_path)
            .await;

        staging.release(&audio_path).await;
        staging.release(&transcript_path).await;
        result
    }

    async fn cleanup(&self, task: &Task) {
        let staging = self.ctx.gateway.staging();
        staging.release(&staging.allocate(&staged_audio_name(&task.id))).await;
        staging.release(&staging.allocate(&transcript_name(&task.id))).await;
    }
}
