//! Deterministic artifact and staging file names.
//!
//! Names are derived from the task id so re-running a task overwrites its
//! previous uploads instead of accumulating new objects.

use crate::task::TaskId;

/// Kind of artifact produced by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Audio,
    Transcript,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "png",
            ArtifactKind::Audio => "wav",
            ArtifactKind::Transcript => "txt",
        }
    }
}

/// `output_{taskId}_{index}.{ext}` for multi-output backends.
pub fn indexed_output_name(task_id: &TaskId, index: usize, kind: ArtifactKind) -> String {
    format!("output_{}_{}.{}", task_id, index, kind.extension())
}

/// `{taskId}_stt_result.txt`
pub fn transcript_name(task_id: &TaskId) -> String {
    format!("{}_stt_result.txt", task_id)
}

/// `{taskId}_audio.wav`, the staged input of a transcription.
pub fn staged_audio_name(task_id: &TaskId) -> String {
    format!("{}_audio.wav", task_id)
}
