//! Task types handled by the worker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of work a task asks for.
///
/// Each worker process is bound to exactly one type at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Text prompt to image(s)
    #[serde(rename = "txt2img")]
    TextToImage,
    /// Source image plus prompt to image(s)
    #[serde(rename = "img2img")]
    ImageToImage,
    /// Text to audio clip(s)
    #[serde(rename = "txt2speech")]
    TextToSpeech,
    /// Audio file to transcript
    #[serde(rename = "speech2txt")]
    SpeechToText,
}

impl TaskType {
    /// All task types, in CLI help order.
    pub const ALL: [TaskType; 4] = [
        TaskType::TextToImage,
        TaskType::ImageToImage,
        TaskType::TextToSpeech,
        TaskType::SpeechToText,
    ];

    /// Wire name used by the queue service and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::TextToImage => "txt2img",
            TaskType::ImageToImage => "img2img",
            TaskType::TextToSpeech => "txt2speech",
            TaskType::SpeechToText => "speech2txt",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a task type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type '{0}' (expected one of: txt2img, img2img, txt2speech, speech2txt)")]
pub struct ParseTaskTypeError(pub String);

impl FromStr for TaskType {
    type Err = ParseTaskTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseTaskTypeError(s.to_string()))
    }
}
