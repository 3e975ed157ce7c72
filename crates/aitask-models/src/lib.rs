//! Shared data models for the AITask worker.
//!
//! This crate provides Serde-serializable types for:
//! - Queue tasks and their identifiers
//! - Task types (one per generation/transcription backend)
//! - Integer-coded task status
//! - Deterministic artifact naming

pub mod artifact;
pub mod status;
pub mod task;
pub mod task_type;

pub use artifact::{indexed_output_name, staged_audio_name, transcript_name, ArtifactKind};
pub use status::{TaskStatus, UnknownStatus};
pub use task::{Task, TaskId};
pub use task_type::{ParseTaskTypeError, TaskType};
