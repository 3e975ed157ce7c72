//! Artifact storage for the AITask worker.
//!
//! This crate provides:
//! - S3-compatible object store client (MinIO, path-style addressing)
//! - Object store gateway: account-scoped uploads and retrieval URLs
//! - Local staging area for backends that need files instead of bytes
//! - In-memory object store for tests and dry runs

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod staging;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use gateway::{content_type_for, ArtifactGateway};
pub use memory::MemoryObjectStore;
pub use staging::StagingArea;
pub use store::ObjectStore;
