//! Object store abstraction used by the gateway.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Minimal object store surface the worker needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the contents of a local file under `key`.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Fetch an object's bytes.
    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Name of the bucket objects live in; part of every retrieval URL.
    fn bucket(&self) -> &str;
}
