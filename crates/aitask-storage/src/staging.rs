//! Local staging area.
//!
//! Temporary files bridging the object store and backends that want file
//! semantics. Staging is advisory: a failed delete is logged, never raised.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageResult;

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Use `dir` as the staging directory, creating it if absent.
    pub async fn create(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Staging directory ready at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a logical file name to its staging path. Deterministic.
    pub fn allocate(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Allocate `file_name` and write `data` to it.
    pub async fn write(&self, file_name: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.allocate(file_name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Best-effort delete.
    pub async fn release(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Released staged file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release staged file {}: {}", path.display(), e),
        }
    }
}
