//! Object store gateway.
//!
//! Account-scoped artifact uploads and input downloads. Object keys are
//! `<account>/<file_name>`; retrieval URLs are `<public_url>/<bucket>/<key>`.

use std::path::Path;
use std::sync::Arc;

use aitask_models::TaskId;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::staging::StagingArea;
use crate::store::ObjectStore;

/// Content type derived from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".wav") {
        "audio/wav"
    } else if lower.ends_with(".txt") {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

#[derive(Clone)]
pub struct ArtifactGateway {
    store: Arc<dyn ObjectStore>,
    staging: StagingArea,
    public_url: String,
}

impl ArtifactGateway {
    pub fn new(store: Arc<dyn ObjectStore>, staging: StagingArea, public_url: impl Into<String>) -> Self {
        Self {
            store,
            staging,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// `<account>/<file_name>`. The file name is used verbatim.
    pub fn object_key(account: &str, file_name: &str) -> String {
        format!("{}/{}", account, file_name)
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.store.bucket(), key)
    }

    /// Stage `data`, store it as `<account>/<file_name>`, return its URL.
    ///
    /// The staged copy is released whether or not the upload succeeds.
    pub async fn upload(
        &self,
        data: &[u8],
        account: &str,
        task_id: &TaskId,
        file_name: &str,
    ) -> StorageResult<String> {
        debug!(task_id = %task_id, "Staging {} bytes as {}", data.len(), file_name);

        let path = self
            .staging
            .write(file_name, data)
            .await
            .map_err(|e| StorageError::staging_failed(format!("{}: {}", file_name, e)))?;

        let result = self.upload_staged(&path, account, file_name).await;
        self.staging.release(&path).await;
        result
    }

    /// Store an already-staged file as `<account>/<file_name>`.
    ///
    /// The caller keeps ownership of `path` and releases it.
    pub async fn upload_staged(&self, path: &Path, account: &str, file_name: &str) -> StorageResult<String> {
        let key = Self::object_key(account, file_name);
        self.store
            .put_file(path, &key, content_type_for(file_name))
            .await?;

        let url = self.object_url(&key);
        info!("Stored artifact {}", url);
        Ok(url)
    }

    /// Fetch `object_key` into `local_path`, creating parent directories.
    pub async fn download(&self, object_key: &str, local_path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", object_key, local_path.display());

        let bytes = self.store.get_bytes(object_key).await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::download_failed(format!("Failed to create directory: {}", e)))?;
        }

        tokio::fs::write(local_path, bytes)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write file: {}", e)))?;

        Ok(())
    }
}
