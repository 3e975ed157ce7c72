//! Shared fixtures for worker tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aitask_backends::{BackendConfig, GenerationClient};
use aitask_models::Task;
use aitask_storage::{ArtifactGateway, MemoryObjectStore, ObjectStore, StagingArea};
use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::MockServer;

use crate::error::{TaskError, TaskResult};
use crate::invokers::{Invoker, InvokerContext};

pub const ACCOUNT: &str = "acc1";
pub const PUBLIC_URL: &str = "http://minio.test";

/// Mock backend server, in-memory bucket and a temporary staging directory.
pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryObjectStore>,
    pub gateway: Arc<ArtifactGateway>,
    pub backends: GenerationClient,
    _dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::create(dir.path().join("staging")).await.unwrap();

        let store = Arc::new(MemoryObjectStore::new("aitask"));
        let object_store: Arc<dyn ObjectStore> = store.clone();
        let gateway = Arc::new(ArtifactGateway::new(object_store, staging, PUBLIC_URL));

        let backends = GenerationClient::new(BackendConfig {
            image_api_url: server.uri(),
            tts_api_url: server.uri(),
            stt_api_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
        })
        .unwrap();

        Self {
            server,
            store,
            gateway,
            backends,
            _dir: dir,
        }
    }

    pub fn context(&self) -> InvokerContext {
        InvokerContext::new(self.backends.clone(), Arc::clone(&self.gateway), ACCOUNT)
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/aitask/{}/{}", PUBLIC_URL, ACCOUNT, file_name)
    }

    pub fn staging_dir(&self) -> &Path {
        self.gateway.staging().dir()
    }
}

/// Invoker with scripted behavior that counts its calls.
pub struct StubInvoker {
    behavior: StubBehavior,
    calls: AtomicUsize,
}

pub enum StubBehavior {
    Succeed(Vec<String>),
    Fail(fn() -> TaskError),
    /// Fail after running for a while.
    FailAfter(Duration, fn() -> TaskError),
    Hang,
}

impl StubInvoker {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for StubInvoker {
    async fn invoke(&self, _task: &Task) -> TaskResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Succeed(urls) => Ok(urls.clone()),
            StubBehavior::Fail(make) => Err(make()),
            StubBehavior::FailAfter(delay, make) => {
                tokio::time::sleep(*delay).await;
                Err(make())
            }
            StubBehavior::Hang => std::future::pending().await,
        }
    }
}
