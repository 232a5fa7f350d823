use std::sync::Arc;

use tracing::instrument;

use crate::{AzureConfig, BlobBackend, BlobHandle, StorageResult, UploadFile};

/// Entry point for uploaders: hands out [`BlobHandle`]s bound to the
/// configured container, sharing one backend connection
#[derive(Clone)]
pub struct AzureStorage {
    backend: Arc<dyn BlobBackend>,
    config: Arc<AzureConfig>,
}

impl AzureStorage {
    /// Create storage over `backend`
    pub fn new<B: BlobBackend + 'static>(backend: B, config: AzureConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
        }
    }

    /// Create storage over an already shared backend
    pub fn with_shared(backend: Arc<dyn BlobBackend>, config: Arc<AzureConfig>) -> Self {
        Self { backend, config }
    }

    /// REST-backed storage configured from the environment
    #[cfg(feature = "rest")]
    pub fn from_env() -> StorageResult<Self> {
        let config = AzureConfig::from_env()?;
        let backend = crate::RestBackend::new(&config)?;
        Ok(Self::new(backend, config))
    }

    pub fn config(&self) -> &AzureConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn BlobBackend> {
        self.backend.clone()
    }

    /// Upload `file` to `path` and return its handle
    #[instrument(skip(self, file), fields(container = %self.config.container))]
    pub async fn store(&self, path: &str, file: UploadFile) -> StorageResult<BlobHandle> {
        let mut handle = self.retrieve(path);
        handle.store(file).await?;
        Ok(handle)
    }

    /// Handle for an existing (or absent) blob at `path`; nothing is fetched yet
    pub fn retrieve(&self, path: &str) -> BlobHandle {
        BlobHandle::new(self.backend.clone(), self.config.clone(), path)
    }
}
