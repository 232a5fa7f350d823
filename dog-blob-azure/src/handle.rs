use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::signer::UrlGenerator;
use crate::{
    AzureConfig, BlobBackend, BlobProperties, BlockId, ByteStream, ChunkedUploader, StorageResult, UploadFile,
    UploadMethod, UrlOptions,
};

/// Outcome of the one remote read a handle performs
#[derive(Debug, Clone)]
enum FetchState {
    Unfetched,
    Found(BlobProperties),
    Missing,
}

/// A blob addressed by (container, path).
///
/// Remote properties and content are read lazily, once, and cached on the
/// handle, including a "does not exist" answer. Use [`BlobHandle::invalidate`]
/// to force a fresh read. Handles are not meant to be shared between
/// concurrent tasks.
pub struct BlobHandle {
    backend: Arc<dyn BlobBackend>,
    config: Arc<AzureConfig>,
    path: String,
    content: Option<Bytes>,
    content_type: Option<String>,
    fetched: FetchState,
    block_ids: Vec<BlockId>,
}

impl BlobHandle {
    /// Handle for `path` inside the configured container
    pub fn new<P: Into<String>>(backend: Arc<dyn BlobBackend>, config: Arc<AzureConfig>, path: P) -> Self {
        Self {
            backend,
            config,
            path: path.into().trim_start_matches('/').to_string(),
            content: None,
            content_type: None,
            fetched: FetchState::Unfetched,
            block_ids: Vec::new(),
        }
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Block ids committed by the last block upload through this handle
    pub fn block_ids(&self) -> &[BlockId] {
        &self.block_ids
    }

    /// Upload `file`, replacing whatever is stored at this path
    #[instrument(skip(self, file), fields(container = %self.config.container, path = %self.path))]
    pub async fn store(&mut self, mut file: UploadFile) -> StorageResult<()> {
        let data = file.read_all().await?;
        let size = data.len() as u64;
        let body: ByteStream = {
            let data = data.clone();
            Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(data) }))
        };

        let uploader = ChunkedUploader::new(self.config.block_rules.clone());
        let receipt = uploader
            .upload(
                self.backend.as_ref(),
                &self.config.container,
                &self.path,
                body,
                size,
                file.content_type.as_deref(),
            )
            .await?;

        self.block_ids = match receipt.method {
            UploadMethod::Blocks { block_ids, .. } => block_ids,
            UploadMethod::Single => Vec::new(),
        };
        self.content = Some(data);
        self.content_type = file.content_type;
        self.fetched = FetchState::Unfetched;

        info!("Stored {} bytes", size);
        Ok(())
    }

    /// Whether the blob exists remotely
    pub async fn exists(&mut self) -> bool {
        self.properties().await.is_some()
    }

    /// Remote content length
    pub async fn size(&mut self) -> Option<u64> {
        self.properties().await.map(|p| p.content_length)
    }

    /// Content type set on this handle, else the remote one
    pub async fn content_type(&mut self) -> Option<String> {
        if self.content_type.is_none() {
            self.content_type = self.properties().await.and_then(|p| p.content_type);
        }
        self.content_type.clone()
    }

    pub fn set_content_type<S: Into<String>>(&mut self, content_type: S) {
        self.content_type = Some(content_type.into());
    }

    /// Blob content; `None` when the blob does not exist
    pub async fn read(&mut self) -> Option<Bytes> {
        if self.content.is_none() {
            self.load().await;
        }
        self.content.clone()
    }

    /// Remote properties; `None` when the blob does not exist
    pub async fn properties(&mut self) -> Option<BlobProperties> {
        self.load().await;
        match &self.fetched {
            FetchState::Found(properties) => Some(properties.clone()),
            FetchState::Unfetched | FetchState::Missing => None,
        }
    }

    /// Drop cached remote state so the next accessor reads again
    pub fn invalidate(&mut self) {
        self.fetched = FetchState::Unfetched;
        self.content = None;
    }

    /// Delete the blob. `false` when it was already gone or the call failed.
    #[instrument(skip(self), fields(container = %self.config.container, path = %self.path))]
    pub async fn delete(&mut self) -> bool {
        match self.backend.delete_blob(&self.config.container, &self.path).await {
            Ok(()) => {
                self.fetched = FetchState::Missing;
                self.content = None;
                info!("Deleted blob");
                true
            }
            Err(e) if e.is_not_found() => {
                self.fetched = FetchState::Missing;
                self.content = None;
                debug!("Blob already absent");
                false
            }
            Err(e) => {
                warn!("Deleting blob failed: {}", e);
                false
            }
        }
    }

    /// Access URL: signed for private containers, plain for public ones
    #[instrument(skip(self), fields(container = %self.config.container, path = %self.path))]
    pub async fn url(&self, options: &UrlOptions) -> StorageResult<String> {
        UrlGenerator::new(&self.config, self.backend.as_ref())
            .resolve(&self.resource_path(), options)
            .await
    }

    /// Last path segment of the decoded URL
    pub async fn filename(&self) -> StorageResult<String> {
        let url = self.url(&UrlOptions::default()).await?;
        let location = url.split(['?', '#']).next().unwrap_or_default();
        let decoded = match urlencoding::decode(location) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => location.to_string(),
        };
        Ok(decoded.rsplit('/').next().unwrap_or_default().to_string())
    }

    /// Text after the last `.` of the path
    pub fn extension(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(_, ext)| ext)
    }

    fn resource_path(&self) -> String {
        format!("{}/{}", self.config.container, self.path)
    }

    async fn load(&mut self) {
        if !matches!(self.fetched, FetchState::Unfetched) {
            return;
        }

        self.fetched = match self.backend.read_blob(&self.config.container, &self.path).await {
            Ok(Some(blob)) => {
                self.content = Some(blob.content);
                FetchState::Found(blob.properties)
            }
            Ok(None) => {
                self.content = None;
                FetchState::Missing
            }
            Err(e) => {
                warn!("Reading {} failed, treating it as missing: {}", self.resource_path(), e);
                self.content = None;
                FetchState::Missing
            }
        };
    }
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHandle")
            .field("container", &self.config.container)
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .field("fetched", &self.fetched)
            .finish_non_exhaustive()
    }
}
