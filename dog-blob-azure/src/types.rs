use std::collections::HashSet;
use std::path::Path;
use std::pin::Pin;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use futures_util::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Length of generated block identifiers
pub const BLOCK_ID_LEN: usize = 8;

/// Identifier of one uncommitted block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    /// Draw a random lowercase id of [`BLOCK_ID_LEN`] letters
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..BLOCK_ID_LEN)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        Self(id)
    }

    /// Draw a random id not already present in `taken`
    pub fn random_unused(taken: &HashSet<BlockId>) -> Self {
        loop {
            let id = Self::random();
            if !taken.contains(&id) {
                return id;
            }
        }
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64 form the block REST API expects
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote properties of a stored blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a combined properties + content read
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub properties: BlobProperties,
    pub content: Bytes,
}

/// Anonymous read level a container grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicAccessLevel {
    /// Anonymous reads of blobs, no listing
    Blob,
    /// Anonymous reads and listing
    Container,
}

impl PublicAccessLevel {
    /// Parse the `x-ms-blob-public-access` header value; empty means none
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blob" => Some(Self::Blob),
            "container" => Some(Self::Container),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Container => "container",
        }
    }
}

/// Access-control record of a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAcl {
    pub public_access_level: Option<PublicAccessLevel>,
}

impl ContainerAcl {
    /// ACL granting anonymous access at `level`
    pub fn public(level: PublicAccessLevel) -> Self {
        Self {
            public_access_level: Some(level),
        }
    }

    /// ACL without anonymous access
    pub fn private() -> Self {
        Self::default()
    }

    /// Some SDKs return the ACL as a list; only the first record counts
    pub fn first_of(records: Vec<ContainerAcl>) -> Option<ContainerAcl> {
        records.into_iter().next()
    }
}

/// Options for URL resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Lifetime of a signed URL in seconds
    pub expires_in_secs: Option<u64>,
}

impl UrlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expiry(mut self, secs: u64) -> Self {
        self.expires_in_secs = Some(secs);
        self
    }
}

/// File-like upload input: a body plus the content type it was sent with
pub struct UploadFile {
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl UploadFile {
    /// Upload from an in-memory buffer
    pub fn from_bytes<B: Into<Bytes>>(data: B) -> Self {
        let data = data.into();
        Self {
            content_type: None,
            body: Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(data) })),
        }
    }

    /// Upload from an arbitrary byte stream
    pub fn from_stream(body: ByteStream) -> Self {
        Self {
            content_type: None,
            body,
        }
    }

    /// Upload the contents of a local file
    pub async fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(data))
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Drain the body into one buffer
    pub async fn read_all(&mut self) -> StorageResult<Bytes> {
        collect_stream(&mut self.body).await
    }
}

/// Drain a byte stream into one buffer
pub async fn collect_stream(stream: &mut ByteStream) -> StorageResult<Bytes> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(data))
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
