//! # dog-blob-azure: Azure Blob Storage for DogRS uploads
//!
//! `dog-blob-azure` stores, reads, deletes and links blobs that live in an
//! Azure storage container. Uploaders get a [`BlobHandle`] per object and
//! never deal with block lists or signatures themselves.
//!
//! ## Key Features
//!
//! - **Block uploads**: objects spanning 64 blocks or more (64 MiB with the
//!   default 1 MiB blocks) are staged block by block and committed atomically
//! - **Lazy handles**: properties and content are fetched once, on first use,
//!   and cached, including "does not exist"
//! - **Two kinds of URL**: plain URLs for public containers, read-only
//!   shared-access-signature URLs for private ones
//! - **Pluggable transport**: any [`BlobBackend`]; [`RestBackend`] talks to the
//!   real service, [`MemoryBackend`] keeps everything in-process
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_blob_azure::prelude::*;
//! use dog_blob_azure::{ContainerAcl, MemoryBackend, PublicAccessLevel};
//!
//! # #[tokio::main]
//! # async fn main() -> StorageResult<()> {
//! let backend = MemoryBackend::new("myaccount");
//! backend.set_container_acl("assets", ContainerAcl::public(PublicAccessLevel::Blob));
//!
//! let config = AzureConfig::new("myaccount", "c2VjcmV0", "assets")?;
//! let storage = AzureStorage::new(backend, config);
//!
//! let file = UploadFile::from_bytes(&b"Hello, world!"[..]).with_content_type("text/plain");
//! let handle = storage.store("greetings/hello.txt", file).await?;
//!
//! assert_eq!(
//!     handle.url(&UrlOptions::default()).await?,
//!     "https://myaccount.blob.core.windows.net/assets/greetings/hello.txt"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │       AzureStorage        │  ← store / retrieve entry points
//! ├───────────────────────────┤
//! │        BlobHandle         │  ← lazy reads, delete, URLs
//! ├─────────────┬─────────────┤
//! │  Uploader   │UrlGenerator │  ← block uploads / SAS signing
//! ├─────────────┴─────────────┤
//! │        BlobBackend        │  ← transport (REST, memory, custom)
//! └───────────────────────────┘
//! ```

pub mod access;
mod auth;
pub mod backend;
mod config;
mod error;
mod handle;
pub mod memory;
mod receipt;
#[cfg(feature = "rest")]
pub mod rest;
pub mod signer;
mod storage;
mod types;
pub mod upload;

// Re-export main types for clean API
pub use access::ContainerAccess;
pub use auth::AccountKey;
pub use backend::BlobBackend;
pub use config::{AzureConfig, BlockRules};
pub use error::{StorageError, StorageResult};
pub use handle::BlobHandle;
pub use memory::{BackendCall, MemoryBackend};
pub use receipt::{UploadMethod, UploadReceipt};
#[cfg(feature = "rest")]
pub use rest::RestBackend;
pub use signer::{SasRequest, SasResource, SharedAccessSignature, UrlGenerator};
pub use storage::AzureStorage;
pub use types::{
    BlobProperties, BlockId, ByteStream, ContainerAcl, FetchedBlob, PublicAccessLevel, UploadFile,
    UrlOptions, BLOCK_ID_LEN,
};
pub use upload::ChunkedUploader;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AzureConfig, AzureStorage, BlobBackend, BlobHandle, StorageError, StorageResult, UploadFile,
        UrlOptions,
    };
}
