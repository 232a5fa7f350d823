use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlockId, ContainerAcl, FetchedBlob, StorageResult};

/// Authenticated blob service operations.
///
/// Implementations perform one round-trip per call and do not retry.
/// Paths are object paths inside `container`, without a leading `/`.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Write a whole blob in one request, replacing any existing blob
    async fn write_blob(
        &self,
        container: &str,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Stage one uncommitted block
    async fn write_block(
        &self,
        container: &str,
        path: &str,
        block_id: &BlockId,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Commit staged blocks, in order, as the new blob content
    async fn commit_blocks(
        &self,
        container: &str,
        path: &str,
        block_ids: &[BlockId],
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Read properties and content; `None` when the blob does not exist
    async fn read_blob(&self, container: &str, path: &str) -> StorageResult<Option<FetchedBlob>>;

    /// Delete a blob; a missing blob is reported as `StorageError::NotFound`
    async fn delete_blob(&self, container: &str, path: &str) -> StorageResult<()>;

    /// Read the container access-control record, if the service returned one
    async fn get_container_acl(&self, container: &str) -> StorageResult<Option<ContainerAcl>>;

    /// Canonical resource URI for `container/path`
    fn build_uri(&self, path: &str) -> String;
}

/// Percent-encode each segment of a resource path, keeping the separators
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("assets/images/logo.png"), "assets/images/logo.png");
        assert_eq!(encode_path("/assets/my file.png"), "assets/my%20file.png");
        assert_eq!(encode_path("assets/ü.txt"), "assets/%C3%BC.txt");
    }
}
