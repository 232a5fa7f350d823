use std::collections::HashSet;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, info, instrument};

use crate::types::collect_stream;
use crate::{
    BlobBackend, BlockId, BlockRules, ByteStream, StorageError, StorageResult, UploadReceipt,
};

/// Writes blobs either in one request or as a committed list of blocks
#[derive(Debug, Clone, Default)]
pub struct ChunkedUploader {
    rules: BlockRules,
}

impl ChunkedUploader {
    pub fn new(rules: BlockRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &BlockRules {
        &self.rules
    }

    /// Upload `body` to `container/path`.
    ///
    /// `size` picks the path: payloads spanning fewer than
    /// `large_file_block_threshold` blocks go out in a single write. Larger
    /// payloads are staged block by block and only become visible once the
    /// block list commits, so a failure leaves the previous blob untouched.
    /// Staged blocks of a failed upload are left for the service to expire.
    #[instrument(skip(self, backend, body, content_type), fields(upload_id = %uuid::Uuid::new_v4().simple()))]
    pub async fn upload(
        &self,
        backend: &dyn BlobBackend,
        container: &str,
        path: &str,
        body: ByteStream,
        size: u64,
        content_type: Option<&str>,
    ) -> StorageResult<UploadReceipt> {
        if self.rules.is_large(size) {
            self.upload_blocks(backend, container, path, body, size, content_type).await
        } else {
            self.upload_single(backend, container, path, body, content_type).await
        }
    }

    async fn upload_single(
        &self,
        backend: &dyn BlobBackend,
        container: &str,
        path: &str,
        mut body: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<UploadReceipt> {
        let data = collect_stream(&mut body).await?;
        let size = data.len() as u64;

        backend.write_blob(container, path, data, content_type).await?;
        debug!("Wrote {} bytes to {}/{} in one request", size, container, path);

        Ok(UploadReceipt::new(container, path, size).with_content_type(content_type))
    }

    async fn upload_blocks(
        &self,
        backend: &dyn BlobBackend,
        container: &str,
        path: &str,
        body: ByteStream,
        size: u64,
        content_type: Option<&str>,
    ) -> StorageResult<UploadReceipt> {
        let expected_blocks = self.rules.block_count(size);
        if expected_blocks > self.rules.max_blocks() {
            return Err(StorageError::invalid(format!(
                "{} bytes needs {} blocks of {} bytes, limit is {}",
                size, expected_blocks, self.rules.block_size(), self.rules.max_blocks()
            )));
        }

        let block_size = usize::try_from(self.rules.block_size())
            .map_err(|_| StorageError::config("block size does not fit in memory"))?;

        let mut blocks = Box::pin(fixed_blocks(body, block_size));
        let mut block_ids: Vec<BlockId> = Vec::new();
        let mut taken = HashSet::new();
        let mut written = 0u64;

        while let Some(block) = blocks.next().await {
            let block = block
                .map_err(|e| StorageError::upload_aborted(path, block_ids.len(), e.into()))?;
            let block_id = BlockId::random_unused(&taken);
            let len = block.len() as u64;

            backend
                .write_block(container, path, &block_id, block, content_type)
                .await
                .map_err(|e| StorageError::upload_aborted(path, block_ids.len(), e))?;

            written += len;
            taken.insert(block_id.clone());
            block_ids.push(block_id);
        }

        backend
            .commit_blocks(container, path, &block_ids, content_type)
            .await
            .map_err(|e| StorageError::upload_aborted(path, block_ids.len(), e))?;

        info!(
            "Committed {} blocks ({} bytes) to {}/{}",
            block_ids.len(),
            written,
            container,
            path
        );

        Ok(UploadReceipt::new(container, path, written)
            .with_content_type(content_type)
            .with_blocks(self.rules.block_size(), block_ids))
    }
}

/// Re-chunk a byte stream into blocks of exactly `block_size` bytes; the
/// final block holds the remainder.
pub fn fixed_blocks(
    mut body: ByteStream,
    block_size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    async_stream::try_stream! {
        let mut buf = BytesMut::with_capacity(block_size);
        while let Some(chunk) = body.next().await {
            let mut chunk = chunk?;
            while !chunk.is_empty() {
                let take = (block_size - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk.split_to(take));
                if buf.len() == block_size {
                    yield buf.split().freeze();
                }
            }
        }
        if !buf.is_empty() {
            yield buf.freeze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    async fn collect_blocks(body: ByteStream, block_size: usize) -> Vec<Bytes> {
        let blocks = fixed_blocks(body, block_size);
        futures::pin_mut!(blocks);
        let mut out = Vec::new();
        while let Some(block) = blocks.next().await {
            out.push(block.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_fixed_blocks_spans_uneven_chunks() {
        let body = stream_of(vec![b"ab", b"cdefg", b"", b"hij"]);
        let blocks = collect_blocks(body, 4).await;
        assert_eq!(
            blocks,
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b"ij"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fixed_blocks_exact_multiple_has_no_empty_tail() {
        let body = stream_of(vec![b"abcdefgh"]);
        let blocks = collect_blocks(body, 4).await;
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.len() == 4));
    }

    #[tokio::test]
    async fn test_fixed_blocks_empty_body() {
        let blocks = collect_blocks(stream_of(vec![]), 4).await;
        assert!(blocks.is_empty());
    }
}
