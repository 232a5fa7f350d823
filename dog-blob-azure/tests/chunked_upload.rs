use std::collections::HashSet;

use bytes::Bytes;
use dog_blob_azure::{
    BackendCall, BlockId, BlockRules, ByteStream, ChunkedUploader, MemoryBackend, StorageError,
    UploadMethod, BLOCK_ID_LEN,
};

const MIB: u64 = 1024 * 1024;

/// Test factory functions
fn small_rules() -> BlockRules {
    // 1 KiB blocks keep the boundary tests cheap; threshold stays at 64
    BlockRules::new().with_block_size(1024).unwrap()
}

fn payload(len: u64) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

/// Body delivered in uneven chunks that do not line up with block boundaries
fn body_of(data: &Bytes) -> ByteStream {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(777)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

fn block_writes(calls: &[BackendCall]) -> Vec<(BlockId, usize)> {
    calls
        .iter()
        .filter_map(|c| match c {
            BackendCall::WriteBlock { block_id, size, .. } => Some((block_id.clone(), *size)),
            _ => None,
        })
        .collect()
}

fn commits(calls: &[BackendCall]) -> Vec<Vec<BlockId>> {
    calls
        .iter()
        .filter_map(|c| match c {
            BackendCall::CommitBlocks { block_ids, .. } => Some(block_ids.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_below_threshold_is_one_write() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::new(small_rules());
    let data = payload(64 * 1024 - 1);

    let receipt = uploader
        .upload(&backend, "assets", "small.bin", body_of(&data), data.len() as u64, Some("application/zip"))
        .await
        .unwrap();

    assert_eq!(receipt.method, UploadMethod::Single);
    assert_eq!(receipt.size_bytes, data.len() as u64);
    assert_eq!(
        backend.calls(),
        vec![BackendCall::WriteBlob {
            container: "assets".to_string(),
            path: "small.bin".to_string(),
            size: data.len(),
            content_type: Some("application/zip".to_string()),
        }]
    );
    assert_eq!(backend.content("assets", "small.bin").unwrap(), data);
}

#[tokio::test]
async fn test_at_threshold_uses_blocks_and_one_commit() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::new(small_rules());
    let data = payload(64 * 1024);

    let receipt = uploader
        .upload(&backend, "assets", "big.bin", body_of(&data), data.len() as u64, Some("video/mp4"))
        .await
        .unwrap();

    let calls = backend.calls();
    let writes = block_writes(&calls);
    let commits = commits(&calls);

    assert_eq!(writes.len(), 64);
    assert!(writes.iter().all(|(_, size)| *size == 1024));
    assert_eq!(commits.len(), 1);
    assert_eq!(calls.len(), 65);
    assert!(matches!(calls.last(), Some(BackendCall::CommitBlocks { .. })));

    // committed ids are exactly the written ids, in write order
    let written_ids: Vec<BlockId> = writes.into_iter().map(|(id, _)| id).collect();
    assert_eq!(commits[0], written_ids);
    assert_eq!(receipt.block_count(), 64);

    assert_eq!(backend.content("assets", "big.bin").unwrap(), data);
}

#[tokio::test]
async fn test_short_last_block() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::new(small_rules());
    let data = payload(64 * 1024 + 1);

    uploader
        .upload(&backend, "assets", "odd.bin", body_of(&data), data.len() as u64, None)
        .await
        .unwrap();

    let writes = block_writes(&backend.calls());
    assert_eq!(writes.len(), 65);
    assert_eq!(writes.last().unwrap().1, 1);
    assert_eq!(backend.content("assets", "odd.bin").unwrap(), data);
}

#[tokio::test]
async fn test_block_ids_are_unique_alphabetic_and_fixed_length() {
    let backend = MemoryBackend::new("acct");
    let rules = BlockRules::new()
        .with_block_size(16)
        .unwrap()
        .with_large_file_threshold(1)
        .unwrap();
    let uploader = ChunkedUploader::new(rules);
    let data = payload(16 * 500);

    uploader
        .upload(&backend, "assets", "ids.bin", body_of(&data), data.len() as u64, None)
        .await
        .unwrap();

    let ids: Vec<BlockId> = block_writes(&backend.calls()).into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids.len(), 500);
    let unique: HashSet<&BlockId> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids
        .iter()
        .all(|id| id.as_str().len() == BLOCK_ID_LEN && id.as_str().chars().all(|c| c.is_ascii_lowercase())));
}

#[tokio::test]
async fn test_hundred_mib_upload_writes_hundred_blocks() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::default();
    let data = Bytes::from(vec![7u8; (100 * MIB) as usize]);
    let body: ByteStream = Box::pin(futures::stream::iter(vec![Ok::<_, std::io::Error>(data.clone())]));

    let receipt = uploader
        .upload(&backend, "assets", "movie.mp4", body, 100 * MIB, Some("video/mp4"))
        .await
        .unwrap();

    let calls = backend.calls();
    let writes = block_writes(&calls);
    let commits = commits(&calls);

    assert_eq!(writes.len(), 100);
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].len(), 100);
    assert_eq!(receipt.size_bytes, 100 * MIB);
    assert_eq!(backend.content("assets", "movie.mp4").unwrap().len() as u64, 100 * MIB);
}

#[tokio::test]
async fn test_block_failure_aborts_without_visible_write() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::new(small_rules());

    // An earlier version of the blob stays in place
    let old = payload(10);
    uploader
        .upload(&backend, "assets", "big.bin", body_of(&old), old.len() as u64, None)
        .await
        .unwrap();
    backend.clear_calls();
    backend.fail_block_write(3);

    let data = payload(64 * 1024);
    let err = uploader
        .upload(&backend, "assets", "big.bin", body_of(&data), data.len() as u64, None)
        .await
        .unwrap_err();

    match err {
        StorageError::UploadAborted {
            blocks_written,
            source,
            ..
        } => {
            assert_eq!(blocks_written, 3);
            assert!(source.is_transport());
        }
        other => panic!("expected UploadAborted, got {:?}", other),
    }

    let calls = backend.calls();
    assert_eq!(block_writes(&calls).len(), 4);
    assert!(commits(&calls).is_empty());
    assert_eq!(backend.content("assets", "big.bin").unwrap(), old);
    // orphans are left staged
    assert_eq!(backend.staged_block_count("assets", "big.bin"), 3);
}

#[tokio::test]
async fn test_commit_failure_aborts() {
    let backend = MemoryBackend::new("acct");
    backend.fail_commits();
    let uploader = ChunkedUploader::new(small_rules());
    let data = payload(64 * 1024);

    let err = uploader
        .upload(&backend, "assets", "big.bin", body_of(&data), data.len() as u64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::UploadAborted { blocks_written: 64, .. }));
    assert!(backend.content("assets", "big.bin").is_none());
}

#[tokio::test]
async fn test_too_many_blocks_rejected_before_any_write() {
    let backend = MemoryBackend::new("acct");
    let rules = small_rules().with_max_blocks(100).unwrap();
    let uploader = ChunkedUploader::new(rules);
    let data = payload(101 * 1024);

    let err = uploader
        .upload(&backend, "assets", "huge.bin", body_of(&data), data.len() as u64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Invalid { .. }));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_body_error_aborts_upload() {
    let backend = MemoryBackend::new("acct");
    let uploader = ChunkedUploader::new(small_rules());
    let body: ByteStream = Box::pin(futures::stream::iter(vec![
        Ok(Bytes::from(vec![1u8; 2048])),
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "client went away")),
    ]));

    let err = uploader
        .upload(&backend, "assets", "cut.bin", body, 64 * 1024, None)
        .await
        .unwrap_err();

    match err {
        StorageError::UploadAborted {
            blocks_written,
            source,
            ..
        } => {
            assert_eq!(blocks_written, 2);
            assert!(matches!(*source, StorageError::Io { .. }));
        }
        other => panic!("expected UploadAborted, got {:?}", other),
    }
    assert!(commits(&backend.calls()).is_empty());
}

#[tokio::test]
async fn test_zero_rules_never_reach_an_upload() {
    assert!(matches!(
        BlockRules::new().with_block_size(0),
        Err(StorageError::Config { .. })
    ));
    assert!(matches!(
        BlockRules::new().with_large_file_threshold(0),
        Err(StorageError::Config { .. })
    ));

    // the smallest threshold still sends an empty body as one write
    let backend = MemoryBackend::new("acct");
    let rules = BlockRules::new().with_large_file_threshold(1).unwrap();
    let receipt = ChunkedUploader::new(rules)
        .upload(&backend, "assets", "empty.txt", body_of(&Bytes::new()), 0, None)
        .await
        .unwrap();

    assert_eq!(receipt.method, UploadMethod::Single);
    assert!(matches!(backend.calls().as_slice(), [BackendCall::WriteBlob { size: 0, .. }]));
}

#[tokio::test]
async fn test_declared_size_does_not_size_allocations() {
    let backend = MemoryBackend::new("acct");
    let rules = BlockRules::new()
        .with_block_size(1)
        .unwrap()
        .with_large_file_threshold(1)
        .unwrap()
        .with_max_blocks(u64::MAX)
        .unwrap();
    let data = payload(3);

    // declared size far beyond what the body carries
    let receipt = ChunkedUploader::new(rules)
        .upload(&backend, "assets", "short.bin", body_of(&data), u64::MAX / 2, None)
        .await
        .unwrap();

    assert_eq!(receipt.block_count(), 3);
    assert_eq!(receipt.size_bytes, 3);
    assert_eq!(backend.content("assets", "short.bin").unwrap(), data);
}
