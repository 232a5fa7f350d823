use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::RwLock;

use crate::backend::encode_path;
use crate::{
    BlobBackend, BlobProperties, BlockId, ContainerAcl, FetchedBlob, StorageError, StorageResult,
};

type BlobKey = (String, String);

/// A call observed by [`MemoryBackend`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    WriteBlob {
        container: String,
        path: String,
        size: usize,
        content_type: Option<String>,
    },
    WriteBlock {
        container: String,
        path: String,
        block_id: BlockId,
        size: usize,
    },
    CommitBlocks {
        container: String,
        path: String,
        block_ids: Vec<BlockId>,
        content_type: Option<String>,
    },
    ReadBlob {
        container: String,
        path: String,
    },
    DeleteBlob {
        container: String,
        path: String,
    },
    GetContainerAcl {
        container: String,
    },
}

#[derive(Debug, Clone)]
struct StoredBlob {
    properties: BlobProperties,
    content: Bytes,
}

/// Injected failures
#[derive(Debug, Default)]
struct Faults {
    acl: bool,
    reads: bool,
    deletes: bool,
    commit: bool,
    /// Fail the block write with this zero-based index
    block_write: Option<usize>,
}

/// In-memory blob service for tests and development
#[derive(Clone)]
pub struct MemoryBackend {
    endpoint: String,

    /// Committed blobs: (container, path) -> blob
    blobs: Arc<RwLock<HashMap<BlobKey, StoredBlob>>>,

    /// Uncommitted blocks: (container, path) -> block id -> data
    staged: Arc<RwLock<HashMap<BlobKey, HashMap<BlockId, Bytes>>>>,

    /// Container ACLs; containers without an entry report no ACL record
    acls: Arc<RwLock<HashMap<String, ContainerAcl>>>,

    calls: Arc<RwLock<Vec<BackendCall>>>,
    faults: Arc<RwLock<Faults>>,
}

impl MemoryBackend {
    /// Backend that builds URIs under `https://{account}.blob.core.windows.net`
    pub fn new(account_name: &str) -> Self {
        Self::with_endpoint(format!("https://{}.blob.core.windows.net", account_name))
    }

    /// Backend that builds URIs under `endpoint`
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            blobs: Arc::new(RwLock::new(HashMap::new())),
            staged: Arc::new(RwLock::new(HashMap::new())),
            acls: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            faults: Arc::new(RwLock::new(Faults::default())),
        }
    }

    /// Set the ACL a container reports
    pub fn set_container_acl<S: Into<String>>(&self, container: S, acl: ContainerAcl) {
        self.acls.write().insert(container.into(), acl);
    }

    /// Make ACL reads fail with a transport error
    pub fn fail_acl_reads(&self) {
        self.faults.write().acl = true;
    }

    /// Make blob reads fail with a transport error
    pub fn fail_reads(&self) {
        self.faults.write().reads = true;
    }

    /// Make deletes fail with a transport error
    pub fn fail_deletes(&self) {
        self.faults.write().deletes = true;
    }

    /// Make block list commits fail with a transport error
    pub fn fail_commits(&self) {
        self.faults.write().commit = true;
    }

    /// Fail the `index`-th block write (zero-based) with a transport error
    pub fn fail_block_write(&self, index: usize) {
        self.faults.write().block_write = Some(index);
    }

    /// Snapshot of the calls received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.read().clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }

    /// Committed content of a blob, bypassing the call journal
    pub fn content(&self, container: &str, path: &str) -> Option<Bytes> {
        self.blobs
            .read()
            .get(&(container.to_string(), path.to_string()))
            .map(|blob| blob.content.clone())
    }

    /// Number of staged, uncommitted blocks for a blob
    pub fn staged_block_count(&self, container: &str, path: &str) -> usize {
        self.staged
            .read()
            .get(&(container.to_string(), path.to_string()))
            .map_or(0, |blocks| blocks.len())
    }

    fn record(&self, call: BackendCall) {
        self.calls.write().push(call);
    }

    fn block_writes_so_far(&self) -> usize {
        self.calls
            .read()
            .iter()
            .filter(|c| matches!(c, BackendCall::WriteBlock { .. }))
            .count()
    }

    fn injected(what: &str) -> StorageError {
        StorageError::status(500, format!("injected {} failure", what))
    }

    fn key(container: &str, path: &str) -> BlobKey {
        (container.to_string(), path.to_string())
    }

    fn commit(&self, key: BlobKey, content: Bytes, content_type: Option<&str>) {
        let properties = BlobProperties {
            content_length: content.len() as u64,
            content_type: content_type.map(str::to_string),
            etag: Some(format!("\"{}\"", uuid::Uuid::new_v4().simple())),
            last_modified: Some(Utc::now()),
        };
        self.blobs.write().insert(key, StoredBlob { properties, content });
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn write_blob(
        &self,
        container: &str,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.record(BackendCall::WriteBlob {
            container: container.to_string(),
            path: path.to_string(),
            size: data.len(),
            content_type: content_type.map(str::to_string),
        });

        // a whole-blob write drops any uncommitted blocks
        let key = Self::key(container, path);
        self.staged.write().remove(&key);
        self.commit(key, data, content_type);
        Ok(())
    }

    async fn write_block(
        &self,
        container: &str,
        path: &str,
        block_id: &BlockId,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> StorageResult<()> {
        let index = self.block_writes_so_far();
        self.record(BackendCall::WriteBlock {
            container: container.to_string(),
            path: path.to_string(),
            block_id: block_id.clone(),
            size: data.len(),
        });

        if self.faults.read().block_write == Some(index) {
            return Err(Self::injected("block write"));
        }

        self.staged
            .write()
            .entry(Self::key(container, path))
            .or_default()
            .insert(block_id.clone(), data);
        Ok(())
    }

    async fn commit_blocks(
        &self,
        container: &str,
        path: &str,
        block_ids: &[BlockId],
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.record(BackendCall::CommitBlocks {
            container: container.to_string(),
            path: path.to_string(),
            block_ids: block_ids.to_vec(),
            content_type: content_type.map(str::to_string),
        });

        if self.faults.read().commit {
            return Err(Self::injected("commit"));
        }

        let key = Self::key(container, path);
        let mut staged = self.staged.write();
        let blocks = staged.get(&key);

        let mut content = BytesMut::new();
        for id in block_ids {
            let block = blocks
                .and_then(|b| b.get(id))
                .ok_or_else(|| StorageError::status(400, format!("InvalidBlockList: unknown block {}", id)))?;
            content.extend_from_slice(block);
        }

        // Committing discards every staged block of the blob, used or not
        staged.remove(&key);
        drop(staged);

        self.commit(key, content.freeze(), content_type);
        Ok(())
    }

    async fn read_blob(&self, container: &str, path: &str) -> StorageResult<Option<FetchedBlob>> {
        self.record(BackendCall::ReadBlob {
            container: container.to_string(),
            path: path.to_string(),
        });

        if self.faults.read().reads {
            return Err(Self::injected("read"));
        }

        Ok(self
            .blobs
            .read()
            .get(&Self::key(container, path))
            .map(|blob| FetchedBlob {
                properties: blob.properties.clone(),
                content: blob.content.clone(),
            }))
    }

    async fn delete_blob(&self, container: &str, path: &str) -> StorageResult<()> {
        self.record(BackendCall::DeleteBlob {
            container: container.to_string(),
            path: path.to_string(),
        });

        if self.faults.read().deletes {
            return Err(Self::injected("delete"));
        }

        match self.blobs.write().remove(&Self::key(container, path)) {
            Some(_) => Ok(()),
            None => Err(StorageError::not_found(format!("{}/{}", container, path))),
        }
    }

    async fn get_container_acl(&self, container: &str) -> StorageResult<Option<ContainerAcl>> {
        self.record(BackendCall::GetContainerAcl {
            container: container.to_string(),
        });

        if self.faults.read().acl {
            return Err(Self::injected("container ACL"));
        }

        Ok(self.acls.read().get(container).cloned())
    }

    fn build_uri(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, encode_path(path))
    }
}
