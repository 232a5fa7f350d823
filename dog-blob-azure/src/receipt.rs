use serde::{Deserialize, Serialize};

use crate::BlockId;

/// Receipt returned after a blob upload completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub container: String,
    pub path: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub method: UploadMethod,
    pub completed_at: i64,
}

/// How the blob reached the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMethod {
    /// One write of the whole payload
    Single,
    /// Staged blocks committed as a block list
    Blocks {
        block_size: u64,
        block_ids: Vec<BlockId>,
    },
}

impl UploadReceipt {
    pub fn new<C, P>(container: C, path: P, size_bytes: u64) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        Self {
            container: container.into(),
            path: path.into(),
            size_bytes,
            content_type: None,
            method: UploadMethod::Single,
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    /// Record a block upload
    pub fn with_blocks(mut self, block_size: u64, block_ids: Vec<BlockId>) -> Self {
        self.method = UploadMethod::Blocks { block_size, block_ids };
        self
    }

    /// Number of committed blocks, zero for single writes
    pub fn block_count(&self) -> usize {
        match &self.method {
            UploadMethod::Single => 0,
            UploadMethod::Blocks { block_ids, .. } => block_ids.len(),
        }
    }
}
