use std::env;

use crate::{AccountKey, StorageError, StorageResult};

/// Connection settings for one storage account and container
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Storage account name (also the SAS signing identity)
    pub account_name: String,

    /// Decoded account access key
    pub access_key: AccountKey,

    /// Container every handle built from this config lives in
    pub container: String,

    /// Public host that fronts the container (CDN); replaces the service URI in URLs
    pub asset_host: Option<String>,

    /// Override for the blob service endpoint (emulators, sovereign clouds)
    pub blob_host: Option<String>,

    /// Expiry applied to signed URLs when the caller does not ask for one
    pub default_expiry: Option<u64>,

    /// Block upload rules
    pub block_rules: BlockRules,
}

impl AzureConfig {
    /// Create a config from the account credentials and container name
    pub fn new<A, C>(account_name: A, access_key: &str, container: C) -> StorageResult<Self>
    where
        A: Into<String>,
        C: Into<String>,
    {
        let account_name = account_name.into();
        let container = container.into();
        if account_name.is_empty() {
            return Err(StorageError::config("storage account name is empty"));
        }
        if container.is_empty() {
            return Err(StorageError::config("container name is empty"));
        }

        Ok(Self {
            account_name,
            access_key: AccountKey::from_base64(access_key)?,
            container,
            asset_host: None,
            blob_host: None,
            default_expiry: None,
            block_rules: BlockRules::default(),
        })
    }

    /// Load settings from the environment.
    ///
    /// Required: `STORAGE_ACCOUNT_NAME`, `STORAGE_ACCESS_KEY`, `CONTAINER_NAME`.
    /// Optional: `DEFAULT_EXPIRY` (seconds), `ASSET_HOST`, `STORAGE_BLOB_HOST`.
    pub fn from_env() -> StorageResult<Self> {
        fn get_env(key: &str) -> StorageResult<String> {
            env::var(key).map_err(|_| StorageError::config(format!("{} environment variable required", key)))
        }

        fn get_optional(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        let mut config = Self::new(
            get_env("STORAGE_ACCOUNT_NAME")?,
            &get_env("STORAGE_ACCESS_KEY")?,
            get_env("CONTAINER_NAME")?,
        )?;

        if let Some(expiry) = get_optional("DEFAULT_EXPIRY") {
            let secs = expiry
                .trim()
                .parse::<u64>()
                .map_err(|_| StorageError::config(format!("DEFAULT_EXPIRY must be whole seconds, got {:?}", expiry)))?;
            config = config.with_default_expiry(secs);
        }
        if let Some(host) = get_optional("ASSET_HOST") {
            config = config.with_asset_host(host);
        }
        if let Some(host) = get_optional("STORAGE_BLOB_HOST") {
            config = config.with_blob_host(host);
        }

        Ok(config)
    }

    /// Serve public URLs from this host instead of the service endpoint
    pub fn with_asset_host<S: Into<String>>(mut self, host: S) -> Self {
        self.asset_host = Some(trim_host(host.into()));
        self
    }

    /// Point the REST backend at a different blob endpoint
    pub fn with_blob_host<S: Into<String>>(mut self, host: S) -> Self {
        self.blob_host = Some(trim_host(host.into()));
        self
    }

    /// Set the signed URL expiry used when none is requested
    pub fn with_default_expiry(mut self, secs: u64) -> Self {
        self.default_expiry = Some(secs);
        self
    }

    /// Set block upload rules
    pub fn with_block_rules(mut self, rules: BlockRules) -> Self {
        self.block_rules = rules;
        self
    }

    /// Service endpoint, `https://{account}.blob.core.windows.net` unless overridden
    pub fn blob_endpoint(&self) -> String {
        match &self.blob_host {
            Some(host) => host.clone(),
            None => format!("https://{}.blob.core.windows.net", self.account_name),
        }
    }
}

fn trim_host(host: String) -> String {
    host.trim_end_matches('/').to_string()
}

/// Rules for splitting large objects into blocks.
///
/// Fields are only set through the validating `with_*` setters, so every
/// value is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRules {
    /// Size of every block except the last
    block_size: u64,

    /// Objects spanning at least this many blocks are uploaded in blocks
    large_file_block_threshold: u64,

    /// Service limit on committed blocks per blob
    max_blocks: u64,
}

impl Default for BlockRules {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024, // 1 MiB
            large_file_block_threshold: 64,
            max_blocks: 50_000,
        }
    }
}

impl BlockRules {
    /// Create block rules with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set block size
    pub fn with_block_size(mut self, bytes: u64) -> StorageResult<Self> {
        if bytes == 0 {
            return Err(StorageError::config("block size must be greater than zero"));
        }
        self.block_size = bytes;
        Ok(self)
    }

    /// Set the block count at which uploads switch to blocks
    pub fn with_large_file_threshold(mut self, blocks: u64) -> StorageResult<Self> {
        if blocks == 0 {
            return Err(StorageError::config("large file threshold must be at least one block"));
        }
        self.large_file_block_threshold = blocks;
        Ok(self)
    }

    /// Set the maximum number of blocks per blob
    pub fn with_max_blocks(mut self, max: u64) -> StorageResult<Self> {
        if max == 0 {
            return Err(StorageError::config("max blocks must be greater than zero"));
        }
        self.max_blocks = max;
        Ok(self)
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn large_file_block_threshold(&self) -> u64 {
        self.large_file_block_threshold
    }

    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    /// Whether an object of `size` bytes takes the block path
    pub fn is_large(&self, size: u64) -> bool {
        size / self.block_size >= self.large_file_block_threshold
    }

    /// Number of blocks needed for `size` bytes
    pub fn block_count(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size)
    }
}
