use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to the blob service
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {path}")]
    NotFound { path: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Upload of {path} aborted after {blocks_written} blocks: {source}")]
    UploadAborted {
        path: String,
        blocks_written: usize,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Blob service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create a transport error from any error type
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }

    /// Create an error for a non-success HTTP status
    pub fn status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Wrap a failure that interrupted a block upload
    pub fn upload_aborted<S: Into<String>>(path: S, blocks_written: usize, source: StorageError) -> Self {
        Self::UploadAborted {
            path: path.into(),
            blocks_written,
            source: Box::new(source),
        }
    }

    /// True for network and HTTP failures reported by the backend
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }

    /// True when the backend reported the blob as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Status { status: 404, .. })
    }
}
