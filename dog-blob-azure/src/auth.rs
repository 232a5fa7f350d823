use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Decoded storage account access key.
///
/// The service hands out keys as base64 text; signing uses the raw bytes, so
/// the key is decoded once when the configuration is built.
#[derive(Clone)]
pub struct AccountKey(Vec<u8>);

impl AccountKey {
    /// Decode a base64 access key as issued by the storage account
    pub fn from_base64(encoded: &str) -> StorageResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StorageError::config(format!("storage access key is not valid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(StorageError::config("storage access key is empty"));
        }
        Ok(Self(bytes))
    }

    /// HMAC-SHA256 over `message`, base64 encoded
    pub fn sign(&self, message: &str) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.0)
            .map_err(|e| StorageError::config(format!("unusable storage access key: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccountKey(<redacted>)")
    }
}
