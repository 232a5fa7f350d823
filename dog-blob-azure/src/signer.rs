//! Public and shared-access-signature URLs for blobs.
//!
//! Public containers get the plain resource URI. Private containers get a
//! service SAS: a read-only, blob-scoped token appended as query parameters
//! and signed with the account key.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::debug;

use crate::access::{classify, ContainerAccess};
use crate::backend::encode_path;
use crate::{AccountKey, AzureConfig, BlobBackend, StorageResult, UrlOptions};

/// Service version the SAS string-to-sign follows
pub const SAS_VERSION: &str = "2018-11-09";

/// Kind of resource a SAS grants access to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource {
    Blob,
    Container,
}

impl SasResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "b",
            Self::Container => "c",
        }
    }
}

/// Parameters of one signed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasRequest {
    pub permissions: String,
    pub resource: SasResource,
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
}

impl SasRequest {
    /// Read-only access to a single blob
    pub fn read_blob() -> Self {
        Self {
            permissions: "r".to_string(),
            resource: SasResource::Blob,
            start: None,
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }
}

/// ISO-8601 UTC with second precision, e.g. `2026-10-18T12:00:00Z`
pub fn format_sas_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Service SAS signer for one storage account
pub struct SharedAccessSignature<'a> {
    account_name: &'a str,
    key: &'a AccountKey,
}

impl<'a> SharedAccessSignature<'a> {
    pub fn new(account_name: &'a str, key: &'a AccountKey) -> Self {
        Self { account_name, key }
    }

    /// Canonical string for `resource_path` (`container/blob`, not encoded)
    pub fn string_to_sign(&self, resource_path: &str, request: &SasRequest) -> String {
        let start = request.start.as_ref().map(format_sas_time).unwrap_or_default();
        let expiry = request.expiry.as_ref().map(format_sas_time).unwrap_or_default();
        let canonical = format!(
            "/blob/{}/{}",
            self.account_name,
            resource_path.trim_start_matches('/')
        );

        // sp, st, se, resource, si, sip, spr, sv, sr, snapshot, rscc, rscd, rsce, rscl, rsct
        let fields: [&str; 15] = [
            request.permissions.as_str(),
            start.as_str(),
            expiry.as_str(),
            canonical.as_str(),
            "",
            "",
            "",
            SAS_VERSION,
            request.resource.as_str(),
            "",
            "",
            "",
            "",
            "",
            "",
        ];
        fields.join("\n")
    }

    /// Signed query string, without a leading `?`
    pub fn token(&self, resource_path: &str, request: &SasRequest) -> StorageResult<String> {
        let signature = self.key.sign(&self.string_to_sign(resource_path, request))?;

        let mut params = vec![("sv", SAS_VERSION.to_string())];
        if let Some(start) = &request.start {
            params.push(("st", format_sas_time(start)));
        }
        if let Some(expiry) = &request.expiry {
            params.push(("se", format_sas_time(expiry)));
        }
        params.push(("sr", request.resource.as_str().to_string()));
        params.push(("sp", request.permissions.clone()));
        params.push(("sig", signature));

        Ok(params
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&"))
    }

    /// Append the signature parameters to `uri`
    pub fn signed_uri(&self, uri: &str, resource_path: &str, request: &SasRequest) -> StorageResult<String> {
        let token = self.token(resource_path, request)?;
        let separator = if uri.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", uri, separator, token))
    }
}

/// Builds access URLs for resources of one configured container
pub struct UrlGenerator<'a> {
    config: &'a AzureConfig,
    backend: &'a dyn BlobBackend,
}

impl<'a> UrlGenerator<'a> {
    pub fn new(config: &'a AzureConfig, backend: &'a dyn BlobBackend) -> Self {
        Self { config, backend }
    }

    /// Unsigned URL for `path` (`container/blob`)
    pub fn public_url(&self, path: &str) -> String {
        match &self.config.asset_host {
            Some(host) => format!("{}/{}", host, encode_path(path)),
            None => self.backend.build_uri(path),
        }
    }

    /// Read-only SAS URL for `path`, valid for `expires_in_secs` from now when given
    pub fn signed_url(&self, path: &str, expires_in_secs: Option<u64>) -> StorageResult<String> {
        let expiry = expires_in_secs.map(|secs| Utc::now() + Duration::seconds(clamp_secs(secs)));
        self.signed_url_until(path, expiry)
    }

    /// Read-only SAS URL for `path` expiring at an absolute instant
    pub fn signed_url_until(&self, path: &str, expiry: Option<DateTime<Utc>>) -> StorageResult<String> {
        let mut request = SasRequest::read_blob();
        if let Some(expiry) = expiry {
            request = request.with_expiry(expiry);
        }

        SharedAccessSignature::new(&self.config.account_name, &self.config.access_key)
            .signed_uri(&self.public_url(path), path, &request)
    }

    /// Signed URL for private containers, public URL otherwise. Without a
    /// requested expiry the configured default applies.
    pub async fn resolve(&self, path: &str, options: &UrlOptions) -> StorageResult<String> {
        match classify(self.backend, &self.config.container).await {
            ContainerAccess::Private => {
                let expiry = options.expires_in_secs.or(self.config.default_expiry);
                debug!("Signing URL for {} (expiry: {:?}s)", path, expiry);
                self.signed_url(path, expiry)
            }
            ContainerAccess::Public => Ok(self.public_url(path)),
        }
    }
}

fn clamp_secs(secs: u64) -> i64 {
    // keep `now + secs` inside chrono's range
    const MAX_SECS: u64 = 100 * 365 * 24 * 60 * 60;
    secs.min(MAX_SECS) as i64
}
