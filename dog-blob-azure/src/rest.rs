//! Blob service REST transport.
//!
//! Every request is authorized with the `SharedKey` scheme: an HMAC-SHA256,
//! keyed by the account key, over the verb, standard headers, the sorted
//! `x-ms-*` headers and the canonicalized resource.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use tracing::debug;

use crate::backend::encode_path;
use crate::{
    AccountKey, AzureConfig, BlobBackend, BlobProperties, BlockId, ContainerAcl, FetchedBlob,
    PublicAccessLevel, StorageError, StorageResult,
};

/// `x-ms-version` sent with every request
pub const API_VERSION: &str = "2020-04-08";

/// One request before signing
#[derive(Debug, Clone)]
pub struct SignableRequest {
    pub method: Method,
    /// Encoded URI path, starting with `/`
    pub uri_path: String,
    /// Query parameters, unencoded
    pub query: Vec<(&'static str, String)>,
    /// `x-ms-*` headers
    pub ms_headers: Vec<(String, String)>,
    pub content_length: usize,
}

impl SignableRequest {
    fn new(method: Method, uri_path: String) -> Self {
        Self {
            method,
            uri_path,
            query: Vec::new(),
            ms_headers: Vec::new(),
            content_length: 0,
        }
    }

    fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.ms_headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// `SharedKey` string-to-sign for `account`
    pub fn string_to_sign(&self, account: &str) -> String {
        let content_length = if self.content_length == 0 {
            String::new()
        } else {
            self.content_length.to_string()
        };

        let mut out = String::new();
        // verb, encoding, language, length, md5, type, date, if-modified-since,
        // if-match, if-none-match, if-unmodified-since, range
        let standard: [&str; 12] = [
            self.method.as_str(),
            "",
            "",
            content_length.as_str(),
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ];
        for line in standard {
            out.push_str(line);
            out.push('\n');
        }

        let mut headers = self.ms_headers.clone();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in &headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value.trim());
            out.push('\n');
        }

        out.push('/');
        out.push_str(account);
        out.push_str(&self.uri_path);

        let mut query: Vec<(String, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        query.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in query {
            out.push('\n');
            out.push_str(&name);
            out.push(':');
            out.push_str(value);
        }

        out
    }
}

/// `BlobBackend` over the Blob service REST API
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    account_name: String,
    key: AccountKey,
    endpoint: String,
    /// Path component of `endpoint` (emulators serve under `/{account}`)
    endpoint_path: String,
}

impl RestBackend {
    /// Backend for the account and endpoint in `config`
    pub fn new(config: &AzureConfig) -> StorageResult<Self> {
        let client = Client::builder().build().map_err(StorageError::transport)?;
        Ok(Self::with_client(config, client))
    }

    /// Backend reusing an existing HTTP client
    pub fn with_client(config: &AzureConfig, client: Client) -> Self {
        let endpoint = config.blob_endpoint();
        let endpoint_path = endpoint
            .split_once("://")
            .and_then(|(_, rest)| rest.find('/').map(|i| rest[i..].to_string()))
            .unwrap_or_default();

        Self {
            client,
            account_name: config.account_name.clone(),
            key: config.access_key.clone(),
            endpoint,
            endpoint_path,
        }
    }

    fn resource(&self, container: &str, path: Option<&str>) -> (String, String) {
        let relative = match path {
            Some(path) => format!("{}/{}", container, path),
            None => container.to_string(),
        };
        let encoded = encode_path(&relative);
        (
            format!("{}/{}", self.endpoint, encoded),
            format!("{}/{}", self.endpoint_path, encoded),
        )
    }

    async fn send(&self, url: &str, mut request: SignableRequest, body: Bytes) -> StorageResult<Response> {
        request.content_length = body.len();
        request = request
            .header("x-ms-date", http_date(&Utc::now()))
            .header("x-ms-version", API_VERSION);

        let signature = self.key.sign(&request.string_to_sign(&self.account_name))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.ms_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StorageError::invalid(format!("bad header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StorageError::invalid(format!("bad header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        let authorization = HeaderValue::from_str(&format!("SharedKey {}:{}", self.account_name, signature))
            .map_err(|e| StorageError::invalid(format!("bad authorization header: {}", e)))?;
        headers.insert(reqwest::header::AUTHORIZATION, authorization);

        let query: Vec<String> = request
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        let url = if query.is_empty() {
            url.to_string()
        } else {
            format!("{}?{}", url, query.join("&"))
        };

        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url).headers(headers);
        if !body.is_empty() || request.method == Method::PUT {
            builder = builder.body(body);
        }
        builder.send().await.map_err(StorageError::transport)
    }

    async fn expect_success(response: Response) -> StorageResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.ok();
        Err(status_error(status, body))
    }

    fn properties(headers: &HeaderMap, body_len: usize) -> BlobProperties {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        BlobProperties {
            content_length: header("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(body_len as u64),
            content_type: header("content-type"),
            etag: header("etag"),
            last_modified: header("last-modified")
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[async_trait]
impl BlobBackend for RestBackend {
    async fn write_blob(
        &self,
        container: &str,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let (url, uri_path) = self.resource(container, Some(path));
        let mut request = SignableRequest::new(Method::PUT, uri_path).header("x-ms-blob-type", "BlockBlob");
        if let Some(content_type) = content_type {
            request = request.header("x-ms-blob-content-type", content_type);
        }

        Self::expect_success(self.send(&url, request, data).await?).await?;
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
        let (url, uri_path) = self.resource(container, Some(path));
        let request = SignableRequest::new(Method::PUT, uri_path)
            .query("comp", "block")
            .query("blockid", block_id.encoded());

        Self::expect_success(self.send(&url, request, data).await?).await?;
        Ok(())
    }

    async fn commit_blocks(
        &self,
        container: &str,
        path: &str,
        block_ids: &[BlockId],
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let (url, uri_path) = self.resource(container, Some(path));
        let mut request = SignableRequest::new(Method::PUT, uri_path).query("comp", "blocklist");
        if let Some(content_type) = content_type {
            request = request.header("x-ms-blob-content-type", content_type);
        }

        Self::expect_success(self.send(&url, request, block_list_xml(block_ids)).await?).await?;
        Ok(())
    }

    async fn read_blob(&self, container: &str, path: &str) -> StorageResult<Option<FetchedBlob>> {
        let (url, uri_path) = self.resource(container, Some(path));
        let response = self
            .send(&url, SignableRequest::new(Method::GET, uri_path), Bytes::new())
            .await?;
        if outcome(response.status()) == Outcome::Missing {
            return Ok(None);
        }

        let response = Self::expect_success(response).await?;
        let headers = response.headers().clone();
        let content = response.bytes().await.map_err(StorageError::transport)?;

        Ok(Some(FetchedBlob {
            properties: Self::properties(&headers, content.len()),
            content,
        }))
    }

    async fn delete_blob(&self, container: &str, path: &str) -> StorageResult<()> {
        let (url, uri_path) = self.resource(container, Some(path));
        let response = self
            .send(&url, SignableRequest::new(Method::DELETE, uri_path), Bytes::new())
            .await?;
        if outcome(response.status()) == Outcome::Missing {
            return Err(StorageError::not_found(format!("{}/{}", container, path)));
        }

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_container_acl(&self, container: &str) -> StorageResult<Option<ContainerAcl>> {
        let (url, uri_path) = self.resource(container, None);
        let request = SignableRequest::new(Method::GET, uri_path)
            .query("restype", "container")
            .query("comp", "acl");

        let response = Self::expect_success(self.send(&url, request, Bytes::new()).await?).await?;
        let public_access_level = response
            .headers()
            .get("x-ms-blob-public-access")
            .and_then(|v| v.to_str().ok())
            .and_then(PublicAccessLevel::parse);

        Ok(Some(ContainerAcl { public_access_level }))
    }

    fn build_uri(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, encode_path(path))
    }
}

/// How a response status maps onto a backend result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// 404; reads answer `None`, deletes answer `NotFound`
    Missing,
    Failed,
}

fn outcome(status: StatusCode) -> Outcome {
    if status.is_success() {
        Outcome::Success
    } else if status == StatusCode::NOT_FOUND {
        Outcome::Missing
    } else {
        Outcome::Failed
    }
}

/// Error for a failed response; the body is the message when there is one
fn status_error(status: StatusCode, body: Option<String>) -> StorageError {
    let message = body
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    StorageError::status(status.as_u16(), message)
}

/// RFC 1123 date for `x-ms-date`
fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `Put Block List` body naming every block as latest
pub fn block_list_xml(block_ids: &[BlockId]) -> Bytes {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(&id.encoded());
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    Bytes::from(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use chrono::TimeZone;

    fn config() -> AzureConfig {
        AzureConfig::new(
            "acct",
            &base64::engine::general_purpose::STANDARD.encode(b"secret-key"),
            "assets",
        )
        .unwrap()
    }

    #[test]
    fn test_string_to_sign_put_block() {
        let request = SignableRequest::new(Method::PUT, "/assets/a.bin".to_string())
            .query("comp", "block")
            .query("blockid", "YWJj")
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", "Sun, 18 Oct 2026 12:00:00 GMT");
        let request = SignableRequest {
            content_length: 3,
            ..request
        };

        let expected = "PUT\n\n\n3\n\n\n\n\n\n\n\n\n\
            x-ms-date:Sun, 18 Oct 2026 12:00:00 GMT\n\
            x-ms-version:2020-04-08\n\
            /acct/assets/a.bin\nblockid:YWJj\ncomp:block";
        assert_eq!(request.string_to_sign("acct"), expected);
    }

    #[test]
    fn test_string_to_sign_empty_body_has_blank_length() {
        let request = SignableRequest::new(Method::GET, "/assets".to_string())
            .query("restype", "container")
            .query("comp", "acl");
        let sts = request.string_to_sign("acct");
        assert!(sts.starts_with("GET\n\n\n\n"));
        assert!(sts.ends_with("/acct/assets\ncomp:acl\nrestype:container"));
    }

    #[test]
    fn test_emulator_endpoint_path_is_part_of_resource() {
        let config = config().with_blob_host("http://127.0.0.1:10000/devstoreaccount1");
        let backend = RestBackend::with_client(&config, Client::new());

        let (url, uri_path) = backend.resource("assets", Some("images/logo.png"));
        assert_eq!(url, "http://127.0.0.1:10000/devstoreaccount1/assets/images/logo.png");
        assert_eq!(uri_path, "/devstoreaccount1/assets/images/logo.png");
    }

    #[test]
    fn test_build_uri_uses_account_endpoint() {
        let backend = RestBackend::with_client(&config(), Client::new());
        assert_eq!(
            backend.build_uri("assets/images/logo.png"),
            "https://acct.blob.core.windows.net/assets/images/logo.png"
        );
        let (_, uri_path) = backend.resource("assets", None);
        assert_eq!(uri_path, "/assets");
    }

    #[test]
    fn test_block_list_xml_keeps_order() {
        let ids = vec![
            BlockId::from_string("bbbbbbbb".to_string()),
            BlockId::from_string("aaaaaaaa".to_string()),
        ];
        let xml = String::from_utf8(block_list_xml(&ids).to_vec()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>\
             <Latest>YmJiYmJiYmI=</Latest><Latest>YWFhYWFhYWE=</Latest></BlockList>"
        );
    }

    #[test]
    fn test_status_outcomes() {
        assert_eq!(outcome(StatusCode::OK), Outcome::Success);
        assert_eq!(outcome(StatusCode::CREATED), Outcome::Success);
        assert_eq!(outcome(StatusCode::ACCEPTED), Outcome::Success);
        assert_eq!(outcome(StatusCode::NOT_FOUND), Outcome::Missing);
        assert_eq!(outcome(StatusCode::FORBIDDEN), Outcome::Failed);
        assert_eq!(outcome(StatusCode::INTERNAL_SERVER_ERROR), Outcome::Failed);
    }

    #[test]
    fn test_status_error_message() {
        let err = status_error(StatusCode::FORBIDDEN, Some("<Error><Code>AuthenticationFailed</Code></Error>".into()));
        assert!(err.is_transport());
        assert!(matches!(
            &err,
            StorageError::Status { status: 403, message } if message.contains("AuthenticationFailed")
        ));

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, Some(String::new()));
        assert!(matches!(
            &err,
            StorageError::Status { status: 503, message } if message == "Service Unavailable"
        ));

        // a 404 on paths without a Missing mapping (container ACL) still reads as not found
        assert!(status_error(StatusCode::NOT_FOUND, None).is_not_found());
    }

    #[test]
    fn test_http_date() {
        let time = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 3).unwrap();
        assert_eq!(http_date(&time), "Sun, 18 Oct 2026 09:05:03 GMT");
    }
}
