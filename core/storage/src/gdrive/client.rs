//! Google Drive API client.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use drivetool_common::types::FOLDER_MIME_TYPE;
use drivetool_common::{Descriptor, Error, FolderId, Result};

use super::auth::Authorizer;
use super::config::DriveSettings;
use super::store::AuthorizationGrant;
use crate::provider::RemoteStorage;
use crate::retry::RetryExecutor;

/// Files above this size use a resumable upload session.
const SIMPLE_UPLOAD_LIMIT: u64 = 5 * 1024 * 1024;

/// Chunk size for resumable uploads (must be a multiple of 256KB).
const CHUNK_SIZE: usize = 8 * 256 * 1024;

/// Metadata fields requested for every returned object.
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink,parents";

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Link to open the object in a browser.
    #[serde(default)]
    pub web_view_link: Option<String>,
    /// Parent folder IDs.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl From<DriveFile> for Descriptor {
    fn from(file: DriveFile) -> Self {
        Descriptor {
            id: file.id,
            name: file.name,
            link: file.web_view_link,
            mime_type: file.mime_type,
        }
    }
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Google Drive API client.
///
/// Every request carries the active access token. A token already inside
/// the expiry window is renewed through the [`Authorizer`] before sending.
/// A 401 response triggers one forced refresh and a single retry; a second
/// 401 for the same call is reported as `Error::Authentication`.
pub struct DriveClient {
    http: Client,
    authorizer: Arc<Authorizer>,
    grant: RwLock<AuthorizationGrant>,
    api_base: String,
    upload_base: String,
    retry: RetryExecutor,
}

impl DriveClient {
    /// Obtain a grant and build a client around it.
    pub async fn connect(authorizer: Arc<Authorizer>, settings: &DriveSettings) -> Result<Self> {
        let grant = authorizer.obtain().await?;
        Self::new(grant, authorizer, settings)
    }

    /// Create a client starting from `grant`.
    pub fn new(
        grant: AuthorizationGrant,
        authorizer: Arc<Authorizer>,
        settings: &DriveSettings,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivetool/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            authorizer,
            grant: RwLock::new(grant),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            upload_base: settings.upload_base.trim_end_matches('/').to_string(),
            retry: RetryExecutor::new(settings.retry.clone()),
        })
    }

    /// List up to `page_size` files, a single page only.
    pub async fn list_files(&self, page_size: u32) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.api_base);
        let page_size = page_size.to_string();
        let fields = format!("files({})", FILE_FIELDS);

        let response = self
            .send_authorized("list files", |token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("pageSize", page_size.as_str()), ("fields", fields.as_str())])
            })
            .await?;

        let list: FileListResponse = handle_response(response).await?;
        Ok(list.files)
    }

    /// Create a folder.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<DriveFile> {
        let url = format!("{}/files", self.api_base);

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .send_authorized("create folder", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("fields", FILE_FIELDS)])
                    .json(&metadata)
            })
            .await?;

        handle_response(response).await
    }

    /// Upload a local file.
    ///
    /// The file is checked before any request is made.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    /// - `InvalidInput` if the path is not a regular file
    pub async fn upload_file(&self, local_path: &Path, parent_id: Option<&str>) -> Result<DriveFile> {
        let meta = match tokio::fs::metadata(local_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "File not found: {}",
                    local_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(Error::InvalidInput(format!(
                "Not a regular file: {}",
                local_path.display()
            )));
        }

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput("Upload path has no file name".to_string()))?;
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        info!("Uploading {} ({} bytes, {})", name, meta.len(), mime_type);

        if meta.len() <= SIMPLE_UPLOAD_LIMIT {
            let data = tokio::fs::read(local_path).await?;
            self.upload_simple(&name, parent_id, &mime_type, data).await
        } else {
            let file = tokio::fs::File::open(local_path).await?;
            self.upload_resumable(&name, parent_id, &mime_type, file, meta.len())
                .await
        }
    }

    /// Upload a small file (< 5MB) in one multipart request.
    pub async fn upload_simple(
        &self,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile> {
        let url = format!("{}/files", self.upload_base);
        let metadata_json = serde_json::to_string(&upload_metadata(name, parent_id, mime_type))
            .map_err(|e| Error::Serialization(format!("Failed to serialize metadata: {}", e)))?;

        // Build multipart request
        let boundary = "drivetool_boundary_7f3a";
        let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let content_type = format!("multipart/related; boundary={}", boundary);
        let response = self
            .send_authorized("upload file", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(header::CONTENT_TYPE, content_type.as_str())
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .body(body.clone())
            })
            .await?;

        handle_response(response).await
    }

    /// Upload a large file through a resumable session, chunk by chunk.
    pub async fn upload_resumable(
        &self,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        mut file: tokio::fs::File,
        total_size: u64,
    ) -> Result<DriveFile> {
        let upload_uri = self
            .start_resumable_upload(name, parent_id, mime_type, total_size)
            .await?;

        let mut bytes_uploaded = 0u64;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        while bytes_uploaded < total_size {
            let filled = read_full(&mut file, &mut buffer).await?;
            if filled == 0 {
                break;
            }

            let chunk = &buffer[..filled];
            let result = self
                .retry
                .execute(|| self.upload_chunk(&upload_uri, chunk, bytes_uploaded, total_size))
                .await?;
            bytes_uploaded += filled as u64;

            if let Some(file) = result {
                return Ok(file);
            }
        }

        Err(Error::Network("Upload did not complete".to_string()))
    }

    /// Start a resumable upload session and return its URI.
    async fn start_resumable_upload(
        &self,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        total_size: u64,
    ) -> Result<String> {
        let url = format!("{}/files", self.upload_base);
        let metadata = upload_metadata(name, parent_id, mime_type);
        let total = total_size.to_string();

        let response = self
            .send_authorized("start resumable upload", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
                    .header("X-Upload-Content-Type", mime_type)
                    .header("X-Upload-Content-Length", total.as_str())
                    .json(&metadata)
            })
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        // Extract upload URI from Location header
        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Network("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Network(format!("Invalid upload URI: {}", e)))?
            .to_string();

        debug!("Resumable upload session started");
        Ok(upload_uri)
    }

    /// Upload one chunk; `None` means the provider expects more.
    async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: &[u8],
        start_byte: u64,
        total_size: u64,
    ) -> Result<Option<DriveFile>> {
        let end_byte = start_byte + data.len() as u64 - 1;
        let content_range = format!("bytes {}-{}/{}", start_byte, end_byte, total_size);

        let response = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .header(header::CONTENT_RANGE, content_range)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload chunk: {}", e)))?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            handle_response(response).await.map(Some)
        } else if status == StatusCode::PERMANENT_REDIRECT {
            // 308 Resume Incomplete
            Ok(None)
        } else {
            Err(error_for_status(response).await)
        }
    }

    /// Send a request built by `build`, recovering once from a rejected token.
    async fn send_authorized<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let mut token = self.current_token().await?;
        let mut refreshed = false;

        loop {
            let response = self
                .retry
                .execute(|| send_checked(operation, build(&token)))
                .await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if refreshed {
                warn!("{}: access token rejected again after refresh", operation);
                return Err(Error::Authentication(format!(
                    "{}: access token rejected after refresh",
                    operation
                )));
            }

            info!("{}: access token rejected, refreshing", operation);
            let grant = self.authorizer.force_refresh(&token).await?;
            token = grant.access_token.clone();
            *self.grant.write().await = grant;
            refreshed = true;
        }
    }

    /// Access token to send, renewed first if it is no longer fresh.
    async fn current_token(&self) -> Result<String> {
        {
            let grant = self.grant.read().await;
            if grant.is_fresh() {
                return Ok(grant.access_token.clone());
            }
        }

        debug!("Access token inside expiry window, renewing before request");
        let grant = self.authorizer.obtain().await?;
        let token = grant.access_token.clone();
        *self.grant.write().await = grant;
        Ok(token)
    }
}

#[async_trait]
impl RemoteStorage for DriveClient {
    fn name(&self) -> &str {
        "gdrive"
    }

    async fn list(&self, page_size: u32) -> Result<Vec<Descriptor>> {
        let files = self.list_files(page_size).await?;
        Ok(files.into_iter().map(Descriptor::from).collect())
    }

    async fn upload(&self, local_path: &Path, parent: Option<&FolderId>) -> Result<Descriptor> {
        self.upload_file(local_path, parent.map(FolderId::as_str))
            .await
            .map(Descriptor::from)
    }

    async fn create_folder(&self, name: &str, parent: Option<&FolderId>) -> Result<Descriptor> {
        DriveClient::create_folder(self, name, parent.map(FolderId::as_str))
            .await
            .map(Descriptor::from)
    }
}

fn upload_metadata(name: &str, parent_id: Option<&str>, mime_type: &str) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "name": name,
        "mimeType": mime_type
    });
    if let Some(parent) = parent_id {
        metadata["parents"] = serde_json::json!([parent]);
    }
    metadata
}

/// Send a request, mapping transport failures and retryable statuses to
/// `Error::Network`.
async fn send_checked(operation: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::Network(format!("Failed to {}: {}", operation, e)))?;

    let status = response.status();
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        let message = provider_message(response).await;
        return Err(Error::Network(format!(
            "Failed to {}: {} - {}",
            operation, status, message
        )));
    }

    Ok(response)
}

/// Handle API response with error checking.
async fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    } else {
        Err(error_for_status(response).await)
    }
}

async fn error_for_status(response: Response) -> Error {
    let status = response.status();
    let message = provider_message(response).await;

    match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::UNAUTHORIZED => Error::Authentication("Invalid or expired token".to_string()),
        StatusCode::FORBIDDEN => Error::Authentication(format!("Access denied: {}", message)),
        s if s.is_client_error() => Error::InvalidInput(format!("{} - {}", s, message)),
        s => Error::Network(format!("API error: {} - {}", s, message)),
    }
}

/// Best-effort extraction of `error.message` from a provider error body.
async fn provider_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body)
}

/// Fill `buf` from `file`, returning fewer bytes only at end of file.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdrive::auth::tests::{grant, FakeProvider, SCOPE};
    use crate::gdrive::store::CredentialStore;
    use crate::retry::RetryConfig;
    use chrono::Duration;
    use std::sync::atomic::Ordering;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _temp: TempDir,
        server: MockServer,
        provider: Arc<FakeProvider>,
        client: DriveClient,
    }

    async fn fixture() -> Fixture {
        fixture_with(grant("valid", Duration::hours(1), Some("r"))).await
    }

    /// Client started from `initial`, which is also the stored grant.
    async fn fixture_with(initial: AuthorizationGrant) -> Fixture {
        let temp = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let provider = Arc::new(FakeProvider::new());
        let store = CredentialStore::new(temp.path().join("token.json"));
        store.save(&initial).await.unwrap();

        let authorizer = Arc::new(Authorizer::new(
            store,
            provider.clone(),
            vec![SCOPE.to_string()],
        ));
        let mut settings = DriveSettings::in_dir(temp.path()).with_api_root(&server.uri());
        settings.retry = RetryConfig::new(2)
            .with_initial_delay(StdDuration::from_millis(1))
            .with_jitter(false);

        let client = DriveClient::new(initial, authorizer, &settings).unwrap();
        Fixture {
            _temp: temp,
            server,
            provider,
            client,
        }
    }

    fn file_json(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": name,
            "mimeType": "application/pdf",
            "webViewLink": format!("https://drive.google.com/file/d/{}/view", id)
        })
    }

    #[test]
    fn test_drive_file_into_descriptor() {
        let file: DriveFile = serde_json::from_value(file_json("abc", "a.pdf")).unwrap();
        let descriptor = Descriptor::from(file);
        assert_eq!(descriptor.id, "abc");
        assert_eq!(
            descriptor.link.as_deref(),
            Some("https://drive.google.com/file/d/abc/view")
        );
    }

    #[tokio::test]
    async fn test_list_returns_one_page() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageSize", "3"))
            .and(header_eq("authorization", "Bearer valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [file_json("1", "a"), file_json("2", "b"), file_json("3", "c")],
                "nextPageToken": "more"
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let items = f.client.list(3).await.unwrap();

        assert_eq!(items.len(), 3);
        for item in items {
            assert!(!item.id.is_empty());
            assert!(!item.name.is_empty());
            assert!(item.link.is_some_and(|l| !l.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_create_folder_at_root() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .and(body_string_contains("\"name\":\"New_Backups\""))
            .and(body_string_contains(FOLDER_MIME_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "folder-1",
                "name": "New_Backups",
                "mimeType": FOLDER_MIME_TYPE
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let folder = RemoteStorage::create_folder(&f.client, "New_Backups", None)
            .await
            .unwrap();

        assert_eq!(folder.name, "New_Backups");
        assert!(!folder.id.is_empty());
        assert!(folder.is_folder());

        let requests = f.server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("parents").is_none());
    }

    #[tokio::test]
    async fn test_unknown_parent_is_not_found() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "File not found: nope."}
            })))
            .mount(&f.server)
            .await;

        let parent = FolderId::new("nope").unwrap();
        let err = RemoteStorage::create_folder(&f.client, "x", Some(&parent))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(ref m) if m.contains("nope")));
    }

    #[tokio::test]
    async fn test_upload_small_file() {
        let f = fixture().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("report.pdf");
        std::fs::write(&local, b"%PDF-1.4 test").unwrap();

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(body_string_contains("\"name\":\"report.pdf\""))
            .and(body_string_contains("Content-Type: application/pdf"))
            .and(body_string_contains("%PDF-1.4 test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("up-1", "report.pdf")))
            .expect(1)
            .mount(&f.server)
            .await;

        let uploaded = f.client.upload(&local, None).await.unwrap();

        assert_eq!(uploaded.id, "up-1");
        assert_eq!(uploaded.name, "report.pdf");
    }

    #[tokio::test]
    async fn test_upload_missing_file_makes_no_request() {
        let f = fixture().await;

        let err = f
            .client
            .upload(Path::new("/definitely/missing.pdf"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(f.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_large_file_resumable() {
        let f = fixture().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("big.bin");
        let size = SIMPLE_UPLOAD_LIMIT as usize + 10;
        std::fs::write(&local, vec![7u8; size]).unwrap();
        let session = format!("{}/session/abc", f.server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "resumable"))
            .and(header_eq("x-upload-content-length", size.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session.as_str()))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/session/abc"))
            .and(header_eq(
                "content-range",
                format!("bytes {}-{}/{}", 2 * CHUNK_SIZE, size - 1, size).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("big-1", "big.bin")))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(308))
            .expect(2)
            .mount(&f.server)
            .await;

        let uploaded = f.client.upload(&local, None).await.unwrap();
        assert_eq!(uploaded.id, "big-1");
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_once() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header_eq("authorization", "Bearer valid"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"files": [file_json("1", "a")]})),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let items = f.client.list(10).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(f.provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_rejection_is_terminal() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&f.server)
            .await;

        let err = f.client.list(10).await.unwrap_err();

        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(f.provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(f.server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_expiring_token_is_renewed_before_sending() {
        let f = fixture_with(grant("stale", Duration::minutes(2), Some("r"))).await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header_eq("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&f.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header_eq("authorization", "Bearer refreshed-0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
            .expect(2)
            .mount(&f.server)
            .await;

        f.client.list(10).await.unwrap();
        f.client.list(10).await.unwrap();

        assert_eq!(f.provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(f.server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_body_is_not_retried() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&f.server)
            .await;

        let err = f.client.list(10).await.unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_unparsable_final_chunk_is_not_resent() {
        let f = fixture().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("big.bin");
        let size = SIMPLE_UPLOAD_LIMIT as usize + 1;
        std::fs::write(&local, vec![1u8; size]).unwrap();
        let session = format!("{}/session/xyz", f.server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session.as_str()))
            .mount(&f.server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/session/xyz"))
            .and(header_eq(
                "content-range",
                format!("bytes {}-{}/{}", 2 * CHUNK_SIZE, size - 1, size).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/session/xyz"))
            .respond_with(ResponseTemplate::new(308))
            .mount(&f.server)
            .await;

        let err = f.client.upload(&local, None).await.unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_surfaced() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&f.server)
            .await;

        let err = f.client.list(10).await.unwrap_err();

        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_failure() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "Insufficient Permission"}
            })))
            .mount(&f.server)
            .await;

        let err = f.client.list(10).await.unwrap_err();

        assert!(matches!(err, Error::Authentication(ref m) if m.contains("Insufficient")));
        assert_eq!(f.provider.refreshes.load(Ordering::SeqCst), 0);
    }
}
