//! # Batch Uploader
//!
//! Delivers one serialized batch to the remote endpoint and reports a single
//! outcome. Transient failures are retried here; the scheduler only ever
//! sees success or one final error.
//!
//! ## Attempt Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Upload Attempts (retries = 3)                        │
//! │                                                                         │
//! │   attempt 1 ──fail──► wait 2s ──► attempt 2 ──fail──► wait 4s ──►      │
//! │   attempt 3 ──fail──► RetriesExhausted                                  │
//! │                                                                         │
//! │   Retried:      connect errors, timeouts, HTTP 5xx / 408 / 429          │
//! │   Not retried:  other HTTP 4xx (returned immediately)                   │
//! │                                                                         │
//! │   Any 2xx ends the loop with success.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{MonitorConfig, UploadMethod};
use crate::error::{SyncError, SyncResult};

/// Multipart field name the receiving endpoint reads.
pub const MULTIPART_FIELD: &str = "file";

const JSON_MIME: &str = "application/json";

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

// =============================================================================
// Uploader Trait
// =============================================================================

/// Network delivery of a batch payload.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Sends `payload`, retrying internally. `Ok` means the endpoint
    /// confirmed receipt.
    async fn send(&self, payload: &str) -> SyncResult<()>;
}

// =============================================================================
// Settings
// =============================================================================

/// Everything the HTTP uploader needs, resolved from [`MonitorConfig`].
#[derive(Debug, Clone)]
pub struct UploaderSettings {
    pub url: Url,
    pub method: UploadMethod,
    /// `(user, password)`; `None` sends no Authorization header.
    pub auth: Option<(String, String)>,
    /// Total attempts, including the first.
    pub retries: u32,
    pub timeout: Duration,
    /// Batch is written here before upload; its file name names the
    /// multipart part.
    pub artifact: PathBuf,
    /// Wait after the first failure; doubles per attempt.
    pub backoff_base: Duration,
}

impl UploaderSettings {
    /// Resolves settings from the monitor config.
    pub fn from_config(config: &MonitorConfig) -> SyncResult<Self> {
        let url = Url::parse(&config.upload_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "upload_url must be http or https, got {}",
                config.upload_url
            )));
        }

        Ok(UploaderSettings {
            url,
            method: config.upload_method,
            auth: config
                .basic_auth()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            retries: config.upload_retries,
            timeout: config.upload_timeout(),
            artifact: config.upload_filename.clone(),
            backoff_base: Duration::from_secs(2),
        })
    }

    fn part_file_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.json".to_string())
    }
}

// =============================================================================
// HTTP Uploader
// =============================================================================

/// reqwest-backed [`Uploader`]: multipart POST or raw PUT.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    settings: UploaderSettings,
}

impl HttpUploader {
    /// Creates an uploader with its own client.
    pub fn new(settings: UploaderSettings) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self::with_client(settings, client))
    }

    /// Creates an uploader around an existing client.
    pub fn with_client(settings: UploaderSettings, client: Client) -> Self {
        HttpUploader { client, settings }
    }

    pub fn settings(&self) -> &UploaderSettings {
        &self.settings
    }

    /// Exponential schedule: base, 2×base, 4×base, ... with no jitter.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.backoff_base,
            current_interval: self.settings.backoff_base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(300),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    fn build_request(&self, payload: &str) -> SyncResult<RequestBuilder> {
        let url = self.settings.url.clone();

        let request = match self.settings.method {
            UploadMethod::Post => {
                let part = Part::text(payload.to_owned())
                    .file_name(self.settings.part_file_name())
                    .mime_str(JSON_MIME)
                    .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
                let form = Form::new().part(MULTIPART_FIELD, part);
                self.client.post(url).multipart(form)
            }
            UploadMethod::Put => self
                .client
                .put(url)
                .header(CONTENT_TYPE, JSON_MIME)
                .body(payload.to_owned()),
        };

        let request = request.timeout(self.settings.timeout);

        Ok(match &self.settings.auth {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        })
    }

    /// One request, no retry.
    async fn attempt(&self, payload: &str) -> SyncResult<u16> {
        let response = self
            .build_request(payload)?
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Err(SyncError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.settings.timeout.as_secs())
        } else {
            SyncError::from(err)
        }
    }

    /// Writes the batch to the artifact file.
    async fn write_artifact(&self, payload: &str) -> SyncResult<()> {
        tokio::fs::write(&self.settings.artifact, payload)
            .await
            .map_err(|e| {
                SyncError::ArtifactWrite(format!("{}: {}", self.settings.artifact.display(), e))
            })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn send(&self, payload: &str) -> SyncResult<()> {
        // The artifact is a local copy; the upload itself uses the in-memory payload
        if let Err(e) = self.write_artifact(payload).await {
            warn!(error = %e, "Could not write upload file");
        }

        let mut backoff = self.create_backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                attempt,
                method = %self.settings.method,
                url = %self.settings.url,
                bytes = payload.len(),
                "Upload attempt"
            );

            match self.attempt(payload).await {
                Ok(status) => {
                    info!(status, attempt, "Upload successful");
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "Upload rejected, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    if attempt >= self.settings.retries {
                        warn!(attempt, error = %e, "Upload failed, attempts exhausted");
                        return Err(SyncError::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let wait = backoff
                        .next_backoff()
                        .unwrap_or(self.settings.backoff_base);
                    warn!(attempt, ?wait, error = %e, "Upload attempt failed, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, StatusCode};
    use axum::routing::any;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Captured {
        method: Method,
        content_type: String,
        auth: Option<String>,
        body: String,
    }

    #[derive(Clone)]
    struct Endpoint {
        hits: Arc<AtomicUsize>,
        fail_first: usize,
        fail_status: StatusCode,
        seen: Arc<Mutex<Vec<Captured>>>,
    }

    impl Endpoint {
        fn failing(fail_first: usize, fail_status: StatusCode) -> Self {
            Endpoint {
                hits: Arc::new(AtomicUsize::new(0)),
                fail_first,
                fail_status,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn ok() -> Self {
            Self::failing(0, StatusCode::OK)
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        fn last(&self) -> Captured {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    async fn handler(
        State(ep): State<Endpoint>,
        method: Method,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        let n = ep.hits.fetch_add(1, Ordering::SeqCst);
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        ep.seen.lock().unwrap().push(Captured {
            method,
            content_type: header("content-type").unwrap_or_default(),
            auth: header("authorization"),
            body,
        });

        if n < ep.fail_first {
            ep.fail_status
        } else {
            StatusCode::OK
        }
    }

    async fn spawn_endpoint(ep: Endpoint) -> Url {
        let app = Router::new().route("/upload", any(handler)).with_state(ep);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/upload", addr)).unwrap()
    }

    fn settings(url: Url, method: UploadMethod, artifact: PathBuf) -> UploaderSettings {
        UploaderSettings {
            url,
            method,
            auth: None,
            retries: 3,
            timeout: Duration::from_secs(5),
            artifact,
            backoff_base: Duration::from_millis(10),
        }
    }

    fn uploader(settings: UploaderSettings) -> HttpUploader {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpUploader::with_client(settings, client)
    }

    const PAYLOAD: &str = "[[1100,1,70.0,40.0],[1200,0,71.5,39.0]]";

    #[tokio::test]
    async fn test_post_multipart_with_basic_auth() {
        let ep = Endpoint::ok();
        let url = spawn_endpoint(ep.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("hvac_upload.json");

        let mut s = settings(url, UploadMethod::Post, artifact.clone());
        s.auth = Some(("don".into(), "secret".into()));
        uploader(s).send(PAYLOAD).await.unwrap();

        assert_eq!(ep.hits(), 1);
        let got = ep.last();
        assert_eq!(got.method, Method::POST);
        assert!(got.content_type.starts_with("multipart/form-data"));
        assert_eq!(got.auth.as_deref(), Some("Basic ZG9uOnNlY3JldA=="));

        let body = got.body.to_lowercase();
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("filename=\"hvac_upload.json\""));
        assert!(body.contains("content-type: application/json"));
        assert!(got.body.contains(PAYLOAD));

        // Local copy of what was sent
        assert_eq!(std::fs::read_to_string(artifact).unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn test_put_raw_json_without_auth() {
        let ep = Endpoint::ok();
        let url = spawn_endpoint(ep.clone()).await;
        let dir = tempfile::tempdir().unwrap();

        let s = settings(url, UploadMethod::Put, dir.path().join("out.json"));
        uploader(s).send(PAYLOAD).await.unwrap();

        let got = ep.last();
        assert_eq!(got.method, Method::PUT);
        assert_eq!(got.content_type, "application/json");
        assert_eq!(got.body, PAYLOAD);
        assert!(got.auth.is_none());
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let ep = Endpoint::failing(2, StatusCode::BAD_GATEWAY);
        let url = spawn_endpoint(ep.clone()).await;
        let dir = tempfile::tempdir().unwrap();

        let s = settings(url, UploadMethod::Post, dir.path().join("u.json"));
        uploader(s).send(PAYLOAD).await.unwrap();

        assert_eq!(ep.hits(), 3);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let ep = Endpoint::failing(usize::MAX, StatusCode::SERVICE_UNAVAILABLE);
        let url = spawn_endpoint(ep.clone()).await;
        let dir = tempfile::tempdir().unwrap();

        let s = settings(url, UploadMethod::Put, dir.path().join("u.json"));
        let err = uploader(s).send(PAYLOAD).await.unwrap_err();

        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(ep.hits(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let ep = Endpoint::failing(usize::MAX, StatusCode::UNAUTHORIZED);
        let url = spawn_endpoint(ep.clone()).await;
        let dir = tempfile::tempdir().unwrap();

        let s = settings(url, UploadMethod::Post, dir.path().join("u.json"));
        let err = uploader(s).send(PAYLOAD).await.unwrap_err();

        assert!(matches!(err, SyncError::HttpStatus { status: 401, .. }));
        assert_eq!(ep.hits(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("http://{}/upload", addr)).unwrap();
        let s = settings(url, UploadMethod::Post, dir.path().join("u.json"));
        let err = uploader(s).send(PAYLOAD).await.unwrap_err();

        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
    }

    #[test]
    fn test_backoff_doubles() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(
            Url::parse("http://localhost/").unwrap(),
            UploadMethod::Post,
            dir.path().join("u.json"),
        );
        s.backoff_base = Duration::from_secs(2);

        let mut backoff = uploader(s).create_backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = MonitorConfig::default();
        config.upload_url = "https://example.com/uploadJson.php".into();
        config.upload_user = "don".into();
        config.upload_filename = PathBuf::from("/tmp/batch.json");

        let s = UploaderSettings::from_config(&config).unwrap();
        assert_eq!(s.retries, 3);
        assert_eq!(s.auth, Some(("don".into(), String::new())));
        assert_eq!(s.part_file_name(), "batch.json");
        assert_eq!(s.backoff_base, Duration::from_secs(2));

        config.upload_url = String::new();
        assert!(UploaderSettings::from_config(&config).is_err());

        config.upload_url = "ftp://example.com/upload".into();
        assert!(UploaderSettings::from_config(&config)
            .unwrap_err()
            .is_config_error());
    }
}
