//! # Upload Pipeline Errors
//!
//! ```text
//! config      InvalidConfig, InvalidUrl, ConfigLoadFailed
//! transport   ConnectionFailed, Timeout, HttpStatus, RetriesExhausted
//! pipeline    SerializationFailed, Watermark, Database, ArtifactWrite
//! lifecycle   SchedulerStopped
//! ```
//!
//! Only transport errors are ever retried, and only some of them
//! (see [`SyncError::is_retryable`]).

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid upload_url: {0}")]
    InvalidUrl(String),

    /// Config file unreadable or not valid TOML/JSON.
    #[error("cannot load config: {0}")]
    ConfigLoadFailed(String),

    /// DNS, refused connection, TLS handshake and the like.
    #[error("cannot reach upload endpoint: {0}")]
    ConnectionFailed(String),

    /// Seconds as configured; 0 when the limit is unknown.
    #[error("upload timed out after {0}s")]
    Timeout(u64),

    #[error("upload endpoint answered HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Every attempt failed; carries the last error.
    #[error("upload failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A record could not be encoded, e.g. a non-finite reading.
    #[error("cannot encode batch: {0}")]
    SerializationFailed(String),

    #[error("watermark: {0}")]
    Watermark(String),

    #[error("stage log: {0}")]
    Database(String),

    /// The `upload_file` copy of the payload could not be written.
    #[error("cannot write upload file: {0}")]
    ArtifactWrite(String),

    /// The scheduler task has already exited.
    #[error("upload scheduler is not running")]
    SchedulerStopped,
}

impl SyncError {
    /// Connection failures, timeouts, HTTP 5xx, 408 and 429.
    ///
    /// Other 4xx answers mean bad credentials or a wrong URL, which a
    /// retry will not fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::HttpStatus { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_) | SyncError::InvalidUrl(_) | SyncError::ConfigLoadFailed(_)
        )
    }
}

impl From<hvac_db::DbError> for SyncError {
    fn from(err: hvac_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<hvac_core::CoreError> for SyncError {
    fn from(err: hvac_core::CoreError) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

// Parse and read failures only come from loading the config file.
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            _ if err.is_timeout() => SyncError::Timeout(0),
            Some(status) => SyncError::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => SyncError::ConnectionFailed(err.to_string()),
        }
    }
}
