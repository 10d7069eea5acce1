//! # Upload Watermark
//!
//! The timestamp of the last record included in a delivered batch. Read
//! before every upload, written only after the endpoint confirmed receipt.
//!
//! ## Backends
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WatermarkStore                                   │
//! │                                                                         │
//! │   DbWatermark                        FileWatermark                      │
//! │   ───────────                        ─────────────                      │
//! │   upload_watermark row (id = 1)      plain decimal text file            │
//! │   same file as the stage log         e.g. lastJsonWrite.txt             │
//! │                                                                         │
//! │                                      store():                           │
//! │                                        write  <file>.tmp                │
//! │                                        fsync  <file>.tmp                │
//! │                                        rename <file>.tmp → <file>       │
//! │                                                                         │
//! │                                      load():                            │
//! │                                        missing      → 0                 │
//! │                                        "1613064675.9" → 1613064675      │
//! │                                        unparseable  → 0 (resend all)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use hvac_db::Database;

use crate::error::{SyncError, SyncResult};

/// Durable single-value storage for the upload watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current watermark; 0 if never written.
    async fn load(&self) -> SyncResult<i64>;

    /// Persists `value`. Durable once this returns `Ok`.
    async fn store(&self, value: i64) -> SyncResult<()>;
}

// =============================================================================
// Database Backend
// =============================================================================

/// Watermark kept in the `upload_watermark` table.
#[derive(Debug, Clone)]
pub struct DbWatermark {
    db: Database,
}

impl DbWatermark {
    pub fn new(db: Database) -> Self {
        DbWatermark { db }
    }
}

#[async_trait]
impl WatermarkStore for DbWatermark {
    async fn load(&self) -> SyncResult<i64> {
        self.db
            .watermark()
            .get()
            .await
            .map_err(|e| SyncError::Watermark(e.to_string()))
    }

    async fn store(&self, value: i64) -> SyncResult<()> {
        self.db
            .watermark()
            .set(value)
            .await
            .map_err(|e| SyncError::Watermark(e.to_string()))
    }
}

// =============================================================================
// File Backend
// =============================================================================

/// Watermark kept in a text file holding a decimal timestamp.
#[derive(Debug, Clone)]
pub struct FileWatermark {
    path: PathBuf,
}

impl FileWatermark {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileWatermark { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Parses a stored watermark. Fractional seconds are truncated.
pub fn parse_watermark(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

#[async_trait]
impl WatermarkStore for FileWatermark {
    async fn load(&self) -> SyncResult<i64> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No watermark file, starting at 0");
                return Ok(0);
            }
            Err(e) => {
                return Err(SyncError::Watermark(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match parse_watermark(&text) {
            Some(value) => Ok(value),
            None => {
                warn!(
                    path = %self.path.display(),
                    contents = %text.trim(),
                    "Unreadable watermark, starting at 0"
                );
                Ok(0)
            }
        }
    }

    async fn store(&self, value: i64) -> SyncResult<()> {
        let tmp = self.temp_path();
        let io_err = |e: std::io::Error| SyncError::Watermark(format!("{}: {}", tmp.display(), e));

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(value.to_string().as_bytes())
            .await
            .map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SyncError::Watermark(format!("{}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), watermark = value, "Watermark file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_db::DbConfig;

    #[test]
    fn test_parse_watermark() {
        assert_eq!(parse_watermark("1500"), Some(1500));
        assert_eq!(parse_watermark(" 1613064675.123\n"), Some(1613064675));
        assert_eq!(parse_watermark("0"), Some(0));
        assert_eq!(parse_watermark("abc"), None);
        assert_eq!(parse_watermark("nan"), None);
        assert_eq!(parse_watermark(""), None);
    }

    #[tokio::test]
    async fn test_file_missing_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermark::new(dir.path().join("lastJsonWrite.txt"));
        assert_eq!(store.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_round_trip_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastJsonWrite.txt");
        let store = FileWatermark::new(&path);

        store.store(1500).await.unwrap();
        store.store(1700).await.unwrap();

        assert_eq!(store.load().await.unwrap(), 1700);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1700");
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_legacy_float_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastJsonWrite.txt");
        std::fs::write(&path, "1613064675.8812").unwrap();

        assert_eq!(FileWatermark::new(&path).load().await.unwrap(), 1613064675);
    }

    #[tokio::test]
    async fn test_corrupt_file_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastJsonWrite.txt");
        std::fs::write(&path, "garbage").unwrap();

        assert_eq!(FileWatermark::new(&path).load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_db_backend() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = DbWatermark::new(db);

        assert_eq!(store.load().await.unwrap(), 0);
        store.store(42).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 42);
    }
}
