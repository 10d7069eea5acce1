//! # Monitor Error Type
//!
//! Errors surfaced by the daemon's own components. Storage and pipeline
//! errors pass through unchanged so `is_fatal()` survives the conversion.
//!
//! ## Which Errors Stop the Daemon
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sensor read failure ──► retried, then sentinel values (never raised)  │
//! │  Unknown signal line ──► logged and ignored                             │
//! │  Record append failure ─► logged; the edge is lost, tracking continues  │
//! │  Storage corruption ───► MonitorError::Database (fatal) ──► exit(1)    │
//! │  Upload failure ───────► handled inside the scheduler                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hvac_db::DbError;
use hvac_sync::SyncError;
use thiserror::Error;

/// Result type alias for daemon operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Record store failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Upload pipeline or configuration failure.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// A signal line could not be read.
    #[error("Signal line {line}: {message}")]
    Signal { line: u32, message: String },

    /// One sensor sample attempt failed.
    #[error("Sensor read failed: {0}")]
    Sensor(String),

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

impl MonitorError {
    pub fn signal(line: u32, message: impl Into<String>) -> Self {
        MonitorError::Signal {
            line,
            message: message.into(),
        }
    }

    /// True if the daemon cannot keep running.
    pub fn is_fatal(&self) -> bool {
        match self {
            MonitorError::Database(e) => e.is_fatal(),
            MonitorError::Task(_) => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for MonitorError {
    fn from(err: tokio::task::JoinError) -> Self {
        MonitorError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MonitorError::from(DbError::Corrupt("malformed".into())).is_fatal());
        assert!(!MonitorError::from(DbError::QueryFailed("busy".into())).is_fatal());
        assert!(!MonitorError::Sensor("i/o".into()).is_fatal());
        assert!(!MonitorError::signal(17, "no such file").is_fatal());
    }

    #[test]
    fn test_signal_message() {
        let err = MonitorError::signal(22, "permission denied");
        assert_eq!(err.to_string(), "Signal line 22: permission denied");
    }
}
