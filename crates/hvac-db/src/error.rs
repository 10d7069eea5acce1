//! # Storage Errors
//!
//! ```text
//! sqlx::Error / MigrateError
//!       │
//!       ▼
//!   DbError ──► StageController   append failed: logged, edge dropped
//!           ──► UploadScheduler   SyncError::Database, batch retried next tick
//!           ──► startup           open or migration failure ends the process
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A row the schema guarantees is gone, e.g. the watermark row was
    /// deleted by hand.
    #[error("missing {entity} row ({key})")]
    NotFound { entity: String, key: String },

    /// The file could not be opened or created, or the pool was closed.
    #[error("cannot open stage log: {0}")]
    ConnectionFailed(String),

    /// Schema upgrade failed, usually an existing `hvac` table with an
    /// incompatible layout.
    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    /// SQLITE_CORRUPT or SQLITE_NOTADB.
    #[error("stage log is corrupt: {0}")]
    Corrupt(String),

    /// No connection became free within the acquire timeout.
    #[error("timed out waiting for a database connection")]
    PoolExhausted,

    #[error("database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// True for failures that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::Corrupt(_) | DbError::MigrationFailed(_) | DbError::ConnectionFailed(_)
        )
    }

    fn from_database_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("malformed") || lower.contains("not a database") {
            DbError::Corrupt(message.to_string())
        } else {
            DbError::QueryFailed(message.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("expected", "none returned"),
            sqlx::Error::Database(db_err) => DbError::from_database_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_categories() {
        assert!(DbError::Corrupt("x".into()).is_fatal());
        assert!(DbError::MigrationFailed("x".into()).is_fatal());
        assert!(DbError::ConnectionFailed("x".into()).is_fatal());
        assert!(!DbError::PoolExhausted.is_fatal());
        assert!(!DbError::QueryFailed("x".into()).is_fatal());
    }

    #[test]
    fn test_row_not_found_maps() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_corruption_messages_classified() {
        assert!(matches!(
            DbError::from_database_message("database disk image is malformed"),
            DbError::Corrupt(_)
        ));
        assert!(matches!(
            DbError::from_database_message("file is not a database"),
            DbError::Corrupt(_)
        ));
        assert!(matches!(
            DbError::from_database_message("database is locked"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_pool_closed_is_fatal() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(err.is_fatal());
    }
}
