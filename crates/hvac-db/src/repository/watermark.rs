//! # Upload Watermark Repository
//!
//! One row (`id = 1`) holding the timestamp of the last delivered record.
//! Migration 002 seeds it with 0.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Repository for the persisted upload watermark.
#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    pool: SqlitePool,
}

impl WatermarkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WatermarkRepository { pool }
    }

    /// Reads the current watermark.
    pub async fn get(&self) -> DbResult<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_time FROM upload_watermark WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        value.ok_or_else(|| DbError::not_found("upload_watermark", "1"))
    }

    /// Persists a new watermark value.
    pub async fn set(&self, value: i64) -> DbResult<()> {
        debug!(watermark = value, "Persisting upload watermark");

        sqlx::query(
            r#"
            INSERT INTO upload_watermark (id, last_time, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                last_time = excluded.last_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
