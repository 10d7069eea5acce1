//! # Stage Record Repository
//!
//! The append-only `hvac` table. Records are never updated or deleted here.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Queries sort by (time, rowid).                                         │
//! │                                                                         │
//! │  rowid grows with every INSERT, so rows sharing a timestamp come back   │
//! │  in the order they were appended.                                       │
//! │                                                                         │
//! │   rowid  time   stage                                                   │
//! │   ─────  ────   ─────                                                   │
//! │     1    1100     1     ┐                                               │
//! │     2    1100     2     ┘ same second, insertion order kept             │
//! │     3    1200     0                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use hvac_core::{Stage, StageRecord};

/// Repository for the stage transition log.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Appends one record. Durable once this returns `Ok`.
    ///
    /// ## Arguments
    /// * `record` - The transition to persist
    pub async fn append(&self, record: &StageRecord) -> DbResult<()> {
        debug!(
            time = record.timestamp,
            stage = %record.stage,
            "Appending stage record"
        );

        sqlx::query(
            r#"
            INSERT INTO hvac (time, stage, temperature, humidity)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(record.timestamp)
        .bind(record.stage.value() as i64)
        .bind(record.temperature)
        .bind(record.humidity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All records with `time > after`, ascending.
    ///
    /// ## Returns
    /// Empty when `after` is at or past the latest timestamp.
    pub async fn query_after(&self, after: i64) -> DbResult<Vec<StageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT time, stage, temperature, humidity
            FROM hvac
            WHERE time > ?1
            ORDER BY time ASC, rowid ASC
            "#,
        )
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    /// Records with `after < time < before`, ascending.
    ///
    /// Both bounds are exclusive. Callers that advance a cursor to the last
    /// returned `time` must make sure nothing is later appended at or below
    /// it.
    pub async fn query_between(&self, after: i64, before: i64) -> DbResult<Vec<StageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT time, stage, temperature, humidity
            FROM hvac
            WHERE time > ?1 AND time < ?2
            ORDER BY time ASC, rowid ASC
            "#,
        )
        .bind(after)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    /// All records, ascending.
    pub async fn all(&self) -> DbResult<Vec<StageRecord>> {
        self.query_after(i64::MIN).await
    }

    /// Total number of records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hvac")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Timestamp of the newest record, if any.
    pub async fn latest_timestamp(&self) -> DbResult<Option<i64>> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(time) FROM hvac")
            .fetch_one(&self.pool)
            .await?;

        Ok(latest)
    }
}

fn map_row(row: &SqliteRow) -> DbResult<StageRecord> {
    let timestamp: i64 = row.try_get("time")?;
    let stage: i64 = row.try_get("stage")?;
    let stage = u8::try_from(stage)
        .map_err(|_| DbError::QueryFailed(format!("stage {stage} out of range at time {timestamp}")))?;

    Ok(StageRecord {
        timestamp,
        stage: Stage::new(stage),
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
    })
}
