//! # Schema Migrations
//!
//! The stage log schema ships inside the binary.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Opening the Stage Log                              │
//! │                                                                         │
//! │  Startup                                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Check _sqlx_migrations table (created on first run)                   │
//! │       │                                                                 │
//! │       ├── 001_create_hvac.sql       hvac table + time index            │
//! │       └── 002_upload_watermark.sql  single-row watermark               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Run pending migrations in order, record each one                      │
//! │                                                                         │
//! │  A pre-existing hvac.db without _sqlx_migrations is adopted as-is:     │
//! │  every statement uses IF NOT EXISTS / INSERT OR IGNORE.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! New schema changes go in a new numbered file under `migrations/sqlite`.
//! Applied files are checksummed, so editing one breaks every installed
//! board.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded in `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (total, applied) = migration_status(pool).await?;
    debug!(total, applied, "Schema version check");

    MIGRATOR.run(pool).await?;

    if applied < total {
        info!(count = total - applied, "Schema migrations applied");
    }
    Ok(())
}

/// `(known, applied)` migration counts. A database that has never been
/// migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((MIGRATOR.migrations.len(), usize::try_from(applied).unwrap_or(0)))
}
