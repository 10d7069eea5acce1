//! # Stage Log Storage
//!
//! Opens the SQLite file that holds the stage log and hands out repositories.
//!
//! ## Who Uses It
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Stage Log Handle                                │
//! │                                                                         │
//! │  main()                                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(config.database.path)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(..).await      open file, apply schema                  │
//! │       │                                                                 │
//! │       ├──► StageController task   db.records().append(..)              │
//! │       └──► UploadScheduler task   db.records().query_between(..)       │
//! │                                   db.watermark().set(..)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability
//! WAL journal with `synchronous = FULL`: a committed append survives power
//! loss, which matters on an SD-card board that gets unplugged.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::record::RecordRepository;
use crate::repository::watermark::WatermarkRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the stage log.
///
/// ## Example
/// ```rust
/// use hvac_db::DbConfig;
///
/// let config = DbConfig::new("/var/lib/hvac/hvac.db").max_connections(2);
/// assert_eq!(config.max_connections, 2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub path: PathBuf,

    /// Pool size. The controller writes, the scheduler and `dump` read,
    /// so 4 leaves headroom.
    pub max_connections: u32,

    /// Connections held open while idle.
    pub min_connections: u32,

    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,

    /// Idle connections older than this are dropped.
    pub idle_timeout: Duration,

    /// SQLite `busy_timeout` while another connection holds the write lock.
    pub busy_timeout: Duration,

    /// Apply embedded migrations after opening.
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed log at `path`. Missing files are created.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: path.into(),
            max_connections: 4,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory log for tests. Always a single connection, since
    /// every `:memory:` connection would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            ..DbConfig::new(IN_MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        // FULL: append is durable before it returns
        Ok(options
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the stage log. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the log (creating the file if needed) and brings the schema
    /// up to date.
    ///
    /// Any error here means the daemon cannot record anything, so callers
    /// treat it as fatal.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.path.display(), "Opening stage log");

        let options = config.connect_options()?;
        debug!(busy_timeout = ?config.busy_timeout, "SQLite options ready");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| match DbError::from(e) {
                corrupt @ DbError::Corrupt(_) => corrupt,
                other => DbError::ConnectionFailed(other.to_string()),
            })?;

        debug!(max_connections = config.max_connections, "Stage log pool open");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies any pending schema migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool, for ad-hoc queries in tools and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stage record log.
    ///
    /// ## Example
    /// ```rust,ignore
    /// db.records().append(&record).await?;
    /// ```
    pub fn records(&self) -> RecordRepository {
        RecordRepository::new(self.pool.clone())
    }

    /// Upload watermark row.
    pub fn watermark(&self) -> WatermarkRepository {
        WatermarkRepository::new(self.pool.clone())
    }

    /// Waits for open connections to finish, then closes the pool.
    /// Repositories obtained earlier fail from here on.
    pub async fn close(&self) {
        debug!("Closing stage log");
        self.pool.close().await;
    }

    /// `true` if a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
