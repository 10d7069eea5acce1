//! # hvac-db: Storage Layer for the HVAC Monitor
//!
//! The stage log and the upload watermark live in one SQLite file, accessed
//! asynchronously through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HVAC Monitor Data Flow                           │
//! │                                                                         │
//! │  StageController                 UploadScheduler                        │
//! │       │ append                        │ query_after / watermark         │
//! │       ▼                               ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     hvac-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ RecordRepo     │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ WatermarkRepo  │    │ 001, 002     │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  SQLite Database (hvac.db)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Database`] in [`pool`] is the entry point; it hands out a
//! [`RecordRepository`] for the `hvac` table and a [`WatermarkRepository`]
//! for the single watermark row.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hvac_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("hvac.db")).await?;
//!
//! db.records().append(&record).await?;
//! let pending = db.records().query_after(watermark).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::record::RecordRepository;
pub use repository::watermark::WatermarkRepository;
