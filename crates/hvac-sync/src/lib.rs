//! # hvac-sync: Upload Pipeline for the HVAC Monitor
//!
//! Ships the append-only stage log to a remote HTTP endpoint in batches,
//! delimited by a persisted watermark.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Upload Pipeline                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                UploadScheduler (background task)                 │  │
//! │  │                                                                  │  │
//! │  │  every tick_interval: due? → query → encode → send → advance    │  │
//! │  └──────────┬─────────────────────┬─────────────────────┬───────────┘  │
//! │             ▼                     ▼                     ▼              │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐   │
//! │  │RecordRepository│  │   HttpUploader     │  │  WatermarkStore    │   │
//! │  │  (hvac-db)     │  │                    │  │                    │   │
//! │  │ rows in        │  │ multipart POST or  │  │ DbWatermark or     │   │
//! │  │ (watermark,now)│  │ raw PUT, basic     │  │ FileWatermark      │   │
//! │  │                │  │ auth, 3 retries    │  │ (atomic rename)    │   │
//! │  └────────────────┘  └────────────────────┘  └────────────────────┘   │
//! │                                                                         │
//! │  MonitorConfig: TOML/JSON file + HVAC_* environment overrides          │
//! │  Clock: system wall clock, or a manual clock in tests                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`clock`] - Time source seam
//! - [`config`] - Monitor configuration (upload, database, sensor, signals)
//! - [`error`] - Sync error types
//! - [`gate`] - Orders record stamping against upload windows
//! - [`scheduler`] - Watermark-driven batch scheduler
//! - [`uploader`] - HTTP transport with retry and backoff
//! - [`watermark`] - Watermark persistence backends
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hvac_sync::{
//!     DbWatermark, HttpUploader, MonitorConfig, SchedulerSettings, StampGate,
//!     SystemClock, UploadScheduler, UploaderSettings,
//! };
//!
//! let config = MonitorConfig::load_or_default(None);
//! let uploader = HttpUploader::new(UploaderSettings::from_config(&config)?)?;
//!
//! // Shared with the StageController
//! let gate = StampGate::above(watermark);
//!
//! let (scheduler, handle) = UploadScheduler::new(
//!     db.records(),
//!     Arc::new(DbWatermark::new(db.clone())),
//!     Arc::new(uploader),
//!     Arc::new(SystemClock),
//!     gate.clone(),
//!     SchedulerSettings::from_config(&config),
//! );
//! tokio::spawn(scheduler.run());
//!
//! // Later
//! handle.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod scheduler;
pub mod uploader;
pub mod watermark;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DatabaseSettings, MonitorConfig, SensorSettings, SignalSettings, UploadMethod,
    WatermarkSettings,
};
pub use error::{SyncError, SyncResult};
pub use gate::{StampGate, StampGuard};
pub use scheduler::{
    SchedulerSettings, SchedulerState, TickOutcome, UploadScheduler, UploadSchedulerHandle,
};
pub use uploader::{HttpUploader, Uploader, UploaderSettings};
pub use watermark::{DbWatermark, FileWatermark, WatermarkStore};
