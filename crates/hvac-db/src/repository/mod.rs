//! # Repository Module
//!
//! Repositories wrap the pool and keep every SQL statement in one place.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  StageController ── db.records().append(&record)                       │
//! │                                                                         │
//! │  UploadScheduler ── db.records().query_between(watermark, now)         │
//! │                  └─ db.watermark().set(last)                           │
//! │                                                                         │
//! │  RecordRepository         WatermarkRepository                          │
//! │  ├── append               ├── get                                      │
//! │  ├── query_after          └── set                                      │
//! │  ├── query_between                                                     │
//! │  ├── count                                                             │
//! │  └── latest_timestamp                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod record;
pub mod watermark;
