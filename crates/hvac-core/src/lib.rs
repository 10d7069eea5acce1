//! # hvac-core: Pure Stage Logic for the HVAC Monitor
//!
//! This crate is the **heart** of the monitor. It contains the stage state
//! machine, the record types and the upload wire format as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HVAC Monitor Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Hardware (relay lines, sensor)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ edge events                            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    hvac-monitor (app)                           │   │
//! │  │        SignalWatcher, SensorReader, StageController             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hvac-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   stage   │  │   wire    │  │ validation│  │   │
//! │  │   │StageRecord│  │StageMachine│ │  encode   │  │ stage map │  │   │
//! │  │   │ StageLine │  │ transition│  │  decode   │  │  rules    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   deterministic: no clock, no files, no GPIO, no sockets       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             hvac-db / hvac-sync (storage, upload)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StageRecord, StageLine, Reading, etc.)
//! - [`stage`] - The explicit stage state machine
//! - [`wire`] - Upload batch encoding
//! - [`error`] - `CoreError` and stage map `ValidationError`
//! - [`validation`] - Stage map rules
//!
//! ## Example Usage
//!
//! ```rust
//! use hvac_core::{Edge, Stage, StageLine, StageMachine, StageMap};
//!
//! let map = StageMap::new(vec![StageLine::new(17, 1), StageLine::new(22, 2)]).unwrap();
//! let mut machine = StageMachine::new(map);
//!
//! let t = machine.apply(22, Edge::Activated).unwrap();
//! assert_eq!(t.to, Stage::new(2));
//!
//! let t = machine.apply(22, Edge::Deactivated).unwrap();
//! assert_eq!(t.to, Stage::new(1));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod stage;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use stage::{StageMachine, Transition};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Value recorded for temperature and humidity when the sensor could not be
/// read after all retries.
///
/// Out of range for both quantities, so consumers can filter it without a
/// separate flag column.
pub const UNAVAILABLE: f64 = -100.0;

/// Highest stage number a stage line may map to.
pub const MAX_STAGE: u8 = 9;
