//! # Domain Types
//!
//! Core domain types used throughout the HVAC monitor.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StageLine     │   │  StageRecord    │   │    Reading      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  index (pin)    │   │  timestamp      │   │  temperature °F │       │
//! │  │  stage (1..N)   │   │  stage          │   │  humidity %     │       │
//! │  └─────────────────┘   │  temperature    │   └─────────────────┘       │
//! │                        │  humidity       │                              │
//! │  ┌─────────────────┐   └─────────────────┘   ┌─────────────────┐       │
//! │  │   StageMap      │                         │     Edge        │       │
//! │  │  validated set  │                         │  Activated      │       │
//! │  │  of StageLines  │                         │  Deactivated    │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::validation::validate_stage_lines;
use crate::UNAVAILABLE;

// =============================================================================
// Stage
// =============================================================================

/// A discrete HVAC operating level. `0` is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stage(u8);

impl Stage {
    /// No stage active.
    pub const IDLE: Stage = Stage(0);

    #[inline]
    pub const fn new(value: u8) -> Self {
        Stage(value)
    }

    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.0 == 0
    }

    /// The stage directly below this one, saturating at idle.
    #[inline]
    pub const fn below(&self) -> Stage {
        Stage(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Edge
// =============================================================================

/// A transition of a digital signal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Inactive → active (relay closed).
    Activated,
    /// Active → inactive (relay opened).
    Deactivated,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Activated => write!(f, "activated"),
            Edge::Deactivated => write!(f, "deactivated"),
        }
    }
}

// =============================================================================
// Stage Lines
// =============================================================================

/// Maps a physical signal line to the stage it activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLine {
    /// Hardware line index (GPIO number on the reference board).
    pub index: u32,

    /// Stage number, 1..N.
    pub stage: u8,
}

impl StageLine {
    pub const fn new(index: u32, stage: u8) -> Self {
        StageLine { index, stage }
    }

    pub const fn stage(&self) -> Stage {
        Stage(self.stage)
    }
}

/// The fixed, validated set of stage lines for one controller.
///
/// ## Invariants
/// - At least one line
/// - Line indexes are unique
/// - Stage numbers are unique and contiguous starting at 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMap {
    lines: Vec<StageLine>,
}

impl StageMap {
    /// Validates and builds a stage map. Lines are kept ordered by stage.
    pub fn new(mut lines: Vec<StageLine>) -> Result<Self, ValidationError> {
        validate_stage_lines(&lines)?;
        lines.sort_by_key(|l| l.stage);
        Ok(StageMap { lines })
    }

    /// Looks up the line with the given hardware index.
    pub fn lookup(&self, index: u32) -> Option<&StageLine> {
        self.lines.iter().find(|l| l.index == index)
    }

    pub fn lines(&self) -> &[StageLine] {
        &self.lines
    }

    /// Highest configured stage.
    pub fn max_stage(&self) -> Stage {
        self.lines
            .last()
            .map(StageLine::stage)
            .unwrap_or(Stage::IDLE)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for StageMap {
    /// Three stages on GPIO 17, 22 and 27 (the reference wiring).
    fn default() -> Self {
        StageMap {
            lines: vec![
                StageLine::new(17, 1),
                StageLine::new(22, 2),
                StageLine::new(27, 3),
            ],
        }
    }
}

// =============================================================================
// Sensor Reading
// =============================================================================

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Fahrenheit.
    pub temperature: f64,

    /// Relative humidity, percent.
    pub humidity: f64,
}

impl Reading {
    /// Sentinel sample written when the sensor could not be read.
    pub const UNAVAILABLE: Reading = Reading {
        temperature: UNAVAILABLE,
        humidity: UNAVAILABLE,
    };

    pub const fn new(temperature: f64, humidity: f64) -> Self {
        Reading {
            temperature,
            humidity,
        }
    }

    /// Builds a reading from a Celsius temperature.
    pub fn from_celsius(celsius: f64, humidity: f64) -> Self {
        Reading {
            temperature: celsius_to_fahrenheit(celsius),
            humidity,
        }
    }

    /// True unless this is the sentinel.
    pub fn is_available(&self) -> bool {
        *self != Reading::UNAVAILABLE
    }

    /// True if both values are finite numbers (the wire format has no NaN).
    pub fn is_finite(&self) -> bool {
        self.temperature.is_finite() && self.humidity.is_finite()
    }
}

/// `°C × 9/5 + 32`
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

// =============================================================================
// Stage Record
// =============================================================================

/// One logged stage transition. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,

    /// Stage after the transition.
    pub stage: Stage,

    /// Degrees Fahrenheit, or [`UNAVAILABLE`].
    pub temperature: f64,

    /// Relative humidity percent, or [`UNAVAILABLE`].
    pub humidity: f64,
}

impl StageRecord {
    pub fn new(timestamp: i64, stage: Stage, reading: Reading) -> Self {
        StageRecord {
            timestamp,
            stage,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading::new(self.temperature, self.humidity)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
