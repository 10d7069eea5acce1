//! # Core Errors
//!
//! Storage and upload errors live in their own crates (`DbError`,
//! `SyncError`); this module covers what pure stage logic can get wrong.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A batch could not be turned into JSON or back.
    #[error("batch payload: {0}")]
    Wire(String),

    #[error("stage lines: {0}")]
    Validation(#[from] ValidationError),
}

/// Ways a configured stage map can be unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        value: i64,
    },

    /// Two lines share a GPIO pin.
    #[error("{field} '{value}' is used more than once")]
    Duplicate { field: String, value: String },

    /// Stages must be numbered 1, 2, 3... with no gaps.
    #[error("stage numbers must be contiguous from 1: expected {expected}, found {found}")]
    NotContiguous { expected: u8, found: u8 },
}

pub type CoreResult<T> = Result<T, CoreError>;
