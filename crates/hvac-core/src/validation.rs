//! # Validation Module
//!
//! Rules for the stage line configuration, checked once at startup.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stage Map Rules                                    │
//! │                                                                         │
//! │  ✅ valid                    ❌ invalid                                 │
//! │  ──────────────────────      ────────────────────────────────────       │
//! │  17→1, 22→2, 27→3            (empty)              Required              │
//! │  5→2, 6→1                    17→1, 17→2           Duplicate index       │
//! │                              17→1, 22→1           Duplicate stage       │
//! │                              17→1, 22→3           NotContiguous         │
//! │                              17→0                 OutOfRange            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::StageLine;
use crate::MAX_STAGE;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a set of stage lines.
///
/// ## Example
/// ```rust
/// use hvac_core::StageLine;
/// use hvac_core::validation::validate_stage_lines;
///
/// assert!(validate_stage_lines(&[StageLine::new(17, 1), StageLine::new(22, 2)]).is_ok());
/// assert!(validate_stage_lines(&[StageLine::new(17, 2)]).is_err());
/// ```
pub fn validate_stage_lines(lines: &[StageLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "stage lines".to_string(),
        });
    }

    let mut indexes = HashSet::new();
    let mut stages = HashSet::new();

    for line in lines {
        if line.stage == 0 || line.stage > MAX_STAGE {
            return Err(ValidationError::OutOfRange {
                field: "stage".to_string(),
                min: 1,
                max: MAX_STAGE as i64,
                value: line.stage as i64,
            });
        }
        if !indexes.insert(line.index) {
            return Err(ValidationError::Duplicate {
                field: "line index".to_string(),
                value: line.index.to_string(),
            });
        }
        if !stages.insert(line.stage) {
            return Err(ValidationError::Duplicate {
                field: "stage".to_string(),
                value: line.stage.to_string(),
            });
        }
    }

    let mut sorted: Vec<u8> = stages.into_iter().collect();
    sorted.sort_unstable();
    for (expected, found) in (1..).zip(sorted) {
        if found != expected {
            return Err(ValidationError::NotContiguous { expected, found });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_maps() {
        assert!(validate_stage_lines(&[StageLine::new(17, 1)]).is_ok());
        assert!(validate_stage_lines(&[
            StageLine::new(27, 3),
            StageLine::new(17, 1),
            StageLine::new(22, 2),
        ])
        .is_ok());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            validate_stage_lines(&[]),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = validate_stage_lines(&[StageLine::new(17, 1), StageLine::new(17, 2)]);
        assert!(matches!(err, Err(ValidationError::Duplicate { .. })));

        let err = validate_stage_lines(&[StageLine::new(17, 1), StageLine::new(22, 1)]);
        assert!(matches!(err, Err(ValidationError::Duplicate { .. })));
    }

    #[test]
    fn test_gap_rejected() {
        assert_eq!(
            validate_stage_lines(&[StageLine::new(17, 1), StageLine::new(22, 3)]),
            Err(ValidationError::NotContiguous {
                expected: 2,
                found: 3
            })
        );
        assert!(validate_stage_lines(&[StageLine::new(22, 2)]).is_err());
    }

    #[test]
    fn test_stage_zero_rejected() {
        assert!(matches!(
            validate_stage_lines(&[StageLine::new(17, 0)]),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
