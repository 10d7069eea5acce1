//! # Upload Wire Format
//!
//! A batch is a compact JSON array of `[time, stage, temperature, humidity]`
//! tuples in ascending time order:
//!
//! ```text
//! [[1613064675,1,70.5,41.2],[1613065012,0,71.1,40.8]]
//! ```
//!
//! No whitespace, no field names. The receiving endpoint inserts each tuple
//! into its own `hvac` table column by column.

use crate::error::{CoreError, CoreResult};
use crate::types::{Stage, StageRecord};

/// Wire representation of one record.
type WireRow = (i64, u8, f64, f64);

/// Serializes records to the batch payload, preserving order.
///
/// ## Errors
/// Fails on non-finite temperature or humidity: JSON has no NaN/Infinity and
/// `serde_json` would silently emit `null`.
pub fn encode_batch(records: &[StageRecord]) -> CoreResult<String> {
    let rows = records
        .iter()
        .map(|r| {
            if !r.reading().is_finite() {
                return Err(CoreError::Wire(format!(
                    "non-finite reading in record at {}",
                    r.timestamp
                )));
            }
            Ok((r.timestamp, r.stage.value(), r.temperature, r.humidity))
        })
        .collect::<CoreResult<Vec<WireRow>>>()?;

    serde_json::to_string(&rows).map_err(|e| CoreError::Wire(e.to_string()))
}

/// Parses a batch payload back into records.
pub fn decode_batch(payload: &str) -> CoreResult<Vec<StageRecord>> {
    let rows: Vec<WireRow> =
        serde_json::from_str(payload).map_err(|e| CoreError::Wire(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(timestamp, stage, temperature, humidity)| StageRecord {
            timestamp,
            stage: Stage::new(stage),
            temperature,
            humidity,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;

    #[test]
    fn test_compact_encoding() {
        let records = vec![
            StageRecord::new(100, Stage::new(1), Reading::new(70.0, 40.0)),
            StageRecord::new(200, Stage::IDLE, Reading::UNAVAILABLE),
        ];
        let json = encode_batch(&records).unwrap();
        assert_eq!(json, "[[100,1,70.0,40.0],[200,0,-100.0,-100.0]]");
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(encode_batch(&[]).unwrap(), "[]");
        assert!(decode_batch("[]").unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let records = vec![
            StageRecord::new(1500, Stage::new(2), Reading::new(68.9, 52.25)),
            StageRecord::new(1100, Stage::new(3), Reading::new(71.24, 38.0)),
            StageRecord::new(1100, Stage::IDLE, Reading::UNAVAILABLE),
        ];
        let decoded = decode_batch(&encode_batch(&records).unwrap()).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_rejects_nan() {
        let records = vec![StageRecord::new(1, Stage::new(1), Reading::new(f64::NAN, 1.0))];
        assert!(matches!(encode_batch(&records), Err(CoreError::Wire(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(decode_batch(r#"[{"time":1}]"#).is_err());
        assert!(decode_batch("[[1,2,3]]").is_err());
    }
}
