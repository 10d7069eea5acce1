//! # Sensor Reader
//!
//! Temperature/humidity sampling with bounded retry. A sample that still
//! fails after the last attempt becomes the sentinel reading; it is never
//! an error for the caller.
//!
//! ```text
//! attempt 1 ──fail──► wait ──► attempt 2 ──fail──► ... ──► attempt N ──fail──►
//!     │                            │                            │   Reading::UNAVAILABLE
//!     └──ok──► Reading (°F, %RH)   └──ok──► Reading             └──ok──► Reading
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use hvac_core::Reading;

use crate::error::{MonitorError, MonitorResult};

/// IIO channel files, in milli-units.
const TEMP_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

// =============================================================================
// Sensor Sources
// =============================================================================

/// One blocking sample attempt.
pub trait SensorSource: Send + Sync {
    fn sample(&self) -> MonitorResult<Reading>;
}

/// Temperature/humidity sensor exposed by the Linux IIO subsystem
/// (e.g. an AM2320 or similar on I2C).
#[derive(Debug, Clone)]
pub struct IioSensor {
    device: PathBuf,
}

impl IioSensor {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        IioSensor {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    fn read_milli(&self, file: &str) -> MonitorResult<f64> {
        let path = self.device.join(file);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| MonitorError::Sensor(format!("{}: {}", path.display(), e)))?;
        let raw: f64 = text
            .trim()
            .parse()
            .map_err(|_| MonitorError::Sensor(format!("{}: bad value {:?}", path.display(), text.trim())))?;
        Ok(raw / 1000.0)
    }
}

impl SensorSource for IioSensor {
    fn sample(&self) -> MonitorResult<Reading> {
        let celsius = self.read_milli(TEMP_FILE)?;
        let humidity = self.read_milli(HUMIDITY_FILE)?;
        Ok(Reading::from_celsius(celsius, humidity))
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Retries a [`SensorSource`] and falls back to the sentinel.
#[derive(Clone)]
pub struct SensorReader {
    source: Arc<dyn SensorSource>,
    retries: u32,
    retry_wait: Duration,
}

impl SensorReader {
    /// ## Arguments
    /// * `retries` - Total attempts per sample (at least one is made)
    /// * `retry_wait` - Pause between attempts
    pub fn new(source: Arc<dyn SensorSource>, retries: u32, retry_wait: Duration) -> Self {
        SensorReader {
            source,
            retries: retries.max(1),
            retry_wait,
        }
    }

    async fn attempt(&self) -> MonitorResult<Reading> {
        let source = Arc::clone(&self.source);
        let reading = tokio::task::spawn_blocking(move || source.sample()).await??;

        if !reading.is_finite() {
            return Err(MonitorError::Sensor(format!(
                "non-finite sample {} / {}",
                reading.temperature, reading.humidity
            )));
        }
        Ok(reading)
    }

    /// Samples the sensor, retrying up to the configured attempts.
    ///
    /// ## Returns
    /// The first good sample, or [`Reading::UNAVAILABLE`].
    pub async fn read(&self) -> Reading {
        for attempt in 1..=self.retries {
            match self.attempt().await {
                Ok(reading) => {
                    debug!(
                        attempt,
                        temperature = reading.temperature,
                        humidity = reading.humidity,
                        "Sensor sampled"
                    );
                    return reading;
                }
                Err(e) => {
                    warn!(attempt, max = self.retries, error = %e, "Sensor read failed");
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_wait).await;
                    }
                }
            }
        }

        warn!(attempts = self.retries, "Sensor unavailable, recording sentinel values");
        Reading::UNAVAILABLE
    }
}
