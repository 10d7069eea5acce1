//! # Stage Controller
//!
//! Owns the in-memory stage, turns each edge into exactly one
//! [`StageRecord`], and appends it to the record log.
//!
//! ## Per-Edge Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EdgeEvent { line, edge }                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StageMachine::apply ── unmapped line ──► warn, nothing written         │
//! │       │                                                                 │
//! │       ▼   Activated   → stage = line.stage                             │
//! │           Deactivated → stage = line.stage - 1                         │
//! │  SensorReader::read   (retries, sentinel on failure)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StampGate held:                                                        │
//! │    timestamp = max(clock.now(), previous timestamp, gate floor)         │
//! │    RecordRepository::append(StageRecord)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repeated stages are recorded too; there is no dedup.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use hvac_core::{Edge, Stage, StageMachine, StageMap, StageRecord};
use hvac_db::RecordRepository;
use hvac_sync::{Clock, StampGate};

use crate::error::MonitorResult;
use crate::hardware::{EdgeEvent, SensorReader};

pub struct StageController {
    machine: StageMachine,
    sensor: SensorReader,
    records: RecordRepository,
    clock: Arc<dyn Clock>,
    gate: StampGate,
    last_timestamp: i64,
}

impl StageController {
    pub fn new(
        map: StageMap,
        sensor: SensorReader,
        records: RecordRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        StageController {
            machine: StageMachine::new(map),
            sensor,
            records,
            clock,
            gate: StampGate::default(),
            last_timestamp: i64::MIN,
        }
    }

    /// Sets the timestamp floor, typically the newest stored record.
    pub fn with_last_timestamp(mut self, timestamp: i64) -> Self {
        self.last_timestamp = timestamp;
        self
    }

    /// Stamps through `gate`, shared with the upload scheduler.
    pub fn with_gate(mut self, gate: StampGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn current_stage(&self) -> Stage {
        self.machine.current()
    }

    pub async fn on_line_activated(&mut self, line: u32) -> MonitorResult<Option<StageRecord>> {
        self.handle(EdgeEvent {
            line,
            edge: Edge::Activated,
        })
        .await
    }

    pub async fn on_line_deactivated(&mut self, line: u32) -> MonitorResult<Option<StageRecord>> {
        self.handle(EdgeEvent {
            line,
            edge: Edge::Deactivated,
        })
        .await
    }

    /// Applies one edge and records the resulting stage.
    ///
    /// ## Returns
    /// * `Ok(Some(record))` - record appended
    /// * `Ok(None)` - line not in the stage map
    /// * `Err(_)` - append failed; the in-memory stage still moved
    pub async fn handle(&mut self, event: EdgeEvent) -> MonitorResult<Option<StageRecord>> {
        let Some(transition) = self.machine.apply(event.line, event.edge) else {
            warn!(line = event.line, edge = %event.edge, "Edge on unmapped line ignored");
            return Ok(None);
        };

        let reading = self.sensor.read().await;

        let record = {
            let gate = self.gate.lock().await;
            let timestamp = gate.stamp(self.clock.now()).max(self.last_timestamp);
            let record = StageRecord::new(timestamp, transition.to, reading);
            self.records.append(&record).await?;
            record
        };
        self.last_timestamp = record.timestamp;

        info!(
            line = event.line,
            edge = %event.edge,
            stage = record.stage.value(),
            temperature = record.temperature,
            humidity = record.humidity,
            timestamp = record.timestamp,
            repeat = transition.is_repeat(),
            "Stage recorded"
        );

        Ok(Some(record))
    }

    /// Processes edges until the channel closes.
    ///
    /// Events already queued are drained before returning. Only a fatal
    /// storage error stops processing early.
    pub async fn run(mut self, mut events: mpsc::Receiver<EdgeEvent>) -> MonitorResult<()> {
        let map = self.machine.map();
        info!(
            lines = map.len(),
            max_stage = map.max_stage().value(),
            "Stage controller started"
        );

        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(event).await {
                if e.is_fatal() {
                    error!(error = %e, "Record store unusable, stopping controller");
                    return Err(e);
                }
                error!(line = event.line, error = %e, "Failed to record stage change");
            }
        }

        info!("Stage controller stopped");
        Ok(())
    }
}
