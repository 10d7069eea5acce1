//! # Monitor
//!
//! Wires the watcher, controller and upload scheduler together and owns
//! their shutdown order.
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Monitor                                    │
//! │                                                                         │
//! │  ┌───────────────┐  EdgeEvent   ┌─────────────────┐                     │
//! │  │ SignalWatcher │ ───mpsc────► │ StageController │ ──► RecordRepository│
//! │  │   (task)      │              │     (task)      │           ▲         │
//! │  └───────────────┘              └─────────────────┘           │         │
//! │                                                               │         │
//! │  ┌─────────────────┐   query (watermark, now)                 │         │
//! │  │ UploadScheduler │ ─────────────────────────────────────────┘         │
//! │  │ (task, optional)│ ──► Uploader ──► WatermarkStore                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  SHUTDOWN ORDER:                                                       │
//! │  1. Stop the watcher (no new edges; the channel closes)                │
//! │  2. Controller drains queued edges, finishing any sensor sample        │
//! │  3. Scheduler stops after any in-flight upload                         │
//! │  4. Close the database                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use hvac_core::StageMap;
use hvac_db::Database;
use hvac_sync::{
    Clock, DbWatermark, FileWatermark, HttpUploader, MonitorConfig, SchedulerSettings,
    StampGate, SystemClock, UploadScheduler, Uploader, UploaderSettings, WatermarkStore,
};

use crate::controller::StageController;
use crate::error::{MonitorError, MonitorResult};
use crate::hardware::{SensorReader, SensorSource, SignalSource, SignalWatcher, EVENT_BUFFER};

/// The physical inputs.
pub struct Hardware {
    pub signals: Box<dyn SignalSource>,
    pub sensor: Arc<dyn SensorSource>,
}

/// Top-level daemon.
pub struct Monitor {
    config: Arc<MonitorConfig>,
    db: Database,
    clock: Arc<dyn Clock>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl Monitor {
    pub fn new(config: Arc<MonitorConfig>, db: Database) -> Self {
        Monitor {
            config,
            db,
            clock: Arc::new(SystemClock),
            uploader: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses `uploader` instead of building an HTTP uploader from config.
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    fn stage_map(&self) -> StageMap {
        self.config.stage_map().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid stage lines, using default map");
            StageMap::default()
        })
    }

    fn watermark_store(&self) -> Arc<dyn WatermarkStore> {
        match &self.config.watermark.file {
            Some(path) => {
                info!(path = %path.display(), "Watermark kept in file");
                Arc::new(FileWatermark::new(path.clone()))
            }
            None => Arc::new(DbWatermark::new(self.db.clone())),
        }
    }

    fn build_uploader(&self) -> MonitorResult<Option<Arc<dyn Uploader>>> {
        if let Some(uploader) = &self.uploader {
            return Ok(Some(Arc::clone(uploader)));
        }

        if !self.config.upload_enabled() {
            info!("No upload_url configured, uploads disabled");
            return Ok(None);
        }

        let uploader = UploaderSettings::from_config(&self.config).and_then(|settings| {
            info!(
                url = %settings.url,
                method = %settings.method,
                auth = settings.auth.is_some(),
                "Uploads enabled"
            );
            HttpUploader::new(settings)
        });

        match uploader {
            Ok(uploader) => Ok(Some(Arc::new(uploader))),
            Err(e) if e.is_config_error() => {
                warn!(error = %e, "Upload settings rejected, uploads disabled");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gate seeded above the persisted watermark, so a clock that went
    /// backwards across a restart cannot stamp records the cursor has passed.
    async fn stamp_gate(&self, watermark: Option<&Arc<dyn WatermarkStore>>) -> StampGate {
        let Some(store) = watermark else {
            return StampGate::default();
        };
        match store.load().await {
            Ok(w) => StampGate::above(w),
            Err(e) => {
                warn!(error = %e, "Could not read watermark, stamp floor unset");
                StampGate::default()
            }
        }
    }

    /// Runs until `shutdown` resolves or the record store fails fatally.
    pub async fn run<F>(self, hardware: Hardware, shutdown: F) -> MonitorResult<()>
    where
        F: Future<Output = ()>,
    {
        let config = Arc::clone(&self.config);
        let map = self.stage_map();
        let lines: Vec<u32> = map.lines().iter().map(|l| l.index).collect();

        let uploader = self.build_uploader()?;
        let watermark = uploader.as_ref().map(|_| self.watermark_store());
        let gate = self.stamp_gate(watermark.as_ref()).await;
        let gate_floor = gate.floor().await;
        debug!(floor = gate_floor, "Record stamp floor");

        let floor = self
            .db
            .records()
            .latest_timestamp()
            .await?
            .unwrap_or(i64::MIN);

        // Controller
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let sensor = SensorReader::new(
            hardware.sensor,
            config.sensor.retries,
            config.sensor.retry_wait(),
        );
        let controller = StageController::new(map, sensor, self.db.records(), Arc::clone(&self.clock))
            .with_last_timestamp(floor)
            .with_gate(gate.clone());
        let mut controller_task = tokio::spawn(controller.run(events_rx));

        // Watcher
        let (watcher, watcher_handle) = SignalWatcher::new(
            hardware.signals,
            lines,
            config.signals.poll_interval(),
            config.signals.debounce(),
            events_tx,
        );
        let watcher_task = tokio::spawn(watcher.run());

        // Scheduler
        let scheduler = match (uploader, watermark) {
            (Some(uploader), Some(watermark)) => {
                let (scheduler, handle) = UploadScheduler::new(
                    self.db.records(),
                    watermark,
                    uploader,
                    Arc::clone(&self.clock),
                    gate,
                    SchedulerSettings::from_config(&config),
                );
                Some((tokio::spawn(scheduler.run()), handle))
            }
            _ => None,
        };

        info!("Monitor running");

        tokio::pin!(shutdown);
        let early_exit = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                None
            }
            result = &mut controller_task => Some(result),
        };

        watcher_handle.shutdown().await;
        if let Err(e) = watcher_task.await {
            warn!(error = %e, "Signal watcher task failed");
        }

        let controller_result = match early_exit {
            Some(result) => result,
            None => controller_task.await,
        };
        let result = controller_result
            .map_err(MonitorError::from)
            .and_then(|r| r);

        if let Some((task, handle)) = scheduler {
            debug!(state = %handle.state(), "Stopping upload scheduler");
            if handle.shutdown().await.is_err() {
                debug!("Scheduler already stopped");
            }
            if let Err(e) = task.await {
                warn!(error = %e, "Upload scheduler task failed");
            }
        }

        self.db.close().await;

        match &result {
            Ok(()) => info!("Monitor stopped"),
            Err(e) => error!(error = %e, "Monitor stopped on error"),
        }
        result
    }
}
