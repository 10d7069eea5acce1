//! # Upload Scheduler
//!
//! Periodically ships every record newer than the watermark, then advances
//! the watermark. Delivery is at-least-once: the watermark only moves after
//! the uploader confirmed success, so a failed batch is resent whole.
//!
//! ## Tick Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scheduler Tick                                  │
//! │                                                                         │
//! │  IDLE                                                                   │
//! │    │  now - watermark <= upload_delay ──────────────► IDLE (NotDue)     │
//! │    ▼                                                                    │
//! │  UPLOADING                                                              │
//! │    │  gate: now = clock, floor = now, records = query (watermark, now)  │
//! │    │                                                                    │
//! │    ├── empty ──► watermark = now - 1, persist ──────► IDLE (Empty)      │
//! │    │                                                                    │
//! │    │  payload = encode_batch(records)                                   │
//! │    │  uploader.send(payload)                                            │
//! │    │                                                                    │
//! │    ├── failure ──► watermark untouched ─────────────► IDLE (Failed)     │
//! │    │                                                                    │
//! │    └── success ──► watermark = last.timestamp,                          │
//! │                    persist ─────────────────────────► IDLE (Uploaded)   │
//! │                                                                         │
//! │  The window ends before `now`, and every watermark written is below   │
//! │  it. The StampGate stamps later records at or after `now`, so none     │
//! │  can land at or under the watermark.                                   │
//! │                                                                         │
//! │  SINGLE FLIGHT: ticks run one at a time on one task; interval ticks    │
//! │  missed while UPLOADING are skipped.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use hvac_core::wire::encode_batch;
use hvac_db::RecordRepository;

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::{SyncError, SyncResult};
use crate::gate::StampGate;
use crate::uploader::Uploader;
use crate::watermark::WatermarkStore;

// =============================================================================
// State & Outcome
// =============================================================================

/// Scheduler state, observable through the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Uploading,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Uploading => write!(f, "uploading"),
        }
    }
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Upload delay has not passed since the watermark.
    NotDue { elapsed: i64 },

    /// Nothing to send; watermark moved forward without a request.
    Empty { watermark: i64 },

    /// Batch delivered and watermark persisted.
    Uploaded { count: usize, watermark: i64 },

    /// Batch (or the watermark read) failed; retried on a later tick.
    Failed(SyncError),
}

// =============================================================================
// Settings
// =============================================================================

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Seconds past the watermark before an upload is due.
    pub upload_delay: i64,

    /// Time between due-checks.
    pub tick_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        SchedulerSettings {
            upload_delay: i64::try_from(config.upload_delay).unwrap_or(i64::MAX),
            tick_interval: config.tick_interval(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct UploadSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<SchedulerState>,
}

impl UploadSchedulerHandle {
    /// Current state.
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_rx.clone()
    }

    /// Stops the scheduler after any in-flight upload completes.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::SchedulerStopped)
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Timer-driven batch uploader.
pub struct UploadScheduler {
    records: RecordRepository,
    watermark: Arc<dyn WatermarkStore>,
    uploader: Arc<dyn Uploader>,
    clock: Arc<dyn Clock>,
    gate: StampGate,
    settings: SchedulerSettings,

    state_tx: watch::Sender<SchedulerState>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl UploadScheduler {
    /// Creates a scheduler and returns its handle.
    ///
    /// `gate` must be the one the record writer stamps through.
    pub fn new(
        records: RecordRepository,
        watermark: Arc<dyn WatermarkStore>,
        uploader: Arc<dyn Uploader>,
        clock: Arc<dyn Clock>,
        gate: StampGate,
        settings: SchedulerSettings,
    ) -> (Self, UploadSchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

        let scheduler = UploadScheduler {
            records,
            watermark,
            uploader,
            clock,
            gate,
            settings,
            state_tx,
            shutdown_rx,
        };

        let handle = UploadSchedulerHandle {
            shutdown_tx,
            state_rx,
        };

        (scheduler, handle)
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Runs the scheduler loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            upload_delay = self.settings.upload_delay,
            tick_secs = self.settings.tick_interval.as_secs(),
            "Upload scheduler starting"
        );

        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick().await;
                    log_outcome(&outcome);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Upload scheduler shutting down");
                    break;
                }
            }
        }

        info!("Upload scheduler stopped");
    }

    /// Runs one due-check and, if due, one upload.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();

        let watermark = match self.watermark.load().await {
            Ok(w) => w,
            Err(e) => return TickOutcome::Failed(e),
        };

        let elapsed = now.saturating_sub(watermark);
        if elapsed <= self.settings.upload_delay {
            return TickOutcome::NotDue { elapsed };
        }

        self.state_tx.send_replace(SchedulerState::Uploading);
        let outcome = match self.upload(watermark).await {
            Ok(outcome) => outcome,
            Err(e) => TickOutcome::Failed(e),
        };
        self.state_tx.send_replace(SchedulerState::Idle);

        outcome
    }

    async fn upload(&self, watermark: i64) -> SyncResult<TickOutcome> {
        let (now, records) = {
            let mut gate = self.gate.lock().await;
            let now = self.clock.now();
            gate.close_window(now.max(watermark.saturating_add(1)));
            (now, self.records.query_between(watermark, now).await?)
        };

        if records.is_empty() {
            let advanced = watermark.max(now - 1);
            self.watermark.store(advanced).await?;
            return Ok(TickOutcome::Empty {
                watermark: advanced,
            });
        }

        let payload = encode_batch(&records)?;
        info!(
            count = records.len(),
            from = watermark,
            bytes = payload.len(),
            "Uploading batch"
        );

        self.uploader.send(&payload).await?;

        // Query order is ascending, so the last record is the newest
        let last = records
            .last()
            .map(|r| r.timestamp)
            .unwrap_or(watermark);

        if let Err(e) = self.watermark.store(last).await {
            // Delivered but not recorded: the batch goes out again next time
            error!(error = %e, watermark = last, "Failed to persist watermark after upload");
            return Err(e);
        }

        Ok(TickOutcome::Uploaded {
            count: records.len(),
            watermark: last,
        })
    }
}

fn log_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::NotDue { elapsed } => {
            debug!(elapsed, "Upload not due");
        }
        TickOutcome::Empty { watermark } => {
            info!(watermark, "No new records, watermark advanced");
        }
        TickOutcome::Uploaded { count, watermark } => {
            info!(count, watermark, "Batch uploaded");
        }
        TickOutcome::Failed(e) => {
            warn!(error = %e, "Upload failed, batch deferred");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::watermark::DbWatermark;
    use async_trait::async_trait;
    use hvac_core::wire::decode_batch;
    use hvac_core::{Reading, Stage, StageRecord};
    use hvac_db::{Database, DbConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Records payloads; fails the first `fail_first` calls.
    #[derive(Default)]
    struct FakeUploader {
        fail_first: AtomicUsize,
        payloads: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeUploader {
        fn failing(n: usize) -> Self {
            FakeUploader {
                fail_first: AtomicUsize::new(n),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_batch(&self) -> Vec<StageRecord> {
            let payloads = self.payloads.lock().unwrap();
            decode_batch(payloads.last().unwrap()).unwrap()
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn send(&self, payload: &str) -> SyncResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(SyncError::RetriesExhausted {
                    attempts: 3,
                    last_error: "HTTP 503".into(),
                });
            }
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    /// Blocks inside `send` until released.
    #[derive(Default)]
    struct GatedUploader {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for GatedUploader {
        async fn send(&self, _payload: &str) -> SyncResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(())
        }
    }

    struct Fixture {
        db: Database,
        clock: ManualClock,
        watermark: Arc<DbWatermark>,
        gate: StampGate,
    }

    async fn fixture(now: i64) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Fixture {
            watermark: Arc::new(DbWatermark::new(db.clone())),
            db,
            clock: ManualClock::new(now),
            gate: StampGate::default(),
        }
    }

    impl Fixture {
        async fn append(&self, ts: i64, stage: u8) {
            self.db
                .records()
                .append(&StageRecord::new(ts, Stage::new(stage), Reading::new(70.0, 40.0)))
                .await
                .unwrap();
        }

        /// Appends the way the controller does: stamped under the gate.
        async fn append_stamped(&self, stage: u8) -> i64 {
            let gate = self.gate.lock().await;
            let ts = gate.stamp(self.clock.now());
            self.append(ts, stage).await;
            ts
        }

        fn scheduler(&self, uploader: Arc<dyn Uploader>) -> (UploadScheduler, UploadSchedulerHandle) {
            self.scheduler_every(uploader, Duration::from_secs(3600))
        }

        fn scheduler_every(
            &self,
            uploader: Arc<dyn Uploader>,
            tick_interval: Duration,
        ) -> (UploadScheduler, UploadSchedulerHandle) {
            UploadScheduler::new(
                self.db.records(),
                self.watermark.clone(),
                uploader,
                Arc::new(self.clock.clone()),
                self.gate.clone(),
                SchedulerSettings {
                    upload_delay: 3600,
                    tick_interval,
                },
            )
        }

        async fn watermark(&self) -> i64 {
            self.watermark.load().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_not_due_within_delay() {
        let fx = fixture(1000).await;
        fx.watermark.store(1000).await.unwrap();
        fx.append(1100, 1).await;
        fx.clock.set(4600);

        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        // elapsed == delay is still not due
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::NotDue { elapsed: 3600 }
        ));
        assert_eq!(uploader.calls(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_due_batch_advances_to_last_record() {
        let fx = fixture(5000).await;
        fx.watermark.store(1000).await.unwrap();
        fx.append(900, 2).await;
        fx.append(1000, 2).await;
        fx.append(1100, 1).await;
        fx.append(1200, 2).await;
        fx.append(1500, 0).await;

        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded {
                count: 3,
                watermark: 1500
            }
        ));

        let times: Vec<i64> = uploader.last_batch().iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![1100, 1200, 1500]);
        assert_eq!(fx.watermark().await, 1500);
    }

    #[tokio::test]
    async fn test_empty_batch_advances_without_request() {
        let fx = fixture(10_000).await;

        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Empty { watermark: 9999 }
        ));
        assert_eq!(uploader.calls(), 0);
        assert_eq!(fx.watermark().await, 9999);

        // Next check an hour later is not due yet
        fx.clock.set(10_000 + 3599);
        assert!(matches!(scheduler.tick().await, TickOutcome::NotDue { .. }));
    }

    #[tokio::test]
    async fn test_failures_keep_watermark_then_full_range_sent() {
        let fx = fixture(5000).await;
        fx.watermark.store(1000).await.unwrap();
        fx.append(1100, 1).await;
        fx.append(1200, 2).await;

        let uploader = Arc::new(FakeUploader::failing(3));
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        for i in 0..3 {
            assert!(matches!(scheduler.tick().await, TickOutcome::Failed(_)));
            assert_eq!(fx.watermark().await, 1000);
            // More transitions while the endpoint is down
            fx.append(1300 + i, 3).await;
            fx.clock.advance(5);
        }

        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded {
                count: 5,
                watermark: 1302
            }
        ));
        let times: Vec<i64> = uploader.last_batch().iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![1100, 1200, 1300, 1301, 1302]);
        assert_eq!(uploader.calls(), 4);
    }

    #[tokio::test]
    async fn test_current_second_left_for_next_batch() {
        let fx = fixture(5000).await;
        fx.append(4000, 1).await;
        fx.append(5000, 2).await;

        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded {
                count: 1,
                watermark: 4000
            }
        ));

        // Appended later within second 5000
        fx.append(5000, 0).await;
        fx.clock.set(4000 + 3601);
        scheduler.tick().await;

        let stages: Vec<u8> = uploader.last_batch().iter().map(|r| r.stage.value()).collect();
        assert_eq!(stages, vec![2, 0]);
        assert_eq!(fx.watermark().await, 5000);
    }

    #[tokio::test]
    async fn test_single_flight_while_uploading() {
        let fx = fixture(5000).await;
        fx.append(1100, 1).await;

        let uploader = Arc::new(GatedUploader::default());
        let (scheduler, handle) = fx.scheduler_every(uploader.clone(), Duration::from_millis(5));
        let mut state = handle.subscribe_state();
        let task = tokio::spawn(scheduler.run());

        // First interval tick fires immediately and blocks in the uploader
        state
            .wait_for(|s| *s == SchedulerState::Uploading)
            .await
            .unwrap();

        // Many intervals pass while the upload hangs
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), SchedulerState::Uploading);

        uploader.gate.notify_one();
        state.wait_for(|s| *s == SchedulerState::Idle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        // Later ticks found nothing left to send
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert!(fx.watermark().await >= 1100);
    }

    #[tokio::test]
    async fn test_window_raises_stamp_floor() {
        let fx = fixture(10_000).await;
        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Empty { watermark: 9999 }
        ));
        assert_eq!(fx.gate.floor().await, 10_000);

        // A record read in the previous second commits after the window
        // was chosen; it lands above the watermark anyway
        fx.clock.set(9_999);
        let ts = fx.append_stamped(1).await;
        assert_eq!(ts, 10_000);

        fx.clock.set(20_000);
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded {
                count: 1,
                watermark: 10_000
            }
        ));
    }

    #[tokio::test]
    async fn test_clock_step_back_after_upload_not_lost() {
        let fx = fixture(4000).await;
        fx.watermark.store(0).await.unwrap();
        fx.append_stamped(1).await;

        let uploader = Arc::new(FakeUploader::default());
        let (mut scheduler, _handle) = fx.scheduler(uploader.clone());

        fx.clock.set(4001);
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded {
                count: 1,
                watermark: 4000
            }
        ));

        fx.clock.set(3999);
        assert!(fx.append_stamped(0).await > 4000);

        fx.clock.set(9000);
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Uploaded { count: 1, .. }
        ));
        assert_eq!(uploader.last_batch()[0].stage, Stage::IDLE);
    }

    #[test]
    fn test_settings_from_config() {
        let config = MonitorConfig::default();
        let settings = SchedulerSettings::from_config(&config);
        assert_eq!(settings.upload_delay, 3600);
        assert_eq!(settings.tick_interval, Duration::from_secs(5));
    }
}
