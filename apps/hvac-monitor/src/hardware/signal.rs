//! # Signal Watcher
//!
//! Polls the relay input lines, debounces them, and turns level changes
//! into edge events for the stage controller.
//!
//! ## Polling Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SignalWatcher                                   │
//! │                                                                         │
//! │  every poll_interval:                                                  │
//! │    for each configured line:                                            │
//! │      level = source.read_level(line)     /sys/class/gpio/gpioN/value   │
//! │      Debouncer: level must differ from the stable level for             │
//! │                 debounce_ms before it is accepted                       │
//! │          0 → 1  ──►  EdgeEvent { line, Activated }   ──► mpsc ──►      │
//! │          1 → 0  ──►  EdgeEvent { line, Deactivated } ──► controller    │
//! │                                                                         │
//! │  Levels read at startup become the stable state; no edges are emitted  │
//! │  for lines that are already active.                                     │
//! │                                                                         │
//! │  The channel is buffered, so slow sensor sampling in the controller    │
//! │  never stalls edge detection. Reads run on the blocking pool.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use hvac_core::Edge;

use crate::error::{MonitorError, MonitorResult};

/// Queue depth between the watcher and the controller.
pub const EVENT_BUFFER: usize = 1024;

/// One debounced transition on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub line: u32,
    pub edge: Edge,
}

// =============================================================================
// Signal Sources
// =============================================================================

/// Reads the current level of a digital input line.
///
/// Reads may block; the watcher calls them from `spawn_blocking`.
pub trait SignalSource: Send {
    /// `true` when the line is active (relay closed).
    fn read_level(&mut self, line: u32) -> MonitorResult<bool>;
}

/// Lines exposed through the sysfs GPIO interface.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SysfsGpio { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{}", line))
    }

    /// Exports `line` if needed and sets it as an input.
    pub fn export(&self, line: u32) -> MonitorResult<()> {
        let dir = self.line_dir(line);
        if !dir.exists() {
            std::fs::write(self.root.join("export"), line.to_string())
                .map_err(|e| MonitorError::signal(line, format!("export failed: {}", e)))?;
            debug!(line, "GPIO line exported");
        }

        let direction = dir.join("direction");
        if direction.exists() {
            std::fs::write(&direction, "in")
                .map_err(|e| MonitorError::signal(line, format!("set direction failed: {}", e)))?;
        }

        Ok(())
    }
}

impl SignalSource for SysfsGpio {
    fn read_level(&mut self, line: u32) -> MonitorResult<bool> {
        let path = self.line_dir(line).join("value");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| MonitorError::signal(line, format!("{}: {}", path.display(), e)))?;

        match text.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(MonitorError::signal(
                line,
                format!("unexpected value {:?}", other),
            )),
        }
    }
}

/// Line levels held in memory; clones share state. Unset lines read low.
#[derive(Debug, Clone, Default)]
pub struct ManualSignals {
    levels: Arc<Mutex<HashMap<u32, bool>>>,
}

impl ManualSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, line: u32, active: bool) {
        if let Ok(mut levels) = self.levels.lock() {
            levels.insert(line, active);
        }
    }
}

impl SignalSource for ManualSignals {
    fn read_level(&mut self, line: u32) -> MonitorResult<bool> {
        self.levels
            .lock()
            .map(|levels| levels.get(&line).copied().unwrap_or(false))
            .map_err(|_| MonitorError::signal(line, "level table poisoned"))
    }
}

// =============================================================================
// Debouncer
// =============================================================================

/// Accepts a new level only after it has held for `hold`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable: bool,
    pending: Option<(bool, Instant)>,
    hold: Duration,
}

impl Debouncer {
    pub fn new(initial: bool, hold: Duration) -> Self {
        Debouncer {
            stable: initial,
            pending: None,
            hold,
        }
    }

    pub fn level(&self) -> bool {
        self.stable
    }

    /// Feeds one sample taken at `now`.
    ///
    /// ## Returns
    /// The edge, once a changed level has held long enough.
    pub fn update(&mut self, level: bool, now: Instant) -> Option<Edge> {
        if level == self.stable {
            self.pending = None;
            return None;
        }

        let since = match self.pending {
            Some((pending, since)) if pending == level => since,
            _ => {
                self.pending = Some((level, now));
                now
            }
        };

        if now.duration_since(since) < self.hold {
            return None;
        }

        self.stable = level;
        self.pending = None;
        Some(if level {
            Edge::Activated
        } else {
            Edge::Deactivated
        })
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Handle for stopping a running watcher.
#[derive(Clone)]
pub struct SignalWatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SignalWatcherHandle {
    /// Stops polling. The event channel closes once the watcher exits.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

struct WatchedLine {
    line: u32,
    debouncer: Debouncer,
    failing: bool,
}

/// Polls a [`SignalSource`] and emits [`EdgeEvent`]s.
pub struct SignalWatcher {
    source: Arc<Mutex<Box<dyn SignalSource>>>,
    lines: Vec<u32>,
    poll_interval: Duration,
    debounce: Duration,
    events_tx: mpsc::Sender<EdgeEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SignalWatcher {
    pub fn new(
        source: Box<dyn SignalSource>,
        lines: Vec<u32>,
        poll_interval: Duration,
        debounce: Duration,
        events_tx: mpsc::Sender<EdgeEvent>,
    ) -> (Self, SignalWatcherHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let watcher = SignalWatcher {
            source: Arc::new(Mutex::new(source)),
            lines,
            poll_interval,
            debounce,
            events_tx,
            shutdown_rx,
        };

        (watcher, SignalWatcherHandle { shutdown_tx })
    }

    /// Runs the polling loop until shutdown or until the receiver goes away.
    pub async fn run(mut self) {
        let mut watched = Vec::with_capacity(self.lines.len());
        for (&line, level) in self.lines.iter().zip(self.sample().await) {
            let initial = match level {
                Ok(level) => level,
                Err(e) => {
                    warn!(line, error = %e, "Cannot read line at startup, assuming inactive");
                    false
                }
            };
            debug!(line, active = initial, "Watching line");
            watched.push(WatchedLine {
                line,
                debouncer: Debouncer::new(initial, self.debounce),
                failing: false,
            });
        }

        info!(
            lines = ?self.lines,
            poll_ms = self.poll_interval.as_millis() as u64,
            debounce_ms = self.debounce.as_millis() as u64,
            "Signal watcher started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.poll(&mut watched).await {
                        warn!("Edge receiver closed, stopping watcher");
                        break;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Signal watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Reads every configured line once, off the async runtime.
    async fn sample(&self) -> Vec<MonitorResult<bool>> {
        let source = Arc::clone(&self.source);
        let lines = self.lines.clone();

        let sampled = tokio::task::spawn_blocking(move || {
            let mut source = source
                .lock()
                .map_err(|_| "signal source poisoned".to_string())?;
            Ok::<_, String>(
                lines
                    .iter()
                    .map(|&line| source.read_level(line))
                    .collect::<Vec<_>>(),
            )
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);

        match sampled {
            Ok(levels) => levels,
            Err(message) => self
                .lines
                .iter()
                .map(|&line| Err(MonitorError::signal(line, message.clone())))
                .collect(),
        }
    }

    /// Samples every line once. Returns `false` if events can no longer be delivered.
    async fn poll(&mut self, watched: &mut [WatchedLine]) -> bool {
        let levels = self.sample().await;
        let now = Instant::now();

        for (w, level) in watched.iter_mut().zip(levels) {
            let level = match level {
                Ok(level) => {
                    if w.failing {
                        info!(line = w.line, "Line readable again");
                        w.failing = false;
                    }
                    level
                }
                Err(e) => {
                    if !w.failing {
                        warn!(line = w.line, error = %e, "Line read failed");
                        w.failing = true;
                    }
                    continue;
                }
            };

            if let Some(edge) = w.debouncer.update(level, now) {
                debug!(line = w.line, %edge, "Edge detected");
                let event = EdgeEvent { line: w.line, edge };
                if self.events_tx.send(event).await.is_err() {
                    return false;
                }
            }
        }

        true
    }
}
