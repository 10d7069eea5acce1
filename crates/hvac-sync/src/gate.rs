//! # Stamp Gate
//!
//! Orders record stamping against upload window selection.
//!
//! ```text
//! StageController                       UploadScheduler
//! ───────────────                       ───────────────
//! lock                                  lock
//!   ts = max(clock, last ts, floor)       now = clock
//!   append(record @ ts)                   floor = max(floor, now)
//! unlock                                  query (watermark, now)
//!                                       unlock
//!                                       upload, store watermark < now
//! ```
//!
//! A record either commits before the window is selected (and is in it,
//! or stamped at/after `now`), or it is stamped at or after the window end.
//! Every watermark a tick can write is below its window end, so no stored
//! record ever sits at or under a persisted watermark.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared floor for new record timestamps. Clones share one lock.
#[derive(Debug, Clone)]
pub struct StampGate {
    floor: Arc<Mutex<i64>>,
}

impl Default for StampGate {
    fn default() -> Self {
        StampGate::new(i64::MIN)
    }
}

impl StampGate {
    /// Gate whose first stamp is at least `floor`.
    pub fn new(floor: i64) -> Self {
        StampGate {
            floor: Arc::new(Mutex::new(floor)),
        }
    }

    /// Gate seeded from a persisted watermark: new records go strictly above it.
    pub fn above(watermark: i64) -> Self {
        StampGate::new(watermark.saturating_add(1))
    }

    /// Holds the gate until the guard drops.
    pub async fn lock(&self) -> StampGuard<'_> {
        StampGuard {
            floor: self.floor.lock().await,
        }
    }

    /// Current floor, for logging.
    pub async fn floor(&self) -> i64 {
        *self.floor.lock().await
    }
}

/// Exclusive access to the stamp floor.
pub struct StampGuard<'a> {
    floor: MutexGuard<'a, i64>,
}

impl StampGuard<'_> {
    /// Timestamp for a record read at `now`, never below the floor.
    pub fn stamp(&self, now: i64) -> i64 {
        now.max(*self.floor)
    }

    /// Everything stamped from here on lands at or after `end`.
    pub fn close_window(&mut self, end: i64) {
        *self.floor = (*self.floor).max(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stamp_respects_floor() {
        let gate = StampGate::above(4000);
        let guard = gate.lock().await;
        assert_eq!(guard.stamp(3999), 4001);
        assert_eq!(guard.stamp(4500), 4500);
    }

    #[tokio::test]
    async fn test_window_end_only_moves_forward() {
        let gate = StampGate::default();
        {
            let mut guard = gate.lock().await;
            guard.close_window(5000);
            guard.close_window(4000);
        }
        assert_eq!(gate.floor().await, 5000);
        assert_eq!(gate.lock().await.stamp(4999), 5000);
    }

    #[tokio::test]
    async fn test_clones_share_floor() {
        let gate = StampGate::default();
        let other = gate.clone();
        gate.lock().await.close_window(100);
        assert_eq!(other.lock().await.stamp(0), 100);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let gate = StampGate::default();
        let guard = gate.lock().await;

        let other = gate.clone();
        let waiter = tokio::spawn(async move {
            other.lock().await.stamp(7)
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 7);
    }
}
