//! # Stage State Machine
//!
//! Turns per-line edge events into a single authoritative stage number.
//!
//! ## Transition Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Stage Transitions (last edge wins)                    │
//! │                                                                         │
//! │   Event                         Next stage                              │
//! │   ─────────────────────────     ─────────────────────────────────────   │
//! │   line(S) Activated             S                                       │
//! │   line(S) Deactivated           S - 1   (line(1) Deactivated → idle)    │
//! │   unmapped line, any edge       no transition                           │
//! │                                                                         │
//! │   The current stage never participates: overlapping lines are not      │
//! │   reconciled into a maximum of the active set, and a deactivation of   │
//! │   a line other than the current stage is still applied as given.       │
//! │                                                                         │
//! │   Example (3-stage unit, relay chatter on line 2):                      │
//! │                                                                         │
//! │   idle ──L1↑──► 1 ──L2↑──► 2 ──L1↓──► 0 ──L2↓──► 1                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{Edge, Stage, StageLine, StageMap};

/// Computes the stage that follows `edge` on `line`.
///
/// The current stage is deliberately not an input.
pub fn next_stage(line: &StageLine, edge: Edge) -> Stage {
    match edge {
        Edge::Activated => line.stage(),
        Edge::Deactivated => line.stage().below(),
    }
}

/// A stage change produced by [`StageMachine::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub line: StageLine,
    pub edge: Edge,
    pub from: Stage,
    pub to: Stage,
}

impl Transition {
    /// True if the stage number did not change (still recorded).
    pub fn is_repeat(&self) -> bool {
        self.from == self.to
    }
}

/// Owns the current stage and the fixed stage map.
///
/// Starts idle; the stage is not persisted across restarts.
#[derive(Debug, Clone)]
pub struct StageMachine {
    map: StageMap,
    current: Stage,
}

impl StageMachine {
    pub fn new(map: StageMap) -> Self {
        StageMachine {
            map,
            current: Stage::IDLE,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn map(&self) -> &StageMap {
        &self.map
    }

    /// Applies an edge on the line with hardware index `index`.
    ///
    /// ## Returns
    /// * `Some(Transition)` - the line is mapped; the stage was updated
    /// * `None` - unknown line; state untouched
    pub fn apply(&mut self, index: u32, edge: Edge) -> Option<Transition> {
        let line = *self.map.lookup(index)?;
        let from = self.current;
        let to = next_stage(&line, edge);
        self.current = to;

        Some(Transition {
            line,
            edge,
            from,
            to,
        })
    }
}
