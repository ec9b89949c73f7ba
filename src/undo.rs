//! Single-slot undo buffer.
//!
//! Holds the most recent add or delete so the operator can reverse a
//! fat-finger within a short window. Edits are not captured — they have no
//! simple reciprocal. Arming replaces whatever was in the slot (there is no
//! stack), and the slot expires on its deadline: a new arm carries a fresh
//! deadline, which is the single replaceable timer.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::LedgerRecord;

/// How long an armed action stays reversible.
pub const UNDO_WINDOW: Duration = Duration::from_secs(10);

/// The reversible mutation captured in the slot.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// A record was added; undo removes it (and restores voucher stock).
    Added(LedgerRecord),
    /// A record was deleted; undo re-inserts it at the head (and re-applies
    /// a voucher sale's stock effect).
    Deleted(LedgerRecord),
}

impl UndoAction {
    pub fn record(&self) -> &LedgerRecord {
        match self {
            UndoAction::Added(r) | UndoAction::Deleted(r) => r,
        }
    }
}

#[derive(Debug)]
struct Armed {
    action: UndoAction,
    deadline: Instant,
}

/// `Idle -> Armed(action) -> Idle` state machine.
#[derive(Debug)]
pub struct UndoBuffer {
    slot: Option<Armed>,
    window: Duration,
}

impl Default for UndoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoBuffer {
    pub fn new() -> Self {
        Self::with_window(UNDO_WINDOW)
    }

    /// Buffer with a custom expiry window (tests use milliseconds).
    pub fn with_window(window: Duration) -> Self {
        Self { slot: None, window }
    }

    /// Arm the buffer. Overwrites any pending action — only the single most
    /// recent add/delete is undoable.
    pub fn arm(&mut self, action: UndoAction) {
        self.slot = Some(Armed {
            action,
            deadline: Instant::now() + self.window,
        });
    }

    /// Whether an unexpired action is pending.
    pub fn is_armed(&mut self) -> bool {
        self.expire_stale();
        self.slot.is_some()
    }

    /// Take the pending action, transitioning back to `Idle`. Returns `None`
    /// when idle or when the window has elapsed.
    pub fn take(&mut self) -> Option<UndoAction> {
        self.expire_stale();
        self.slot.take().map(|armed| armed.action)
    }

    /// Drop any pending action without executing it.
    pub fn clear(&mut self) {
        self.slot = None;
    }

    fn expire_stale(&mut self) {
        if let Some(armed) = &self.slot {
            if Instant::now() > armed.deadline {
                debug!("undo window elapsed, clearing slot");
                self.slot = None;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
