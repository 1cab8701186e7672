//! Per-cell edit state machine.
//!
//! `Idle -> Editing` on begin, `Editing -> Pending | Idle` on confirm (depending on whether
//! the value changed), `Editing -> previous` on cancel. At most one cell is being edited per
//! session; beginning a new edit abandons the old one like a cancel would.

use crate::identity::{RowFingerprint, RowKey};
use crate::overlay::PendingChangeSet;
use crate::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Idle,
    Editing,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEdit {
    pub key: RowKey,
    /// Position on the page when the edit began; rows can move under a refresh
    pub row_index: usize,
    pub column: String,
    /// Fetched value of the cell when the edit began
    pub original: CellValue,
    pub buffer: String,
}

#[derive(Debug, Clone, Default)]
pub struct CellEditor {
    active: Option<ActiveEdit>,
}

impl CellEditor {
    pub fn new() -> Self { Self::default() }

    /// Start editing; returns the edit that was abandoned, if any.
    pub fn begin(&mut self, key: RowKey, row_index: usize, column: &str, original: CellValue, initial: String) -> Option<ActiveEdit> {
        self.active.replace(ActiveEdit { key, row_index, column: column.to_string(), original, buffer: initial })
    }

    pub fn active(&self) -> Option<&ActiveEdit> { self.active.as_ref() }

    pub fn is_editing(&self) -> bool { self.active.is_some() }

    /// Replace the buffer of the active edit. Returns false when nothing is being edited.
    pub fn set_buffer(&mut self, text: impl Into<String>) -> bool {
        match self.active.as_mut() {
            Some(a) => { a.buffer = text.into(); true }
            None => false,
        }
    }

    /// Take the active edit for confirmation. Put it back with `resume` if it is rejected.
    pub fn take(&mut self) -> Option<ActiveEdit> { self.active.take() }

    pub fn resume(&mut self, edit: ActiveEdit) { self.active = Some(edit); }

    /// Leave editing without touching the overlay; an earlier pending value stays.
    pub fn cancel(&mut self) -> Option<ActiveEdit> { self.active.take() }

    pub fn state_of(&self, overlay: &PendingChangeSet, fp: &RowFingerprint, column: &str) -> CellState {
        if self.active.as_ref().map(|a| &a.key.fingerprint == fp && a.column == column).unwrap_or(false) {
            return CellState::Editing;
        }
        if overlay.is_dirty(fp, column) { CellState::Pending } else { CellState::Idle }
    }
}
