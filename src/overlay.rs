//! Pending change set: the edit overlay rendered on top of fetched rows.
//!
//! Fetched rows are never mutated. Every read path asks `resolve_display`, which returns the
//! pending value for a cell when there is one and the original otherwise.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::identity::{RowFingerprint, RowKey};
use crate::value::CellValue;

/// Uncommitted changes of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub key: RowKey,
    /// column -> new value (explicit `CellValue::Null` for SET NULL)
    pub changes: BTreeMap<String, CellValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The cell now holds a pending value
    Recorded,
    /// The value equals the original; any pending value for the cell was dropped
    Clean,
}

#[derive(Debug, Clone, Default)]
pub struct PendingChangeSet {
    rows: HashMap<RowFingerprint, PendingRow>,
}

impl PendingChangeSet {
    pub fn new() -> Self { Self::default() }

    /// Record a confirmed edit. An edit back to the original value removes the cell's entry
    /// instead of storing it, so there is never a dirty cell that changes nothing.
    pub fn record_edit(&mut self, key: &RowKey, column: &str, original: &CellValue, new_value: CellValue) -> EditOutcome {
        if new_value.equivalent(original) {
            self.remove_cell(&key.fingerprint, column);
            debug!(target: "pgbrowse::overlay", "edit matches original: row={} column='{}'", key.fingerprint, column);
            return EditOutcome::Clean;
        }
        self.store(key, column, new_value);
        EditOutcome::Recorded
    }

    /// Store an explicit NULL regardless of what the cell held before.
    pub fn set_null(&mut self, key: &RowKey, column: &str) {
        self.store(key, column, CellValue::Null);
    }

    fn store(&mut self, key: &RowKey, column: &str, value: CellValue) {
        debug!(target: "pgbrowse::overlay", "pending: row={} column='{}' value={:?}", key.fingerprint, column, value);
        let entry = self.rows.entry(key.fingerprint.clone()).or_insert_with(|| PendingRow {
            key: key.clone(),
            changes: BTreeMap::new(),
        });
        entry.changes.insert(column.to_string(), value);
    }

    fn remove_cell(&mut self, fp: &RowFingerprint, column: &str) {
        if let Some(row) = self.rows.get_mut(fp) {
            row.changes.remove(column);
            if row.changes.is_empty() { self.rows.remove(fp); }
        }
    }

    pub fn pending_value(&self, fp: &RowFingerprint, column: &str) -> Option<&CellValue> {
        self.rows.get(fp).and_then(|r| r.changes.get(column))
    }

    pub fn is_dirty(&self, fp: &RowFingerprint, column: &str) -> bool {
        self.pending_value(fp, column).is_some()
    }

    pub fn row_is_dirty(&self, fp: &RowFingerprint) -> bool { self.rows.contains_key(fp) }

    /// Value to show for a cell: pending if present, else `original`. Rows without a
    /// fingerprint (read-only relations) always show the original.
    pub fn resolve_display<'a>(&'a self, fp: Option<&RowFingerprint>, column: &str, original: &'a CellValue) -> &'a CellValue {
        fp.and_then(|f| self.pending_value(f, column)).unwrap_or(original)
    }

    pub fn discard_all(&mut self) {
        if !self.rows.is_empty() {
            debug!(target: "pgbrowse::overlay", "discarding {} dirty row(s)", self.rows.len());
        }
        self.rows.clear();
    }

    /// Number of pending cells.
    pub fn pending_count(&self) -> usize { self.rows.values().map(|r| r.changes.len()).sum() }

    pub fn dirty_row_count(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Dirty rows in unspecified order.
    pub fn rows(&self) -> impl Iterator<Item = &PendingRow> { self.rows.values() }

    pub fn remove_row(&mut self, fp: &RowFingerprint) -> Option<PendingRow> { self.rows.remove(fp) }

    /// Drop the cells of a row that were written by a successful update. Cells edited again
    /// while the write was in flight no longer match `sent` and stay pending.
    pub fn retire_applied(&mut self, fp: &RowFingerprint, sent: &BTreeMap<String, CellValue>) {
        if let Some(row) = self.rows.get_mut(fp) {
            row.changes.retain(|col, v| sent.get(col) != Some(v));
            if row.changes.is_empty() { self.rows.remove(fp); }
        }
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod overlay_tests;
