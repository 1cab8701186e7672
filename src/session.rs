//! Browse session: the state object behind one open table tab.
//!
//! A session owns the view, the pending change set, the selection, the new-row draft and
//! the cell editor for one relation. Local mutations are synchronous and always allowed;
//! remote work goes through the `Reconciler` with the state lock released, so edits keep
//! working while a save, delete, insert or fetch is in flight.
//!
//! Every page, sort or relation change clears local state and bumps the view epoch. A write
//! that finishes under an older epoch still reports its result but leaves the new context
//! alone and does not refetch; a fetch that finishes under an older epoch is dropped.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{ColumnKind, ColumnMeta, RelationRef, RelationSchema};
use crate::coercion::coerce_input;
use crate::config::{EXPORT_BATCH_ROWS, MAX_PAGE_SIZE};
use crate::draft::NewRowDraft;
use crate::editor::{CellEditor, CellState};
use crate::error::{AppError, AppResult};
use crate::export::{self, ExportFormat};
use crate::identity::RowKey;
use crate::overlay::{EditOutcome, PendingChangeSet};
use crate::reconcile::Reconciler;
use crate::remote::{ConnectionId, PageColumn, PageData, RemoteStore, SortSpec};
use crate::selection::SelectionSet;
use crate::value::CellValue;
use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyOp {
    Load,
    Save,
    Delete,
    Insert,
}

impl BusyOp {
    pub const ALL: [BusyOp; 4] = [BusyOp::Load, BusyOp::Save, BusyOp::Delete, BusyOp::Insert];

    fn slot(self) -> usize {
        match self { BusyOp::Load => 0, BusyOp::Save => 1, BusyOp::Delete => 2, BusyOp::Insert => 3 }
    }

    pub fn name(&self) -> &'static str {
        match self { BusyOp::Load => "load", BusyOp::Save => "save", BusyOp::Delete => "delete", BusyOp::Insert => "insert" }
    }
}

/// In-flight call counts per operation kind.
#[derive(Debug, Default)]
struct BusyFlags {
    in_flight: [u32; 4],
}

impl BusyFlags {
    fn is_busy(&self, op: BusyOp) -> bool { self.in_flight[op.slot()] > 0 }

    /// Claim an operation that must not overlap itself.
    fn try_begin(&mut self, op: BusyOp) -> AppResult<()> {
        if self.is_busy(op) {
            return Err(AppError::validation("operation_busy", format!("a {} is already in progress", op.name())));
        }
        self.in_flight[op.slot()] = 1;
        Ok(())
    }

    /// Count an overlapping call; true when the operation just became busy.
    fn begin(&mut self, op: BusyOp) -> bool {
        self.in_flight[op.slot()] += 1;
        self.in_flight[op.slot()] == 1
    }

    /// True when the operation just became idle.
    fn end(&mut self, op: BusyOp) -> bool {
        let n = &mut self.in_flight[op.slot()];
        *n = n.saturating_sub(1);
        *n == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PageLoaded { page: u64, rows: usize, total_rows: u64 },
    /// Non-blocking read failure; the previous page stays
    LoadFailed { error: AppError },
    /// Overlay, selection, draft and editor were cleared for a new page/sort/relation
    ContextReset { epoch: u64 },
    OverlayChanged { pending_count: usize, dirty_rows: usize },
    SelectionChanged { selected_count: usize },
    EditStarted { row_index: usize, column: String },
    EditEnded { row_index: usize, column: String },
    InsertFormChanged { open: bool },
    BusyChanged { op: BusyOp, busy: bool },
    SaveCompleted { applied: usize },
    RowsDeleted { requested: usize, deleted: u64 },
    RowInserted,
    WriteFailed { op: BusyOp, error: AppError },
    /// A write finished after the view moved on; its refetch was skipped
    StaleWriteCompleted { op: BusyOp, succeeded: bool },
}

pub type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub value: CellValue,
    pub pending: bool,
    pub editing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSnapshot {
    pub selected: bool,
    pub cells: Vec<CellSnapshot>,
}

/// Everything a renderer needs for one frame, already resolved through the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSnapshot {
    pub relation: RelationRef,
    pub columns: Vec<PageColumn>,
    pub rows: Vec<RowSnapshot>,
    pub page: u64,
    pub page_size: u64,
    pub page_count: u64,
    pub total_rows: u64,
    pub elapsed_ms: u64,
    pub sort: Option<SortSpec>,
    pub pending_count: usize,
    pub selected_count: usize,
    pub read_only: bool,
    pub insert_open: bool,
    pub busy: Vec<BusyOp>,
    pub last_error: Option<String>,
}

struct SessionState {
    conn: ConnectionId,
    schema: RelationSchema,
    view: ViewState,
    overlay: PendingChangeSet,
    selection: SelectionSet,
    draft: Option<NewRowDraft>,
    editor: CellEditor,
    busy: BusyFlags,
}

impl SessionState {
    fn reconciler(&self, store: &Arc<dyn RemoteStore>) -> Reconciler {
        Reconciler::new(store.clone(), self.conn.clone(), self.view.relation.clone())
    }

    fn is_read_only(&self) -> bool { self.schema.is_read_only() || self.view.keys().is_none() }

    fn read_only_error(&self) -> AppError {
        AppError::validation("read_only", format!("{} has no primary key; rows cannot be edited or deleted", self.view.relation))
    }

    /// Clear all per-context local state and move to a new epoch.
    fn clear_context(&mut self) -> u64 {
        self.overlay.discard_all();
        self.selection.clear();
        self.draft = None;
        self.editor.cancel();
        self.view.bump_epoch()
    }

    fn column_meta(&self, column: &str) -> AppResult<ColumnMeta> {
        self.schema
            .column(column)
            .cloned()
            .ok_or_else(|| AppError::not_found("no_column", format!("column '{}' does not exist in {}", column, self.view.relation)))
    }

    /// Key, metadata and fetched value of a cell that may be edited.
    fn editable_cell(&self, row_index: usize, column: &str) -> AppResult<(RowKey, ColumnMeta, CellValue)> {
        if self.is_read_only() {
            return Err(self.read_only_error());
        }
        let meta = self.column_meta(column)?;
        if meta.is_primary_key {
            return Err(AppError::validation("key_column", format!("primary-key column '{}' cannot be edited", column)));
        }
        let original = self.view.cell(row_index, column)?.clone();
        let key = self.view.key_of(row_index)?.ok_or_else(|| self.read_only_error())?;
        Ok((key, meta, original))
    }

    fn overlay_event(&self) -> SessionEvent {
        SessionEvent::OverlayChanged { pending_count: self.overlay.pending_count(), dirty_rows: self.overlay.dirty_row_count() }
    }

    fn selection_event(&self) -> SessionEvent {
        SessionEvent::SelectionChanged { selected_count: self.selection.len() }
    }
}

/// Cloneable handle to one tab's session state.
#[derive(Clone)]
pub struct BrowseSession {
    store: Arc<dyn RemoteStore>,
    state: Arc<Mutex<SessionState>>,
    observers: Arc<Mutex<Vec<(SubscriptionId, Observer)>>>,
    next_subscription: Arc<AtomicU64>,
}

impl std::fmt::Debug for BrowseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("BrowseSession")
            .field("relation", &st.view.relation)
            .field("page", &st.view.page)
            .field("epoch", &st.view.epoch)
            .field("pending", &st.overlay.pending_count())
            .finish()
    }
}

impl BrowseSession {
    /// A session that has not fetched anything yet.
    pub fn new(store: Arc<dyn RemoteStore>, conn: ConnectionId, relation: RelationRef, page_size: u64) -> Self {
        let state = SessionState {
            conn,
            schema: RelationSchema::default(),
            view: ViewState::new(relation, page_size.min(MAX_PAGE_SIZE)),
            overlay: PendingChangeSet::new(),
            selection: SelectionSet::new(),
            draft: None,
            editor: CellEditor::new(),
            busy: BusyFlags::default(),
        };
        Self {
            store,
            state: Arc::new(Mutex::new(state)),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Load column metadata, enum domains and the first page.
    pub async fn open(store: Arc<dyn RemoteStore>, conn: ConnectionId, relation: RelationRef, page_size: u64) -> AppResult<Self> {
        let session = Self::new(store, conn, relation, page_size);
        session.load(true, true).await?;
        info!(target: "pgbrowse::session", "opened {}", session.relation());
        Ok(session)
    }

    // ---- observers ----

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut obs = self.observers.lock();
        let before = obs.len();
        obs.retain(|(sid, _)| *sid != id);
        obs.len() != before
    }

    /// Observers run with no session lock held, so they may call back into the session.
    fn emit(&self, events: Vec<SessionEvent>) {
        if events.is_empty() { return; }
        let observers: Vec<Observer> = self.observers.lock().iter().map(|(_, o)| o.clone()).collect();
        for event in &events {
            for o in &observers {
                o(event);
            }
        }
    }

    // ---- queries ----

    pub fn relation(&self) -> RelationRef { self.state.lock().view.relation.clone() }

    pub fn connection(&self) -> ConnectionId { self.state.lock().conn.clone() }

    pub fn schema(&self) -> RelationSchema { self.state.lock().schema.clone() }

    pub fn page_data(&self) -> Option<PageData> { self.state.lock().view.data.clone() }

    pub fn is_read_only(&self) -> bool { self.state.lock().is_read_only() }

    pub fn pending_count(&self) -> usize { self.state.lock().overlay.pending_count() }

    pub fn dirty_row_count(&self) -> usize { self.state.lock().overlay.dirty_row_count() }

    pub fn selected_count(&self) -> usize { self.state.lock().selection.len() }

    pub fn is_busy(&self, op: BusyOp) -> bool { self.state.lock().busy.is_busy(op) }

    pub fn page(&self) -> u64 { self.state.lock().view.page }

    pub fn page_size(&self) -> u64 { self.state.lock().view.page_size }

    pub fn page_count(&self) -> u64 { self.state.lock().view.page_count() }

    pub fn sort(&self) -> Option<SortSpec> { self.state.lock().view.sort.clone() }

    pub fn epoch(&self) -> u64 { self.state.lock().view.epoch }

    pub fn last_error(&self) -> Option<AppError> { self.state.lock().view.last_error.clone() }

    pub fn insert_open(&self) -> bool { self.state.lock().draft.is_some() }

    pub fn draft_value(&self, column: &str) -> Option<String> {
        self.state.lock().draft.as_ref().and_then(|d| d.get(column).map(|s| s.to_string()))
    }

    /// The value to show for a cell: pending if edited, else as fetched.
    pub fn resolve_display(&self, row_index: usize, column: &str) -> AppResult<CellValue> {
        let st = self.state.lock();
        let original = st.view.cell(row_index, column)?;
        let key = st.view.key_of(row_index)?;
        Ok(st.overlay.resolve_display(key.as_ref().map(|k| &k.fingerprint), column, original).clone())
    }

    pub fn cell_state(&self, row_index: usize, column: &str) -> AppResult<CellState> {
        let st = self.state.lock();
        st.view.cell(row_index, column)?;
        Ok(match st.view.key_of(row_index)? {
            Some(k) => st.editor.state_of(&st.overlay, &k.fingerprint, column),
            None => CellState::Idle,
        })
    }

    pub fn is_selected(&self, row_index: usize) -> AppResult<bool> {
        let st = self.state.lock();
        Ok(st.view.key_of(row_index)?.map(|k| st.selection.contains(&k.fingerprint)).unwrap_or(false))
    }

    /// Allowed values for immediate-commit columns; empty for free-text columns.
    pub fn column_choices(&self, column: &str) -> AppResult<Vec<String>> {
        let st = self.state.lock();
        let meta = st.column_meta(column)?;
        Ok(match st.schema.kind(&meta) {
            ColumnKind::Boolean => vec!["true".to_string(), "false".to_string()],
            ColumnKind::Enum { values, .. } => values,
            ColumnKind::Scalar(_) => Vec::new(),
        })
    }

    pub fn snapshot(&self) -> PageSnapshot {
        let st = self.state.lock();
        let columns: Vec<PageColumn> = st.view.data.as_ref().map(|d| d.columns.clone()).unwrap_or_default();
        let active = st.editor.active();
        let rows = st
            .view
            .rows()
            .iter()
            .map(|row| {
                let key = st.view.keys().and_then(|k| k.key_of(row));
                let fp = key.as_ref().map(|k| &k.fingerprint);
                let cells = columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, original)| CellSnapshot {
                        value: st.overlay.resolve_display(fp, &col.name, original).clone(),
                        pending: fp.map(|f| st.overlay.is_dirty(f, &col.name)).unwrap_or(false),
                        editing: match (active, fp) {
                            (Some(a), Some(f)) => &a.key.fingerprint == f && a.column == col.name,
                            _ => false,
                        },
                    })
                    .collect();
                RowSnapshot { selected: fp.map(|f| st.selection.contains(f)).unwrap_or(false), cells }
            })
            .collect();
        PageSnapshot {
            relation: st.view.relation.clone(),
            columns,
            rows,
            page: st.view.page,
            page_size: st.view.page_size,
            page_count: st.view.page_count(),
            total_rows: st.view.total_rows(),
            elapsed_ms: st.view.data.as_ref().map(|d| d.elapsed_ms).unwrap_or(0),
            sort: st.view.sort.clone(),
            pending_count: st.overlay.pending_count(),
            selected_count: st.selection.len(),
            read_only: st.is_read_only(),
            insert_open: st.draft.is_some(),
            busy: BusyOp::ALL.into_iter().filter(|op| st.busy.is_busy(*op)).collect(),
            last_error: st.view.last_error.as_ref().map(|e| e.banner()),
        }
    }

    // ---- cell edits ----

    /// Coerce `raw` for the column and record it against the row's fetched value.
    pub fn record_edit(&self, row_index: usize, column: &str, raw: &str) -> AppResult<EditOutcome> {
        let (outcome, event) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let (key, meta, original) = st.editable_cell(row_index, column)?;
            let value = coerce_input(&meta, &st.schema.kind(&meta), raw)?;
            let outcome = st.overlay.record_edit(&key, column, &original, value);
            (outcome, st.overlay_event())
        };
        self.emit(vec![event]);
        Ok(outcome)
    }

    /// Mark a cell as explicitly NULL, even when it already is.
    pub fn set_null(&self, row_index: usize, column: &str) -> AppResult<()> {
        let event = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let (key, meta, _) = st.editable_cell(row_index, column)?;
            if !meta.nullable {
                return Err(AppError::validation("not_nullable", format!("column '{}' does not accept NULL", column)));
            }
            st.overlay.set_null(&key, column);
            st.overlay_event()
        };
        self.emit(vec![event]);
        Ok(())
    }

    /// Start editing a scalar cell; returns the initial buffer (the displayed value).
    pub fn begin_edit(&self, row_index: usize, column: &str) -> AppResult<String> {
        let (initial, events) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let (key, _, original) = st.editable_cell(row_index, column)?;
            let initial = st.overlay.resolve_display(Some(&key.fingerprint), column, &original).edit_text();
            let mut events = Vec::new();
            if let Some(old) = st.editor.begin(key, row_index, column, original, initial.clone()) {
                events.push(SessionEvent::EditEnded { row_index: old.row_index, column: old.column });
            }
            events.push(SessionEvent::EditStarted { row_index, column: column.to_string() });
            (initial, events)
        };
        self.emit(events);
        Ok(initial)
    }

    pub fn set_edit_buffer(&self, text: &str) -> AppResult<()> {
        if self.state.lock().editor.set_buffer(text) {
            Ok(())
        } else {
            Err(AppError::validation("not_editing", "no cell is being edited"))
        }
    }

    /// Commit the active edit. A rejected value keeps the cell in editing state.
    pub fn confirm_edit(&self) -> AppResult<EditOutcome> {
        let (outcome, events) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let mut edit = st.editor.take().ok_or_else(|| AppError::validation("not_editing", "no cell is being edited"))?;
            // Compare against the row's current fetched value; a refresh may have moved it
            let located = st.view.position_of(&edit.key.fingerprint);
            if let Some(i) = located {
                edit.row_index = i;
            }
            let coerced = st.column_meta(&edit.column).and_then(|meta| {
                let original = match located {
                    Some(i) => st.view.cell(i, &edit.column)?.clone(),
                    None => edit.original.clone(),
                };
                let value = coerce_input(&meta, &st.schema.kind(&meta), &edit.buffer)?;
                Ok((original, value))
            });
            let (original, value) = match coerced {
                Ok(v) => v,
                Err(e) => {
                    st.editor.resume(edit);
                    return Err(e);
                }
            };
            let outcome = st.overlay.record_edit(&edit.key, &edit.column, &original, value);
            let events = vec![SessionEvent::EditEnded { row_index: edit.row_index, column: edit.column }, st.overlay_event()];
            (outcome, events)
        };
        self.emit(events);
        Ok(outcome)
    }

    /// Leave editing; an earlier pending value for the cell is kept.
    pub fn cancel_edit(&self) -> bool {
        let ended = self.state.lock().editor.cancel();
        match ended {
            Some(e) => {
                self.emit(vec![SessionEvent::EditEnded { row_index: e.row_index, column: e.column }]);
                true
            }
            None => false,
        }
    }

    /// Boolean and enum cells commit on choice, without a confirm step.
    pub fn choose_value(&self, row_index: usize, column: &str, raw: &str) -> AppResult<EditOutcome> {
        {
            let st = self.state.lock();
            let meta = st.column_meta(column)?;
            if !st.schema.kind(&meta).commits_immediately() {
                return Err(AppError::validation("requires_confirm", format!("column '{}' is edited as text", column)));
            }
        }
        self.record_edit(row_index, column, raw)
    }

    pub fn discard_all(&self) {
        let events = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let mut events = Vec::new();
            if let Some(e) = st.editor.cancel() {
                events.push(SessionEvent::EditEnded { row_index: e.row_index, column: e.column });
            }
            st.overlay.discard_all();
            events.push(st.overlay_event());
            events
        };
        debug!(target: "pgbrowse::session", "discarded pending edits");
        self.emit(events);
    }

    // ---- selection ----

    /// Returns whether the row is selected afterwards.
    pub fn toggle_selection(&self, row_index: usize) -> AppResult<bool> {
        let (selected, event) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let key = st.view.key_of(row_index)?.ok_or_else(|| st.read_only_error())?;
            let selected = st.selection.toggle(&key);
            (selected, st.selection_event())
        };
        self.emit(vec![event]);
        Ok(selected)
    }

    /// Select every row on the page, or clear the selection when all already are.
    pub fn toggle_select_all(&self) -> AppResult<usize> {
        let (count, event) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if st.is_read_only() {
                return Err(st.read_only_error());
            }
            let keys = st.view.page_keys();
            st.selection.toggle_all(&keys);
            (st.selection.len(), st.selection_event())
        };
        self.emit(vec![event]);
        Ok(count)
    }

    // ---- insert draft ----

    pub fn begin_insert(&self) {
        let opened = {
            let mut st = self.state.lock();
            if st.draft.is_some() { false } else { st.draft = Some(NewRowDraft::new()); true }
        };
        if opened {
            self.emit(vec![SessionEvent::InsertFormChanged { open: true }]);
        }
    }

    pub fn set_draft_value(&self, column: &str, raw: &str) -> AppResult<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.column_meta(column)?;
        let draft = st.draft.as_mut().ok_or_else(|| AppError::validation("insert_not_open", "no new row is being edited"))?;
        draft.set(column, raw);
        Ok(())
    }

    pub fn cancel_insert(&self) {
        let closed = self.state.lock().draft.take().is_some();
        if closed {
            self.emit(vec![SessionEvent::InsertFormChanged { open: false }]);
        }
    }

    // ---- remote operations ----

    /// Fetch the current page (and, for a new relation, its schema).
    /// `exclusive` rejects the call while another load is running; context changes pass
    /// false because they supersede whatever is in flight.
    async fn load(&self, with_schema: bool, exclusive: bool) -> AppResult<()> {
        let (rec, req, epoch, became_busy) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let became_busy = if exclusive {
                st.busy.try_begin(BusyOp::Load)?;
                true
            } else {
                st.busy.begin(BusyOp::Load)
            };
            (st.reconciler(&self.store), st.view.page_request(), st.view.epoch, became_busy)
        };
        if became_busy {
            self.emit(vec![SessionEvent::BusyChanged { op: BusyOp::Load, busy: true }]);
        }

        let fetched: AppResult<(Option<RelationSchema>, PageData)> = async {
            let schema = if with_schema { Some(rec.load_schema().await?) } else { None };
            let page = rec.fetch(&req).await?;
            Ok::<_, AppError>((schema, page))
        }
        .await;

        let mut events = Vec::new();
        let result = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if st.busy.end(BusyOp::Load) {
                events.push(SessionEvent::BusyChanged { op: BusyOp::Load, busy: false });
            }
            if st.view.epoch != epoch {
                debug!(target: "pgbrowse::session", "dropping fetch of {} page {} from epoch {} (now {})", rec.relation(), req.page, epoch, st.view.epoch);
                Ok(())
            } else {
                match fetched {
                    Ok((schema, page)) => {
                        if let Some(s) = schema {
                            st.schema = s;
                        }
                        events.push(SessionEvent::PageLoaded { page: page.page, rows: page.rows.len(), total_rows: page.total_rows });
                        st.view.install(page, &st.schema);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(target: "pgbrowse::session", "load of {} failed: {}", rec.relation(), e);
                        st.view.last_error = Some(e.clone());
                        events.push(SessionEvent::LoadFailed { error: e.clone() });
                        Err(e)
                    }
                }
            }
        };
        self.emit(events);
        result
    }

    /// Refetch after a successful write. A failure here is already recorded as
    /// `last_error` and reported through `LoadFailed`; the write itself stands.
    async fn reload_after_write(&self) {
        if let Err(e) = self.load(false, false).await {
            debug!(target: "pgbrowse::session", "refetch after write failed: {}", e);
        }
    }

    /// Re-fetch the current page. Pending edits are kept and re-applied by row key.
    pub async fn refresh(&self) -> AppResult<()> { self.load(false, true).await }

    /// Write every dirty row, one update per row. Returns the number of rows written.
    pub async fn save(&self) -> AppResult<usize> {
        let (rec, plans, epoch) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if st.overlay.is_empty() {
                return Ok(0);
            }
            let rec = st.reconciler(&self.store);
            let plans = rec.plan_save(&st.schema, st.overlay.rows())?;
            st.busy.try_begin(BusyOp::Save)?;
            (rec, plans, st.view.epoch)
        };
        self.emit(vec![SessionEvent::BusyChanged { op: BusyOp::Save, busy: true }]);
        info!(target: "pgbrowse::session", "saving {} dirty row(s) of {}", plans.len(), rec.relation());

        let report = rec.save(plans).await;
        let applied = report.applied.len();
        let error = report.error();

        let mut events = vec![SessionEvent::BusyChanged { op: BusyOp::Save, busy: false }];
        let current = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.busy.end(BusyOp::Save);
            let current = st.view.epoch == epoch;
            if current {
                for (fp, sent) in &report.applied {
                    st.overlay.retire_applied(fp, sent);
                }
                events.push(st.overlay_event());
            }
            current
        };
        match &error {
            Some(e) => events.push(SessionEvent::WriteFailed { op: BusyOp::Save, error: e.clone() }),
            None => events.push(SessionEvent::SaveCompleted { applied }),
        }
        if !current {
            info!(target: "pgbrowse::session", "save of {} finished after the view changed; skipping refetch", rec.relation());
            events.push(SessionEvent::StaleWriteCompleted { op: BusyOp::Save, succeeded: error.is_none() });
        }
        self.emit(events);

        if current && applied > 0 {
            self.reload_after_write().await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    /// Delete every selected row in one call. Returns the count the store reports.
    pub async fn delete_selected(&self) -> AppResult<u64> {
        let (rec, schema, keys, epoch) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if st.is_read_only() {
                return Err(st.read_only_error());
            }
            if st.selection.is_empty() {
                return Err(AppError::validation("empty_selection", "no rows selected"));
            }
            st.busy.try_begin(BusyOp::Delete)?;
            (st.reconciler(&self.store), st.schema.clone(), st.selection.keys(), st.view.epoch)
        };
        self.emit(vec![SessionEvent::BusyChanged { op: BusyOp::Delete, busy: true }]);

        let result = rec.delete(&schema, &keys).await;

        let mut events = vec![SessionEvent::BusyChanged { op: BusyOp::Delete, busy: false }];
        let current = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.busy.end(BusyOp::Delete);
            let current = st.view.epoch == epoch;
            if current && result.is_ok() {
                st.selection.clear();
                // Deleted rows cannot be saved; their pending edits go with them
                for k in &keys {
                    st.overlay.remove_row(&k.fingerprint);
                }
                events.push(st.selection_event());
                events.push(st.overlay_event());
            }
            current
        };
        match &result {
            Ok(n) => events.push(SessionEvent::RowsDeleted { requested: keys.len(), deleted: *n }),
            Err(e) => events.push(SessionEvent::WriteFailed { op: BusyOp::Delete, error: e.clone() }),
        }
        if !current {
            events.push(SessionEvent::StaleWriteCompleted { op: BusyOp::Delete, succeeded: result.is_ok() });
        }
        self.emit(events);

        if current && result.is_ok() {
            self.reload_after_write().await;
        }
        result
    }

    /// Insert the draft row. Validation failures make no remote call.
    pub async fn save_new_row(&self) -> AppResult<u64> {
        let (rec, req, epoch) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let draft = st.draft.as_ref().ok_or_else(|| AppError::validation("insert_not_open", "no new row is being edited"))?;
            let req = draft.build_insert(&st.schema)?;
            st.busy.try_begin(BusyOp::Insert)?;
            (st.reconciler(&self.store), req, st.view.epoch)
        };
        self.emit(vec![SessionEvent::BusyChanged { op: BusyOp::Insert, busy: true }]);

        let result = rec.insert(&req).await;

        let mut events = vec![SessionEvent::BusyChanged { op: BusyOp::Insert, busy: false }];
        let current = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.busy.end(BusyOp::Insert);
            let current = st.view.epoch == epoch;
            if current && result.is_ok() && st.draft.take().is_some() {
                events.push(SessionEvent::InsertFormChanged { open: false });
            }
            current
        };
        match &result {
            Ok(_) => events.push(SessionEvent::RowInserted),
            Err(e) => events.push(SessionEvent::WriteFailed { op: BusyOp::Insert, error: e.clone() }),
        }
        if !current {
            events.push(SessionEvent::StaleWriteCompleted { op: BusyOp::Insert, succeeded: result.is_ok() });
        }
        self.emit(events);

        if current && result.is_ok() {
            self.reload_after_write().await;
        }
        result
    }

    // ---- context changes ----

    fn reset_context(&self, change: impl FnOnce(&mut SessionState)) -> u64 {
        let (epoch, events) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            change(st);
            let had_edit = st.editor.active().map(|a| (a.row_index, a.column.clone()));
            let had_draft = st.draft.is_some();
            let epoch = st.clear_context();
            let mut events = Vec::new();
            if let Some((row_index, column)) = had_edit {
                events.push(SessionEvent::EditEnded { row_index, column });
            }
            if had_draft {
                events.push(SessionEvent::InsertFormChanged { open: false });
            }
            events.push(SessionEvent::ContextReset { epoch });
            (epoch, events)
        };
        debug!(target: "pgbrowse::session", "context reset, epoch {}", epoch);
        self.emit(events);
        epoch
    }

    /// Move to a 1-based page. Clears pending edits, selection and draft.
    pub async fn set_page(&self, page: u64) -> AppResult<()> {
        if page == 0 {
            return Err(AppError::validation("invalid_page", "pages are numbered from 1"));
        }
        if self.page() == page {
            return Ok(());
        }
        self.reset_context(|st| st.view.page = page);
        self.load(false, false).await
    }

    pub async fn set_page_size(&self, page_size: u64) -> AppResult<()> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::validation("invalid_page_size", format!("page size must be between 1 and {}", MAX_PAGE_SIZE)));
        }
        if self.page_size() == page_size {
            return Ok(());
        }
        self.reset_context(|st| {
            st.view.page_size = page_size;
            st.view.page = 1;
        });
        self.load(false, false).await
    }

    /// Change (or clear) the sort; goes back to page 1.
    pub async fn set_sort(&self, sort: Option<SortSpec>) -> AppResult<()> {
        {
            let st = self.state.lock();
            if let Some(s) = &sort {
                st.column_meta(&s.column)?;
            }
            if st.view.sort == sort {
                return Ok(());
            }
        }
        self.reset_context(|st| {
            st.view.sort = sort;
            st.view.page = 1;
        });
        self.load(false, false).await
    }

    /// Point the session at another relation on the same connection.
    pub async fn set_relation(&self, relation: RelationRef) -> AppResult<()> {
        self.reset_context(|st| {
            info!(target: "pgbrowse::session", "switching {} -> {}", st.view.relation, relation);
            st.view.relation = relation;
            st.view.page = 1;
            st.view.sort = None;
            st.view.last_error = None;
            st.view.clear_data();
            st.schema = RelationSchema::default();
        });
        self.load(true, false).await
    }

    // ---- export ----

    /// Render the current page, with pending edits applied.
    pub fn export_page(&self, format: ExportFormat) -> AppResult<String> {
        let st = self.state.lock();
        export::render(&st.view, &st.overlay, format)
    }

    /// Write the rendered page to `path`; returns the number of data rows written.
    pub fn export_page_to(&self, path: &Path, format: ExportFormat) -> AppResult<usize> {
        let (text, rows) = {
            let st = self.state.lock();
            (export::render(&st.view, &st.overlay, format)?, st.view.rows().len())
        };
        export::write_file(path, &text)?;
        info!(target: "pgbrowse::session", "exported {} row(s) to {}", rows, path.display());
        Ok(rows)
    }

    /// Render every row of the relation as stored, in the current sort order. Pending edits
    /// are not part of it; the page export is the one that shows them.
    pub async fn export_relation(&self, format: ExportFormat) -> AppResult<String> {
        self.export_relation_rows(format).await.map(|(text, _)| text)
    }

    /// Write the whole relation to `path`; returns the number of data rows written.
    pub async fn export_relation_to(&self, path: &Path, format: ExportFormat) -> AppResult<usize> {
        let (text, rows) = self.export_relation_rows(format).await?;
        export::write_file(path, &text)?;
        info!(target: "pgbrowse::session", "exported {} row(s) of the relation to {}", rows, path.display());
        Ok(rows)
    }

    async fn export_relation_rows(&self, format: ExportFormat) -> AppResult<(String, usize)> {
        let (rec, sort, pending) = {
            let st = self.state.lock();
            (st.reconciler(&self.store), st.view.sort.clone(), st.overlay.pending_count())
        };
        if pending > 0 {
            warn!(target: "pgbrowse::session", "relation export of {} leaves out {} pending change(s)", rec.relation(), pending);
        }
        let (columns, rows) = rec.fetch_all(sort, EXPORT_BATCH_ROWS).await?;
        let text = export::render_rows(&columns, &rows, format)?;
        Ok((text, rows.len()))
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
