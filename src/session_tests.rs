use super::*;
use crate::remote::{MemoryStore, SortDirection, StoreCall};

fn users() -> RelationRef { RelationRef::new("public", "users") }

async fn open(relation: RelationRef, page_size: u64) -> (Arc<MemoryStore>, BrowseSession) {
    let store = Arc::new(MemoryStore::demo());
    let session = BrowseSession::open(store.clone(), store.connection(), relation, page_size).await.unwrap();
    (store, session)
}

fn recorder(session: &BrowseSession) -> Arc<Mutex<Vec<SessionEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    session.subscribe(move |e| sink.lock().push(e.clone()));
    log
}

#[tokio::test]
async fn edit_round_trip_through_the_editor() {
    let (_, s) = open(users(), 10).await;
    assert_eq!(s.begin_edit(0, "name").unwrap(), "Ada");
    assert_eq!(s.cell_state(0, "name").unwrap(), CellState::Editing);
    s.set_edit_buffer("Ada L.").unwrap();
    assert_eq!(s.confirm_edit().unwrap(), EditOutcome::Recorded);
    assert_eq!(s.cell_state(0, "name").unwrap(), CellState::Pending);
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Ada L."));

    // Editing again and cancelling keeps the earlier pending value
    assert_eq!(s.begin_edit(0, "name").unwrap(), "Ada L.");
    s.set_edit_buffer("something else").unwrap();
    assert!(s.cancel_edit());
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Ada L."));

    // Confirming the original value cleans the cell
    s.begin_edit(0, "name").unwrap();
    s.set_edit_buffer("Ada").unwrap();
    assert_eq!(s.confirm_edit().unwrap(), EditOutcome::Clean);
    assert_eq!(s.pending_count(), 0);
    assert_eq!(s.cell_state(0, "name").unwrap(), CellState::Idle);
}

#[tokio::test]
async fn rejected_confirm_stays_in_editing() {
    let (_, s) = open(users(), 10).await;
    s.begin_edit(0, "name").unwrap();
    s.set_edit_buffer("").unwrap();
    assert_eq!(s.confirm_edit().unwrap_err().code_str(), "blank_not_null");
    assert_eq!(s.cell_state(0, "name").unwrap(), CellState::Editing);
    assert_eq!(s.pending_count(), 0);
    assert_eq!(s.set_edit_buffer("x").map(|_| ()), Ok(()));
}

#[tokio::test]
async fn key_columns_and_unknown_cells_are_refused() {
    let (_, s) = open(users(), 10).await;
    assert_eq!(s.record_edit(0, "id", "9").unwrap_err().code_str(), "key_column");
    assert_eq!(s.record_edit(0, "nickname", "x").unwrap_err().code_str(), "no_column");
    assert_eq!(s.record_edit(99, "name", "x").unwrap_err().code_str(), "no_row");
    assert_eq!(s.confirm_edit().unwrap_err().code_str(), "not_editing");
}

#[tokio::test]
async fn unchanged_values_are_not_dirty() {
    let (_, s) = open(users(), 10).await;
    // balance is numeric, fetched and edited as text
    assert_eq!(s.record_edit(0, "balance", "10.50").unwrap(), EditOutcome::Clean);
    assert_eq!(s.choose_value(0, "active", "yes").unwrap(), EditOutcome::Clean);
    assert_eq!(s.record_edit(0, "profile", "{\"lang\":\"en\"}").unwrap(), EditOutcome::Clean);
    assert_eq!(s.pending_count(), 0);
}

#[tokio::test]
async fn set_null_always_records() {
    let (_, s) = open(users(), 10).await;
    // Brendan's email is already NULL
    s.set_null(1, "email").unwrap();
    assert_eq!(s.pending_count(), 1);
    assert_eq!(s.resolve_display(1, "email").unwrap(), CellValue::Null);
    assert_eq!(s.set_null(0, "name").unwrap_err().code_str(), "not_nullable");
}

#[tokio::test]
async fn blank_input_on_nullable_column_is_null_not_empty() {
    let (_, s) = open(users(), 10).await;
    s.record_edit(0, "email", "").unwrap();
    assert_eq!(s.resolve_display(0, "email").unwrap(), CellValue::Null);
    // Dana's email is the empty string; blank input differs from it
    assert_eq!(s.record_edit(3, "email", "").unwrap(), EditOutcome::Recorded);
}

#[tokio::test]
async fn choose_value_only_for_boolean_and_enum() {
    let (_, s) = open(users(), 10).await;
    assert_eq!(s.choose_value(0, "active", "false").unwrap(), EditOutcome::Recorded);
    assert_eq!(s.choose_value(0, "mood", "ok").unwrap(), EditOutcome::Recorded);
    assert_eq!(s.choose_value(0, "mood", "furious").unwrap_err().code_str(), "invalid_enum");
    assert_eq!(s.choose_value(0, "name", "x").unwrap_err().code_str(), "requires_confirm");
    assert_eq!(s.column_choices("mood").unwrap(), vec!["sad", "ok", "happy"]);
    assert_eq!(s.column_choices("active").unwrap(), vec!["true", "false"]);
    assert!(s.column_choices("name").unwrap().is_empty());
}

#[tokio::test]
async fn pending_edits_survive_refresh() {
    let (store, s) = open(users(), 10).await;
    s.record_edit(2, "email", "c@new").unwrap();
    store.clear_calls();
    s.refresh().await.unwrap();
    assert_eq!(s.pending_count(), 1);
    assert_eq!(s.resolve_display(2, "email").unwrap(), CellValue::text("c@new"));
    assert!(matches!(store.calls().as_slice(), [StoreCall::FetchPage { .. }]));
}

#[tokio::test]
async fn sort_change_resets_context_and_page() {
    let (_, s) = open(users(), 2).await;
    let events = recorder(&s);
    s.set_page(2).await.unwrap();
    s.record_edit(0, "name", "x").unwrap();
    s.toggle_selection(1).unwrap();
    s.begin_insert();
    s.set_sort(Some(SortSpec { column: "name".into(), direction: SortDirection::Desc })).await.unwrap();
    assert_eq!(s.page(), 1);
    assert_eq!(s.pending_count(), 0);
    assert_eq!(s.selected_count(), 0);
    assert!(!s.insert_open());
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Eun-ji"));
    let resets = events.lock().iter().filter(|e| matches!(e, SessionEvent::ContextReset { .. })).count();
    assert_eq!(resets, 2);
    let err = s.set_sort(Some(SortSpec { column: "nope".into(), direction: SortDirection::Asc })).await.unwrap_err();
    assert_eq!(err.code_str(), "no_column");
}

#[tokio::test]
async fn failed_fetch_keeps_previous_page() {
    let (store, s) = open(users(), 2).await;
    store.fail_next(crate::remote::StoreOp::FetchPage, "connection reset");
    let events = recorder(&s);
    let err = s.set_page(2).await.unwrap_err();
    assert_eq!(err.message(), "connection reset");
    assert_eq!(s.last_error().unwrap().message(), "connection reset");
    // Stale rows from page 1 are still shown
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Ada"));
    assert!(events.lock().iter().any(|e| matches!(e, SessionEvent::LoadFailed { .. })));
    s.refresh().await.unwrap();
    assert!(s.last_error().is_none());
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Chidi"));
}

#[tokio::test]
async fn relation_switch_loads_new_schema() {
    let (_, s) = open(users(), 10).await;
    s.record_edit(0, "name", "x").unwrap();
    s.set_relation(RelationRef::new("public", "audit_log")).await.unwrap();
    assert_eq!(s.pending_count(), 0);
    assert!(s.is_read_only());
    assert_eq!(s.schema().columns.len(), 2);
    assert_eq!(s.record_edit(0, "message", "x").unwrap_err().code_str(), "read_only");
}

#[tokio::test]
async fn snapshot_marks_pending_and_selected() {
    let (_, s) = open(users(), 10).await;
    s.record_edit(1, "email", "b@b").unwrap();
    s.toggle_selection(2).unwrap();
    let snap = s.snapshot();
    assert_eq!(snap.rows.len(), 5);
    assert!(snap.rows[1].cells[2].pending);
    assert_eq!(snap.rows[1].cells[2].value, CellValue::text("b@b"));
    assert!(!snap.rows[1].selected);
    assert!(snap.rows[2].selected);
    assert_eq!((snap.pending_count, snap.selected_count), (1, 1));
    assert!(snap.busy.is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_events() {
    let (_, s) = open(users(), 10).await;
    let log = Arc::new(Mutex::new(0usize));
    let sink = log.clone();
    let id = s.subscribe(move |_| *sink.lock() += 1);
    s.discard_all();
    let seen = *log.lock();
    assert!(seen > 0);
    assert!(s.unsubscribe(id));
    s.discard_all();
    assert_eq!(*log.lock(), seen);
}

#[tokio::test]
async fn draft_requires_open_form() {
    let (store, s) = open(users(), 10).await;
    assert_eq!(s.set_draft_value("name", "x").unwrap_err().code_str(), "insert_not_open");
    assert_eq!(s.save_new_row().await.unwrap_err().code_str(), "insert_not_open");
    s.begin_insert();
    assert_eq!(s.set_draft_value("nickname", "x").unwrap_err().code_str(), "no_column");
    s.set_draft_value("name", "Gus").unwrap();
    assert_eq!(s.draft_value("name").as_deref(), Some("Gus"));
    s.cancel_insert();
    assert!(!s.insert_open());
    assert!(store.write_calls().is_empty());
}

#[tokio::test]
async fn confirm_follows_the_row_after_a_refresh_moves_it() {
    let (store, s) = open(users(), 10).await;
    s.set_sort(Some(SortSpec { column: "name".into(), direction: SortDirection::Asc })).await.unwrap();
    assert_eq!(s.begin_edit(0, "email").unwrap(), "ada@example.com");

    // Someone else renames Ada so she sorts last
    let other = BrowseSession::open(store.clone(), store.connection(), users(), 10).await.unwrap();
    other.record_edit(0, "name", "Zed").unwrap();
    other.save().await.unwrap();

    let events = recorder(&s);
    s.refresh().await.unwrap();
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Brendan"));
    assert_eq!(s.cell_state(4, "email").unwrap(), CellState::Editing);

    // The untouched buffer matches Ada's own email, not Brendan's NULL
    assert_eq!(s.confirm_edit().unwrap(), EditOutcome::Clean);
    assert_eq!(s.pending_count(), 0);
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, SessionEvent::EditEnded { row_index: 4, column } if column == "email")));

    // A real change lands on Ada's row wherever it now is
    s.begin_edit(4, "email").unwrap();
    s.set_edit_buffer("zed@example.com").unwrap();
    assert_eq!(s.confirm_edit().unwrap(), EditOutcome::Recorded);
    assert_eq!(s.resolve_display(4, "email").unwrap(), CellValue::text("zed@example.com"));
    assert_eq!(s.resolve_display(0, "email").unwrap(), CellValue::Null);
}

#[tokio::test]
async fn edit_on_a_row_that_left_the_page_uses_the_value_it_started_from() {
    let (store, s) = open(users(), 2).await;
    assert_eq!(s.begin_edit(0, "email").unwrap(), "ada@example.com");
    // Delete Ada elsewhere; after a refresh she is no longer on the page
    let other = BrowseSession::open(store.clone(), store.connection(), users(), 2).await.unwrap();
    other.toggle_selection(0).unwrap();
    other.delete_selected().await.unwrap();
    s.refresh().await.unwrap();
    assert_eq!(s.resolve_display(0, "name").unwrap(), CellValue::text("Brendan"));
    assert_eq!(s.confirm_edit().unwrap(), EditOutcome::Clean);
}

/// Leave an edit and a selection behind, change context, and check both are gone.
async fn assert_change_clears_local_state<F, Fut>(page_size: u64, change: F)
where
    F: FnOnce(BrowseSession) -> Fut,
    Fut: std::future::Future<Output = AppResult<()>>,
{
    let (_, s) = open(users(), page_size).await;
    s.record_edit(0, "name", "x").unwrap();
    s.toggle_selection(1).unwrap();
    assert_eq!((s.pending_count(), s.selected_count()), (1, 1));
    let epoch = s.epoch();
    change(s.clone()).await.unwrap();
    assert!(s.epoch() > epoch);
    assert_eq!(s.pending_count(), 0);
    assert_eq!(s.selected_count(), 0);
    assert!(s.snapshot().rows.iter().all(|r| !r.selected && r.cells.iter().all(|c| !c.pending)));
}

#[tokio::test]
async fn page_change_clears_edits_and_selection() {
    assert_change_clears_local_state(2, |s| async move { s.set_page(2).await }).await;
}

#[tokio::test]
async fn page_size_change_clears_edits_and_selection() {
    assert_change_clears_local_state(2, |s| async move { s.set_page_size(3).await }).await;
}

#[tokio::test]
async fn relation_change_clears_edits_and_selection() {
    assert_change_clears_local_state(10, |s| async move {
        s.set_relation(RelationRef::new("public", "order_items")).await
    })
    .await;
}
