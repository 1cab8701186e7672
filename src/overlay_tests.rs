use super::*;

fn key(id: i64) -> RowKey { RowKey::new(vec![CellValue::int(id)]) }

#[test]
fn record_then_resolve_then_discard() {
    let mut set = PendingChangeSet::new();
    let k = key(1);
    let original = CellValue::text("a");
    assert_eq!(set.record_edit(&k, "name", &original, CellValue::text("b")), EditOutcome::Recorded);
    assert_eq!(set.resolve_display(Some(&k.fingerprint), "name", &original), &CellValue::text("b"));
    assert_eq!(set.pending_count(), 1);
    set.discard_all();
    assert_eq!(set.resolve_display(Some(&k.fingerprint), "name", &original), &original);
    assert_eq!(set.pending_count(), 0);
}

#[test]
fn editing_back_to_original_removes_entry() {
    let mut set = PendingChangeSet::new();
    let k = key(1);
    let original = CellValue::int(10);
    set.record_edit(&k, "qty", &original, CellValue::int(11));
    assert!(set.is_dirty(&k.fingerprint, "qty"));
    // Original value typed back as text form
    assert_eq!(set.record_edit(&k, "qty", &original, CellValue::text("10")), EditOutcome::Clean);
    assert!(!set.is_dirty(&k.fingerprint, "qty"));
    assert!(set.is_empty());
    // Never creates an entry either
    assert_eq!(set.record_edit(&k, "qty", &original, CellValue::int(10)), EditOutcome::Clean);
    assert_eq!(set.dirty_row_count(), 0);
}

#[test]
fn clean_edit_keeps_other_cells_of_the_row() {
    let mut set = PendingChangeSet::new();
    let k = key(3);
    set.record_edit(&k, "a", &CellValue::text("x"), CellValue::text("y"));
    set.record_edit(&k, "b", &CellValue::text("p"), CellValue::text("q"));
    set.record_edit(&k, "a", &CellValue::text("x"), CellValue::text("x"));
    assert_eq!(set.pending_count(), 1);
    assert!(set.row_is_dirty(&k.fingerprint));
}

#[test]
fn set_null_overrides_prior_pending_value() {
    let mut set = PendingChangeSet::new();
    let k = key(2);
    let original = CellValue::text("memo");
    set.record_edit(&k, "note", &original, CellValue::text("changed"));
    set.set_null(&k, "note");
    assert_eq!(set.resolve_display(Some(&k.fingerprint), "note", &original), &CellValue::Null);
    // Also when nothing was pending before
    set.set_null(&k, "other");
    assert_eq!(set.pending_value(&k.fingerprint, "other"), Some(&CellValue::Null));
}

#[test]
fn rows_without_fingerprint_show_original() {
    let set = PendingChangeSet::new();
    let original = CellValue::text("ro");
    assert_eq!(set.resolve_display(None, "c", &original), &original);
}

#[test]
fn retire_applied_keeps_cells_changed_in_flight() {
    let mut set = PendingChangeSet::new();
    let k = key(5);
    set.record_edit(&k, "a", &CellValue::text("0"), CellValue::text("1"));
    set.record_edit(&k, "b", &CellValue::text("0"), CellValue::text("1"));
    let sent = set.rows().next().unwrap().changes.clone();
    // User edits `b` again before the write completes
    set.record_edit(&k, "b", &CellValue::text("0"), CellValue::text("2"));
    set.retire_applied(&k.fingerprint, &sent);
    assert!(!set.is_dirty(&k.fingerprint, "a"));
    assert_eq!(set.pending_value(&k.fingerprint, "b"), Some(&CellValue::text("2")));
    let resent = set.rows().next().unwrap().changes.clone();
    set.retire_applied(&k.fingerprint, &resent);
    assert!(set.is_empty());
}
