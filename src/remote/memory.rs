//! In-process remote store.
//!
//! Tables live in a `RwLock`ed map and behave like a small SQL backend: NOT NULL and enum
//! checks, serial defaults, primary-key uniqueness and NULLS LAST ordering. Every call is
//! appended to a call log, failures can be scheduled per operation, and writes can be parked
//! behind a gate so callers can interleave other work while a write is in flight.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::debug;

use super::*;
use crate::catalog::{quote_ident, EnumDomains, TypeClass};
use crate::coercion::coerce_scalar;

pub const MEMORY_CONNECTION: &str = "memory";

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    ListColumns { relation: RelationRef },
    EnumValues { domain: String },
    FetchPage { relation: RelationRef, request: PageRequest },
    UpdateRow { relation: RelationRef, request: UpdateRequest },
    DeleteRows { relation: RelationRef, request: DeleteRequest },
    InsertRow { relation: RelationRef, request: InsertRequest },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::ListColumns { .. } => StoreOp::ListColumns,
            StoreCall::EnumValues { .. } => StoreOp::EnumValues,
            StoreCall::FetchPage { .. } => StoreOp::FetchPage,
            StoreCall::UpdateRow { .. } => StoreOp::Update,
            StoreCall::DeleteRows { .. } => StoreOp::Delete,
            StoreCall::InsertRow { .. } => StoreOp::Insert,
        }
    }

    pub fn is_write(&self) -> bool { matches!(self.op(), StoreOp::Update | StoreOp::Delete | StoreOp::Insert) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    ListColumns,
    EnumValues,
    FetchPage,
    Update,
    Delete,
    Insert,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    /// Matching calls to let through before failing
    skip: usize,
    message: String,
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
}

impl MemTable {
    fn index_of(&self, name: &str) -> Option<usize> { self.columns.iter().position(|c| c.name == name) }

    fn key_positions(&self) -> Vec<usize> {
        self.columns.iter().enumerate().filter(|(_, c)| c.is_primary_key).map(|(i, _)| i).collect()
    }
}

pub struct MemoryStore {
    connection: ConnectionId,
    tables: RwLock<HashMap<RelationRef, MemTable>>,
    enums: RwLock<EnumDomains>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<VecDeque<Fault>>,
    write_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            connection: ConnectionId::new(MEMORY_CONNECTION),
            tables: RwLock::new(HashMap::new()),
            enums: RwLock::new(EnumDomains::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
            write_gate: Mutex::new(None),
        }
    }

    /// The only connection id this store answers to.
    pub fn connection(&self) -> ConnectionId { self.connection.clone() }

    pub fn create_table(&self, relation: RelationRef, columns: Vec<ColumnMeta>) {
        let mut columns = columns;
        columns.sort_by_key(|c| c.ordinal_position);
        self.tables.write().insert(relation, MemTable { columns, rows: Vec::new() });
    }

    pub fn define_enum(&self, domain: &str, values: &[&str]) {
        self.enums.write().insert(domain.to_string(), values.iter().map(|v| v.to_string()).collect());
    }

    /// Append a row as-is, bypassing constraint checks. Values are in column order.
    pub fn seed_row(&self, relation: &RelationRef, row: Row) {
        if let Some(t) = self.tables.write().get_mut(relation) {
            t.rows.push(row);
        }
    }

    /// Snapshot of a table's rows in storage order.
    pub fn rows(&self, relation: &RelationRef) -> Vec<Row> {
        self.tables.read().get(relation).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Row whose primary key is equivalent to `key`, if any.
    pub fn find_row(&self, relation: &RelationRef, key: &[CellValue]) -> Option<Row> {
        let tables = self.tables.read();
        let t = tables.get(relation)?;
        let pos = t.key_positions();
        t.rows
            .iter()
            .find(|r| pos.len() == key.len() && pos.iter().zip(key).all(|(&p, k)| r[p].equivalent(k)))
            .cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> { self.calls.lock().clone() }

    pub fn write_calls(&self) -> Vec<StoreCall> { self.calls.lock().iter().filter(|c| c.is_write()).cloned().collect() }

    pub fn clear_calls(&self) { self.calls.lock().clear(); }

    /// Fail the `nth` (1-based) upcoming call of `op` with `message`.
    pub fn fail_nth(&self, op: StoreOp, nth: usize, message: impl Into<String>) {
        self.faults.lock().push_back(Fault { op, skip: nth.saturating_sub(1), message: message.into() });
    }

    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) { self.fail_nth(op, 1, message); }

    /// Park every subsequent write until the returned gate is notified (one permit per write).
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.write_gate.lock() = Some(gate.clone());
        gate
    }

    /// Remove the gate; writes already parked stay parked until notified.
    pub fn release_writes(&self) {
        if let Some(g) = self.write_gate.lock().take() {
            g.notify_waiters();
        }
    }

    fn record(&self, call: StoreCall) -> StoreResult<()> {
        let op = call.op();
        debug!(target: "pgbrowse::remote", "memory store call: {:?}", op);
        self.calls.lock().push(call);
        let mut faults = self.faults.lock();
        let mut fire: Option<usize> = None;
        for (i, f) in faults.iter_mut().enumerate() {
            if f.op != op { continue; }
            if f.skip == 0 { fire = Some(i); break; }
            f.skip -= 1;
            break;
        }
        if let Some(i) = fire {
            if let Some(f) = faults.remove(i) {
                return Err(StoreError::Database(f.message));
            }
        }
        Ok(())
    }

    fn check_conn(&self, conn: &ConnectionId) -> StoreResult<()> {
        if conn != &self.connection {
            return Err(StoreError::UnknownConnection(conn.to_string()));
        }
        Ok(())
    }

    async fn pass_gate(&self) {
        let gate = self.write_gate.lock().clone();
        if let Some(g) = gate {
            g.notified().await;
        }
    }

    /// Convert a wire value into the representation the column stores, enforcing the
    /// constraints the database would.
    fn normalize(&self, table: &RelationRef, column: &ColumnMeta, value: &CellValue) -> StoreResult<CellValue> {
        if value.is_null() {
            if !column.nullable {
                return Err(StoreError::Database(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, table.table
                )));
            }
            return Ok(CellValue::Null);
        }
        if let Some(domain) = &column.enum_domain {
            let enums = self.enums.read();
            if let Some(values) = enums.get(domain).filter(|v| !v.is_empty()) {
                let text = value.edit_text();
                if !values.contains(&text) {
                    return Err(StoreError::Database(format!("invalid input value for enum {}: \"{}\"", domain, text)));
                }
                return Ok(CellValue::Text(text));
            }
            return Ok(CellValue::Text(value.edit_text()));
        }
        let class = column.type_class();
        let out = match value {
            CellValue::Text(t) => coerce_scalar(class, t),
            other => other.clone(),
        };
        let fits = match class {
            TypeClass::Integer => matches!(&out, CellValue::Number(n) if n.is_i64() || n.is_u64()),
            TypeClass::Float => matches!(out, CellValue::Number(_)),
            TypeClass::Boolean => matches!(out, CellValue::Bool(_)),
            TypeClass::Numeric => out.edit_text().trim().parse::<f64>().is_ok(),
            TypeClass::Json | TypeClass::Text => true,
        };
        if !fits {
            return Err(StoreError::Database(format!(
                "invalid input syntax for type {}: \"{}\"",
                column.data_type,
                value.edit_text()
            )));
        }
        Ok(out)
    }

    fn missing_column(relation: &RelationRef, name: &str) -> StoreError {
        StoreError::Database(format!("column \"{}\" of relation \"{}\" does not exist", name, relation.table))
    }
}

/// NULLS LAST in both directions; mixed types fall back to their text form.
fn compare_for_sort(a: &CellValue, b: &CellValue, dir: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let ord = match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => {
            x.as_f64().unwrap_or(0.0).partial_cmp(&y.as_f64().unwrap_or(0.0)).unwrap_or(Ordering::Equal)
        }
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        (x, y) => x.edit_text().cmp(&y.edit_text()),
    };
    match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn key_matches(row: &Row, positions: &[usize], key: &[CellValue]) -> bool {
    positions.len() == key.len() && positions.iter().zip(key).all(|(&p, k)| row.get(p).map(|v| v.equivalent(k)).unwrap_or(false))
}

/// Evaluate a column default the way the demo schemas declare them.
fn default_value(column: &ColumnMeta, expr: &str, rows: &[Row], idx: usize) -> CellValue {
    let e = expr.trim();
    if e.starts_with("nextval(") {
        let max = rows.iter().filter_map(|r| r.get(idx).and_then(|v| match v {
            CellValue::Number(n) => n.as_i64(),
            _ => None,
        })).max().unwrap_or(0);
        return CellValue::int(max + 1);
    }
    if e.eq_ignore_ascii_case("null") {
        return CellValue::Null;
    }
    // 'literal'::type
    if let Some(rest) = e.strip_prefix('\'') {
        if let Some(end) = rest.find('\'') {
            return coerce_scalar(column.type_class(), &rest[..end]);
        }
    }
    coerce_scalar(column.type_class(), e)
}

#[async_trait]
impl SchemaCatalog for MemoryStore {
    async fn list_columns(&self, conn: &ConnectionId, relation: &RelationRef) -> StoreResult<Vec<ColumnMeta>> {
        self.check_conn(conn)?;
        self.record(StoreCall::ListColumns { relation: relation.clone() })?;
        self.tables
            .read()
            .get(relation)
            .map(|t| t.columns.clone())
            .ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))
    }
}

#[async_trait]
impl EnumCatalog for MemoryStore {
    async fn enum_values(&self, conn: &ConnectionId, domain: &str) -> StoreResult<Vec<String>> {
        self.check_conn(conn)?;
        self.record(StoreCall::EnumValues { domain: domain.to_string() })?;
        Ok(self.enums.read().get(domain).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_page(&self, conn: &ConnectionId, relation: &RelationRef, req: &PageRequest) -> StoreResult<PageData> {
        self.check_conn(conn)?;
        self.record(StoreCall::FetchPage { relation: relation.clone(), request: req.clone() })?;
        let start = Instant::now();
        let tables = self.tables.read();
        let t = tables.get(relation).ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))?;

        let mut rows: Vec<&Row> = t.rows.iter().collect();
        if let Some(sort) = &req.sort {
            let idx = t
                .index_of(&sort.column)
                .ok_or_else(|| StoreError::Database(format!("column {} does not exist", quote_ident(&sort.column))))?;
            rows.sort_by(|a, b| compare_for_sort(&a[idx], &b[idx], sort.direction));
        }
        let total_rows = rows.len() as u64;
        let page_rows: Vec<Row> = rows
            .into_iter()
            .skip(req.offset() as usize)
            .take(req.page_size as usize)
            .cloned()
            .collect();

        Ok(PageData {
            columns: t.columns.iter().map(|c| PageColumn { name: c.name.clone(), data_type: c.data_type.clone() }).collect(),
            rows: page_rows,
            total_rows,
            page: req.page,
            page_size: req.page_size,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn update_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &UpdateRequest) -> StoreResult<u64> {
        self.check_conn(conn)?;
        self.record(StoreCall::UpdateRow { relation: relation.clone(), request: req.clone() })?;
        if req.key.is_empty() {
            return Err(StoreError::InvalidRequest("no primary key columns".into()));
        }
        if req.set.is_empty() {
            return Err(StoreError::InvalidRequest("no columns to update".into()));
        }
        self.pass_gate().await;

        let mut tables = self.tables.write();
        let t = tables.get_mut(relation).ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))?;
        let mut key_pos = Vec::with_capacity(req.key.len());
        let mut key_vals = Vec::with_capacity(req.key.len());
        for k in &req.key {
            key_pos.push(t.index_of(&k.column).ok_or_else(|| Self::missing_column(relation, &k.column))?);
            key_vals.push(k.value.clone());
        }
        let mut assignments = Vec::with_capacity(req.set.len());
        for s in &req.set {
            let idx = t.index_of(&s.column).ok_or_else(|| Self::missing_column(relation, &s.column))?;
            assignments.push((idx, self.normalize(relation, &t.columns[idx], &s.value)?));
        }

        let mut affected = 0u64;
        for row in t.rows.iter_mut().filter(|r| key_matches(r, &key_pos, &key_vals)) {
            for (idx, v) in &assignments {
                row[*idx] = v.clone();
            }
            affected += 1;
        }
        debug!(target: "pgbrowse::remote", "memory update {}: {} row(s)", relation, affected);
        Ok(affected)
    }

    async fn delete_rows(&self, conn: &ConnectionId, relation: &RelationRef, req: &DeleteRequest) -> StoreResult<u64> {
        self.check_conn(conn)?;
        self.record(StoreCall::DeleteRows { relation: relation.clone(), request: req.clone() })?;
        if req.key_columns.is_empty() {
            return Err(StoreError::InvalidRequest("no primary key columns".into()));
        }
        if req.tuples.is_empty() {
            return Err(StoreError::InvalidRequest("no rows to delete".into()));
        }
        if req.tuples.iter().any(|t| t.len() != req.key_columns.len()) {
            return Err(StoreError::InvalidRequest("key tuple width does not match key columns".into()));
        }
        self.pass_gate().await;

        let mut tables = self.tables.write();
        let t = tables.get_mut(relation).ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))?;
        let mut key_pos = Vec::with_capacity(req.key_columns.len());
        for k in &req.key_columns {
            key_pos.push(t.index_of(&k.name).ok_or_else(|| Self::missing_column(relation, &k.name))?);
        }
        let before = t.rows.len();
        t.rows.retain(|r| !req.tuples.iter().any(|tuple| key_matches(r, &key_pos, tuple)));
        let removed = (before - t.rows.len()) as u64;
        debug!(target: "pgbrowse::remote", "memory delete {}: {} row(s)", relation, removed);
        Ok(removed)
    }

    async fn insert_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &InsertRequest) -> StoreResult<u64> {
        self.check_conn(conn)?;
        self.record(StoreCall::InsertRow { relation: relation.clone(), request: req.clone() })?;
        if req.values.is_empty() {
            return Err(StoreError::InvalidRequest("no columns given".into()));
        }
        self.pass_gate().await;

        let mut tables = self.tables.write();
        let t = tables.get_mut(relation).ok_or_else(|| StoreError::UnknownRelation(relation.to_string()))?;
        for v in &req.values {
            if t.index_of(&v.column).is_none() {
                return Err(Self::missing_column(relation, &v.column));
            }
        }
        let mut row: Row = Vec::with_capacity(t.columns.len());
        for (idx, col) in t.columns.iter().enumerate() {
            let value = match req.values.iter().find(|v| v.column == col.name) {
                Some(v) => self.normalize(relation, col, &v.value)?,
                None => match &col.column_default {
                    Some(expr) => default_value(col, expr, &t.rows, idx),
                    None => CellValue::Null,
                },
            };
            if value.is_null() && !col.nullable {
                return Err(StoreError::Database(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    col.name, relation.table
                )));
            }
            row.push(value);
        }
        let key_pos = t.key_positions();
        if !key_pos.is_empty() {
            let key: Vec<CellValue> = key_pos.iter().map(|&p| row[p].clone()).collect();
            if t.rows.iter().any(|r| key_matches(r, &key_pos, &key)) {
                return Err(StoreError::Database(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    relation.table
                )));
            }
        }
        t.rows.push(row);
        Ok(1)
    }
}

impl MemoryStore {
    /// A small shop schema for the `--demo` CLI mode and for exercising the engine.
    ///
    /// * `public.users`: serial key, NOT NULL text, boolean with default, enum, jsonb, numeric
    /// * `public.order_items`: composite key `(order_id, line_no)`
    /// * `public.audit_log`: no primary key (read-only in the browser)
    pub fn demo() -> Self {
        let store = MemoryStore::new();
        store.define_enum("mood", &["sad", "ok", "happy"]);

        let users = RelationRef::new("public", "users");
        store.create_table(
            users.clone(),
            vec![
                ColumnMeta::new("id", "integer").primary_key().ordinal(1).with_default("nextval('users_id_seq'::regclass)"),
                ColumnMeta::new("name", "text").not_null().ordinal(2),
                ColumnMeta::new("email", "text").ordinal(3),
                ColumnMeta::new("active", "boolean").not_null().ordinal(4).with_default("true"),
                ColumnMeta::new("mood", "USER-DEFINED").with_enum("mood").ordinal(5),
                ColumnMeta::new("profile", "jsonb").ordinal(6),
                ColumnMeta::new("balance", "numeric").ordinal(7),
            ],
        );
        let people = [
            (1, "Ada", Some("ada@example.com"), true, Some("happy"), Some(serde_json::json!({"lang": "en"})), Some("10.50")),
            (2, "Brendan", None, true, Some("ok"), None, Some("0")),
            (3, "Chidi", Some("chidi@example.com"), false, None, Some(serde_json::json!({"tags": ["ethics"]})), None),
            (4, "Dana", Some(""), true, Some("sad"), None, Some("-3.25")),
            (5, "Eun-ji", Some("eunji@example.com"), true, Some("happy"), None, Some("99.99")),
        ];
        for (id, name, email, active, mood, profile, balance) in people {
            store.seed_row(
                &users,
                vec![
                    CellValue::int(id),
                    CellValue::text(name),
                    email.map(CellValue::text).unwrap_or(CellValue::Null),
                    CellValue::Bool(active),
                    mood.map(CellValue::text).unwrap_or(CellValue::Null),
                    profile.map(CellValue::Json).unwrap_or(CellValue::Null),
                    balance.map(CellValue::text).unwrap_or(CellValue::Null),
                ],
            );
        }

        let items = RelationRef::new("public", "order_items");
        store.create_table(
            items.clone(),
            vec![
                ColumnMeta::new("order_id", "integer").primary_key().ordinal(1),
                ColumnMeta::new("line_no", "integer").primary_key().ordinal(2),
                ColumnMeta::new("sku", "text").not_null().ordinal(3),
                ColumnMeta::new("qty", "integer").not_null().ordinal(4).with_default("1"),
            ],
        );
        for (order, line, sku, qty) in [(100, 1, "A-1", 2), (100, 2, "B-7", 1), (101, 1, "A-1", 5)] {
            store.seed_row(&items, vec![CellValue::int(order), CellValue::int(line), CellValue::text(sku), CellValue::int(qty)]);
        }

        let audit = RelationRef::new("public", "audit_log");
        store.create_table(
            audit.clone(),
            vec![ColumnMeta::new("at", "text").ordinal(1), ColumnMeta::new("message", "text").ordinal(2)],
        );
        store.seed_row(&audit, vec![CellValue::text("2024-01-01 09:00"), CellValue::text("store opened")]);
        store.seed_row(&audit, vec![CellValue::text("2024-01-01 09:05"), CellValue::text("first order")]);
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> RelationRef { RelationRef::new("public", "users") }

    fn col(store: &MemoryStore, name: &str) -> ColumnMeta {
        store.tables.read().get(&users()).and_then(|t| t.columns.iter().find(|c| c.name == name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn sort_puts_nulls_last_both_ways() {
        let store = MemoryStore::demo();
        let conn = store.connection();
        for dir in [SortDirection::Asc, SortDirection::Desc] {
            let req = PageRequest { page: 1, page_size: 10, sort: Some(SortSpec { column: "email".into(), direction: dir }) };
            let page = store.fetch_page(&conn, &users(), &req).await.unwrap();
            assert!(page.rows.last().unwrap()[2].is_null());
        }
    }

    #[tokio::test]
    async fn paging_reports_total() {
        let store = MemoryStore::demo();
        let req = PageRequest { page: 2, page_size: 2, sort: None };
        let page = store.fetch_page(&store.connection(), &users(), &req).await.unwrap();
        assert_eq!(page.total_rows, 5);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0][0], CellValue::int(3));
        assert_eq!(page.page_count(), 3);
    }

    #[tokio::test]
    async fn constraints_are_enforced() {
        let store = MemoryStore::demo();
        let conn = store.connection();
        let key = vec![TypedValue::new(&col(&store, "id"), CellValue::int(1))];
        let null_name = UpdateRequest { key: key.clone(), set: vec![TypedValue::new(&col(&store, "name"), CellValue::Null)] };
        let err = store.update_row(&conn, &users(), &null_name).await.unwrap_err();
        assert!(err.to_string().contains("not-null"), "{}", err);
        let bad_enum = UpdateRequest { key, set: vec![TypedValue::new(&col(&store, "mood"), CellValue::text("meh"))] };
        assert!(store.update_row(&conn, &users(), &bad_enum).await.unwrap_err().to_string().contains("enum mood"));
    }

    #[tokio::test]
    async fn insert_uses_serial_default() {
        let store = MemoryStore::demo();
        let req = InsertRequest { values: vec![TypedValue::new(&col(&store, "name"), CellValue::text("Fay"))] };
        assert_eq!(store.insert_row(&store.connection(), &users(), &req).await.unwrap(), 1);
        let row = store.find_row(&users(), &[CellValue::int(6)]).unwrap();
        assert_eq!(row[1], CellValue::text("Fay"));
        assert_eq!(row[3], CellValue::Bool(true));
    }

    #[tokio::test]
    async fn scheduled_failure_fires_once() {
        let store = MemoryStore::demo();
        let conn = store.connection();
        store.fail_nth(StoreOp::Update, 2, "boom");
        let req = |id: i64| UpdateRequest {
            key: vec![TypedValue::new(&col(&store, "id"), CellValue::int(id))],
            set: vec![TypedValue::new(&col(&store, "email"), CellValue::text("x@y"))],
        };
        assert!(store.update_row(&conn, &users(), &req(1)).await.is_ok());
        assert_eq!(store.update_row(&conn, &users(), &req(2)).await.unwrap_err().to_string(), "boom");
        assert!(store.update_row(&conn, &users(), &req(2)).await.is_ok());
        assert_eq!(store.write_calls().len(), 3);
    }

    #[tokio::test]
    async fn unknown_connection_is_rejected() {
        let store = MemoryStore::demo();
        let err = store.list_columns(&ConnectionId::new("nope"), &users()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownConnection(_)));
    }
}
