//! Reconciler: flushes one kind of local mutation to the remote store.
//!
//! Saves are one `update_row` per dirty row and stop at the first failure. Deletes are a
//! single batched call. Inserts are a single call. Nothing here touches session state; the
//! caller decides what to clear from the outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{EnumDomains, RelationRef, RelationSchema};
use crate::error::{AppError, AppResult};
use crate::identity::{RowFingerprint, RowKey};
use crate::overlay::PendingRow;
use crate::remote::{ConnectionId, DeleteRequest, InsertRequest, KeyColumn, PageData, PageRequest, RemoteStore, SortSpec, TypedValue, UpdateRequest};
use crate::value::{CellValue, Row};

/// One row's update, with the exact changes it carries.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub fingerprint: RowFingerprint,
    pub sent: BTreeMap<String, CellValue>,
    pub request: UpdateRequest,
}

#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    /// Rows written, with the changes that were written
    pub applied: Vec<(RowFingerprint, BTreeMap<String, CellValue>)>,
    pub failure: Option<AppError>,
    /// Rows not attempted after the failure, excluding the failed one
    pub remaining: usize,
    /// Rows the store reported as not matched (deleted underneath us)
    pub unmatched: usize,
}

impl SaveReport {
    pub fn is_success(&self) -> bool { self.failure.is_none() }

    /// First-call failures surface as the remote error itself; later ones as a partial batch.
    pub fn error(&self) -> Option<AppError> {
        let failure = self.failure.as_ref()?;
        if self.applied.is_empty() {
            return Some(failure.clone());
        }
        Some(AppError::partial_batch(failure.message(), self.applied.len(), self.remaining))
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RemoteStore>,
    conn: ConnectionId,
    relation: RelationRef,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RemoteStore>, conn: ConnectionId, relation: RelationRef) -> Self {
        Self { store, conn, relation }
    }

    pub fn relation(&self) -> &RelationRef { &self.relation }

    /// Column metadata plus the values of every enum domain the columns reference.
    pub async fn load_schema(&self) -> AppResult<RelationSchema> {
        let columns = self.store.list_columns(&self.conn, &self.relation).await?;
        let mut schema = RelationSchema::new(columns, EnumDomains::new());
        for domain in schema.missing_enum_domains() {
            let values = self.store.enum_values(&self.conn, &domain).await?;
            debug!(target: "pgbrowse::reconcile", "enum {}: {} value(s)", domain, values.len());
            schema.enums.insert(domain, values);
        }
        Ok(schema)
    }

    pub async fn fetch(&self, req: &PageRequest) -> AppResult<PageData> {
        match self.store.fetch_page(&self.conn, &self.relation, req).await {
            Ok(page) => {
                debug!(target: "pgbrowse::reconcile", "fetched {} page {} ({} of {} rows, {} ms)", self.relation, req.page, page.rows.len(), page.total_rows, page.elapsed_ms);
                Ok(page)
            }
            Err(e) => {
                warn!(target: "pgbrowse::reconcile", "fetch {} page {} failed: {}", self.relation, req.page, e);
                Err(e.into())
            }
        }
    }

    /// Every row of the relation as stored, read `batch` rows at a time in `sort` order.
    /// Stops at the reported total or at the first short page.
    pub async fn fetch_all(&self, sort: Option<SortSpec>, batch: u64) -> AppResult<(Vec<String>, Vec<Row>)> {
        let batch = batch.max(1);
        let mut columns = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut page = 1;
        loop {
            let req = PageRequest { page, page_size: batch, sort: sort.clone() };
            let data = self.fetch(&req).await?;
            if columns.is_empty() {
                columns = data.column_names();
            }
            let got = data.rows.len() as u64;
            rows.extend(data.rows);
            if got < batch || rows.len() as u64 >= data.total_rows {
                break;
            }
            page += 1;
        }
        info!(target: "pgbrowse::reconcile", "read all of {}: {} row(s) in {} page(s)", self.relation, rows.len(), page);
        Ok((columns, rows))
    }

    /// Turn dirty rows into update requests. Fails locally if a change names a column the
    /// relation does not have, or the relation has no primary key.
    pub fn plan_save<'a>(&self, schema: &RelationSchema, rows: impl IntoIterator<Item = &'a PendingRow>) -> AppResult<Vec<PlannedUpdate>> {
        let key_columns = schema.primary_key();
        if key_columns.is_empty() {
            return Err(AppError::validation("read_only", format!("{} has no primary key", self.relation)));
        }
        let mut plans = Vec::new();
        for row in rows {
            if row.key.values.len() != key_columns.len() {
                return Err(AppError::internal("key_width", format!("row {} has {} key value(s), expected {}", row.key.fingerprint, row.key.values.len(), key_columns.len())));
            }
            let key = key_columns.iter().zip(&row.key.values).map(|(c, v)| TypedValue::new(c, v.clone())).collect();
            let mut set = Vec::with_capacity(row.changes.len());
            for (name, value) in &row.changes {
                let column = schema
                    .column(name)
                    .ok_or_else(|| AppError::validation("unknown_column", format!("column '{}' does not exist", name)))?;
                set.push(TypedValue::new(column, value.clone()));
            }
            plans.push(PlannedUpdate { fingerprint: row.key.fingerprint.clone(), sent: row.changes.clone(), request: UpdateRequest { key, set } });
        }
        Ok(plans)
    }

    /// Issue the planned updates one by one, stopping at the first failure.
    pub async fn save(&self, plans: Vec<PlannedUpdate>) -> SaveReport {
        let total = plans.len();
        let mut report = SaveReport::default();
        for (i, plan) in plans.into_iter().enumerate() {
            match self.store.update_row(&self.conn, &self.relation, &plan.request).await {
                Ok(affected) => {
                    if affected == 0 {
                        report.unmatched += 1;
                        warn!(target: "pgbrowse::reconcile", "update of {} row {} matched no rows", self.relation, plan.fingerprint);
                    }
                    report.applied.push((plan.fingerprint, plan.sent));
                }
                Err(e) => {
                    warn!(target: "pgbrowse::reconcile", "update of {} row {} failed after {} of {}: {}", self.relation, plan.fingerprint, i, total, e);
                    report.failure = Some(e.into());
                    report.remaining = total - i - 1;
                    break;
                }
            }
        }
        if report.is_success() {
            info!(target: "pgbrowse::reconcile", "saved {} row(s) of {}", report.applied.len(), self.relation);
        }
        report
    }

    /// Delete every key in one call; returns the count the store reports.
    pub async fn delete(&self, schema: &RelationSchema, keys: &[RowKey]) -> AppResult<u64> {
        if keys.is_empty() {
            return Err(AppError::validation("empty_selection", "no rows selected"));
        }
        let key_columns: Vec<KeyColumn> = schema
            .primary_key()
            .into_iter()
            .map(|c| KeyColumn { name: c.name.clone(), wire_type: c.wire_type() })
            .collect();
        if key_columns.is_empty() {
            return Err(AppError::validation("read_only", format!("{} has no primary key", self.relation)));
        }
        let req = DeleteRequest { key_columns, tuples: keys.iter().map(|k| k.values.clone()).collect() };
        match self.store.delete_rows(&self.conn, &self.relation, &req).await {
            Ok(n) => {
                info!(target: "pgbrowse::reconcile", "deleted {} of {} requested row(s) from {}", n, keys.len(), self.relation);
                Ok(n)
            }
            Err(e) => {
                warn!(target: "pgbrowse::reconcile", "delete from {} failed: {}", self.relation, e);
                Err(e.into())
            }
        }
    }

    pub async fn insert(&self, req: &InsertRequest) -> AppResult<u64> {
        match self.store.insert_row(&self.conn, &self.relation, req).await {
            Ok(n) => {
                info!(target: "pgbrowse::reconcile", "inserted into {} ({})", self.relation, req.columns().join(", "));
                Ok(n)
            }
            Err(e) => {
                warn!(target: "pgbrowse::reconcile", "insert into {} failed: {}", self.relation, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnMeta;
    use crate::overlay::PendingChangeSet;
    use crate::remote::{MemoryStore, StoreCall, StoreOp};

    fn setup() -> (Arc<MemoryStore>, Reconciler) {
        let store = Arc::new(MemoryStore::demo());
        let rec = Reconciler::new(store.clone(), store.connection(), RelationRef::new("public", "users"));
        (store, rec)
    }

    #[tokio::test]
    async fn schema_load_resolves_enums() {
        let (_, rec) = setup();
        let schema = rec.load_schema().await.unwrap();
        assert!(schema.missing_enum_domains().is_empty());
        assert_eq!(schema.enums.get("mood").map(|v| v.len()), Some(3));
    }

    #[tokio::test]
    async fn plan_uses_catalog_types() {
        let (_, rec) = setup();
        let schema = rec.load_schema().await.unwrap();
        let mut overlay = PendingChangeSet::new();
        let key = RowKey::new(vec![CellValue::int(1)]);
        overlay.record_edit(&key, "mood", &CellValue::text("happy"), CellValue::text("sad"));
        let plans = rec.plan_save(&schema, overlay.rows()).unwrap();
        assert_eq!(plans.len(), 1);
        let req = &plans[0].request;
        assert_eq!(req.key[0].wire_type, "integer");
        assert_eq!(req.set[0].wire_type, "\"mood\"");
    }

    #[tokio::test]
    async fn save_stops_at_first_failure() {
        let (store, rec) = setup();
        let schema = rec.load_schema().await.unwrap();
        let mut overlay = PendingChangeSet::new();
        for id in 1..=3 {
            overlay.record_edit(&RowKey::new(vec![CellValue::int(id)]), "email", &CellValue::Null, CellValue::text("z@z"));
        }
        store.fail_nth(StoreOp::Update, 2, "ERROR: check violation");
        let report = rec.save(rec.plan_save(&schema, overlay.rows()).unwrap()).await;
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.remaining, 1);
        match report.error().unwrap() {
            AppError::PartialBatch { applied, failed, remaining, message, .. } => {
                assert_eq!((applied, failed, remaining), (1, 1, 1));
                assert_eq!(message, "ERROR: check violation");
            }
            other => panic!("unexpected {:?}", other),
        }
        let updates = store.write_calls().into_iter().filter(|c| matches!(c, StoreCall::UpdateRow { .. })).count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn first_failure_is_plain_remote_error() {
        let (store, rec) = setup();
        let schema = rec.load_schema().await.unwrap();
        let mut overlay = PendingChangeSet::new();
        overlay.record_edit(&RowKey::new(vec![CellValue::int(1)]), "email", &CellValue::Null, CellValue::text("z@z"));
        store.fail_next(StoreOp::Update, "permission denied");
        let report = rec.save(rec.plan_save(&schema, overlay.rows()).unwrap()).await;
        let err = report.error().unwrap();
        assert_eq!(err.code_str(), "remote_error");
        assert_eq!(err.message(), "permission denied");
    }

    #[test]
    fn plan_rejects_keyless_relation() {
        let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());
        let rec = Reconciler::new(store, ConnectionId::new("memory"), RelationRef::new("public", "log"));
        let schema = RelationSchema::new(vec![ColumnMeta::new("msg", "text")], EnumDomains::new());
        assert_eq!(rec.plan_save(&schema, std::iter::empty()).unwrap_err().code_str(), "read_only");
    }

    #[tokio::test]
    async fn fetch_all_reads_every_page() {
        let (store, rec) = setup();
        store.clear_calls();
        let sort = Some(SortSpec { column: "id".into(), direction: crate::remote::SortDirection::Desc });
        let (columns, rows) = rec.fetch_all(sort, 2).await.unwrap();
        assert_eq!(columns[0], "id");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0][0], CellValue::int(5));
        assert_eq!(rows[4][0], CellValue::int(1));
        let pages = store.calls().into_iter().filter(|c| matches!(c, StoreCall::FetchPage { .. })).count();
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn fetch_all_surfaces_a_failed_page() {
        let (store, rec) = setup();
        store.fail_nth(StoreOp::FetchPage, 2, "connection reset");
        let err = rec.fetch_all(None, 2).await.unwrap_err();
        assert_eq!(err.code_str(), "remote_error");
    }
}
