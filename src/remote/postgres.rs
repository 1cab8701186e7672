//! PostgreSQL remote store over tokio-postgres.
//!
//! All values travel as text parameters cast to the column's declared type
//! (`$1::integer`), so the engine never needs per-type `ToSql` impls. Identifiers are
//! always double-quoted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use native_tls::TlsConnector;
use parking_lot::RwLock;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use super::*;
use crate::catalog::{quote_ident, TypeClass};
use crate::config::ConnectionConfig;

/// Connection registry plus the CRUD primitives. Connections are opened by `connect` and
/// referenced afterwards only through their `ConnectionId`.
#[derive(Default)]
pub struct PgStore {
    clients: RwLock<HashMap<ConnectionId, Arc<Client>>>,
}

impl PgStore {
    pub fn new() -> Self { Self::default() }

    pub async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<ConnectionId> {
        let conn_str = config.connection_string();
        let id = ConnectionId::new(config.id.clone());
        let client = if config.ssl_mode {
            let (client, connection) = tokio_postgres::connect(&conn_str, tls_connector()?)
                .await
                .with_context(|| format!("could not connect to {}:{} over TLS", config.host, config.port))?;
            drive_connection(id.clone(), connection);
            client
        } else {
            let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
                .await
                .with_context(|| format!("could not connect to {}:{}", config.host, config.port))?;
            drive_connection(id.clone(), connection);
            client
        };
        self.clients.write().insert(id.clone(), Arc::new(client));
        info!(
            target: "pgbrowse::remote",
            "connected {} ({}:{}/{}{})",
            id,
            config.host,
            config.port,
            config.database_or_default(),
            if config.ssl_mode { ", tls" } else { "" }
        );
        Ok(id)
    }

    pub fn disconnect(&self, conn: &ConnectionId) -> bool {
        self.clients.write().remove(conn).is_some()
    }

    fn client(&self, conn: &ConnectionId) -> StoreResult<Arc<Client>> {
        self.clients
            .read()
            .get(conn)
            .cloned()
            .ok_or_else(|| StoreError::UnknownConnection(conn.to_string()))
    }

    async fn execute_text_params(&self, conn: &ConnectionId, sql: &str, values: Vec<Option<String>>) -> StoreResult<u64> {
        let client = self.client(conn)?;
        debug!(target: "pgbrowse::remote", "execute: {} params={}", sql, values.len());
        let param_types: Vec<Type> = vec![Type::TEXT; values.len()];
        let stmt = client.prepare_typed(sql, &param_types).await.map_err(db_error)?;
        let params: Vec<&(dyn ToSql + Sync)> = values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        client.execute(&stmt, &params).await.map_err(db_error)
    }
}

/// Render a database error with its detail, hint, position and SQLSTATE.
pub fn format_db_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = format!("ERROR: {}", db_err.message());
        if let Some(detail) = db_err.detail() { msg.push_str(&format!("\nDetail: {}", detail)); }
        if let Some(hint) = db_err.hint() { msg.push_str(&format!("\nHint: {}", hint)); }
        if let Some(position) = db_err.position() {
            match position {
                tokio_postgres::error::ErrorPosition::Original(pos) => {
                    msg.push_str(&format!("\nPosition: character {}", pos));
                }
                tokio_postgres::error::ErrorPosition::Internal { position: pos, query } => {
                    msg.push_str(&format!("\nInternal position: character {} ({})", pos, query));
                }
            }
        }
        msg.push_str(&format!("\nCode: {}", db_err.code().code()));
        msg
    } else {
        format!("connection error: {}", e)
    }
}

/// `sslmode=require` semantics: encrypt, but do not verify the server certificate.
fn tls_connector() -> anyhow::Result<MakeTlsConnector> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .context("building TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Poll the connection half in the background until it closes.
fn drive_connection<F>(id: ConnectionId, connection: F)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(target: "pgbrowse::remote", "connection {} closed with error: {}", id, e);
        }
    });
}

fn db_error(e: tokio_postgres::Error) -> StoreError { StoreError::Database(format_db_error(&e)) }

fn qualified(relation: &RelationRef) -> String {
    format!("{}.{}", quote_ident(&relation.schema), quote_ident(&relation.table))
}

/// Types decoded natively; everything else is selected as `::text`.
fn selects_natively(column: &ColumnMeta) -> bool {
    if column.enum_domain.is_some() { return false; }
    match column.type_class() {
        TypeClass::Boolean | TypeClass::Float | TypeClass::Json => true,
        // oid is unsigned on the wire; only the signed integer widths decode to i16/i32/i64
        TypeClass::Integer => matches!(column.data_type.to_ascii_lowercase().as_str(), "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8"),
        TypeClass::Numeric | TypeClass::Text => false,
    }
}

pub fn build_count_sql(relation: &RelationRef) -> String {
    format!("SELECT COUNT(*) FROM {}", qualified(relation))
}

pub fn build_select_sql(relation: &RelationRef, columns: &[ColumnMeta], req: &PageRequest) -> String {
    let select_list: Vec<String> = if columns.is_empty() {
        vec!["*".to_string()]
    } else {
        columns
            .iter()
            .map(|c| {
                let q = quote_ident(&c.name);
                if selects_natively(c) { q } else { format!("{}::text AS {}", q, q) }
            })
            .collect()
    };
    let order_clause = match &req.sort {
        Some(s) => format!(" ORDER BY {} {} NULLS LAST", quote_ident(&s.column), s.direction.sql()),
        None => String::new(),
    };
    format!(
        "SELECT {} FROM {}{} LIMIT {} OFFSET {}",
        select_list.join(", "),
        qualified(relation),
        order_clause,
        req.page_size,
        req.offset()
    )
}

/// `UPDATE .. SET` placeholders come first, key placeholders after.
pub fn build_update_sql(relation: &RelationRef, req: &UpdateRequest) -> String {
    let mut idx = 1usize;
    let mut set_clauses: Vec<String> = Vec::with_capacity(req.set.len());
    for v in &req.set {
        set_clauses.push(format!("{} = ${}::{}", quote_ident(&v.column), idx, v.wire_type));
        idx += 1;
    }
    let mut where_clauses: Vec<String> = Vec::with_capacity(req.key.len());
    for k in &req.key {
        where_clauses.push(format!("{} = ${}::{}", quote_ident(&k.column), idx, k.wire_type));
        idx += 1;
    }
    format!("UPDATE {} SET {} WHERE {}", qualified(relation), set_clauses.join(", "), where_clauses.join(" AND "))
}

/// One statement for the whole batch: `WHERE (k1, k2) IN ((..), (..))`.
pub fn build_delete_sql(relation: &RelationRef, req: &DeleteRequest) -> String {
    let width = req.key_columns.len();
    let mut idx = 1usize;
    let mut tuples: Vec<String> = Vec::with_capacity(req.tuples.len());
    for _ in &req.tuples {
        let mut parts: Vec<String> = Vec::with_capacity(width);
        for kc in &req.key_columns {
            parts.push(format!("${}::{}", idx, kc.wire_type));
            idx += 1;
        }
        tuples.push(if width == 1 { parts.remove(0) } else { format!("({})", parts.join(", ")) });
    }
    let lhs: Vec<String> = req.key_columns.iter().map(|k| quote_ident(&k.name)).collect();
    let lhs = if width == 1 { lhs.join("") } else { format!("({})", lhs.join(", ")) };
    format!("DELETE FROM {} WHERE {} IN ({})", qualified(relation), lhs, tuples.join(", "))
}

pub fn build_insert_sql(relation: &RelationRef, req: &InsertRequest) -> String {
    let cols: Vec<String> = req.values.iter().map(|v| quote_ident(&v.column)).collect();
    let placeholders: Vec<String> = req
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("${}::{}", i + 1, v.wire_type))
        .collect();
    format!("INSERT INTO {} ({}) VALUES ({})", qualified(relation), cols.join(", "), placeholders.join(", "))
}

/// A value that fails to decode is an error, never a silent NULL: a NULL key would
/// address no row.
fn decoded<T, E: std::fmt::Display>(column: &str, got: Result<Option<T>, E>, wrap: impl FnOnce(T) -> CellValue) -> StoreResult<CellValue> {
    match got {
        Ok(Some(v)) => Ok(wrap(v)),
        Ok(None) => Ok(CellValue::Null),
        Err(e) => Err(StoreError::Database(format!("could not decode column \"{}\": {}", column, e))),
    }
}

fn cell_from_pg(row: &tokio_postgres::Row, idx: usize, col: &tokio_postgres::Column) -> StoreResult<CellValue> {
    let name = col.name();
    match *col.type_() {
        Type::BOOL => decoded(name, row.try_get::<_, Option<bool>>(idx), CellValue::Bool),
        Type::INT2 => decoded(name, row.try_get::<_, Option<i16>>(idx), |v| CellValue::int(v as i64)),
        Type::INT4 => decoded(name, row.try_get::<_, Option<i32>>(idx), |v| CellValue::int(v as i64)),
        Type::INT8 => decoded(name, row.try_get::<_, Option<i64>>(idx), CellValue::int),
        Type::FLOAT4 => decoded(name, row.try_get::<_, Option<f32>>(idx), |v| CellValue::float(v as f64)),
        Type::FLOAT8 => decoded(name, row.try_get::<_, Option<f64>>(idx), CellValue::float),
        Type::JSON | Type::JSONB => decoded(name, row.try_get::<_, Option<serde_json::Value>>(idx), CellValue::from_json),
        _ => decoded(name, row.try_get::<_, Option<String>>(idx), CellValue::Text),
    }
}

fn key_params(values: &[CellValue]) -> Vec<Option<String>> { values.iter().map(|v| v.wire_text()).collect() }

#[async_trait]
impl SchemaCatalog for PgStore {
    async fn list_columns(&self, conn: &ConnectionId, relation: &RelationRef) -> StoreResult<Vec<ColumnMeta>> {
        let client = self.client(conn)?;
        let rows = client
            .query(
                "SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable = 'YES' as is_nullable,
                    c.column_default::text,
                    COALESCE(
                        (SELECT true FROM information_schema.table_constraints tc
                         JOIN information_schema.key_column_usage kcu
                            ON tc.constraint_name = kcu.constraint_name
                            AND tc.table_schema = kcu.table_schema
                         WHERE tc.constraint_type = 'PRIMARY KEY'
                            AND tc.table_schema = $1
                            AND tc.table_name = $2
                            AND kcu.column_name = c.column_name),
                        false
                    ) as is_primary_key,
                    c.ordinal_position::int,
                    c.udt_name::text,
                    c.udt_schema::text
                 FROM information_schema.columns c
                 WHERE c.table_schema = $1 AND c.table_name = $2
                 ORDER BY c.ordinal_position",
                &[&relation.schema, &relation.table],
            )
            .await
            .map_err(db_error)?;
        if rows.is_empty() {
            return Err(StoreError::UnknownRelation(relation.to_string()));
        }
        Ok(rows
            .iter()
            .map(|row| {
                let data_type: String = row.get(1);
                let udt_name: Option<String> = row.get(6);
                let enum_domain = if data_type == "USER-DEFINED" { udt_name.clone() } else { None };
                ColumnMeta {
                    name: row.get(0),
                    data_type,
                    nullable: row.get(2),
                    column_default: row.get(3),
                    is_primary_key: row.get(4),
                    ordinal_position: row.get(5),
                    udt_name,
                    udt_schema: row.get(7),
                    enum_domain,
                }
            })
            .collect())
    }
}

#[async_trait]
impl EnumCatalog for PgStore {
    async fn enum_values(&self, conn: &ConnectionId, domain: &str) -> StoreResult<Vec<String>> {
        let client = self.client(conn)?;
        let rows = client
            .query(
                "SELECT e.enumlabel::text
                 FROM pg_enum e
                 JOIN pg_type t ON e.enumtypid = t.oid
                 WHERE t.typname = $1
                 ORDER BY e.enumsortorder",
                &[&domain],
            )
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn fetch_page(&self, conn: &ConnectionId, relation: &RelationRef, req: &PageRequest) -> StoreResult<PageData> {
        let start = Instant::now();
        let columns = self.list_columns(conn, relation).await?;
        let client = self.client(conn)?;

        let count_row = client.query_one(&build_count_sql(relation), &[]).await.map_err(db_error)?;
        let total_rows: i64 = count_row.get(0);

        let data_sql = build_select_sql(relation, &columns, req);
        debug!(target: "pgbrowse::remote", "fetch: {}", data_sql);
        let rows = client.query(&data_sql, &[]).await.map_err(db_error)?;

        // Column metadata comes from the catalog so empty pages still carry it
        let page_columns: Vec<PageColumn> = columns
            .iter()
            .map(|c| PageColumn { name: c.name.clone(), data_type: c.data_type.clone() })
            .collect();
        let data: Vec<Row> = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| cell_from_pg(row, idx, col))
                    .collect::<StoreResult<Row>>()
            })
            .collect::<StoreResult<Vec<Row>>>()?;

        Ok(PageData {
            columns: page_columns,
            rows: data,
            total_rows: total_rows.max(0) as u64,
            page: req.page,
            page_size: req.page_size,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn update_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &UpdateRequest) -> StoreResult<u64> {
        if req.key.is_empty() {
            return Err(StoreError::InvalidRequest("no primary key columns".into()));
        }
        if req.set.is_empty() {
            return Err(StoreError::InvalidRequest("no columns to update".into()));
        }
        let sql = build_update_sql(relation, req);
        let values: Vec<Option<String>> = req
            .set
            .iter()
            .chain(req.key.iter())
            .map(|v| v.value.wire_text())
            .collect();
        self.execute_text_params(conn, &sql, values).await
    }

    async fn delete_rows(&self, conn: &ConnectionId, relation: &RelationRef, req: &DeleteRequest) -> StoreResult<u64> {
        if req.key_columns.is_empty() {
            return Err(StoreError::InvalidRequest("no primary key columns".into()));
        }
        if req.tuples.is_empty() {
            return Err(StoreError::InvalidRequest("no rows to delete".into()));
        }
        let mut values: Vec<Option<String>> = Vec::with_capacity(req.tuples.len() * req.key_columns.len());
        for t in &req.tuples {
            if t.len() != req.key_columns.len() {
                return Err(StoreError::InvalidRequest("key tuple width does not match key columns".into()));
            }
            values.extend(key_params(t));
        }
        let sql = build_delete_sql(relation, req);
        self.execute_text_params(conn, &sql, values).await
    }

    async fn insert_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &InsertRequest) -> StoreResult<u64> {
        if req.values.is_empty() {
            return Err(StoreError::InvalidRequest("no columns given".into()));
        }
        let sql = build_insert_sql(relation, req);
        let values: Vec<Option<String>> = req.values.iter().map(|v| v.value.wire_text()).collect();
        self.execute_text_params(conn, &sql, values).await
    }
}
