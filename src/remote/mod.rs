//! Remote store boundary: the CRUD primitives, schema catalog and enum catalog the engine
//! consumes. Every call names the connection by an opaque id; the engine holds no
//! connection state of its own.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnMeta, RelationRef};
use crate::value::{CellValue, Row};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use postgres::PgStore;

/// Opaque handle to a connection owned by an external connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self { ConnectionId(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self { SortDirection::Asc => "ASC", SortDirection::Desc => "DESC" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
    pub sort: Option<SortSpec>,
}

impl PageRequest {
    pub fn offset(&self) -> u64 { self.page.saturating_sub(1) * self.page_size }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageColumn {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub columns: Vec<PageColumn>,
    pub rows: Vec<Row>,
    pub total_rows: u64,
    pub page: u64,
    pub page_size: u64,
    /// Server-side time spent producing the page
    pub elapsed_ms: u64,
}

impl PageData {
    pub fn column_names(&self) -> Vec<String> { self.columns.iter().map(|c| c.name.clone()).collect() }

    pub fn column_index(&self, name: &str) -> Option<usize> { self.columns.iter().position(|c| c.name == name) }

    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 { return 0; }
        self.total_rows.div_ceil(self.page_size)
    }
}

/// A column name, a value, and the declared type used to cast it on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub column: String,
    pub value: CellValue,
    pub wire_type: String,
}

impl TypedValue {
    pub fn new(column: &ColumnMeta, value: CellValue) -> Self {
        Self { column: column.name.clone(), value, wire_type: column.wire_type() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub key: Vec<TypedValue>,
    pub set: Vec<TypedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    pub wire_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key_columns: Vec<KeyColumn>,
    /// One tuple per row, aligned with `key_columns`
    pub tuples: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub values: Vec<TypedValue>,
}

impl InsertRequest {
    pub fn columns(&self) -> Vec<&str> { self.values.iter().map(|v| v.column.as_str()).collect() }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection not found: {0}")]
    UnknownConnection(String),
    #[error("relation not found: {0}")]
    UnknownRelation(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Message reported by the database, already formatted for display
    #[error("{0}")]
    Database(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Full column metadata in ordinal order.
    async fn list_columns(&self, conn: &ConnectionId, relation: &RelationRef) -> StoreResult<Vec<ColumnMeta>>;
}

#[async_trait]
pub trait EnumCatalog: Send + Sync {
    /// Values of an enumerated domain in declared sort order; empty when `domain` is not an enum.
    async fn enum_values(&self, conn: &ConnectionId, domain: &str) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait RemoteStore: SchemaCatalog + EnumCatalog {
    async fn fetch_page(&self, conn: &ConnectionId, relation: &RelationRef, req: &PageRequest) -> StoreResult<PageData>;

    /// Returns the number of rows affected.
    async fn update_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &UpdateRequest) -> StoreResult<u64>;

    /// All tuples in one call; returns the number of rows actually deleted.
    async fn delete_rows(&self, conn: &ConnectionId, relation: &RelationRef, req: &DeleteRequest) -> StoreResult<u64>;

    async fn insert_row(&self, conn: &ConnectionId, relation: &RelationRef, req: &InsertRequest) -> StoreResult<u64>;
}
