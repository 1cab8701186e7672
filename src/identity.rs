//! Row identity from primary-key values.
//!
//! A fingerprint is the length-prefixed encoding of the key values in catalog order. It is
//! injective over key tuples, so equal tuples give equal fingerprints and distinct tuples
//! never collide. It carries no ordering meaning and is never a positional index.

use std::fmt::{Display, Formatter};

use crate::catalog::{ColumnMeta, RelationSchema};
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowFingerprint(String);

impl RowFingerprint {
    pub fn from_values(values: &[CellValue]) -> Self {
        let mut out = String::new();
        for v in values {
            encode_value(v, &mut out);
        }
        RowFingerprint(out)
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for RowFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

fn encode_value(v: &CellValue, out: &mut String) {
    let (tag, body) = match v {
        CellValue::Null => ('n', String::new()),
        CellValue::Bool(b) => ('b', if *b { "1".into() } else { "0".into() }),
        CellValue::Number(n) => ('d', n.to_string()),
        CellValue::Text(s) => ('s', s.clone()),
        CellValue::Json(j) => ('j', j.to_string()),
    };
    out.push(tag);
    out.push_str(&body.len().to_string());
    out.push(':');
    out.push_str(&body);
}

/// Identity of one row: its fingerprint plus the key values it was derived from, so writes
/// can be issued without going back to the page the row came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey {
    pub fingerprint: RowFingerprint,
    pub values: Vec<CellValue>,
}

impl RowKey {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { fingerprint: RowFingerprint::from_values(&values), values }
    }
}

/// Maps page rows to their keys. Built once per fetched page.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    key_columns: Vec<ColumnMeta>,
    /// Position of each key column within the page's column list
    positions: Vec<usize>,
}

impl KeyResolver {
    /// Returns `None` (read-only) when the relation has no primary key or the page does not
    /// carry every key column.
    pub fn new(schema: &RelationSchema, page_columns: &[String]) -> Option<Self> {
        let key_columns: Vec<ColumnMeta> = schema.primary_key().into_iter().cloned().collect();
        if key_columns.is_empty() { return None; }
        let mut positions = Vec::with_capacity(key_columns.len());
        for kc in &key_columns {
            positions.push(page_columns.iter().position(|c| c == &kc.name)?);
        }
        Some(Self { key_columns, positions })
    }

    pub fn key_columns(&self) -> &[ColumnMeta] { &self.key_columns }

    pub fn key_of(&self, row: &[CellValue]) -> Option<RowKey> {
        let mut values = Vec::with_capacity(self.positions.len());
        for &p in &self.positions {
            values.push(row.get(p)?.clone());
        }
        Some(RowKey::new(values))
    }
}
