//! New-row draft: raw input per column, turned into an insert on save.

use std::collections::BTreeMap;

use crate::catalog::RelationSchema;
use crate::coercion::{coerce_input, is_blank};
use crate::error::{AppError, AppResult};
use crate::remote::{InsertRequest, TypedValue};
use crate::value::CellValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRowDraft {
    values: BTreeMap<String, String>,
}

impl NewRowDraft {
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, column: &str, raw: impl Into<String>) {
        self.values.insert(column.to_string(), raw.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> { self.values.get(column).map(|s| s.as_str()) }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Build the insert. Per column in catalog order:
    /// non-blank input is coerced and sent; blank input on a nullable column is sent as an
    /// explicit NULL; blank input on a NOT NULL column is omitted so the remote default (if
    /// any) applies. A draft with no qualifying column fails locally.
    pub fn build_insert(&self, schema: &RelationSchema) -> AppResult<InsertRequest> {
        for name in self.values.keys() {
            if schema.column(name).is_none() {
                return Err(AppError::validation("unknown_column", format!("column '{}' does not exist", name)));
            }
        }
        let mut values = Vec::new();
        for column in &schema.columns {
            let raw = self.values.get(&column.name).map(|s| s.as_str()).unwrap_or("");
            if is_blank(raw) {
                if column.nullable {
                    values.push(TypedValue::new(column, CellValue::Null));
                }
                continue;
            }
            let value = coerce_input(column, &schema.kind(column), raw)?;
            values.push(TypedValue::new(column, value));
        }
        if values.is_empty() {
            return Err(AppError::validation("empty_insert", "new row has no values to insert"));
        }
        Ok(InsertRequest { values })
    }
}
