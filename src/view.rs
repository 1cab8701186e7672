//! View state: which slice of which relation is on screen.

use crate::catalog::{RelationRef, RelationSchema};
use crate::error::{AppError, AppResult};
use crate::identity::{KeyResolver, RowFingerprint, RowKey};
use crate::remote::{PageData, PageRequest, SortSpec};
use crate::value::{CellValue, Row};

#[derive(Debug, Clone)]
pub struct ViewState {
    pub relation: RelationRef,
    /// 1-based
    pub page: u64,
    pub page_size: u64,
    pub sort: Option<SortSpec>,
    pub data: Option<PageData>,
    keys: Option<KeyResolver>,
    /// Bumped on every page, sort or relation change
    pub epoch: u64,
    /// Last read failure; the previous page stays visible
    pub last_error: Option<AppError>,
}

impl ViewState {
    pub fn new(relation: RelationRef, page_size: u64) -> Self {
        Self { relation, page: 1, page_size: page_size.max(1), sort: None, data: None, keys: None, epoch: 0, last_error: None }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest { page: self.page, page_size: self.page_size, sort: self.sort.clone() }
    }

    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Install a fetched page and rebuild row identity for it.
    pub fn install(&mut self, page: PageData, schema: &RelationSchema) {
        self.keys = KeyResolver::new(schema, &page.column_names());
        self.data = Some(page);
        self.last_error = None;
    }

    /// Forget the page entirely (relation switch).
    pub fn clear_data(&mut self) {
        self.data = None;
        self.keys = None;
    }

    pub fn keys(&self) -> Option<&KeyResolver> { self.keys.as_ref() }

    pub fn rows(&self) -> &[Row] { self.data.as_ref().map(|d| d.rows.as_slice()).unwrap_or(&[]) }

    pub fn row(&self, index: usize) -> AppResult<&Row> {
        self.rows()
            .get(index)
            .ok_or_else(|| AppError::not_found("no_row", format!("row {} is not on the current page", index)))
    }

    pub fn column_index(&self, column: &str) -> AppResult<usize> {
        self.data
            .as_ref()
            .and_then(|d| d.column_index(column))
            .ok_or_else(|| AppError::not_found("no_column", format!("column '{}' is not on the current page", column)))
    }

    pub fn cell(&self, index: usize, column: &str) -> AppResult<&CellValue> {
        let ci = self.column_index(column)?;
        let row = self.row(index)?;
        row.get(ci).ok_or_else(|| AppError::internal("short_row", format!("row {} has no cell for '{}'", index, column)))
    }

    /// Key of a page row; `None` when the relation is read-only.
    pub fn key_of(&self, index: usize) -> AppResult<Option<RowKey>> {
        let row = self.row(index)?;
        Ok(self.keys.as_ref().and_then(|k| k.key_of(row)))
    }

    /// Page position of the row with this fingerprint, if it is still on the page.
    pub fn position_of(&self, fp: &RowFingerprint) -> Option<usize> {
        let keys = self.keys.as_ref()?;
        self.rows().iter().position(|r| keys.key_of(r).map(|k| &k.fingerprint == fp).unwrap_or(false))
    }

    /// Keys of every row on the page (empty when read-only).
    pub fn page_keys(&self) -> Vec<RowKey> {
        match &self.keys {
            Some(k) => self.rows().iter().filter_map(|r| k.key_of(r)).collect(),
            None => Vec::new(),
        }
    }

    pub fn page_count(&self) -> u64 { self.data.as_ref().map(|d| d.page_count()).unwrap_or(0) }

    pub fn total_rows(&self) -> u64 { self.data.as_ref().map(|d| d.total_rows).unwrap_or(0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, EnumDomains};
    use crate::remote::PageColumn;

    fn page() -> PageData {
        PageData {
            columns: vec![
                PageColumn { name: "id".into(), data_type: "integer".into() },
                PageColumn { name: "name".into(), data_type: "text".into() },
            ],
            rows: vec![vec![CellValue::int(1), CellValue::text("a")], vec![CellValue::int(2), CellValue::Null]],
            total_rows: 12,
            page: 1,
            page_size: 5,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn install_builds_keys_and_lookups() {
        let schema = RelationSchema::new(
            vec![ColumnMeta::new("id", "integer").primary_key().ordinal(1), ColumnMeta::new("name", "text").ordinal(2)],
            EnumDomains::new(),
        );
        let mut v = ViewState::new(RelationRef::new("public", "t"), 5);
        v.install(page(), &schema);
        assert_eq!(v.page_count(), 3);
        assert_eq!(v.cell(1, "name").unwrap(), &CellValue::Null);
        assert_eq!(v.key_of(0).unwrap().unwrap().values, vec![CellValue::int(1)]);
        assert_eq!(v.page_keys().len(), 2);
        assert_eq!(v.row(9).unwrap_err().code_str(), "no_row");
        assert_eq!(v.column_index("nope").unwrap_err().code_str(), "no_column");
    }

    #[test]
    fn read_only_page_has_no_keys() {
        let schema = RelationSchema::new(vec![ColumnMeta::new("id", "integer")], EnumDomains::new());
        let mut v = ViewState::new(RelationRef::new("public", "t"), 5);
        v.install(page(), &schema);
        assert!(v.key_of(0).unwrap().is_none());
        assert!(v.page_keys().is_empty());
    }
}
