//! Export of the visible page with pending edits applied, or of a whole relation as stored.

use std::path::Path;

use serde_json::{Map, Value as JsonValue};

use crate::error::{AppError, AppResult};
use crate::overlay::PendingChangeSet;
use crate::value::CellValue;
use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self { ExportFormat::Csv => "csv", ExportFormat::Json => "json" }
    }
}

/// Cells of every page row as displayed (overlay applied), in page column order.
fn displayed_rows(view: &ViewState, overlay: &PendingChangeSet) -> Vec<Vec<CellValue>> {
    let columns = view.data.as_ref().map(|d| d.column_names()).unwrap_or_default();
    view.rows()
        .iter()
        .map(|row| {
            let key = view.keys().and_then(|k| k.key_of(row));
            let fp = key.as_ref().map(|k| &k.fingerprint);
            columns
                .iter()
                .zip(row.iter())
                .map(|(c, original)| overlay.resolve_display(fp, c, original).clone())
                .collect()
        })
        .collect()
}

pub fn render(view: &ViewState, overlay: &PendingChangeSet, format: ExportFormat) -> AppResult<String> {
    let data = view
        .data
        .as_ref()
        .ok_or_else(|| AppError::validation("nothing_loaded", "no page has been loaded"))?;
    render_rows(&data.column_names(), &displayed_rows(view, overlay), format)
}

pub fn render_rows(columns: &[String], rows: &[Vec<CellValue>], format: ExportFormat) -> AppResult<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(columns, rows)),
        ExportFormat::Json => {
            let items: Vec<JsonValue> = rows
                .iter()
                .map(|row| {
                    let mut obj = Map::new();
                    for (c, v) in columns.iter().zip(row) {
                        obj.insert(c.clone(), v.to_json());
                    }
                    JsonValue::Object(obj)
                })
                .collect();
            serde_json::to_string_pretty(&items).map_err(|e| AppError::internal("export_failed", e.to_string()))
        }
    }
}

/// RFC 4180: CRLF line ends; fields with separators, quotes or line breaks are quoted.
/// NULL is an empty unquoted field; an empty string is `""`.
pub fn to_csv(columns: &[String], rows: &[Vec<CellValue>]) -> String {
    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|v| match v {
                CellValue::Null => String::new(),
                CellValue::Text(s) if s.is_empty() => "\"\"".to_string(),
                other => csv_field(&other.edit_text()),
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn write_file(path: &Path, text: &str) -> AppResult<()> {
    std::fs::write(path, text)
        .map_err(|e| AppError::internal("export_failed", format!("could not write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, EnumDomains, RelationRef, RelationSchema};
    use crate::identity::RowKey;
    use crate::remote::{PageColumn, PageData};

    fn view() -> ViewState {
        let schema = RelationSchema::new(
            vec![ColumnMeta::new("id", "integer").primary_key().ordinal(1), ColumnMeta::new("note", "text").ordinal(2)],
            EnumDomains::new(),
        );
        let mut v = ViewState::new(RelationRef::new("public", "t"), 10);
        v.install(
            PageData {
                columns: vec![
                    PageColumn { name: "id".into(), data_type: "integer".into() },
                    PageColumn { name: "note".into(), data_type: "text".into() },
                ],
                rows: vec![
                    vec![CellValue::int(1), CellValue::text("say \"hi\", ok")],
                    vec![CellValue::int(2), CellValue::Null],
                ],
                total_rows: 2,
                page: 1,
                page_size: 10,
                elapsed_ms: 1,
            },
            &schema,
        );
        v
    }

    #[test]
    fn csv_quotes_and_applies_overlay() {
        let v = view();
        let mut overlay = PendingChangeSet::new();
        overlay.record_edit(&RowKey::new(vec![CellValue::int(2)]), "note", &CellValue::Null, CellValue::text(""));
        let csv = render(&v, &overlay, ExportFormat::Csv).unwrap();
        assert_eq!(csv, "id,note\r\n1,\"say \"\"hi\"\", ok\"\r\n2,\"\"\r\n");
        let plain = render(&v, &PendingChangeSet::new(), ExportFormat::Csv).unwrap();
        assert!(plain.ends_with("2,\r\n"));
    }

    #[test]
    fn json_keeps_types() {
        let json = render(&view(), &PendingChangeSet::new(), ExportFormat::Json).unwrap();
        let parsed: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["id"], serde_json::json!(1));
        assert!(parsed[1]["note"].is_null());
    }

    #[test]
    fn file_export_writes_text() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page.csv");
        write_file(&p, "a\r\n").unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "a\r\n");
    }
}
