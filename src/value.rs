//! Tagged cell values.
//! Values stay typed from fetch to write; they only become text at the SQL parameter
//! boundary, so an empty string and NULL never collapse into each other.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One fetched row, aligned positionally with the page's column list.
pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    /// Raw structured value (json/jsonb, arrays)
    Json(JsonValue),
}

impl Default for CellValue {
    fn default() -> Self { CellValue::Null }
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self { CellValue::Text(s.into()) }

    pub fn int(v: i64) -> Self { CellValue::Number(v.into()) }

    /// Non-finite floats have no JSON representation and map to NULL.
    pub fn float(v: f64) -> Self {
        serde_json::Number::from_f64(v).map(CellValue::Number).unwrap_or(CellValue::Null)
    }

    pub fn is_null(&self) -> bool { matches!(self, CellValue::Null) }

    pub fn from_json(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => CellValue::Null,
            JsonValue::Bool(b) => CellValue::Bool(b),
            JsonValue::Number(n) => CellValue::Number(n),
            JsonValue::String(s) => CellValue::Text(s),
            other => CellValue::Json(other),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            CellValue::Null => JsonValue::Null,
            CellValue::Bool(b) => JsonValue::Bool(*b),
            CellValue::Number(n) => JsonValue::Number(n.clone()),
            CellValue::Text(s) => JsonValue::String(s.clone()),
            CellValue::Json(v) => v.clone(),
        }
    }

    /// Text shown in a grid cell. NULL renders as the `NULL` sentinel.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            other => other.edit_text(),
        }
    }

    /// Text placed into an editor when a cell edit starts. NULL starts as an empty buffer.
    pub fn edit_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Json(v) => v.to_string(),
        }
    }

    /// Parameter text for the remote store; `None` is SQL NULL.
    pub fn wire_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            other => Some(other.edit_text()),
        }
    }

    /// Structural equality that tolerates the text/number and text/json encodings the same
    /// value can arrive in (e.g. `numeric` fetched as text, compared with a parsed edit).
    pub fn equivalent(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Null, _) | (_, CellValue::Null) => false,
            (CellValue::Number(a), CellValue::Number(b)) => numbers_equal(a, b),
            (CellValue::Number(n), CellValue::Text(t)) | (CellValue::Text(t), CellValue::Number(n)) => {
                match t.trim().parse::<f64>() {
                    Ok(f) => n.as_f64().map(|x| x == f).unwrap_or(false),
                    Err(_) => false,
                }
            }
            (CellValue::Json(j), CellValue::Text(t)) | (CellValue::Text(t), CellValue::Json(j)) => {
                serde_json::from_str::<JsonValue>(t).map(|p| &p == j).unwrap_or(false)
            }
            (CellValue::Bool(b), CellValue::Text(t)) | (CellValue::Text(t), CellValue::Bool(b)) => {
                crate::coercion::parse_bool(t) == Some(*b)
            }
            (a, b) => a == b,
        }
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) { return x == y; }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl From<JsonValue> for CellValue {
    fn from(v: JsonValue) -> Self { CellValue::from_json(v) }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self { CellValue::Text(s.to_string()) }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self { CellValue::int(v) }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self { CellValue::Bool(v) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_empty_text_are_distinct() {
        assert!(!CellValue::Null.equivalent(&CellValue::text("")));
        assert_eq!(CellValue::Null.wire_text(), None);
        assert_eq!(CellValue::text("").wire_text(), Some(String::new()));
        assert_eq!(CellValue::Null.display_text(), "NULL");
        assert_eq!(CellValue::Null.edit_text(), "");
    }

    #[test]
    fn numeric_text_cross_compare() {
        assert!(CellValue::int(1).equivalent(&CellValue::text("1")));
        assert!(CellValue::text("1.50").equivalent(&CellValue::float(1.5)));
        assert!(!CellValue::int(1).equivalent(&CellValue::text("one")));
        assert!(CellValue::int(3).equivalent(&CellValue::float(3.0)));
    }

    #[test]
    fn json_and_bool_cross_compare() {
        let j = CellValue::Json(json!({"a": 1}));
        assert!(j.equivalent(&CellValue::text("{\"a\": 1}")));
        assert!(CellValue::Bool(true).equivalent(&CellValue::text("t")));
        assert!(!CellValue::Bool(true).equivalent(&CellValue::text("false")));
    }

    #[test]
    fn from_json_keeps_structure() {
        assert_eq!(CellValue::from_json(json!([1, 2])), CellValue::Json(json!([1, 2])));
        assert_eq!(CellValue::from_json(json!("x")), CellValue::text("x"));
        assert_eq!(CellValue::from_json(json!(null)), CellValue::Null);
        assert_eq!(CellValue::float(f64::NAN), CellValue::Null);
    }
}
