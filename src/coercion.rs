//! Raw input -> tagged value, per column kind.

use crate::catalog::{ColumnKind, ColumnMeta, TypeClass};
use crate::error::{AppError, AppResult};
use crate::value::CellValue;

/// Blank means the empty string; whitespace is a legitimate text value.
pub fn is_blank(raw: &str) -> bool { raw.is_empty() }

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Coerce a raw input string for `column`.
///
/// Blank input becomes an explicit NULL only on nullable columns; on a NOT NULL column it
/// is rejected here, before any overlay state is touched. Scalar input that does not parse
/// as its declared type is kept as text and left for the remote store to judge.
pub fn coerce_input(column: &ColumnMeta, kind: &ColumnKind, raw: &str) -> AppResult<CellValue> {
    if is_blank(raw) {
        if column.nullable { return Ok(CellValue::Null); }
        return Err(AppError::validation(
            "blank_not_null".to_string(),
            format!("column '{}' does not accept empty values", column.name),
        ));
    }
    match kind {
        ColumnKind::Boolean => parse_bool(raw).map(CellValue::Bool).ok_or_else(|| {
            AppError::validation("invalid_boolean".to_string(), format!("'{}' is not a boolean value for column '{}'", raw, column.name))
        }),
        ColumnKind::Enum { domain, values } => {
            if values.iter().any(|v| v == raw) {
                Ok(CellValue::text(raw))
            } else {
                Err(AppError::validation(
                    "invalid_enum".to_string(),
                    format!("'{}' is not a value of {} (allowed: {})", raw, domain, values.join(", ")),
                ))
            }
        }
        ColumnKind::Scalar(class) => Ok(coerce_scalar(*class, raw)),
    }
}

pub fn coerce_scalar(class: TypeClass, raw: &str) -> CellValue {
    match class {
        TypeClass::Integer => raw.trim().parse::<i64>().map(CellValue::int).unwrap_or_else(|_| CellValue::text(raw)),
        TypeClass::Float => match raw.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => CellValue::float(f),
            _ => CellValue::text(raw),
        },
        TypeClass::Json => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v @ serde_json::Value::Object(_)) | Ok(v @ serde_json::Value::Array(_)) => CellValue::Json(v),
            Ok(v) => CellValue::from_json(v),
            Err(_) => CellValue::text(raw),
        },
        TypeClass::Boolean => parse_bool(raw).map(CellValue::Bool).unwrap_or_else(|| CellValue::text(raw)),
        TypeClass::Numeric | TypeClass::Text => CellValue::text(raw),
    }
}
