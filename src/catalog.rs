//! Column metadata for a relation, as supplied by the schema and enum catalogs.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA: &str = "public";

/// Schema-qualified relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRef {
    pub schema: String,
    pub table: String,
}

impl RelationRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self { schema: schema.into(), table: table.into() }
    }

    /// Parse `schema.table` or a bare `table` (falls back to `default_schema`).
    pub fn parse(ident: &str, default_schema: &str) -> Self {
        let s = ident.trim();
        match s.split_once('.') {
            Some((sch, t)) if !sch.is_empty() && !t.is_empty() => Self::new(sch, t),
            _ => Self::new(default_schema, s),
        }
    }
}

impl Display for RelationRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type as reported by the catalog (e.g. `integer`, `text`, `USER-DEFINED`)
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: i32,
    pub column_default: Option<String>,
    /// Underlying type name (`udt_name`), used for casts of user-defined and array types
    pub udt_name: Option<String>,
    /// Schema of `udt_name` (`udt_schema`); casts are qualified with it when known
    #[serde(default)]
    pub udt_schema: Option<String>,
    /// Enumerated domain name when the column is a user-defined enum type
    pub enum_domain: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            ordinal_position: 0,
            column_default: None,
            udt_name: None,
            udt_schema: None,
            enum_domain: None,
        }
    }

    /// Primary-key columns are implicitly NOT NULL.
    pub fn primary_key(mut self) -> Self { self.is_primary_key = true; self.nullable = false; self }
    pub fn not_null(mut self) -> Self { self.nullable = false; self }
    pub fn ordinal(mut self, pos: i32) -> Self { self.ordinal_position = pos; self }
    pub fn with_default(mut self, expr: impl Into<String>) -> Self { self.column_default = Some(expr.into()); self }
    pub fn with_enum(mut self, domain: impl Into<String>) -> Self {
        let d = domain.into();
        self.udt_name = Some(d.clone());
        self.enum_domain = Some(d);
        self
    }
    pub fn type_schema(mut self, schema: impl Into<String>) -> Self { self.udt_schema = Some(schema.into()); self }

    pub fn has_default(&self) -> bool { self.column_default.is_some() }

    /// Type name used to cast text parameters on the wire.
    pub fn wire_type(&self) -> String {
        let dt = self.data_type.as_str();
        if dt.eq_ignore_ascii_case("USER-DEFINED") || dt.eq_ignore_ascii_case("ARRAY") {
            if let Some(udt) = &self.udt_name {
                return match &self.udt_schema {
                    Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(udt)),
                    None => quote_ident(udt),
                };
            }
        }
        self.data_type.clone()
    }

    pub fn type_class(&self) -> TypeClass {
        if self.enum_domain.is_some() { return TypeClass::Text; }
        TypeClass::of(&self.data_type)
    }
}

/// Coarse classification of a declared type, used for input coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Boolean,
    Integer,
    Float,
    /// Arbitrary precision; kept as text to avoid rounding
    Numeric,
    Json,
    Text,
}

impl TypeClass {
    /// Accepts both information_schema names (`integer`) and pg_type names (`int4`).
    pub fn of(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => TypeClass::Boolean,
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "smallserial" | "serial" | "bigserial" | "oid" => TypeClass::Integer,
            "real" | "double precision" | "float4" | "float8" => TypeClass::Float,
            "numeric" | "decimal" | "money" => TypeClass::Numeric,
            "json" | "jsonb" => TypeClass::Json,
            _ => TypeClass::Text,
        }
    }
}

/// How a column is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Commits on selection change
    Boolean,
    /// Commits on selection change; input must be one of `values`
    Enum { domain: String, values: Vec<String> },
    /// Free text; commits on explicit confirm
    Scalar(TypeClass),
}

impl ColumnKind {
    pub fn commits_immediately(&self) -> bool { !matches!(self, ColumnKind::Scalar(_)) }
}

/// Enum domain name -> allowed values, in declared sort order.
pub type EnumDomains = HashMap<String, Vec<String>>;

/// Column metadata of one relation plus the enum domains its columns reference.
#[derive(Debug, Clone, Default)]
pub struct RelationSchema {
    pub columns: Vec<ColumnMeta>,
    pub enums: EnumDomains,
}

impl RelationSchema {
    pub fn new(mut columns: Vec<ColumnMeta>, enums: EnumDomains) -> Self {
        // Catalog order is ordinal order; a stable sort keeps declaration order for ties
        columns.sort_by_key(|c| c.ordinal_position);
        Self { columns, enums }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key columns in catalog order.
    pub fn primary_key(&self) -> Vec<&ColumnMeta> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Relations without a primary key cannot be edited or deleted from.
    pub fn is_read_only(&self) -> bool { !self.columns.iter().any(|c| c.is_primary_key) }

    /// Enum domains referenced by columns but not yet resolved.
    pub fn missing_enum_domains(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for c in &self.columns {
            if let Some(d) = &c.enum_domain {
                if !self.enums.contains_key(d) && !out.contains(d) { out.push(d.clone()); }
            }
        }
        out
    }

    pub fn kind(&self, column: &ColumnMeta) -> ColumnKind {
        if let Some(domain) = &column.enum_domain {
            // A user-defined type with no labels (composite, range) is edited as text
            if let Some(values) = self.enums.get(domain).filter(|v| !v.is_empty()) {
                return ColumnKind::Enum { domain: domain.clone(), values: values.clone() };
            }
            return ColumnKind::Scalar(TypeClass::Text);
        }
        match column.type_class() {
            TypeClass::Boolean => ColumnKind::Boolean,
            other => ColumnKind::Scalar(other),
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RelationSchema {
        let mut enums = EnumDomains::new();
        enums.insert("mood".into(), vec!["sad".into(), "ok".into(), "happy".into()]);
        RelationSchema::new(
            vec![
                ColumnMeta::new("note", "text").ordinal(4),
                ColumnMeta::new("id", "integer").primary_key().ordinal(1),
                ColumnMeta::new("active", "boolean").ordinal(2),
                ColumnMeta::new("mood", "USER-DEFINED").with_enum("mood").ordinal(3),
                ColumnMeta::new("shape", "USER-DEFINED").with_enum("point3").ordinal(5),
            ],
            enums,
        )
    }

    #[test]
    fn columns_follow_ordinal_order() {
        let s = schema();
        let names: Vec<&str> = s.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "active", "mood", "note", "shape"]);
        assert_eq!(s.primary_key().len(), 1);
        assert!(!s.is_read_only());
    }

    #[test]
    fn kinds_are_resolved() {
        let s = schema();
        assert_eq!(s.kind(s.column("active").unwrap()), ColumnKind::Boolean);
        assert!(matches!(s.kind(s.column("mood").unwrap()), ColumnKind::Enum { ref values, .. } if values.len() == 3));
        assert_eq!(s.kind(s.column("id").unwrap()), ColumnKind::Scalar(TypeClass::Integer));
        assert_eq!(s.kind(s.column("shape").unwrap()), ColumnKind::Scalar(TypeClass::Text));
        assert_eq!(s.missing_enum_domains(), vec!["point3".to_string()]);
    }

    #[test]
    fn wire_type_quotes_user_defined() {
        let s = schema();
        assert_eq!(s.column("mood").unwrap().wire_type(), "\"mood\"");
        assert_eq!(s.column("id").unwrap().wire_type(), "integer");
        let qualified = ColumnMeta::new("mood", "USER-DEFINED").with_enum("mood").type_schema("sales");
        assert_eq!(qualified.wire_type(), "\"sales\".\"mood\"");
        let tags = ColumnMeta { udt_name: Some("_text".into()), ..ColumnMeta::new("tags", "ARRAY") }.type_schema("pg_catalog");
        assert_eq!(tags.wire_type(), "\"pg_catalog\".\"_text\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn relation_parse() {
        assert_eq!(RelationRef::parse("sales.orders", "public"), RelationRef::new("sales", "orders"));
        assert_eq!(RelationRef::parse("orders", "public"), RelationRef::new("public", "orders"));
        assert_eq!(RelationRef::new("a", "b").to_string(), "a.b");
    }
}
