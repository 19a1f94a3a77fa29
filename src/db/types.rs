//! Generic value model for schema-unknown result sets.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. The driver layer classifies every column once into a [`TypeCategory`]
//!    and scans each cell into a [`ScanSlot`], its best-effort native form.
//! 2. [`ScanSlot::normalize`] turns slots into [`Value`]s using one rule
//!    table, independent of the driver.
//!
//! This keeps driver specifics in the `mysql` submodule and makes the
//! normalization rules testable without a server.

use crate::error::DbResult;
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Cow;
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for a driver-reported column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    UnsignedInteger,
    Float,
    Decimal,
    Boolean,
    Text,
    Temporal,
    Json,
    Binary,
    Null,
}

impl TypeCategory {
    /// Whether byte-sequence values of this category represent text.
    pub fn is_textual(self) -> bool {
        !matches!(self, Self::Binary)
    }
}

/// Classify a MySQL type name (as reported by the driver) into a category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let upper = type_name.to_ascii_uppercase();

    if upper == "NULL" {
        return TypeCategory::Null;
    }

    // TINYINT(1) is reported as BOOLEAN
    if upper == "BOOLEAN" || upper == "BOOL" {
        return TypeCategory::Boolean;
    }

    // Binary before integers: GEOMETRY subtypes like POINT contain "INT"
    if upper.contains("BLOB")
        || upper.contains("BINARY")
        || upper == "BIT"
        || upper == "GEOMETRY"
        || upper == "POINT"
    {
        return TypeCategory::Binary;
    }

    if upper.contains("DECIMAL") || upper.contains("NUMERIC") {
        return TypeCategory::Decimal;
    }

    if upper.contains("FLOAT") || upper.contains("DOUBLE") || upper == "REAL" {
        return TypeCategory::Float;
    }

    if upper.contains("INT") {
        if upper.contains("UNSIGNED") {
            return TypeCategory::UnsignedInteger;
        }
        return TypeCategory::Integer;
    }

    if upper == "YEAR" {
        return TypeCategory::Integer;
    }

    if matches!(upper.as_str(), "DATE" | "TIME" | "DATETIME" | "TIMESTAMP") {
        return TypeCategory::Temporal;
    }

    if upper == "JSON" {
        return TypeCategory::Json;
    }

    // VARCHAR, CHAR, TEXT, ENUM, SET and anything unknown
    TypeCategory::Text
}

// =============================================================================
// Scanned rows
// =============================================================================

/// Metadata for one result column, computed once per result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub category: TypeCategory,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            category: categorize_type(&type_name),
            type_name,
        }
    }
}

/// A cell as the driver handed it over, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanSlot {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl ScanSlot {
    /// Apply the normalization rules for a column of the given category.
    ///
    /// Byte sequences of textual categories become strings; binary ones stay
    /// raw. Numbers, booleans and NULL pass through unchanged.
    pub fn normalize(self, category: TypeCategory) -> Value {
        match self {
            ScanSlot::Null => Value::Null,
            ScanSlot::Int(v) => Value::Int(v),
            ScanSlot::UInt(v) => Value::UInt(v),
            ScanSlot::Float(v) => Value::Float(v),
            ScanSlot::Bool(v) => Value::Bool(v),
            ScanSlot::Bytes(bytes) if category.is_textual() => match String::from_utf8(bytes) {
                Ok(s) => Value::Text(s),
                Err(e) => Value::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            },
            ScanSlot::Bytes(bytes) => Value::Bytes(bytes),
        }
    }
}

/// One row from a cursor: shared column metadata plus one slot per column.
#[derive(Debug, Clone)]
pub struct ScannedRow {
    pub columns: Arc<[ColumnInfo]>,
    pub slots: Vec<ScanSlot>,
}

// =============================================================================
// Decoded values
// =============================================================================

/// A decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    /// Unsigned integers that may not fit in `i64`
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the type name of this value for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            // JSON has no NaN or infinity
            Value::Float(v) if !v.is_finite() => serializer.serialize_str(&v.to_string()),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&STANDARD.encode(b)),
            Value::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

/// A decoded row: column names in result order mapped to values.
///
/// Column names are shared between all rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl JsonSchema for Row {
    fn schema_name() -> Cow<'static, str> {
        "Row".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "object",
            "description": "Column name to value, in result column order. Binary values are base64 encoded.",
            "additionalProperties": true
        })
    }
}

// =============================================================================
// MySQL scanning
// =============================================================================

pub(crate) mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};

    /// Column metadata for a MySQL row.
    pub fn column_info(row: &MySqlRow) -> Arc<[ColumnInfo]> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect()
    }

    /// Scan every column of `row` into a slot.
    ///
    /// Statements are sent without arguments, so values arrive in the text
    /// protocol and unchecked decoding is sound for the category chosen.
    pub fn scan_row(row: &MySqlRow, columns: Arc<[ColumnInfo]>) -> DbResult<ScannedRow> {
        let slots = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| scan_column(row, idx, col.category))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(ScannedRow { columns, slots })
    }

    fn scan_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> DbResult<ScanSlot> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(ScanSlot::Null);
        }

        let slot = match category {
            TypeCategory::Null => ScanSlot::Null,
            TypeCategory::Integer => ScanSlot::Int(row.try_get_unchecked::<i64, _>(idx)?),
            TypeCategory::UnsignedInteger => {
                ScanSlot::UInt(row.try_get_unchecked::<u64, _>(idx)?)
            }
            TypeCategory::Float => ScanSlot::Float(row.try_get_unchecked::<f64, _>(idx)?),
            TypeCategory::Boolean => ScanSlot::Bool(row.try_get_unchecked::<bool, _>(idx)?),
            // DECIMAL stays textual to keep its exact representation
            TypeCategory::Decimal
            | TypeCategory::Text
            | TypeCategory::Temporal
            | TypeCategory::Json
            | TypeCategory::Binary => ScanSlot::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        };
        Ok(slot)
    }
}
