//! Core types for hex-cell grids.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::HexCell;

/// Name of the primary key column of every grid table.
pub const KEY_COLUMN: &str = "h3index";

/// Runtime value type of a grid column, as produced by the converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
            DataType::Text => "text",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value, kept in its source dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum GridValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
}

impl GridValue {
    pub fn dtype(&self) -> DataType {
        match self {
            GridValue::Bool(_) => DataType::Bool,
            GridValue::U8(_) => DataType::U8,
            GridValue::U16(_) => DataType::U16,
            GridValue::U32(_) => DataType::U32,
            GridValue::U64(_) => DataType::U64,
            GridValue::I8(_) => DataType::I8,
            GridValue::I16(_) => DataType::I16,
            GridValue::I32(_) => DataType::I32,
            GridValue::I64(_) => DataType::I64,
            GridValue::F32(_) => DataType::F32,
            GridValue::F64(_) => DataType::F64,
            GridValue::Text(_) => DataType::Text,
        }
    }

    /// Value equality where NaN matches NaN.
    pub fn same_as(&self, other: &GridValue) -> bool {
        match (self, other) {
            (GridValue::F32(a), GridValue::F32(b)) => a == b || (a.is_nan() && b.is_nan()),
            (GridValue::F64(a), GridValue::F64(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            GridValue::F32(v) => v.is_nan(),
            GridValue::F64(v) => v.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for GridValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridValue::Bool(v) => write!(f, "{v}"),
            GridValue::U8(v) => write!(f, "{v}"),
            GridValue::U16(v) => write!(f, "{v}"),
            GridValue::U32(v) => write!(f, "{v}"),
            GridValue::U64(v) => write!(f, "{v}"),
            GridValue::I8(v) => write!(f, "{v}"),
            GridValue::I16(v) => write!(f, "{v}"),
            GridValue::I32(v) => write!(f, "{v}"),
            GridValue::I64(v) => write!(f, "{v}"),
            GridValue::F32(v) => write!(f, "{v}"),
            GridValue::F64(v) => write!(f, "{v}"),
            GridValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// Named, typed column of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: DataType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// One cell and its column values (`None` is SQL NULL).
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub cell: HexCell,
    pub values: Vec<Option<GridValue>>,
}

/// A set of rows sharing one column layout, produced per block or per
/// vector file.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBatch {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<GridRow>,
}

impl GridBatch {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Storage type of a grid table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Text,
}

impl StorageType {
    /// Fixed dtype to storage type mapping.
    pub fn for_dtype(dtype: DataType) -> Self {
        match dtype {
            DataType::Bool => StorageType::Bool,
            DataType::U8 => StorageType::SmallInt,
            DataType::U16 => StorageType::Integer,
            DataType::U32 => StorageType::BigInt,
            DataType::U64 => StorageType::BigInt,
            DataType::I8 => StorageType::SmallInt,
            DataType::I16 => StorageType::SmallInt,
            DataType::I32 => StorageType::Integer,
            DataType::I64 => StorageType::BigInt,
            DataType::F32 => StorageType::Real,
            DataType::F64 => StorageType::DoublePrecision,
            DataType::Text => StorageType::Text,
        }
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Bool => "bool",
            StorageType::SmallInt => "smallint",
            StorageType::Integer => "integer",
            StorageType::BigInt => "bigint",
            StorageType::Real => "real",
            StorageType::DoublePrecision => "double precision",
            StorageType::Text => "text",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Type of the `h3index` key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// The `h3index` type from the PostgreSQL h3 extension.
    #[default]
    H3Index,
    Text,
}

impl KeyType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            KeyType::H3Index => "h3index",
            KeyType::Text => "text",
        }
    }
}

/// A column of an inferred table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub dtype: DataType,
    pub storage: StorageType,
}

/// Column layout of a grid table, excluding the key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub key_type: KeyType,
    pub columns: Vec<SchemaColumn>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Describe how a batch deviates from this schema, if it does.
    pub fn mismatch(&self, batch: &GridBatch) -> Option<String> {
        if batch.columns.len() != self.columns.len() {
            return Some(format!(
                "expected columns [{}], got [{}]",
                self.column_names().join(", "),
                batch.column_names().join(", ")
            ));
        }
        for (expected, actual) in self.columns.iter().zip(&batch.columns) {
            if expected.name != actual.name {
                return Some(format!(
                    "expected column {}, got {}",
                    expected.name, actual.name
                ));
            }
            if expected.dtype != actual.dtype {
                return Some(format!(
                    "column {} was inferred as {}, got {}",
                    expected.name, expected.dtype, actual.dtype
                ));
            }
        }
        batch.rows.iter().find_map(|row| {
            if row.values.len() != self.columns.len() {
                return Some(format!(
                    "row {} has {} values for {} columns",
                    row.cell,
                    row.values.len(),
                    self.columns.len()
                ));
            }
            row.values
                .iter()
                .zip(&self.columns)
                .find_map(|(value, column)| match value {
                    Some(v) if v.dtype() != column.dtype => Some(format!(
                        "row {} holds a {} value in {} column {}",
                        row.cell,
                        v.dtype(),
                        column.dtype,
                        column.name
                    )),
                    _ => None,
                })
        })
    }
}
