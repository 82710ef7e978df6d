//! `COPY ... FROM STDIN` text format encoding.
//!
//! Rows are tab separated and newline terminated. NULL is `\N`; backslash,
//! tab, newline and carriage return inside text are escaped.

use bytes::{BufMut, BytesMut};
use h3_grid::{GridBatch, GridRow, GridValue, TableSchema, KEY_COLUMN};

use crate::error::Result;
use crate::ident::quote_ident;

const NULL: &[u8] = b"\\N";

/// `COPY` statement for a grid table.
pub fn copy_statement(table: &str, schema: &TableSchema) -> Result<String> {
    let mut columns = vec![quote_ident(KEY_COLUMN)?];
    for column in &schema.columns {
        columns.push(quote_ident(&column.name)?);
    }
    Ok(format!(
        "COPY {} ({}) FROM STDIN",
        quote_ident(table)?,
        columns.join(", ")
    ))
}

/// Encode every row of a batch.
pub fn encode_batch(batch: &GridBatch) -> BytesMut {
    let mut buf = BytesMut::with_capacity(batch.len() * 32);
    for row in &batch.rows {
        encode_row(row, &mut buf);
    }
    buf
}

pub fn encode_row(row: &GridRow, buf: &mut BytesMut) {
    buf.put_slice(row.cell.to_hex().as_bytes());
    for value in &row.values {
        buf.put_u8(b'\t');
        match value {
            Some(v) => encode_value(v, buf),
            None => buf.put_slice(NULL),
        }
    }
    buf.put_u8(b'\n');
}

pub fn encode_value(value: &GridValue, buf: &mut BytesMut) {
    match value {
        GridValue::Bool(v) => buf.put_u8(if *v { b't' } else { b'f' }),
        GridValue::U8(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::U16(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::U32(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::U64(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::I8(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::I16(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::I32(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::I64(v) => buf.put_slice(v.to_string().as_bytes()),
        GridValue::F32(v) => encode_float(f64::from(*v), &v.to_string(), buf),
        GridValue::F64(v) => encode_float(*v, &v.to_string(), buf),
        GridValue::Text(v) => encode_text(v, buf),
    }
}

fn encode_float(v: f64, rendered: &str, buf: &mut BytesMut) {
    if v.is_nan() {
        buf.put_slice(b"NaN");
    } else if v == f64::INFINITY {
        buf.put_slice(b"Infinity");
    } else if v == f64::NEG_INFINITY {
        buf.put_slice(b"-Infinity");
    } else {
        buf.put_slice(rendered.as_bytes());
    }
}

fn encode_text(text: &str, buf: &mut BytesMut) {
    for byte in text.bytes() {
        match byte {
            b'\\' => buf.put_slice(b"\\\\"),
            b'\t' => buf.put_slice(b"\\t"),
            b'\n' => buf.put_slice(b"\\n"),
            b'\r' => buf.put_slice(b"\\r"),
            other => buf.put_u8(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3_grid::{ColumnSpec, DataType, HexCell, KeyType, SchemaColumn, StorageType};

    fn cell() -> HexCell {
        HexCell::from_coords(48.85, 2.35, h3_grid::cell::resolution(6).unwrap()).unwrap()
    }

    fn encoded(value: GridValue) -> String {
        let mut buf = BytesMut::new();
        encode_value(&value, &mut buf);
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_row_layout_and_nulls() {
        let mut batch = GridBatch::new(vec![
            ColumnSpec::new("cropA", DataType::F32),
            ColumnSpec::new("cropB", DataType::F32),
        ]);
        batch.rows.push(GridRow {
            cell: cell(),
            values: vec![Some(GridValue::F32(1.5)), None],
        });
        let text = String::from_utf8(encode_batch(&batch).to_vec()).unwrap();
        assert_eq!(text, format!("{}\t1.5\t\\N\n", cell().to_hex()));
    }

    #[test]
    fn test_empty_text_is_not_null() {
        assert_eq!(encoded(GridValue::Text(String::new())), "");
        assert_ne!(encoded(GridValue::Text(String::new())), "\\N");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            encoded(GridValue::Text("a\\b\tc\nd\re".into())),
            "a\\\\b\\tc\\nd\\re"
        );
        assert_eq!(encoded(GridValue::Text("\\N".into())), "\\\\N");
    }

    #[test]
    fn test_special_floats() {
        assert_eq!(encoded(GridValue::F64(f64::NAN)), "NaN");
        assert_eq!(encoded(GridValue::F32(f32::INFINITY)), "Infinity");
        assert_eq!(encoded(GridValue::F64(f64::NEG_INFINITY)), "-Infinity");
        assert_eq!(encoded(GridValue::F64(-0.25)), "-0.25");
    }

    #[test]
    fn test_bool_and_integers() {
        assert_eq!(encoded(GridValue::Bool(true)), "t");
        assert_eq!(encoded(GridValue::Bool(false)), "f");
        assert_eq!(encoded(GridValue::U64(u64::from(u32::MAX) + 1)), "4294967296");
        assert_eq!(encoded(GridValue::I8(-5)), "-5");
    }

    #[test]
    fn test_copy_statement_quotes_columns() {
        let schema = TableSchema {
            key_type: KeyType::Text,
            columns: vec![SchemaColumn {
                name: "cropA".into(),
                dtype: DataType::F32,
                storage: StorageType::Real,
            }],
        };
        assert_eq!(
            copy_statement("h3_grid_demo", &schema).unwrap(),
            "COPY \"h3_grid_demo\" (\"h3index\", \"cropA\") FROM STDIN"
        );
    }
}
