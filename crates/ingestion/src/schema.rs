//! Table schema inference from the first converted batch.

use std::collections::HashSet;

use h3_grid::{ColumnSpec, GridBatch, KeyType, SchemaColumn, StorageType, TableSchema, KEY_COLUMN};

use crate::error::{IngestionError, Result};

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_COLUMN_BYTES: usize = 63;

/// Derives a grid table schema, once per ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaInferrer {
    key_type: KeyType,
}

impl SchemaInferrer {
    pub fn new(key_type: KeyType) -> Self {
        Self { key_type }
    }

    /// Reject column sets that cannot become a table.
    pub fn validate_columns(&self, columns: &[ColumnSpec]) -> Result<()> {
        if columns.is_empty() {
            return Err(IngestionError::InvalidSchema("no data columns".into()));
        }
        let mut seen = HashSet::new();
        for column in columns {
            if column.name.is_empty() {
                return Err(IngestionError::InvalidSchema("empty column name".into()));
            }
            if column.name.len() > MAX_COLUMN_BYTES {
                return Err(IngestionError::InvalidSchema(format!(
                    "column name {} exceeds {MAX_COLUMN_BYTES} bytes",
                    column.name
                )));
            }
            if column.name == KEY_COLUMN {
                return Err(IngestionError::InvalidSchema(format!(
                    "column name {KEY_COLUMN} is reserved for the cell key"
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(IngestionError::InvalidSchema(format!(
                    "duplicate column {}",
                    column.name
                )));
            }
        }
        Ok(())
    }

    /// Schema of the table that will hold `batch` and every later batch.
    pub fn infer(&self, batch: &GridBatch) -> Result<TableSchema> {
        self.validate_columns(&batch.columns)?;
        Ok(TableSchema {
            key_type: self.key_type,
            columns: batch
                .columns
                .iter()
                .map(|c| SchemaColumn {
                    name: c.name.clone(),
                    dtype: c.dtype,
                    storage: StorageType::for_dtype(c.dtype),
                })
                .collect(),
        })
    }
}
