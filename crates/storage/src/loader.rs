//! Bulk loading of grid batches into a freshly created table.

use async_trait::async_trait;
use h3_grid::{GridBatch, TableSchema};
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::ident::validate_identifier;

/// Write side of a grid table backend.
///
/// All calls on one sink belong to one write transaction; nothing is
/// visible to other sessions until `commit`. Dropping a sink without
/// committing discards its writes.
#[async_trait]
pub trait GridSink: Send {
    /// Drop `table` if present and create it with `schema`.
    async fn recreate_table(&mut self, table: &str, schema: &TableSchema) -> Result<()>;

    /// Append rows, returning how many were written.
    async fn copy_rows(&mut self, table: &str, schema: &TableSchema, batch: &GridBatch)
        -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Totals of a completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub table: String,
    pub rows: u64,
    pub batches: u64,
}

/// Streams batches into one grid table.
///
/// The table is recreated on `create`; batches are checked against the
/// schema before being copied. A duplicate key is a hard failure.
pub struct BulkLoader<S: GridSink> {
    sink: S,
    table: String,
    schema: TableSchema,
    rows: u64,
    batches: u64,
}

impl<S: GridSink> BulkLoader<S> {
    /// Recreate `table` with `schema` and return a loader for it.
    pub async fn create(mut sink: S, table: &str, schema: TableSchema) -> Result<Self> {
        validate_identifier(table)?;
        for column in &schema.columns {
            validate_identifier(&column.name)?;
        }
        sink.recreate_table(table, &schema).await?;
        info!(
            table = %table,
            columns = ?schema.column_names(),
            key_type = schema.key_type.sql_name(),
            "Created grid table"
        );

        Ok(Self {
            sink,
            table: table.to_string(),
            schema,
            rows: 0,
            batches: 0,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows_loaded(&self) -> u64 {
        self.rows
    }

    /// Copy one batch. Empty batches are skipped.
    pub async fn load(&mut self, batch: &GridBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        if let Some(reason) = self.schema.mismatch(batch) {
            return Err(StorageError::SchemaMismatch {
                table: self.table.clone(),
                reason,
            });
        }

        let written = self
            .sink
            .copy_rows(&self.table, &self.schema, batch)
            .await?;
        self.rows += written;
        self.batches += 1;
        debug!(table = %self.table, rows = written, total = self.rows, "Copied batch");
        Ok(written)
    }

    /// Commit the table.
    pub async fn finish(mut self) -> Result<LoadSummary> {
        self.sink.commit().await?;
        info!(
            table = %self.table,
            rows = self.rows,
            batches = self.batches,
            "Grid table loaded"
        );
        Ok(LoadSummary {
            table: self.table,
            rows: self.rows,
            batches: self.batches,
        })
    }

    /// Discard the table and everything loaded into it.
    pub async fn abort(mut self) -> Result<()> {
        debug!(table = %self.table, "Rolling back grid table load");
        self.sink.rollback().await
    }
}
