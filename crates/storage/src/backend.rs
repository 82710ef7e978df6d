//! Storage backend seam used by the ingestion pipeline.

use async_trait::async_trait;

use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::loader::GridSink;

/// Grid tables plus catalog, as one backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    type Sink: GridSink + 'static;
    type Catalog: CatalogStore + 'static;

    /// Begin a grid table write transaction.
    async fn grid_sink(&self) -> Result<Self::Sink>;

    /// Begin a catalog write transaction.
    async fn catalog(&self) -> Result<Self::Catalog>;

    /// Tables whose name starts with `prefix`, sorted.
    async fn list_tables(&self, prefix: &str) -> Result<Vec<String>>;

    /// Distinct table names referenced by catalog entries, sorted.
    async fn registered_tables(&self) -> Result<Vec<String>>;

    /// Data column names of an existing grid table, in table order.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    async fn drop_table(&self, table: &str) -> Result<()>;
}
