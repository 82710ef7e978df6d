//! Storage for H3 grid tables and their catalog.
//!
//! Provides:
//! - A scoped PostgreSQL session ([`StorageSession`])
//! - Bulk loading of grid batches with `COPY FROM STDIN` ([`BulkLoader`])
//! - The transactional catalog store ([`CatalogStore`])
//! - An in-memory backend with the same semantics ([`MemoryStorage`])

pub mod backend;
pub mod catalog;
pub mod copy;
pub mod error;
pub mod ident;
pub mod loader;
pub mod memory;
pub mod postgres;
pub mod session;

pub use backend::StorageBackend;
pub use catalog::{
    CatalogEntry, CatalogStore, ContextualLayer, IndicatorLink, MaterialLink, MaterialLinkType,
    NewCatalogEntry, CATALOG_TABLES, CONTEXTUAL_LAYER_CATEGORIES,
};
pub use error::{Result, StorageError};
pub use loader::{BulkLoader, GridSink, LoadSummary};
pub use memory::{CatalogState, MemoryStorage, MemoryTable};
pub use postgres::{PgCatalog, PgGridSink};
pub use session::{StorageConfig, StorageSession};
