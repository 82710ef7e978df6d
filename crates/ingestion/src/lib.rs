//! H3 grid ingestion.
//!
//! Drives a source folder through conversion, bulk loading and catalog
//! registration:
//!
//! - Raster folders: aligned GeoTIFFs converted block by block on a worker
//!   pool, outer-joined into one column per raster ([`Ingester::ingest_raster`])
//! - Vector folders: one GeoJSON file, one attribute column
//!   ([`Ingester::ingest_vector`])
//! - Registration of loaded tables ([`CatalogRegistrar`])
//! - Standalone contextual layers and orphan table cleanup

pub mod config;
pub mod error;
pub mod gc;
pub mod import_kind;
mod ingester;
pub mod layer;
pub mod naming;
pub mod registrar;
pub mod scheduler;
pub mod schema;
pub mod sources;

// Re-exports
pub use config::{CatalogConfig, IngestConfig, MissingMaterialPolicy};
pub use error::{IngestionError, Result};
pub use gc::{drop_orphan_tables, find_orphan_tables};
pub use import_kind::{ColumnLinkage, ImportKind, IMPORT_KINDS};
pub use ingester::{Ingester, IngestionResult, RasterRequest, VectorRequest};
pub use layer::{parse_tiler_param, LayerRequest, LayerSource, COG_TILER_URL};
pub use naming::{column_slug, snake_case, DatasetIdConvention};
pub use registrar::{CatalogRegistrar, RegistrationRequest, RegistrationSummary};
pub use scheduler::{BlockScheduler, BlockStream, RasterJob, RasterSource};
pub use schema::SchemaInferrer;
