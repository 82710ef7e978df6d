//! Ingestion pipeline: source folder to registered grid table.

use std::path::PathBuf;

use h3_grid::{
    read_geojson, validate_all, BlockLayout, ColumnSpec, GeoTiffReader, GridBatch, GridError,
    RasterConverter, RasterDescriptor, VectorConverter,
};
use serde_json::Value;
use storage::{BulkLoader, CatalogStore, ContextualLayer, LoadSummary, StorageBackend};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{CatalogConfig, IngestConfig};
use crate::error::{IngestionError, Result};
use crate::import_kind::ImportKind;
use crate::layer::LayerRequest;
use crate::naming::column_slug;
use crate::registrar::{
    self, validate_category, CatalogRegistrar, RegistrationRequest, RegistrationSummary,
};
use crate::scheduler::{BlockScheduler, BlockStream, RasterJob, RasterSource};
use crate::schema::SchemaInferrer;
use crate::sources;

/// A folder of aligned single-band rasters, one column each.
#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub folder: PathBuf,
    pub table: String,
    pub kind: ImportKind,
    pub year: Option<i32>,
    /// Contextual layer attached to the first column's entry.
    pub layer: Option<ContextualLayer>,
}

/// A folder holding exactly one GeoJSON file.
#[derive(Debug, Clone)]
pub struct VectorRequest {
    pub folder: PathBuf,
    pub table: String,
    /// Feature property holding the cell value.
    pub attribute: String,
    /// Name of the contextual layer created for the table.
    pub dataset: String,
    pub category: String,
    pub year: Option<i32>,
    /// Indicator name code linked to the entry.
    pub indicator: Option<String>,
    pub metadata: Option<Value>,
}

/// Result of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestionResult {
    pub table: String,
    pub columns: Vec<String>,
    /// Rows written to the grid table
    pub rows: u64,
    pub batches: u64,
    pub registration: RegistrationSummary,
}

/// Converts sources, loads grid tables and registers them.
pub struct Ingester<B: StorageBackend> {
    backend: B,
    config: IngestConfig,
    registrar: CatalogRegistrar,
    inferrer: SchemaInferrer,
}

impl<B: StorageBackend> Ingester<B> {
    pub fn new(backend: B, config: IngestConfig, catalog: CatalogConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inferrer: SchemaInferrer::new(config.key_type),
            registrar: CatalogRegistrar::new(catalog.missing_material),
            backend,
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Convert every raster in the folder into one grid table and register
    /// its columns.
    ///
    /// Nothing is written if the rasters are misaligned or conversion fails.
    /// A registration failure leaves the loaded table unregistered.
    #[instrument(skip(self, request), fields(table = %request.table, kind = %request.kind))]
    pub async fn ingest_raster(&self, request: &RasterRequest) -> Result<IngestionResult> {
        if let Some(layer) = &request.layer {
            self.check_category(&layer.category).await?;
        }

        let paths = sources::find_rasters(&request.folder)?;
        let nodata = self.config.nodata;
        let descriptors = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| GeoTiffReader::open_with_nodata(p, nodata).map(GeoTiffReader::into_descriptor))
                .collect::<h3_grid::Result<Vec<RasterDescriptor>>>()
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))??;

        validate_all(&descriptors).map_err(GridError::from)?;
        if let Some(raster) = descriptors.iter().find(|d| !d.crs.is_wgs84()) {
            return Err(GridError::UnsupportedCrs {
                path: raster.name(),
                crs: raster.crs.to_string(),
            }
            .into());
        }

        let raster_sources: Vec<RasterSource> = descriptors
            .iter()
            .map(|d| {
                let stem = d
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                RasterSource {
                    column: ColumnSpec::new(column_slug(&stem), d.dtype),
                    path: d.path.clone(),
                }
            })
            .collect();
        let job = RasterJob {
            sources: raster_sources,
            layout: BlockLayout::new(
                descriptors[0].width,
                descriptors[0].height,
                self.config.block_size,
            ),
            converter: RasterConverter::new(self.config.h3_resolution)?,
            nodata,
        };
        let columns = job.columns();
        self.inferrer.validate_columns(&columns)?;
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        info!(
            rasters = descriptors.len(),
            columns = ?column_names,
            width = descriptors[0].width,
            height = descriptors[0].height,
            windows = job.layout.window_count(),
            resolution = self.config.h3_resolution,
            workers = self.config.workers,
            "Converting rasters"
        );
        let scheduler = BlockScheduler::new(self.config.workers, self.config.channel_capacity());
        let load = self.load_stream(&request.table, scheduler.spawn(job)).await?;

        let registration = self
            .register_loaded(RegistrationRequest {
                table: request.table.clone(),
                columns: column_names.clone(),
                resolution: self.config.h3_resolution,
                year: request.year,
                kind: request.kind.clone(),
                layer: request.layer.clone(),
            })
            .await?;

        Ok(complete(load, column_names, registration))
    }

    /// Convert the folder's GeoJSON file into a one-column grid table with
    /// a contextual layer named after the dataset.
    #[instrument(skip(self, request), fields(table = %request.table, attribute = %request.attribute))]
    pub async fn ingest_vector(&self, request: &VectorRequest) -> Result<IngestionResult> {
        self.check_category(&request.category).await?;

        let path = sources::find_vector(&request.folder)?;
        let column = column_slug(&request.attribute);
        let converter = VectorConverter::new(self.config.h3_resolution)?;
        let attribute = request.attribute.clone();
        let output = column.clone();
        let batch = tokio::task::spawn_blocking(move || -> Result<GridBatch> {
            let collection = read_geojson(&path)?;
            info!(
                file = %path.display(),
                features = collection.features.len(),
                "Converting features"
            );
            Ok(converter.convert(&collection, &attribute, &output)?)
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))??;

        if batch.is_empty() {
            return Err(IngestionError::EmptyDataset {
                table: request.table.clone(),
            });
        }
        let schema = self.inferrer.infer(&batch)?;
        let mut loader =
            BulkLoader::create(self.backend.grid_sink().await?, &request.table, schema).await?;
        if let Err(e) = loader.load(&batch).await {
            abort(loader).await;
            return Err(e.into());
        }
        let load = loader.finish().await?;

        let kind = match &request.indicator {
            Some(name_code) => ImportKind::Indicator {
                name_code: name_code.clone(),
            },
            None => ImportKind::Contextual,
        };
        let mut layer = ContextualLayer::for_grid(&request.dataset, &request.category);
        layer.metadata = request.metadata.clone();
        let registration = self
            .register_loaded(RegistrationRequest {
                table: request.table.clone(),
                columns: vec![column.clone()],
                resolution: self.config.h3_resolution,
                year: request.year,
                kind,
                layer: Some(layer),
            })
            .await?;

        Ok(complete(load, vec![column], registration))
    }

    /// Register an already loaded table. Empty `columns` registers every
    /// data column of the table.
    #[instrument(skip(self, request), fields(table = %request.table, kind = %request.kind))]
    pub async fn register(&self, mut request: RegistrationRequest) -> Result<RegistrationSummary> {
        if request.columns.is_empty() {
            request.columns = self.backend.table_columns(&request.table).await?;
            debug!(columns = ?request.columns, "Registering existing table columns");
        }
        self.registrar
            .register(self.backend.catalog().await?, &request)
            .await
    }

    /// Create or replace a contextual layer served by a tiler.
    pub async fn link_layer(&self, request: LayerRequest) -> Result<Uuid> {
        registrar::link_layer(self.backend.catalog().await?, &request.into_layer()).await
    }

    async fn register_loaded(&self, request: RegistrationRequest) -> Result<RegistrationSummary> {
        let table = request.table.clone();
        self.registrar
            .register(self.backend.catalog().await?, &request)
            .await
            .map_err(|e| {
                warn!(table = %table, error = %e, "Table loaded but left unregistered");
                IngestionError::registration(&table, e)
            })
    }

    /// Fail early on a category the catalog would reject.
    async fn check_category(&self, category: &str) -> Result<()> {
        let mut catalog = self.backend.catalog().await?;
        let result = validate_category(&mut catalog, category).await;
        catalog.rollback().await?;
        result
    }

    /// Drain converted batches into a new table.
    ///
    /// The schema comes from the first batch. Any load or conversion error
    /// cancels the remaining blocks and discards the table.
    async fn load_stream(&self, table: &str, mut stream: BlockStream) -> Result<LoadSummary> {
        let Some(first) = stream.next().await else {
            stream.finish().await?;
            return Err(IngestionError::EmptyDataset {
                table: table.to_string(),
            });
        };

        let opened: Result<BulkLoader<B::Sink>> = match self.inferrer.infer(&first) {
            Ok(schema) => match self.backend.grid_sink().await {
                Ok(sink) => BulkLoader::create(sink, table, schema).await.map_err(Into::into),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        let mut loader = match opened {
            Ok(loader) => loader,
            Err(e) => {
                cancel(stream).await;
                return Err(e);
            }
        };

        let mut loaded = loader.load(&first).await.map(|_| ());
        while loaded.is_ok() {
            match stream.next().await {
                Some(batch) => loaded = loader.load(&batch).await.map(|_| ()),
                None => break,
            }
        }
        if let Err(e) = loaded {
            cancel(stream).await;
            abort(loader).await;
            return Err(e.into());
        }
        if let Err(e) = stream.finish().await {
            abort(loader).await;
            return Err(e);
        }
        Ok(loader.finish().await?)
    }
}

fn complete(
    load: LoadSummary,
    columns: Vec<String>,
    registration: RegistrationSummary,
) -> IngestionResult {
    info!(
        table = %load.table,
        rows = load.rows,
        batches = load.batches,
        entries = registration.entries,
        "Ingestion complete"
    );
    IngestionResult {
        table: load.table,
        columns,
        rows: load.rows,
        batches: load.batches,
        registration,
    }
}

async fn cancel(mut stream: BlockStream) {
    stream.cancel();
    if let Err(e) = stream.finish().await {
        debug!(error = %e, "Conversion stopped");
    }
}

async fn abort<S: storage::GridSink>(loader: BulkLoader<S>) {
    if let Err(e) = loader.abort().await {
        warn!(error = %e, "Failed to roll back grid table load");
    }
}
