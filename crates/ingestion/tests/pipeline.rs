//! End-to-end ingestion against the in-memory storage backend.

use std::collections::BTreeMap;
use std::path::Path;

use h3_grid::{GridError, GridValue, HexCell};
use ingestion::{
    find_orphan_tables, drop_orphan_tables, CatalogConfig, ImportKind, IngestConfig, Ingester,
    IngestionError, LayerRequest, LayerSource, MissingMaterialPolicy, RasterRequest,
    RegistrationRequest, VectorRequest, COG_TILER_URL,
};
use serde_json::json;
use storage::{ContextualLayer, MaterialLinkType, MemoryStorage};
use tempfile::TempDir;
use test_utils::{
    break_strip, create_test_grid, square_feature, write_geojson, write_geotiff, GeoTiffSpec,
};
use tiff::encoder::colortype::Gray32Float;

const NODATA: f32 = -9999.0;
const WEST: f64 = 10.0;
const NORTH: f64 = 50.0;
const PIXEL: f64 = 0.5;
const SIZE: usize = 8;

fn config() -> IngestConfig {
    IngestConfig {
        h3_resolution: 4,
        workers: 2,
        block_size: 4,
        ..Default::default()
    }
}

fn ingester(storage: &MemoryStorage) -> Ingester<MemoryStorage> {
    Ingester::new(storage.clone(), config(), CatalogConfig::default()).unwrap()
}

fn write_raster(dir: &Path, name: &str, spec: &GeoTiffSpec, data: &[f32]) {
    write_geotiff::<Gray32Float>(&dir.join(name), spec, data).unwrap();
}

fn spec() -> GeoTiffSpec {
    GeoTiffSpec::wgs84(SIZE as u32, SIZE as u32, WEST, NORTH, PIXEL).with_nodata("-9999")
}

/// cropA is nodata where (col + row) % 3 == 0, cropB where it is 1.
fn write_crops(dir: &Path) -> (Vec<f32>, Vec<f32>) {
    let mut crop_a = create_test_grid(SIZE, SIZE);
    let mut crop_b = vec![5.0; SIZE * SIZE];
    for row in 0..SIZE {
        for col in 0..SIZE {
            match (col + row) % 3 {
                0 => crop_a[row * SIZE + col] = NODATA,
                1 => crop_b[row * SIZE + col] = NODATA,
                _ => {}
            }
        }
    }
    write_raster(dir, "cropA.tif", &spec(), &crop_a);
    write_raster(dir, "cropB.tif", &spec(), &crop_b);
    (crop_a, crop_b)
}

fn raster_request(dir: &Path, table: &str, kind: ImportKind) -> RasterRequest {
    RasterRequest {
        folder: dir.to_path_buf(),
        table: table.to_string(),
        kind,
        year: Some(2010),
        layer: None,
    }
}

fn pixel_value(data: &[f32], hex: &str) -> Option<GridValue> {
    let (lat, lng) = HexCell::from_hex(hex).unwrap().centroid();
    let col = ((lng - WEST) / PIXEL).floor() as usize;
    let row = ((NORTH - lat) / PIXEL).floor() as usize;
    let value = data[row * SIZE + col];
    (value != NODATA).then_some(GridValue::F32(value))
}

#[tokio::test]
async fn test_rasters_are_outer_joined_per_cell() {
    let dir = TempDir::new().unwrap();
    let (crop_a, crop_b) = write_crops(dir.path());
    let storage = MemoryStorage::new();

    let result = ingester(&storage)
        .ingest_raster(&raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual))
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["cropA", "cropB"]);
    assert!(result.batches > 1);

    let table = storage.table("h3_grid_demo").unwrap();
    assert_eq!(table.schema.column_names(), vec!["cropA", "cropB"]);
    assert_eq!(table.len() as u64, result.rows);

    let mut only_b = 0;
    for (hex, values) in &table.rows {
        assert_eq!(values[0], pixel_value(&crop_a, hex), "cropA at {hex}");
        assert_eq!(values[1], pixel_value(&crop_b, hex), "cropB at {hex}");
        assert!(values.iter().any(Option::is_some), "{hex} has no value");
        if values[0].is_none() {
            only_b += 1;
        }
    }
    assert!(only_b > 0, "cells with nodata in cropA only should survive");
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_crops(dir.path());
    let storage = MemoryStorage::new();
    let ingester = ingester(&storage);
    let request = raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual);

    let first = ingester.ingest_raster(&request).await.unwrap();
    let rows_before = storage.table("h3_grid_demo").unwrap().rows;
    let second = ingester.ingest_raster(&request).await.unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(first.columns, second.columns);
    assert_eq!(storage.table("h3_grid_demo").unwrap().rows, rows_before);
    assert_eq!(storage.catalog_state().entries_for("h3_grid_demo").len(), 2);
}

#[tokio::test]
async fn test_misaligned_raster_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let data = create_test_grid(SIZE, SIZE);
    write_raster(dir.path(), "cropA.tif", &spec(), &data);
    let shifted = GeoTiffSpec::wgs84(SIZE as u32, SIZE as u32, WEST, NORTH, 0.25);
    write_raster(dir.path(), "cropB.tif", &shifted, &data);
    let storage = MemoryStorage::new();

    let err = ingester(&storage)
        .ingest_raster(&raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual))
        .await
        .unwrap_err();
    match err {
        IngestionError::Grid(GridError::Alignment(e)) => {
            assert_eq!(e.reference, "cropA.tif");
            assert_eq!(e.candidate, "cropB.tif");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(storage.table_names().is_empty());
    assert!(storage.catalog_state().entries.is_empty());
}

/// cropA and cropB where the last strip of cropB cannot be decoded, so the
/// second band fails after the first may already have been loaded.
fn write_crops_with_broken_band(dir: &Path) {
    write_crops(dir);
    let spec = spec().with_rows_per_strip(1);
    write_raster(dir, "cropB.tif", &spec, &vec![5.0; SIZE * SIZE]);
    break_strip(&dir.join("cropB.tif"), SIZE - 1).unwrap();
}

fn assert_raster_read_error(err: &IngestionError) {
    match err {
        IngestionError::Grid(GridError::RasterRead { path, .. }) => {
            assert!(path.ends_with("cropB.tif"), "{path}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_block_aborts_run() {
    let dir = TempDir::new().unwrap();
    write_crops_with_broken_band(dir.path());
    let storage = MemoryStorage::new();
    let before = storage.catalog_state();

    let mut request = raster_request(
        dir.path(),
        "h3_grid_demo",
        ImportKind::Production {
            dataset: "spam".into(),
        },
    );
    request.layer = Some(ContextualLayer::for_grid("crops", "Default"));
    let err = ingester(&storage).ingest_raster(&request).await.unwrap_err();

    assert_raster_read_error(&err);
    assert!(storage.table_names().is_empty());
    assert_eq!(storage.catalog_state(), before);
}

#[tokio::test]
async fn test_failed_rerun_keeps_previous_table() {
    let dir = TempDir::new().unwrap();
    write_crops(dir.path());
    let storage = MemoryStorage::new();
    let ingester = ingester(&storage);
    let request = raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual);
    ingester.ingest_raster(&request).await.unwrap();
    let rows_before = storage.table("h3_grid_demo").unwrap().rows;
    let catalog_before = storage.catalog_state();

    write_crops_with_broken_band(dir.path());
    let err = ingester.ingest_raster(&request).await.unwrap_err();

    assert_raster_read_error(&err);
    assert_eq!(storage.table_names(), vec!["h3_grid_demo"]);
    assert_eq!(storage.table("h3_grid_demo").unwrap().rows, rows_before);
    assert_eq!(storage.catalog_state(), catalog_before);
}

#[tokio::test]
async fn test_all_nodata_raster_is_empty_dataset() {
    let dir = TempDir::new().unwrap();
    write_raster(dir.path(), "cropA.tif", &spec(), &vec![NODATA; SIZE * SIZE]);
    let storage = MemoryStorage::new();

    let err = ingester(&storage)
        .ingest_raster(&raster_request(dir.path(), "h3_grid_empty", ImportKind::Contextual))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::EmptyDataset { table } if table == "h3_grid_empty"));
    assert!(storage.table_names().is_empty());
}

#[tokio::test]
async fn test_projected_raster_is_rejected() {
    let dir = TempDir::new().unwrap();
    let projected = GeoTiffSpec::wgs84(SIZE as u32, SIZE as u32, 1_000_000.0, 6_000_000.0, 1000.0)
        .with_epsg(3857);
    write_raster(dir.path(), "cropA.tif", &projected, &create_test_grid(SIZE, SIZE));
    let storage = MemoryStorage::new();

    let err = ingester(&storage)
        .ingest_raster(&raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Grid(GridError::UnsupportedCrs { .. })));
    assert!(storage.table_names().is_empty());
}

#[tokio::test]
async fn test_production_links_and_reregistration() {
    let dir = TempDir::new().unwrap();
    let data = create_test_grid(SIZE, SIZE);
    write_raster(dir.path(), "spam2010V2r0_global_P_WHEA_A.tif", &spec(), &data);
    write_raster(dir.path(), "spam2010V2r0_global_P_RICE_A.tif", &spec(), &data);
    let storage = MemoryStorage::new();
    let wheat = storage.add_material("spam_whea", None);
    let ingester = ingester(&storage);
    let kind = ImportKind::parse("production", "spam").unwrap();

    let result = ingester
        .ingest_raster(&raster_request(dir.path(), "h3_grid_spam", kind.clone()))
        .await
        .unwrap();
    assert_eq!(
        result.columns,
        vec!["spam2010V2r0GlobalPRiceA", "spam2010V2r0GlobalPWheaA"]
    );
    assert_eq!(result.registration.material_links, 1);
    assert_eq!(
        result.registration.skipped_columns,
        vec!["spam2010V2r0GlobalPRiceA"]
    );
    let old_ids: Vec<_> = storage
        .catalog_state()
        .entries_for("h3_grid_spam")
        .iter()
        .map(|e| e.id)
        .collect();

    let summary = ingester
        .register(RegistrationRequest {
            table: "h3_grid_spam".into(),
            columns: Vec::new(),
            resolution: 4,
            year: Some(2010),
            kind,
            layer: None,
        })
        .await
        .unwrap();
    assert_eq!(summary.entries, 2);

    let state = storage.catalog_state();
    let entries = state.entries_for("h3_grid_spam");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| !old_ids.contains(&e.id)));
    assert_eq!(state.material_links.len(), 1);
    let link = &state.material_links[0];
    assert_eq!(link.material_id, wheat);
    assert_eq!(link.link_type, MaterialLinkType::Producer);
    assert!(entries.iter().any(|e| e.id == link.entry_id));
}

#[tokio::test]
async fn test_fail_policy_leaves_table_unregistered() {
    let dir = TempDir::new().unwrap();
    write_raster(
        dir.path(),
        "spam2010V2r0_global_H_RICE_A.tif",
        &spec(),
        &create_test_grid(SIZE, SIZE),
    );
    let storage = MemoryStorage::new();
    let catalog = CatalogConfig {
        missing_material: MissingMaterialPolicy::Fail,
    };
    let ingester = Ingester::new(storage.clone(), config(), catalog).unwrap();

    let err = ingester
        .ingest_raster(&raster_request(
            dir.path(),
            "h3_grid_harvest",
            ImportKind::parse("harvest_area", "spam").unwrap(),
        ))
        .await
        .unwrap_err();
    match err {
        IngestionError::Registration { table, source } => {
            assert_eq!(table, "h3_grid_harvest");
            assert!(matches!(*source, IngestionError::UnresolvedMaterial { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(storage.table("h3_grid_harvest").is_some());
    assert!(storage.catalog_state().entries.is_empty());
}

#[tokio::test]
async fn test_unknown_category_keeps_previous_registration() {
    let dir = TempDir::new().unwrap();
    write_crops(dir.path());
    let storage = MemoryStorage::new();
    let ingester = ingester(&storage);
    ingester
        .ingest_raster(&raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual))
        .await
        .unwrap();
    let before = storage.catalog_state();

    let err = ingester
        .register(RegistrationRequest {
            table: "h3_grid_demo".into(),
            columns: vec!["cropA".into(), "cropB".into()],
            resolution: 4,
            year: Some(2011),
            kind: ImportKind::Contextual,
            layer: Some(ContextualLayer::for_grid("crops", "Weather")),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::UnknownCategory { category, .. } if category == "Weather"));
    assert_eq!(storage.catalog_state(), before);
}

#[tokio::test]
async fn test_unknown_indicator_leaves_orphan_for_gc() {
    let dir = TempDir::new().unwrap();
    write_crops(dir.path());
    let storage = MemoryStorage::new();
    let ingester = ingester(&storage);

    let err = ingester
        .ingest_raster(&raster_request(
            dir.path(),
            "h3_grid_water",
            ImportKind::parse("indicator", "UWU_SUM").unwrap(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestionError::Registration { ref source, .. }
            if matches!(**source, IngestionError::UnknownIndicator { .. })
    ));

    assert_eq!(
        find_orphan_tables(&storage, "h3_grid_").await.unwrap(),
        vec!["h3_grid_water"]
    );
    let dropped = drop_orphan_tables(&storage, "h3_grid_").await.unwrap();
    assert_eq!(dropped, vec!["h3_grid_water"]);
    assert!(storage.table_names().is_empty());
}

#[tokio::test]
async fn test_raster_layer_attached_to_first_entry() {
    let dir = TempDir::new().unwrap();
    write_crops(dir.path());
    let storage = MemoryStorage::new();
    let mut request = raster_request(dir.path(), "h3_grid_demo", ImportKind::Contextual);
    request.layer = Some(
        ContextualLayer::for_grid("crops", "Food and agriculture")
            .with_metadata(json!({"source": "test"})),
    );

    let result = ingester(&storage).ingest_raster(&request).await.unwrap();
    let layer_id = result.registration.contextual_layer_id.unwrap();

    let state = storage.catalog_state();
    let (id, layer) = state.layer_named("crops").unwrap();
    assert_eq!(id, layer_id);
    assert_eq!(layer.metadata, Some(json!({"source": "test"})));
    let attached: Vec<_> = state
        .entries
        .iter()
        .filter(|e| e.contextual_layer_id == Some(layer_id))
        .map(|e| e.column.as_str())
        .collect();
    assert_eq!(attached, vec!["cropA"]);
}

fn vector_request(dir: &Path, indicator: Option<&str>) -> VectorRequest {
    VectorRequest {
        folder: dir.to_path_buf(),
        table: "h3_grid_deforestation".into(),
        attribute: "risk_level".into(),
        dataset: "deforestation".into(),
        category: "Environmental datasets".into(),
        year: Some(2020),
        indicator: indicator.map(str::to_string),
        metadata: Some(json!({"unit": "class"})),
    }
}

#[tokio::test]
async fn test_vector_ingestion_creates_layer_and_indicator_link() {
    let dir = TempDir::new().unwrap();
    write_geojson(
        dir.path(),
        "areas.geojson",
        vec![
            square_feature(10.0, 45.0, 2.0, json!({"risk_level": 3})),
            square_feature(20.0, 45.0, 2.0, json!({"risk_level": 1})),
        ],
    )
    .unwrap();
    let storage = MemoryStorage::new();
    let indicator = storage.add_indicator("DF_RISK");

    let result = ingester(&storage)
        .ingest_vector(&vector_request(dir.path(), Some("DF_RISK")))
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["riskLevel"]);
    assert!(result.rows > 0);

    let table = storage.table("h3_grid_deforestation").unwrap();
    let values: BTreeMap<_, usize> = table.rows.values().fold(BTreeMap::new(), |mut acc, v| {
        *acc.entry(format!("{:?}", v[0])).or_default() += 1;
        acc
    });
    assert_eq!(values.len(), 2);

    let state = storage.catalog_state();
    let entries = state.entries_for("h3_grid_deforestation");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].indicator_id, Some(indicator));
    let (layer_id, layer) = state.layer_named("deforestation").unwrap();
    assert_eq!(entries[0].contextual_layer_id, Some(layer_id));
    assert_eq!(layer.category, "Environmental datasets");
}

#[tokio::test]
async fn test_vector_conflict_writes_nothing() {
    let dir = TempDir::new().unwrap();
    write_geojson(
        dir.path(),
        "areas.geojson",
        vec![
            square_feature(10.0, 45.0, 2.0, json!({"risk_level": 3})),
            square_feature(11.0, 45.0, 2.0, json!({"risk_level": 1})),
        ],
    )
    .unwrap();
    let storage = MemoryStorage::new();

    let err = ingester(&storage)
        .ingest_vector(&vector_request(dir.path(), None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestionError::Grid(GridError::DuplicateCellConflict(_))
    ));
    assert!(storage.table_names().is_empty());
    assert!(storage.catalog_state().entries.is_empty());
}

#[tokio::test]
async fn test_vector_unknown_category_is_checked_first() {
    let dir = TempDir::new().unwrap();
    write_geojson(
        dir.path(),
        "areas.geojson",
        vec![square_feature(10.0, 45.0, 2.0, json!({"risk_level": 3}))],
    )
    .unwrap();
    let storage = MemoryStorage::new();
    let mut request = vector_request(dir.path(), None);
    request.category = "Weather".into();

    let err = ingester(&storage).ingest_vector(&request).await.unwrap_err();
    assert!(matches!(err, IngestionError::UnknownCategory { .. }));
    assert!(storage.table_names().is_empty());
}

#[tokio::test]
async fn test_link_layer_replaces_by_name() {
    let storage = MemoryStorage::new();
    let ingester = ingester(&storage);
    let request = |source: &str| LayerRequest {
        name: "forest_loss".into(),
        category: "Environmental datasets".into(),
        metadata: None,
        source: LayerSource::parse(source),
        tiler_params: BTreeMap::new(),
    };

    let first = ingester.link_layer(request("forest_loss.tif")).await.unwrap();
    let second = ingester
        .link_layer(request("https://tiles.example.org/{z}/{x}/{y}"))
        .await
        .unwrap();
    assert_ne!(first, second);

    let state = storage.catalog_state();
    assert_eq!(state.layers.len(), 1);
    let (_, layer) = state.layer_named("forest_loss").unwrap();
    assert_ne!(layer.tiler_url.as_deref(), Some(COG_TILER_URL));
    assert!(layer.default_tiler_params.is_none());
}
