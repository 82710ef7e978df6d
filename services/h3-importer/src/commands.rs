//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use h3_grid::KeyType;
use ingestion::{
    drop_orphan_tables, find_orphan_tables, parse_tiler_param, ImportKind, IngestConfig, Ingester,
    IngestionResult, LayerRequest, LayerSource, RasterRequest, RegistrationRequest, VectorRequest,
};
use serde_json::Value;
use storage::{ContextualLayer, StorageSession};
use tracing::info;

use crate::cli::{
    FetchArgs, GcArgs, LayerArgs, LinkLayerArgs, RasterArgs, RegisterArgs, VectorArgs,
};
use crate::config::AppConfig;
use crate::fetch::Fetcher;

pub async fn raster(config: &AppConfig, args: RasterArgs) -> Result<()> {
    let ingest = args.ingest.apply(config.ingest.clone());
    let request = RasterRequest {
        folder: args.folder,
        table: args.table,
        kind: ImportKind::parse(&args.kind, &args.dataset)?,
        year: Some(args.year),
        layer: layer_from_args(&args.layer)?,
    };
    let catalog = config.catalog.clone();

    let result = StorageSession::scoped(&config.storage()?, |session| async move {
        require_key_type(&session, &ingest).await?;
        let ingester = Ingester::new(session, ingest, catalog)?;
        Ok::<_, anyhow::Error>(ingester.ingest_raster(&request).await?)
    })
    .await?;
    report(&result);
    Ok(())
}

pub async fn vector(config: &AppConfig, args: VectorArgs) -> Result<()> {
    let ingest = args.ingest.apply(config.ingest.clone());
    let request = VectorRequest {
        folder: args.folder,
        table: args.table,
        attribute: args.column,
        dataset: args.dataset,
        category: args.category,
        year: Some(args.year),
        indicator: args.indicator,
        metadata: args.metadata.as_deref().map(read_metadata).transpose()?,
    };
    let catalog = config.catalog.clone();

    let result = StorageSession::scoped(&config.storage()?, |session| async move {
        require_key_type(&session, &ingest).await?;
        let ingester = Ingester::new(session, ingest, catalog)?;
        Ok::<_, anyhow::Error>(ingester.ingest_vector(&request).await?)
    })
    .await?;
    report(&result);
    Ok(())
}

pub async fn register(config: &AppConfig, args: RegisterArgs) -> Result<()> {
    let mut ingest = config.ingest.clone();
    if let Some(res) = args.h3_res {
        ingest.h3_resolution = res;
    }
    let request = RegistrationRequest {
        table: args.table,
        columns: args.columns,
        resolution: ingest.h3_resolution,
        year: Some(args.year),
        kind: ImportKind::parse(&args.kind, &args.dataset)?,
        layer: layer_from_args(&args.layer)?,
    };
    let catalog = config.catalog.clone();

    let summary = StorageSession::scoped(&config.storage()?, |session| async move {
        let ingester = Ingester::new(session, ingest, catalog)?;
        Ok::<_, anyhow::Error>(ingester.register(request).await?)
    })
    .await?;
    info!(
        table = %summary.table,
        entries = summary.entries,
        material_links = summary.material_links,
        indicator_links = summary.indicator_links,
        skipped = ?summary.skipped_columns,
        "Registration complete"
    );
    Ok(())
}

pub async fn link_layer(config: &AppConfig, args: LinkLayerArgs) -> Result<()> {
    let tiler_params = args
        .tiler_params
        .iter()
        .map(|p| parse_tiler_param(p))
        .collect::<ingestion::Result<BTreeMap<_, _>>>()?;
    let request = LayerRequest {
        name: args.name,
        category: args.category,
        metadata: args.metadata.as_deref().map(read_metadata).transpose()?,
        source: LayerSource::parse(&args.cog),
        tiler_params,
    };
    let ingest = config.ingest.clone();
    let catalog = config.catalog.clone();

    let id = StorageSession::scoped(&config.storage()?, |session| async move {
        let ingester = Ingester::new(session, ingest, catalog)?;
        Ok::<_, anyhow::Error>(ingester.link_layer(request).await?)
    })
    .await?;
    info!(layer_id = %id, "Contextual layer linked");
    Ok(())
}

pub async fn gc(config: &AppConfig, args: GcArgs) -> Result<()> {
    let GcArgs { prefix, drop: drop_tables } = args;
    let tables = StorageSession::scoped(&config.storage()?, |session| async move {
        let tables = if drop_tables {
            drop_orphan_tables(&session, &prefix).await?
        } else {
            find_orphan_tables(&session, &prefix).await?
        };
        Ok::<_, anyhow::Error>(tables)
    })
    .await?;
    for table in &tables {
        println!("{table}");
    }
    info!(orphans = tables.len(), dropped = drop_tables, "Orphan table scan complete");
    Ok(())
}

pub async fn fetch(config: &AppConfig, args: FetchArgs) -> Result<()> {
    let path = Fetcher::new(&config.fetch)?
        .fetch(&args.url, &args.dest)
        .await?;
    println!("{}", path.display());
    Ok(())
}

pub async fn bootstrap(config: &AppConfig) -> Result<()> {
    StorageSession::scoped(&config.storage()?, |session| async move {
        session.bootstrap().await?;
        let h3 = session.ensure_h3_extension().await?;
        info!(h3_extension = h3, "Bootstrap complete");
        Ok::<_, anyhow::Error>(())
    })
    .await
}

/// `h3index` keys need the h3 extension on the server.
async fn require_key_type(session: &StorageSession, ingest: &IngestConfig) -> Result<()> {
    if ingest.key_type == KeyType::H3Index && !session.ensure_h3_extension().await? {
        anyhow::bail!("The h3 extension is not available; set ingest.key_type to text");
    }
    Ok(())
}

fn layer_from_args(args: &LayerArgs) -> Result<Option<ContextualLayer>> {
    let (Some(name), Some(category)) = (&args.layer_name, &args.category) else {
        return Ok(None);
    };
    let mut layer = ContextualLayer::for_grid(name, category);
    if let Some(path) = &args.metadata {
        layer.metadata = Some(read_metadata(path)?);
    }
    Ok(Some(layer))
}

fn read_metadata(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata from {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid metadata JSON in {:?}", path))
}

fn report(result: &IngestionResult) {
    info!(
        table = %result.table,
        columns = ?result.columns,
        rows = result.rows,
        batches = result.batches,
        entries = result.registration.entries,
        material_links = result.registration.material_links,
        indicator_links = result.registration.indicator_links,
        skipped = ?result.registration.skipped_columns,
        contextual_layer = ?result.registration.contextual_layer_id,
        "Import complete"
    );
}
