//! Catalog registration of a loaded grid table.

use std::collections::HashSet;

use storage::{
    CatalogStore, ContextualLayer, IndicatorLink, MaterialLink, MaterialLinkType, NewCatalogEntry,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::MissingMaterialPolicy;
use crate::error::{IngestionError, Result};
use crate::import_kind::{ColumnLinkage, ImportKind};

/// What to register for one grid table.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub table: String,
    /// Data columns, one catalog entry each.
    pub columns: Vec<String>,
    pub resolution: u8,
    pub year: Option<i32>,
    pub kind: ImportKind,
    /// Layer created or replaced and attached to the first entry.
    pub layer: Option<ContextualLayer>,
}

/// Outcome of a committed registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub table: String,
    pub entries: usize,
    /// Distinct material links stored; a column replacing another column's
    /// link for the same material is counted once.
    pub material_links: usize,
    pub indicator_links: usize,
    /// Columns left without material linkage.
    pub skipped_columns: Vec<String>,
    pub contextual_layer_id: Option<Uuid>,
}

/// Links left in the catalog by one registration. A material holds one
/// link per type, so later columns replace earlier ones.
#[derive(Debug, Default)]
struct LinkTally {
    materials: HashSet<(Uuid, MaterialLinkType)>,
    indicators: HashSet<Uuid>,
    skipped: Vec<String>,
}

/// Replaces a table's catalog entries and links in one transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogRegistrar {
    missing_material: MissingMaterialPolicy,
}

impl CatalogRegistrar {
    pub fn new(missing_material: MissingMaterialPolicy) -> Self {
        Self { missing_material }
    }

    /// Register `request`, committing on success and rolling back on any
    /// error.
    #[instrument(skip(self, catalog, request), fields(table = %request.table, kind = %request.kind))]
    pub async fn register<C: CatalogStore>(
        &self,
        mut catalog: C,
        request: &RegistrationRequest,
    ) -> Result<RegistrationSummary> {
        match self.register_in(&mut catalog, request).await {
            Ok(summary) => {
                catalog.commit().await?;
                info!(
                    entries = summary.entries,
                    material_links = summary.material_links,
                    indicator_links = summary.indicator_links,
                    skipped = summary.skipped_columns.len(),
                    "Registered grid table"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback) = catalog.rollback().await {
                    warn!(error = %rollback, "Catalog rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn register_in<C: CatalogStore>(
        &self,
        catalog: &mut C,
        request: &RegistrationRequest,
    ) -> Result<RegistrationSummary> {
        if request.columns.is_empty() {
            return Err(IngestionError::InvalidSchema(format!(
                "{} has no columns to register",
                request.table
            )));
        }
        if let Some(layer) = &request.layer {
            validate_category(catalog, &layer.category).await?;
        }
        let indicator_id = match request.kind.indicator() {
            Some(name_code) => Some(catalog.find_indicator(name_code).await?.ok_or_else(|| {
                IngestionError::UnknownIndicator {
                    name_code: name_code.to_string(),
                }
            })?),
            None => None,
        };

        let removed_links = catalog.delete_links_for_table(&request.table).await?;
        let removed_entries = catalog.delete_entries_for_table(&request.table).await?;
        if removed_entries > 0 {
            info!(
                entries = removed_entries,
                links = removed_links,
                "Removed previous registration"
            );
        }

        let mut summary = RegistrationSummary {
            table: request.table.clone(),
            ..Default::default()
        };
        let linkage = request.kind.column_linkage();
        let mut tally = LinkTally::default();
        let mut first_entry = None;
        for column in &request.columns {
            let entry_id = catalog
                .insert_entry(&NewCatalogEntry {
                    table: request.table.clone(),
                    column: column.clone(),
                    resolution: request.resolution,
                    year: request.year,
                    indicator_id,
                })
                .await?;
            first_entry.get_or_insert(entry_id);
            summary.entries += 1;
            if let Some(linkage) = linkage {
                self.link_column(catalog, linkage, column, entry_id, indicator_id, &mut tally)
                    .await?;
            }
        }
        summary.material_links = tally.materials.len();
        summary.indicator_links = tally.indicators.len();
        summary.skipped_columns = tally.skipped;

        if let (Some(layer), Some(entry_id)) = (&request.layer, first_entry) {
            let layer_id = catalog.replace_contextual_layer(layer).await?;
            catalog.attach_contextual_layer(entry_id, layer_id).await?;
            summary.contextual_layer_id = Some(layer_id);
        }
        Ok(summary)
    }

    async fn link_column<C: CatalogStore>(
        &self,
        catalog: &mut C,
        linkage: ColumnLinkage<'_>,
        column: &str,
        entry_id: Uuid,
        indicator_id: Option<Uuid>,
        tally: &mut LinkTally,
    ) -> Result<()> {
        let convention = linkage.convention();
        let dataset_id = linkage.dataset_id(column);
        let materials = match &dataset_id {
            Some(id) => catalog.find_materials(id, convention.roots_only()).await?,
            None => Vec::new(),
        };
        if materials.is_empty() {
            return self.unresolved(column, dataset_id, tally);
        }

        match linkage {
            ColumnLinkage::Material { link_type, .. } => {
                for material_id in materials {
                    catalog
                        .replace_material_link(&MaterialLink {
                            material_id,
                            entry_id,
                            link_type,
                        })
                        .await?;
                    tally.materials.insert((material_id, link_type));
                }
            }
            ColumnLinkage::MaterialIndicator { name_code } => {
                let indicator_id = indicator_id.ok_or_else(|| IngestionError::UnknownIndicator {
                    name_code: name_code.to_string(),
                })?;
                for material_id in materials {
                    catalog
                        .replace_indicator_link(&IndicatorLink {
                            material_id,
                            indicator_id,
                            entry_id,
                        })
                        .await?;
                    tally.indicators.insert(material_id);
                }
            }
        }
        Ok(())
    }

    fn unresolved(
        &self,
        column: &str,
        dataset_id: Option<String>,
        tally: &mut LinkTally,
    ) -> Result<()> {
        match self.missing_material {
            MissingMaterialPolicy::Skip => {
                warn!(
                    column = %column,
                    dataset_id = dataset_id.as_deref().unwrap_or(""),
                    "No material found, column left unlinked"
                );
                tally.skipped.push(column.to_string());
                Ok(())
            }
            MissingMaterialPolicy::Fail => Err(IngestionError::UnresolvedMaterial {
                column: column.to_string(),
                dataset_id,
            }),
        }
    }
}

/// Fail with `UnknownCategory` unless `category` is an allowed value.
pub async fn validate_category<C: CatalogStore + ?Sized>(
    catalog: &mut C,
    category: &str,
) -> Result<()> {
    let allowed = catalog.contextual_layer_categories().await?;
    if allowed.iter().any(|c| c == category) {
        Ok(())
    } else {
        Err(IngestionError::UnknownCategory {
            category: category.to_string(),
            allowed,
        })
    }
}

/// Create or replace a standalone contextual layer and commit.
#[instrument(skip(catalog, layer), fields(name = %layer.name, category = %layer.category))]
pub async fn link_layer<C: CatalogStore>(mut catalog: C, layer: &ContextualLayer) -> Result<Uuid> {
    let result = async {
        validate_category(&mut catalog, &layer.category).await?;
        let id = catalog.replace_contextual_layer(layer).await?;
        catalog.commit().await?;
        Ok::<_, IngestionError>(id)
    }
    .await;
    match result {
        Ok(id) => {
            info!(layer_id = %id, tiler_url = layer.tiler_url.as_deref().unwrap_or(""), "Linked contextual layer");
            Ok(id)
        }
        Err(e) => {
            if let Err(rollback) = catalog.rollback().await {
                warn!(error = %rollback, "Catalog rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{MaterialLinkType, MemoryStorage, StorageBackend};

    fn request(kind: ImportKind, columns: &[&str]) -> RegistrationRequest {
        RegistrationRequest {
            table: "h3_grid_spam".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            resolution: 6,
            year: Some(2010),
            kind,
            layer: None,
        }
    }

    #[tokio::test]
    async fn test_production_links_materials() {
        let storage = MemoryStorage::new();
        let wheat = storage.add_material("spam_whea", None);
        let registrar = CatalogRegistrar::default();
        let kind = ImportKind::parse("production", "spam").unwrap();
        let req = request(kind, &["spam2010V2r0GlobalPWheaA", "spam2010V2r0GlobalPRiceA"]);

        let summary = registrar
            .register(storage.catalog().await.unwrap(), &req)
            .await
            .unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.material_links, 1);
        assert_eq!(summary.skipped_columns, vec!["spam2010V2r0GlobalPRiceA"]);

        let state = storage.catalog_state();
        let link = &state.material_links[0];
        assert_eq!(link.material_id, wheat);
        assert_eq!(link.link_type, MaterialLinkType::Producer);
    }

    #[tokio::test]
    async fn test_columns_sharing_a_material_count_one_link() {
        let storage = MemoryStorage::new();
        storage.add_material("spam_whea", None);
        let kind = ImportKind::parse("production", "spam").unwrap();
        let req = request(kind, &["spam2005GlobalPWheaA", "spam2010V2r0GlobalPWheaA"]);

        let summary = CatalogRegistrar::default()
            .register(storage.catalog().await.unwrap(), &req)
            .await
            .unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.material_links, 1);
        assert!(summary.skipped_columns.is_empty());

        let state = storage.catalog_state();
        assert_eq!(state.material_links.len(), summary.material_links);
        let last = state
            .entries_for("h3_grid_spam")
            .into_iter()
            .find(|e| e.column == "spam2010V2r0GlobalPWheaA")
            .unwrap();
        assert_eq!(state.material_links[0].entry_id, last.id);
    }

    #[tokio::test]
    async fn test_fail_policy_rolls_back() {
        let storage = MemoryStorage::new();
        let registrar = CatalogRegistrar::new(MissingMaterialPolicy::Fail);
        let kind = ImportKind::parse("harvest_area", "spam").unwrap();
        let err = registrar
            .register(
                storage.catalog().await.unwrap(),
                &request(kind, &["spam2010V2r0GlobalHRiceA"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::UnresolvedMaterial { .. }));
        assert!(storage.catalog_state().entries.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_indicator() {
        let storage = MemoryStorage::new();
        let kind = ImportKind::parse("indicator", "UWU_SUM").unwrap();
        let err = CatalogRegistrar::default()
            .register(storage.catalog().await.unwrap(), &request(kind, &["waterUse"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::UnknownIndicator { name_code } if name_code == "UWU_SUM"));
    }

    #[tokio::test]
    async fn test_material_indicator_links_root_materials() {
        let storage = MemoryStorage::new();
        let indicator = storage.add_indicator("UWU_SUM");
        let root = storage.add_material("spam_whea", None);
        storage.add_material("spam_whea", Some(root));
        let kind = ImportKind::parse("material_indicator", "UWU_SUM").unwrap();

        let summary = CatalogRegistrar::default()
            .register(
                storage.catalog().await.unwrap(),
                &request(kind, &["WheaPerTProduction"]),
            )
            .await
            .unwrap();
        assert_eq!(summary.indicator_links, 1);

        let state = storage.catalog_state();
        assert_eq!(state.entries[0].indicator_id, Some(indicator));
        assert_eq!(state.indicator_links[0].material_id, root);
        assert_eq!(state.indicator_links[0].indicator_id, indicator);
    }

    #[tokio::test]
    async fn test_link_layer_rejects_unknown_category() {
        let storage = MemoryStorage::new();
        let layer = ContextualLayer::for_grid("deforestation", "Weather");
        let err = link_layer(storage.catalog().await.unwrap(), &layer)
            .await
            .unwrap_err();
        match err {
            IngestionError::UnknownCategory { allowed, .. } => {
                assert!(allowed.contains(&"Default".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(storage.catalog_state().layers.is_empty());
    }
}
