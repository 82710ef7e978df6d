//! In-memory storage backend.
//!
//! Mirrors the PostgreSQL backend's transactional behaviour: sinks and
//! catalog stores work on a private copy that replaces the shared state on
//! commit. Primary key and unique constraints raise `DuplicateKey`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use h3_grid::{GridBatch, GridValue, TableSchema, KEY_COLUMN};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::catalog::{
    CatalogEntry, CatalogStore, ContextualLayer, IndicatorLink, MaterialLink, NewCatalogEntry,
    CONTEXTUAL_LAYER_CATEGORIES,
};
use crate::error::{Result, StorageError};
use crate::ident::validate_identifier;
use crate::loader::GridSink;

/// A grid table held in memory, keyed by hex id.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub schema: TableSchema,
    pub rows: BTreeMap<String, Vec<Option<GridValue>>>,
}

impl MemoryTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` for the row keyed `hex`.
    pub fn value(&self, hex: &str, column: &str) -> Option<&GridValue> {
        let idx = self.schema.columns.iter().position(|c| c.name == column)?;
        self.rows.get(hex)?.get(idx)?.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRecord {
    pub id: Uuid,
    pub dataset_id: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRecord {
    pub id: Uuid,
    pub name_code: String,
}

/// Catalog tables held in memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogState {
    pub categories: Vec<String>,
    pub indicators: Vec<IndicatorRecord>,
    pub materials: Vec<MaterialRecord>,
    pub entries: Vec<CatalogEntry>,
    pub material_links: Vec<MaterialLink>,
    pub indicator_links: Vec<IndicatorLink>,
    pub layers: BTreeMap<Uuid, ContextualLayer>,
}

impl CatalogState {
    pub fn entries_for(&self, table: &str) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|e| e.table == table).collect()
    }

    pub fn layer_named(&self, name: &str) -> Option<(Uuid, &ContextualLayer)> {
        self.layers
            .iter()
            .find(|(_, l)| l.name == name)
            .map(|(id, l)| (*id, l))
    }

    fn entry_ids_for(&self, table: &str) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|e| e.table == table)
            .map(|e| e.id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    catalog: CatalogState,
}

/// Shared in-memory backend. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Empty storage accepting the standard contextual layer categories.
    pub fn new() -> Self {
        let state = MemoryState {
            catalog: CatalogState {
                categories: CONTEXTUAL_LAYER_CATEGORIES
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_indicator(&self, name_code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().catalog.indicators.push(IndicatorRecord {
            id,
            name_code: name_code.to_string(),
        });
        id
    }

    pub fn add_material(&self, dataset_id: &str, parent_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().catalog.materials.push(MaterialRecord {
            id,
            dataset_id: Some(dataset_id.to_string()),
            parent_id,
        });
        id
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.lock().tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Copy of the committed catalog.
    pub fn catalog_state(&self) -> CatalogState {
        self.lock().catalog.clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    type Sink = MemoryGridSink;
    type Catalog = MemoryCatalog;

    async fn grid_sink(&self) -> Result<MemoryGridSink> {
        Ok(MemoryGridSink {
            storage: self.clone(),
            pending: Some(BTreeMap::new()),
        })
    }

    async fn catalog(&self) -> Result<MemoryCatalog> {
        let working = self.lock().catalog.clone();
        Ok(MemoryCatalog {
            storage: self.clone(),
            working: Some(working),
        })
    }

    async fn list_tables(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tables
            .keys()
            .filter(|t| t.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn registered_tables(&self) -> Result<Vec<String>> {
        let state = self.lock();
        let mut tables: Vec<String> = state.catalog.entries.iter().map(|e| e.table.clone()).collect();
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tables
            .get(table)
            .map(|t| t.schema.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.lock().tables.remove(table);
        Ok(())
    }
}

/// Grid sink staging tables until commit.
pub struct MemoryGridSink {
    storage: MemoryStorage,
    pending: Option<BTreeMap<String, MemoryTable>>,
}

impl MemoryGridSink {
    fn pending(&mut self) -> Result<&mut BTreeMap<String, MemoryTable>> {
        self.pending
            .as_mut()
            .ok_or_else(|| StorageError::NotInitialized("grid transaction".into()))
    }
}

#[async_trait]
impl GridSink for MemoryGridSink {
    async fn recreate_table(&mut self, table: &str, schema: &TableSchema) -> Result<()> {
        validate_identifier(table)?;
        self.pending()?.insert(
            table.to_string(),
            MemoryTable {
                schema: schema.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn copy_rows(
        &mut self,
        table: &str,
        _schema: &TableSchema,
        batch: &GridBatch,
    ) -> Result<u64> {
        let target = self
            .pending()?
            .get_mut(table)
            .ok_or_else(|| StorageError::NotInitialized(format!("table {table}")))?;

        // COPY is all-or-nothing per statement.
        let mut staged = BTreeMap::new();
        for row in &batch.rows {
            let key = row.cell.to_hex();
            if target.rows.contains_key(&key) || staged.contains_key(&key) {
                return Err(StorageError::DuplicateKey {
                    table: table.to_string(),
                    detail: format!("Key ({KEY_COLUMN})=({key}) already exists."),
                });
            }
            staged.insert(key, row.values.clone());
        }
        let written = staged.len() as u64;
        target.rows.extend(staged);
        Ok(written)
    }

    async fn commit(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| StorageError::NotInitialized("grid transaction".into()))?;
        self.storage.lock().tables.extend(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }
}

/// Catalog store working on a copy of the catalog until commit.
pub struct MemoryCatalog {
    storage: MemoryStorage,
    working: Option<CatalogState>,
}

impl MemoryCatalog {
    fn state(&mut self) -> Result<&mut CatalogState> {
        self.working
            .as_mut()
            .ok_or_else(|| StorageError::NotInitialized("catalog transaction".into()))
    }
}

fn duplicate(table: &str, detail: String) -> StorageError {
    StorageError::DuplicateKey {
        table: table.to_string(),
        detail,
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn contextual_layer_categories(&mut self) -> Result<Vec<String>> {
        Ok(self.state()?.categories.clone())
    }

    async fn entries_for_table(&mut self, table: &str) -> Result<Vec<CatalogEntry>> {
        let mut entries: Vec<CatalogEntry> =
            self.state()?.entries_for(table).into_iter().cloned().collect();
        entries.sort_by(|a, b| a.column.cmp(&b.column));
        Ok(entries)
    }

    async fn delete_links_for_table(&mut self, table: &str) -> Result<u64> {
        let state = self.state()?;
        let ids = state.entry_ids_for(table);
        let before = state.material_links.len() + state.indicator_links.len();
        state.material_links.retain(|l| !ids.contains(&l.entry_id));
        state.indicator_links.retain(|l| !ids.contains(&l.entry_id));
        let after = state.material_links.len() + state.indicator_links.len();
        Ok((before - after) as u64)
    }

    async fn delete_entries_for_table(&mut self, table: &str) -> Result<u64> {
        let state = self.state()?;
        let ids = state.entry_ids_for(table);
        // ON DELETE CASCADE
        state.material_links.retain(|l| !ids.contains(&l.entry_id));
        state.indicator_links.retain(|l| !ids.contains(&l.entry_id));
        state.entries.retain(|e| e.table != table);
        Ok(ids.len() as u64)
    }

    async fn insert_entry(&mut self, entry: &NewCatalogEntry) -> Result<Uuid> {
        let state = self.state()?;
        if state
            .entries
            .iter()
            .any(|e| e.table == entry.table && e.column == entry.column)
        {
            return Err(duplicate(
                "h3_data",
                format!(
                    "Key (\"h3tableName\", \"h3columnName\")=({}, {}) already exists.",
                    entry.table, entry.column
                ),
            ));
        }
        let id = Uuid::new_v4();
        state.entries.push(CatalogEntry {
            id,
            table: entry.table.clone(),
            column: entry.column.clone(),
            resolution: entry.resolution,
            year: entry.year,
            indicator_id: entry.indicator_id,
            contextual_layer_id: None,
        });
        Ok(id)
    }

    async fn find_indicator(&mut self, name_code: &str) -> Result<Option<Uuid>> {
        let ids: Vec<Uuid> = self
            .state()?
            .indicators
            .iter()
            .filter(|i| i.name_code == name_code)
            .map(|i| i.id)
            .collect();
        if ids.len() > 1 {
            return Err(StorageError::AmbiguousLookup {
                entity: "indicator",
                key: name_code.to_string(),
                count: ids.len(),
            });
        }
        Ok(ids.into_iter().next())
    }

    async fn find_materials(&mut self, dataset_id: &str, roots_only: bool) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .state()?
            .materials
            .iter()
            .filter(|m| m.dataset_id.as_deref() == Some(dataset_id))
            .filter(|m| !roots_only || m.parent_id.is_none())
            .map(|m| m.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn replace_material_link(&mut self, link: &MaterialLink) -> Result<()> {
        let state = self.state()?;
        state
            .material_links
            .retain(|l| !(l.material_id == link.material_id && l.link_type == link.link_type));
        state.material_links.push(link.clone());
        Ok(())
    }

    async fn replace_indicator_link(&mut self, link: &IndicatorLink) -> Result<()> {
        let state = self.state()?;
        state
            .indicator_links
            .retain(|l| l.material_id != link.material_id);
        state.indicator_links.push(link.clone());
        Ok(())
    }

    async fn replace_contextual_layer(&mut self, layer: &ContextualLayer) -> Result<Uuid> {
        let state = self.state()?;
        if !state.categories.contains(&layer.category) {
            return Err(StorageError::UnknownCategory {
                category: layer.category.clone(),
            });
        }
        let removed: Vec<Uuid> = state
            .layers
            .iter()
            .filter(|(_, l)| l.name == layer.name)
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            state.layers.remove(id);
        }
        // ON DELETE SET NULL
        for entry in state.entries.iter_mut() {
            if entry
                .contextual_layer_id
                .is_some_and(|id| removed.contains(&id))
            {
                entry.contextual_layer_id = None;
            }
        }

        let id = Uuid::new_v4();
        state.layers.insert(id, layer.clone());
        Ok(id)
    }

    async fn attach_contextual_layer(&mut self, entry_id: Uuid, layer_id: Uuid) -> Result<()> {
        if let Some(entry) = self.state()?.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.contextual_layer_id = Some(layer_id);
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let working = self
            .working
            .take()
            .ok_or_else(|| StorageError::NotInitialized("catalog transaction".into()))?;
        self.storage.lock().catalog = working;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MaterialLinkType;
    use h3_grid::{ColumnSpec, DataType, GridRow, HexCell, KeyType, SchemaColumn, StorageType};

    fn schema() -> TableSchema {
        TableSchema {
            key_type: KeyType::Text,
            columns: vec![SchemaColumn {
                name: "cropA".into(),
                dtype: DataType::F32,
                storage: StorageType::Real,
            }],
        }
    }

    fn batch(lat: f64, value: f32) -> GridBatch {
        let mut batch = GridBatch::new(vec![ColumnSpec::new("cropA", DataType::F32)]);
        let cell = HexCell::from_coords(lat, 10.0, h3_grid::cell::resolution(5).unwrap()).unwrap();
        batch.rows.push(GridRow {
            cell,
            values: vec![Some(GridValue::F32(value))],
        });
        batch
    }

    #[tokio::test]
    async fn test_sink_writes_visible_after_commit() {
        let storage = MemoryStorage::new();
        let mut sink = storage.grid_sink().await.unwrap();
        sink.recreate_table("h3_grid_demo", &schema()).await.unwrap();
        sink.copy_rows("h3_grid_demo", &schema(), &batch(1.0, 2.0))
            .await
            .unwrap();
        assert!(storage.table("h3_grid_demo").is_none());

        sink.commit().await.unwrap();
        assert_eq!(storage.table("h3_grid_demo").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_keeps_previous_table() {
        let storage = MemoryStorage::new();
        let mut sink = storage.grid_sink().await.unwrap();
        sink.recreate_table("t", &schema()).await.unwrap();
        sink.copy_rows("t", &schema(), &batch(1.0, 2.0)).await.unwrap();
        sink.commit().await.unwrap();

        let mut sink = storage.grid_sink().await.unwrap();
        sink.recreate_table("t", &schema()).await.unwrap();
        sink.rollback().await.unwrap();

        assert_eq!(storage.table("t").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let storage = MemoryStorage::new();
        let mut sink = storage.grid_sink().await.unwrap();
        sink.recreate_table("t", &schema()).await.unwrap();
        sink.copy_rows("t", &schema(), &batch(1.0, 2.0)).await.unwrap();
        let err = sink
            .copy_rows("t", &schema(), &batch(1.0, 3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { ref table, .. } if table == "t"));
    }

    #[tokio::test]
    async fn test_catalog_rollback_discards_changes() {
        let storage = MemoryStorage::new();
        let mut catalog = storage.catalog().await.unwrap();
        catalog
            .insert_entry(&NewCatalogEntry {
                table: "t".into(),
                column: "cropA".into(),
                resolution: 6,
                year: Some(2010),
                indicator_id: None,
            })
            .await
            .unwrap();
        catalog.rollback().await.unwrap();
        assert!(storage.catalog_state().entries.is_empty());
    }

    #[tokio::test]
    async fn test_material_link_replaced_per_type() {
        let storage = MemoryStorage::new();
        let material = storage.add_material("spam_whea", None);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut catalog = storage.catalog().await.unwrap();
        for (entry_id, link_type) in [
            (a, MaterialLinkType::Producer),
            (b, MaterialLinkType::Producer),
            (a, MaterialLinkType::Harvest),
        ] {
            catalog
                .replace_material_link(&MaterialLink {
                    material_id: material,
                    entry_id,
                    link_type,
                })
                .await
                .unwrap();
        }
        catalog.commit().await.unwrap();

        let links = storage.catalog_state().material_links;
        assert_eq!(links.len(), 2);
        assert!(links
            .iter()
            .any(|l| l.entry_id == b && l.link_type == MaterialLinkType::Producer));
    }

    #[tokio::test]
    async fn test_ambiguous_indicator() {
        let storage = MemoryStorage::new();
        storage.add_indicator("UWU_T");
        storage.add_indicator("UWU_T");
        let mut catalog = storage.catalog().await.unwrap();
        let err = catalog.find_indicator("UWU_T").await.unwrap_err();
        assert!(matches!(err, StorageError::AmbiguousLookup { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_replacing_layer_detaches_entries() {
        let storage = MemoryStorage::new();
        let mut catalog = storage.catalog().await.unwrap();
        let entry = catalog
            .insert_entry(&NewCatalogEntry {
                table: "t".into(),
                column: "risk".into(),
                resolution: 6,
                year: None,
                indicator_id: None,
            })
            .await
            .unwrap();
        let layer = ContextualLayer::for_grid("risk", "Default");
        let first = catalog.replace_contextual_layer(&layer).await.unwrap();
        catalog.attach_contextual_layer(entry, first).await.unwrap();
        let second = catalog.replace_contextual_layer(&layer).await.unwrap();
        catalog.commit().await.unwrap();

        let state = storage.catalog_state();
        assert_eq!(state.layers.len(), 1);
        assert!(state.layers.contains_key(&second));
        assert_eq!(state.entries[0].contextual_layer_id, None);
    }

    #[tokio::test]
    async fn test_layer_with_unknown_category_rejected() {
        let storage = MemoryStorage::new();
        let mut catalog = storage.catalog().await.unwrap();
        let err = catalog
            .replace_contextual_layer(&ContextualLayer::for_grid("risk", "Weather"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownCategory { ref category } if category == "Weather"));
    }
}
