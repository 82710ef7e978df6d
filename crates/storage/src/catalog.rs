//! Catalog records and the transactional catalog store.
//!
//! The catalog describes grid tables for the rest of the platform:
//! - `h3_data`: one entry per (grid table, column)
//! - `material_to_h3`: material to entry links, typed producer/harvest
//! - `material_indicator_to_h3`: material and indicator to entry links
//! - `contextual_layer`: named map layers, optionally backed by an entry

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Values of `contextual_layer_category_enum` in the platform schema.
pub const CONTEXTUAL_LAYER_CATEGORIES: &[&str] = &[
    "Environmental datasets",
    "Business datasets",
    "Food and agriculture",
    "Default",
];

/// Catalog tables owned by the platform schema. Never grid tables.
pub const CATALOG_TABLES: &[&str] = &[
    "contextual_layer",
    "indicator",
    "material",
    "h3_data",
    "material_to_h3",
    "material_indicator_to_h3",
];

/// An `h3_data` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub table: String,
    pub column: String,
    pub resolution: u8,
    pub year: Option<i32>,
    pub indicator_id: Option<Uuid>,
    pub contextual_layer_id: Option<Uuid>,
}

/// Values for a new `h3_data` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalogEntry {
    pub table: String,
    pub column: String,
    pub resolution: u8,
    pub year: Option<i32>,
    pub indicator_id: Option<Uuid>,
}

/// `material_to_h3."type"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialLinkType {
    Producer,
    Harvest,
}

impl MaterialLinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialLinkType::Producer => "producer",
            MaterialLinkType::Harvest => "harvest",
        }
    }
}

impl fmt::Display for MaterialLinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLink {
    pub material_id: Uuid,
    pub entry_id: Uuid,
    pub link_type: MaterialLinkType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorLink {
    pub material_id: Uuid,
    pub indicator_id: Uuid,
    pub entry_id: Uuid,
}

/// A contextual layer to create or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualLayer {
    pub name: String,
    pub category: String,
    pub metadata: Option<serde_json::Value>,
    pub tiler_url: Option<String>,
    pub default_tiler_params: Option<serde_json::Value>,
}

impl ContextualLayer {
    /// A layer backed by an `h3_data` entry rather than a tiler.
    pub fn for_grid(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            metadata: None,
            tiler_url: None,
            default_tiler_params: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A catalog write transaction.
///
/// Every method runs inside the same transaction; nothing is visible until
/// `commit`. Dropping the store without committing rolls back.
#[async_trait]
pub trait CatalogStore: Send {
    /// Allowed contextual layer categories.
    async fn contextual_layer_categories(&mut self) -> Result<Vec<String>>;

    async fn entries_for_table(&mut self, table: &str) -> Result<Vec<CatalogEntry>>;

    /// Delete material and indicator links owned by any entry of `table`.
    async fn delete_links_for_table(&mut self, table: &str) -> Result<u64>;

    /// Delete every entry of `table`.
    async fn delete_entries_for_table(&mut self, table: &str) -> Result<u64>;

    async fn insert_entry(&mut self, entry: &NewCatalogEntry) -> Result<Uuid>;

    /// Indicator id by name code. More than one match is `AmbiguousLookup`.
    async fn find_indicator(&mut self, name_code: &str) -> Result<Option<Uuid>>;

    /// Materials whose `"datasetId"` equals `dataset_id`.
    async fn find_materials(&mut self, dataset_id: &str, roots_only: bool) -> Result<Vec<Uuid>>;

    /// Replace the material's link of `link_type` with one to `entry_id`.
    async fn replace_material_link(&mut self, link: &MaterialLink) -> Result<()>;

    /// Replace the material's indicator link.
    async fn replace_indicator_link(&mut self, link: &IndicatorLink) -> Result<()>;

    /// Delete any layer with the same name and insert this one.
    async fn replace_contextual_layer(&mut self, layer: &ContextualLayer) -> Result<Uuid>;

    async fn attach_contextual_layer(&mut self, entry_id: Uuid, layer_id: Uuid) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_names() {
        assert_eq!(MaterialLinkType::Producer.to_string(), "producer");
        assert_eq!(MaterialLinkType::Harvest.as_str(), "harvest");
        let json = serde_json::to_string(&MaterialLinkType::Harvest).unwrap();
        assert_eq!(json, "\"harvest\"");
    }

    #[test]
    fn test_grid_layer_has_no_tiler() {
        let layer = ContextualLayer::for_grid("Deforestation risk", "Default")
            .with_metadata(serde_json::json!({"source": "test"}));
        assert!(layer.tiler_url.is_none());
        assert_eq!(layer.metadata.unwrap()["source"], "test");
    }
}
