//! What a grid table's columns are linked to in the catalog.

use std::fmt;

use storage::MaterialLinkType;

use crate::error::{IngestionError, Result};
use crate::naming::DatasetIdConvention;

/// Import kinds accepted on the command line.
pub const IMPORT_KINDS: &[&str] = &[
    "production",
    "harvest_area",
    "indicator",
    "material_indicator",
    "contextual",
];

/// Business linkage of a grid table, chosen once per registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Producer material links, materials resolved from `dataset`.
    Production { dataset: String },
    /// Harvest material links, materials resolved from `dataset`.
    HarvestArea { dataset: String },
    /// Every entry points at one indicator.
    Indicator { name_code: String },
    /// Indicator on every entry plus one indicator link per root material.
    MaterialIndicator { name_code: String },
    /// No entity linkage; contextual layer only.
    Contextual,
}

impl ImportKind {
    /// Build from a kind name and its dataset argument, which is the
    /// indicator name code for the indicator kinds.
    pub fn parse(kind: &str, dataset: &str) -> Result<Self> {
        let kind = match kind.to_ascii_lowercase().replace('-', "_").as_str() {
            "production" => ImportKind::Production {
                dataset: dataset.to_string(),
            },
            "harvest_area" => ImportKind::HarvestArea {
                dataset: dataset.to_string(),
            },
            "indicator" => ImportKind::Indicator {
                name_code: dataset.to_string(),
            },
            "material_indicator" => ImportKind::MaterialIndicator {
                name_code: dataset.to_string(),
            },
            "contextual" => return Ok(ImportKind::Contextual),
            other => {
                return Err(IngestionError::InvalidConfig(format!(
                    "unknown import kind {other}, expected one of: {}",
                    IMPORT_KINDS.join(", ")
                )))
            }
        };
        if dataset.trim().is_empty() {
            return Err(IngestionError::InvalidConfig(format!(
                "import kind {} needs a dataset",
                kind.name()
            )));
        }
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImportKind::Production { .. } => "production",
            ImportKind::HarvestArea { .. } => "harvest_area",
            ImportKind::Indicator { .. } => "indicator",
            ImportKind::MaterialIndicator { .. } => "material_indicator",
            ImportKind::Contextual => "contextual",
        }
    }

    /// Indicator name code for the indicator kinds.
    pub fn indicator(&self) -> Option<&str> {
        match self {
            ImportKind::Indicator { name_code } | ImportKind::MaterialIndicator { name_code } => {
                Some(name_code)
            }
            _ => None,
        }
    }

    /// How each registered column is linked to materials, if at all.
    pub fn column_linkage(&self) -> Option<ColumnLinkage<'_>> {
        match self {
            ImportKind::Production { dataset } => Some(ColumnLinkage::Material {
                link_type: MaterialLinkType::Producer,
                dataset,
            }),
            ImportKind::HarvestArea { dataset } => Some(ColumnLinkage::Material {
                link_type: MaterialLinkType::Harvest,
                dataset,
            }),
            ImportKind::MaterialIndicator { name_code } => {
                Some(ColumnLinkage::MaterialIndicator { name_code })
            }
            ImportKind::Indicator { .. } | ImportKind::Contextual => None,
        }
    }
}

/// Per-column material linkage of an import kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLinkage<'a> {
    /// One `material_to_h3` link of `link_type` per matching material.
    Material {
        link_type: MaterialLinkType,
        dataset: &'a str,
    },
    /// One `material_indicator_to_h3` link per matching root material.
    MaterialIndicator { name_code: &'a str },
}

impl ColumnLinkage<'_> {
    pub fn convention(&self) -> DatasetIdConvention {
        match self {
            ColumnLinkage::Material { .. } => DatasetIdConvention::SnakeSuffixV1,
            ColumnLinkage::MaterialIndicator { .. } => DatasetIdConvention::PerTonneProductionV1,
        }
    }

    /// Material `"datasetId"` for `column`.
    pub fn dataset_id(&self, column: &str) -> Option<String> {
        let dataset = match self {
            ColumnLinkage::Material { dataset, .. } => *dataset,
            ColumnLinkage::MaterialIndicator { .. } => "",
        };
        self.convention().dataset_id(dataset, column)
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportKind::Production { dataset } | ImportKind::HarvestArea { dataset } => {
                write!(f, "{}({dataset})", self.name())
            }
            ImportKind::Indicator { name_code } | ImportKind::MaterialIndicator { name_code } => {
                write!(f, "{}({name_code})", self.name())
            }
            ImportKind::Contextual => f.write_str(self.name()),
        }
    }
}
