//! Ingestion and catalog settings.

use std::fmt;
use std::str::FromStr;

use h3_grid::KeyType;
use serde::Deserialize;

use crate::error::{IngestionError, Result};

/// Conversion and loading settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target H3 resolution (0-15).
    pub h3_resolution: u8,
    /// Conversion worker threads.
    pub workers: usize,
    /// Block window edge in pixels.
    pub block_size: usize,
    /// Converted batches buffered ahead of the loader. Defaults to twice
    /// the worker count.
    pub channel_capacity: Option<usize>,
    /// Type of the grid table key column.
    pub key_type: KeyType,
    /// Nodata sentinel overriding the rasters' own.
    pub nodata: Option<f64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            h3_resolution: 6,
            workers: 4,
            block_size: 512,
            channel_capacity: None,
            key_type: KeyType::H3Index,
            nodata: None,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.h3_resolution > 15 {
            return Err(IngestionError::InvalidConfig(format!(
                "h3_resolution must be 0-15, got {}",
                self.h3_resolution
            )));
        }
        if self.workers == 0 {
            return Err(IngestionError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "block_size must be at least 1".into(),
            ));
        }
        if self.channel_capacity == Some(0) {
            return Err(IngestionError::InvalidConfig(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.nodata.is_some_and(|v| v.is_infinite()) {
            return Err(IngestionError::InvalidConfig(
                "nodata must be finite or NaN".into(),
            ));
        }
        Ok(())
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.workers * 2).max(1)
    }
}

/// What to do when a column's material cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMaterialPolicy {
    /// Log and leave the column without material links.
    #[default]
    Skip,
    /// Abort the registration.
    Fail,
}

impl FromStr for MissingMaterialPolicy {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(MissingMaterialPolicy::Skip),
            "fail" => Ok(MissingMaterialPolicy::Fail),
            other => Err(IngestionError::InvalidConfig(format!(
                "missing_material must be skip or fail, got {other}"
            ))),
        }
    }
}

impl fmt::Display for MissingMaterialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingMaterialPolicy::Skip => f.write_str("skip"),
            MissingMaterialPolicy::Fail => f.write_str("fail"),
        }
    }
}

/// Catalog registration settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub missing_material: MissingMaterialPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.h3_resolution, 6);
        assert_eq!(config.workers, 4);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.channel_capacity(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = IngestConfig {
            h3_resolution: 16,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IngestConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IngestConfig {
            nodata: Some(f64::NAN),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_material_policy() {
        assert_eq!("FAIL".parse::<MissingMaterialPolicy>().unwrap(), MissingMaterialPolicy::Fail);
        assert_eq!(MissingMaterialPolicy::default().to_string(), "skip");
        assert!("ignore".parse::<MissingMaterialPolicy>().is_err());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"h3_resolution": 8, "key_type": "text"}"#).unwrap();
        assert_eq!(config.h3_resolution, 8);
        assert_eq!(config.key_type, KeyType::Text);
        assert_eq!(config.workers, 4);
    }
}
