//! Contextual layers served by a tiler rather than a grid table.

use std::collections::BTreeMap;

use serde_json::Value;
use storage::ContextualLayer;

use crate::error::{IngestionError, Result};

/// Tile URL template of the platform's own COG tiler.
pub const COG_TILER_URL: &str = "/tiler/cog/tiles/{z}/{x}/{y}";

/// Where the layer's tiles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    /// A complete tiler URL hosted elsewhere.
    External(String),
    /// A COG served by the built-in tiler.
    Cog(String),
}

impl LayerSource {
    /// `s3://` and `https://` values are external URLs; anything else is a
    /// COG name.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("s3://") || value.starts_with("https://") {
            LayerSource::External(value.to_string())
        } else {
            LayerSource::Cog(value.to_string())
        }
    }
}

/// A standalone contextual layer to create or replace.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    pub name: String,
    pub category: String,
    pub metadata: Option<Value>,
    pub source: LayerSource,
    /// Default tiler parameters. Ignored for external tilers.
    pub tiler_params: BTreeMap<String, String>,
}

impl LayerRequest {
    pub fn into_layer(self) -> ContextualLayer {
        let (tiler_url, default_tiler_params) = match self.source {
            LayerSource::External(url) => (url, None),
            LayerSource::Cog(cog) => {
                let mut params: serde_json::Map<String, Value> = self
                    .tiler_params
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                params.insert("cog_name".to_string(), Value::String(cog));
                (COG_TILER_URL.to_string(), Some(Value::Object(params)))
            }
        };
        ContextualLayer {
            name: self.name,
            category: self.category,
            metadata: self.metadata,
            tiler_url: Some(tiler_url),
            default_tiler_params,
        }
    }
}

/// Parse a `key=value` tiler parameter.
pub fn parse_tiler_param(param: &str) -> Result<(String, String)> {
    match param.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(IngestionError::InvalidConfig(format!(
            "tiler parameter {param} is not key=value"
        ))),
    }
}
