//! GeoJSON feature input.
//!
//! Vector sources are read as a GeoJSON FeatureCollection in WGS84
//! longitude/latitude. Other vector formats must be converted to GeoJSON
//! before ingestion.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GridError, Result};

/// A position as `[longitude, latitude, ...]`.
pub type Position = Vec<f64>;

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<Feature>,
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Features without geometry are allowed by GeoJSON and are skipped.
    pub geometry: Option<Geometry>,

    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    /// Attribute value; `None` if the property is absent.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }
}

/// GeoJSON geometry types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    /// Linear rings; the first is the exterior, the rest are holes.
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl FeatureCollection {
    /// Parse a FeatureCollection from GeoJSON text.
    pub fn from_json(json: &str, source: &str) -> Result<Self> {
        let collection: FeatureCollection =
            serde_json::from_str(json).map_err(|e| GridError::vector_read(source, e))?;
        if collection.type_ != "FeatureCollection" {
            return Err(GridError::vector_read(
                source,
                format!("expected a FeatureCollection, found {}", collection.type_),
            ));
        }
        Ok(collection)
    }
}

/// Extensions accepted as GeoJSON.
pub const GEOJSON_EXTENSIONS: &[&str] = &["geojson", "json"];

/// Vector extensions that are recognized but must be converted first.
pub const OTHER_VECTOR_EXTENSIONS: &[&str] = &["gpkg", "shp"];

/// Read a GeoJSON file.
pub fn read_geojson(path: impl AsRef<Path>) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !GEOJSON_EXTENSIONS.contains(&extension.as_str()) {
        return Err(GridError::UnsupportedFormat(format!(
            "{name}: only GeoJSON vector files are supported"
        )));
    }
    let json = fs::read_to_string(path)?;
    FeatureCollection::from_json(&json, &name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_collection() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [2.35, 48.85]},
                 "properties": {"risk": 3}},
                {"type": "Feature", "geometry": null, "properties": {"risk": 1}},
                {"type": "Feature", "geometry": {"type": "Polygon",
                 "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}, "properties": null}
            ]
        }"#;
        let fc = FeatureCollection::from_json(json, "test.geojson").unwrap();
        assert_eq!(fc.features.len(), 3);
        assert_eq!(fc.features[0].attribute("risk"), Some(&Value::from(3)));
        assert!(fc.features[1].geometry.is_none());
        assert!(fc.features[2].attribute("risk").is_none());
        assert!(matches!(
            fc.features[2].geometry,
            Some(Geometry::Polygon { .. })
        ));
    }

    #[test]
    fn test_rejects_bare_feature() {
        let json = r#"{"type": "Feature", "features": []}"#;
        let err = FeatureCollection::from_json(json, "x.geojson").unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
    }

    #[test]
    fn test_rejects_other_formats() {
        let err = read_geojson("/data/areas.gpkg").unwrap_err();
        assert!(matches!(err, GridError::UnsupportedFormat(_)));
    }
}
