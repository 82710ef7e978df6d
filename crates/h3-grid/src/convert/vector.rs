//! Vector features to hex cells.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use geo_types::{Line, LineString, Polygon};
use h3o::geom::{ContainmentMode, PlotterBuilder, TilerBuilder};
use h3o::Resolution;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cell::{self, HexCell};
use crate::error::{DuplicateCellConflictError, GridError, Result};
use crate::types::{ColumnSpec, DataType, GridBatch, GridRow, GridValue};
use crate::vector::{FeatureCollection, Geometry, Position};

/// Converts features carrying one attribute into a single-column batch.
///
/// Points map to their containing cell, lines to every cell they cross and
/// polygons to every cell intersecting them. A cell reached by several
/// features keeps one row when the values agree; disagreeing values fail
/// with a `DuplicateCellConflictError`.
#[derive(Debug, Clone, Copy)]
pub struct VectorConverter {
    resolution: Resolution,
}

impl VectorConverter {
    pub fn new(resolution: u8) -> Result<Self> {
        Ok(Self {
            resolution: cell::resolution(resolution)?,
        })
    }

    /// Convert `attribute` of every feature into a column named `column`.
    pub fn convert(
        &self,
        collection: &FeatureCollection,
        attribute: &str,
        column: &str,
    ) -> Result<GridBatch> {
        let features: Vec<_> = collection
            .features
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| match &f.geometry {
                Some(geometry) => Some((idx, f, geometry)),
                None => {
                    warn!(feature = idx, "Skipping feature without geometry");
                    None
                }
            })
            .collect();

        let mut values = Vec::with_capacity(features.len());
        for (idx, feature, _) in &features {
            let value = feature
                .attribute(attribute)
                .ok_or_else(|| GridError::MissingAttribute {
                    feature: *idx,
                    attribute: attribute.to_string(),
                })?;
            values.push(value);
        }
        let dtype = attribute_type(attribute, &values)?;

        let mut claimed: BTreeMap<HexCell, Option<GridValue>> = BTreeMap::new();
        let mut collapsed = 0usize;
        for ((idx, _, geometry), raw) in features.iter().zip(&values) {
            let value = to_grid_value(raw, dtype);
            let mut cells = Vec::new();
            self.collect_cells(geometry, *idx, &mut cells)?;

            for cell in cells {
                match claimed.entry(cell) {
                    Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                    Entry::Occupied(existing) => {
                        if !same_value(existing.get(), &value) {
                            return Err(DuplicateCellConflictError {
                                cell,
                                column: column.to_string(),
                                values: vec![describe(existing.get()), describe(&value)],
                            }
                            .into());
                        }
                        collapsed += 1;
                    }
                }
            }
        }

        if collapsed > 0 {
            debug!(column = %column, collapsed, "Collapsed duplicate cells with equal values");
        }

        let mut batch = GridBatch::new(vec![ColumnSpec::new(column, dtype)]);
        batch.rows = claimed
            .into_iter()
            .map(|(cell, value)| GridRow {
                cell,
                values: vec![value],
            })
            .collect();
        Ok(batch)
    }

    fn collect_cells(&self, geometry: &Geometry, feature: usize, out: &mut Vec<HexCell>) -> Result<()> {
        match geometry {
            Geometry::Point { coordinates } => out.push(self.point_cell(coordinates, feature)?),
            Geometry::MultiPoint { coordinates } => {
                for p in coordinates {
                    out.push(self.point_cell(p, feature)?);
                }
            }
            Geometry::LineString { coordinates } => {
                self.plot(std::slice::from_ref(coordinates), feature, out)?
            }
            Geometry::MultiLineString { coordinates } => self.plot(coordinates, feature, out)?,
            Geometry::Polygon { coordinates } => {
                self.tile(std::slice::from_ref(coordinates), feature, out)?
            }
            Geometry::MultiPolygon { coordinates } => self.tile(coordinates, feature, out)?,
            Geometry::GeometryCollection { geometries } => {
                for g in geometries {
                    self.collect_cells(g, feature, out)?;
                }
            }
        }
        Ok(())
    }

    fn point_cell(&self, p: &Position, feature: usize) -> Result<HexCell> {
        let (x, y) = xy(p, feature)?;
        HexCell::from_coords(y, x, self.resolution)
            .map_err(|e| GridError::invalid_geometry(feature, e))
    }

    fn plot(&self, lines: &[Vec<Position>], feature: usize, out: &mut Vec<HexCell>) -> Result<()> {
        let mut plotter = PlotterBuilder::new(self.resolution).build();
        for line in lines {
            match line.as_slice() {
                [] => return Err(GridError::invalid_geometry(feature, "empty line")),
                [single] => out.push(self.point_cell(single, feature)?),
                points => {
                    for pair in points.windows(2) {
                        let segment = Line::new(xy(&pair[0], feature)?, xy(&pair[1], feature)?);
                        plotter
                            .add(segment)
                            .map_err(|e| GridError::invalid_geometry(feature, e))?;
                    }
                }
            }
        }
        for cell in plotter.plot() {
            out.push(cell.map_err(|e| GridError::invalid_geometry(feature, e))?.into());
        }
        Ok(())
    }

    fn tile(&self, polygons: &[Vec<Vec<Position>>], feature: usize, out: &mut Vec<HexCell>) -> Result<()> {
        let mut tiler = TilerBuilder::new(self.resolution)
            .containment_mode(ContainmentMode::IntersectsBoundary)
            .build();
        for rings in polygons {
            let Some((exterior, holes)) = rings.split_first() else {
                return Err(GridError::invalid_geometry(feature, "polygon without rings"));
            };
            let exterior = ring(exterior, feature)?;
            let holes = holes
                .iter()
                .map(|h| ring(h, feature))
                .collect::<Result<Vec<_>>>()?;
            tiler
                .add(Polygon::new(exterior, holes))
                .map_err(|e| GridError::invalid_geometry(feature, e))?;
        }
        out.extend(tiler.into_coverage().map(HexCell::from));
        Ok(())
    }
}

fn xy(p: &Position, feature: usize) -> Result<(f64, f64)> {
    match p.as_slice() {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok((*x, *y)),
        _ => Err(GridError::invalid_geometry(
            feature,
            format!("invalid position {p:?}"),
        )),
    }
}

fn ring(positions: &[Position], feature: usize) -> Result<LineString<f64>> {
    if positions.len() < 3 {
        return Err(GridError::invalid_geometry(feature, "ring with fewer than 3 positions"));
    }
    let coords = positions
        .iter()
        .map(|p| xy(p, feature))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::from(coords))
}

/// Unified column type of a set of JSON attribute values.
///
/// Integers and floats widen to float64; nulls are ignored and an all-null
/// attribute becomes float64.
pub fn attribute_type(attribute: &str, values: &[&Value]) -> Result<DataType> {
    let mut dtype: Option<DataType> = None;
    for value in values {
        let this = match value {
            Value::Null => continue,
            Value::Bool(_) => DataType::Bool,
            Value::Number(n) if n.is_i64() => DataType::I64,
            Value::Number(_) => DataType::F64,
            Value::String(_) => DataType::Text,
            Value::Array(_) | Value::Object(_) => {
                return Err(GridError::UnsupportedFormat(format!(
                    "attribute {attribute} holds a non-scalar value"
                )))
            }
        };
        dtype = Some(match (dtype, this) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(DataType::I64), DataType::F64) | (Some(DataType::F64), DataType::I64) => {
                DataType::F64
            }
            (Some(a), b) => {
                return Err(GridError::MixedAttributeTypes {
                    attribute: attribute.to_string(),
                    first: a,
                    other: b.to_string(),
                })
            }
        });
    }
    Ok(dtype.unwrap_or(DataType::F64))
}

fn to_grid_value(value: &Value, dtype: DataType) -> Option<GridValue> {
    match (value, dtype) {
        (Value::Bool(b), _) => Some(GridValue::Bool(*b)),
        (Value::Number(n), DataType::I64) => n.as_i64().map(GridValue::I64),
        (Value::Number(n), _) => n.as_f64().map(GridValue::F64),
        (Value::String(s), _) => Some(GridValue::Text(s.clone())),
        _ => None,
    }
}

fn same_value(a: &Option<GridValue>, b: &Option<GridValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}

fn describe(value: &Option<GridValue>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NULL".to_string())
}
