//! Raster window to hex cells.

use std::collections::BTreeSet;

use geo_types::{LineString, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::Resolution;

use crate::cell::{self, HexCell};
use crate::error::{GridError, Result};
use crate::raster::{GeoTransform, RasterBand, RasterDescriptor, Window};
use crate::types::GridValue;

/// Slack added around a window before tiling; exact ownership is decided
/// per pixel afterwards.
const EXTENT_MARGIN_DEG: f64 = 1e-7;

/// Widest longitude span tiled as one polygon.
const MAX_SLAB_WIDTH_DEG: f64 = 90.0;

/// Converts raster windows to cell values by nearest-centroid sampling.
///
/// A cell takes the value of the pixel containing the cell's centroid.
/// Each cell therefore belongs to exactly one pixel, and so to exactly one
/// block window. Nodata and NaN pixels produce no cell.
#[derive(Debug, Clone, Copy)]
pub struct RasterConverter {
    resolution: Resolution,
}

impl RasterConverter {
    pub fn new(resolution: u8) -> Result<Self> {
        Ok(Self {
            resolution: cell::resolution(resolution)?,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Convert one window of a band read from `raster`.
    ///
    /// Output is sorted by cell and holds each cell at most once.
    pub fn convert_window(
        &self,
        band: &RasterBand,
        window: &Window,
        raster: &RasterDescriptor,
    ) -> Result<Vec<(HexCell, GridValue)>> {
        if !raster.crs.is_wgs84() {
            return Err(GridError::UnsupportedCrs {
                path: raster.name(),
                crs: raster.crs.to_string(),
            });
        }

        let transform = &raster.transform;
        let mut out = Vec::new();
        for cell in self.candidate_cells(window, transform)? {
            let (lat, lng) = cell.centroid();
            let Some((col, row)) = pixel_of(transform, lng, lat) else {
                continue;
            };
            if !window.contains(col, row) {
                continue;
            }
            let Some(value) = band.value_at(col, row) else {
                continue;
            };
            if raster.is_nodata(&value) {
                continue;
            }
            out.push((cell, value));
        }
        Ok(out)
    }

    /// Cells whose centroid may fall inside the window.
    fn candidate_cells(&self, window: &Window, transform: &GeoTransform) -> Result<BTreeSet<HexCell>> {
        let c0 = window.col_off as f64;
        let r0 = window.row_off as f64;
        let c1 = (window.col_off + window.width) as f64;
        let r1 = (window.row_off + window.height) as f64;
        let corners = [
            transform.apply(c0, r0),
            transform.apply(c1, r0),
            transform.apply(c1, r1),
            transform.apply(c0, r1),
        ];

        let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let min_x = (min_x - EXTENT_MARGIN_DEG).max(-180.0);
        let max_x = (max_x + EXTENT_MARGIN_DEG).min(180.0);
        let min_y = (min_y - EXTENT_MARGIN_DEG).max(-90.0);
        let max_y = (max_y + EXTENT_MARGIN_DEG).min(90.0);

        let mut cells = BTreeSet::new();
        if !(min_x < max_x && min_y < max_y) {
            return Ok(cells);
        }

        // Long edges would be read as crossing the antimeridian.
        let slabs = ((max_x - min_x) / MAX_SLAB_WIDTH_DEG).ceil().max(1.0) as usize;
        let step = (max_x - min_x) / slabs as f64;
        for i in 0..slabs {
            let west = min_x + step * i as f64;
            let east = if i + 1 == slabs { max_x } else { west + step };
            let mut tiler = TilerBuilder::new(self.resolution)
                .containment_mode(ContainmentMode::ContainsCentroid)
                .build();
            tiler
                .add(rectangle(west, min_y, east, max_y))
                .map_err(|e| GridError::unsupported_raster("window", e.to_string()))?;
            cells.extend(tiler.into_coverage().map(HexCell::from));
        }
        Ok(cells)
    }
}

fn rectangle(west: f64, south: f64, east: f64, north: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]),
        vec![],
    )
}

/// Pixel containing a world coordinate, if it lies at or after the origin.
fn pixel_of(transform: &GeoTransform, x: f64, y: f64) -> Option<(usize, usize)> {
    let (col, row) = transform.invert(x, y)?;
    if !(col >= 0.0 && row >= 0.0) {
        return None;
    }
    Some((col.floor() as usize, row.floor() as usize))
}
