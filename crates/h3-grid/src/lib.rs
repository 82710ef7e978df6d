//! H3 grid data model and source conversion.
//!
//! Turns aligned single-band rasters and GeoJSON vector files into rows
//! keyed by H3 cell, ready to be bulk-loaded into a grid table.
//!
//! # Architecture
//!
//! ```text
//! GeoTIFF files                      GeoJSON file
//!      │                                  │
//!      ▼                                  ▼
//! GeoTiffReader::open (descriptor)   read_geojson
//!      │                                  │
//!      ├─► validate_all (CRS, transform, shape)
//!      │                                  │
//!      ▼                                  ▼
//! read_rows(band) ─► RasterConverter  VectorConverter
//!                     ::convert_window    ::convert (conflict check)
//!                          │                  │
//!                          └──────┬───────────┘
//!                                 ▼
//!                       GridBatch (HexCell → values)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use h3_grid::{GeoTiffReader, RasterConverter, Window};
//!
//! let mut reader = GeoTiffReader::open("cropA.tif")?;
//! let band = reader.read_rows(0, 512)?;
//! let converter = RasterConverter::new(6)?;
//! let window = Window::new(0, 0, 512, 512);
//! let cells = converter.convert_window(&band, &window, reader.descriptor())?;
//! ```

pub mod alignment;
pub mod cell;
pub mod convert;
pub mod error;
pub mod raster;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use alignment::{validate_alignment, validate_all, TRANSFORM_TOLERANCE};
pub use cell::HexCell;
pub use convert::{RasterConverter, VectorConverter};
pub use error::{
    AlignmentError, AlignmentProperty, DuplicateCellConflictError, GridError, Result,
};
pub use raster::{
    BlockLayout, Crs, GeoTiffReader, GeoTransform, RasterBand, RasterData, RasterDescriptor,
    Window,
};
pub use types::{
    ColumnSpec, DataType, GridBatch, GridRow, GridValue, KeyType, SchemaColumn, StorageType,
    TableSchema, KEY_COLUMN,
};
pub use vector::{read_geojson, Feature, FeatureCollection, Geometry};
