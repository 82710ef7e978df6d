//! Conversion of raster windows and vector features to hex cells.

pub mod raster;
pub mod vector;

pub use raster::RasterConverter;
pub use vector::{attribute_type, VectorConverter};
