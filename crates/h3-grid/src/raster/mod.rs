//! Raster sources: GeoTIFF reading, pixel buffers and block windows.

pub mod data;
pub mod geotiff;
pub mod transform;
pub mod window;

pub use data::{nodata_for, RasterBand, RasterData};
pub use geotiff::{GeoTiffReader, RasterDescriptor};
pub use transform::{Crs, GeoTransform};
pub use window::{BlockLayout, Window};
