//! Error types for hex-cell conversion.

use std::fmt;

use thiserror::Error;

use crate::cell::HexCell;
use crate::types::DataType;

/// Raster property compared by the alignment validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentProperty {
    Crs,
    Transform,
    Shape,
}

impl fmt::Display for AlignmentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentProperty::Crs => write!(f, "CRS"),
            AlignmentProperty::Transform => write!(f, "transform"),
            AlignmentProperty::Shape => write!(f, "shape"),
        }
    }
}

/// A candidate raster does not line up with the reference raster.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "raster files have different {property}: {reference} {reference_value} vs {candidate} {candidate_value}"
)]
pub struct AlignmentError {
    pub property: AlignmentProperty,
    /// File name of the reference raster.
    pub reference: String,
    /// File name of the rejected raster.
    pub candidate: String,
    pub reference_value: String,
    pub candidate_value: String,
}

/// Two vector features claim the same cell with different attribute values.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "hex cell {cell} is claimed by features with different values for {column}: {}",
    .values.join(" vs ")
)]
pub struct DuplicateCellConflictError {
    pub cell: HexCell,
    pub column: String,
    pub values: Vec<String>,
}

/// Errors that can occur while reading sources or converting them to cells.
#[derive(Error, Debug)]
pub enum GridError {
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    DuplicateCellConflict(#[from] DuplicateCellConflictError),

    #[error("invalid H3 resolution {0}, expected 0-15")]
    InvalidResolution(u8),

    #[error("invalid H3 cell index: {0}")]
    InvalidHexCell(String),

    #[error("{path}: unsupported CRS {crs}, only EPSG:4326 rasters can be converted")]
    UnsupportedCrs { path: String, crs: String },

    #[error("{path}: nodata value {value} is not representable as {dtype}")]
    InvalidNodata {
        path: String,
        value: String,
        dtype: DataType,
    },

    #[error("{path}: unsupported raster layout: {reason}")]
    UnsupportedRaster { path: String, reason: String },

    #[error("{path}: failed to read raster: {message}")]
    RasterRead { path: String, message: String },

    #[error("rows {start}..{end} are outside raster height {height}")]
    OutOfBounds {
        start: usize,
        end: usize,
        height: usize,
    },

    #[error("{path}: failed to read vector file: {message}")]
    VectorRead { path: String, message: String },

    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid geometry in feature {feature}: {message}")]
    InvalidGeometry { feature: usize, message: String },

    #[error("feature {feature} has no attribute {attribute}")]
    MissingAttribute { feature: usize, attribute: String },

    #[error("attribute {attribute} mixes {first} values with {other}")]
    MixedAttributeTypes {
        attribute: String,
        first: DataType,
        other: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridError {
    /// Create a RasterRead error.
    pub fn raster_read(path: impl Into<String>, message: impl ToString) -> Self {
        Self::RasterRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an UnsupportedRaster error.
    pub fn unsupported_raster(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedRaster {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a VectorRead error.
    pub fn vector_read(path: impl Into<String>, message: impl ToString) -> Self {
        Self::VectorRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(feature: usize, message: impl ToString) -> Self {
        Self::InvalidGeometry {
            feature,
            message: message.to_string(),
        }
    }
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
