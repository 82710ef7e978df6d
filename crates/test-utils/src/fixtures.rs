//! Fixture writers for raster and vector test inputs.
//!
//! GeoTIFFs are written with the same tags real datasets carry:
//! ModelPixelScale, ModelTiepoint, GeoKeyDirectory and GDAL_NODATA.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tiff::encoder::colortype::ColorType;
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::TiffResult;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;
const STRIP_OFFSETS: u16 = 273;

/// Georeferencing for a north-up fixture raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffSpec {
    pub width: u32,
    pub height: u32,
    /// Longitude (or easting) of the upper-left corner.
    pub west: f64,
    /// Latitude (or northing) of the upper-left corner.
    pub north: f64,
    pub pixel_size: f64,
    pub epsg: u16,
    pub pixel_is_point: bool,
    pub nodata: Option<String>,
    pub rows_per_strip: Option<u32>,
}

impl GeoTiffSpec {
    /// A WGS84 raster with its upper-left corner at (`west`, `north`).
    pub fn wgs84(width: u32, height: u32, west: f64, north: f64, pixel_size: f64) -> Self {
        Self {
            width,
            height,
            west,
            north,
            pixel_size,
            epsg: 4326,
            pixel_is_point: false,
            nodata: None,
            rows_per_strip: None,
        }
    }

    pub fn with_nodata(mut self, nodata: impl Into<String>) -> Self {
        self.nodata = Some(nodata.into());
        self
    }

    pub fn with_epsg(mut self, epsg: u16) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows);
        self
    }

    pub fn with_pixel_is_point(mut self) -> Self {
        self.pixel_is_point = true;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// GeoKey directory: header plus model type, raster type and CRS code.
    fn geo_keys(&self) -> Vec<u16> {
        let geographic = self.epsg == 4326;
        let model_type = if geographic { 2 } else { 1 };
        let raster_type = if self.pixel_is_point { 2 } else { 1 };
        let crs_key = if geographic { 2048 } else { 3072 };
        vec![
            1, 1, 0, 3, //
            1024, 0, 1, model_type, //
            1025, 0, 1, raster_type, //
            crs_key, 0, 1, self.epsg,
        ]
    }
}

/// Write a single-band GeoTIFF.
///
/// `C` picks the sample type, e.g. `colortype::Gray32Float` or
/// `colortype::Gray8`.
///
/// ```ignore
/// use tiff::encoder::colortype::Gray32Float;
/// let spec = GeoTiffSpec::wgs84(4, 4, 10.0, 50.0, 0.5).with_nodata("-9999");
/// write_geotiff::<Gray32Float>(&path, &spec, &create_test_grid(4, 4))?;
/// ```
pub fn write_geotiff<C>(path: &Path, spec: &GeoTiffSpec, data: &[C::Inner]) -> TiffResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<C>(spec.width, spec.height)?;
    if let Some(rows) = spec.rows_per_strip {
        image.rows_per_strip(rows)?;
    }

    let directory = image.encoder();
    directory.write_tag(
        Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE),
        &[spec.pixel_size, spec.pixel_size, 0.0][..],
    )?;
    directory.write_tag(
        Tag::from_u16_exhaustive(MODEL_TIEPOINT),
        &[0.0, 0.0, 0.0, spec.west, spec.north, 0.0][..],
    )?;
    directory.write_tag(
        Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY),
        &spec.geo_keys()[..],
    )?;
    if let Some(nodata) = &spec.nodata {
        directory.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), nodata.as_str())?;
    }

    image.write_data(data)
}

/// Point strip `strip` of a written GeoTIFF past the end of the file.
///
/// The raster still opens, but decoding that strip fails. Only classic
/// (non-BigTIFF) files are supported.
pub fn break_strip(path: &Path, strip: usize) -> io::Result<()> {
    let mut bytes = std::fs::read(path)?;
    let big_endian = match bytes.get(..2) {
        Some(b"II") => false,
        Some(b"MM") => true,
        _ => return Err(invalid_tiff("missing byte order mark")),
    };

    let ifd = read_u32(&bytes, 4, big_endian)? as usize;
    let entries = read_u16(&bytes, ifd, big_endian)? as usize;
    for i in 0..entries {
        let entry = ifd + 2 + i * 12;
        if read_u16(&bytes, entry, big_endian)? != STRIP_OFFSETS {
            continue;
        }
        let size = match read_u16(&bytes, entry + 2, big_endian)? {
            3 => 2,
            4 => 4,
            other => return Err(invalid_tiff(format!("StripOffsets has field type {other}"))),
        };
        let count = read_u32(&bytes, entry + 4, big_endian)? as usize;
        if strip >= count {
            return Err(invalid_tiff(format!("strip {strip} of {count}")));
        }
        let values = if count * size <= 4 {
            entry + 8
        } else {
            read_u32(&bytes, entry + 8, big_endian)? as usize
        };
        let at = values + strip * size;
        let past_end: Vec<u8> = match (size, big_endian) {
            (2, false) => u16::MAX.to_le_bytes().to_vec(),
            (2, true) => u16::MAX.to_be_bytes().to_vec(),
            (_, false) => u32::MAX.to_le_bytes().to_vec(),
            (_, true) => u32::MAX.to_be_bytes().to_vec(),
        };
        bytes
            .get_mut(at..at + size)
            .ok_or_else(|| invalid_tiff("StripOffsets outside the file"))?
            .copy_from_slice(&past_end);
        return std::fs::write(path, bytes);
    }
    Err(invalid_tiff("no StripOffsets tag"))
}

fn invalid_tiff(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}

fn read_u16(bytes: &[u8], at: usize, big_endian: bool) -> io::Result<u16> {
    let raw: [u8; 2] = bytes
        .get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid_tiff("truncated directory"))?;
    Ok(if big_endian {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    })
}

fn read_u32(bytes: &[u8], at: usize, big_endian: bool) -> io::Result<u32> {
    let raw: [u8; 4] = bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid_tiff("truncated directory"))?;
    Ok(if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    })
}

/// A GeoJSON Point feature with the given properties.
pub fn point_feature(lng: f64, lat: f64, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [lng, lat]},
        "properties": properties,
    })
}

/// A GeoJSON LineString feature.
pub fn line_feature(coordinates: &[(f64, f64)], properties: Value) -> Value {
    let coordinates: Vec<[f64; 2]> = coordinates.iter().map(|(x, y)| [*x, *y]).collect();
    json!({
        "type": "Feature",
        "geometry": {"type": "LineString", "coordinates": coordinates},
        "properties": properties,
    })
}

/// A square Polygon feature with its south-west corner at (`west`, `south`).
pub fn square_feature(west: f64, south: f64, size: f64, properties: Value) -> Value {
    let (east, north) = (west + size, south + size);
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[west, south], [east, south], [east, north], [west, north], [west, south]]],
        },
        "properties": properties,
    })
}

/// Wrap features in a FeatureCollection.
pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({"type": "FeatureCollection", "features": features})
}

/// Write a FeatureCollection to `dir/name`, returning the path.
pub fn write_geojson(dir: &Path, name: &str, features: Vec<Value>) -> io::Result<PathBuf> {
    let path = dir.join(name);
    let text = serde_json::to_string_pretty(&feature_collection(features))?;
    std::fs::write(&path, text)?;
    Ok(path)
}
