//! Single-band GeoTIFF reader.
//!
//! Only the TIFF chunks (strips or tiles) overlapping a requested row range
//! are decoded, so a block scheduler can read a raster one band at a time.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::{GridError, Result};
use crate::raster::data::{nodata_for, RasterBand, RasterData};
use crate::raster::transform::{Crs, GeoTransform};
use crate::types::{DataType, GridValue};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Georeferencing and layout of one raster file.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDescriptor {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub dtype: DataType,
    pub transform: GeoTransform,
    pub crs: Crs,
    /// Nodata sentinel in the raster's own sample type.
    pub nodata: Option<GridValue>,
}

impl RasterDescriptor {
    /// File name used in messages.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether a sample is nodata: equal to the sentinel, or NaN.
    pub fn is_nodata(&self, value: &GridValue) -> bool {
        value.is_nan() || self.nodata.as_ref().is_some_and(|n| n.same_as(value))
    }
}

/// Reader over a single-band GeoTIFF.
pub struct GeoTiffReader {
    descriptor: RasterDescriptor,
    decoder: Decoder<BufReader<File>>,
    chunk_width: usize,
    chunk_height: usize,
}

impl GeoTiffReader {
    /// Open a GeoTIFF, taking nodata from its GDAL_NODATA tag.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_nodata(path, None)
    }

    /// Open a GeoTIFF, optionally overriding its nodata sentinel.
    ///
    /// The sentinel must be exactly representable in the raster's sample
    /// type, otherwise opening fails with `InvalidNodata`.
    pub fn open_with_nodata(path: impl AsRef<Path>, nodata_override: Option<f64>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let read_err = |e: tiff::TiffError| GridError::raster_read(name.as_str(), e);

        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(read_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(read_err)?;
        let dtype = sample_type(&mut decoder, &name)?;

        let keys = geo_keys(&mut decoder, &name)?;
        let crs = crs_from_keys(&keys);
        let mut transform = read_transform(&mut decoder, &name)?;
        if keys.get(&GT_RASTER_TYPE) == Some(&RASTER_PIXEL_IS_POINT) {
            transform = transform.shifted_half_pixel();
        }
        if !transform.is_invertible() {
            return Err(GridError::unsupported_raster(
                &name,
                format!("degenerate transform {transform}"),
            ));
        }

        let raw_nodata = match nodata_override {
            Some(v) => Some(v),
            None => gdal_nodata(&mut decoder, &name)?,
        };
        let nodata = match raw_nodata {
            Some(v) => Some(nodata_for(dtype, v).ok_or_else(|| GridError::InvalidNodata {
                path: name.clone(),
                value: v.to_string(),
                dtype,
            })?),
            None => None,
        };

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        debug!(
            path = %name,
            width,
            height,
            dtype = %dtype,
            crs = %crs,
            chunk_width,
            chunk_height,
            "Opened GeoTIFF"
        );

        Ok(Self {
            descriptor: RasterDescriptor {
                path: path.to_path_buf(),
                width: width as usize,
                height: height as usize,
                dtype,
                transform,
                crs,
                nodata,
            },
            decoder,
            chunk_width: chunk_width as usize,
            chunk_height: chunk_height as usize,
        })
    }

    pub fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    pub fn into_descriptor(self) -> RasterDescriptor {
        self.descriptor
    }

    /// Read `rows` full-width rows starting at `row_off`.
    pub fn read_rows(&mut self, row_off: usize, rows: usize) -> Result<RasterBand> {
        let width = self.descriptor.width;
        let height = self.descriptor.height;
        let end = row_off + rows;
        if rows == 0 || end > height {
            return Err(GridError::OutOfBounds {
                start: row_off,
                end,
                height,
            });
        }

        let name = self.descriptor.name();
        let mut data = RasterData::zeros(self.descriptor.dtype, width * rows).ok_or_else(|| {
            GridError::unsupported_raster(&name, "sample type has no pixel buffer")
        })?;

        let chunks_across = width.div_ceil(self.chunk_width);
        for chunk_row in row_off / self.chunk_height..=(end - 1) / self.chunk_height {
            let chunk_top = chunk_row * self.chunk_height;
            for chunk_col in 0..chunks_across {
                let index = (chunk_row * chunks_across + chunk_col) as u32;
                let (data_width, data_height) = self.decoder.chunk_data_dimensions(index);
                let (data_width, data_height) = (data_width as usize, data_height as usize);

                let decoded = self
                    .decoder
                    .read_chunk(index)
                    .map_err(|e| GridError::raster_read(name.as_str(), e))?;
                let chunk = raster_data(decoded).ok_or_else(|| {
                    GridError::unsupported_raster(&name, "unsupported chunk sample type")
                })?;

                let first = row_off.max(chunk_top);
                let last = end.min(chunk_top + data_height);
                let copied = data.copy_rect(
                    width,
                    (chunk_col * self.chunk_width, first - row_off),
                    &chunk,
                    data_width,
                    (0, first - chunk_top),
                    (data_width, last - first),
                );
                if !copied {
                    return Err(GridError::unsupported_raster(
                        &name,
                        format!("chunk {index} sample type differs from {}", self.descriptor.dtype),
                    ));
                }
            }
        }

        Ok(RasterBand {
            row_off,
            width,
            rows,
            data,
        })
    }
}

fn sample_type(decoder: &mut Decoder<BufReader<File>>, name: &str) -> Result<DataType> {
    let bits = match decoder
        .colortype()
        .map_err(|e| GridError::raster_read(name, e))?
    {
        ColorType::Gray(bits) => bits,
        other => {
            return Err(GridError::unsupported_raster(
                name,
                format!("expected a single-band raster, found {other:?}"),
            ))
        }
    };

    let format = decoder
        .find_tag(Tag::SampleFormat)
        .map_err(|e| GridError::raster_read(name, e))?
        .map(|v| v.into_u16_vec())
        .transpose()
        .map_err(|e| GridError::raster_read(name, e))?
        .and_then(|v| v.first().copied())
        .unwrap_or(1);

    let dtype = match (format, bits) {
        (1, 8) => DataType::U8,
        (1, 16) => DataType::U16,
        (1, 32) => DataType::U32,
        (1, 64) => DataType::U64,
        (2, 8) => DataType::I8,
        (2, 16) => DataType::I16,
        (2, 32) => DataType::I32,
        (2, 64) => DataType::I64,
        (3, 32) => DataType::F32,
        (3, 64) => DataType::F64,
        _ => {
            return Err(GridError::unsupported_raster(
                name,
                format!("sample format {format} with {bits} bits"),
            ))
        }
    };
    Ok(dtype)
}

fn find_f64_vec(
    decoder: &mut Decoder<BufReader<File>>,
    name: &str,
    code: u16,
) -> Result<Option<Vec<f64>>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))
        .map_err(|e| GridError::raster_read(name, e))?
        .map(|v| v.into_f64_vec())
        .transpose()
        .map_err(|e| GridError::raster_read(name, e))
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>, name: &str) -> Result<GeoTransform> {
    if let Some(matrix) = find_f64_vec(decoder, name, MODEL_TRANSFORMATION)? {
        return GeoTransform::from_model_transformation(&matrix).ok_or_else(|| {
            GridError::unsupported_raster(name, "ModelTransformation tag is too short")
        });
    }

    let scale = find_f64_vec(decoder, name, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64_vec(decoder, name, MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => GeoTransform::from_scale_and_tiepoint(&scale, &tiepoint)
            .ok_or_else(|| GridError::unsupported_raster(name, "malformed pixel scale or tiepoint")),
        _ => Err(GridError::unsupported_raster(
            name,
            "missing georeferencing tags",
        )),
    }
}

/// GeoKey directory as key id to inline SHORT value.
fn geo_keys(decoder: &mut Decoder<BufReader<File>>, name: &str) -> Result<HashMap<u16, u16>> {
    let directory = decoder
        .find_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .map_err(|e| GridError::raster_read(name, e))?
        .map(|v| v.into_u16_vec())
        .transpose()
        .map_err(|e| GridError::raster_read(name, e))?;

    Ok(directory.map(|d| parse_geo_keys(&d)).unwrap_or_default())
}

fn parse_geo_keys(directory: &[u16]) -> HashMap<u16, u16> {
    let declared = directory.get(3).copied().unwrap_or(0) as usize;
    directory
        .get(4..)
        .unwrap_or_default()
        .chunks_exact(4)
        .take(declared)
        // location 0 means the value is stored inline
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn crs_from_keys(keys: &HashMap<u16, u16>) -> Crs {
    if keys.is_empty() {
        return Crs::Unspecified;
    }
    let code = match keys.get(&GT_MODEL_TYPE) {
        Some(&MODEL_TYPE_GEOGRAPHIC) => keys.get(&GEOGRAPHIC_TYPE),
        Some(&MODEL_TYPE_PROJECTED) => keys.get(&PROJECTED_CS_TYPE),
        _ => keys.get(&GEOGRAPHIC_TYPE).or_else(|| keys.get(&PROJECTED_CS_TYPE)),
    };
    match code {
        Some(&USER_DEFINED) | None => Crs::UserDefined,
        Some(&code) => Crs::Epsg(u32::from(code)),
    }
}

fn gdal_nodata(decoder: &mut Decoder<BufReader<File>>, name: &str) -> Result<Option<f64>> {
    let raw = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))
        .map_err(|e| GridError::raster_read(name, e))?
        .map(|v| v.into_string())
        .transpose()
        .map_err(|e| GridError::raster_read(name, e))?;

    let Some(raw) = raw else {
        return Ok(None);
    };
    let text = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    text.parse::<f64>().map(Some).map_err(|_| {
        GridError::unsupported_raster(name, format!("unparseable GDAL_NODATA {text:?}"))
    })
}

fn raster_data(result: DecodingResult) -> Option<RasterData> {
    Some(match result {
        DecodingResult::U8(v) => RasterData::U8(v),
        DecodingResult::U16(v) => RasterData::U16(v),
        DecodingResult::U32(v) => RasterData::U32(v),
        DecodingResult::U64(v) => RasterData::U64(v),
        DecodingResult::I8(v) => RasterData::I8(v),
        DecodingResult::I16(v) => RasterData::I16(v),
        DecodingResult::I32(v) => RasterData::I32(v),
        DecodingResult::I64(v) => RasterData::I64(v),
        DecodingResult::F32(v) => RasterData::F32(v),
        DecodingResult::F64(v) => RasterData::F64(v),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geo_keys() {
        let directory = [
            1, 1, 0, 3, //
            GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC, //
            GT_RASTER_TYPE, 0, 1, 1, //
            GEOGRAPHIC_TYPE, 0, 1, 4326,
        ];
        let keys = parse_geo_keys(&directory);
        assert_eq!(keys.len(), 3);
        assert_eq!(crs_from_keys(&keys), Crs::Epsg(4326));
    }

    #[test]
    fn test_geo_keys_skip_values_stored_elsewhere() {
        let directory = [1, 1, 0, 2, 3073, 34737, 10, 0, 3072, 0, 1, 32633];
        let keys = parse_geo_keys(&directory);
        assert!(!keys.contains_key(&3073));
        assert_eq!(crs_from_keys(&keys), Crs::Epsg(32633));
    }

    #[test]
    fn test_user_defined_and_missing_crs() {
        let user = HashMap::from([(GT_MODEL_TYPE, MODEL_TYPE_GEOGRAPHIC), (GEOGRAPHIC_TYPE, USER_DEFINED)]);
        assert_eq!(crs_from_keys(&user), Crs::UserDefined);
        assert_eq!(crs_from_keys(&HashMap::new()), Crs::Unspecified);
    }
}
