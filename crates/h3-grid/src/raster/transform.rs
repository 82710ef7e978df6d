//! Affine geotransforms and coordinate reference systems.

use std::fmt;

/// Pixel to world affine transform.
///
/// Coefficients follow the usual `(a, b, c, d, e, f)` order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`,
/// where `(col, row)` addresses the top-left corner of a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform from an origin (top-left corner) and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height, origin_y)
    }

    /// Build from GeoTIFF ModelPixelScale and ModelTiepoint values.
    pub fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let (sx, sy) = (scale[0], scale[1]);
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Some(Self::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy))
    }

    /// Build from a row-major 4x4 GeoTIFF ModelTransformation matrix.
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self::new(m[0], m[1], m[3], m[4], m[5], m[7]))
    }

    /// Shift by half a pixel, converting a PixelIsPoint model to PixelIsArea.
    pub fn shifted_half_pixel(&self) -> Self {
        Self {
            c: self.c - (self.a + self.b) / 2.0,
            f: self.f - (self.d + self.e) / 2.0,
            ..*self
        }
    }

    /// World coordinates of a (fractional) pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Fractional pixel position of a world coordinate.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.c;
        let dy = y - self.f;
        Some((
            (self.e * dx - self.b * dy) / det,
            (-self.d * dx + self.a * dy) / det,
        ))
    }

    /// Coefficient-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.coefficients()
            .iter()
            .zip(other.coefficients().iter())
            .all(|(x, y)| (x - y).abs() <= tolerance)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub fn is_invertible(&self) -> bool {
        self.invert(self.c, self.f).is_some()
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Affine({}, {}, {}, {}, {}, {})",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

/// Coordinate reference system of a raster, as declared by its GeoKeys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    Epsg(u32),
    /// Keys are present but describe a user-defined system.
    UserDefined,
    /// No GeoKey directory.
    Unspecified,
}

impl Crs {
    pub const WGS84: Crs = Crs::Epsg(4326);

    pub fn is_wgs84(&self) -> bool {
        *self == Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::UserDefined => write!(f, "user-defined"),
            Crs::Unspecified => write!(f, "unspecified"),
        }
    }
}
