//! Multi-raster alignment checks.
//!
//! Every raster contributing a column to one grid table must share the
//! reference raster's CRS, affine transform and shape, so that a block
//! window addresses the same pixels in all of them.

use crate::error::{AlignmentError, AlignmentProperty};
use crate::raster::RasterDescriptor;

/// Absolute tolerance when comparing transform coefficients.
pub const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// Check a candidate raster against the reference raster.
pub fn validate_alignment(
    reference: &RasterDescriptor,
    candidate: &RasterDescriptor,
) -> Result<(), AlignmentError> {
    let mismatch = |property, reference_value: String, candidate_value: String| AlignmentError {
        property,
        reference: reference.name(),
        candidate: candidate.name(),
        reference_value,
        candidate_value,
    };

    if reference.crs != candidate.crs {
        return Err(mismatch(
            AlignmentProperty::Crs,
            reference.crs.to_string(),
            candidate.crs.to_string(),
        ));
    }
    if !reference
        .transform
        .approx_eq(&candidate.transform, TRANSFORM_TOLERANCE)
    {
        return Err(mismatch(
            AlignmentProperty::Transform,
            reference.transform.to_string(),
            candidate.transform.to_string(),
        ));
    }
    if (reference.width, reference.height) != (candidate.width, candidate.height) {
        return Err(mismatch(
            AlignmentProperty::Shape,
            format!("{}x{}", reference.width, reference.height),
            format!("{}x{}", candidate.width, candidate.height),
        ));
    }
    Ok(())
}

/// Check every raster against the first one.
pub fn validate_all(rasters: &[RasterDescriptor]) -> Result<(), AlignmentError> {
    let Some((reference, rest)) = rasters.split_first() else {
        return Ok(());
    };
    rest.iter()
        .try_for_each(|candidate| validate_alignment(reference, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Crs, GeoTransform};
    use crate::types::DataType;

    fn descriptor(name: &str, transform: GeoTransform) -> RasterDescriptor {
        RasterDescriptor {
            path: format!("/data/{name}").into(),
            width: 100,
            height: 50,
            dtype: DataType::F32,
            transform,
            crs: Crs::WGS84,
            nodata: None,
        }
    }

    #[test]
    fn test_aligned_rasters_pass() {
        let t = GeoTransform::north_up(-10.0, 10.0, 0.1, 0.1);
        let rasters = vec![descriptor("cropA.tif", t), descriptor("cropB.tif", t)];
        assert!(validate_all(&rasters).is_ok());
    }

    #[test]
    fn test_transform_mismatch_names_both_rasters() {
        let a = descriptor("cropA.tif", GeoTransform::north_up(-10.0, 10.0, 0.1, 0.1));
        let b = descriptor("cropB.tif", GeoTransform::north_up(-10.0, 10.0, 0.2, 0.1));
        let err = validate_alignment(&a, &b).unwrap_err();
        assert_eq!(err.property, AlignmentProperty::Transform);
        assert_eq!(err.reference, "cropA.tif");
        assert_eq!(err.candidate, "cropB.tif");
        let message = err.to_string();
        assert!(message.contains("transform"));
        assert!(message.contains("0.2"));
    }

    #[test]
    fn test_crs_checked_before_transform() {
        let t = GeoTransform::north_up(0.0, 0.0, 1.0, 1.0);
        let a = descriptor("a.tif", t);
        let mut b = descriptor("b.tif", GeoTransform::north_up(5.0, 0.0, 1.0, 1.0));
        b.crs = Crs::Epsg(3857);
        let err = validate_alignment(&a, &b).unwrap_err();
        assert_eq!(err.property, AlignmentProperty::Crs);
        assert_eq!(err.candidate_value, "EPSG:3857");
    }

    #[test]
    fn test_shape_mismatch() {
        let t = GeoTransform::north_up(0.0, 0.0, 1.0, 1.0);
        let a = descriptor("a.tif", t);
        let mut b = descriptor("b.tif", t);
        b.height = 51;
        let err = validate_alignment(&a, &b).unwrap_err();
        assert_eq!(err.property, AlignmentProperty::Shape);
        assert_eq!(err.reference_value, "100x50");
        assert_eq!(err.candidate_value, "100x51");
    }

    #[test]
    fn test_first_mismatch_is_reported() {
        let t = GeoTransform::north_up(0.0, 0.0, 1.0, 1.0);
        let mut bad = descriptor("c.tif", t);
        bad.width = 3;
        let rasters = vec![descriptor("a.tif", t), descriptor("b.tif", t), bad];
        let err = validate_all(&rasters).unwrap_err();
        assert_eq!(err.candidate, "c.tif");
    }
}
