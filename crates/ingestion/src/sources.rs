//! Source file discovery in an input folder.

use std::path::{Path, PathBuf};

use h3_grid::vector::{GEOJSON_EXTENSIONS, OTHER_VECTOR_EXTENSIONS};
use h3_grid::GridError;
use walkdir::WalkDir;

use crate::error::{IngestionError, Result};

const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff"];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Files directly inside `folder` (not recursive), sorted by path.
fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            IngestionError::FileRead(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// GeoTIFF files in `folder`, sorted; each becomes one column.
pub fn find_rasters(folder: &Path) -> Result<Vec<PathBuf>> {
    let rasters: Vec<PathBuf> = list_files(folder)?
        .into_iter()
        .filter(|p| RASTER_EXTENSIONS.contains(&extension(p).as_str()))
        .collect();
    if rasters.is_empty() {
        return Err(IngestionError::NoSourceFiles {
            folder: folder.to_path_buf(),
            kind: "raster",
        });
    }
    Ok(rasters)
}

fn is_vector(path: &Path) -> bool {
    let ext = extension(path);
    GEOJSON_EXTENSIONS.contains(&ext.as_str()) || OTHER_VECTOR_EXTENSIONS.contains(&ext.as_str())
}

/// The single vector file in `folder`, which must be GeoJSON.
///
/// Every vector format counts towards the one-file rule, so a GeoJSON next
/// to a shapefile is ambiguous.
pub fn find_vector(folder: &Path) -> Result<PathBuf> {
    let mut vectors: Vec<PathBuf> = list_files(folder)?
        .into_iter()
        .filter(|p| is_vector(p))
        .collect();

    match vectors.len() {
        0 => Err(IngestionError::NoSourceFiles {
            folder: folder.to_path_buf(),
            kind: "vector",
        }),
        1 => {
            let path = vectors.remove(0);
            if !GEOJSON_EXTENSIONS.contains(&extension(&path).as_str()) {
                return Err(GridError::UnsupportedFormat(format!(
                    "{}: only GeoJSON vector files are supported",
                    path.display()
                ))
                .into());
            }
            Ok(path)
        }
        _ => Err(IngestionError::MultipleVectorFiles {
            folder: folder.to_path_buf(),
            files: vectors
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_find_rasters_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "cropB.tif");
        touch(dir.path(), "cropA.TIFF");
        touch(dir.path(), "readme.txt");
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "cropC.tif");

        let rasters = find_rasters(dir.path()).unwrap();
        let names: Vec<_> = rasters
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cropA.TIFF", "cropB.tif"]);
    }

    #[test]
    fn test_no_rasters() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "areas.geojson");
        let err = find_rasters(dir.path()).unwrap_err();
        assert!(matches!(err, IngestionError::NoSourceFiles { kind: "raster", .. }));
    }

    #[test]
    fn test_find_single_vector() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "areas.geojson");
        touch(dir.path(), "cropA.tif");
        let path = find_vector(dir.path()).unwrap();
        assert!(path.ends_with("areas.geojson"));
    }

    #[test]
    fn test_multiple_vectors_rejected() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.geojson");
        touch(dir.path(), "b.json");
        let err = find_vector(dir.path()).unwrap_err();
        match err {
            IngestionError::MultipleVectorFiles { files, .. } => {
                assert_eq!(files, vec!["a.geojson", "b.json"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_geopackage_needs_conversion() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "areas.gpkg");
        let err = find_vector(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::Grid(GridError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_geojson_with_shapefile_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "areas.geojson");
        touch(dir.path(), "areas.shp");
        touch(dir.path(), "areas.dbf");
        let err = find_vector(dir.path()).unwrap_err();
        match err {
            IngestionError::MultipleVectorFiles { files, .. } => {
                assert_eq!(files, vec!["areas.geojson", "areas.shp"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
