//! Test data generators for synthetic raster bands.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each pixel value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Returns
///
/// A `Vec<f32>` in row-major order (row 0 first, then row 1, etc.)
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a `col * 1000 + row` grid where every `every`-th pixel
/// (in row-major order) is replaced by `nodata`.
pub fn create_grid_with_nodata(width: usize, height: usize, nodata: f32, every: usize) -> Vec<f32> {
    let mut data = create_test_grid(width, height);
    if every > 0 {
        for value in data.iter_mut().step_by(every) {
            *value = nodata;
        }
    }
    data
}

/// Creates a byte grid cycling through `1..=classes`, useful for
/// categorical rasters such as land cover.
pub fn create_class_grid(width: usize, height: usize, classes: u8) -> Vec<u8> {
    let classes = classes.max(1) as usize;
    (0..width * height)
        .map(|i| (i % classes + 1) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }

    #[test]
    fn test_create_grid_with_nodata() {
        let grid = create_grid_with_nodata(4, 2, -9999.0, 3);
        assert_eq!(grid[0], -9999.0);
        assert_eq!(grid[3], -9999.0);
        assert_eq!(grid[6], -9999.0);
        assert_eq!(grid[1], 1000.0);
        assert_eq!(grid.iter().filter(|v| **v == -9999.0).count(), 3);
    }

    #[test]
    fn test_create_class_grid() {
        let grid = create_class_grid(5, 1, 3);
        assert_eq!(grid, vec![1, 2, 3, 1, 2]);
        assert!(create_class_grid(2, 2, 0).iter().all(|v| *v == 1));
    }
}
