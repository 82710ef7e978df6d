//! Fixed-size block windows over a raster.

/// A rectangle of pixels in absolute raster coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Half-open containment of a pixel.
    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col_off
            && col < self.col_off + self.width
            && row >= self.row_off
            && row < self.row_off + self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Partition of a raster into square blocks, grouped into bands (one band
/// per row of blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub width: usize,
    pub height: usize,
    pub block_size: usize,
}

impl BlockLayout {
    pub fn new(width: usize, height: usize, block_size: usize) -> Self {
        Self {
            width,
            height,
            block_size: block_size.max(1),
        }
    }

    pub fn bands(&self) -> usize {
        self.height.div_ceil(self.block_size)
    }

    pub fn blocks_per_band(&self) -> usize {
        self.width.div_ceil(self.block_size)
    }

    pub fn window_count(&self) -> usize {
        self.bands() * self.blocks_per_band()
    }

    /// `(row_off, rows)` covered by a band; the last band may be short.
    pub fn band_rows(&self, band: usize) -> (usize, usize) {
        let row_off = band * self.block_size;
        (row_off, self.block_size.min(self.height.saturating_sub(row_off)))
    }

    /// Windows of one band, left to right.
    pub fn band_windows(&self, band: usize) -> Vec<Window> {
        let (row_off, rows) = self.band_rows(band);
        (0..self.blocks_per_band())
            .map(|i| {
                let col_off = i * self.block_size;
                let width = self.block_size.min(self.width - col_off);
                Window::new(col_off, row_off, width, rows)
            })
            .collect()
    }

    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.bands()).flat_map(|band| self.band_windows(band))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_covers_raster_exactly_once() {
        let layout = BlockLayout::new(1100, 700, 512);
        assert_eq!(layout.bands(), 2);
        assert_eq!(layout.blocks_per_band(), 3);
        assert_eq!(layout.window_count(), 6);

        let pixels: usize = layout.windows().map(|w| w.pixel_count()).sum();
        assert_eq!(pixels, 1100 * 700);

        let last = layout.band_windows(1)[2];
        assert_eq!(last, Window::new(1024, 512, 76, 188));
    }

    #[test]
    fn test_small_raster_is_one_window() {
        let layout = BlockLayout::new(10, 4, 512);
        assert_eq!(
            layout.windows().collect::<Vec<_>>(),
            vec![Window::new(0, 0, 10, 4)]
        );
    }

    #[test]
    fn test_window_contains_is_half_open() {
        let w = Window::new(4, 4, 2, 2);
        assert!(w.contains(4, 4));
        assert!(w.contains(5, 5));
        assert!(!w.contains(6, 5));
        assert!(!w.contains(3, 4));
    }
}
