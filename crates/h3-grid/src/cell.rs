//! Hex cell identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};

use crate::error::{GridError, Result};

/// A valid H3 cell.
///
/// Stored and compared as the lower-case hex string of the 64-bit index,
/// without the `0x` prefix (15 characters for every valid cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexCell(CellIndex);

impl HexCell {
    /// Wrap an H3 cell index.
    pub fn new(index: CellIndex) -> Self {
        Self(index)
    }

    /// Cell containing a WGS84 coordinate.
    pub fn from_coords(lat: f64, lng: f64, resolution: Resolution) -> Result<Self> {
        let ll = LatLng::new(lat, lng)
            .map_err(|e| GridError::InvalidHexCell(format!("({lat}, {lng}): {e}")))?;
        Ok(Self(ll.to_cell(resolution)))
    }

    /// Parse from the hex form, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = u64::from_str_radix(digits, 16)
            .map_err(|_| GridError::InvalidHexCell(s.to_string()))?;
        Self::try_from(raw)
    }

    /// Lower-case hex string without the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("{:x}", u64::from(self.0))
    }

    pub fn index(&self) -> CellIndex {
        self.0
    }

    pub fn resolution(&self) -> u8 {
        u8::from(self.0.resolution())
    }

    /// Parent at a coarser (or equal) resolution, `None` for finer ones.
    pub fn parent(&self, resolution: u8) -> Option<HexCell> {
        let res = Resolution::try_from(resolution).ok()?;
        self.0.parent(res).map(HexCell)
    }

    /// Cell centroid as `(lat, lng)` in degrees.
    pub fn centroid(&self) -> (f64, f64) {
        let ll = LatLng::from(self.0);
        (ll.lat(), ll.lng())
    }
}

impl From<CellIndex> for HexCell {
    fn from(index: CellIndex) -> Self {
        Self(index)
    }
}

impl From<HexCell> for u64 {
    fn from(cell: HexCell) -> Self {
        u64::from(cell.0)
    }
}

impl TryFrom<u64> for HexCell {
    type Error = GridError;

    fn try_from(raw: u64) -> Result<Self> {
        CellIndex::try_from(raw)
            .map(HexCell)
            .map_err(|e| GridError::InvalidHexCell(format!("{raw:x}: {e}")))
    }
}

impl FromStr for HexCell {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for HexCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", u64::from(self.0))
    }
}

impl PartialOrd for HexCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HexCell {
    fn cmp(&self, other: &Self) -> Ordering {
        u64::from(self.0).cmp(&u64::from(other.0))
    }
}

/// Validate a numeric resolution.
pub fn resolution(value: u8) -> Result<Resolution> {
    Resolution::try_from(value).map_err(|_| GridError::InvalidResolution(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_form_has_no_prefix() {
        let cell = HexCell::from_coords(48.85, 2.35, Resolution::Six).unwrap();
        let hex = cell.to_hex();
        assert_eq!(hex.len(), 15);
        assert!(!hex.starts_with("0x"));
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(cell.to_string(), hex);
    }

    #[test]
    fn test_from_hex_accepts_prefix() {
        let cell = HexCell::from_coords(37.77, -122.41, Resolution::Six).unwrap();
        let prefixed = format!("0x{}", cell.to_hex());
        assert_eq!(HexCell::from_hex(&prefixed).unwrap(), cell);
        assert_eq!(HexCell::from_hex(&cell.to_hex()).unwrap(), cell);
        assert_eq!(cell.resolution(), 6);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(HexCell::from_hex("not-a-cell").is_err());
        assert!(HexCell::from_hex("0").is_err());
    }

    #[test]
    fn test_parent_is_resolution_monotonic() {
        let cell = HexCell::from_coords(-12.5, 130.8, Resolution::Nine).unwrap();
        let parent = cell.parent(6).unwrap();
        assert_eq!(parent.resolution(), 6);
        assert_eq!(parent.parent(3), cell.parent(3));
        assert!(parent.parent(9).is_none());
    }

    #[test]
    fn test_resolution_bounds() {
        assert!(resolution(0).is_ok());
        assert!(resolution(15).is_ok());
        assert!(matches!(resolution(16), Err(GridError::InvalidResolution(16))));
    }
}
