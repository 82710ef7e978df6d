//! Typed pixel buffers.

use num_traits::{NumCast, ToPrimitive};

use crate::types::{DataType, GridValue};

/// Row-major pixel data in its native sample type.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            RasterData::U8($v) => $body,
            RasterData::U16($v) => $body,
            RasterData::U32($v) => $body,
            RasterData::U64($v) => $body,
            RasterData::I8($v) => $body,
            RasterData::I16($v) => $body,
            RasterData::I32($v) => $body,
            RasterData::I64($v) => $body,
            RasterData::F32($v) => $body,
            RasterData::F64($v) => $body,
        }
    };
}

impl RasterData {
    /// Zero-filled buffer of `len` samples.
    pub fn zeros(dtype: DataType, len: usize) -> Option<Self> {
        Some(match dtype {
            DataType::U8 => RasterData::U8(vec![0; len]),
            DataType::U16 => RasterData::U16(vec![0; len]),
            DataType::U32 => RasterData::U32(vec![0; len]),
            DataType::U64 => RasterData::U64(vec![0; len]),
            DataType::I8 => RasterData::I8(vec![0; len]),
            DataType::I16 => RasterData::I16(vec![0; len]),
            DataType::I32 => RasterData::I32(vec![0; len]),
            DataType::I64 => RasterData::I64(vec![0; len]),
            DataType::F32 => RasterData::F32(vec![0.0; len]),
            DataType::F64 => RasterData::F64(vec![0.0; len]),
            DataType::Bool | DataType::Text => return None,
        })
    }

    pub fn dtype(&self) -> DataType {
        match self {
            RasterData::U8(_) => DataType::U8,
            RasterData::U16(_) => DataType::U16,
            RasterData::U32(_) => DataType::U32,
            RasterData::U64(_) => DataType::U64,
            RasterData::I8(_) => DataType::I8,
            RasterData::I16(_) => DataType::I16,
            RasterData::I32(_) => DataType::I32,
            RasterData::I64(_) => DataType::I64,
            RasterData::F32(_) => DataType::F32,
            RasterData::F64(_) => DataType::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at a flat index.
    pub fn get(&self, idx: usize) -> Option<GridValue> {
        Some(match self {
            RasterData::U8(v) => GridValue::U8(*v.get(idx)?),
            RasterData::U16(v) => GridValue::U16(*v.get(idx)?),
            RasterData::U32(v) => GridValue::U32(*v.get(idx)?),
            RasterData::U64(v) => GridValue::U64(*v.get(idx)?),
            RasterData::I8(v) => GridValue::I8(*v.get(idx)?),
            RasterData::I16(v) => GridValue::I16(*v.get(idx)?),
            RasterData::I32(v) => GridValue::I32(*v.get(idx)?),
            RasterData::I64(v) => GridValue::I64(*v.get(idx)?),
            RasterData::F32(v) => GridValue::F32(*v.get(idx)?),
            RasterData::F64(v) => GridValue::F64(*v.get(idx)?),
        })
    }

    /// Copy a `rows x cols` rectangle from `src` into `self`.
    ///
    /// Returns `false` when the two buffers hold different sample types.
    pub fn copy_rect(
        &mut self,
        dst_width: usize,
        dst_origin: (usize, usize),
        src: &RasterData,
        src_width: usize,
        src_origin: (usize, usize),
        size: (usize, usize),
    ) -> bool {
        let dst_layout = Layout::new(dst_width, dst_origin);
        let src_layout = Layout::new(src_width, src_origin);
        match (self, src) {
            (RasterData::U8(d), RasterData::U8(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::U16(d), RasterData::U16(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::U32(d), RasterData::U32(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::U64(d), RasterData::U64(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::I8(d), RasterData::I8(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::I16(d), RasterData::I16(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::I32(d), RasterData::I32(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::I64(d), RasterData::I64(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::F32(d), RasterData::F32(s)) => blit(d, dst_layout, s, src_layout, size),
            (RasterData::F64(d), RasterData::F64(s)) => blit(d, dst_layout, s, src_layout, size),
            _ => return false,
        }
        true
    }
}

#[derive(Clone, Copy)]
struct Layout {
    width: usize,
    col: usize,
    row: usize,
}

impl Layout {
    fn new(width: usize, (col, row): (usize, usize)) -> Self {
        Self { width, col, row }
    }

    fn offset(&self, row: usize) -> usize {
        (self.row + row) * self.width + self.col
    }
}

fn blit<T: Copy>(dst: &mut [T], d: Layout, src: &[T], s: Layout, (cols, rows): (usize, usize)) {
    for r in 0..rows {
        let from = s.offset(r);
        let to = d.offset(r);
        dst[to..to + cols].copy_from_slice(&src[from..from + cols]);
    }
}

/// A sentinel converted to a raster's sample type, if it is exactly
/// representable there. NaN is representable only in float types.
pub fn nodata_for(dtype: DataType, value: f64) -> Option<GridValue> {
    match dtype {
        DataType::U8 => exact::<u8>(value).map(GridValue::U8),
        DataType::U16 => exact::<u16>(value).map(GridValue::U16),
        DataType::U32 => exact::<u32>(value).map(GridValue::U32),
        DataType::U64 => exact::<u64>(value).map(GridValue::U64),
        DataType::I8 => exact::<i8>(value).map(GridValue::I8),
        DataType::I16 => exact::<i16>(value).map(GridValue::I16),
        DataType::I32 => exact::<i32>(value).map(GridValue::I32),
        DataType::I64 => exact::<i64>(value).map(GridValue::I64),
        DataType::F32 => {
            let narrowed = value as f32;
            (value.is_nan() || <f64 as From<f32>>::from(narrowed) == value).then_some(GridValue::F32(narrowed))
        }
        DataType::F64 => Some(GridValue::F64(value)),
        DataType::Bool | DataType::Text => None,
    }
}

fn exact<T: NumCast + ToPrimitive>(value: f64) -> Option<T> {
    if value.fract() != 0.0 {
        return None;
    }
    let cast: T = NumCast::from(value)?;
    (cast.to_f64()? == value).then_some(cast)
}

/// A horizontal strip of a raster, spanning its full width.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBand {
    /// First raster row held by this band.
    pub row_off: usize,
    pub width: usize,
    pub rows: usize,
    pub data: RasterData,
}

impl RasterBand {
    /// Sample at absolute raster coordinates, `None` outside the band.
    pub fn value_at(&self, col: usize, row: usize) -> Option<GridValue> {
        if col >= self.width || row < self.row_off || row >= self.row_off + self.rows {
            return None;
        }
        self.data.get((row - self.row_off) * self.width + col)
    }
}
