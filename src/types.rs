//! Element types and narrowing conversions.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F32,
    S32,
    S8,
    U8,
}

impl DataType {
    pub fn size(self) -> usize {
        match self {
            DataType::F32 | DataType::S32 => 4,
            DataType::S8 | DataType::U8 => 1,
        }
    }

    /// 32-bit types that can hold the raw accumulator in the output buffer.
    pub fn is_acc_type(self) -> bool {
        matches!(self, DataType::S32 | DataType::F32)
    }
}

/// Rounding applied when a float result is narrowed to an integer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundMode {
    /// Round to nearest, ties to even (50.5 -> 50, 51.5 -> 52).
    #[default]
    Nearest,
    /// Round toward negative infinity.
    Down,
}

/// Type-level rounding policy; picked once when a kernel is built.
pub trait Rounding: Send + Sync + 'static {
    const MODE: RoundMode;
    fn round(v: f32) -> f32;
}

pub struct Nearest;
pub struct Down;

impl Rounding for Nearest {
    const MODE: RoundMode = RoundMode::Nearest;
    #[inline(always)]
    fn round(v: f32) -> f32 { v.round_ties_even() }
}

impl Rounding for Down {
    const MODE: RoundMode = RoundMode::Down;
    #[inline(always)]
    fn round(v: f32) -> f32 { v.floor() }
}

/// Source activations: u8 or s8.
pub trait SrcElem: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    fn widen(self) -> i32;
}

impl SrcElem for u8 {
    const DATA_TYPE: DataType = DataType::U8;
    #[inline(always)]
    fn widen(self) -> i32 { self as i32 }
}

impl SrcElem for i8 {
    const DATA_TYPE: DataType = DataType::S8;
    #[inline(always)]
    fn widen(self) -> i32 { self as i32 }
}

/// Output elements. `InPlace` is the 32-bit type whose slots may carry a raw
/// accumulator between the multiply and the post-processing pass; for the
/// 32-bit outputs that is `Self` and `in_place` hands the buffer back.
/// Accumulators only ever move through the buffer's `i32` view
/// (`bytemuck::cast_slice_mut`), never as `f32` values.
pub trait DstElem: Copy + Default + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    type InPlace: DstElem + Pod;

    fn from_f32<R: Rounding>(v: f32) -> Self;

    fn in_place(dst: &mut [Self]) -> Option<&mut [Self::InPlace]>;
}

impl DstElem for f32 {
    const DATA_TYPE: DataType = DataType::F32;
    type InPlace = f32;
    #[inline(always)]
    fn from_f32<R: Rounding>(v: f32) -> Self { v }
    fn in_place(dst: &mut [Self]) -> Option<&mut [f32]> { Some(dst) }
}

impl DstElem for i32 {
    const DATA_TYPE: DataType = DataType::S32;
    type InPlace = i32;
    #[inline(always)]
    fn from_f32<R: Rounding>(v: f32) -> Self {
        // `as` saturates and maps NaN to 0
        R::round(v) as i32
    }
    fn in_place(dst: &mut [Self]) -> Option<&mut [i32]> { Some(dst) }
}

impl DstElem for i8 {
    const DATA_TYPE: DataType = DataType::S8;
    type InPlace = i32;
    #[inline(always)]
    fn from_f32<R: Rounding>(v: f32) -> Self {
        R::round(v).clamp(i8::MIN as f32, i8::MAX as f32) as i8
    }
    fn in_place(_dst: &mut [Self]) -> Option<&mut [i32]> { None }
}

impl DstElem for u8 {
    const DATA_TYPE: DataType = DataType::U8;
    type InPlace = i32;
    #[inline(always)]
    fn from_f32<R: Rounding>(v: f32) -> Self {
        R::round(v).clamp(u8::MIN as f32, u8::MAX as f32) as u8
    }
    fn in_place(_dst: &mut [Self]) -> Option<&mut [i32]> { None }
}
