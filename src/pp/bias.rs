//! Bias storage and per-encoding decoders.
//!
//! A bias buffer is kept as native-endian bytes tagged with its data type so
//! one kernel argument can carry any of the four encodings. The decoder is a
//! zero-sized type chosen when the kernel is built.

use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct Bias {
    data_type: DataType,
    bytes: Vec<u8>,
}

impl Bias {
    pub fn from_f32(values: &[f32]) -> Self {
        Self { data_type: DataType::F32, bytes: values.iter().flat_map(|v| v.to_ne_bytes()).collect() }
    }

    pub fn from_s32(values: &[i32]) -> Self {
        Self { data_type: DataType::S32, bytes: values.iter().flat_map(|v| v.to_ne_bytes()).collect() }
    }

    pub fn from_s8(values: &[i8]) -> Self {
        Self { data_type: DataType::S8, bytes: values.iter().map(|&v| v as u8).collect() }
    }

    pub fn from_u8(values: &[u8]) -> Self {
        Self { data_type: DataType::U8, bytes: values.to_vec() }
    }

    pub fn data_type(&self) -> DataType { self.data_type }

    pub fn bytes(&self) -> &[u8] { &self.bytes }

    /// Number of bias values.
    pub fn len(&self) -> usize { self.bytes.len() / self.data_type.size() }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Value at `ch` widened to f32.
    pub fn get(&self, ch: usize) -> f32 { decode_dyn(self.data_type, &self.bytes, ch) }
}

pub trait BiasDecode: Send + Sync + 'static {
    const PRESENT: bool;
    fn decode(bias: &[u8], ch: usize) -> f32;
}

pub struct NoBias;
pub struct BiasF32;
pub struct BiasS32;
pub struct BiasS8;
pub struct BiasU8;

#[inline(always)]
fn word(bias: &[u8], ch: usize) -> [u8; 4] {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bias[ch * 4..ch * 4 + 4]);
    b
}

impl BiasDecode for NoBias {
    const PRESENT: bool = false;
    #[inline(always)]
    fn decode(_bias: &[u8], _ch: usize) -> f32 { 0.0 }
}

impl BiasDecode for BiasF32 {
    const PRESENT: bool = true;
    #[inline(always)]
    fn decode(bias: &[u8], ch: usize) -> f32 { f32::from_ne_bytes(word(bias, ch)) }
}

impl BiasDecode for BiasS32 {
    const PRESENT: bool = true;
    #[inline(always)]
    fn decode(bias: &[u8], ch: usize) -> f32 { i32::from_ne_bytes(word(bias, ch)) as f32 }
}

impl BiasDecode for BiasS8 {
    const PRESENT: bool = true;
    #[inline(always)]
    fn decode(bias: &[u8], ch: usize) -> f32 { bias[ch] as i8 as f32 }
}

impl BiasDecode for BiasU8 {
    const PRESENT: bool = true;
    #[inline(always)]
    fn decode(bias: &[u8], ch: usize) -> f32 { bias[ch] as f32 }
}

/// Runtime-dispatched decode, for the reference path.
pub fn decode_dyn(data_type: DataType, bias: &[u8], ch: usize) -> f32 {
    match data_type {
        DataType::F32 => BiasF32::decode(bias, ch),
        DataType::S32 => BiasS32::decode(bias, ch),
        DataType::S8 => BiasS8::decode(bias, ch),
        DataType::U8 => BiasU8::decode(bias, ch),
    }
}
