//! Tensor and layer descriptors as handed in by the caller.
pub mod attr;

use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropKind {
    ForwardTraining,
    ForwardInference,
    Backward,
}

/// Which argument a descriptor describes; used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Src,
    Weights,
    Bias,
    Dst,
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TensorRole::Src => "src",
            TensorRole::Weights => "weights",
            TensorRole::Bias => "bias",
            TensorRole::Dst => "dst",
        };
        f.write_str(s)
    }
}

/// Physical memory layouts. Dims are always given in logical order
/// (`[N, C, spatial..]` for activations, `[O, I, spatial..]` for weights);
/// the format says how they are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Let the primitive choose.
    #[default]
    Any,
    X,
    Nc,
    Nwc,
    Nhwc,
    Ndhwc,
    Nchw,
    Io,
    Wio,
    Hwio,
    Dhwio,
    Oihw,
}

impl Format {
    /// Channel-last activation layout for a rank.
    pub fn channel_last(ndims: usize) -> Option<Format> {
        match ndims {
            2 => Some(Format::Nc),
            3 => Some(Format::Nwc),
            4 => Some(Format::Nhwc),
            5 => Some(Format::Ndhwc),
            _ => None,
        }
    }

    /// Weight layout matching `channel_last`: spatial dims, then input
    /// channels, then output channels, so weights read as a dense `[K, OC]`.
    pub fn weights_for(ndims: usize) -> Option<Format> {
        match ndims {
            2 => Some(Format::Io),
            3 => Some(Format::Wio),
            4 => Some(Format::Hwio),
            5 => Some(Format::Dhwio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDesc {
    pub dims: Vec<usize>,
    pub data_type: DataType,
    #[serde(default)]
    pub format: Format,
}

impl MemoryDesc {
    pub fn new(dims: &[usize], data_type: DataType) -> Self {
        Self { dims: dims.to_vec(), data_type, format: Format::Any }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn ndims(&self) -> usize { self.dims.len() }

    pub fn has_zero_dim(&self) -> bool { self.dims.iter().any(|&d| d == 0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerProductDesc {
    pub prop_kind: PropKind,
    pub src: MemoryDesc,
    pub weights: MemoryDesc,
    pub bias: Option<MemoryDesc>,
    pub dst: MemoryDesc,
}

impl InnerProductDesc {
    /// Forward-inference descriptor with every layout left to the primitive.
    pub fn forward(
        src: MemoryDesc,
        weights: MemoryDesc,
        bias: Option<MemoryDesc>,
        dst: MemoryDesc,
    ) -> Self {
        Self { prop_kind: PropKind::ForwardInference, src, weights, bias, dst }
    }
}
