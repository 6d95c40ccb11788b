//! Primitive attributes: output scales, rounding and post-ops.

use crate::types::RoundMode;
use serde::{Deserialize, Serialize};

/// Mask selecting one scale per output channel (dimension 1 of dst).
pub const PER_OC_MASK: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EltwiseAlg {
    Relu,
    Tanh,
    Logistic,
    Elu,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOp {
    /// `dst = scale * alg(dst; alpha, beta)`. For relu, `alpha` is the
    /// negative slope and `beta` is unused and must be zero.
    Eltwise { alg: EltwiseAlg, scale: f32, alpha: f32, beta: f32 },
    /// Accumulate into the existing dst contents.
    Sum { scale: f32 },
}

impl PostOp {
    pub fn relu(negative_slope: f32) -> Self {
        PostOp::Eltwise { alg: EltwiseAlg::Relu, scale: 1.0, alpha: negative_slope, beta: 0.0 }
    }

    /// Relu this implementation can fuse: unit scale, zero intercept.
    pub fn as_fusable_relu(&self) -> Option<f32> {
        match *self {
            PostOp::Eltwise { alg: EltwiseAlg::Relu, scale, alpha, beta }
                if scale == 1.0 && beta == 0.0 => Some(alpha),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputScales {
    pub mask: u32,
    pub scales: Vec<f32>,
}

impl Default for OutputScales {
    fn default() -> Self { Self { mask: 0, scales: vec![1.0] } }
}

impl OutputScales {
    pub fn common(scale: f32) -> Self { Self { mask: 0, scales: vec![scale] } }

    pub fn per_oc(scales: Vec<f32>) -> Self { Self { mask: PER_OC_MASK, scales } }

    pub fn is_identity(&self) -> bool { self.mask == 0 && self.scales == [1.0] }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveAttr {
    #[serde(default)]
    pub output_scales: OutputScales,
    #[serde(default)]
    pub round_mode: RoundMode,
    #[serde(default)]
    pub post_ops: Vec<PostOp>,
}

impl PrimitiveAttr {
    pub fn with_scales(mut self, scales: OutputScales) -> Self {
        self.output_scales = scales;
        self
    }

    pub fn with_round_mode(mut self, round_mode: RoundMode) -> Self {
        self.round_mode = round_mode;
        self
    }

    pub fn with_post_op(mut self, op: PostOp) -> Self {
        self.post_ops.push(op);
        self
    }
}
