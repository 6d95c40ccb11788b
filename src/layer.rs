//! JSON layer description used by the CLI and benches.
//!
//! ```json
//! { "mb": 64, "ic": 256, "spatial": [7, 7], "oc": 1000,
//!   "src": "u8", "dst": "s8", "bias": "f32",
//!   "scales": [0.5, 0.25, ...], "round": "nearest", "relu": 0.0 }
//! ```

use crate::desc::attr::{OutputScales, PostOp, PrimitiveAttr};
use crate::desc::{InnerProductDesc, MemoryDesc};
use crate::error::Result;
use crate::pd::InnerProductPd;
use crate::types::{DataType, RoundMode};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleSpec {
    Common(f32),
    PerChannel(Vec<f32>),
}

impl Default for ScaleSpec {
    fn default() -> Self { ScaleSpec::Common(1.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub mb: usize,
    pub ic: usize,
    /// Spatial extent of src and weights; empty for a plain 2-D layer.
    #[serde(default)]
    pub spatial: Vec<usize>,
    pub oc: usize,
    pub src: DataType,
    pub dst: DataType,
    #[serde(default)]
    pub bias: Option<DataType>,
    #[serde(default)]
    pub scales: ScaleSpec,
    #[serde(default)]
    pub round: RoundMode,
    /// Negative slope of a fused relu; absent means no activation.
    #[serde(default)]
    pub relu: Option<f32>,
}

impl LayerSpec {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let f = File::open(&path)
            .with_context(|| format!("open layer file: {}", path.as_ref().display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse layer file: {}", path.as_ref().display()))
    }

    /// Flattened contraction length.
    pub fn k(&self) -> usize { self.ic * self.spatial.iter().product::<usize>() }

    pub fn to_desc(&self) -> InnerProductDesc {
        let mut src_dims = vec![self.mb, self.ic];
        src_dims.extend_from_slice(&self.spatial);
        let mut wei_dims = vec![self.oc, self.ic];
        wei_dims.extend_from_slice(&self.spatial);
        InnerProductDesc::forward(
            MemoryDesc::new(&src_dims, self.src),
            MemoryDesc::new(&wei_dims, DataType::S8),
            self.bias.map(|dt| MemoryDesc::new(&[self.oc], dt)),
            MemoryDesc::new(&[self.mb, self.oc], self.dst),
        )
    }

    pub fn to_attr(&self) -> PrimitiveAttr {
        let scales = match &self.scales {
            ScaleSpec::Common(s) => OutputScales::common(*s),
            ScaleSpec::PerChannel(v) => OutputScales::per_oc(v.clone()),
        };
        let mut attr = PrimitiveAttr::default().with_scales(scales).with_round_mode(self.round);
        if let Some(slope) = self.relu {
            attr = attr.with_post_op(PostOp::relu(slope));
        }
        attr
    }

    pub fn build_pd(&self) -> Result<InnerProductPd> {
        InnerProductPd::new(&self.to_desc(), &self.to_attr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_and_full_layers() {
        let l: LayerSpec = serde_json::from_str(r#"{"mb":2,"ic":3,"oc":4,"src":"u8","dst":"s32"}"#).unwrap();
        assert_eq!(l.scales, ScaleSpec::Common(1.0));
        assert_eq!(l.round, RoundMode::Nearest);
        assert!(l.relu.is_none() && l.bias.is_none());

        let l: LayerSpec = serde_json::from_str(
            r#"{"mb":1,"ic":2,"spatial":[3,3],"oc":2,"src":"s8","dst":"u8",
                "bias":"s8","scales":[0.5,2.0],"round":"down","relu":0.0}"#,
        ).unwrap();
        assert_eq!(l.k(), 18);
        let pd = l.build_pd().unwrap();
        assert_eq!(pd.ic_total(), 18);
        assert!(pd.relu().is_some());
        assert_eq!(pd.round_mode(), RoundMode::Down);
    }
}
