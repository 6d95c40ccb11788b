//! Post-processing of the i32 accumulator into the destination buffer:
//! bias, output scale, relu and the rounding conversion, fused into one pass.
pub mod bias;
mod ker;
pub mod reference;

use crate::pd::{InnerProductPd, ScaleMode};
use crate::types::{DataType, DstElem, RoundMode};
use log::debug;

pub use bias::Bias;

/// Everything a post-processing kernel is specialized on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpConfig {
    pub oc: usize,
    pub bias: Option<DataType>,
    pub scale_mode: ScaleMode,
    pub with_relu: bool,
    pub round_mode: RoundMode,
}

impl PpConfig {
    pub fn from_pd(pd: &InnerProductPd) -> Self {
        Self {
            oc: pd.oc(),
            bias: pd.bias_data_type(),
            scale_mode: pd.scale_mode(),
            with_relu: pd.relu().is_some(),
            round_mode: pd.round_mode(),
        }
    }
}

/// Arguments of one kernel call. `dst` and `acc` cover the same sub-range,
/// whose first element belongs to channel `oc_offset`.
pub struct KernelArgs<'a, D> {
    pub dst: &'a mut [D],
    pub acc: &'a [i32],
    pub bias: &'a [u8],
    pub scales: &'a [f32],
    pub nslope: f32,
    pub oc: usize,
    pub oc_offset: usize,
}

/// A post-processing routine fixed to one `PpConfig`.
pub struct PpKernel<D: DstElem> {
    ker: ker::KerFn<D>,
    cfg: PpConfig,
}

impl<D: DstElem> PpKernel<D> {
    /// # Panics
    /// If `cfg.oc` is zero.
    pub fn new(cfg: PpConfig) -> Self {
        assert!(cfg.oc > 0, "post-processing needs at least one output channel");
        let per_oc = cfg.scale_mode == ScaleMode::PerChannel;
        let ker = ker::select::<D>(cfg.bias, per_oc, cfg.with_relu, cfg.round_mode);
        debug!(
            "pp kernel: dst={:?} oc={} bias={:?} scales={:?} relu={} round={:?}",
            D::DATA_TYPE, cfg.oc, cfg.bias, cfg.scale_mode, cfg.with_relu, cfg.round_mode
        );
        Self { ker, cfg }
    }

    pub fn from_pd(pd: &InnerProductPd) -> Self { Self::new(PpConfig::from_pd(pd)) }

    pub fn config(&self) -> &PpConfig { &self.cfg }

    /// Post-process `acc` into `dst`, where both slices start at flat index
    /// `start` of the `[MB, OC]` output.
    ///
    /// # Panics
    /// If `dst` and `acc` differ in length, `scales` is empty or shorter than
    /// OC in per-channel mode, or `bias` is shorter than OC values of the
    /// configured encoding.
    pub fn process(
        &self,
        dst: &mut [D],
        acc: &[i32],
        bias: &[u8],
        scales: &[f32],
        nslope: f32,
        start: usize,
    ) {
        assert_eq!(dst.len(), acc.len(), "dst and acc ranges differ");
        if dst.is_empty() {
            return;
        }
        let oc = self.cfg.oc;
        let min_scales = match self.cfg.scale_mode {
            ScaleMode::Common => 1,
            ScaleMode::PerChannel => oc,
        };
        assert!(scales.len() >= min_scales, "{} scales for {} channels", scales.len(), oc);
        if let Some(dt) = self.cfg.bias {
            assert!(bias.len() >= oc * dt.size(), "bias holds {} bytes, need {}", bias.len(), oc * dt.size());
        }
        let mut args = KernelArgs { dst, acc, bias, scales, nslope, oc, oc_offset: start % oc };
        (self.ker)(&mut args);
    }
}
