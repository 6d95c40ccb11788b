//! Scalar post-processing that branches on the configuration per element.
//! Ground truth for the specialized kernels and the baseline in benches.

use super::bias::decode_dyn;
use super::PpConfig;
use crate::pd::ScaleMode;
use crate::types::{DstElem, Down, Nearest, RoundMode};

pub fn post_process<D: DstElem>(
    cfg: &PpConfig,
    dst: &mut [D],
    acc: &[i32],
    bias: &[u8],
    scales: &[f32],
    nslope: f32,
    start: usize,
) {
    let mut oc = start % cfg.oc;
    for (d, &a) in dst.iter_mut().zip(acc) {
        let b = match cfg.bias {
            Some(dt) => decode_dyn(dt, bias, oc),
            None => 0.0,
        };
        let scale = match cfg.scale_mode {
            ScaleMode::Common => scales[0],
            ScaleMode::PerChannel => scales[oc],
        };
        let mut v = (a as f32 + b) * scale;
        if cfg.with_relu && v < 0.0 {
            v *= nslope;
        }
        *d = match cfg.round_mode {
            RoundMode::Nearest => D::from_f32::<Nearest>(v),
            RoundMode::Down => D::from_f32::<Down>(v),
        };
        oc = if oc == cfg.oc - 1 { 0 } else { oc + 1 };
    }
}
