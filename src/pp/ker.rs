//! Specialized post-processing routines and the table that picks one.
//!
//! `ker` is instantiated once per (bias encoding, scale mode, relu, rounding)
//! for each output type; `select` runs at build time and returns a plain
//! function pointer, so the per-element loop never looks at configuration.

use super::bias::{BiasDecode, BiasF32, BiasS32, BiasS8, BiasU8, NoBias};
use super::KernelArgs;
use crate::types::{DataType, DstElem, Down, Nearest, RoundMode, Rounding};

pub(crate) type KerFn<D> = fn(&mut KernelArgs<'_, D>);

fn ker<D, B, R, const PER_OC: bool, const RELU: bool>(args: &mut KernelArgs<'_, D>)
where
    D: DstElem,
    B: BiasDecode,
    R: Rounding,
{
    let oc = args.oc;
    let len = args.dst.len().min(args.acc.len());
    let nslope = args.nslope;
    let common_scale = args.scales[0];

    // Walk channel-aligned segments so the inner loop has no wrap-around.
    let mut i = 0;
    let mut c0 = args.oc_offset;
    while i < len {
        let n = (oc - c0).min(len - i);
        let scales = if PER_OC { &args.scales[c0..c0 + n] } else { &args.scales[..1] };
        let dst = &mut args.dst[i..i + n];
        let acc = &args.acc[i..i + n];
        for (k, (d, &a)) in dst.iter_mut().zip(acc).enumerate() {
            let mut v = a as f32;
            if B::PRESENT {
                v += B::decode(args.bias, c0 + k);
            }
            v *= if PER_OC { scales[k] } else { common_scale };
            if RELU && v < 0.0 {
                v *= nslope;
            }
            *d = D::from_f32::<R>(v);
        }
        i += n;
        c0 = 0;
    }
}

pub(crate) fn select<D: DstElem>(
    bias: Option<DataType>,
    per_oc: bool,
    relu: bool,
    round_mode: RoundMode,
) -> KerFn<D> {
    match bias {
        None => select_scale::<D, NoBias>(per_oc, relu, round_mode),
        Some(DataType::F32) => select_scale::<D, BiasF32>(per_oc, relu, round_mode),
        Some(DataType::S32) => select_scale::<D, BiasS32>(per_oc, relu, round_mode),
        Some(DataType::S8) => select_scale::<D, BiasS8>(per_oc, relu, round_mode),
        Some(DataType::U8) => select_scale::<D, BiasU8>(per_oc, relu, round_mode),
    }
}

fn select_scale<D: DstElem, B: BiasDecode>(per_oc: bool, relu: bool, round_mode: RoundMode) -> KerFn<D> {
    match (per_oc, relu) {
        (false, false) => select_round::<D, B, false, false>(round_mode),
        (false, true) => select_round::<D, B, false, true>(round_mode),
        (true, false) => select_round::<D, B, true, false>(round_mode),
        (true, true) => select_round::<D, B, true, true>(round_mode),
    }
}

fn select_round<D: DstElem, B: BiasDecode, const PER_OC: bool, const RELU: bool>(
    round_mode: RoundMode,
) -> KerFn<D> {
    match round_mode {
        RoundMode::Nearest => ker::<D, B, Nearest, PER_OC, RELU>,
        RoundMode::Down => ker::<D, B, Down, PER_OC, RELU>,
    }
}
