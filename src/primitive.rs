//! Forward execution: integer multiply, then the post-processing pass over
//! the `[MB, OC]` output in parallel chunks.

use crate::desc::TensorRole;
use crate::error::{Error, Result, Unsupported};
use crate::gemm::{AccumulatorProducer, GemmDims, RefGemm};
use crate::pd::InnerProductPd;
use crate::pp::{Bias, PpKernel};
use crate::scratchpad::{ScratchKey, Scratchpad};
use crate::types::{DstElem, SrcElem};
use bytemuck::Pod;
use log::trace;
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

/// Raw accumulators staged per in-place kernel call.
const IN_PLACE_TILE: usize = 256;

/// Completion flag set once every output chunk has been written.
#[derive(Debug, Default)]
pub struct ExecEvent {
    ready: AtomicBool,
}

impl ExecEvent {
    pub fn new() -> Self { Self::default() }
    pub fn mark_ready(&self) { self.ready.store(true, Ordering::Release); }
    pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }
    pub fn reset(&self) { self.ready.store(false, Ordering::Release); }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Output elements per post-processing task. Ranges no longer than this
    /// run on the calling thread.
    pub chunk_len: usize,
}

impl Default for ExecConfig {
    fn default() -> Self { Self { chunk_len: 16 * 1024 } }
}

pub struct ExecArgs<'a, S, D> {
    pub src: &'a [S],
    pub weights: &'a [i8],
    pub bias: Option<&'a Bias>,
    pub dst: &'a mut [D],
    /// Memory for the pd's scratchpad registry; allocated per call if `None`.
    pub scratchpad: Option<&'a mut Scratchpad>,
}

enum PostPass<D: DstElem> {
    /// Multiply into scratch, then convert into dst.
    Scratch(PpKernel<D>),
    /// Multiply into dst, then rewrite it in place.
    InPlace(PpKernel<D::InPlace>),
    /// The raw s32 accumulator is the result.
    Skip,
}

pub struct InnerProduct<S: SrcElem, D: DstElem, G: AccumulatorProducer = RefGemm> {
    pd: InnerProductPd,
    post: PostPass<D>,
    gemm: G,
    exec: ExecConfig,
    _src: PhantomData<fn(S)>,
}

impl<S: SrcElem, D: DstElem> InnerProduct<S, D> {
    pub fn new(pd: InnerProductPd) -> Result<Self> { Self::with_producer(pd, RefGemm) }
}

impl<S: SrcElem, D: DstElem, G: AccumulatorProducer> InnerProduct<S, D, G> {
    pub fn with_producer(pd: InnerProductPd, gemm: G) -> Result<Self> {
        if pd.src_data_type() != S::DATA_TYPE {
            return Err(Unsupported::DataType { tensor: TensorRole::Src, data_type: pd.src_data_type() }.into());
        }
        if pd.dst_data_type() != D::DATA_TYPE {
            return Err(Unsupported::DataType { tensor: TensorRole::Dst, data_type: pd.dst_data_type() }.into());
        }
        let post = if !pd.dst_is_acc() {
            PostPass::Scratch(PpKernel::from_pd(&pd))
        } else if pd.skips_post_processing() {
            PostPass::Skip
        } else {
            PostPass::InPlace(PpKernel::from_pd(&pd))
        };
        Ok(Self { pd, post, gemm, exec: ExecConfig::default(), _src: PhantomData })
    }

    pub fn with_exec_config(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }

    pub fn pd(&self) -> &InnerProductPd { &self.pd }

    /// Whether execution runs a post-processing pass at all.
    pub fn post_processes(&self) -> bool { !matches!(self.post, PostPass::Skip) }

    pub fn execute(&self, args: ExecArgs<'_, S, D>, event: &ExecEvent) -> Result<()> {
        self.check_args(&args)?;
        let pd = &self.pd;
        let dims = GemmDims { m: pd.mb(), n: pd.oc(), k: pd.ic_total() };
        let len = pd.mb() * pd.oc();
        let bias = args.bias.map_or(&[][..], |b| b.bytes());
        let scales = pd.scales();
        let nslope = pd.relu().map_or(0.0, |r| r.negative_slope);

        match &self.post {
            PostPass::Scratch(ker) => {
                let mut local;
                let pad = match args.scratchpad {
                    Some(pad) => pad,
                    None => {
                        local = Scratchpad::new(pd.scratchpad_registry());
                        &mut local
                    }
                };
                let acc = pad.acc_for(ScratchKey::IprodAccumulator, len)?;
                self.gemm.multiply(dims, args.src, args.weights, &mut *acc);
                let acc: &[i32] = acc;
                self.for_each_chunk(args.dst, |start, dst| {
                    ker.process(dst, &acc[start..start + dst.len()], bias, scales, nslope, start);
                });
            }
            PostPass::InPlace(ker) => {
                let slots = self.in_place_slots(args.dst)?;
                self.gemm.multiply(dims, args.src, args.weights, bytemuck::cast_slice_mut(&mut *slots));
                self.for_each_chunk(slots, |start, chunk| {
                    process_in_place(ker, chunk, bias, scales, nslope, start);
                });
            }
            PostPass::Skip => {
                let slots = self.in_place_slots(args.dst)?;
                self.gemm.multiply(dims, args.src, args.weights, bytemuck::cast_slice_mut(slots));
            }
        }
        event.mark_ready();
        Ok(())
    }

    fn in_place_slots<'d>(&self, dst: &'d mut [D]) -> Result<&'d mut [D::InPlace]> {
        D::in_place(dst).ok_or(Error::Unsupported(Unsupported::DataType {
            tensor: TensorRole::Dst,
            data_type: D::DATA_TYPE,
        }))
    }

    fn for_each_chunk<T, F>(&self, buf: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        let chunk = self.exec.chunk_len.max(1);
        if buf.len() <= chunk {
            trace!("post-processing {} elements inline", buf.len());
            f(0, buf);
            return;
        }
        trace!("post-processing {} elements in {} chunks", buf.len(), buf.len().div_ceil(chunk));
        buf.par_chunks_mut(chunk).enumerate().for_each(|(i, c)| f(i * chunk, c));
    }

    fn check_args(&self, args: &ExecArgs<'_, S, D>) -> Result<()> {
        let pd = &self.pd;
        let sizes = [
            ("src", pd.mb() * pd.ic_total(), args.src.len()),
            ("weights", pd.ic_total() * pd.oc(), args.weights.len()),
            ("dst", pd.mb() * pd.oc(), args.dst.len()),
        ];
        if let Some(&(arg, expected, actual)) = sizes.iter().find(|(_, e, a)| e != a) {
            return Err(Error::BufferSize { arg, expected, actual });
        }
        let actual = args.bias.map(|b| b.data_type());
        if actual != pd.bias_data_type() {
            return Err(Error::BiasDataType { expected: pd.bias_data_type(), actual });
        }
        if let Some(b) = args.bias {
            if b.len() != pd.oc() {
                return Err(Error::BufferSize { arg: "bias", expected: pd.oc(), actual: b.len() });
            }
        }
        Ok(())
    }
}

/// Post-process slots that still hold raw accumulators, a tile at a time.
fn process_in_place<T: DstElem + Pod>(
    ker: &PpKernel<T>,
    chunk: &mut [T],
    bias: &[u8],
    scales: &[f32],
    nslope: f32,
    start: usize,
) {
    let mut tile = [0i32; IN_PLACE_TILE];
    for (t, block) in chunk.chunks_mut(IN_PLACE_TILE).enumerate() {
        let acc = &mut tile[..block.len()];
        acc.copy_from_slice(bytemuck::cast_slice::<T, i32>(&*block));
        ker.process(block, acc, bias, scales, nslope, start + t * IN_PLACE_TILE);
    }
}
