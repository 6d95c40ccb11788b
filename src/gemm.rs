//! Integer matrix multiply producing the i32 accumulator.
//!
//! The inner product only relies on the `AccumulatorProducer` contract;
//! `RefGemm` is a scalar reference that splits rows across the rayon pool.

use crate::types::SrcElem;
use rayon::prelude::*;

/// `m` rows of `src` (minibatch), `n` columns of the result (output
/// channels), `k` the contraction length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmDims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

pub trait AccumulatorProducer: Send + Sync {
    /// `acc[i * n + j] = Σ_p src[i * k + p] * weights[p * n + j]`.
    /// All of `acc` is written before this returns. Sums wrap on i32
    /// overflow.
    fn multiply<S: SrcElem>(&self, dims: GemmDims, src: &[S], weights: &[i8], acc: &mut [i32]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefGemm;

/// `row += s * w` over one weight row, wrapping like the hardware adds.
#[inline]
fn axpy_i8(row: &mut [i32], s: i32, w: &[i8]) {
    for (r, &wv) in row.iter_mut().zip(w) {
        *r = r.wrapping_add(s * wv as i32);
    }
}

impl AccumulatorProducer for RefGemm {
    fn multiply<S: SrcElem>(&self, dims: GemmDims, src: &[S], weights: &[i8], acc: &mut [i32]) {
        let GemmDims { m, n, k } = dims;
        debug_assert!(src.len() >= m * k && weights.len() >= k * n && acc.len() >= m * n);
        if m == 0 || n == 0 {
            return;
        }
        acc[..m * n]
            .par_chunks_mut(n)
            .zip(src[..m * k].par_chunks(k.max(1)))
            .for_each(|(row, s_row)| {
                row.fill(0);
                for (p, &s) in s_row.iter().enumerate().take(k) {
                    let s = s.widen();
                    if s != 0 {
                        axpy_i8(row, s, &weights[p * n..(p + 1) * n]);
                    }
                }
            });
    }
}
