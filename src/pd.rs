//! Primitive descriptor: validates a layer request and derives everything the
//! kernel generator and the executor need. Nothing here is built unless the
//! whole request is accepted.

use crate::desc::attr::{PrimitiveAttr, PER_OC_MASK};
use crate::desc::{Format, InnerProductDesc, MemoryDesc, PropKind, TensorRole};
use crate::error::{Error, Result, Unsupported};
use crate::scratchpad::{ScratchKey, ScratchpadRegistry};
use crate::types::{DataType, RoundMode};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// One scale shared by every output channel.
    Common,
    /// `scales[oc]` per output channel.
    PerChannel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relu {
    /// Multiplier for negative values; 0.0 clamps them to zero.
    pub negative_slope: f32,
}

#[derive(Debug, Clone)]
pub struct InnerProductPd {
    desc: InnerProductDesc,
    attr: PrimitiveAttr,
    mb: usize,
    oc: usize,
    ic_total: usize,
    scale_mode: ScaleMode,
    relu: Option<Relu>,
    dst_is_acc: bool,
    scratchpad: ScratchpadRegistry,
}

impl InnerProductPd {
    pub fn new(desc: &InnerProductDesc, attr: &PrimitiveAttr) -> Result<Self> {
        let mut desc = desc.clone();

        if !matches!(desc.prop_kind, PropKind::ForwardTraining | PropKind::ForwardInference) {
            return Err(Unsupported::PropKind(desc.prop_kind).into());
        }
        let ic_total = check_shapes(&desc)?;
        check_data_types(&desc)?;
        let relu = check_post_ops(attr)?;
        let oc = desc.weights.dims[0];
        let scale_mode = check_output_scales(attr, oc)?;
        set_default_formats(&mut desc)?;

        let mb = desc.src.dims[0];
        let dst_is_acc = desc.dst.data_type.is_acc_type();

        let mut pd = Self {
            desc,
            attr: attr.clone(),
            mb,
            oc,
            ic_total,
            scale_mode,
            relu,
            dst_is_acc,
            scratchpad: ScratchpadRegistry::default(),
        };
        pd.init_scratchpad();
        debug!(
            "inner product pd: mb={} oc={} k={} src={:?} dst={:?} bias={:?} scales={:?} relu={:?} dst_is_acc={}",
            pd.mb, pd.oc, pd.ic_total, pd.src_data_type(), pd.dst_data_type(),
            pd.bias_data_type(), pd.scale_mode, pd.relu, pd.dst_is_acc
        );
        Ok(pd)
    }

    fn init_scratchpad(&mut self) {
        if !self.dst_is_acc {
            self.scratchpad.book(
                ScratchKey::IprodAccumulator,
                std::mem::size_of::<i32>() * self.mb * self.oc,
            );
        }
    }

    pub fn desc(&self) -> &InnerProductDesc { &self.desc }
    pub fn attr(&self) -> &PrimitiveAttr { &self.attr }
    pub fn mb(&self) -> usize { self.mb }
    pub fn oc(&self) -> usize { self.oc }
    /// Contraction length: input channels times spatial extent.
    pub fn ic_total(&self) -> usize { self.ic_total }
    pub fn src_data_type(&self) -> DataType { self.desc.src.data_type }
    pub fn dst_data_type(&self) -> DataType { self.desc.dst.data_type }
    pub fn with_bias(&self) -> bool { self.desc.bias.is_some() }
    pub fn bias_data_type(&self) -> Option<DataType> { self.desc.bias.as_ref().map(|b| b.data_type) }
    pub fn scale_mode(&self) -> ScaleMode { self.scale_mode }
    pub fn scales(&self) -> &[f32] { &self.attr.output_scales.scales }
    pub fn round_mode(&self) -> RoundMode { self.attr.round_mode }
    pub fn relu(&self) -> Option<Relu> { self.relu }
    pub fn dst_is_acc(&self) -> bool { self.dst_is_acc }
    pub fn scratchpad_registry(&self) -> &ScratchpadRegistry { &self.scratchpad }

    /// True when the raw accumulator already is the final s32 output.
    pub fn skips_post_processing(&self) -> bool {
        self.dst_is_acc
            && self.dst_data_type() == DataType::S32
            && !self.with_bias()
            && self.relu.is_none()
            && self.attr.output_scales.is_identity()
    }
}

/// Validates ranks and extents; returns the contraction length.
fn check_shapes(desc: &InnerProductDesc) -> Result<usize> {
    let (src, wei, dst) = (&desc.src, &desc.weights, &desc.dst);
    if !(2..=5).contains(&src.ndims()) {
        return Err(Unsupported::Rank { tensor: TensorRole::Src, ndims: src.ndims() }.into());
    }
    if wei.ndims() != src.ndims() {
        return Err(Unsupported::Rank { tensor: TensorRole::Weights, ndims: wei.ndims() }.into());
    }
    if dst.ndims() != 2 {
        return Err(Unsupported::Rank { tensor: TensorRole::Dst, ndims: dst.ndims() }.into());
    }
    if let Some(bias) = &desc.bias {
        if bias.ndims() != 1 {
            return Err(Unsupported::Rank { tensor: TensorRole::Bias, ndims: bias.ndims() }.into());
        }
    }

    let mut tensors = vec![(TensorRole::Src, src), (TensorRole::Weights, wei), (TensorRole::Dst, dst)];
    if let Some(bias) = &desc.bias {
        tensors.push((TensorRole::Bias, bias));
    }
    if let Some((role, _)) = tensors.iter().find(|(_, md)| md.has_zero_dim()) {
        return Err(Unsupported::ZeroDim(*role).into());
    }

    if wei.dims[1..] != src.dims[1..] {
        return Err(Unsupported::ShapeMismatch(format!(
            "weights {:?} do not match src {:?}", wei.dims, src.dims
        )).into());
    }
    let (mb, oc) = (src.dims[0], wei.dims[0]);
    if dst.dims != [mb, oc] {
        return Err(Unsupported::ShapeMismatch(format!(
            "dst {:?}, expected [{}, {}]", dst.dims, mb, oc
        )).into());
    }
    if let Some(bias) = &desc.bias {
        if bias.dims != [oc] {
            return Err(Unsupported::ShapeMismatch(format!(
                "bias {:?}, expected [{}]", bias.dims, oc
            )).into());
        }
    }
    check_sizes(&src.dims, oc)
}

/// Every buffer size the primitive computes must fit in `usize`, including the
/// scratch accumulator's byte count.
fn check_sizes(src_dims: &[usize], oc: usize) -> Result<usize> {
    let overflow = |what: &str| -> Error {
        Unsupported::ShapeMismatch(format!("{} of src {:?} with oc {} overflows usize", what, src_dims, oc)).into()
    };
    let mb = src_dims[0];
    let ic_total = src_dims[1..]
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| overflow("input channel count"))?;
    mb.checked_mul(ic_total).ok_or_else(|| overflow("src size"))?;
    ic_total.checked_mul(oc).ok_or_else(|| overflow("weights size"))?;
    mb.checked_mul(oc)
        .and_then(|n| n.checked_mul(std::mem::size_of::<i32>()))
        .ok_or_else(|| overflow("accumulator size"))?;
    Ok(ic_total)
}

fn check_data_types(desc: &InnerProductDesc) -> Result<()> {
    use DataType::*;
    let reject = |tensor, md: &MemoryDesc| -> Error {
        Unsupported::DataType { tensor, data_type: md.data_type }.into()
    };
    if !matches!(desc.src.data_type, U8 | S8) {
        return Err(reject(TensorRole::Src, &desc.src));
    }
    if desc.weights.data_type != S8 {
        return Err(reject(TensorRole::Weights, &desc.weights));
    }
    // dst and bias accept every DataType variant: f32, s32, s8, u8.
    Ok(())
}

fn check_post_ops(attr: &PrimitiveAttr) -> Result<Option<Relu>> {
    match attr.post_ops.as_slice() {
        [] => Ok(None),
        [op] => op
            .as_fusable_relu()
            .map(|negative_slope| Some(Relu { negative_slope }))
            .ok_or_else(|| Unsupported::PostOpKind.into()),
        ops => Err(Unsupported::PostOpCount(ops.len()).into()),
    }
}

fn check_output_scales(attr: &PrimitiveAttr, oc: usize) -> Result<ScaleMode> {
    let os = &attr.output_scales;
    match (os.mask, os.scales.len()) {
        (0, 1) => Ok(ScaleMode::Common),
        (PER_OC_MASK, n) if n == oc => Ok(ScaleMode::PerChannel),
        (mask, count) => Err(Unsupported::OutputScales { mask, count }.into()),
    }
}

fn resolve_format(md: &mut MemoryDesc, role: TensorRole, wanted: Format) -> Result<()> {
    match md.format {
        Format::Any => {
            md.format = wanted;
            Ok(())
        }
        f if f == wanted => Ok(()),
        format => Err(Error::InvalidLayout { tensor: role, format }),
    }
}

fn set_default_formats(desc: &mut InnerProductDesc) -> Result<()> {
    let ndims = desc.src.ndims();
    let src_fmt = Format::channel_last(ndims)
        .ok_or(Unsupported::Rank { tensor: TensorRole::Src, ndims })?;
    let wei_fmt = Format::weights_for(ndims)
        .ok_or(Unsupported::Rank { tensor: TensorRole::Weights, ndims })?;
    resolve_format(&mut desc.src, TensorRole::Src, src_fmt)?;
    resolve_format(&mut desc.weights, TensorRole::Weights, wei_fmt)?;
    resolve_format(&mut desc.dst, TensorRole::Dst, Format::Nc)?;
    if let Some(bias) = desc.bias.as_mut() {
        resolve_format(bias, TensorRole::Bias, Format::X)?;
    }
    Ok(())
}
