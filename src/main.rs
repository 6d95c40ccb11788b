use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use qfc::gemm::{AccumulatorProducer, GemmDims, RefGemm};
use qfc::layer::{LayerSpec, ScaleSpec};
use qfc::pp::reference;
use qfc::scratchpad::Scratchpad;
use qfc::types::{DstElem, SrcElem};
use qfc::{Bias, DataType, ExecArgs, ExecConfig, ExecEvent, InnerProduct, PpConfig, RoundMode};
use rand::distributions::{Distribution, Standard};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qfc", version, about = "Run and verify a quantized inner-product layer on random data")]
struct Args {
    /// Layer description (JSON); overrides the shape/type flags below
    #[arg(long)]
    layer: Option<PathBuf>,

    /// Minibatch
    #[arg(long, default_value_t = 64)]
    mb: usize,

    /// Input channels
    #[arg(long, default_value_t = 256)]
    ic: usize,

    /// Output channels
    #[arg(long, default_value_t = 1000)]
    oc: usize,

    /// Source type: u8 or s8
    #[arg(long, default_value = "u8", value_parser = parse_data_type)]
    src: DataType,

    /// Destination type: s32, f32, s8 or u8
    #[arg(long, default_value = "s8", value_parser = parse_data_type)]
    dst: DataType,

    /// Bias type; no bias when omitted
    #[arg(long, value_parser = parse_data_type)]
    bias: Option<DataType>,

    /// Fuse a relu with this negative slope
    #[arg(long)]
    relu: Option<f32>,

    /// Output scale (common), or the base of per-channel scales
    #[arg(long, default_value_t = 0.05)]
    scale: f32,

    /// Use one scale per output channel
    #[arg(long, default_value_t = false)]
    per_channel: bool,

    /// Rounding mode: nearest or down
    #[arg(long, default_value = "nearest", value_parser = parse_round_mode)]
    round: RoundMode,

    /// Timed iterations
    #[arg(long, default_value_t = 10)]
    iters: usize,

    /// Worker threads (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Output elements per post-processing task
    #[arg(long, default_value_t = ExecConfig::default().chunk_len)]
    chunk_len: usize,

    /// RNG seed for the inputs
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
}

fn parse_data_type(s: &str) -> std::result::Result<DataType, String> {
    match s.to_lowercase().as_str() {
        "f32" => Ok(DataType::F32),
        "s32" => Ok(DataType::S32),
        "s8" => Ok(DataType::S8),
        "u8" => Ok(DataType::U8),
        _ => Err(format!("unknown data type '{}': use f32, s32, s8 or u8", s)),
    }
}

fn parse_round_mode(s: &str) -> std::result::Result<RoundMode, String> {
    match s.to_lowercase().as_str() {
        "nearest" => Ok(RoundMode::Nearest),
        "down" => Ok(RoundMode::Down),
        _ => Err(format!("unknown round mode '{}': use nearest or down", s)),
    }
}

impl Args {
    fn layer_spec(&self) -> Result<LayerSpec> {
        if let Some(path) = &self.layer {
            return LayerSpec::load(path);
        }
        let scales = if self.per_channel {
            // Spread scales a little so per-channel indexing is visible in the output.
            ScaleSpec::PerChannel((0..self.oc).map(|c| self.scale * (1.0 + (c % 7) as f32 * 0.125)).collect())
        } else {
            ScaleSpec::Common(self.scale)
        };
        Ok(LayerSpec {
            mb: self.mb,
            ic: self.ic,
            spatial: Vec::new(),
            oc: self.oc,
            src: self.src,
            dst: self.dst,
            bias: self.bias,
            scales,
            round: self.round,
            relu: self.relu,
        })
    }
}

fn random_bias(rng: &mut SmallRng, dt: DataType, oc: usize) -> Bias {
    match dt {
        DataType::F32 => Bias::from_f32(&(0..oc).map(|_| rng.gen_range(-64.0..64.0)).collect::<Vec<f32>>()),
        DataType::S32 => Bias::from_s32(&(0..oc).map(|_| rng.gen_range(-500..500)).collect::<Vec<i32>>()),
        DataType::S8 => Bias::from_s8(&(0..oc).map(|_| rng.gen()).collect::<Vec<i8>>()),
        DataType::U8 => Bias::from_u8(&(0..oc).map(|_| rng.gen()).collect::<Vec<u8>>()),
    }
}

fn run<S, D>(spec: &LayerSpec, args: &Args) -> Result<()>
where
    S: SrcElem,
    D: DstElem + PartialEq + std::fmt::Debug,
    Standard: Distribution<S>,
{
    let pd = spec.build_pd().context("layer rejected")?;
    let ip = InnerProduct::<S, D>::new(pd.clone())?
        .with_exec_config(ExecConfig { chunk_len: args.chunk_len });
    info!(
        "layer mb={} k={} oc={} dst_is_acc={} post_processing={} scratch={}B",
        pd.mb(), pd.ic_total(), pd.oc(), pd.dst_is_acc(), ip.post_processes(),
        pd.scratchpad_registry().total_bytes()
    );

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let src: Vec<S> = (0..pd.mb() * pd.ic_total()).map(|_| rng.gen()).collect();
    let weights: Vec<i8> = (0..pd.ic_total() * pd.oc()).map(|_| rng.gen_range(-4..=4)).collect();
    let bias = pd.bias_data_type().map(|dt| random_bias(&mut rng, dt, pd.oc()));
    let mut dst = vec![D::default(); pd.mb() * pd.oc()];
    let mut pad = Scratchpad::new(pd.scratchpad_registry());

    let event = ExecEvent::new();
    let t0 = Instant::now();
    for _ in 0..args.iters.max(1) {
        event.reset();
        ip.execute(
            ExecArgs { src: &src, weights: &weights, bias: bias.as_ref(), dst: &mut dst, scratchpad: Some(&mut pad) },
            &event,
        )?;
    }
    let dt = t0.elapsed().as_secs_f64() / args.iters.max(1) as f64;
    if !event.is_ready() {
        bail!("execution finished without signalling completion");
    }

    // Reference: plain multiply, then the branching scalar post-process.
    let mut acc = vec![0i32; pd.mb() * pd.oc()];
    RefGemm.multiply(GemmDims { m: pd.mb(), n: pd.oc(), k: pd.ic_total() }, &src, &weights, &mut acc);
    let mut expected = vec![D::default(); acc.len()];
    let nslope = pd.relu().map_or(0.0, |r| r.negative_slope);
    let bias_bytes = bias.as_ref().map_or(&[][..], |b| b.bytes());
    if ip.post_processes() {
        reference::post_process(&PpConfig::from_pd(&pd), &mut expected, &acc, bias_bytes, pd.scales(), nslope, 0);
    } else if let Some(slots) = D::in_place(&mut expected) {
        bytemuck::cast_slice_mut::<D::InPlace, i32>(slots).copy_from_slice(&acc);
    }
    let mismatches = dst.iter().zip(&expected).filter(|(a, b)| a != b).count();

    let macs = (pd.mb() * pd.ic_total() * pd.oc()) as f64;
    println!(
        "time/iter: {:.3} ms  GMAC/s: {:.2}  mismatches: {}/{}",
        dt * 1e3, macs / dt / 1e9, mismatches, dst.len()
    );
    if mismatches > 0 {
        bail!("{} outputs differ from the reference", mismatches);
    }
    Ok(())
}

fn dispatch(spec: &LayerSpec, args: &Args) -> Result<()> {
    use DataType::*;
    match (spec.src, spec.dst) {
        (U8, S32) => run::<u8, i32>(spec, args),
        (U8, F32) => run::<u8, f32>(spec, args),
        (U8, S8) => run::<u8, i8>(spec, args),
        (U8, U8) => run::<u8, u8>(spec, args),
        (S8, S32) => run::<i8, i32>(spec, args),
        (S8, F32) => run::<i8, f32>(spec, args),
        (S8, S8) => run::<i8, i8>(spec, args),
        (S8, U8) => run::<i8, u8>(spec, args),
        (src, dst) => bail!("unsupported src/dst pair {:?}/{:?}", src, dst),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let spec = args.layer_spec()?;

    if args.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build()
            .context("build thread pool")?;
        pool.install(|| dispatch(&spec, &args))
    } else {
        dispatch(&spec, &args)
    }
}
