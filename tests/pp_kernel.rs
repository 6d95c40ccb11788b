use pretty_assertions::assert_eq;
use qfc::pp::reference;
use qfc::types::DstElem;
use qfc::{Bias, DataType, PpConfig, PpKernel, RoundMode, ScaleMode};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;

const BIASES: [Option<DataType>; 5] =
    [None, Some(DataType::F32), Some(DataType::S32), Some(DataType::S8), Some(DataType::U8)];

fn random_bias(rng: &mut SmallRng, dt: DataType, oc: usize) -> Bias {
    match dt {
        DataType::F32 => Bias::from_f32(&(0..oc).map(|_| rng.gen_range(-40.0f32..40.0)).collect::<Vec<_>>()),
        DataType::S32 => Bias::from_s32(&(0..oc).map(|_| rng.gen_range(-400..400)).collect::<Vec<_>>()),
        DataType::S8 => Bias::from_s8(&(0..oc).map(|_| rng.gen::<i8>()).collect::<Vec<_>>()),
        DataType::U8 => Bias::from_u8(&(0..oc).map(|_| rng.gen::<u8>()).collect::<Vec<_>>()),
    }
}

fn every_config(oc: usize) -> Vec<PpConfig> {
    let mut out = Vec::new();
    for bias in BIASES {
        for scale_mode in [ScaleMode::Common, ScaleMode::PerChannel] {
            for with_relu in [false, true] {
                for round_mode in [RoundMode::Nearest, RoundMode::Down] {
                    out.push(PpConfig { oc, bias, scale_mode, with_relu, round_mode });
                }
            }
        }
    }
    out
}

fn matches_reference<D: DstElem + PartialEq + Debug>(mb: usize, oc: usize, seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let acc: Vec<i32> = (0..mb * oc).map(|_| rng.gen_range(-3000..3000)).collect();
    for cfg in every_config(oc) {
        let bias = cfg.bias.map(|dt| random_bias(&mut rng, dt, oc));
        let bias_bytes = bias.as_ref().map_or(&[][..], |b| b.bytes());
        let scales: Vec<f32> = match cfg.scale_mode {
            ScaleMode::Common => vec![rng.gen_range(0.01f32..2.0)],
            ScaleMode::PerChannel => (0..oc).map(|_| rng.gen_range(0.01f32..2.0)).collect(),
        };
        let nslope = if cfg.with_relu { 0.0 } else { 1.0 };

        let mut got = vec![D::default(); acc.len()];
        PpKernel::<D>::new(cfg).process(&mut got, &acc, bias_bytes, &scales, nslope, 0);
        let mut want = vec![D::default(); acc.len()];
        reference::post_process(&cfg, &mut want, &acc, bias_bytes, &scales, nslope, 0);
        assert_eq!(got, want, "config {:?}", cfg);
    }
}

#[test]
fn every_combination_matches_reference_s32() { matches_reference::<i32>(5, 19, 1); }

#[test]
fn every_combination_matches_reference_f32() { matches_reference::<f32>(5, 19, 2); }

#[test]
fn every_combination_matches_reference_s8() { matches_reference::<i8>(5, 19, 3); }

#[test]
fn every_combination_matches_reference_u8() { matches_reference::<u8>(5, 19, 4); }

#[test]
fn single_channel_and_single_row() {
    matches_reference::<u8>(7, 1, 5);
    matches_reference::<i32>(1, 13, 6);
    matches_reference::<f32>(1, 1, 7);
}

#[test]
fn example_identity_post_processing() {
    let cfg = PpConfig { oc: 3, bias: None, scale_mode: ScaleMode::Common, with_relu: false, round_mode: RoundMode::Nearest };
    let mut dst = [0i32; 3];
    PpKernel::new(cfg).process(&mut dst, &[5, -3, 100], &[], &[1.0], 0.0, 0);
    assert_eq!(dst, [5, -3, 100]);
}

#[test]
fn example_relu_clamps_negatives() {
    let cfg = PpConfig { oc: 3, bias: None, scale_mode: ScaleMode::Common, with_relu: true, round_mode: RoundMode::Nearest };
    let mut dst = [0i32; 3];
    PpKernel::new(cfg).process(&mut dst, &[5, -3, 100], &[], &[1.0], 0.0, 0);
    assert_eq!(dst, [5, 0, 100]);
}

#[test]
fn example_bias_scale_relu_to_u8() {
    let bias = Bias::from_f32(&[1.0, 1.0, 1.0]);
    let scales = [0.5f32; 3];
    for (round_mode, expected) in [(RoundMode::Nearest, [3u8, 0, 50]), (RoundMode::Down, [3u8, 0, 50])] {
        let cfg = PpConfig { oc: 3, bias: Some(DataType::F32), scale_mode: ScaleMode::PerChannel, with_relu: true, round_mode };
        let mut dst = [0u8; 3];
        PpKernel::new(cfg).process(&mut dst, &[5, -3, 100], bias.bytes(), &scales, 0.0, 0);
        assert_eq!(dst, expected, "{:?}", round_mode);
    }
}

#[test]
fn rounding_ties_are_pinned() {
    // 0.5 * {101, 102, -5} = {50.5, 51.0, -2.5}; 0.5 * 103 = 51.5
    let acc = [101, 103, -5];
    let near = PpConfig { oc: 3, bias: None, scale_mode: ScaleMode::Common, with_relu: false, round_mode: RoundMode::Nearest };
    let down = PpConfig { round_mode: RoundMode::Down, ..near };
    let mut dst = [0i8; 3];
    PpKernel::new(near).process(&mut dst, &acc, &[], &[0.5], 0.0, 0);
    assert_eq!(dst, [50, 52, -2]);
    PpKernel::new(down).process(&mut dst, &acc, &[], &[0.5], 0.0, 0);
    assert_eq!(dst, [50, 51, -3]);
}

#[test]
fn leaky_slope_scales_negatives() {
    let cfg = PpConfig { oc: 2, bias: Some(DataType::S8), scale_mode: ScaleMode::Common, with_relu: true, round_mode: RoundMode::Nearest };
    let bias = Bias::from_s8(&[-10, 0]);
    let mut dst = [0f32; 4];
    PpKernel::new(cfg).process(&mut dst, &[2, -8, 20, 8], bias.bytes(), &[1.0], 0.25, 0);
    assert_eq!(dst, [-2.0, -2.0, 10.0, 8.0]);
}

#[test]
fn saturates_narrow_outputs() {
    let cfg = PpConfig { oc: 2, bias: Some(DataType::S32), scale_mode: ScaleMode::Common, with_relu: false, round_mode: RoundMode::Nearest };
    let bias = Bias::from_s32(&[1000, -1000]);
    let mut s8 = [0i8; 2];
    PpKernel::new(cfg).process(&mut s8, &[0, 0], bias.bytes(), &[1.0], 0.0, 0);
    assert_eq!(s8, [127, -128]);
    let mut u8s = [0u8; 2];
    PpKernel::new(cfg).process(&mut u8s, &[0, 0], bias.bytes(), &[1.0], 0.0, 0);
    assert_eq!(u8s, [255, 0]);
}

#[test]
fn repeated_calls_are_identical() {
    let mut rng = SmallRng::seed_from_u64(11);
    let oc = 17;
    let acc: Vec<i32> = (0..oc * 9).map(|_| rng.gen_range(-5000..5000)).collect();
    let bias = random_bias(&mut rng, DataType::S32, oc);
    let scales: Vec<f32> = (0..oc).map(|c| 0.01 * (c + 1) as f32).collect();
    let k = PpKernel::<u8>::new(PpConfig {
        oc, bias: Some(DataType::S32), scale_mode: ScaleMode::PerChannel, with_relu: true, round_mode: RoundMode::Nearest,
    });
    let mut first = vec![0u8; acc.len()];
    k.process(&mut first, &acc, bias.bytes(), &scales, 0.0, 0);
    for _ in 0..3 {
        let mut again = vec![0u8; acc.len()];
        k.process(&mut again, &acc, bias.bytes(), &scales, 0.0, 0);
        assert_eq!(again, first);
    }
}

#[test]
fn any_partition_gives_the_same_output() {
    let mut rng = SmallRng::seed_from_u64(12);
    let (mb, oc) = (11, 13);
    let len = mb * oc;
    let acc: Vec<i32> = (0..len).map(|_| rng.gen_range(-3000..3000)).collect();
    for cfg in every_config(oc) {
        let bias = cfg.bias.map(|dt| random_bias(&mut rng, dt, oc));
        let bias_bytes = bias.as_ref().map_or(&[][..], |b| b.bytes());
        let scales: Vec<f32> = (0..oc).map(|_| rng.gen_range(0.01f32..2.0)).collect();
        let k = PpKernel::<i8>::new(cfg);

        let mut whole = vec![0i8; len];
        k.process(&mut whole, &acc, bias_bytes, &scales, 0.0, 0);

        let mut cuts: Vec<usize> = (0..4).map(|_| rng.gen_range(0..=len)).collect();
        cuts.push(0);
        cuts.push(len);
        cuts.sort_unstable();
        let mut pieces = vec![0i8; len];
        for w in cuts.windows(2) {
            let (s, e) = (w[0], w[1]);
            k.process(&mut pieces[s..e], &acc[s..e], bias_bytes, &scales, 0.0, s);
        }
        assert_eq!(pieces, whole, "config {:?} cuts {:?}", cfg, cuts);
    }
}

#[test]
fn kernels_are_shared_across_threads() {
    let oc = 8;
    let k = PpKernel::<f32>::new(PpConfig {
        oc, bias: None, scale_mode: ScaleMode::PerChannel, with_relu: false, round_mode: RoundMode::Nearest,
    });
    let scales: Vec<f32> = (0..oc).map(|c| c as f32).collect();
    let acc = vec![2i32; oc * 64];
    let mut dst = vec![0f32; acc.len()];
    std::thread::scope(|s| {
        for (i, (d, a)) in dst.chunks_mut(oc * 16).zip(acc.chunks(oc * 16)).enumerate() {
            let (k, scales) = (&k, &scales);
            s.spawn(move || k.process(d, a, &[], scales, 0.0, i * oc * 16));
        }
    });
    for (i, v) in dst.iter().enumerate() {
        assert_eq!(*v, 2.0 * (i % oc) as f32);
    }
}
