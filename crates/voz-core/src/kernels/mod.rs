//! SIMD-dispatched vector kernels and elementwise activations.
//!
//! Each operation has exactly one public entry point; the best available
//! variant is chosen once at first use from detected CPU capabilities
//! (SSE2 / AVX / AVX2+FMA on x86-64, NEON on aarch64) and cached in a
//! [`OnceLock`]. A scalar path always exists and is the only variant on
//! other targets.
//!
//! The activation functions (`relu`, `sigmoid`, `tanh_act`, `gelu`,
//! `softmax`, `layer_norm`, `batch_norm`) are scalar on every tier — they
//! compose the [`fast_math`](crate::fast_math) approximations and
//! auto-vectorize well — but route through the same dispatch table so a
//! wider variant can slot in per-target later.

mod scalar;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "x86_64")]
mod x86;

use std::sync::OnceLock;

/// CPU capabilities relevant to kernel selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuFeatures {
    /// SSE2 (baseline on x86-64).
    pub sse2: bool,
    /// AVX 256-bit float ops.
    pub avx: bool,
    /// AVX2 integer/gather extensions (paired with FMA here).
    pub avx2: bool,
    /// Fused multiply-add.
    pub fma: bool,
    /// ARM NEON (baseline on aarch64).
    pub neon: bool,
}

impl CpuFeatures {
    /// Queries the running CPU.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                sse2: is_x86_feature_detected!("sse2"),
                avx: is_x86_feature_detected!("avx"),
                avx2: is_x86_feature_detected!("avx2"),
                fma: is_x86_feature_detected!("fma"),
                neon: false,
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self {
                neon: std::arch::is_aarch64_feature_detected!("neon"),
                ..Self::default()
            }
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self::default()
        }
    }
}

/// Resolved function table for one dispatch tier.
pub(crate) struct KernelSet {
    pub name: &'static str,
    pub vec_add: fn(&[f32], &[f32], &mut [f32]),
    pub vec_mul: fn(&[f32], &[f32], &mut [f32]),
    pub vec_scale: fn(&[f32], f32, &mut [f32]),
    pub vec_dot: fn(&[f32], &[f32]) -> f32,
    pub gemm: fn(&[f32], &[f32], &mut [f32], usize, usize, usize),
}

static KERNELS: OnceLock<KernelSet> = OnceLock::new();

fn kernels() -> &'static KernelSet {
    KERNELS.get_or_init(|| {
        let set = select(CpuFeatures::detect());
        tracing::debug!(tier = set.name, "kernel dispatch resolved");
        set
    })
}

#[allow(unused_variables)]
fn select(features: CpuFeatures) -> KernelSet {
    #[cfg(target_arch = "x86_64")]
    {
        if features.avx2 && features.fma {
            return x86::avx2_set();
        }
        if features.avx {
            return x86::avx_set();
        }
        if features.sse2 {
            return x86::sse2_set();
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if features.neon {
            return neon::neon_set();
        }
    }
    scalar::set()
}

/// Name of the dispatch tier in use (`"scalar"`, `"sse2"`, `"avx"`,
/// `"avx2"`, `"neon"`).
pub fn dispatch_name() -> &'static str {
    kernels().name
}

/// `out[i] = a[i] + b[i]`.
///
/// All three slices must share a length.
pub fn vec_add(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    (kernels().vec_add)(a, b, out);
}

/// `out[i] = a[i] * b[i]`.
pub fn vec_mul(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    (kernels().vec_mul)(a, b, out);
}

/// `out[i] = a[i] * s`.
pub fn vec_scale(a: &[f32], s: f32, out: &mut [f32]) {
    debug_assert_eq!(a.len(), out.len());
    (kernels().vec_scale)(a, s, out);
}

/// Dot product `Σ a[i]·b[i]`.
pub fn vec_dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    (kernels().vec_dot)(a, b)
}

/// Row-major matrix multiply `C := A·B`.
///
/// `A` is `m×k`, `B` is `k×n`, `C` is `m×n`; leading dimensions equal the
/// column counts. `C` is overwritten.
pub fn gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);
    (kernels().gemm)(a, b, c, m, k, n);
}

/// In-place `max(x, 0)`.
pub fn relu(buf: &mut [f32]) {
    for x in buf.iter_mut() {
        *x = x.max(0.0);
    }
}

/// In-place logistic sigmoid.
pub fn sigmoid(buf: &mut [f32]) {
    for x in buf.iter_mut() {
        *x = crate::fast_math::fast_sigmoid(*x);
    }
}

/// In-place hyperbolic tangent.
pub fn tanh_act(buf: &mut [f32]) {
    for x in buf.iter_mut() {
        *x = crate::fast_math::fast_tanh(*x);
    }
}

/// In-place GELU.
pub fn gelu(buf: &mut [f32]) {
    for x in buf.iter_mut() {
        *x = crate::fast_math::fast_gelu(*x);
    }
}

/// In-place numerically stable softmax.
///
/// Subtracts the running maximum before exponentiation so large logits do
/// not overflow.
pub fn softmax(buf: &mut [f32]) {
    if buf.is_empty() {
        return;
    }
    let max = buf.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for x in buf.iter_mut() {
        *x = crate::fast_math::fast_exp(*x - max);
        sum += *x;
    }
    let inv = 1.0 / sum;
    for x in buf.iter_mut() {
        *x *= inv;
    }
}

/// In-place layer normalization with affine transform.
///
/// `gamma` and `beta` must match `buf` in length.
pub fn layer_norm(buf: &mut [f32], gamma: &[f32], beta: &[f32], eps: f32) {
    debug_assert_eq!(buf.len(), gamma.len());
    debug_assert_eq!(buf.len(), beta.len());
    if buf.is_empty() {
        return;
    }
    let n = buf.len() as f32;
    let mean = buf.iter().sum::<f32>() / n;
    let var = buf.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n;
    let inv_std = crate::fast_math::fast_inv_sqrt(var + eps);
    for (i, x) in buf.iter_mut().enumerate() {
        *x = (*x - mean) * inv_std * gamma[i] + beta[i];
    }
}

/// In-place batch normalization against precomputed statistics.
pub fn batch_norm(buf: &mut [f32], mean: f32, var: f32, gamma: f32, beta: f32, eps: f32) {
    let inv_std = crate::fast_math::fast_inv_sqrt(var + eps);
    for x in buf.iter_mut() {
        *x = (*x - mean) * inv_std * gamma + beta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, step: f32) -> Vec<f32> {
        (0..n).map(|i| (i as f32 - n as f32 / 2.0) * step).collect()
    }

    #[test]
    fn dispatch_resolves_once() {
        let name = dispatch_name();
        assert!(["scalar", "sse2", "avx", "avx2", "neon"].contains(&name));
        assert_eq!(dispatch_name(), name);
    }

    #[test]
    fn add_mul_scale_match_scalar_reference() {
        // Lengths straddle the SIMD lane boundaries to cover tails.
        for n in [1, 3, 7, 8, 15, 64, 1000] {
            let a = ramp(n, 0.37);
            let b = ramp(n, -0.11);
            let mut out = vec![0.0f32; n];

            vec_add(&a, &b, &mut out);
            for i in 0..n {
                assert!((out[i] - (a[i] + b[i])).abs() <= 1e-5 * (a[i] + b[i]).abs().max(1.0));
            }

            vec_mul(&a, &b, &mut out);
            for i in 0..n {
                assert!((out[i] - a[i] * b[i]).abs() <= 1e-5 * (a[i] * b[i]).abs().max(1.0));
            }

            vec_scale(&a, 1.618, &mut out);
            for i in 0..n {
                assert!((out[i] - a[i] * 1.618).abs() <= 1e-5 * (a[i] * 1.618).abs().max(1.0));
            }
        }
    }

    #[test]
    fn dot_matches_scalar_reference() {
        for n in [1, 5, 8, 33, 1024] {
            let a = ramp(n, 0.013);
            let b = ramp(n, 0.029);
            let exact: f64 = a
                .iter()
                .zip(&b)
                .map(|(&x, &y)| f64::from(x) * f64::from(y))
                .sum();
            let got = f64::from(vec_dot(&a, &b));
            // f32 accumulation error scales with the absolute term sum,
            // not the (possibly cancelling) result.
            let abs_sum: f64 = a
                .iter()
                .zip(&b)
                .map(|(&x, &y)| (f64::from(x) * f64::from(y)).abs())
                .sum();
            let tol = 1e-5 * abs_sum.max(1.0);
            assert!((got - exact).abs() <= tol, "n={n}: {got} vs {exact}");
        }
    }

    #[test]
    fn gemm_matches_naive() {
        let (m, k, n) = (5, 7, 9);
        let a: Vec<f32> = (0..m * k).map(|i| (i as f32).sin()).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i as f32).cos()).collect();
        let mut c = vec![f32::NAN; m * n]; // must be fully overwritten
        gemm(&a, &b, &mut c, m, k, n);

        for i in 0..m {
            for j in 0..n {
                let exact: f32 = (0..k).map(|l| a[i * k + l] * b[l * n + j]).sum();
                let got = c[i * n + j];
                assert!(
                    (got - exact).abs() <= 1e-4 * exact.abs().max(1.0),
                    "C[{i},{j}] = {got}, expected {exact}"
                );
            }
        }
    }

    #[test]
    fn relu_clamps_negatives() {
        let mut buf = vec![-1.0, 0.0, 2.5, -0.001];
        relu(&mut buf);
        assert_eq!(buf, vec![0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn softmax_is_stable_and_normalized() {
        let mut buf = vec![1000.0, 1001.0, 1002.0];
        softmax(&mut buf);
        let sum: f32 = buf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(buf.iter().all(|x| x.is_finite()));
        assert!(buf[2] > buf[1] && buf[1] > buf[0]);
    }

    #[test]
    fn layer_norm_centers_and_scales() {
        let mut buf = vec![1.0, 2.0, 3.0, 4.0];
        let gamma = vec![1.0; 4];
        let beta = vec![0.0; 4];
        layer_norm(&mut buf, &gamma, &beta, 1e-5);
        let mean: f32 = buf.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-4);
        let var: f32 = buf.iter().map(|x| x * x).sum::<f32>() / 4.0;
        assert!((var - 1.0).abs() < 1e-2);
    }

    #[test]
    fn batch_norm_applies_affine() {
        let mut buf = vec![2.0, 4.0];
        batch_norm(&mut buf, 3.0, 1.0, 2.0, 1.0, 0.0);
        assert!((buf[0] - (-1.0)).abs() < 1e-3);
        assert!((buf[1] - 3.0).abs() < 1e-3);
    }
}
