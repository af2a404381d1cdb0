//! x86-64 kernel variants: SSE2, AVX, and AVX2+FMA tiers.
//!
//! Every `#[target_feature]` function is only reachable through the
//! dispatch table, which is populated after `is_x86_feature_detected!`
//! confirmed the tier; the safe wrappers encode that invariant.

#![allow(unsafe_code)]

use std::arch::x86_64::{
    __m256, _mm_add_ps, _mm_loadu_ps, _mm_mul_ps, _mm_set1_ps, _mm_setzero_ps, _mm_storeu_ps,
    _mm256_add_ps, _mm256_fmadd_ps, _mm256_loadu_ps, _mm256_mul_ps, _mm256_set1_ps,
    _mm256_setzero_ps, _mm256_storeu_ps,
};

use super::KernelSet;

pub(super) fn sse2_set() -> KernelSet {
    KernelSet {
        name: "sse2",
        vec_add: sse2_add,
        vec_mul: sse2_mul,
        vec_scale: sse2_scale,
        vec_dot: sse2_dot,
        gemm: sse2_gemm,
    }
}

pub(super) fn avx_set() -> KernelSet {
    KernelSet {
        name: "avx",
        vec_add: avx_add,
        vec_mul: avx_mul,
        vec_scale: avx_scale,
        vec_dot: avx_dot,
        gemm: avx_gemm,
    }
}

pub(super) fn avx2_set() -> KernelSet {
    KernelSet {
        name: "avx2",
        vec_add: avx_add,
        vec_mul: avx_mul,
        vec_scale: avx_scale,
        vec_dot: avx2_dot,
        gemm: avx2_gemm,
    }
}

// ---- SSE2 (4 lanes) ----

fn sse2_add(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after sse2 detection.
    unsafe { sse2_add_impl(a, b, out) }
}

#[target_feature(enable = "sse2")]
unsafe fn sse2_add_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        for i in (0..lanes).step_by(4) {
            let va = _mm_loadu_ps(a.as_ptr().add(i));
            let vb = _mm_loadu_ps(b.as_ptr().add(i));
            _mm_storeu_ps(out.as_mut_ptr().add(i), _mm_add_ps(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] + b[i];
    }
}

fn sse2_mul(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after sse2 detection.
    unsafe { sse2_mul_impl(a, b, out) }
}

#[target_feature(enable = "sse2")]
unsafe fn sse2_mul_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        for i in (0..lanes).step_by(4) {
            let va = _mm_loadu_ps(a.as_ptr().add(i));
            let vb = _mm_loadu_ps(b.as_ptr().add(i));
            _mm_storeu_ps(out.as_mut_ptr().add(i), _mm_mul_ps(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * b[i];
    }
}

fn sse2_scale(a: &[f32], s: f32, out: &mut [f32]) {
    // SAFETY: tier selected only after sse2 detection.
    unsafe { sse2_scale_impl(a, s, out) }
}

#[target_feature(enable = "sse2")]
unsafe fn sse2_scale_impl(a: &[f32], s: f32, out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        let vs = _mm_set1_ps(s);
        for i in (0..lanes).step_by(4) {
            let va = _mm_loadu_ps(a.as_ptr().add(i));
            _mm_storeu_ps(out.as_mut_ptr().add(i), _mm_mul_ps(va, vs));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * s;
    }
}

fn sse2_dot(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: tier selected only after sse2 detection.
    unsafe { sse2_dot_impl(a, b) }
}

#[target_feature(enable = "sse2")]
unsafe fn sse2_dot_impl(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 4 * 4;
    let mut parts = [0.0f32; 4];
    unsafe {
        let mut acc = _mm_setzero_ps();
        for i in (0..lanes).step_by(4) {
            let va = _mm_loadu_ps(a.as_ptr().add(i));
            let vb = _mm_loadu_ps(b.as_ptr().add(i));
            acc = _mm_add_ps(acc, _mm_mul_ps(va, vb));
        }
        _mm_storeu_ps(parts.as_mut_ptr(), acc);
    }
    let mut sum = parts.iter().sum::<f32>();
    for i in lanes..n {
        sum += a[i] * b[i];
    }
    sum
}

fn sse2_gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    // SAFETY: tier selected only after sse2 detection.
    unsafe { sse2_gemm_impl(a, b, c, m, k, n) }
}

#[target_feature(enable = "sse2")]
unsafe fn sse2_gemm_impl(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let lanes = n / 4 * 4;
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(0.0);
        for l in 0..k {
            let a_il = a[i * k + l];
            let b_row = &b[l * n..(l + 1) * n];
            unsafe {
                let va = _mm_set1_ps(a_il);
                for j in (0..lanes).step_by(4) {
                    let vb = _mm_loadu_ps(b_row.as_ptr().add(j));
                    let vc = _mm_loadu_ps(c_row.as_ptr().add(j));
                    _mm_storeu_ps(
                        c_row.as_mut_ptr().add(j),
                        _mm_add_ps(vc, _mm_mul_ps(va, vb)),
                    );
                }
            }
            for j in lanes..n {
                c_row[j] += a_il * b_row[j];
            }
        }
    }
}

// ---- AVX (8 lanes, no FMA) ----

fn avx_add(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after avx detection.
    unsafe { avx_add_impl(a, b, out) }
}

#[target_feature(enable = "avx")]
unsafe fn avx_add_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 8 * 8;
    unsafe {
        for i in (0..lanes).step_by(8) {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            let vb = _mm256_loadu_ps(b.as_ptr().add(i));
            _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_add_ps(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] + b[i];
    }
}

fn avx_mul(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after avx detection.
    unsafe { avx_mul_impl(a, b, out) }
}

#[target_feature(enable = "avx")]
unsafe fn avx_mul_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 8 * 8;
    unsafe {
        for i in (0..lanes).step_by(8) {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            let vb = _mm256_loadu_ps(b.as_ptr().add(i));
            _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_mul_ps(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * b[i];
    }
}

fn avx_scale(a: &[f32], s: f32, out: &mut [f32]) {
    // SAFETY: tier selected only after avx detection.
    unsafe { avx_scale_impl(a, s, out) }
}

#[target_feature(enable = "avx")]
unsafe fn avx_scale_impl(a: &[f32], s: f32, out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 8 * 8;
    unsafe {
        let vs = _mm256_set1_ps(s);
        for i in (0..lanes).step_by(8) {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_mul_ps(va, vs));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * s;
    }
}

fn avx_dot(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: tier selected only after avx detection.
    unsafe { avx_dot_impl(a, b) }
}

#[target_feature(enable = "avx")]
unsafe fn avx_dot_impl(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut parts = [0.0f32; 8];
    unsafe {
        let mut acc = _mm256_setzero_ps();
        for i in (0..lanes).step_by(8) {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            let vb = _mm256_loadu_ps(b.as_ptr().add(i));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
        }
        _mm256_storeu_ps(parts.as_mut_ptr(), acc);
    }
    let mut sum = parts.iter().sum::<f32>();
    for i in lanes..n {
        sum += a[i] * b[i];
    }
    sum
}

fn avx_gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    // SAFETY: tier selected only after avx detection.
    unsafe { avx_gemm_impl(a, b, c, m, k, n) }
}

#[target_feature(enable = "avx")]
unsafe fn avx_gemm_impl(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let lanes = n / 8 * 8;
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(0.0);
        for l in 0..k {
            let a_il = a[i * k + l];
            let b_row = &b[l * n..(l + 1) * n];
            unsafe {
                let va = _mm256_set1_ps(a_il);
                for j in (0..lanes).step_by(8) {
                    let vb = _mm256_loadu_ps(b_row.as_ptr().add(j));
                    let vc = _mm256_loadu_ps(c_row.as_ptr().add(j));
                    _mm256_storeu_ps(
                        c_row.as_mut_ptr().add(j),
                        _mm256_add_ps(vc, _mm256_mul_ps(va, vb)),
                    );
                }
            }
            for j in lanes..n {
                c_row[j] += a_il * b_row[j];
            }
        }
    }
}

// ---- AVX2 + FMA ----

fn avx2_dot(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: tier selected only after avx2+fma detection.
    unsafe { avx2_dot_impl(a, b) }
}

#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_dot_impl(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut parts = [0.0f32; 8];
    unsafe {
        let mut acc: __m256 = _mm256_setzero_ps();
        for i in (0..lanes).step_by(8) {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            let vb = _mm256_loadu_ps(b.as_ptr().add(i));
            acc = _mm256_fmadd_ps(va, vb, acc);
        }
        _mm256_storeu_ps(parts.as_mut_ptr(), acc);
    }
    let mut sum = parts.iter().sum::<f32>();
    for i in lanes..n {
        sum += a[i] * b[i];
    }
    sum
}

fn avx2_gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    // SAFETY: tier selected only after avx2+fma detection.
    unsafe { avx2_gemm_impl(a, b, c, m, k, n) }
}

#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_gemm_impl(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let lanes = n / 8 * 8;
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(0.0);
        for l in 0..k {
            let a_il = a[i * k + l];
            let b_row = &b[l * n..(l + 1) * n];
            unsafe {
                let va = _mm256_set1_ps(a_il);
                for j in (0..lanes).step_by(8) {
                    let vb = _mm256_loadu_ps(b_row.as_ptr().add(j));
                    let vc = _mm256_loadu_ps(c_row.as_ptr().add(j));
                    _mm256_storeu_ps(c_row.as_mut_ptr().add(j), _mm256_fmadd_ps(va, vb, vc));
                }
            }
            for j in lanes..n {
                c_row[j] += a_il * b_row[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::scalar;
    use super::*;

    // These exercise the tier impls directly (when the CPU supports them),
    // independent of which tier the dispatcher picked.

    #[test]
    fn sse2_matches_scalar() {
        if !is_x86_feature_detected!("sse2") {
            return;
        }
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.3 - 5.0).collect();
        let b: Vec<f32> = (0..37).map(|i| 2.0 - i as f32 * 0.17).collect();
        let mut got = vec![0.0; 37];
        let mut want = vec![0.0; 37];
        sse2_add(&a, &b, &mut got);
        scalar::vec_add(&a, &b, &mut want);
        assert_eq!(got, want);
        assert!((sse2_dot(&a, &b) - scalar::vec_dot(&a, &b)).abs() < 1e-3);
    }

    #[test]
    fn avx2_gemm_matches_scalar() {
        if !(is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")) {
            return;
        }
        let (m, k, n) = (4, 6, 11);
        let a: Vec<f32> = (0..m * k).map(|i| (i as f32 * 0.7).sin()).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i as f32 * 0.3).cos()).collect();
        let mut got = vec![0.0; m * n];
        let mut want = vec![0.0; m * n];
        avx2_gemm(&a, &b, &mut got, m, k, n);
        scalar::gemm(&a, &b, &mut want, m, k, n);
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-4);
        }
    }
}
