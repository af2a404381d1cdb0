//! aarch64 NEON kernel variants.
//!
//! NEON is baseline on aarch64, but the tier still goes through runtime
//! detection so the dispatch path stays uniform across architectures.

#![allow(unsafe_code)]

use std::arch::aarch64::{
    vaddq_f32, vaddvq_f32, vdupq_n_f32, vfmaq_f32, vld1q_f32, vmulq_f32, vst1q_f32,
};

use super::KernelSet;

pub(super) fn neon_set() -> KernelSet {
    KernelSet {
        name: "neon",
        vec_add: neon_add,
        vec_mul: neon_mul,
        vec_scale: neon_scale,
        vec_dot: neon_dot,
        gemm: neon_gemm,
    }
}

fn neon_add(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after neon detection.
    unsafe { neon_add_impl(a, b, out) }
}

#[target_feature(enable = "neon")]
unsafe fn neon_add_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        for i in (0..lanes).step_by(4) {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vaddq_f32(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] + b[i];
    }
}

fn neon_mul(a: &[f32], b: &[f32], out: &mut [f32]) {
    // SAFETY: tier selected only after neon detection.
    unsafe { neon_mul_impl(a, b, out) }
}

#[target_feature(enable = "neon")]
unsafe fn neon_mul_impl(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        for i in (0..lanes).step_by(4) {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vmulq_f32(va, vb));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * b[i];
    }
}

fn neon_scale(a: &[f32], s: f32, out: &mut [f32]) {
    // SAFETY: tier selected only after neon detection.
    unsafe { neon_scale_impl(a, s, out) }
}

#[target_feature(enable = "neon")]
unsafe fn neon_scale_impl(a: &[f32], s: f32, out: &mut [f32]) {
    let n = out.len();
    let lanes = n / 4 * 4;
    unsafe {
        let vs = vdupq_n_f32(s);
        for i in (0..lanes).step_by(4) {
            let va = vld1q_f32(a.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vmulq_f32(va, vs));
        }
    }
    for i in lanes..n {
        out[i] = a[i] * s;
    }
}

fn neon_dot(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: tier selected only after neon detection.
    unsafe { neon_dot_impl(a, b) }
}

#[target_feature(enable = "neon")]
unsafe fn neon_dot_impl(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 4 * 4;
    let mut sum;
    unsafe {
        let mut acc = vdupq_n_f32(0.0);
        for i in (0..lanes).step_by(4) {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            acc = vfmaq_f32(acc, va, vb);
        }
        sum = vaddvq_f32(acc);
    }
    for i in lanes..n {
        sum += a[i] * b[i];
    }
    sum
}

fn neon_gemm(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    // SAFETY: tier selected only after neon detection.
    unsafe { neon_gemm_impl(a, b, c, m, k, n) }
}

#[target_feature(enable = "neon")]
unsafe fn neon_gemm_impl(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let lanes = n / 4 * 4;
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(0.0);
        for l in 0..k {
            let a_il = a[i * k + l];
            let b_row = &b[l * n..(l + 1) * n];
            unsafe {
                let va = vdupq_n_f32(a_il);
                for j in (0..lanes).step_by(4) {
                    let vb = vld1q_f32(b_row.as_ptr().add(j));
                    let vc = vld1q_f32(c_row.as_ptr().add(j));
                    vst1q_f32(c_row.as_mut_ptr().add(j), vfmaq_f32(vc, va, vb));
                }
            }
            for j in lanes..n {
                c_row[j] += a_il * b_row[j];
            }
        }
    }
}
