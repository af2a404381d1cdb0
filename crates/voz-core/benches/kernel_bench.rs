//! Benchmarks for the dispatched kernels against their scalar equivalents.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use voz_core::{fast_exp, fast_sin, gemm, vec_add, vec_dot};

fn bench_vector_ops(c: &mut Criterion) {
    let a: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.001).sin()).collect();
    let b: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.002).cos()).collect();
    let mut out = vec![0.0f32; 4096];

    c.bench_function("vec_add_4096", |bench| {
        bench.iter(|| vec_add(black_box(&a), black_box(&b), black_box(&mut out)));
    });

    c.bench_function("vec_dot_4096", |bench| {
        bench.iter(|| vec_dot(black_box(&a), black_box(&b)));
    });
}

fn bench_gemm(c: &mut Criterion) {
    let (m, k, n) = (64, 64, 64);
    let a: Vec<f32> = (0..m * k).map(|i| (i as f32 * 0.01).sin()).collect();
    let b: Vec<f32> = (0..k * n).map(|i| (i as f32 * 0.01).cos()).collect();
    let mut out = vec![0.0f32; m * n];

    c.bench_function("gemm_64x64x64", |bench| {
        bench.iter(|| gemm(black_box(&a), black_box(&b), black_box(&mut out), m, k, n));
    });
}

fn bench_fast_math(c: &mut Criterion) {
    let xs: Vec<f32> = (0..1024).map(|i| i as f32 * 0.01 - 5.0).collect();

    c.bench_function("fast_exp_1024", |bench| {
        bench.iter(|| {
            let mut acc = 0.0f32;
            for &x in &xs {
                acc += fast_exp(black_box(x));
            }
            acc
        });
    });

    c.bench_function("fast_sin_1024", |bench| {
        bench.iter(|| {
            let mut acc = 0.0f32;
            for &x in &xs {
                acc += fast_sin(black_box(x));
            }
            acc
        });
    });
}

criterion_group!(benches, bench_vector_ops, bench_gemm, bench_fast_math);
criterion_main!(benches);
