//! Benchmarks for the dense kernels, reference vs. parallel.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hpgmp_kernels::{KernelBackend, dot, gemv, gemv_t, waxpby};

const BACKENDS: [KernelBackend; 2] = [KernelBackend::Reference, KernelBackend::Parallel];

fn bench_dot(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot");

    for size in [1_000, 100_000, 1_000_000] {
        let x: Vec<f64> = (0..size).map(|i| (i as f64).sin()).collect();
        let y: Vec<f64> = (0..size).map(|i| (i as f64).cos()).collect();
        for backend in BACKENDS {
            group.bench_with_input(BenchmarkId::new(backend.name(), size), &size, |bencher, _| {
                bencher.iter(|| dot::<f64, f64>(black_box(&x), black_box(&y), backend))
            });
        }
    }

    group.finish();
}

fn bench_waxpby(c: &mut Criterion) {
    let mut group = c.benchmark_group("waxpby");

    for size in [1_000, 100_000, 1_000_000] {
        let x = vec![1.0f64; size];
        let y = vec![2.0f32; size];
        let mut w = vec![0.0f64; size];
        for backend in BACKENDS {
            group.bench_with_input(BenchmarkId::new(backend.name(), size), &size, |bencher, _| {
                bencher.iter(|| waxpby(1.0, black_box(&x), -1.0, black_box(&y), &mut w, backend))
            });
        }
    }

    group.finish();
}

fn bench_cgs_pass(c: &mut Criterion) {
    // One classical Gram-Schmidt pass against a 30-column basis
    let mut group = c.benchmark_group("cgs_pass");
    let n = 30;

    for m in [10_000, 200_000] {
        let q: Vec<f32> = (0..m * n).map(|i| ((i % 101) as f32) * 1e-3).collect();
        let mut w = vec![1.0f32; m];
        let mut h = vec![0.0f64; n];
        for backend in BACKENDS {
            group.bench_with_input(BenchmarkId::new(backend.name(), m), &m, |bencher, _| {
                bencher.iter(|| {
                    gemv_t(m, n, 1.0, black_box(&q), &w, 0.0, &mut h, backend);
                    gemv(m, n, -1.0f32, black_box(&q), &h, 1.0, &mut w, backend);
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_dot, bench_waxpby, bench_cgs_pass);
criterion_main!(benches);
