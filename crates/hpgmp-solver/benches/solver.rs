//! Benchmarks for the multigrid V-cycle and full GMRES solves.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hpgmp_core::{Geometry, Problem, SerialComm, setup_matrix};
use hpgmp_kernels::KernelBackend;
use hpgmp_solver::{
    DoubleSingle, GmresConfig, GmresData, MgWorkspace, TestGmresData, compute_mg, gmres, gmres_ir,
};

fn stencil(n: usize) -> Problem<f64> {
    let geom = Geometry::new(1, 0, [n, n, n], None).unwrap();
    setup_matrix(4, &geom, SerialComm::shared()).unwrap()
}

fn config() -> GmresConfig {
    GmresConfig::default()
        .with_restart(30)
        .with_max_iter(60)
        .with_tolerance(1e-9)
        .with_backend(KernelBackend::detect())
}

fn bench_v_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("v_cycle");

    for n in [16, 32] {
        let p = stencil(n);
        let mut workspace = MgWorkspace::<f64>::new(&p.matrix);
        let mut z = vec![0.0; p.matrix.ncols()];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                compute_mg(
                    &p.matrix,
                    black_box(p.b.as_slice()),
                    &mut z,
                    false,
                    &mut workspace,
                    KernelBackend::detect(),
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_gmres(c: &mut Criterion) {
    let mut group = c.benchmark_group("gmres");
    group.sample_size(10);

    for n in [16, 32] {
        let mut p = stencil(n);
        let mut data = GmresData::new(&p.matrix);
        group.bench_with_input(BenchmarkId::new("double", n), &n, |bencher, _| {
            bencher.iter(|| {
                p.x.zero();
                gmres(&p.matrix, &mut data, &p.b, &mut p.x, &config(), &mut TestGmresData::new()).unwrap()
            });
        });

        let a_lo = p.matrix.to_precision::<f32>();
        let mut data_lo = GmresData::new(&a_lo);
        group.bench_with_input(BenchmarkId::new("double_single", n), &n, |bencher, _| {
            bencher.iter(|| {
                p.x.zero();
                gmres_ir::<DoubleSingle>(
                    &p.matrix,
                    &a_lo,
                    &mut data,
                    &mut data_lo,
                    &p.b,
                    &mut p.x,
                    &config(),
                    &mut TestGmresData::new(),
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_v_cycle, bench_gmres);
criterion_main!(benches);
