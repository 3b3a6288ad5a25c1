//! The restart-cycle driver shared by [`gmres`] and [`gmres_ir`].
//!
//! Both entry points run the same loop; they differ only in which vectors and
//! operators they hand to it. Plain GMRES uses one precision for all three
//! roles and one [`GmresData`] for both the outer and the inner vectors.

use super::arnoldi::{normalize, orthogonalize};
use super::helpers::HessenbergSystem;
use super::{GmresConfig, GmresData, GmresOutcome, MAX_PRINT_FREQ, SolveStatus};
use crate::compute::{CallReport, axpby, dot_product, gemv, scale_in_place, spmv, waxpby};
use crate::error::{Error, Result};
use crate::precision::{Mixed, Precision};
use crate::preconditioner::Preconditioner;
use crate::telemetry::{FlopCounts, Phase, PhaseTimes, TestGmresData};
use hpgmp_core::{Communicator, MultiVector, SerialDenseMatrix, SparseMatrix, Vector};
use hpgmp_kernels::{Scalar, copy_cast};
use num_traits::{Float, One, Zero};
use std::time::Instant;

/// Solve `A·x = b` with restarted, right-preconditioned GMRES in a single
/// precision. `x` holds the initial guess on entry and the solution on return.
pub fn gmres<T: Scalar>(
    a: &SparseMatrix<T>,
    data: &mut GmresData<T>,
    b: &Vector<T>,
    x: &mut Vector<T>,
    config: &GmresConfig,
    test_data: &mut TestGmresData,
) -> Result<GmresOutcome<T>> {
    let GmresData {
        r,
        z,
        p,
        w,
        ap,
        preconditioner,
    } = data;
    let solve = Solve::<Mixed<T, T, T>> {
        a_hi: a,
        a_lo: a,
        outer: Outer {
            r: r.as_mut_slice(),
            p: p.as_mut_slice(),
            ap: ap.as_mut_slice(),
        },
        inner: Inner {
            r: w.as_mut_slice(),
            z: z.as_mut_slice(),
            precond: &mut **preconditioner,
        },
        b: b.as_slice(),
        config,
        data: test_data,
        comm: a.comm().as_ref(),
        nrow: a.nrows(),
    };
    solve.run("GMRES", x.as_mut_slice())
}

/// Solve `A·x = b` by GMRES iterative refinement under precision policy `P`.
///
/// The true residual and the solution update run on `a_hi` in the working
/// precision using `data_hi`; each restart cycle runs on `a_lo` in the solve
/// precision using `data_lo` and its preconditioner. Both operators must
/// describe the same matrix with the same row distribution.
#[allow(clippy::too_many_arguments)]
pub fn gmres_ir<P: Precision>(
    a_hi: &SparseMatrix<P::Working>,
    a_lo: &SparseMatrix<P::Solve>,
    data_hi: &mut GmresData<P::Working>,
    data_lo: &mut GmresData<P::Solve>,
    b: &Vector<P::Working>,
    x: &mut Vector<P::Working>,
    config: &GmresConfig,
    test_data: &mut TestGmresData,
) -> Result<GmresOutcome<P::Working>> {
    let solve = Solve::<P> {
        a_hi,
        a_lo,
        outer: Outer {
            r: data_hi.r.as_mut_slice(),
            p: data_hi.p.as_mut_slice(),
            ap: data_hi.ap.as_mut_slice(),
        },
        inner: Inner {
            r: data_lo.r.as_mut_slice(),
            z: data_lo.z.as_mut_slice(),
            precond: &mut *data_lo.preconditioner,
        },
        b: b.as_slice(),
        config,
        data: test_data,
        comm: a_hi.comm().as_ref(),
        nrow: a_hi.nrows(),
    };
    solve.run("GMRES-IR", x.as_mut_slice())
}

/// Working-precision vectors: residual, SpMV input (with halo) and output.
pub(super) struct Outer<'a, W> {
    pub(super) r: &'a mut [W],
    pub(super) p: &'a mut [W],
    pub(super) ap: &'a mut [W],
}

/// Solve-precision vectors: correction input and preconditioned output.
pub(super) struct Inner<'a, S> {
    pub(super) r: &'a mut [S],
    pub(super) z: &'a mut [S],
    pub(super) precond: &'a mut dyn Preconditioner<S>,
}

pub(super) struct Solve<'a, P: Precision> {
    pub(super) a_hi: &'a SparseMatrix<P::Working>,
    pub(super) a_lo: &'a SparseMatrix<P::Solve>,
    pub(super) outer: Outer<'a, P::Working>,
    pub(super) inner: Inner<'a, P::Solve>,
    pub(super) b: &'a [P::Working],
    pub(super) config: &'a GmresConfig,
    pub(super) data: &'a mut TestGmresData,
    pub(super) comm: &'a dyn Communicator,
    pub(super) nrow: usize,
}

impl<P: Precision> Solve<'_, P> {
    fn validate(&self, x_len: usize) -> Result<()> {
        let config = self.config;
        if config.restart == 0 {
            return Err(Error::InvalidParameter("restart length must be at least 1".into()));
        }
        if config.tolerance.is_nan() || config.tolerance <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                config.tolerance
            )));
        }
        let nrow = self.nrow;
        if self.a_lo.nrows() != nrow {
            return Err(Error::DimensionMismatch {
                expected: nrow,
                actual: self.a_lo.nrows(),
            });
        }
        require(nrow, self.b.len().min(x_len))?;
        require(nrow, self.outer.r.len().min(self.outer.ap.len()))?;
        require(self.a_hi.ncols(), self.outer.p.len())?;
        require(nrow, self.inner.r.len())?;
        require(self.a_lo.ncols(), self.inner.z.len())?;
        Ok(())
    }

    fn run(mut self, name: &'static str, x: &mut [P::Working]) -> Result<GmresOutcome<P::Working>> {
        self.validate(x.len())?;
        let nrow = self.nrow;
        let config = self.config;
        let backend = config.backend;
        let restart = config.restart;
        let max_iter = config.max_iter;
        let print_freq = config.print_freq.clamp(1, MAX_PRINT_FREQ);
        let rank0 = self.comm.rank() == 0;
        let verbose = config.verbose && rank0;
        let n_global = self.a_hi.total_rows() as f64;

        if !config.preconditioning && rank0 {
            log::warn!("{name}: running without preconditioning");
        }

        let mut q = MultiVector::<P::Solve>::new(nrow, restart + 1);
        let mut hess = HessenbergSystem::<P::Projection>::new(restart);
        let mut hv = vec![P::Projection::zero(); restart + 1];
        let mut y = SerialDenseMatrix::<P::Projection>::column_vector(restart + 1);
        let tol_proj = P::Projection::from_f64(config.tolerance);

        let flops_before = self.data.flops;
        let times_before = self.data.times;
        let start_total = Instant::now();
        let mut check_time = 0.0;
        let mut niters = 0usize;
        let mut normr0_hi = P::Working::zero();
        let mut normr_hi;
        let mut first = true;

        let status = loop {
            // r = b - A·x in working precision
            let t = Instant::now();
            copy_cast(&x[..nrow], &mut self.outer.p[..nrow]);
            self.data.times.add(Phase::VectorOps, lap(t));
            normr_hi = self.true_residual(true)?;
            if first {
                normr0_hi = normr_hi;
                first = false;
            }
            if verbose {
                log::info!(
                    "{name} residual at the start of restart cycle = {normr_hi:e} / {normr0_hi:e} = {:e} ({niters} iterations)",
                    normr_hi / normr0_hi
                );
            }
            if normr_hi.is_nan() {
                break SolveStatus::Diverged;
            }
            // an exactly zero residual is converged even when normr0 is zero
            if normr_hi == P::Working::zero() || (normr_hi / normr0_hi).as_f64() <= config.tolerance {
                if verbose {
                    log::info!("{name} converged");
                }
                break SolveStatus::Converged;
            }
            if niters >= max_iter {
                break SolveStatus::MaxIterations;
            }

            // Q[:,0] = r / ‖r‖, scaled in working precision
            let t = Instant::now();
            let report = scale_in_place(nrow, &mut *self.outer.r, P::Working::one() / normr_hi, backend);
            self.data.optimization.waxpby &= report.optimized;
            copy_cast(&self.outer.r[..nrow], q.column_mut(0));
            self.data.times.add(Phase::VectorOps, lap(t));
            self.data.flops.vector += n_global;

            let normr0 = normr0_hi.cast::<P::Projection>();
            let mut normr = normr_hi.cast::<P::Projection>();
            hess.reset(normr);

            let mut k = 1;
            while k <= restart && normr / normr0 > tol_proj && niters < max_iter {
                // z = M⁻¹·Q[:,k-1]
                apply_preconditioner(
                    config,
                    self.a_lo,
                    &mut *self.inner.precond,
                    q.column(k - 1),
                    &mut *self.inner.z,
                    Some(&mut *self.data),
                )?;

                // Q[:,k] = A·z
                let report = spmv(self.a_lo, &mut *self.inner.z, q.column_mut(k), backend)?;
                self.record_spmv(&report);

                let t = Instant::now();
                orthogonalize(
                    config.orthogonalization,
                    self.comm,
                    &mut q,
                    k,
                    &mut hv,
                    hess.h_mut(),
                    backend,
                    self.data,
                )?;
                normalize(self.comm, &mut q, k, hess.h_mut(), backend, self.data)?;
                self.data.times.add(Phase::Orthogonalization, lap(t));

                normr = hess.triangularize(k);
                niters += 1;

                if k % print_freq == 0 || k + 1 == restart {
                    let ratio = normr / normr0;
                    if config.numeric_check {
                        let t = Instant::now();
                        let check = self.numeric_check(x, &q, &hess, &mut hv, &mut y, k, niters, ratio, normr0_hi)?;
                        check_time += lap(t);
                        if verbose {
                            log::info!(
                                "{name} iteration = {k} ({niters})   scaled computed residual = {normr:e} / {normr0:e} = {ratio:e} (true residual ratio = {:e})  ortho error = {:e}",
                                check.true_ratio,
                                check.ortho_error
                            );
                        } else {
                            log::debug!("{name} numeric check at {k} ({niters}): {check:?}");
                        }
                        if rank0 && check.true_ratio > config.tolerance && check.true_ratio > 100.0 * check.recurrence_ratio {
                            log::warn!(
                                "{name}: recurrence residual {:e} has drifted from the true residual {:e}",
                                check.recurrence_ratio,
                                check.true_ratio
                            );
                        }
                        self.data.numeric_checks.push(check);
                    } else if verbose {
                        log::info!(
                            "{name} iteration = {k} ({niters})   scaled computed residual = {normr:e} / {normr0:e} = {ratio:e}"
                        );
                    }
                }
                k += 1;
            }

            if normr.is_nan() {
                // keep the last finite iterate
                break SolveStatus::Diverged;
            }
            if k == 1 {
                if rank0 {
                    log::warn!(
                        "{name}: projected residual {:e} meets the tolerance but the true residual {:e} does not",
                        (normr / normr0).as_f64(),
                        (normr_hi / normr0_hi).as_f64()
                    );
                }
                break SolveStatus::Stagnated;
            }
            if verbose {
                log::info!("{name} restart: k = {k} ({niters})");
            }
            self.update_solution(x, &q, &mut hess, k - 1)?;
        };

        check_time = check_time.min(lap(start_total));
        self.data.times.add(Phase::Total, lap(start_total) - check_time);
        self.data.numeric_check_time += check_time;

        if verbose {
            report_rates(name, &flops_before, &times_before, self.data);
        }
        if !status.is_converged() && rank0 {
            log::warn!(
                "{name} did not converge ({status:?}) after {niters} iterations, residual {normr_hi:e} / {normr0_hi:e}"
            );
        }

        Ok(GmresOutcome {
            status,
            niters,
            normr: normr_hi,
            normr0: normr0_hi,
        })
    }

    /// `r = b - A·p` with `p` already holding the iterate; returns `‖r‖`.
    /// Unrecorded calls only bump the numeric-check counters.
    pub(super) fn true_residual(&mut self, record: bool) -> Result<P::Working> {
        let nrow = self.nrow;
        let backend = self.config.backend;
        let one = P::Working::one();

        let report = spmv(self.a_hi, &mut *self.outer.p, &mut *self.outer.ap, backend)?;
        if record {
            self.record_spmv(&report);
        } else {
            self.data.check_spmv_calls += 1;
        }

        let t = Instant::now();
        let update = waxpby(nrow, one, self.b, -one, &*self.outer.ap, &mut *self.outer.r, backend);
        let (rr, dot): (P::Working, _) =
            dot_product(self.comm, nrow, &*self.outer.r, &*self.outer.r, backend)?;
        if record {
            let data = &mut *self.data;
            data.times.add(Phase::VectorOps, lap(t));
            data.times.add(Phase::Waxpby, update.total());
            data.times.add(Phase::Dot, dot.total());
            data.times.add(Phase::AllReduce, dot.communicate);
            data.comm.record_reduction(&dot);
            data.optimization.waxpby &= update.optimized;
            data.optimization.dot &= dot.optimized;
            data.flops.vector += 4.0 * self.a_hi.total_rows() as f64;
        }
        Ok(rr.sqrt())
    }

    fn record_spmv(&mut self, report: &CallReport) {
        let data = &mut *self.data;
        data.times.add(Phase::Spmv, report.total());
        data.comm.record_spmv(report);
        data.optimization.spmv &= report.optimized;
        data.spmv_calls += 1;
        data.flops.spmv += 2.0 * self.a_hi.total_nonzeros() as f64;
    }

    /// `x += M⁻¹·(Q[:,0..kk]·y)` (or `x += Q·y` unpreconditioned) with
    /// `y` the solution of the `kk × kk` triangular system.
    fn update_solution(
        &mut self,
        x: &mut [P::Working],
        q: &MultiVector<P::Solve>,
        hess: &mut HessenbergSystem<P::Projection>,
        kk: usize,
    ) -> Result<()> {
        let nrow = self.nrow;
        let config = self.config;
        let backend = config.backend;
        let n_global = self.a_hi.total_rows() as f64;
        let coeffs = hess.solve(kk)?;

        let t = Instant::now();
        if config.preconditioning {
            let one = P::Solve::one();
            let zero = P::Solve::zero();
            let report = gemv(nrow, kk, one, q.leading(kk), coeffs, zero, &mut *self.inner.r, backend)?;
            self.data.optimization.gemv &= report.optimized;
            self.data.times.add(Phase::VectorOps, lap(t));

            apply_preconditioner(
                config,
                self.a_lo,
                &mut *self.inner.precond,
                &*self.inner.r,
                &mut *self.inner.z,
                Some(&mut *self.data),
            )?;

            let t = Instant::now();
            let one = P::Working::one();
            let report = axpby(nrow, one, x, one, &*self.inner.z, backend);
            self.data.optimization.waxpby &= report.optimized;
            self.data.times.add(Phase::VectorOps, lap(t));
            self.data.flops.vector += 2.0 * n_global;
        } else {
            let one = P::Working::one();
            let report = gemv(nrow, kk, one, q.leading(kk), coeffs, one, x, backend)?;
            self.data.optimization.gemv &= report.optimized;
            self.data.times.add(Phase::VectorOps, lap(t));
        }
        self.data.flops.vector += 2.0 * n_global * kk as f64;
        Ok(())
    }
}

/// `z = M⁻¹·src`, or a plain copy when preconditioning is off. Telemetry is
/// recorded only when `data` is given.
pub(super) fn apply_preconditioner<S: Scalar>(
    config: &GmresConfig,
    a: &SparseMatrix<S>,
    precond: &mut dyn Preconditioner<S>,
    src: &[S],
    z: &mut [S],
    data: Option<&mut TestGmresData>,
) -> Result<()> {
    let t = Instant::now();
    let report = if config.preconditioning {
        Some(precond.apply(a, src, z, config.backend)?)
    } else {
        let n = a.nrows();
        copy_cast(&src[..n], &mut z[..n]);
        None
    };
    if let Some(data) = data {
        data.times.add(Phase::Preconditioner, lap(t));
        if let Some(report) = report {
            data.record_preconditioner(&report);
            data.mg_calls += 1;
            data.flops.mg += precond.flops(a);
        }
    }
    Ok(())
}

fn report_rates(name: &str, flops_before: &FlopCounts, times_before: &PhaseTimes, data: &TestGmresData) {
    let gflops = |flops: f64, secs: f64| {
        let rate = if secs > 0.0 { flops * 1e-9 / secs } else { 0.0 };
        (flops * 1e-9, secs, rate)
    };
    let dt = |phase: Phase| data.times.get(phase) - times_before.get(phase);
    let spmv = data.flops.spmv - flops_before.spmv;
    let mg = data.flops.mg - flops_before.mg;
    let orth = data.flops.orthogonalization - flops_before.orthogonalization;
    let total = data.flops.total() - flops_before.total();
    for (label, (gf, secs, rate)) in [
        ("SpMV ", gflops(spmv, dt(Phase::Spmv))),
        ("GMG  ", gflops(mg, dt(Phase::Preconditioner))),
        ("Orth ", gflops(orth, dt(Phase::Orthogonalization))),
        ("Total", gflops(total, dt(Phase::Total))),
    ] {
        log::info!("{name} > {label}: {gf:.3} / {secs:.3} = {rate:.3} Gflop/s");
    }
}

fn require(expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[inline]
fn lap(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precision::DoubleSingle;
    use crate::preconditioner::IdentityPreconditioner;
    use hpgmp_core::{Geometry, Problem, SerialComm, setup_matrix};
    use hpgmp_kernels::KernelBackend;

    fn problem(n: usize, levels: usize) -> Problem<f64> {
        let geom = Geometry::new(1, 0, [n, n, n], None).unwrap();
        setup_matrix(levels, &geom, SerialComm::shared()).unwrap()
    }

    fn config() -> GmresConfig {
        GmresConfig::default()
            .with_restart(10)
            .with_max_iter(50)
            .with_backend(KernelBackend::Reference)
    }

    #[test]
    fn converges_on_small_stencil() {
        let mut p = problem(4, 2);
        let mut data = GmresData::new(&p.matrix);
        let mut stats = TestGmresData::new();
        let out = gmres(&p.matrix, &mut data, &p.b, &mut p.x, &config(), &mut stats).unwrap();
        assert!(out.converged(), "{out:?}");
        assert!(out.relative_residual() <= 1e-8);
        assert!(out.niters > 0 && out.niters < 50);
        assert_eq!(stats.mg_calls as usize, out.niters + out.niters.div_ceil(10));
        assert!(stats.spmv_calls as usize > out.niters);
        assert!(stats.flops.total() > 0.0);
        let err = p
            .x
            .as_slice()
            .iter()
            .map(|v| (v - 1.0).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-6, "{err}");
    }

    #[test]
    fn rejects_zero_restart() {
        let mut p = problem(2, 1);
        let mut data = GmresData::new(&p.matrix);
        let cfg = config().with_restart(0);
        let r = gmres(&p.matrix, &mut data, &p.b, &mut p.x, &cfg, &mut TestGmresData::new());
        assert!(matches!(r, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn rejects_mismatched_workspace() {
        let mut p = problem(2, 1);
        let other = problem(4, 1);
        let mut data = GmresData::new(&other.matrix);
        let mut small = GmresData::new(&p.matrix);
        let r = gmres_ir::<Mixed<f64, f64, f64>>(
            &p.matrix,
            &other.matrix,
            &mut small,
            &mut data,
            &p.b,
            &mut p.x,
            &config(),
            &mut TestGmresData::new(),
        );
        assert!(matches!(r, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn unpreconditioned_update_goes_straight_into_x() {
        let mut p = problem(4, 1);
        let mut data = GmresData::with_preconditioner(&p.matrix, Box::new(IdentityPreconditioner));
        let cfg = config().with_preconditioning(false).with_max_iter(200);
        let mut stats = TestGmresData::new();
        let out = gmres(&p.matrix, &mut data, &p.b, &mut p.x, &cfg, &mut stats).unwrap();
        assert!(out.converged(), "{out:?}");
        assert_eq!(stats.mg_calls, 0);
        assert_eq!(stats.flops.mg, 0.0);
    }

    #[test]
    fn mixed_precision_reaches_double_accuracy() {
        let mut p = problem(4, 2);
        let a_lo = p.matrix.to_precision::<f32>();
        let mut data_hi = GmresData::new(&p.matrix);
        let mut data_lo = GmresData::new(&a_lo);
        let out = gmres_ir::<DoubleSingle>(
            &p.matrix,
            &a_lo,
            &mut data_hi,
            &mut data_lo,
            &p.b,
            &mut p.x,
            &config().with_max_iter(100),
            &mut TestGmresData::new(),
        )
        .unwrap();
        assert!(out.converged(), "{out:?}");
        assert!(out.relative_residual() <= 1e-8);
    }

    #[test]
    fn numeric_check_is_not_counted_as_work() {
        let mut p = problem(4, 2);
        let mut data = GmresData::new(&p.matrix);
        let mut plain = TestGmresData::new();
        let out = gmres(&p.matrix, &mut data, &p.b, &mut p.x, &config(), &mut plain).unwrap();

        let mut p2 = problem(4, 2);
        let mut checked = TestGmresData::new();
        let cfg = config().with_numeric_check(true).with_print_freq(1);
        let out2 = gmres(&p.matrix, &mut data, &p2.b, &mut p2.x, &cfg, &mut checked).unwrap();

        assert_eq!(out.niters, out2.niters);
        assert_eq!(out.normr, out2.normr);
        assert_eq!(plain.spmv_calls, checked.spmv_calls);
        assert_eq!(plain.mg_calls, checked.mg_calls);
        assert_eq!(plain.flops, checked.flops);
        assert_eq!(checked.numeric_checks.len() as u64, checked.check_spmv_calls);
        assert_eq!(checked.check_mg_calls, checked.check_spmv_calls);
        assert!(checked.numeric_checks.iter().all(|c| c.ortho_error < 1e-10));
    }
}
