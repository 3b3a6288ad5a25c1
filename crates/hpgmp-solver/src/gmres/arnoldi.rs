//! Orthogonalization of a new Krylov vector against the current basis.
//!
//! Both schemes run in the solve precision with projections accumulated in
//! the projection precision, and write the coefficients into column `k - 1`
//! of the Hessenberg matrix.

use crate::compute::{CallReport, axpby, dot_product, gemv, gemv_t, scale_in_place};
use crate::error::Result;
use crate::telemetry::{Phase, TestGmresData};
use hpgmp_core::{Communicator, MultiVector, SerialDenseMatrix};
use hpgmp_kernels::{KernelBackend, Scalar};
use serde::{Deserialize, Serialize};

/// Gram-Schmidt variant used by the Arnoldi process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orthogonalization {
    /// Classical Gram-Schmidt with one full re-orthogonalization pass.
    /// Each pass is one GEMVᵗ (a single all-reduce) and one GEMV.
    #[default]
    Cgs2,
    /// Modified Gram-Schmidt, two passes per basis vector. One all-reduce
    /// per projection.
    Mgs2,
}

impl Orthogonalization {
    pub fn name(self) -> &'static str {
        match self {
            Orthogonalization::Cgs2 => "cgs2",
            Orthogonalization::Mgs2 => "mgs2",
        }
    }
}

/// Orthogonalize `Q[:,k]` against `Q[:,0..k]` and record the coefficients in
/// `H[0..k, k-1]`. `hv` is scratch of at least `k` entries.
pub(crate) fn orthogonalize<S: Scalar, P: Scalar>(
    scheme: Orthogonalization,
    comm: &dyn Communicator,
    q: &mut MultiVector<S>,
    k: usize,
    hv: &mut [P],
    h: &mut SerialDenseMatrix<P>,
    backend: KernelBackend,
    data: &mut TestGmresData,
) -> Result<()> {
    let nrow = q.local_length();
    let (prev, qk) = q.split_at_column(k);

    match scheme {
        Orthogonalization::Cgs2 => {
            for pass in 0..2 {
                let report = gemv_t(comm, nrow, k, P::one(), prev, &*qk, P::zero(), hv, backend)?;
                record_reduction(data, &report);
                data.optimization.gemv &= report.optimized;

                let report = gemv(nrow, k, -S::one(), prev, &hv[..k], S::one(), qk, backend)?;
                data.times.add(Phase::Waxpby, report.total());
                data.optimization.gemv &= report.optimized;

                for (i, &v) in hv[..k].iter().enumerate() {
                    if pass == 0 {
                        h.set(i, k - 1, v);
                    } else {
                        h.add(i, k - 1, v);
                    }
                }
            }
            data.flops.orthogonalization += 8.0 * k as f64 * global_rows(comm, nrow);
        }
        Orthogonalization::Mgs2 => {
            for j in 0..k {
                let qj = prev.column(j);
                let mut alpha = P::zero();
                for _ in 0..2 {
                    let (beta, report): (P, _) = dot_product(comm, nrow, &*qk, qj, backend)?;
                    record_reduction(data, &report);
                    data.optimization.dot &= report.optimized;

                    let report = axpby(nrow, S::one(), qk, -beta.cast::<S>(), qj, backend);
                    data.times.add(Phase::Waxpby, report.total());
                    data.optimization.waxpby &= report.optimized;
                    alpha += beta;
                }
                h.set(j, k - 1, alpha);
            }
            data.flops.orthogonalization += 4.0 * k as f64 * global_rows(comm, nrow);
        }
    }
    Ok(())
}

/// `β = ‖Q[:,k]‖`, `Q[:,k] /= β`, `H[k, k-1] = β`. Returns `β`.
pub(crate) fn normalize<S: Scalar, P: Scalar>(
    comm: &dyn Communicator,
    q: &mut MultiVector<S>,
    k: usize,
    h: &mut SerialDenseMatrix<P>,
    backend: KernelBackend,
    data: &mut TestGmresData,
) -> Result<P> {
    let nrow = q.local_length();
    let qk = q.column_mut(k);
    let (sq, report): (P, _) = dot_product(comm, nrow, &*qk, &*qk, backend)?;
    record_reduction(data, &report);
    data.optimization.dot &= report.optimized;
    let beta = sq.sqrt();

    let report = scale_in_place(nrow, qk, P::one() / beta, backend);
    data.times.add(Phase::Waxpby, report.total());
    data.optimization.waxpby &= report.optimized;

    h.set(k, k - 1, beta);
    data.flops.orthogonalization += 3.0 * global_rows(comm, nrow);
    Ok(beta)
}

/// `max |QᵗQ - I|` over the first `ncols` columns. `hv` is scratch of at
/// least `ncols` entries.
pub(crate) fn orthogonality_error<S: Scalar, P: Scalar>(
    comm: &dyn Communicator,
    q: &MultiVector<S>,
    ncols: usize,
    hv: &mut [P],
    backend: KernelBackend,
) -> Result<f64> {
    let nrow = q.local_length();
    let basis = q.leading(ncols);
    let mut worst = 0.0f64;
    for j in 0..ncols {
        gemv_t(comm, nrow, ncols, P::one(), basis, q.column(j), P::zero(), hv, backend)?;
        for (i, &v) in hv[..ncols].iter().enumerate() {
            let target = if i == j { P::one() } else { P::zero() };
            let err = (v - target).abs().as_f64();
            if err.is_nan() {
                return Ok(f64::NAN);
            }
            worst = worst.max(err);
        }
    }
    Ok(worst)
}

fn record_reduction(data: &mut TestGmresData, report: &CallReport) {
    data.times.add(Phase::Dot, report.total());
    data.times.add(Phase::AllReduce, report.communicate);
    data.comm.record_reduction(report);
}

/// Global row count, for flop accounting.
fn global_rows(comm: &dyn Communicator, nrow: usize) -> f64 {
    (nrow * comm.size()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpgmp_core::SerialComm;

    fn skewed_basis() -> MultiVector<f64> {
        // e0, e1 and a vector mostly along them
        let mut q = MultiVector::new(4, 3);
        q.column_mut(0)[0] = 1.0;
        q.column_mut(1)[1] = 1.0;
        q.column_mut(2).copy_from_slice(&[3.0, -2.0, 0.5, 0.0]);
        q
    }

    fn run(scheme: Orthogonalization) -> (MultiVector<f64>, SerialDenseMatrix<f64>, TestGmresData) {
        let mut q = skewed_basis();
        let mut h = SerialDenseMatrix::new(3, 2);
        let mut hv = [0.0; 3];
        let mut data = TestGmresData::new();
        let backend = KernelBackend::Reference;
        orthogonalize(scheme, &SerialComm, &mut q, 2, &mut hv, &mut h, backend, &mut data).unwrap();
        normalize(&SerialComm, &mut q, 2, &mut h, backend, &mut data).unwrap();
        (q, h, data)
    }

    #[test]
    fn cgs2_projects_and_normalizes() {
        let (q, h, data) = run(Orthogonalization::Cgs2);
        assert_eq!(h.get(0, 1), 3.0);
        assert_eq!(h.get(1, 1), -2.0);
        assert_eq!(h.get(2, 1), 0.5);
        assert_eq!(q.column(2), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(data.flops.orthogonalization, 8.0 * 2.0 * 4.0 + 3.0 * 4.0);
        assert!(!data.optimization.gemv);
    }

    #[test]
    fn mgs2_matches_cgs2() {
        let (q_c, h_c, _) = run(Orthogonalization::Cgs2);
        let (q_m, h_m, _) = run(Orthogonalization::Mgs2);
        assert_eq!(h_c, h_m);
        assert_eq!(q_c.column(2), q_m.column(2));
    }

    #[test]
    fn nearly_parallel_vector_is_orthogonalized() {
        let mut q = MultiVector::<f32>::new(3, 2);
        q.column_mut(0).copy_from_slice(&[0.6, 0.8, 0.0]);
        q.column_mut(1).copy_from_slice(&[0.6001, 0.8, 1e-4]);
        let mut h = SerialDenseMatrix::<f64>::new(2, 1);
        let mut hv = [0.0f64; 2];
        let mut data = TestGmresData::new();
        orthogonalize(
            Orthogonalization::Cgs2,
            &SerialComm,
            &mut q,
            1,
            &mut hv,
            &mut h,
            KernelBackend::Reference,
            &mut data,
        )
        .unwrap();
        let err = orthogonality_error(&SerialComm, &q, 1, &mut hv, KernelBackend::Reference).unwrap();
        assert!(err < 1e-6);
        let direct: f64 = 0.6 * 0.6001 + 0.8 * 0.8;
        assert!((h.get(0, 0) - direct).abs() < 1e-5);
        let (dot, _): (f64, _) =
            dot_product(&SerialComm, 3, q.column(0), q.column(1), KernelBackend::Reference).unwrap();
        assert!(dot.abs() < 1e-6);
    }

    #[test]
    fn orthonormal_basis_has_zero_error() {
        let (q, _, _) = run(Orthogonalization::Cgs2);
        let mut hv = [0.0; 3];
        let err = orthogonality_error(&SerialComm, &q, 3, &mut hv, KernelBackend::Reference).unwrap();
        assert_eq!(err, 0.0);
    }
}
