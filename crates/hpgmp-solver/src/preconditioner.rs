//! Preconditioners for the GMRES solvers.
//!
//! A preconditioner approximates `z ≈ M⁻¹·r` for the operator it is handed on
//! each call. The solvers own one boxed preconditioner per precision inside
//! [`GmresData`](crate::GmresData), so its scratch space lives as long as the
//! solver workspace does.

use crate::error::{Error, Result};
use crate::multigrid::{MgWorkspace, compute_mg};
use hpgmp_core::SparseMatrix;
use hpgmp_kernels::{KernelBackend, Scalar, copy_cast};
use std::fmt;
use std::time::Instant;

/// Timings of one preconditioner application, in seconds.
///
/// The sub-phases are only filled in by the multigrid preconditioner; simpler
/// preconditioners report their cost through the caller's own timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreconditionerReport {
    pub optimized: bool,
    pub smoother: f64,
    pub spmv: f64,
    pub restriction: f64,
    pub prolongation: f64,
}

impl Default for PreconditionerReport {
    fn default() -> Self {
        Self {
            optimized: true,
            smoother: 0.0,
            spmv: 0.0,
            restriction: 0.0,
            prolongation: 0.0,
        }
    }
}

impl PreconditionerReport {
    pub fn total(&self) -> f64 {
        self.smoother + self.spmv + self.restriction + self.prolongation
    }
}

/// Approximate inverse of a sparse operator.
pub trait Preconditioner<T: Scalar>: Send + fmt::Debug {
    /// `z ≈ A⁻¹·r`. `z` must span the local columns of `a`; `r` its local rows.
    fn apply(
        &mut self,
        a: &SparseMatrix<T>,
        r: &[T],
        z: &mut [T],
        backend: KernelBackend,
    ) -> Result<PreconditionerReport>;

    /// Floating-point operations of one application, summed over all ranks.
    fn flops(&self, a: &SparseMatrix<T>) -> f64;

    fn name(&self) -> &'static str;
}

/// One multigrid V-cycle per application.
#[derive(Debug, Clone)]
pub struct MultigridPreconditioner<T> {
    workspace: MgWorkspace<T>,
    symmetric: bool,
}

impl<T: Scalar> MultigridPreconditioner<T> {
    /// Workspace sized for the hierarchy below `a`, forward Gauss-Seidel sweeps.
    pub fn new(a: &SparseMatrix<T>) -> Self {
        Self {
            workspace: MgWorkspace::new(a),
            symmetric: false,
        }
    }

    /// Use symmetric (forward then backward) Gauss-Seidel sweeps.
    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }
}

impl<T: Scalar> Preconditioner<T> for MultigridPreconditioner<T> {
    fn apply(
        &mut self,
        a: &SparseMatrix<T>,
        r: &[T],
        z: &mut [T],
        backend: KernelBackend,
    ) -> Result<PreconditionerReport> {
        compute_mg(a, r, z, self.symmetric, &mut self.workspace, backend)
    }

    fn flops(&self, a: &SparseMatrix<T>) -> f64 {
        // a smoother sweep costs about one SpMV
        let spmvs = a
            .coarse()
            .map_or(1, |c| 1 + c.presmoother_steps + c.postsmoother_steps);
        let sweep = if self.symmetric { 2.0 } else { 1.0 };
        2.0 * sweep * spmvs as f64 * a.total_mg_nonzeros() as f64
    }

    fn name(&self) -> &'static str {
        "multigrid"
    }
}

/// Diagonal scaling, `z[i] = r[i] / A[i,i]`.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T> {
    inv_diag: Vec<T>,
}

impl<T: Scalar> JacobiPreconditioner<T> {
    /// Inverse diagonal of `a`. Zero diagonal entries are treated as 1.
    pub fn new(a: &SparseMatrix<T>) -> Self {
        let inv_diag = (0..a.nrows())
            .map(|i| {
                let d = a.diagonal_value(i);
                if d == T::zero() { T::one() } else { T::one() / d }
            })
            .collect();
        Self { inv_diag }
    }
}

impl<T: Scalar> Preconditioner<T> for JacobiPreconditioner<T> {
    fn apply(
        &mut self,
        a: &SparseMatrix<T>,
        r: &[T],
        z: &mut [T],
        _backend: KernelBackend,
    ) -> Result<PreconditionerReport> {
        let n = self.inv_diag.len();
        if a.nrows() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: a.nrows(),
            });
        }
        check_lengths(n, r, z)?;
        let start = Instant::now();
        for ((zi, &ri), &d) in z.iter_mut().zip(&r[..n]).zip(&self.inv_diag) {
            *zi = ri * d;
        }
        Ok(PreconditionerReport {
            optimized: false,
            smoother: start.elapsed().as_secs_f64(),
            ..PreconditionerReport::default()
        })
    }

    fn flops(&self, a: &SparseMatrix<T>) -> f64 {
        a.total_rows() as f64
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}

/// No preconditioning: `z = r`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl<T: Scalar> Preconditioner<T> for IdentityPreconditioner {
    fn apply(
        &mut self,
        a: &SparseMatrix<T>,
        r: &[T],
        z: &mut [T],
        _backend: KernelBackend,
    ) -> Result<PreconditionerReport> {
        let n = a.nrows();
        check_lengths(n, r, z)?;
        copy_cast(&r[..n], &mut z[..n]);
        Ok(PreconditionerReport::default())
    }

    fn flops(&self, _a: &SparseMatrix<T>) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

fn check_lengths<T>(n: usize, r: &[T], z: &[T]) -> Result<()> {
    let shortest = r.len().min(z.len());
    if shortest < n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: shortest,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpgmp_core::{Geometry, SerialComm, setup_matrix};

    fn diagonal() -> SparseMatrix<f64> {
        SparseMatrix::from_triplets(3, &[(0, 0, 2.0), (1, 1, 4.0), (1, 0, 7.0), (2, 2, 5.0)])
            .unwrap()
    }

    #[test]
    fn jacobi_divides_by_diagonal() {
        let a = diagonal();
        let mut m = JacobiPreconditioner::new(&a);
        let mut z = [0.0; 3];
        m.apply(&a, &[2.0, 8.0, 10.0], &mut z, KernelBackend::Reference)
            .unwrap();
        // the off-diagonal entry is ignored
        assert_eq!(z, [1.0, 2.0, 2.0]);
        assert_eq!(m.flops(&a), 3.0);
    }

    #[test]
    fn jacobi_zero_diagonal_is_identity() {
        let a = SparseMatrix::from_triplets(2, &[(0, 0, 0.0f64), (1, 1, 2.0)]).unwrap();
        let mut m = JacobiPreconditioner::new(&a);
        let mut z = [0.0; 2];
        m.apply(&a, &[5.0, 4.0], &mut z, KernelBackend::Reference)
            .unwrap();
        assert_eq!(z, [5.0, 2.0]);
    }

    #[test]
    fn jacobi_rejects_other_operator() {
        let a = diagonal();
        let mut m = JacobiPreconditioner::new(&a);
        let b = SparseMatrix::from_triplets(1, &[(0, 0, 1.0f64)]).unwrap();
        let mut z = [0.0; 3];
        assert!(m.apply(&b, &[1.0; 3], &mut z, KernelBackend::Reference).is_err());
    }

    #[test]
    fn identity_copies_local_rows() {
        let a = diagonal();
        let mut z = [0.0; 4];
        let report = IdentityPreconditioner
            .apply(&a, &[1.0, 2.0, 3.0], &mut z, KernelBackend::Reference)
            .unwrap();
        assert_eq!(z, [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(report.total(), 0.0);
        assert_eq!(Preconditioner::<f64>::flops(&IdentityPreconditioner, &a), 0.0);
    }

    #[test]
    fn identity_rejects_short_output() {
        let a = diagonal();
        let mut z = [0.0; 2];
        let r = IdentityPreconditioner.apply(&a, &[1.0; 3], &mut z, KernelBackend::Reference);
        assert!(r.is_err());
    }

    #[test]
    fn multigrid_flops_follow_hierarchy() {
        let geom = Geometry::new(1, 0, [4, 4, 4], None).unwrap();
        let p = setup_matrix::<f64>(2, &geom, SerialComm::shared()).unwrap();
        let m = MultigridPreconditioner::new(&p.matrix);
        assert!(!m.is_symmetric());
        // one pre-sweep, one post-sweep and the residual SpMV per level
        let expected = 2.0 * 3.0 * p.matrix.total_mg_nonzeros() as f64;
        assert_eq!(m.flops(&p.matrix), expected);
        let symmetric = m.with_symmetric(true);
        assert_eq!(symmetric.flops(&p.matrix), 2.0 * expected);
    }

    #[test]
    fn multigrid_is_usable_as_trait_object() {
        let geom = Geometry::new(1, 0, [4, 4, 4], None).unwrap();
        let p = setup_matrix::<f64>(2, &geom, SerialComm::shared()).unwrap();
        let mut m: Box<dyn Preconditioner<f64>> = Box::new(MultigridPreconditioner::new(&p.matrix));
        let mut z = vec![0.0; p.matrix.ncols()];
        m.apply(&p.matrix, p.b.as_slice(), &mut z, KernelBackend::Reference)
            .unwrap();
        assert_eq!(m.name(), "multigrid");
        let z = &z[..p.matrix.nrows()];
        assert!(z.iter().all(|v| v.is_finite()));
        assert!(z.iter().any(|v| *v != 0.0));
    }
}
