//! Diagnostic comparison of the Givens recurrence against the true residual.
//!
//! The check forms the update the solver would apply if the cycle ended now,
//! applies it to a copy of `x` and measures `‖b - A·x_tentative‖`. It also
//! measures how far the current basis is from orthonormal. Its SpMV and
//! preconditioner calls only show up in the `check_*` counters; nothing it
//! does feeds back into the iteration.

use super::arnoldi::orthogonality_error;
use super::helpers::HessenbergSystem;
use super::restarted::{Solve, apply_preconditioner};
use crate::compute::{axpby, gemv};
use crate::error::Result;
use crate::precision::Precision;
use crate::telemetry::NumericCheck;
use hpgmp_core::{MultiVector, SerialDenseMatrix};
use hpgmp_kernels::{Scalar, copy_cast};
use num_traits::{One, Zero};

impl<P: Precision> Solve<'_, P> {
    /// Check after step `k` of the current cycle. `hv` and `y` are scratch of
    /// at least `k + 1` entries.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn numeric_check(
        &mut self,
        x: &[P::Working],
        q: &MultiVector<P::Solve>,
        hess: &HessenbergSystem<P::Projection>,
        hv: &mut [P::Projection],
        y: &mut SerialDenseMatrix<P::Projection>,
        k: usize,
        niters: usize,
        recurrence_ratio: P::Projection,
        normr0_hi: P::Working,
    ) -> Result<NumericCheck> {
        let nrow = self.nrow;
        let backend = self.config.backend;

        copy_cast(&x[..nrow], &mut self.outer.p[..nrow]);
        hess.solve_into(k, y)?;
        let coeffs = &y.as_slice()[..k];

        if self.config.preconditioning {
            gemv(
                nrow,
                k,
                P::Solve::one(),
                q.leading(k),
                coeffs,
                P::Solve::zero(),
                &mut *self.inner.r,
                backend,
            )?;
            apply_preconditioner(
                self.config,
                self.a_lo,
                &mut *self.inner.precond,
                &*self.inner.r,
                &mut *self.inner.z,
                None,
            )?;
            self.data.check_mg_calls += 1;
            let one = P::Working::one();
            axpby(nrow, one, &mut *self.outer.p, one, &*self.inner.z, backend);
        } else {
            let one = P::Working::one();
            gemv(nrow, k, one, q.leading(k), coeffs, one, &mut *self.outer.p, backend)?;
        }

        let true_norm = self.true_residual(false)?;
        let ortho_error = orthogonality_error(self.comm, q, k + 1, hv, backend)?;

        Ok(NumericCheck {
            niters,
            k,
            recurrence_ratio: recurrence_ratio.as_f64(),
            true_ratio: (true_norm / normr0_hi).as_f64(),
            ortho_error,
        })
    }
}
