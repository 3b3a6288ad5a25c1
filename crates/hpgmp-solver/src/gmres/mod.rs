//! Restarted GMRES and mixed-precision GMRES-IR.
//!
//! # Usage
//!
//! ```ignore
//! use hpgmp_solver::{DoubleSingle, GmresConfig, GmresData, TestGmresData, gmres, gmres_ir};
//!
//! // uniform double precision
//! let mut data = GmresData::new(&a);
//! let outcome = gmres(&a, &mut data, &b, &mut x, &GmresConfig::default(), &mut TestGmresData::new())?;
//!
//! // double working precision around a single-precision inner solve
//! let a_lo = a.to_precision::<f32>();
//! let mut data_lo = GmresData::new(&a_lo);
//! let outcome = gmres_ir::<DoubleSingle>(&a, &a_lo, &mut data, &mut data_lo, &b, &mut x, &config, &mut stats)?;
//! ```
//!
//! # Module Structure
//!
//! - [`helpers`] - Givens rotation and the Hessenberg least-squares system
//! - `arnoldi` - CGS2/MGS2 orthogonalization
//! - `restarted` - the shared restart-cycle driver behind both entry points

pub mod helpers;

mod arnoldi;
mod check;
mod restarted;

pub use arnoldi::Orthogonalization;
pub use restarted::{gmres, gmres_ir};

use crate::preconditioner::{MultigridPreconditioner, Preconditioner};
use hpgmp_core::{SparseMatrix, Vector};
use hpgmp_kernels::{KernelBackend, Scalar};
use serde::Serialize;

/// Largest allowed numeric-check / progress print frequency.
pub const MAX_PRINT_FREQ: usize = 50;

/// GMRES solver configuration.
#[derive(Debug, Clone)]
pub struct GmresConfig {
    /// Krylov subspace dimension before restart.
    pub restart: usize,
    /// Maximum number of Arnoldi steps over all cycles.
    pub max_iter: usize,
    /// Convergence tolerance on `‖r‖ / ‖r₀‖`.
    pub tolerance: f64,
    pub preconditioning: bool,
    /// Log per-iteration progress on rank 0.
    pub verbose: bool,
    /// Periodically compare the recurrence residual with the true residual.
    pub numeric_check: bool,
    /// Progress / numeric-check period inside a cycle, `1..=MAX_PRINT_FREQ`.
    pub print_freq: usize,
    pub orthogonalization: Orthogonalization,
    pub backend: KernelBackend,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            restart: 30,
            max_iter: 500,
            tolerance: 1e-8,
            preconditioning: true,
            verbose: false,
            numeric_check: false,
            print_freq: 1,
            orthogonalization: Orthogonalization::Cgs2,
            backend: KernelBackend::detect(),
        }
    }
}

impl GmresConfig {
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_preconditioning(mut self, on: bool) -> Self {
        self.preconditioning = on;
        self
    }

    pub fn with_verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    pub fn with_numeric_check(mut self, on: bool) -> Self {
        self.numeric_check = on;
        self
    }

    /// Clamped to `1..=MAX_PRINT_FREQ`.
    pub fn with_print_freq(mut self, freq: usize) -> Self {
        self.print_freq = freq.clamp(1, MAX_PRINT_FREQ);
        self
    }

    pub fn with_orthogonalization(mut self, scheme: Orthogonalization) -> Self {
        self.orthogonalization = scheme;
        self
    }

    pub fn with_backend(mut self, backend: KernelBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// `‖r‖ / ‖r₀‖ ≤ tolerance`.
    Converged,
    /// The true residual became NaN.
    Diverged,
    /// `max_iter` steps without reaching the tolerance.
    MaxIterations,
    /// A restart cycle could not take a single step: the projection-precision
    /// estimate already met the tolerance while the true residual did not.
    Stagnated,
}

impl SolveStatus {
    pub fn is_converged(self) -> bool {
        self == SolveStatus::Converged
    }

    /// Process exit status: 0 on success, 1 otherwise.
    pub fn code(self) -> i32 {
        if self.is_converged() { 0 } else { 1 }
    }
}

/// Result of a GMRES or GMRES-IR solve; the solution itself is left in `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmresOutcome<T> {
    pub status: SolveStatus,
    /// Arnoldi steps over all restart cycles.
    pub niters: usize,
    /// Final true residual norm.
    pub normr: T,
    /// Initial true residual norm.
    pub normr0: T,
}

impl<T: Scalar> GmresOutcome<T> {
    pub fn status_code(&self) -> i32 {
        self.status.code()
    }

    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// `normr / normr0`, or 0 when the initial residual was already zero.
    pub fn relative_residual(&self) -> f64 {
        if self.normr0 == T::zero() {
            0.0
        } else {
            (self.normr / self.normr0).as_f64()
        }
    }
}

/// Work vectors and preconditioner for one precision, reused across solves.
///
/// The fields hold local rows (`r`, `w`, `ap`) or local rows plus halo
/// (`z`, `p`) of the operator the data was built for.
#[derive(Debug)]
pub struct GmresData<T: Scalar> {
    pub r: Vector<T>,
    pub z: Vector<T>,
    pub p: Vector<T>,
    pub w: Vector<T>,
    pub ap: Vector<T>,
    preconditioner: Box<dyn Preconditioner<T>>,
}

impl<T: Scalar> GmresData<T> {
    /// Vectors for `a` with a multigrid preconditioner over its hierarchy.
    pub fn new(a: &SparseMatrix<T>) -> Self {
        Self::with_preconditioner(a, Box::new(MultigridPreconditioner::new(a)))
    }

    pub fn with_preconditioner(a: &SparseMatrix<T>, preconditioner: Box<dyn Preconditioner<T>>) -> Self {
        let (nrow, ncol) = (a.nrows(), a.ncols());
        Self {
            r: Vector::new(nrow),
            z: Vector::new(ncol),
            p: Vector::new(ncol),
            w: Vector::new(nrow),
            ap: Vector::new(nrow),
            preconditioner,
        }
    }

    pub fn preconditioner(&self) -> &dyn Preconditioner<T> {
        self.preconditioner.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::IdentityPreconditioner;
    use hpgmp_core::{Geometry, SerialComm, setup_matrix};

    #[test]
    fn gmres_config_default() {
        let config = GmresConfig::default();
        assert_eq!(config.max_iter, 500);
        assert!((config.tolerance - 1e-8).abs() < 1e-15);
        assert_eq!(config.restart, 30);
        assert!(config.preconditioning);
        assert_eq!(config.orthogonalization, Orthogonalization::Cgs2);
    }

    #[test]
    fn print_freq_is_clamped() {
        assert_eq!(GmresConfig::default().with_print_freq(0).print_freq, 1);
        assert_eq!(GmresConfig::default().with_print_freq(500).print_freq, MAX_PRINT_FREQ);
        assert_eq!(GmresConfig::default().with_print_freq(7).print_freq, 7);
    }

    #[test]
    fn status_codes() {
        assert_eq!(SolveStatus::Converged.code(), 0);
        assert_eq!(SolveStatus::Diverged.code(), 1);
        assert_eq!(SolveStatus::MaxIterations.code(), 1);
        assert_eq!(SolveStatus::Stagnated.code(), 1);
    }

    #[test]
    fn relative_residual_of_zero_start() {
        let outcome = GmresOutcome {
            status: SolveStatus::Converged,
            niters: 0,
            normr: 0.0f64,
            normr0: 0.0,
        };
        assert_eq!(outcome.relative_residual(), 0.0);
        assert_eq!(outcome.status_code(), 0);
    }

    #[test]
    fn data_sized_from_operator() {
        let geom = Geometry::new(1, 0, [4, 4, 4], None).unwrap();
        let p = setup_matrix::<f64>(2, &geom, SerialComm::shared()).unwrap();
        let data = GmresData::new(&p.matrix);
        assert_eq!(data.r.len(), 64);
        assert_eq!(data.z.len(), p.matrix.ncols());
        assert_eq!(data.preconditioner().name(), "multigrid");

        let data = GmresData::with_preconditioner(&p.matrix, Box::new(IdentityPreconditioner));
        assert_eq!(data.preconditioner().name(), "identity");
    }
}
