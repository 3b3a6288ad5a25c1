//! Geometric multigrid V-cycle.
//!
//! The hierarchy comes from the owned chain of [`CoarseLevel`]s hanging off the
//! fine matrix. One V-cycle with zero initial guess:
//!
//! ```text
//! x = 0
//! pre-smooth   x ← GS(A, r, x)            (presmoother_steps times)
//! Axf          = A·x
//! restrict     rc[i] = r[f2c[i]] - Axf[f2c[i]]
//! recurse      xc = V(Ac, rc)
//! prolong      x[f2c[i]] += xc[i]
//! post-smooth  x ← GS(A, r, x)            (postsmoother_steps times)
//! ```
//!
//! On the coarsest level a single smoother sweep stands in for the solve.

use crate::compute::spmv;
use crate::error::{Error, Result};
use crate::preconditioner::PreconditionerReport;
use hpgmp_core::{CoarseLevel, SparseMatrix, Vector, exchange_halo};
use hpgmp_kernels::{KernelBackend, Scalar};
use std::time::Instant;

/// Per-level scratch vectors for the V-cycle, allocated once per hierarchy.
#[derive(Debug, Clone)]
pub struct MgWorkspace<T> {
    levels: Vec<LevelBuffers<T>>,
}

#[derive(Debug, Clone)]
struct LevelBuffers<T> {
    /// Coarse residual, coarse `nrows`.
    rc: Vector<T>,
    /// Coarse correction, coarse `ncols`.
    xc: Vector<T>,
    /// Fine `A·x`, fine `nrows`.
    axf: Vector<T>,
}

impl<T: Scalar> MgWorkspace<T> {
    /// Buffers for every coarse level below `a`.
    pub fn new<M: Scalar>(a: &SparseMatrix<M>) -> Self {
        let mut levels = Vec::new();
        let mut fine = a;
        while let Some(coarse) = fine.coarse() {
            levels.push(LevelBuffers {
                rc: Vector::new(coarse.matrix.nrows()),
                xc: Vector::new(coarse.matrix.ncols()),
                axf: Vector::new(fine.nrows()),
            });
            fine = &coarse.matrix;
        }
        Self { levels }
    }

    /// Number of coarse levels the workspace covers.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// One forward Gauss-Seidel sweep for `A·x = r`, updating `x` in place.
///
/// `x` must span the local columns; its halo is refreshed first.
pub fn gs_forward<M: Scalar, T: Scalar>(a: &SparseMatrix<M>, r: &[T], x: &mut [T]) -> Result<()> {
    check_operands(a, r, x)?;
    exchange_halo(a, x)?;
    for i in 0..a.nrows() {
        relax_row(a, r, x, i);
    }
    Ok(())
}

/// Forward sweep followed by a backward sweep, sharing one halo exchange.
pub fn gs_symmetric<M: Scalar, T: Scalar>(
    a: &SparseMatrix<M>,
    r: &[T],
    x: &mut [T],
) -> Result<()> {
    check_operands(a, r, x)?;
    exchange_halo(a, x)?;
    for i in 0..a.nrows() {
        relax_row(a, r, x, i);
    }
    for i in (0..a.nrows()).rev() {
        relax_row(a, r, x, i);
    }
    Ok(())
}

#[inline]
fn relax_row<M: Scalar, T: Scalar>(a: &SparseMatrix<M>, r: &[T], x: &mut [T], i: usize) {
    let (cols, vals) = a.row(i);
    let diag = a.diagonal_value(i).cast::<T>();
    let mut sum = r[i];
    for (&c, &v) in cols.iter().zip(vals) {
        sum -= v.cast::<T>() * x[c];
    }
    // the loop above also removed the diagonal term
    sum += diag * x[i];
    x[i] = sum / diag;
}

fn check_operands<M: Scalar, T: Scalar>(a: &SparseMatrix<M>, r: &[T], x: &[T]) -> Result<()> {
    if r.len() < a.nrows() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: r.len(),
        });
    }
    if x.len() < a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.ncols(),
            actual: x.len(),
        });
    }
    Ok(())
}

/// `rc[i] = rf[f2c[i]] - axf[f2c[i]]`.
pub fn restriction<T: Scalar>(f2c: &[usize], rf: &[T], axf: &[T], rc: &mut [T]) {
    for (rci, &f) in rc.iter_mut().zip(f2c) {
        *rci = rf[f] - axf[f];
    }
}

/// `xf[f2c[i]] += xc[i]`.
pub fn prolongation<T: Scalar>(f2c: &[usize], xc: &[T], xf: &mut [T]) {
    for (&xci, &f) in xc.iter().zip(f2c) {
        xf[f] += xci;
    }
}

/// Apply one V-cycle: `x ≈ A⁻¹·r` starting from `x = 0`.
///
/// `symmetric` selects symmetric Gauss-Seidel sweeps instead of forward-only.
pub fn compute_mg<M: Scalar, T: Scalar>(
    a: &SparseMatrix<M>,
    r: &[T],
    x: &mut [T],
    symmetric: bool,
    workspace: &mut MgWorkspace<T>,
    backend: KernelBackend,
) -> Result<PreconditionerReport> {
    if workspace.levels.len() + 1 < a.levels() {
        return Err(Error::InvalidParameter(format!(
            "multigrid workspace covers {} levels, hierarchy has {}",
            workspace.levels.len() + 1,
            a.levels()
        )));
    }
    let mut report = PreconditionerReport {
        optimized: backend.is_optimized(),
        ..PreconditionerReport::default()
    };
    v_cycle(a, r, x, symmetric, &mut workspace.levels, backend, &mut report)?;
    Ok(report)
}

fn smooth<M: Scalar, T: Scalar>(
    a: &SparseMatrix<M>,
    r: &[T],
    x: &mut [T],
    symmetric: bool,
    report: &mut PreconditionerReport,
) -> Result<()> {
    let start = Instant::now();
    if symmetric {
        gs_symmetric(a, r, x)?;
    } else {
        gs_forward(a, r, x)?;
    }
    report.smoother += start.elapsed().as_secs_f64();
    Ok(())
}

fn v_cycle<M: Scalar, T: Scalar>(
    a: &SparseMatrix<M>,
    r: &[T],
    x: &mut [T],
    symmetric: bool,
    levels: &mut [LevelBuffers<T>],
    backend: KernelBackend,
    report: &mut PreconditionerReport,
) -> Result<()> {
    x.iter_mut().for_each(|v| *v = T::zero());

    let (Some(CoarseLevel {
        matrix: ac,
        f2c,
        presmoother_steps,
        postsmoother_steps,
    }), Some((buffers, rest))) = (a.coarse(), levels.split_first_mut())
    else {
        return smooth(a, r, x, symmetric, report);
    };

    for _ in 0..*presmoother_steps {
        smooth(a, r, x, symmetric, report)?;
    }

    let start = Instant::now();
    let call = spmv(a, x, buffers.axf.as_mut_slice(), backend)?;
    report.spmv += start.elapsed().as_secs_f64();
    report.optimized &= call.optimized;

    let start = Instant::now();
    restriction(f2c, r, buffers.axf.as_slice(), buffers.rc.as_mut_slice());
    report.restriction += start.elapsed().as_secs_f64();

    v_cycle(
        ac,
        buffers.rc.as_slice(),
        buffers.xc.as_mut_slice(),
        symmetric,
        rest,
        backend,
        report,
    )?;

    let start = Instant::now();
    prolongation(f2c, buffers.xc.as_slice(), x);
    report.prolongation += start.elapsed().as_secs_f64();

    for _ in 0..*postsmoother_steps {
        smooth(a, r, x, symmetric, report)?;
    }
    Ok(())
}
