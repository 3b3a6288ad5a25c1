use super::CallReport;
use crate::error::{Error, Result};
use hpgmp_core::{SparseMatrix, exchange_halo};
use hpgmp_kernels::{KernelBackend, PARALLEL_THRESHOLD, Scalar};
use rayon::prelude::*;
use std::time::Instant;

/// `y = A·x` on the local rows.
///
/// `x` must span the matrix's local columns; its halo tail is refreshed from
/// the neighbors first, which is why it is borrowed mutably. Products are
/// accumulated in the vector precision.
pub fn spmv<T: Scalar, U: Scalar>(
    a: &SparseMatrix<T>,
    x: &mut [U],
    y: &mut [U],
    backend: KernelBackend,
) -> Result<CallReport> {
    let nrows = a.nrows();
    if x.len() < a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.ncols(),
            actual: x.len(),
        });
    }
    if y.len() < nrows {
        return Err(Error::DimensionMismatch {
            expected: nrows,
            actual: y.len(),
        });
    }

    let halo = exchange_halo(a, x)?;

    let start = Instant::now();
    let x: &[U] = x;
    let row = |(i, yi): (usize, &mut U)| {
        let (cols, vals) = a.row(i);
        *yi = cols
            .iter()
            .zip(vals)
            .fold(U::zero(), |acc, (&c, &v)| acc + v.cast::<U>() * x[c]);
    };
    let optimized = backend.is_optimized();
    if optimized && nrows >= PARALLEL_THRESHOLD {
        y[..nrows].par_iter_mut().enumerate().for_each(row);
    } else {
        y[..nrows].iter_mut().enumerate().for_each(row);
    }
    let compute = start.elapsed().as_secs_f64();

    Ok(CallReport {
        optimized,
        compute,
        pack: halo.pack,
        communicate: halo.communicate,
    })
}
