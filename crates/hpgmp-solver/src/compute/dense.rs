use super::CallReport;
use crate::error::{Error, Result};
use hpgmp_core::{Communicator, MultiVectorView, SerialDenseMatrix, all_reduce_sum_scalars};
use hpgmp_kernels::{KernelBackend, Scalar};
use std::time::Instant;

/// `y = β·y + α·A·x` for the first `n` columns of `A` and its first `m` rows.
/// Purely local: every rank updates its own rows.
#[allow(clippy::too_many_arguments)]
pub fn gemv<A: Scalar, X: Scalar, Y: Scalar>(
    m: usize,
    n: usize,
    alpha: Y,
    a: MultiVectorView<'_, A>,
    x: &[X],
    beta: Y,
    y: &mut [Y],
    backend: KernelBackend,
) -> Result<CallReport> {
    check_block(m, n, &a)?;
    let start = Instant::now();
    hpgmp_kernels::gemv(m, n, alpha, a.as_slice(), x, beta, y, backend);
    Ok(CallReport {
        optimized: backend.is_optimized(),
        compute: start.elapsed().as_secs_f64(),
        ..CallReport::default()
    })
}

/// `y = β·y + α·Aᵗ·x` over the first `n` columns; the `n` results are summed
/// across ranks so every rank ends with the global projection.
#[allow(clippy::too_many_arguments)]
pub fn gemv_t<A: Scalar, X: Scalar, Y: Scalar>(
    comm: &dyn Communicator,
    m: usize,
    n: usize,
    alpha: Y,
    a: MultiVectorView<'_, A>,
    x: &[X],
    beta: Y,
    y: &mut [Y],
    backend: KernelBackend,
) -> Result<CallReport> {
    check_block(m, n, &a)?;
    if beta != Y::zero() && comm.size() > 1 {
        // β·y would be added once per rank by the reduction
        return Err(Error::InvalidParameter(
            "distributed gemv_t requires beta = 0".to_string(),
        ));
    }

    let start = Instant::now();
    hpgmp_kernels::gemv_t(m, n, alpha, a.as_slice(), x, beta, y, backend);
    let compute = start.elapsed().as_secs_f64();

    let start = Instant::now();
    all_reduce_sum_scalars(comm, &mut y[..n])?;
    let communicate = start.elapsed().as_secs_f64();

    Ok(CallReport {
        optimized: backend.is_optimized(),
        compute,
        pack: 0.0,
        communicate,
    })
}

/// Solve `U·x = α·x` in place for the leading `n × n` upper triangle of `u`,
/// with `x` a column vector.
pub fn trsm<T: Scalar>(
    n: usize,
    alpha: T,
    u: &SerialDenseMatrix<T>,
    x: &mut SerialDenseMatrix<T>,
) -> Result<()> {
    if u.cols() < n || u.rows() < n || x.rows() < n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: u.cols().min(x.rows()),
        });
    }
    hpgmp_kernels::trsv_upper(n, alpha, u.as_slice(), u.rows(), x.as_mut_slice());
    Ok(())
}

fn check_block<A: Scalar>(m: usize, n: usize, a: &MultiVectorView<'_, A>) -> Result<()> {
    if a.num_columns() < n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: a.num_columns(),
        });
    }
    if a.local_length() != m {
        return Err(Error::DimensionMismatch {
            expected: m,
            actual: a.local_length(),
        });
    }
    Ok(())
}
