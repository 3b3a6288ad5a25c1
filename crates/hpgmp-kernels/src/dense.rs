//! Level-2 kernels on column-major dense blocks.
//!
//! `A` is an `m × n` column-major block with leading dimension `m` (a slice of
//! at least `m·n` entries). The three operands may each use a different
//! precision; arithmetic is carried out in the precision of the output.

use crate::capability::KernelBackend;
use crate::scalar::Scalar;
use crate::vector::dot;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Row block handed to each rayon task in [`gemv`].
#[cfg(feature = "parallel")]
const GEMV_ROW_BLOCK: usize = 1024;

/// `y = β·y + α·A·x`, with `A` of shape `m × n`, `x` of length `n` and `y` of
/// length `m`.
#[allow(clippy::too_many_arguments)]
pub fn gemv<A: Scalar, X: Scalar, Y: Scalar>(
    m: usize,
    n: usize,
    alpha: Y,
    a: &[A],
    x: &[X],
    beta: Y,
    y: &mut [Y],
    backend: KernelBackend,
) {
    assert!(a.len() >= m * n, "gemv: matrix too small");
    assert!(x.len() >= n && y.len() >= m, "gemv: vector too short");
    let y = &mut y[..m];

    #[cfg(feature = "parallel")]
    {
        if backend.parallel_for(m) {
            y.par_chunks_mut(GEMV_ROW_BLOCK)
                .enumerate()
                .for_each(|(block, yb)| {
                    gemv_rows(block * GEMV_ROW_BLOCK, m, n, alpha, a, x, beta, yb)
                });
            return;
        }
    }
    let _ = backend;
    gemv_rows(0, m, n, alpha, a, x, beta, y);
}

/// Rows `row0 .. row0 + yb.len()` of [`gemv`], swept column by column.
#[allow(clippy::too_many_arguments)]
#[inline]
fn gemv_rows<A: Scalar, X: Scalar, Y: Scalar>(
    row0: usize,
    m: usize,
    n: usize,
    alpha: Y,
    a: &[A],
    x: &[X],
    beta: Y,
    yb: &mut [Y],
) {
    if beta == Y::zero() {
        yb.iter_mut().for_each(|v| *v = Y::zero());
    } else if beta != Y::one() {
        yb.iter_mut().for_each(|v| *v *= beta);
    }
    for (j, &xj) in x.iter().take(n).enumerate() {
        let coef = alpha * xj.cast::<Y>();
        let col = &a[j * m + row0..j * m + row0 + yb.len()];
        for (yi, &aij) in yb.iter_mut().zip(col.iter()) {
            *yi += coef * aij.cast::<Y>();
        }
    }
}

/// `y = β·y + α·Aᵗ·x`, with `A` of shape `m × n`, `x` of length `m` and `y` of
/// length `n`. Each output entry is a column dot product accumulated in `Y`.
///
/// Only the local part is computed; the caller reduces `y` across processes.
#[allow(clippy::too_many_arguments)]
pub fn gemv_t<A: Scalar, X: Scalar, Y: Scalar>(
    m: usize,
    n: usize,
    alpha: Y,
    a: &[A],
    x: &[X],
    beta: Y,
    y: &mut [Y],
    backend: KernelBackend,
) {
    assert!(a.len() >= m * n, "gemv_t: matrix too small");
    assert!(x.len() >= m && y.len() >= n, "gemv_t: vector too short");

    // x is widened once so the column products share one precision
    let xs: Vec<A> = x[..m].iter().map(|&v| v.cast::<A>()).collect();
    for (j, yj) in y.iter_mut().take(n).enumerate() {
        let col = &a[j * m..(j + 1) * m];
        let d: Y = dot(col, &xs, backend);
        *yj = if beta == Y::zero() {
            alpha * d
        } else {
            beta * *yj + alpha * d
        };
    }
}

/// Solve `U·x = α·x` in place for the leading `n × n` upper-triangular block
/// of `U` (leading dimension `ldu`), by back-substitution from row `n-1` to 0.
///
/// No pivoting. A zero diagonal produces Inf/NaN in `x`, which the solver's
/// residual check then reports.
pub fn trsv_upper<U: Scalar, X: Scalar>(n: usize, alpha: X, u: &[U], ldu: usize, x: &mut [X]) {
    assert!(ldu >= n && x.len() >= n, "trsv: dimension mismatch");
    if n == 0 {
        return;
    }
    assert!(u.len() >= (n - 1) * ldu + n, "trsv: matrix too small");

    if alpha != X::one() {
        x[..n].iter_mut().for_each(|v| *v *= alpha);
    }
    for i in (0..n).rev() {
        let mut xi = x[i];
        for j in i + 1..n {
            xi -= u[i + j * ldu].cast::<X>() * x[j];
        }
        x[i] = xi / u[i + i * ldu].cast::<X>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3x2 column-major: [[1, 4], [2, 5], [3, 6]]
    const A: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    #[test]
    fn gemv_accumulates() {
        let x = [1.0, -1.0];
        let mut y = [1.0, 1.0, 1.0];
        gemv(3, 2, 2.0, &A, &x, 1.0, &mut y, KernelBackend::Reference);
        // A·x = [-3, -3, -3]
        assert_eq!(y, [-5.0, -5.0, -5.0]);
    }

    #[test]
    fn gemv_beta_zero_ignores_garbage() {
        let x = [1.0f32, 1.0];
        let mut y = [f64::NAN; 3];
        gemv(3, 2, 1.0, &A, &x, 0.0, &mut y, KernelBackend::Reference);
        assert_eq!(y, [5.0, 7.0, 9.0]);
    }

    #[test]
    fn gemv_parallel_matches_reference() {
        let m = 9000;
        let n = 5;
        let a: Vec<f64> = (0..m * n).map(|i| ((i % 97) as f64) * 0.01).collect();
        let x: Vec<f64> = (0..n).map(|j| j as f64 + 0.5).collect();
        let mut yr = vec![1.0; m];
        let mut yp = vec![1.0; m];
        gemv(m, n, -1.0, &a, &x, 1.0, &mut yr, KernelBackend::Reference);
        gemv(m, n, -1.0, &a, &x, 1.0, &mut yp, KernelBackend::Parallel);
        assert_eq!(yr, yp);
    }

    #[test]
    fn gemv_t_columns() {
        let x = [1.0, 1.0, 1.0];
        let mut y = [10.0f64, 10.0];
        gemv_t(3, 2, 1.0, &A, &x, 0.0, &mut y, KernelBackend::Reference);
        assert_eq!(y, [6.0, 15.0]);

        gemv_t(3, 2, 1.0, &A, &x, 1.0, &mut y, KernelBackend::Reference);
        assert_eq!(y, [12.0, 30.0]);
    }

    #[test]
    fn gemv_t_mixed_output() {
        let a: Vec<f32> = A.iter().map(|&v| v as f32).collect();
        let x = [1.0f32, 0.0, 0.0];
        let mut y = [0.0f64; 2];
        gemv_t(3, 2, 1.0, &a, &x, 0.0, &mut y, KernelBackend::Reference);
        assert_eq!(y, [1.0, 4.0]);
    }

    #[test]
    fn trsv_back_substitution() {
        // U = [[2, 1], [0, 4]] column-major with ldu = 3 (padded)
        let u = [2.0, 0.0, 99.0, 1.0, 4.0, 99.0];
        let mut x = [4.0, 8.0];
        trsv_upper(2, 1.0, &u, 3, &mut x);
        assert_eq!(x, [1.0, 2.0]);
    }

    #[test]
    fn trsv_alpha_scales_rhs() {
        let u = [1.0];
        let mut x = [3.0f64];
        trsv_upper(1, 2.0, &u, 1, &mut x);
        assert_eq!(x, [6.0]);
    }

    #[test]
    fn trsv_empty_is_noop() {
        let mut x: [f64; 0] = [];
        trsv_upper::<f64, f64>(0, 1.0, &[], 1, &mut x);
    }
}
