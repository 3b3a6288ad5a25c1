//! Givens rotations and the projected Hessenberg least-squares system.

use crate::compute::trsm;
use crate::error::{Error, Result};
use hpgmp_core::SerialDenseMatrix;
use hpgmp_kernels::Scalar;

/// Rotation `(c, s, r)` such that
///
/// ```text
/// [  c  s ] [ f ]   [ r ]
/// [ -s  c ] [ g ] = [ 0 ]
/// ```
///
/// computed as `D = 1/√(f²·(f²+g²))`, `c = f²·D`, `s = f·g·D`,
/// `r = f·(f²+g²)·D`. `c ≥ 0` and `|r| = √(f²+g²)` with the sign of `f`.
/// For `f = 0` the rotation is the swap `c = 0, s = 1, r = g`.
pub fn givens_rotation<P: Scalar>(f: P, g: P) -> (P, P, P) {
    if f == P::zero() {
        return (P::zero(), P::one(), g);
    }
    let f2 = f * f;
    let fg2 = f2 + g * g;
    let d1 = P::one() / (f2 * fg2).sqrt();
    (f2 * d1, f * d1 * g, f * (fg2 * d1))
}

/// Hessenberg matrix `H`, right-hand side `t` and the rotations that reduce
/// `H` to upper-triangular form, all in the projection precision.
#[derive(Debug, Clone)]
pub struct HessenbergSystem<P> {
    /// `(restart + 1) × restart`.
    h: SerialDenseMatrix<P>,
    /// `restart + 1` entries.
    t: SerialDenseMatrix<P>,
    cs: Vec<P>,
    ss: Vec<P>,
}

impl<P: Scalar> HessenbergSystem<P> {
    pub fn new(restart: usize) -> Self {
        Self {
            h: SerialDenseMatrix::new(restart + 1, restart),
            t: SerialDenseMatrix::column_vector(restart + 1),
            cs: vec![P::zero(); restart],
            ss: vec![P::zero(); restart],
        }
    }

    pub fn restart(&self) -> usize {
        self.h.cols()
    }

    /// Clear the system for a new cycle with `t = (normr, 0, …)`.
    pub fn reset(&mut self, normr: P) {
        self.h.zero();
        self.t.zero();
        self.cs.iter_mut().for_each(|v| *v = P::zero());
        self.ss.iter_mut().for_each(|v| *v = P::zero());
        self.t.set(0, 0, normr);
    }

    pub fn h(&self) -> &SerialDenseMatrix<P> {
        &self.h
    }

    pub fn h_mut(&mut self) -> &mut SerialDenseMatrix<P> {
        &mut self.h
    }

    pub fn rhs(&self) -> &[P] {
        self.t.as_slice()
    }

    /// Reduce column `k - 1` after `H[0..=k, k-1]` has been filled in:
    /// apply the previous `k - 1` rotations, zero `H[k, k-1]` with a new one
    /// and rotate `t`. Returns the residual estimate `|t[k]|`.
    pub fn triangularize(&mut self, k: usize) -> P {
        debug_assert!(k >= 1 && k <= self.restart());
        let col = k - 1;
        for j in 0..col {
            let (c, s) = (self.cs[j], self.ss[j]);
            let h1 = self.h.get(j, col);
            let h2 = self.h.get(j + 1, col);
            self.h.set(j + 1, col, -s * h1 + c * h2);
            self.h.set(j, col, c * h1 + s * h2);
        }

        let (c, s, r) = givens_rotation(self.h.get(col, col), self.h.get(k, col));
        self.h.set(col, col, r);
        self.h.set(k, col, P::zero());
        self.cs[col] = c;
        self.ss[col] = s;

        let v1 = self.t.get(col, 0);
        let v2 = -v1 * s;
        self.t.set(k, 0, v2);
        self.t.set(col, 0, v1 * c);
        v2.abs()
    }

    /// Back-substitute the leading `n × n` triangle in place of `t` and
    /// return the coefficients `y = t[..n]`.
    pub fn solve(&mut self, n: usize) -> Result<&[P]> {
        trsm(n, P::one(), &self.h, &mut self.t)?;
        Ok(&self.t.as_slice()[..n])
    }

    /// Same as [`solve`](Self::solve) into a scratch copy, leaving `t` intact.
    pub fn solve_into(&self, n: usize, y: &mut SerialDenseMatrix<P>) -> Result<()> {
        let len = self.t.rows();
        if y.rows() < len {
            return Err(Error::DimensionMismatch {
                expected: len,
                actual: y.rows(),
            });
        }
        y.as_mut_slice()[..len].copy_from_slice(self.t.as_slice());
        trsm(n, P::one(), &self.h, y)
    }
}
