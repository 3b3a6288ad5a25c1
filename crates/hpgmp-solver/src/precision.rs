//! Precision policies for GMRES-IR.
//!
//! A policy names three scalar types:
//!
//! | role         | used for                                                   |
//! |--------------|------------------------------------------------------------|
//! | `Working`    | true residual `b - A·x`, its norm, the solution `x`        |
//! | `Solve`      | Krylov basis, SpMV and preconditioner inside a cycle       |
//! | `Projection` | Hessenberg matrix, Givens coefficients, right-hand side `t` |
//!
//! Values cross between roles only through [`Scalar::cast`].

use hpgmp_kernels::Scalar;
use std::fmt;
use std::marker::PhantomData;

/// Working / solve / projection precision triple.
pub trait Precision: Send + Sync + 'static {
    type Working: Scalar;
    type Solve: Scalar;
    type Projection: Scalar;

    /// Short label, e.g. `"double/single/double"`.
    fn label() -> String {
        format!(
            "{}/{}/{}",
            Self::Working::NAME,
            Self::Solve::NAME,
            Self::Projection::NAME
        )
    }

    /// Whether every role uses the same type.
    fn is_uniform() -> bool {
        Self::Working::NAME == Self::Solve::NAME && Self::Solve::NAME == Self::Projection::NAME
    }
}

/// A policy built from any three scalar types.
pub struct Mixed<W, S, P>(PhantomData<fn() -> (W, S, P)>);

impl<W, S, P> fmt::Debug for Mixed<W, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mixed")
    }
}

impl<W: Scalar, S: Scalar, P: Scalar> Precision for Mixed<W, S, P> {
    type Working = W;
    type Solve = S;
    type Projection = P;
}

/// Everything in double precision; GMRES-IR reduces to plain GMRES.
pub type UniformDouble = Mixed<f64, f64, f64>;

/// Everything in single precision.
pub type UniformSingle = Mixed<f32, f32, f32>;

/// Double working and projection precision around a single-precision solve.
pub type DoubleSingle = Mixed<f64, f32, f64>;

/// Double working precision, single solve and projection precision.
pub type DoubleSingleSingle = Mixed<f64, f32, f32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(UniformDouble::label(), "double/double/double");
        assert_eq!(DoubleSingle::label(), "double/single/double");
        assert_eq!(DoubleSingleSingle::label(), "double/single/single");
    }

    #[test]
    fn uniformity() {
        assert!(UniformDouble::is_uniform());
        assert!(UniformSingle::is_uniform());
        assert!(!DoubleSingle::is_uniform());
    }
}
