//! Floating-point precisions supported by the kernels.
//!
//! Every kernel is generic over [`Scalar`], and most accept operands of
//! different precisions so that the mixed-precision solver can, for example,
//! accumulate a single-precision Krylov basis product into a double-precision
//! projection vector. Crossing precisions always goes through [`Scalar::cast`].

use num_traits::{Float, NumAssign};
use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;

/// A real floating-point type usable as a working, solve or projection precision.
pub trait Scalar:
    Float + NumAssign + Sum + Default + Debug + Display + LowerExp + Send + Sync + 'static
{
    /// Human-readable precision name ("double", "single").
    const NAME: &'static str;

    /// Convert from `f64`, rounding to nearest when narrowing.
    fn from_f64(value: f64) -> Self;

    /// Widen (or pass through) to `f64`. Exact for both supported types.
    fn as_f64(self) -> f64;

    /// Convert to another precision.
    #[inline]
    fn cast<U: Scalar>(self) -> U {
        U::from_f64(self.as_f64())
    }
}

impl Scalar for f64 {
    const NAME: &'static str = "double";

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

impl Scalar for f32 {
    const NAME: &'static str = "single";

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_between_precisions() {
        let x: f64 = 1.0 / 3.0;
        let y: f32 = x.cast();
        assert!((y as f64 - x).abs() < 1e-7);

        let back: f64 = y.cast();
        assert_eq!(back, y as f64);
    }

    #[test]
    fn names() {
        assert_eq!(<f64 as Scalar>::NAME, "double");
        assert_eq!(<f32 as Scalar>::NAME, "single");
    }
}
