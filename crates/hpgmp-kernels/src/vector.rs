//! Level-1 kernels: dot product, vector update, scaling and copies.

use crate::capability::{KernelBackend, REDUCTION_CHUNK};
use crate::scalar::Scalar;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Local dot product `Σ xᵢ·yᵢ`, accumulated in precision `R`.
///
/// A NaN anywhere in the inputs yields NaN. The parallel path sums fixed-size
/// chunks and then adds the chunk partials in order, so repeated calls return
/// bit-identical results.
pub fn dot<T: Scalar, R: Scalar>(x: &[T], y: &[T], backend: KernelBackend) -> R {
    assert_eq!(x.len(), y.len(), "dot: length mismatch");

    #[cfg(feature = "parallel")]
    {
        if backend.parallel_for(x.len()) {
            let partials: Vec<R> = x
                .par_chunks(REDUCTION_CHUNK)
                .zip(y.par_chunks(REDUCTION_CHUNK))
                .map(|(xc, yc)| dot_sequential::<T, R>(xc, yc))
                .collect();
            return partials.into_iter().fold(R::zero(), |acc, p| acc + p);
        }
    }
    let _ = backend;
    dot_sequential(x, y)
}

#[inline]
fn dot_sequential<T: Scalar, R: Scalar>(x: &[T], y: &[T]) -> R {
    x.iter()
        .zip(y.iter())
        .fold(R::zero(), |acc, (&a, &b)| acc + a.cast::<R>() * b.cast::<R>())
}

/// `w = α·x + β·y`, evaluated in the precision of `w`.
pub fn waxpby<X: Scalar, Y: Scalar, W: Scalar>(
    alpha: W,
    x: &[X],
    beta: W,
    y: &[Y],
    w: &mut [W],
    backend: KernelBackend,
) {
    let n = w.len();
    assert!(x.len() >= n && y.len() >= n, "waxpby: input shorter than output");

    let update = |(wi, (&xi, &yi)): (&mut W, (&X, &Y))| {
        *wi = alpha * xi.cast::<W>() + beta * yi.cast::<W>();
    };

    #[cfg(feature = "parallel")]
    {
        if backend.parallel_for(n) {
            w.par_iter_mut()
                .zip(x[..n].par_iter().zip(y[..n].par_iter()))
                .for_each(update);
            return;
        }
    }
    let _ = backend;
    w.iter_mut().zip(x.iter().zip(y.iter())).for_each(update);
}

/// `w = α·w + β·y`: the aliased form of [`waxpby`] where the output is also
/// the first input. `y` may be in a different precision (e.g. adding a
/// single-precision correction into a double-precision solution).
pub fn axpby_in_place<W: Scalar, Y: Scalar>(
    alpha: W,
    w: &mut [W],
    beta: W,
    y: &[Y],
    backend: KernelBackend,
) {
    let n = w.len();
    assert!(y.len() >= n, "axpby: input shorter than output");
    let one = W::one();

    let update = |(wi, &yi): (&mut W, &Y)| {
        if alpha == one {
            *wi += beta * yi.cast::<W>();
        } else {
            *wi = alpha * *wi + beta * yi.cast::<W>();
        }
    };

    #[cfg(feature = "parallel")]
    {
        if backend.parallel_for(n) {
            w.par_iter_mut().zip(y[..n].par_iter()).for_each(update);
            return;
        }
    }
    let _ = backend;
    w.iter_mut().zip(y.iter()).for_each(update);
}

/// `v *= s`, computed in the precision of `s`. A zero factor zero-fills `v`
/// so that stale NaN/Inf entries do not survive.
pub fn scale<T: Scalar, S: Scalar>(v: &mut [T], s: S, backend: KernelBackend) {
    if s == S::zero() {
        v.iter_mut().for_each(|vi| *vi = T::zero());
        return;
    }

    let update = |vi: &mut T| *vi = (s * vi.cast::<S>()).cast::<T>();

    #[cfg(feature = "parallel")]
    {
        if backend.parallel_for(v.len()) {
            v.par_iter_mut().for_each(update);
            return;
        }
    }
    let _ = backend;
    v.iter_mut().for_each(update);
}

/// Copy `src` into the leading `src.len()` entries of `dst`, converting precision.
pub fn copy_cast<S: Scalar, D: Scalar>(src: &[S], dst: &mut [D]) {
    assert!(dst.len() >= src.len(), "copy: destination too short");
    dst.iter_mut()
        .zip(src.iter())
        .for_each(|(d, &s)| *d = s.cast::<D>());
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKENDS: [KernelBackend; 2] = [KernelBackend::Reference, KernelBackend::Parallel];

    #[test]
    fn dot_small() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![4.0, 5.0, 6.0];
        for backend in BACKENDS {
            let d: f64 = dot(&x, &y, backend);
            assert_eq!(d, 32.0);
        }
    }

    #[test]
    fn dot_large_matches_between_backends() {
        let n = 10_007;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = (0..n).map(|i| (i as f64 * 0.11).cos()).collect();
        let r: f64 = dot(&x, &y, KernelBackend::Reference);
        let p: f64 = dot(&x, &y, KernelBackend::Parallel);
        assert!((r - p).abs() < 1e-9 * r.abs().max(1.0));

        // repeated parallel calls are bit-identical
        let p2: f64 = dot(&x, &y, KernelBackend::Parallel);
        assert_eq!(p.to_bits(), p2.to_bits());
    }

    #[test]
    fn dot_mixed_accumulation() {
        let x: Vec<f32> = vec![0.1; 1000];
        let d: f64 = dot(&x, &x, KernelBackend::Reference);
        let expected = 1000.0 * (0.1f32 as f64) * (0.1f32 as f64);
        assert!((d - expected).abs() < 1e-12);
    }

    #[test]
    fn dot_propagates_nan() {
        let x = vec![1.0, f64::NAN, 3.0];
        let d: f64 = dot(&x, &x, KernelBackend::Reference);
        assert!(d.is_nan());
    }

    #[test]
    fn waxpby_basic() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![10.0, 20.0, 30.0];
        let mut w = vec![0.0; 3];
        waxpby(2.0, &x, -1.0, &y, &mut w, KernelBackend::Reference);
        assert_eq!(w, vec![-8.0, -16.0, -24.0]);
    }

    #[test]
    fn axpby_in_place_mixed() {
        let mut w = vec![1.0f64; 5000];
        let y = vec![0.5f32; 5000];
        for backend in BACKENDS {
            let mut w2 = w.clone();
            axpby_in_place(1.0, &mut w2, 2.0, &y, backend);
            assert!(w2.iter().all(|&v| (v - 2.0).abs() < 1e-15));
        }
        axpby_in_place(3.0, &mut w, 0.0, &y, KernelBackend::Reference);
        assert!(w.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn scale_zero_clears_nan() {
        let mut v = vec![f64::NAN, 1.0];
        scale(&mut v, 0.0f64, KernelBackend::Reference);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn scale_cross_precision() {
        let mut v = vec![2.0f32, 4.0];
        scale(&mut v, 0.5f64, KernelBackend::Reference);
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn copy_cast_prefix() {
        let src = vec![1.5f64, 2.5];
        let mut dst = vec![9.0f32; 4];
        copy_cast(&src, &mut dst);
        assert_eq!(dst, vec![1.5, 2.5, 9.0, 9.0]);
    }
}
