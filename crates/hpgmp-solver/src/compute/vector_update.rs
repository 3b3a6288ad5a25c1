use super::CallReport;
use hpgmp_kernels::{KernelBackend, Scalar};
use std::time::Instant;

/// `w = α·x + β·y` over the first `n` entries.
pub fn waxpby<X: Scalar, Y: Scalar, W: Scalar>(
    n: usize,
    alpha: W,
    x: &[X],
    beta: W,
    y: &[Y],
    w: &mut [W],
    backend: KernelBackend,
) -> CallReport {
    let start = Instant::now();
    hpgmp_kernels::waxpby(alpha, &x[..n], beta, &y[..n], &mut w[..n], backend);
    report(start, backend)
}

/// `w = α·w + β·y` over the first `n` entries (WAXPBY with `w` aliasing `x`).
pub fn axpby<W: Scalar, Y: Scalar>(
    n: usize,
    alpha: W,
    w: &mut [W],
    beta: W,
    y: &[Y],
    backend: KernelBackend,
) -> CallReport {
    let start = Instant::now();
    hpgmp_kernels::axpby_in_place(alpha, &mut w[..n], beta, &y[..n], backend);
    report(start, backend)
}

/// `v *= s` over the first `n` entries, computed in the precision of `s`.
pub fn scale_in_place<T: Scalar, S: Scalar>(
    n: usize,
    v: &mut [T],
    s: S,
    backend: KernelBackend,
) -> CallReport {
    let start = Instant::now();
    hpgmp_kernels::scale(&mut v[..n], s, backend);
    report(start, backend)
}

fn report(start: Instant, backend: KernelBackend) -> CallReport {
    CallReport {
        optimized: backend.is_optimized(),
        compute: start.elapsed().as_secs_f64(),
        ..CallReport::default()
    }
}
