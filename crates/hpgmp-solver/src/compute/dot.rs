use super::CallReport;
use crate::error::{Error, Result};
use hpgmp_core::{Communicator, all_reduce_sum_scalars};
use hpgmp_kernels::{KernelBackend, Scalar, dot};
use std::time::Instant;

/// Global dot product of the first `n` entries of `x` and `y`, accumulated in
/// precision `R` and summed across ranks. A NaN partial on any rank makes the
/// result NaN on every rank.
pub fn dot_product<T: Scalar, R: Scalar>(
    comm: &dyn Communicator,
    n: usize,
    x: &[T],
    y: &[T],
    backend: KernelBackend,
) -> Result<(R, CallReport)> {
    if x.len() < n || y.len() < n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: x.len().min(y.len()),
        });
    }

    let start = Instant::now();
    let local: R = dot(&x[..n], &y[..n], backend);
    let compute = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let mut global = [local];
    all_reduce_sum_scalars(comm, &mut global)?;
    let communicate = start.elapsed().as_secs_f64();

    Ok((
        global[0],
        CallReport {
            optimized: backend.is_optimized(),
            compute,
            pack: 0.0,
            communicate,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpgmp_core::{SerialComm, ThreadComm};

    #[test]
    fn serial_dot() {
        let x = [1.0f32, 2.0, 3.0, 100.0];
        let (d, report): (f64, _) =
            dot_product(&SerialComm, 3, &x, &x, KernelBackend::Reference).unwrap();
        assert_eq!(d, 14.0);
        assert!(!report.optimized);
    }

    #[test]
    fn short_operand_is_rejected() {
        let x = [1.0];
        let r: Result<(f64, _)> = dot_product(&SerialComm, 2, &x, &x, KernelBackend::Reference);
        assert!(r.is_err());
    }

    #[test]
    fn reduced_across_ranks() {
        let results = ThreadComm::launch(3, |comm| {
            let x = vec![1.0f64; 10];
            let (d, _): (f64, _) =
                dot_product(comm.as_ref(), 10, &x, &x, KernelBackend::Reference).unwrap();
            d
        });
        assert_eq!(results, vec![30.0; 3]);
    }

    #[test]
    fn nan_on_one_rank_reaches_all() {
        let results = ThreadComm::launch(2, |comm| {
            let x = if comm.rank() == 0 {
                vec![f64::NAN]
            } else {
                vec![1.0]
            };
            let (d, _): (f64, _) =
                dot_product(comm.as_ref(), 1, &x, &x, KernelBackend::Reference).unwrap();
            d
        });
        assert!(results.iter().all(|d| d.is_nan()));
    }
}
