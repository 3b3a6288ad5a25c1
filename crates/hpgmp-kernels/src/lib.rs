//! Dense kernels for HPGMP.
//!
//! Slice-level building blocks shared by the distributed operators: the
//! [`Scalar`] precision trait, the [`KernelBackend`] switch between reference
//! and rayon-parallel loops, level-1 vector kernels and level-2 kernels on
//! column-major blocks. Nothing here communicates; reductions across ranks are
//! layered on top by `hpgmp-solver`.

pub mod capability;
pub mod dense;
pub mod scalar;
pub mod vector;

pub use capability::{BACKEND_ENV_VAR, KernelBackend, PARALLEL_THRESHOLD};
pub use dense::{gemv, gemv_t, trsv_upper};
pub use scalar::Scalar;
pub use vector::{axpby_in_place, copy_cast, dot, scale, waxpby};
