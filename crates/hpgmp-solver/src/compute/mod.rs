//! Distributed compute primitives used by the solvers.
//!
//! Each wrapper runs a kernel from `hpgmp-kernels` on the local part of its
//! operands, performs whatever communication the operation needs (halo
//! exchange, all-reduce) and returns a [`CallReport`] saying how long each part
//! took and whether the optimized kernel path was used.

mod dense;
mod dot;
mod spmv;
mod vector_update;

pub use dense::{gemv, gemv_t, trsm};
pub use dot::dot_product;
pub use spmv::spmv;
pub use vector_update::{axpby, scale_in_place, waxpby};

/// Timing and capability report of one primitive call. Times in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallReport {
    /// Whether the optimized kernel path ran.
    pub optimized: bool,
    /// Local arithmetic.
    pub compute: f64,
    /// Packing data for neighbors (halo exchange only).
    pub pack: f64,
    /// Waiting on communication: all-reduce or halo traffic.
    pub communicate: f64,
}

impl CallReport {
    pub fn total(&self) -> f64 {
        self.compute + self.pack + self.communicate
    }
}
