//! Data model for the HPGMP benchmark.
//!
//! - [`Vector`] / [`MultiVector`]: the local part of distributed vectors and
//!   of column blocks of them (the Krylov basis), with borrowed views.
//! - [`SerialDenseMatrix`]: small replicated matrices (Hessenberg system).
//! - [`SparseMatrix`]: CSR rows of a distributed operator with its halo plan
//!   and an owned chain of coarser multigrid levels.
//! - [`Communicator`]: the process group, either [`SerialComm`] or in-process
//!   ranks on threads ([`ThreadComm`]).
//! - [`problem`]: the nonsymmetric 27-point stencil and its hierarchy.

pub mod comm;
pub mod dense;
pub mod error;
pub mod geometry;
pub mod halo;
pub mod multivector;
pub mod problem;
pub mod sparse;
pub mod vector;

pub use comm::{
    Communicator, SerialComm, ThreadComm, all_reduce_max_value, all_reduce_sum_scalars,
};
pub use dense::SerialDenseMatrix;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use halo::{HaloTiming, exchange_halo, setup_halo};
pub use multivector::{MultiVector, MultiVectorView};
pub use problem::{Problem, generate_coarse_problem, generate_problem, setup_matrix};
pub use sparse::{CoarseLevel, HaloPlan, SparseMatrix};
pub use vector::Vector;
