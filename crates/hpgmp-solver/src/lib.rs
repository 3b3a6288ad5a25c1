//! Solvers for the HPGMP benchmark.
//!
//! This crate provides:
//! - Restarted GMRES in one precision and GMRES-IR over a mixed
//!   working/solve/projection precision policy
//! - A geometric multigrid V-cycle with Gauss-Seidel smoothing
//! - Distributed compute primitives (dot, WAXPBY, GEMV, SpMV) with timing
//! - Per-phase telemetry for the benchmark report

pub mod compute;
pub mod error;
pub mod gmres;
pub mod multigrid;
pub mod precision;
pub mod preconditioner;
pub mod telemetry;

pub use compute::CallReport;
pub use error::{Error, Result};
pub use gmres::{
    GmresConfig, GmresData, GmresOutcome, MAX_PRINT_FREQ, Orthogonalization, SolveStatus, gmres,
    gmres_ir,
};
pub use multigrid::{MgWorkspace, compute_mg};
pub use precision::{
    DoubleSingle, DoubleSingleSingle, Mixed, Precision, UniformDouble, UniformSingle,
};
pub use preconditioner::{
    IdentityPreconditioner, JacobiPreconditioner, MultigridPreconditioner, Preconditioner,
    PreconditionerReport,
};
pub use telemetry::{
    CommSplit, FlopCounts, NumericCheck, OptimizationFlags, Phase, PhaseTimes, TestGmresData,
};
