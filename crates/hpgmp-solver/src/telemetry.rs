//! Counters and timers accumulated across solver calls.
//!
//! Everything here is additive: passing the same [`TestGmresData`] to several
//! solves sums their costs. Nothing in this module influences the numerics.

use crate::compute::CallReport;
use crate::preconditioner::PreconditionerReport;
use serde::Serialize;

/// Timed solver phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Total,
    Dot,
    Waxpby,
    Orthogonalization,
    Spmv,
    AllReduce,
    Preconditioner,
    Smoother,
    MgSpmv,
    Restriction,
    Prolongation,
    VectorOps,
}

impl Phase {
    pub const ALL: [Phase; 12] = [
        Phase::Total,
        Phase::Dot,
        Phase::Waxpby,
        Phase::Orthogonalization,
        Phase::Spmv,
        Phase::AllReduce,
        Phase::Preconditioner,
        Phase::Smoother,
        Phase::MgSpmv,
        Phase::Restriction,
        Phase::Prolongation,
        Phase::VectorOps,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Total => "total",
            Phase::Dot => "dot product",
            Phase::Waxpby => "vector update",
            Phase::Orthogonalization => "orthogonalization",
            Phase::Spmv => "SpMV",
            Phase::AllReduce => "all-reduce",
            Phase::Preconditioner => "preconditioner",
            Phase::Smoother => "  GS smoother",
            Phase::MgSpmv => "  MG SpMV",
            Phase::Restriction => "  restriction",
            Phase::Prolongation => "  prolongation",
            Phase::VectorOps => "vector ops",
        }
    }
}

/// Seconds spent per [`Phase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseTimes {
    pub total: f64,
    pub dot: f64,
    pub waxpby: f64,
    pub orthogonalization: f64,
    pub spmv: f64,
    pub all_reduce: f64,
    pub preconditioner: f64,
    pub smoother: f64,
    pub mg_spmv: f64,
    pub restriction: f64,
    pub prolongation: f64,
    pub vector_ops: f64,
}

impl PhaseTimes {
    fn slot_mut(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::Total => &mut self.total,
            Phase::Dot => &mut self.dot,
            Phase::Waxpby => &mut self.waxpby,
            Phase::Orthogonalization => &mut self.orthogonalization,
            Phase::Spmv => &mut self.spmv,
            Phase::AllReduce => &mut self.all_reduce,
            Phase::Preconditioner => &mut self.preconditioner,
            Phase::Smoother => &mut self.smoother,
            Phase::MgSpmv => &mut self.mg_spmv,
            Phase::Restriction => &mut self.restriction,
            Phase::Prolongation => &mut self.prolongation,
            Phase::VectorOps => &mut self.vector_ops,
        }
    }

    pub fn add(&mut self, phase: Phase, seconds: f64) {
        *self.slot_mut(phase) += seconds;
    }

    pub fn get(&self, phase: Phase) -> f64 {
        let mut copy = *self;
        *copy.slot_mut(phase)
    }

    /// Elementwise maximum, used to combine ranks.
    pub fn max(&self, other: &PhaseTimes) -> PhaseTimes {
        let mut out = *self;
        for phase in Phase::ALL {
            let v = other.get(phase);
            let slot = out.slot_mut(phase);
            if v > *slot {
                *slot = v;
            }
        }
        out
    }
}

/// Local compute versus communication for the operations that talk to peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CommSplit {
    /// Local dot and GEMVᵗ arithmetic.
    pub reduce_compute: f64,
    /// All-reduce wait.
    pub reduce_communicate: f64,
    /// Local SpMV rows.
    pub spmv_compute: f64,
    /// Halo send-buffer packing.
    pub spmv_pack: f64,
    /// Halo traffic.
    pub spmv_communicate: f64,
}

impl CommSplit {
    pub fn record_reduction(&mut self, report: &CallReport) {
        self.reduce_compute += report.compute;
        self.reduce_communicate += report.communicate;
    }

    pub fn record_spmv(&mut self, report: &CallReport) {
        self.spmv_compute += report.compute;
        self.spmv_pack += report.pack;
        self.spmv_communicate += report.communicate;
    }
}

/// Floating-point operation counts summed over all ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FlopCounts {
    /// Vector updates, norms, scaling and the restart update.
    pub vector: f64,
    pub mg: f64,
    pub spmv: f64,
    pub orthogonalization: f64,
}

impl FlopCounts {
    pub fn total(&self) -> f64 {
        self.vector + self.mg + self.spmv + self.orthogonalization
    }

    pub fn accumulate(&mut self, other: &FlopCounts) {
        self.vector += other.vector;
        self.mg += other.mg;
        self.spmv += other.spmv;
        self.orthogonalization += other.orthogonalization;
    }
}

/// Whether each primitive ran its optimized path on every call of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizationFlags {
    pub dot: bool,
    pub spmv: bool,
    pub gemv: bool,
    pub waxpby: bool,
    pub mg: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self {
            dot: true,
            spmv: true,
            gemv: true,
            waxpby: true,
            mg: true,
        }
    }
}

impl OptimizationFlags {
    pub fn all(&self) -> bool {
        self.dot && self.spmv && self.gemv && self.waxpby && self.mg
    }
}

/// One diagnostic comparison of the recurrence residual against the true one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericCheck {
    /// Total iterations when the check ran.
    pub niters: usize,
    /// Position inside the restart cycle.
    pub k: usize,
    /// `|t[k]| / normr0` from the Givens recurrence.
    pub recurrence_ratio: f64,
    /// `‖b - A·x_tentative‖ / normr0`.
    pub true_ratio: f64,
    /// `max |QᵗQ - I|` over the current basis.
    pub ortho_error: f64,
}

/// Telemetry collected by [`gmres`](crate::gmres) and [`gmres_ir`](crate::gmres_ir).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestGmresData {
    pub times: PhaseTimes,
    pub comm: CommSplit,
    pub flops: FlopCounts,
    pub spmv_calls: u64,
    pub mg_calls: u64,
    /// SpMV calls made only by numeric checks.
    pub check_spmv_calls: u64,
    /// Preconditioner calls made only by numeric checks.
    pub check_mg_calls: u64,
    /// Time spent in numeric checks, excluded from every phase timer.
    pub numeric_check_time: f64,
    pub numeric_checks: Vec<NumericCheck>,
    pub optimization: OptimizationFlags,
}

impl TestGmresData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overall rate in Gflop/s, zero before any timed work.
    pub fn gflops(&self) -> f64 {
        if self.times.total > 0.0 {
            self.flops.total() / self.times.total * 1e-9
        } else {
            0.0
        }
    }

    /// Fold a preconditioner application into the sub-phase timers.
    pub fn record_preconditioner(&mut self, report: &PreconditionerReport) {
        self.times.smoother += report.smoother;
        self.times.mg_spmv += report.spmv;
        self.times.restriction += report.restriction;
        self.times.prolongation += report.prolongation;
        self.optimization.mg &= report.optimized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_accumulate_independently() {
        let mut t = PhaseTimes::default();
        t.add(Phase::Spmv, 1.5);
        t.add(Phase::Spmv, 0.5);
        t.add(Phase::Smoother, 3.0);
        assert_eq!(t.get(Phase::Spmv), 2.0);
        assert_eq!(t.smoother, 3.0);
        assert_eq!(t.get(Phase::Total), 0.0);
    }

    #[test]
    fn elementwise_max() {
        let mut a = PhaseTimes::default();
        let mut b = PhaseTimes::default();
        a.add(Phase::Dot, 2.0);
        b.add(Phase::Dot, 1.0);
        b.add(Phase::Total, 4.0);
        let m = a.max(&b);
        assert_eq!(m.dot, 2.0);
        assert_eq!(m.total, 4.0);
    }

    #[test]
    fn flags_start_optimistic() {
        let mut data = TestGmresData::new();
        assert!(data.optimization.all());
        data.record_preconditioner(&PreconditionerReport {
            optimized: false,
            smoother: 1.0,
            ..PreconditionerReport::default()
        });
        assert!(!data.optimization.mg);
        assert_eq!(data.times.smoother, 1.0);
    }

    #[test]
    fn rate_needs_time() {
        let mut data = TestGmresData::new();
        data.flops.spmv = 4e9;
        assert_eq!(data.gflops(), 0.0);
        data.times.total = 2.0;
        assert_eq!(data.gflops(), 2.0);
    }

    #[test]
    fn serializes_to_json_shape() {
        let data = TestGmresData::new();
        let value = serde_json::to_value(&data).unwrap();
        assert!(value["times"]["mg_spmv"].is_number());
        assert_eq!(value["optimization"]["spmv"], true);
    }
}
