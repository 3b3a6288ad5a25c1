//! Benchmark report and its text/JSON rendering.

use anyhow::Result;
use hpgmp_solver::{Phase, PhaseTimes, SolveStatus, TestGmresData};
use serde::Serialize;
use std::fmt::Write;

use crate::benchmark::BenchmarkParams;

/// One solve as seen by rank 0.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SolveSummary {
    pub status: SolveStatus,
    pub niters: usize,
    pub normr0: f64,
    pub normr: f64,
    pub relative_residual: f64,
    /// Slowest rank, seconds.
    pub time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub params: BenchmarkParams,
    pub precision: String,
    pub preconditioner: &'static str,
    pub kernels: &'static str,
    pub process_grid: [usize; 3],
    pub global_grid: [usize; 3],
    pub global_rows: u64,
    pub global_nonzeros: u64,
    pub mg_nonzeros: u64,
    pub levels: usize,
    pub setup_time: f64,
    pub validation: SolveSummary,
    pub benchmark: Vec<SolveSummary>,
    /// `max |x - 1|` after the last timed solve.
    pub solution_error: f64,
    /// Phase times of all timed solves, maximum over ranks.
    pub times: PhaseTimes,
    pub gflops: f64,
    /// Rank 0 counters of the timed solves.
    pub telemetry: TestGmresData,
    pub passed: bool,
}

pub fn print_json(report: &BenchmarkReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn print_text(report: &BenchmarkReport) {
    print!("{}", render_text(report));
}

pub fn render_text(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, r: &BenchmarkReport) -> std::fmt::Result {
    let [gx, gy, gz] = r.global_grid;
    let [px, py, pz] = r.process_grid;

    writeln!(out, "HPGMP Benchmark")?;
    writeln!(out, "===============")?;
    writeln!(out)?;
    writeln!(out, "Problem")?;
    writeln!(out, "  global grid        {gx} x {gy} x {gz}")?;
    writeln!(out, "  process grid       {px} x {py} x {pz}")?;
    writeln!(out, "  rows               {}", r.global_rows)?;
    writeln!(out, "  nonzeros           {}", r.global_nonzeros)?;
    writeln!(out, "  multigrid levels   {} ({} nonzeros)", r.levels, r.mg_nonzeros)?;
    writeln!(out, "  setup time         {:.3} s", r.setup_time)?;
    writeln!(out)?;
    writeln!(out, "Solver")?;
    writeln!(out, "  precision          {}", r.precision)?;
    writeln!(out, "  preconditioner     {}", r.preconditioner)?;
    writeln!(out, "  orthogonalization  {}", r.params.orthogonalization.name())?;
    writeln!(out, "  kernels            {}", r.kernels)?;
    writeln!(
        out,
        "  restart / max iter {} / {}   tolerance {:e}",
        r.params.restart, r.params.max_iters, r.params.tolerance
    )?;
    writeln!(out)?;

    writeln!(out, "Validation (uniform double)")?;
    write_solve(out, "reference", &r.validation)?;
    writeln!(out)?;
    writeln!(out, "Benchmark ({} calls)", r.benchmark.len())?;
    for (i, solve) in r.benchmark.iter().enumerate() {
        write_solve(out, &format!("call {i}"), solve)?;
    }
    writeln!(out, "  max |x - 1|        {:e}", r.solution_error)?;
    writeln!(out)?;

    writeln!(out, "Time (s, slowest rank)")?;
    for phase in Phase::ALL {
        writeln!(out, "  {:<19}{:.6}", phase.label(), r.times.get(phase))?;
    }
    let comm = &r.telemetry.comm;
    writeln!(
        out,
        "  dot compute/comm   {:.6} / {:.6}",
        comm.reduce_compute, comm.reduce_communicate
    )?;
    writeln!(
        out,
        "  SpMV compute/pack/comm {:.6} / {:.6} / {:.6}",
        comm.spmv_compute, comm.spmv_pack, comm.spmv_communicate
    )?;
    writeln!(out)?;

    let flops = &r.telemetry.flops;
    writeln!(out, "Performance")?;
    writeln!(out, "  total              {:.3} Gflop ({:.3} Gflop/s)", flops.total() * 1e-9, r.gflops)?;
    writeln!(out, "  SpMV               {:.3} Gflop", flops.spmv * 1e-9)?;
    writeln!(out, "  multigrid          {:.3} Gflop", flops.mg * 1e-9)?;
    writeln!(out, "  orthogonalization  {:.3} Gflop", flops.orthogonalization * 1e-9)?;
    writeln!(
        out,
        "  SpMV / MG calls    {} / {}",
        r.telemetry.spmv_calls, r.telemetry.mg_calls
    )?;
    if !r.telemetry.numeric_checks.is_empty() {
        let worst = r
            .telemetry
            .numeric_checks
            .iter()
            .map(|c| c.ortho_error)
            .fold(0.0, f64::max);
        writeln!(
            out,
            "  numeric checks     {} ({:.3} s, worst ortho error {worst:e})",
            r.telemetry.numeric_checks.len(),
            r.telemetry.numeric_check_time
        )?;
    }
    let opt = &r.telemetry.optimization;
    if !opt.all() {
        writeln!(
            out,
            "  reference kernels  dot={} spmv={} gemv={} waxpby={} mg={}",
            !opt.dot, !opt.spmv, !opt.gemv, !opt.waxpby, !opt.mg
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Result: {}", if r.passed { "PASSED" } else { "FAILED" })
}

fn write_solve(out: &mut String, label: &str, s: &SolveSummary) -> std::fmt::Result {
    writeln!(
        out,
        "  {label:<19}{:?} after {} iterations, ||r||/||r0|| = {:e} ({:.3} s)",
        s.status, s.niters, s.relative_residual, s.time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::{BenchmarkParams, run};

    fn report() -> BenchmarkReport {
        let params = BenchmarkParams {
            nx: 4,
            ny: 4,
            nz: 4,
            mg_levels: 2,
            numeric_check: true,
            print_freq: 1,
            ..BenchmarkParams::default()
        };
        run(&params).unwrap()
    }

    #[test]
    fn text_report_has_every_section() {
        let text = render_text(&report());
        for section in ["Problem", "Solver", "Validation", "Benchmark", "Time", "Performance"] {
            assert!(text.contains(section), "missing {section}:\n{text}");
        }
        assert!(text.contains("Result: PASSED"));
        assert!(text.contains("numeric checks"));
    }

    #[test]
    fn json_report_uses_snake_case_fields() {
        let report = report();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["validation"]["status"], "converged");
        assert_eq!(value["params"]["precision"], "mixed");
        assert_eq!(value["global_rows"], 64);
        assert_eq!(report.validation.status, SolveStatus::Converged);
    }
}
