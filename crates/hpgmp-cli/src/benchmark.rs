//! Benchmark parameters and the per-rank run.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use hpgmp_core::{
    Communicator, Geometry, SerialComm, SparseMatrix, ThreadComm, Vector, all_reduce_max_value,
    setup_matrix,
};
use hpgmp_kernels::{KernelBackend, Scalar};
use hpgmp_solver::{
    DoubleSingle, DoubleSingleSingle, GmresConfig, GmresData, GmresOutcome, IdentityPreconditioner,
    JacobiPreconditioner, MultigridPreconditioner, Orthogonalization, Phase, PhaseTimes, Precision,
    Preconditioner, TestGmresData, UniformDouble, UniformSingle, gmres, gmres_ir,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::output::{BenchmarkReport, SolveSummary};

/// Precision combination of the timed solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PrecisionMode {
    /// GMRES in double precision.
    Double,
    /// GMRES in single precision.
    Single,
    /// GMRES-IR: double working, single solve, double projection.
    Mixed,
    /// GMRES-IR: double working, single solve and projection.
    MixedSingle,
}

impl PrecisionMode {
    pub fn label(self) -> String {
        match self {
            PrecisionMode::Double => UniformDouble::label(),
            PrecisionMode::Single => UniformSingle::label(),
            PrecisionMode::Mixed => DoubleSingle::label(),
            PrecisionMode::MixedSingle => DoubleSingleSingle::label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PreconditionerKind {
    Mg,
    Jacobi,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    Reference,
    Parallel,
}

impl From<KernelChoice> for KernelBackend {
    fn from(choice: KernelChoice) -> Self {
        match choice {
            KernelChoice::Reference => KernelBackend::Reference,
            KernelChoice::Parallel => KernelBackend::Parallel,
        }
    }
}

/// Everything a run needs. Loaded from a JSON file with `--config` and then
/// overridden by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkParams {
    /// Local subdomain extents per rank.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// `[npx, npy, npz]`; chosen automatically when absent.
    pub process_grid: Option<[usize; 3]>,
    pub ranks: usize,
    pub mg_levels: usize,
    pub restart: usize,
    pub max_iters: usize,
    pub tolerance: f64,
    pub precision: PrecisionMode,
    pub preconditioner: PreconditionerKind,
    pub symmetric_gs: bool,
    /// Kernel backend; `HPGMP_KERNELS` or the build default when absent.
    pub kernels: Option<KernelChoice>,
    /// Timed solves after the validation solve.
    pub num_calls: usize,
    pub numeric_check: bool,
    pub print_freq: usize,
    pub orthogonalization: Orthogonalization,
    pub verbose: bool,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            nx: 16,
            ny: 16,
            nz: 16,
            process_grid: None,
            ranks: 1,
            mg_levels: 4,
            restart: 30,
            max_iters: 300,
            tolerance: 1e-9,
            precision: PrecisionMode::Mixed,
            preconditioner: PreconditionerKind::Mg,
            symmetric_gs: false,
            kernels: None,
            num_calls: 1,
            numeric_check: false,
            print_freq: 1,
            orthogonalization: Orthogonalization::Cgs2,
            verbose: false,
        }
    }
}

impl BenchmarkParams {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranks == 0 {
            bail!("at least one rank is required");
        }
        if self.num_calls == 0 {
            bail!("--num-calls must be at least 1");
        }
        if self.mg_levels == 0 {
            bail!("--mg-levels must be at least 1");
        }
        if self.restart == 0 {
            bail!("--restart must be at least 1");
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            bail!("--tol must be positive, got {}", self.tolerance);
        }
        let factor = 1usize << (self.mg_levels - 1);
        for (name, n) in [("nx", self.nx), ("ny", self.ny), ("nz", self.nz)] {
            if n == 0 || n % factor != 0 {
                bail!(
                    "--{name} = {n} must be a positive multiple of {factor} for {} multigrid levels",
                    self.mg_levels
                );
            }
        }
        if let Some([px, py, pz]) = self.process_grid {
            if px * py * pz != self.ranks {
                bail!("process grid {px}x{py}x{pz} does not match {} ranks", self.ranks);
            }
        }
        Ok(())
    }

    pub fn backend(&self) -> KernelBackend {
        self.kernels.map(KernelBackend::from).unwrap_or_else(KernelBackend::detect)
    }

    pub fn gmres_config(&self) -> GmresConfig {
        GmresConfig::default()
            .with_restart(self.restart)
            .with_max_iter(self.max_iters)
            .with_tolerance(self.tolerance)
            .with_preconditioning(self.preconditioner != PreconditionerKind::None)
            .with_verbose(self.verbose)
            .with_numeric_check(self.numeric_check)
            .with_print_freq(self.print_freq)
            .with_orthogonalization(self.orthogonalization)
            .with_backend(self.backend())
    }

    fn solver_data<T: Scalar>(&self, a: &SparseMatrix<T>) -> GmresData<T> {
        let preconditioner: Box<dyn Preconditioner<T>> = match self.preconditioner {
            PreconditionerKind::Mg => {
                Box::new(MultigridPreconditioner::new(a).with_symmetric(self.symmetric_gs))
            }
            PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::new(a)),
            PreconditionerKind::None => Box::new(IdentityPreconditioner),
        };
        GmresData::with_preconditioner(a, preconditioner)
    }
}

/// Run the benchmark on `params.ranks` in-process ranks and return rank 0's
/// report.
pub fn run(params: &BenchmarkParams) -> Result<BenchmarkReport> {
    params.validate()?;
    let results = if params.ranks == 1 {
        vec![run_rank(SerialComm::shared(), params)]
    } else {
        ThreadComm::launch(params.ranks, |comm| run_rank(comm, params))
    };

    let mut report = None;
    for (rank, result) in results.into_iter().enumerate() {
        let rank_report = result.with_context(|| format!("rank {rank} failed"))?;
        if rank == 0 {
            report = rank_report;
        }
    }
    report.context("rank 0 produced no report")
}

/// The work of one rank. Only rank 0 returns a report.
fn run_rank(comm: Arc<dyn Communicator>, params: &BenchmarkParams) -> Result<Option<BenchmarkReport>> {
    let rank = comm.rank();
    let geom = Geometry::new(comm.size(), rank, [params.nx, params.ny, params.nz], params.process_grid)?;

    comm.barrier()?;
    let start = Instant::now();
    let problem = setup_matrix::<f64>(params.mg_levels, &geom, Arc::clone(&comm))?;
    let a_lo = problem.matrix.to_precision::<f32>();
    let mut data_hi = params.solver_data(&problem.matrix);
    let mut data_lo = params.solver_data(&a_lo);
    let setup_time = all_reduce_max_value(comm.as_ref(), start.elapsed().as_secs_f64())?;
    log::debug!(
        "rank {rank}: {} local rows, {} levels, setup {setup_time:.3}s",
        problem.matrix.nrows(),
        problem.matrix.levels()
    );

    let config = params.gmres_config();
    let b = &problem.b;

    // reference solve in uniform double precision
    let mut x = Vector::<f64>::new(problem.matrix.ncols());
    let mut validation_data = TestGmresData::new();
    let outcome = gmres(&problem.matrix, &mut data_hi, b, &mut x, &config, &mut validation_data)?;
    let validation_time = all_reduce_max_value(comm.as_ref(), validation_data.times.total)?;
    let validation = SolveSummary::new(&outcome, validation_time);
    if rank == 0 {
        log::info!(
            "validation solve: {:?} after {} iterations, residual {:e}",
            validation.status,
            validation.niters,
            validation.relative_residual
        );
    }

    // ranks enter the timed solves together
    comm.barrier()?;
    let mut bench_data = TestGmresData::new();
    let mut calls = Vec::with_capacity(params.num_calls);
    let solution_error = match params.precision {
        PrecisionMode::Double => {
            for _ in 0..params.num_calls {
                x.zero();
                let before = bench_data.times.total;
                let outcome = gmres(&problem.matrix, &mut data_hi, b, &mut x, &config, &mut bench_data)?;
                calls.push(SolveSummary::new(&outcome, bench_data.times.total - before));
            }
            max_error(&x, problem.matrix.nrows(), comm.as_ref())?
        }
        PrecisionMode::Single => {
            let b_lo = b.to_precision::<f32>();
            let mut x_lo = Vector::<f32>::new(a_lo.ncols());
            for _ in 0..params.num_calls {
                x_lo.zero();
                let before = bench_data.times.total;
                let outcome = gmres(&a_lo, &mut data_lo, &b_lo, &mut x_lo, &config, &mut bench_data)?;
                calls.push(SolveSummary::new(&outcome, bench_data.times.total - before));
            }
            max_error(&x_lo, a_lo.nrows(), comm.as_ref())?
        }
        PrecisionMode::Mixed | PrecisionMode::MixedSingle => {
            let refine = if params.precision == PrecisionMode::Mixed {
                gmres_ir::<DoubleSingle>
            } else {
                gmres_ir::<DoubleSingleSingle>
            };
            for _ in 0..params.num_calls {
                x.zero();
                let before = bench_data.times.total;
                let outcome = refine(
                    &problem.matrix,
                    &a_lo,
                    &mut data_hi,
                    &mut data_lo,
                    b,
                    &mut x,
                    &config,
                    &mut bench_data,
                )?;
                calls.push(SolveSummary::new(&outcome, bench_data.times.total - before));
            }
            max_error(&x, problem.matrix.nrows(), comm.as_ref())?
        }
    };

    // the slowest rank sets every reported time
    let mut call_times: Vec<f64> = calls.iter().map(|s| s.time).collect();
    comm.all_reduce_max(&mut call_times)?;
    let times = max_over_ranks(comm.as_ref(), &bench_data.times)?;

    if rank != 0 {
        return Ok(None);
    }
    let benchmark: Vec<SolveSummary> = calls
        .into_iter()
        .zip(call_times)
        .map(|(summary, time)| SolveSummary { time, ..summary })
        .collect();
    let passed = validation.status.is_converged() && benchmark.iter().all(|s| s.status.is_converged());
    let gflops = if times.total > 0.0 {
        bench_data.flops.total() / times.total * 1e-9
    } else {
        0.0
    };

    Ok(Some(BenchmarkReport {
        precision: params.precision.label(),
        preconditioner: data_lo.preconditioner().name(),
        kernels: config.backend.name(),
        process_grid: [geom.npx, geom.npy, geom.npz],
        global_grid: [geom.gnx, geom.gny, geom.gnz],
        global_rows: problem.matrix.total_rows(),
        global_nonzeros: problem.matrix.total_nonzeros(),
        mg_nonzeros: problem.matrix.total_mg_nonzeros(),
        levels: problem.matrix.levels(),
        setup_time,
        validation,
        benchmark,
        solution_error,
        times,
        gflops,
        telemetry: bench_data,
        passed,
        params: params.clone(),
    }))
}

/// `max |x[i] - 1|` over all ranks; the exact solution is all ones.
fn max_error<T: Scalar>(x: &Vector<T>, nrow: usize, comm: &dyn Communicator) -> Result<f64> {
    let local = x.as_slice()[..nrow]
        .iter()
        .map(|v| (v.as_f64() - 1.0).abs())
        .fold(0.0, |acc: f64, e| if e.is_nan() { f64::NAN } else { acc.max(e) });
    Ok(all_reduce_max_value(comm, local)?)
}

fn max_over_ranks(comm: &dyn Communicator, times: &PhaseTimes) -> Result<PhaseTimes> {
    let mut buf = Phase::ALL.map(|phase| times.get(phase));
    comm.all_reduce_max(&mut buf)?;
    let mut out = PhaseTimes::default();
    for (phase, t) in Phase::ALL.into_iter().zip(buf) {
        out.add(phase, t);
    }
    Ok(out)
}

impl SolveSummary {
    fn new<T: Scalar>(outcome: &GmresOutcome<T>, time: f64) -> Self {
        Self {
            status: outcome.status,
            niters: outcome.niters,
            normr0: outcome.normr0.as_f64(),
            normr: outcome.normr.as_f64(),
            relative_residual: outcome.relative_residual(),
            time,
        }
    }
}
