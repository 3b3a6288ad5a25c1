//! hpgmp: mixed-precision GMRES benchmark driver.
//!
//! Builds the nonsymmetric 27-point problem on every rank, runs a uniform
//! double validation solve followed by the timed solves in the selected
//! precision, and prints the report from rank 0.

mod benchmark;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use hpgmp_solver::{MAX_PRINT_FREQ, Orthogonalization};

use benchmark::{BenchmarkParams, KernelChoice, PrecisionMode, PreconditionerKind};

#[derive(Parser, Debug)]
#[command(name = "hpgmp")]
#[command(about = "Mixed-precision GMRES benchmark with a multigrid preconditioner")]
#[command(version)]
struct Cli {
    /// JSON file with benchmark parameters; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Local grid extent in x per rank
    #[arg(long)]
    nx: Option<usize>,

    /// Local grid extent in y per rank
    #[arg(long)]
    ny: Option<usize>,

    /// Local grid extent in z per rank
    #[arg(long)]
    nz: Option<usize>,

    /// Process grid extent in x (requires --npy and --npz)
    #[arg(long, requires_all = ["npy", "npz"])]
    npx: Option<usize>,

    #[arg(long, requires_all = ["npx", "npz"])]
    npy: Option<usize>,

    #[arg(long, requires_all = ["npx", "npy"])]
    npz: Option<usize>,

    /// Number of in-process ranks
    #[arg(long)]
    ranks: Option<usize>,

    /// Multigrid levels including the fine grid
    #[arg(long)]
    mg_levels: Option<usize>,

    /// Krylov subspace dimension before restart
    #[arg(long)]
    restart: Option<usize>,

    /// Maximum iterations per solve
    #[arg(long)]
    max_iters: Option<usize>,

    /// Relative residual tolerance
    #[arg(long)]
    tol: Option<f64>,

    /// Precision of the timed solves
    #[arg(long, value_enum)]
    precision: Option<PrecisionMode>,

    #[arg(long, value_enum)]
    preconditioner: Option<PreconditionerKind>,

    /// Shorthand for --preconditioner none
    #[arg(long, conflicts_with = "preconditioner")]
    no_precond: bool,

    /// Symmetric Gauss-Seidel sweeps in the multigrid smoother
    #[arg(long)]
    symmetric_gs: bool,

    /// Kernel implementation (default: HPGMP_KERNELS, else parallel)
    #[arg(long, value_enum)]
    kernels: Option<KernelChoice>,

    /// Gram-Schmidt variant: cgs2 or mgs2
    #[arg(long, value_parser = parse_orthogonalization)]
    ortho: Option<Orthogonalization>,

    /// Number of timed solves
    #[arg(long)]
    num_calls: Option<usize>,

    /// Compare the recurrence residual with the true residual while solving
    #[arg(long)]
    numeric_check: bool,

    /// Progress and numeric-check period (clamped to 1..=50)
    #[arg(long)]
    print_freq: Option<usize>,

    /// Log solver progress on rank 0
    #[arg(short, long)]
    verbose: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn params(&self) -> Result<BenchmarkParams> {
        let mut p = match &self.config {
            Some(path) => BenchmarkParams::from_file(path)?,
            None => BenchmarkParams::default(),
        };
        set(&mut p.nx, self.nx);
        set(&mut p.ny, self.ny);
        set(&mut p.nz, self.nz);
        if let (Some(x), Some(y), Some(z)) = (self.npx, self.npy, self.npz) {
            p.process_grid = Some([x, y, z]);
        }
        set(&mut p.ranks, self.ranks);
        set(&mut p.mg_levels, self.mg_levels);
        set(&mut p.restart, self.restart);
        set(&mut p.max_iters, self.max_iters);
        set(&mut p.tolerance, self.tol);
        set(&mut p.precision, self.precision);
        set(&mut p.preconditioner, self.preconditioner);
        if self.no_precond {
            p.preconditioner = PreconditionerKind::None;
        }
        p.symmetric_gs |= self.symmetric_gs;
        if self.kernels.is_some() {
            p.kernels = self.kernels;
        }
        set(&mut p.orthogonalization, self.ortho);
        set(&mut p.num_calls, self.num_calls);
        p.numeric_check |= self.numeric_check;
        set(&mut p.print_freq, self.print_freq);
        p.print_freq = p.print_freq.clamp(1, MAX_PRINT_FREQ);
        p.verbose |= self.verbose;
        Ok(p)
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn parse_orthogonalization(s: &str) -> std::result::Result<Orthogonalization, String> {
    match s.to_lowercase().as_str() {
        "cgs2" => Ok(Orthogonalization::Cgs2),
        "mgs2" => Ok(Orthogonalization::Mgs2),
        other => Err(format!("unknown orthogonalization '{other}' (expected cgs2 or mgs2)")),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let params = match cli.params() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(params.verbose);
    log::info!("running with {params:?}");

    let report = match benchmark::run(&params) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        if let Err(e) = output::print_json(&report) {
            eprintln!("Error serializing report: {e}");
            return ExitCode::FAILURE;
        }
    } else {
        output::print_text(&report);
    }

    if report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "hpgmp",
            "--nx",
            "8",
            "--precision",
            "mixed-single",
            "--no-precond",
            "--ortho",
            "mgs2",
            "--print-freq",
            "500",
        ]);
        let p = cli.params().unwrap();
        assert_eq!(p.nx, 8);
        assert_eq!(p.ny, 16);
        assert_eq!(p.precision, PrecisionMode::MixedSingle);
        assert_eq!(p.preconditioner, PreconditionerKind::None);
        assert_eq!(p.orthogonalization, Orthogonalization::Mgs2);
        assert_eq!(p.print_freq, MAX_PRINT_FREQ);
    }

    #[test]
    fn process_grid_needs_all_three() {
        assert!(Cli::try_parse_from(["hpgmp", "--npx", "2"]).is_err());
        let cli = Cli::try_parse_from(["hpgmp", "--npx", "2", "--npy", "1", "--npz", "1", "--ranks", "2"]).unwrap();
        assert_eq!(cli.params().unwrap().process_grid, Some([2, 1, 1]));
    }

    #[test]
    fn unknown_orthogonalization_is_rejected() {
        assert!(Cli::try_parse_from(["hpgmp", "--ortho", "householder"]).is_err());
    }
}
