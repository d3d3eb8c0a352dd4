//! lbm-gpu CLI - Run, verify and inspect the D2Q9 flow-past-a-cylinder solver.
//!
//! # Commands
//!
//! - `lbm-gpu run` - Advance the flow on a chosen backend
//! - `lbm-gpu dispatch` - Show the block/grid plan for a lattice
//! - `lbm-gpu verify` - Compare a backend with the scalar reference
//! - `lbm-gpu fixtures generate|check` - Record or replay kernel fixtures
//! - `lbm-gpu params` - Print resolved and derived parameters
//!
//! # Examples
//!
//! ```bash
//! # Default 420 x 180 run on all CPU cores, snapshot every 100 iterations
//! lbm-gpu run --backend cpu --every 100 --output out/
//!
//! # Launch plan for the benchmark lattice
//! lbm-gpu dispatch --nx 1048 --ny 11264
//!
//! # Check the CUDA kernels against the reference
//! lbm-gpu verify --backend cuda --nx 128 --ny 64 -n 10
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use lbm_gpu::verify::DEFAULT_TOLERANCE;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod snapshot;

use commands::params::ParamsFormat;
use commands::{dispatch, fixtures, params, run, verify, BackendKind, ParamsArgs};

/// lbm-gpu - Lattice-Boltzmann flow past a cylinder
#[derive(Parser)]
#[command(name = "lbm-gpu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Advance the flow for the configured number of iterations
    Run {
        #[command(flatten)]
        params: ParamsArgs,

        /// Kernel backend
        #[arg(short, long, value_enum, default_value = "cpu")]
        backend: BackendKind,

        /// CUDA device ordinal
        #[arg(long, default_value = "0")]
        device: usize,

        /// Snapshot interval in iterations (0 disables snapshots)
        #[arg(short, long, default_value = "0")]
        every: usize,

        /// Directory for velocity snapshots
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the launch plan for a lattice
    Dispatch {
        /// Lattice rows
        #[arg(long, default_value = "1048")]
        nx: usize,

        /// Lattice columns
        #[arg(long, default_value = "11264")]
        ny: usize,

        /// Streaming multiprocessors on the target device
        #[arg(long, default_value = "22")]
        sm_count: u32,

        /// Columns per thread for 1D launches
        #[arg(long, default_value = "216")]
        column_threshold: u32,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare a backend with the scalar reference kernels
    Verify {
        #[command(flatten)]
        params: ParamsArgs,

        /// Backend under test
        #[arg(short, long, value_enum, default_value = "cpu")]
        backend: BackendKind,

        /// CUDA device ordinal
        #[arg(long, default_value = "0")]
        device: usize,

        /// Largest accepted Euclidean distance
        #[arg(short, long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record or replay per-kernel fixtures
    Fixtures {
        #[command(subcommand)]
        action: FixtureAction,
    },

    /// Print resolved parameters and derived quantities
    Params {
        #[command(flatten)]
        params: ParamsArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ParamsFormat,
    },
}

#[derive(Subcommand)]
enum FixtureAction {
    /// Record reference kernel inputs and outputs
    Generate {
        /// Fixture directory
        dir: PathBuf,

        #[command(flatten)]
        params: ParamsArgs,
    },

    /// Replay recorded fixtures against a backend
    Check {
        /// Fixture directory
        dir: PathBuf,

        /// Backend under test
        #[arg(short, long, value_enum, default_value = "cpu")]
        backend: BackendKind,

        /// CUDA device ordinal
        #[arg(long, default_value = "0")]
        device: usize,

        /// Largest accepted Euclidean distance
        #[arg(short, long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run {
            params,
            backend,
            device,
            every,
            output,
        } => run::execute(&params, backend, device, every, output.as_deref(), cli.quiet),

        Commands::Dispatch {
            nx,
            ny,
            sm_count,
            column_threshold,
            json,
        } => dispatch::execute(nx, ny, sm_count, column_threshold, json),

        Commands::Verify {
            params,
            backend,
            device,
            tolerance,
            json,
        } => verify::execute(&params, backend, device, tolerance, json),

        Commands::Fixtures { action } => match action {
            FixtureAction::Generate { dir, params } => fixtures::generate(&dir, &params),
            FixtureAction::Check {
                dir,
                backend,
                device,
                tolerance,
            } => fixtures::check(&dir, backend, device, tolerance),
        },

        Commands::Params { params, format } => params::execute(&params, format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "lbm-gpu", "run", "--backend", "reference", "--nx", "64", "--ny", "36", "-n", "5",
            "--every", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                params,
                backend,
                every,
                ..
            } => {
                assert_eq!(backend, BackendKind::Reference);
                assert_eq!(every, 2);
                assert_eq!(params.nx, Some(64));
                assert_eq!(params.iterations, Some(5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_nx_requires_ny() {
        assert!(Cli::try_parse_from(["lbm-gpu", "params", "--nx", "64"]).is_err());
    }

    #[test]
    fn test_fixture_check_defaults() {
        let cli = Cli::try_parse_from(["lbm-gpu", "fixtures", "check", "fx"]).unwrap();
        match cli.command {
            Commands::Fixtures {
                action: FixtureAction::Check {
                    backend, tolerance, ..
                },
            } => {
                assert_eq!(backend, BackendKind::Cpu);
                assert_eq!(tolerance, DEFAULT_TOLERANCE);
            }
            _ => panic!("expected fixtures check"),
        }
    }
}
