//! `lbm-gpu verify` command - Compare a backend with the scalar reference.

use colored::Colorize;
use lbm_gpu::prelude::*;
use lbm_gpu::verify::exceeds;

use crate::error::{CliError, CliResult};

use super::{BackendKind, ParamsArgs};

/// Execute the `verify` command.
pub fn execute(
    params: &ParamsArgs,
    backend: BackendKind,
    device: usize,
    tolerance: f64,
    json: bool,
) -> CliResult<()> {
    let params = params.resolve()?;
    let iterations = params.max_iter;

    let report = match backend {
        BackendKind::Reference => {
            verify_backend(&ReferenceBackend::default(), &params, iterations, tolerance)?
        }
        BackendKind::Cpu => {
            let cpu = CpuBackend::for_params(&params)?;
            verify_backend(&cpu, &params, iterations, tolerance)?
        }
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => {
            let cuda = CudaBackend::for_params(device, &params)?;
            verify_backend(&cuda, &params, iterations, tolerance)?
        }
        #[cfg(not(feature = "cuda"))]
        BackendKind::Cuda => {
            let _ = device;
            return Err(CliError::FeatureNotAvailable(
                "CUDA backend".to_string(),
                "cuda".to_string(),
            ));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, params.nx, params.ny);
    }

    if report.passed() {
        Ok(())
    } else {
        Err(CliError::Validation(format!(
            "{} comparison(s) exceed {:e}",
            report.failures().len(),
            report.tolerance
        )))
    }
}

fn status(norm: f64, tolerance: f64) -> colored::ColoredString {
    if exceeds(norm, tolerance) {
        "✗".bright_red()
    } else {
        "✓".bright_green()
    }
}

fn print_report(report: &VerificationReport, nx: usize, ny: usize) {
    println!(
        "{} Verifying {} backend on {} x {} for {} iteration(s)",
        "→".bright_cyan(),
        report.backend.bright_yellow(),
        nx,
        ny,
        report.iterations
    );
    println!();
    println!("{}:", "Per-kernel".bright_white().underline());
    println!(
        "    {} {} {:.3e}",
        status(report.initialization, report.tolerance),
        format!("{:>12}:", "initialize").bright_white(),
        report.initialization
    );
    for (stage, worst) in report.worst_per_stage() {
        println!(
            "    {} {} {:.3e}",
            status(worst, report.tolerance),
            format!("{:>12}:", stage.name()).bright_white(),
            worst
        );
    }
    println!();
    println!("{}:", "End-to-end".bright_white().underline());
    for c in &report.end_to_end {
        println!(
            "    {} {} {:.3e}",
            status(c.norm, report.tolerance),
            format!("{:>12}:", c.field.name()).bright_white(),
            c.norm
        );
    }
    println!();
    if report.passed() {
        println!("{} All norms below {:e}", "✓".bright_green(), report.tolerance);
    }
}
