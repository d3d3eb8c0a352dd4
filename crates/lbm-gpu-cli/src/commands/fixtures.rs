//! `lbm-gpu fixtures` commands - Record and replay kernel fixtures.

use std::path::Path;

use colored::Colorize;
use lbm_gpu::prelude::*;
use lbm_gpu::verify::{exceeds, KernelComparison};

use crate::error::{CliError, CliResult};

use super::{BackendKind, ParamsArgs};

/// Execute `fixtures generate`.
pub fn generate(dir: &Path, params: &ParamsArgs) -> CliResult<()> {
    let params = params.resolve()?;
    println!(
        "{} Recording {} iteration(s) of the reference on {} x {}",
        "→".bright_cyan(),
        params.max_iter,
        params.nx,
        params.ny
    );

    let written = FixtureStore::new(dir).generate(&params, params.max_iter)?;
    println!(
        "{} Wrote {} fixture(s) to {}",
        "✓".bright_green(),
        written.to_string().bright_white(),
        dir.display().to_string().bright_white()
    );
    Ok(())
}

/// Execute `fixtures check`.
pub fn check(dir: &Path, backend: BackendKind, device: usize, tolerance: f64) -> CliResult<()> {
    let store = FixtureStore::new(dir);
    // The first fixture fixes the lattice extents for the backend.
    let first = store
        .load_all()?
        .into_iter()
        .next()
        .ok_or_else(|| CliError::Validation(format!("no fixtures in {}", dir.display())))?;
    let params = FlowParams::default().with_grid(first.input.nx(), first.input.ny());

    let comparisons = match backend {
        BackendKind::Reference => store.replay(&ReferenceBackend::default())?,
        BackendKind::Cpu => store.replay(&CpuBackend::for_params(&params)?)?,
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => store.replay(&CudaBackend::for_params(device, &params)?)?,
        #[cfg(not(feature = "cuda"))]
        BackendKind::Cuda => {
            let _ = (device, &params);
            return Err(CliError::FeatureNotAvailable(
                "CUDA backend".to_string(),
                "cuda".to_string(),
            ));
        }
    };

    let failures: Vec<&KernelComparison> = comparisons
        .iter()
        .filter(|c| exceeds(c.norm, tolerance))
        .collect();

    for f in &failures {
        println!(
            "  {} iteration {} {} {}: {:.3e}",
            "✗".bright_red(),
            f.iteration,
            f.stage.name().bright_white(),
            f.field.name(),
            f.norm
        );
    }

    if failures.is_empty() {
        println!(
            "{} {} comparison(s) below {:e}",
            "✓".bright_green(),
            comparisons.len().to_string().bright_white(),
            tolerance
        );
        Ok(())
    } else {
        Err(CliError::Validation(format!(
            "{} of {} fixture comparison(s) exceed {:e}",
            failures.len(),
            comparisons.len(),
            tolerance
        )))
    }
}
