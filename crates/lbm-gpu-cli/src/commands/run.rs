//! `lbm-gpu run` command - Advance the flow and optionally write snapshots.

use std::path::Path;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lbm_gpu::prelude::*;

use crate::error::CliResult;
use crate::snapshot::SnapshotWriter;

use super::{BackendKind, ParamsArgs};

/// Execute the `run` command.
pub fn execute(
    params: &ParamsArgs,
    backend: BackendKind,
    device: usize,
    every: usize,
    output: Option<&Path>,
    quiet: bool,
) -> CliResult<()> {
    let params = params.resolve()?;

    println!("{} Running flow past a cylinder", "→".bright_cyan());
    println!(
        "  {} Lattice: {}",
        "•".dimmed(),
        format!("{} x {}", params.nx, params.ny).bright_yellow()
    );
    println!(
        "  {} Re = {}, omega = {:.6}, iterations = {}",
        "•".dimmed(),
        params.reynolds,
        params.omega(),
        params.max_iter
    );
    println!("  {} Backend: {}", "•".dimmed(), format!("{backend:?}").bright_yellow());
    println!();

    let mut writer = match output {
        Some(dir) if every > 0 => Some(SnapshotWriter::create(dir, params.nx, params.ny)?),
        Some(_) => {
            tracing::warn!("--output given without --every; no snapshots will be written");
            None
        }
        None => None,
    };

    match backend {
        BackendKind::Reference => {
            drive(ReferenceBackend::default(), params, every, writer.as_mut(), quiet)?
        }
        BackendKind::Cpu => {
            let cpu = CpuBackend::for_params(&params)?;
            drive(cpu, params, every, writer.as_mut(), quiet)?
        }
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => {
            let cuda = CudaBackend::for_params(device, &params)?;
            drive(cuda, params, every, writer.as_mut(), quiet)?
        }
        #[cfg(not(feature = "cuda"))]
        BackendKind::Cuda => {
            let _ = device;
            return Err(crate::error::CliError::FeatureNotAvailable(
                "CUDA backend".to_string(),
                "cuda".to_string(),
            ));
        }
    }

    if let Some(writer) = writer {
        let dir = writer.dir().display().to_string();
        let manifest = writer.finish()?;
        println!(
            "  {} Wrote {} snapshot(s) to {}",
            "•".dimmed(),
            manifest.frames.len().to_string().bright_white(),
            dir.bright_white()
        );
    }
    Ok(())
}

fn drive<B: LatticeBackend>(
    backend: B,
    params: FlowParams,
    every: usize,
    mut writer: Option<&mut SnapshotWriter>,
    quiet: bool,
) -> CliResult<()> {
    let total = params.max_iter;
    // Snapshots double as progress ticks; without them, tick about 100 times.
    let tick = match (every, quiet) {
        (0, true) => 0,
        (0, false) => (total / 100).max(1),
        (k, _) => k,
    };
    let mut sim = Simulation::new(backend, params)?;

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  "),
    );

    let result = sim.run_with_observer(tick, |snapshot| {
        pb.set_position(snapshot.iteration as u64);
        snapshot.ensure_finite()?;
        pb.set_message(format!("|u|max = {:.4}", snapshot.max_velocity()));
        if every > 0 {
            if let Some(writer) = writer.as_deref_mut() {
                writer.write(snapshot)?;
            }
        }
        Ok(())
    });
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            pb.abandon();
            return Err(e.into());
        }
    };
    pb.finish_and_clear();

    let snapshot = sim.snapshot()?;
    println!(
        "{} {} iterations in {:.3}s ({:.1} MLUPS)",
        "✓".bright_green(),
        stats.iterations.to_string().bright_white(),
        stats.elapsed.as_secs_f64(),
        stats.mlups
    );
    println!(
        "  {} max |u| = {:.6}, mean rho = {:.6}",
        "•".dimmed(),
        snapshot.max_velocity(),
        snapshot.mean_density()
    );
    Ok(())
}
