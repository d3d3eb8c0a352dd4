//! `lbm-gpu dispatch` command - Show the launch plan for a lattice.

use colored::Colorize;
use lbm_gpu::launch_config::{DispatchTuning, LaunchConfigurator, LaunchShape};

use crate::error::CliResult;

/// Execute the `dispatch` command.
pub fn execute(
    nx: usize,
    ny: usize,
    sm_count: u32,
    column_threshold: u32,
    json: bool,
) -> CliResult<()> {
    let tuning = DispatchTuning::default()
        .with_sm_count(sm_count)
        .with_column_threshold(column_threshold);
    let plan = LaunchConfigurator::new(tuning).plan(nx, ny)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{} Launch plan for {} x {}", "→".bright_cyan(), nx, ny);
    println!(
        "  {} {} SMs, column threshold {}",
        "•".dimmed(),
        sm_count,
        column_threshold
    );
    println!();
    print_shape("sites (2D)", &plan.sites);
    print_shape("columns (1D)", &plan.columns);
    Ok(())
}

fn print_shape(label: &str, shape: &LaunchShape) {
    let (bx, by, _) = shape.block_dim;
    let (gx, gy, _) = shape.grid_dim;
    println!(
        "  {} block {} grid {} ({} threads/block, {} total)",
        format!("{label:>13}:").bright_white(),
        format!("({bx}, {by})").bright_yellow(),
        format!("({gx}, {gy})").bright_yellow(),
        shape.threads_per_block(),
        shape.total_threads()
    );
}
