//! `lbm-gpu params` command - Print resolved and derived parameters.

use colored::Colorize;

use crate::error::CliResult;

use super::ParamsArgs;

/// Output format of the `params` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ParamsFormat {
    /// Human-readable summary.
    Text,
    /// TOML, loadable with `--params`.
    Toml,
    /// JSON.
    Json,
}

/// Execute the `params` command.
pub fn execute(params: &ParamsArgs, format: ParamsFormat) -> CliResult<()> {
    let params = params.resolve()?;

    match format {
        ParamsFormat::Toml => print!("{}", toml::to_string_pretty(&params)?),
        ParamsFormat::Json => println!("{}", serde_json::to_string_pretty(&params)?),
        ParamsFormat::Text => {
            let c = params.cylinder;
            println!("{}:", "Flow parameters".bright_white().underline());
            println!("  {:>16} {} x {}", "lattice:", params.nx, params.ny);
            println!("  {:>16} {}", "Reynolds:", params.reynolds);
            println!("  {:>16} {}", "u_lb:", params.u_lb);
            println!("  {:>16} ({}, {}) r = {}", "cylinder:", c.cx, c.cy, c.r);
            println!("  {:>16} {}", "iterations:", params.max_iter);
            println!();
            println!("{}:", "Derived".bright_white().underline());
            println!("  {:>16} {}", "ly:", params.ly());
            println!("  {:>16} {:.6e}", "viscosity:", params.viscosity());
            println!("  {:>16} {:.6}", "omega:", params.omega());
            for warning in params.stability_warnings() {
                println!("  {} {}", "Warning:".yellow(), warning);
            }
        }
    }
    Ok(())
}
