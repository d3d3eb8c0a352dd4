//! CLI command implementations.

pub mod dispatch;
pub mod fixtures;
pub mod params;
pub mod run;
pub mod verify;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use lbm_gpu::FlowParams;

use crate::error::CliResult;

/// Kernel pipeline implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Single-threaded scalar kernels.
    Reference,
    /// Rayon kernels on every CPU core.
    Cpu,
    /// NVRTC-compiled kernels on an NVIDIA GPU.
    Cuda,
}

/// Built-in parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// 420 x 180 lattice, Re 150.
    Default,
    /// 1048 x 11264 lattice, 4 iterations.
    GpuBenchmark,
}

/// Where run parameters come from.
#[derive(Debug, Clone, Args)]
pub struct ParamsArgs {
    /// TOML parameter file (overrides --preset)
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// Built-in parameter set
    #[arg(long, value_enum, default_value = "default")]
    pub preset: Preset,

    /// Override the lattice rows (re-centres the cylinder)
    #[arg(long, requires = "ny")]
    pub nx: Option<usize>,

    /// Override the lattice columns (re-centres the cylinder)
    #[arg(long, requires = "nx")]
    pub ny: Option<usize>,

    /// Override the number of iterations
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,
}

impl ParamsArgs {
    /// Resolve the final, validated parameters.
    pub fn resolve(&self) -> CliResult<FlowParams> {
        let mut params = match &self.params {
            Some(path) => FlowParams::load(path)?,
            None => match self.preset {
                Preset::Default => FlowParams::default(),
                Preset::GpuBenchmark => FlowParams::gpu_benchmark(),
            },
        };
        if let (Some(nx), Some(ny)) = (self.nx, self.ny) {
            params = params.with_grid(nx, ny);
        }
        if let Some(iterations) = self.iterations {
            params = params.with_max_iter(iterations);
        }
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ParamsArgs {
        ParamsArgs {
            params: None,
            preset: Preset::Default,
            nx: None,
            ny: None,
            iterations: None,
        }
    }

    #[test]
    fn test_resolve_presets() {
        assert_eq!(args().resolve().unwrap(), FlowParams::default());

        let bench = ParamsArgs {
            preset: Preset::GpuBenchmark,
            ..args()
        };
        assert_eq!(bench.resolve().unwrap(), FlowParams::gpu_benchmark());
    }

    #[test]
    fn test_resolve_overrides() {
        let a = ParamsArgs {
            nx: Some(64),
            ny: Some(36),
            iterations: Some(7),
            ..args()
        };
        let params = a.resolve().unwrap();
        assert_eq!((params.nx, params.ny, params.max_iter), (64, 36, 7));
        assert_eq!(params.cylinder.cx, 16.0);
    }

    #[test]
    fn test_resolve_rejects_invalid_grid() {
        let a = ParamsArgs {
            nx: Some(0),
            ny: Some(36),
            ..args()
        };
        assert!(a.resolve().is_err());
    }

    #[test]
    fn test_resolve_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("flow.toml");
        let params = FlowParams::default().with_grid(50, 30).with_max_iter(3);
        std::fs::write(&path, toml::to_string(&params).unwrap()).unwrap();

        let a = ParamsArgs {
            params: Some(path),
            ..args()
        };
        assert_eq!(a.resolve().unwrap(), params);
    }
}
