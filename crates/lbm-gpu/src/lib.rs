//! D2Q9 Lattice-Boltzmann flow past a cylinder.
//!
//! The solver advances a BGK lattice as a pipeline of eight data-parallel
//! kernels (outflow, macroscopic, inflow, equilibrium, update_fin,
//! collision, bounce_back, streaming). The same pipeline has three
//! implementations behind the [`LatticeBackend`] trait:
//!
//! - [`ReferenceBackend`]: scalar loops, the ground truth for verification
//! - [`CpuBackend`]: rayon, partitioned like the GPU launch plan
//! - `CudaBackend`: NVRTC-compiled kernels via cudarc (`cuda` feature)
//!
//! Thread-block and grid shapes come from the [`LaunchConfigurator`]
//! heuristic, computed once per lattice.
//!
//! # Example
//!
//! ```
//! use lbm_gpu::prelude::*;
//!
//! let params = FlowParams::default().with_grid(64, 36).with_max_iter(5);
//! let backend = CpuBackend::for_params(&params)?;
//! let mut sim = Simulation::new(backend, params)?;
//!
//! let stats = sim.run()?;
//! assert_eq!(stats.iterations, 5);
//!
//! let snapshot = sim.snapshot()?;
//! assert!(snapshot.is_finite());
//! # Ok::<(), lbm_gpu::LbmError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field;
pub mod fixtures;
pub mod gpu;
pub mod kernels;
pub mod lattice;
pub mod launch_config;
pub mod params;
pub mod simulation;
pub mod state;
pub mod verify;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{LbmError, Result};
    pub use crate::field::{
        BoundaryVelocityProfile, DistributionField, ObstacleMask, ScalarField, VectorField,
    };
    pub use crate::fixtures::{FixtureStore, KernelFixture};
    pub use crate::kernels::{CpuBackend, KernelStage, LatticeBackend, ReferenceBackend};
    pub use crate::lattice::Lattice;
    pub use crate::launch_config::{DispatchTuning, LaunchConfigurator, LaunchPlan, LaunchShape};
    pub use crate::params::{CylinderSpec, FlowParams};
    pub use crate::simulation::{MacroscopicSnapshot, Phase, RunStats, Simulation};
    pub use crate::state::{FieldId, LatticeState};
    pub use crate::verify::{verify_backend, VerificationReport, DEFAULT_TOLERANCE};

    #[cfg(feature = "cuda")]
    pub use crate::gpu::{CudaBackend, CudaLatticeState};
}

// Re-exports
pub use error::{LbmError, Result};
pub use kernels::{CpuBackend, KernelStage, LatticeBackend, ReferenceBackend};
pub use launch_config::LaunchConfigurator;
pub use params::FlowParams;
pub use simulation::Simulation;
