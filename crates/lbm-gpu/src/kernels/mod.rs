//! The eight-kernel LBM pipeline.
//!
//! Each time step runs, strictly in this order:
//!
//! | Stage | Dispatch | Writes |
//! |---|---|---|
//! | outflow | columns | `fin` (last row, leftward directions) |
//! | macroscopic | sites | `rho`, `u` |
//! | inflow | columns | `rho`, `u` (first row) |
//! | equilibrium | sites | `feq` |
//! | update_fin | columns | `fin` (first row, rightward directions) |
//! | collision | sites | `fout` |
//! | bounce_back | sites | `fout` (obstacle sites) |
//! | streaming | sites | `fin` |
//!
//! A kernel never reads a field it writes at another site, so every work
//! item is independent; the only synchronisation is the barrier between
//! stages.

mod cpu;
pub mod reference;

pub use cpu::CpuBackend;
pub use reference::ReferenceBackend;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{ScalarField, VectorField};
use crate::state::{FieldId, LatticeState};

/// Iteration space of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// One work item per lattice site.
    Sites,
    /// One work item per boundary column.
    Columns,
}

/// One stage of the time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelStage {
    /// Zero-gradient outflow at the last row.
    Outflow,
    /// Density and velocity moments.
    Macroscopic,
    /// Zou/He velocity inflow at the first row.
    Inflow,
    /// Equilibrium populations.
    Equilibrium,
    /// Reconstruct the unknown populations at the inflow.
    UpdateFin,
    /// BGK relaxation.
    Collision,
    /// Full-way bounce-back on the obstacle.
    BounceBack,
    /// Periodic propagation.
    Streaming,
}

impl KernelStage {
    /// Pipeline order of one time step.
    pub const PIPELINE: [KernelStage; 8] = [
        KernelStage::Outflow,
        KernelStage::Macroscopic,
        KernelStage::Inflow,
        KernelStage::Equilibrium,
        KernelStage::UpdateFin,
        KernelStage::Collision,
        KernelStage::BounceBack,
        KernelStage::Streaming,
    ];

    /// Kernel name.
    pub const fn name(self) -> &'static str {
        match self {
            KernelStage::Outflow => "outflow",
            KernelStage::Macroscopic => "macroscopic",
            KernelStage::Inflow => "inflow",
            KernelStage::Equilibrium => "equilibrium",
            KernelStage::UpdateFin => "update_fin",
            KernelStage::Collision => "collision",
            KernelStage::BounceBack => "bounce_back",
            KernelStage::Streaming => "streaming",
        }
    }

    /// Iteration space the kernel is launched over.
    pub const fn dispatch(self) -> Dispatch {
        match self {
            KernelStage::Outflow | KernelStage::Inflow | KernelStage::UpdateFin => {
                Dispatch::Columns
            }
            _ => Dispatch::Sites,
        }
    }

    /// Fields the kernel writes.
    pub const fn outputs(self) -> &'static [FieldId] {
        match self {
            KernelStage::Outflow | KernelStage::UpdateFin | KernelStage::Streaming => {
                &[FieldId::Fin]
            }
            KernelStage::Macroscopic | KernelStage::Inflow => &[FieldId::Rho, FieldId::U],
            KernelStage::Equilibrium => &[FieldId::Feq],
            KernelStage::Collision | KernelStage::BounceBack => &[FieldId::Fout],
        }
    }
}

impl fmt::Display for KernelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An implementation of the kernel pipeline.
///
/// Backends own their working copy of the fields (`State`): host backends
/// operate on a [`LatticeState`] directly, device backends on buffers that
/// stay resident between steps and are only copied back on request.
pub trait LatticeBackend {
    /// Backend-resident field storage.
    type State;

    /// Backend name for logs and reports.
    fn name(&self) -> &'static str;

    /// Copy a host state into backend storage.
    fn upload(&self, host: &LatticeState) -> Result<Self::State>;

    /// Copy backend storage back into a host state of the same shape.
    fn download(&self, state: &Self::State, host: &mut LatticeState) -> Result<()>;

    /// `fin = equilibrium(rho, u)`.
    fn initialize(&self, state: &mut Self::State) -> Result<()>;

    /// Copy the leftward populations of row `nx - 2` into row `nx - 1`.
    fn outflow(&self, state: &mut Self::State) -> Result<()>;

    /// Compute `rho` and `u` from `fin`.
    fn macroscopic(&self, state: &mut Self::State) -> Result<()>;

    /// Impose the inflow velocity and the matching density on row 0.
    fn inflow(&self, state: &mut Self::State) -> Result<()>;

    /// Compute `feq` from `rho` and `u`.
    fn equilibrium(&self, state: &mut Self::State) -> Result<()>;

    /// Rebuild the rightward populations of row 0 from their opposites.
    fn update_fin(&self, state: &mut Self::State) -> Result<()>;

    /// `fout = (1 - omega) fin + omega feq`.
    fn collision(&self, state: &mut Self::State) -> Result<()>;

    /// `fout_k = fin_{8-k}` on obstacle sites.
    fn bounce_back(&self, state: &mut Self::State) -> Result<()>;

    /// Move `fout` one lattice step along each direction into `fin`.
    fn streaming(&self, state: &mut Self::State) -> Result<()>;

    /// Density and velocity as host fields.
    fn read_macroscopic(&self, state: &Self::State) -> Result<(ScalarField, VectorField)>;

    /// Wait for outstanding work.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    /// Run a single stage.
    fn run_stage(&self, stage: KernelStage, state: &mut Self::State) -> Result<()> {
        match stage {
            KernelStage::Outflow => self.outflow(state),
            KernelStage::Macroscopic => self.macroscopic(state),
            KernelStage::Inflow => self.inflow(state),
            KernelStage::Equilibrium => self.equilibrium(state),
            KernelStage::UpdateFin => self.update_fin(state),
            KernelStage::Collision => self.collision(state),
            KernelStage::BounceBack => self.bounce_back(state),
            KernelStage::Streaming => self.streaming(state),
        }
    }

    /// Run one full time step.
    fn step(&self, state: &mut Self::State) -> Result<()> {
        for stage in KernelStage::PIPELINE {
            self.run_stage(stage, state)?;
        }
        Ok(())
    }
}
