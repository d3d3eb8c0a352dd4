//! Multi-threaded CPU backend.
//!
//! Site kernels split the flat `(k, row)` lines of each field across rayon
//! workers with `par_chunks_mut(ny)`; column kernels split the boundary row.
//! Lines are grouped by the row count of one block of the 2D launch plan so
//! the work granularity follows the same heuristic as the GPU.

use rayon::prelude::*;

use crate::error::Result;
use crate::field::{ScalarField, VectorField};
use crate::lattice::{Lattice, LEFTWARD, Q, RIGHTWARD};
use crate::launch_config::{LaunchConfigurator, LaunchPlan};
use crate::params::FlowParams;
use crate::state::LatticeState;

use super::reference::{equilibrium_site, inflow_density, moments_site, relax, upstream};
use super::LatticeBackend;

/// Rayon implementation of the kernel pipeline.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    lattice: Lattice,
    plan: LaunchPlan,
}

impl CpuBackend {
    /// Create a backend for the lattice extents of `plan`.
    pub fn new(lattice: Lattice, plan: LaunchPlan) -> Self {
        tracing::info!(
            nx = plan.nx,
            ny = plan.ny,
            threads = rayon::current_num_threads(),
            "created CPU backend"
        );
        Self { lattice, plan }
    }

    /// Create a backend sized for `params`.
    pub fn for_params(params: &FlowParams) -> Result<Self> {
        let plan = LaunchConfigurator::new(params.dispatch).plan(params.nx, params.ny)?;
        Ok(Self::new(Lattice::d2q9(), plan))
    }

    /// The launch plan the backend was built for.
    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }

    fn min_lines(&self) -> usize {
        self.plan.rows_per_block().max(1)
    }

    fn min_columns(&self) -> usize {
        self.plan.columns.block_dim.0.max(1) as usize
    }

    fn equilibrium_into(&self, rho: &[f64], ux: &[f64], uy: &[f64], out: &mut [f64]) {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let lattice = &self.lattice;
        out.par_chunks_mut(ny)
            .with_min_len(self.min_lines())
            .enumerate()
            .for_each(|(line, dst)| {
                let (k, row) = (line / nx, line % nx);
                let base = row * ny;
                for (col, value) in dst.iter_mut().enumerate() {
                    let i = base + col;
                    *value = equilibrium_site(lattice, k, rho[i], ux[i], uy[i]);
                }
            });
    }
}

impl LatticeBackend for CpuBackend {
    type State = LatticeState;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn upload(&self, host: &LatticeState) -> Result<LatticeState> {
        host.check_shapes()?;
        self.plan.check_extents(host.nx(), host.ny())?;
        Ok(host.clone())
    }

    fn download(&self, state: &LatticeState, host: &mut LatticeState) -> Result<()> {
        host.clone_from(state);
        Ok(())
    }

    fn initialize(&self, s: &mut LatticeState) -> Result<()> {
        let (ux, uy) = s.u.components();
        self.equilibrium_into(s.rho.as_slice(), ux, uy, s.fin.as_mut_slice());
        Ok(())
    }

    fn outflow(&self, s: &mut LatticeState) -> Result<()> {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let plane = nx * ny;
        let min_len = self.min_columns();
        let fin = s.fin.as_mut_slice();

        for k in LEFTWARD {
            let plane = &mut fin[k * plane..(k + 1) * plane];
            let (head, last) = plane.split_at_mut((nx - 1) * ny);
            let src = &head[(nx - 2) * ny..];
            last.par_iter_mut()
                .zip(src.par_iter())
                .with_min_len(min_len)
                .for_each(|(dst, &value)| *dst = value);
        }
        Ok(())
    }

    fn macroscopic(&self, s: &mut LatticeState) -> Result<()> {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let plane = nx * ny;
        let lattice = &self.lattice;
        let fin = s.fin.as_slice();
        let (ux, uy) = s.u.components_mut();

        s.rho
            .as_mut_slice()
            .par_chunks_mut(ny)
            .zip(ux.par_chunks_mut(ny))
            .zip(uy.par_chunks_mut(ny))
            .with_min_len(self.min_lines())
            .enumerate()
            .for_each(|(row, ((rho_row, ux_row), uy_row))| {
                for col in 0..ny {
                    let i = row * ny + col;
                    let f: [f64; Q] = std::array::from_fn(|k| fin[k * plane + i]);
                    let (rho, x, y) = moments_site(lattice, &f);
                    rho_row[col] = rho;
                    ux_row[col] = x;
                    uy_row[col] = y;
                }
            });
        Ok(())
    }

    fn inflow(&self, s: &mut LatticeState) -> Result<()> {
        let ny = self.plan.ny;
        let plane = self.plan.nx * ny;
        let fin = s.fin.as_slice();
        let (px, py) = s.inflow.components();
        let (ux, uy) = s.u.components_mut();

        s.rho.as_mut_slice()[..ny]
            .par_iter_mut()
            .zip(ux[..ny].par_iter_mut())
            .zip(uy[..ny].par_iter_mut())
            .with_min_len(self.min_columns())
            .enumerate()
            .for_each(|(col, ((rho, ux), uy))| {
                *ux = px[col];
                *uy = py[col];
                let f: [f64; Q] = std::array::from_fn(|k| fin[k * plane + col]);
                *rho = inflow_density(&f, px[col]);
            });
        Ok(())
    }

    fn equilibrium(&self, s: &mut LatticeState) -> Result<()> {
        let (ux, uy) = s.u.components();
        self.equilibrium_into(s.rho.as_slice(), ux, uy, s.feq.as_mut_slice());
        Ok(())
    }

    fn update_fin(&self, s: &mut LatticeState) -> Result<()> {
        let ny = self.plan.ny;
        let plane = self.plan.nx * ny;
        let min_len = self.min_columns();
        let feq = s.feq.as_slice();
        // Rightward planes are written, their opposites only read.
        let (unknown, known) = s.fin.as_mut_slice().split_at_mut(3 * plane);

        for i in RIGHTWARD {
            let o = Lattice::opposite(i);
            let src = &known[(o - 3) * plane..(o - 3) * plane + ny];
            unknown[i * plane..i * plane + ny]
                .par_iter_mut()
                .zip(src.par_iter())
                .with_min_len(min_len)
                .enumerate()
                .for_each(|(col, (dst, &opposite))| {
                    *dst = feq[i * plane + col] + opposite - feq[o * plane + col];
                });
        }
        Ok(())
    }

    fn collision(&self, s: &mut LatticeState) -> Result<()> {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let fin = s.fin.as_slice();
        let feq = s.feq.as_slice();
        let omega = s.omega.as_slice();

        s.fout
            .as_mut_slice()
            .par_chunks_mut(ny)
            .with_min_len(self.min_lines())
            .enumerate()
            .for_each(|(line, dst)| {
                let base = line * ny;
                let omega_row = &omega[(line % nx) * ny..][..ny];
                for (col, value) in dst.iter_mut().enumerate() {
                    *value = relax(omega_row[col], fin[base + col], feq[base + col]);
                }
            });
        Ok(())
    }

    fn bounce_back(&self, s: &mut LatticeState) -> Result<()> {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let plane = nx * ny;
        let fin = s.fin.as_slice();
        let solid = s.obstacle.as_slice();

        s.fout
            .as_mut_slice()
            .par_chunks_mut(ny)
            .with_min_len(self.min_lines())
            .enumerate()
            .for_each(|(line, dst)| {
                let (k, row) = (line / nx, line % nx);
                let src = &fin[Lattice::opposite(k) * plane + row * ny..][..ny];
                let mask = &solid[row * ny..][..ny];
                for col in 0..ny {
                    if mask[col] {
                        dst[col] = src[col];
                    }
                }
            });
        Ok(())
    }

    fn streaming(&self, s: &mut LatticeState) -> Result<()> {
        let (nx, ny) = (self.plan.nx, self.plan.ny);
        let plane = nx * ny;
        let lattice = &self.lattice;
        let fout = s.fout.as_slice();

        // Gather form: every destination line pulls from its upstream line.
        s.fin
            .as_mut_slice()
            .par_chunks_mut(ny)
            .with_min_len(self.min_lines())
            .enumerate()
            .for_each(|(line, dst)| {
                let (k, row) = (line / nx, line % nx);
                let [vx, vy] = lattice.velocity(k);
                let src = &fout[k * plane + upstream(row, vx, nx) * ny..][..ny];
                for (col, value) in dst.iter_mut().enumerate() {
                    *value = src[upstream(col, vy, ny)];
                }
            });
        Ok(())
    }

    fn read_macroscopic(&self, s: &LatticeState) -> Result<(ScalarField, VectorField)> {
        Ok((s.rho.clone(), s.u.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{KernelStage, ReferenceBackend};
    use crate::state::FieldId;

    fn params() -> FlowParams {
        FlowParams::default().with_grid(24, 18)
    }

    fn initialized(params: &FlowParams) -> LatticeState {
        let mut state = LatticeState::new(params).unwrap();
        ReferenceBackend::default().initialize(&mut state).unwrap();
        state
    }

    #[test]
    fn test_each_stage_matches_reference_exactly() {
        let params = params();
        let reference = ReferenceBackend::default();
        let cpu = CpuBackend::for_params(&params).unwrap();

        let mut expected = initialized(&params);
        for stage in KernelStage::PIPELINE {
            let mut actual = expected.clone();
            reference.run_stage(stage, &mut expected).unwrap();
            cpu.run_stage(stage, &mut actual).unwrap();
            for field in FieldId::ALL {
                assert_eq!(
                    expected.field(field),
                    actual.field(field),
                    "{stage} differs in {field}"
                );
            }
        }
    }

    #[test]
    fn test_initialize_matches_reference() {
        let params = params();
        let mut expected = LatticeState::new(&params).unwrap();
        let mut actual = expected.clone();
        ReferenceBackend::default().initialize(&mut expected).unwrap();
        CpuBackend::for_params(&params)
            .unwrap()
            .initialize(&mut actual)
            .unwrap();
        assert_eq!(expected.fin, actual.fin);
    }

    #[test]
    fn test_upload_rejects_foreign_extents() {
        let cpu = CpuBackend::for_params(&params()).unwrap();
        let other = LatticeState::new(&FlowParams::default().with_grid(30, 18)).unwrap();
        assert!(cpu.upload(&other).is_err());
    }
}
