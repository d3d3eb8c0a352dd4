//! Scalar reference kernels.
//!
//! Straight loops over the iteration space of each kernel. Every other
//! backend is verified against these. The per-site formulas are shared with
//! the rayon backend so both produce bit-identical results.

use crate::error::Result;
use crate::field::{
    BoundaryVelocityProfile, DistributionField, ObstacleMask, ScalarField, VectorField,
};
use crate::lattice::{Lattice, LEFTWARD, Q, RIGHTWARD, VERTICAL};
use crate::state::LatticeState;

use super::LatticeBackend;

/// Equilibrium population of direction `k` for density `rho` and velocity `(ux, uy)`.
#[inline(always)]
pub(crate) fn equilibrium_site(lattice: &Lattice, k: usize, rho: f64, ux: f64, uy: f64) -> f64 {
    let usqr = 1.5 * (ux * ux + uy * uy);
    let [vx, vy] = lattice.velocity(k);
    let cu = 3.0 * (vx as f64 * ux + vy as f64 * uy);
    rho * lattice.weight(k) * (1.0 + cu + 0.5 * cu * cu - usqr)
}

/// Density and velocity from the nine populations of one site.
#[inline(always)]
pub(crate) fn moments_site(lattice: &Lattice, f: &[f64; Q]) -> (f64, f64, f64) {
    let mut rho = 0.0;
    let mut mx = 0.0;
    let mut my = 0.0;
    for (k, &fk) in f.iter().enumerate() {
        let [vx, vy] = lattice.velocity(k);
        rho += fk;
        mx += vx as f64 * fk;
        my += vy as f64 * fk;
    }
    (rho, mx / rho, my / rho)
}

/// Zou/He density at the inflow wall.
///
/// `f` holds the populations of the boundary site; the rightward ones are
/// unknown and ignored.
#[inline(always)]
pub(crate) fn inflow_density(f: &[f64; Q], ux: f64) -> f64 {
    let vertical = f[VERTICAL[0]] + f[VERTICAL[1]] + f[VERTICAL[2]];
    let leftward = f[LEFTWARD[0]] + f[LEFTWARD[1]] + f[LEFTWARD[2]];
    (vertical + 2.0 * leftward) / (1.0 - ux)
}

/// BGK relaxation of one population.
#[inline(always)]
pub(crate) fn relax(omega: f64, fin: f64, feq: f64) -> f64 {
    (1.0 - omega) * fin + omega * feq
}

/// Source index of a periodic shift by `-v` along an axis of length `n`.
#[inline(always)]
pub(crate) fn upstream(i: usize, v: i32, n: usize) -> usize {
    (i as i64 - v as i64).rem_euclid(n as i64) as usize
}

fn site_populations(fin: &DistributionField, row: usize, col: usize) -> [f64; Q] {
    std::array::from_fn(|k| fin.get(k, row, col))
}

/// Write `equilibrium(rho, u)` into `feq`.
pub fn equilibrium(
    lattice: &Lattice,
    rho: &ScalarField,
    u: &VectorField,
    feq: &mut DistributionField,
) {
    let [_, nx, ny] = feq.shape();
    for k in 0..Q {
        for row in 0..nx {
            for col in 0..ny {
                let [ux, uy] = u.get(row, col);
                let value = equilibrium_site(lattice, k, rho.get(row, col), ux, uy);
                feq.set(k, row, col, value);
            }
        }
    }
}

/// Compute `rho` and `u` from `fin`.
pub fn macroscopic(
    lattice: &Lattice,
    fin: &DistributionField,
    rho: &mut ScalarField,
    u: &mut VectorField,
) {
    let [_, nx, ny] = fin.shape();
    for row in 0..nx {
        for col in 0..ny {
            let (r, ux, uy) = moments_site(lattice, &site_populations(fin, row, col));
            rho.set(row, col, r);
            u.set(row, col, [ux, uy]);
        }
    }
}

/// Copy the leftward populations of row `nx - 2` into row `nx - 1`.
pub fn outflow(fin: &mut DistributionField) {
    let [_, nx, ny] = fin.shape();
    for col in 0..ny {
        for k in LEFTWARD {
            let value = fin.get(k, nx - 2, col);
            fin.set(k, nx - 1, col, value);
        }
    }
}

/// Impose the inflow velocity on row 0 and the density that conserves mass.
pub fn inflow(
    profile: &BoundaryVelocityProfile,
    fin: &DistributionField,
    rho: &mut ScalarField,
    u: &mut VectorField,
) {
    let [_, _, ny] = fin.shape();
    for col in 0..ny {
        let velocity = profile.get(col);
        u.set(0, col, velocity);
        rho.set(0, col, inflow_density(&site_populations(fin, 0, col), velocity[0]));
    }
}

/// Rebuild the rightward populations of row 0 from their opposites.
pub fn update_fin(fin: &mut DistributionField, feq: &DistributionField) {
    let [_, _, ny] = fin.shape();
    for col in 0..ny {
        for i in RIGHTWARD {
            let o = Lattice::opposite(i);
            let value = feq.get(i, 0, col) + fin.get(o, 0, col) - feq.get(o, 0, col);
            fin.set(i, 0, col, value);
        }
    }
}

/// `fout = (1 - omega) fin + omega feq`.
pub fn collision(
    omega: &ScalarField,
    fin: &DistributionField,
    feq: &DistributionField,
    fout: &mut DistributionField,
) {
    let [_, nx, ny] = fin.shape();
    for k in 0..Q {
        for row in 0..nx {
            for col in 0..ny {
                let value = relax(omega.get(row, col), fin.get(k, row, col), feq.get(k, row, col));
                fout.set(k, row, col, value);
            }
        }
    }
}

/// `fout_k = fin_{8-k}` on obstacle sites.
pub fn bounce_back(obstacle: &ObstacleMask, fin: &DistributionField, fout: &mut DistributionField) {
    let [_, nx, ny] = fin.shape();
    for row in 0..nx {
        for col in 0..ny {
            if !obstacle.is_solid(row, col) {
                continue;
            }
            for k in 0..Q {
                fout.set(k, row, col, fin.get(Lattice::opposite(k), row, col));
            }
        }
    }
}

/// Scatter every population of `fout` one step along its direction into
/// `fin`, wrapping around both axes.
pub fn streaming(lattice: &Lattice, fout: &DistributionField, fin: &mut DistributionField) {
    let [_, nx, ny] = fout.shape();
    for k in 0..Q {
        let [vx, vy] = lattice.velocity(k);
        for row in 0..nx {
            let dst_row = (row as i64 + vx as i64).rem_euclid(nx as i64) as usize;
            for col in 0..ny {
                let dst_col = (col as i64 + vy as i64).rem_euclid(ny as i64) as usize;
                fin.set(k, dst_row, dst_col, fout.get(k, row, col));
            }
        }
    }
}

/// Single-threaded backend running the scalar kernels on a host state.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBackend {
    lattice: Lattice,
}

impl ReferenceBackend {
    /// Create a reference backend.
    pub fn new(lattice: Lattice) -> Self {
        Self { lattice }
    }

    /// The lattice constants.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }
}

impl LatticeBackend for ReferenceBackend {
    type State = LatticeState;

    fn name(&self) -> &'static str {
        "reference"
    }

    fn upload(&self, host: &LatticeState) -> Result<LatticeState> {
        host.check_shapes()?;
        Ok(host.clone())
    }

    fn download(&self, state: &LatticeState, host: &mut LatticeState) -> Result<()> {
        host.clone_from(state);
        Ok(())
    }

    fn initialize(&self, s: &mut LatticeState) -> Result<()> {
        equilibrium(&self.lattice, &s.rho, &s.u, &mut s.fin);
        Ok(())
    }

    fn outflow(&self, s: &mut LatticeState) -> Result<()> {
        outflow(&mut s.fin);
        Ok(())
    }

    fn macroscopic(&self, s: &mut LatticeState) -> Result<()> {
        macroscopic(&self.lattice, &s.fin, &mut s.rho, &mut s.u);
        Ok(())
    }

    fn inflow(&self, s: &mut LatticeState) -> Result<()> {
        inflow(&s.inflow, &s.fin, &mut s.rho, &mut s.u);
        Ok(())
    }

    fn equilibrium(&self, s: &mut LatticeState) -> Result<()> {
        equilibrium(&self.lattice, &s.rho, &s.u, &mut s.feq);
        Ok(())
    }

    fn update_fin(&self, s: &mut LatticeState) -> Result<()> {
        update_fin(&mut s.fin, &s.feq);
        Ok(())
    }

    fn collision(&self, s: &mut LatticeState) -> Result<()> {
        collision(&s.omega, &s.fin, &s.feq, &mut s.fout);
        Ok(())
    }

    fn bounce_back(&self, s: &mut LatticeState) -> Result<()> {
        bounce_back(&s.obstacle, &s.fin, &mut s.fout);
        Ok(())
    }

    fn streaming(&self, s: &mut LatticeState) -> Result<()> {
        streaming(&self.lattice, &s.fout, &mut s.fin);
        Ok(())
    }

    fn read_macroscopic(&self, s: &LatticeState) -> Result<(ScalarField, VectorField)> {
        Ok((s.rho.clone(), s.u.clone()))
    }
}
