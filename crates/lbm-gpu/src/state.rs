//! Host-side simulation state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};
use crate::field::{
    BoundaryVelocityProfile, DistributionField, ObstacleMask, ScalarField, VectorField,
};
use crate::lattice::Q;
use crate::params::FlowParams;

/// Identifies one of the mutable fields of a [`LatticeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldId {
    /// Incoming populations.
    Fin,
    /// Equilibrium populations.
    Feq,
    /// Post-collision populations.
    Fout,
    /// Density.
    Rho,
    /// Velocity.
    U,
}

impl FieldId {
    /// All mutable fields.
    pub const ALL: [FieldId; 5] = [
        FieldId::Fin,
        FieldId::Feq,
        FieldId::Fout,
        FieldId::Rho,
        FieldId::U,
    ];

    /// Short name.
    pub const fn name(self) -> &'static str {
        match self {
            FieldId::Fin => "fin",
            FieldId::Feq => "feq",
            FieldId::Fout => "fout",
            FieldId::Rho => "rho",
            FieldId::U => "u",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every array the kernel pipeline reads or writes.
///
/// Fields are public so kernels can borrow disjoint fields mutably at the
/// same time (`fin` read while `fout` is written, and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeState {
    nx: usize,
    ny: usize,
    /// Incoming populations.
    pub fin: DistributionField,
    /// Equilibrium populations.
    pub feq: DistributionField,
    /// Post-collision populations.
    pub fout: DistributionField,
    /// Density.
    pub rho: ScalarField,
    /// Velocity.
    pub u: VectorField,
    /// Relaxation parameter per site.
    pub omega: ScalarField,
    /// Solid sites.
    pub obstacle: ObstacleMask,
    /// Prescribed inflow velocity.
    pub inflow: BoundaryVelocityProfile,
}

impl LatticeState {
    /// Allocate the state for a run: unit density, the inflow profile
    /// broadcast over every row, zeroed populations.
    pub fn new(params: &FlowParams) -> Result<Self> {
        params.validate()?;
        let (nx, ny) = (params.nx, params.ny);
        let inflow = params.inflow_profile();
        let cyl = params.cylinder;

        Ok(Self {
            nx,
            ny,
            fin: DistributionField::new(nx, ny),
            feq: DistributionField::new(nx, ny),
            fout: DistributionField::new(nx, ny),
            rho: ScalarField::filled(nx, ny, 1.0),
            u: broadcast_profile(nx, &inflow),
            omega: ScalarField::filled(nx, ny, params.omega()),
            obstacle: ObstacleMask::cylinder(nx, ny, cyl.cx, cyl.cy, cyl.r),
            inflow,
        })
    }

    /// Assemble a state from existing fields, checking every shape.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        fin: DistributionField,
        feq: DistributionField,
        fout: DistributionField,
        rho: ScalarField,
        u: VectorField,
        omega: ScalarField,
        obstacle: ObstacleMask,
        inflow: BoundaryVelocityProfile,
    ) -> Result<Self> {
        let [_, nx, ny] = fin.shape();
        let state = Self {
            nx,
            ny,
            fin,
            feq,
            fout,
            rho,
            u,
            omega,
            obstacle,
            inflow,
        };
        state.check_shapes()?;
        Ok(state)
    }

    /// Rows.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Columns.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Verify that the lattice is large enough for the boundary kernels and
    /// that every field matches `nx x ny`.
    pub fn check_shapes(&self) -> Result<()> {
        let (nx, ny) = (self.nx, self.ny);
        // Outflow reads row nx - 2.
        if nx < 2 || ny == 0 {
            return Err(LbmError::config(format!(
                "lattice {nx} x {ny} needs at least 2 rows and 1 column"
            )));
        }
        let check = |field: &'static str, expected: &[usize], actual: &[usize]| {
            if expected == actual {
                Ok(())
            } else {
                Err(LbmError::shape_mismatch(field, expected, actual))
            }
        };

        check("fin", &[Q, nx, ny], &self.fin.shape())?;
        check("feq", &[Q, nx, ny], &self.feq.shape())?;
        check("fout", &[Q, nx, ny], &self.fout.shape())?;
        check("rho", &[nx, ny], &self.rho.shape())?;
        check("u", &[2, nx, ny], &self.u.shape())?;
        check("omega", &[nx, ny], &self.omega.shape())?;
        check("obstacle", &[nx, ny], &self.obstacle.shape())?;
        check("inflow", &[2, ny], &[2, self.inflow.len()])?;
        Ok(())
    }

    /// Raw data of a mutable field.
    pub fn field(&self, id: FieldId) -> &[f64] {
        match id {
            FieldId::Fin => self.fin.as_slice(),
            FieldId::Feq => self.feq.as_slice(),
            FieldId::Fout => self.fout.as_slice(),
            FieldId::Rho => self.rho.as_slice(),
            FieldId::U => self.u.as_slice(),
        }
    }

    /// Euclidean distance between the same field of two states.
    pub fn field_distance(&self, other: &Self, id: FieldId) -> Result<f64> {
        if (self.nx, self.ny) != (other.nx, other.ny) {
            return Err(LbmError::shape_mismatch(
                id.name(),
                &[self.nx, self.ny],
                &[other.nx, other.ny],
            ));
        }
        Ok(crate::field::euclidean_distance(
            self.field(id),
            other.field(id),
        ))
    }

    /// Sum of `fin` over every site and direction.
    pub fn total_mass(&self) -> f64 {
        self.fin.total()
    }
}

/// Initial velocity field: the inflow profile copied onto every row.
pub fn broadcast_profile(nx: usize, profile: &BoundaryVelocityProfile) -> VectorField {
    let ny = profile.len();
    let mut u = VectorField::new(nx, ny);
    let (px, py) = profile.components();
    let (ux, uy) = u.components_mut();
    for row in 0..nx {
        ux[row * ny..(row + 1) * ny].copy_from_slice(px);
        uy[row * ny..(row + 1) * ny].copy_from_slice(py);
    }
    u
}
