//! Flow parameters.
//!
//! Everything the solver needs to set up a run: lattice extents, Reynolds
//! number, cylinder geometry, inflow speed and iteration count. Parameters
//! can be built in code or loaded from a TOML file:
//!
//! ```toml
//! nx = 420
//! ny = 180
//! reynolds = 150.0
//! u_lb = 0.04
//! max_iter = 2000
//!
//! [cylinder]
//! cx = 105.0
//! cy = 90.0
//! r = 20.0
//!
//! [dispatch]
//! sm_count = 22
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};
use crate::field::BoundaryVelocityProfile;
use crate::launch_config::DispatchTuning;

/// Cylinder centre and radius in lattice units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylinderSpec {
    /// Centre row (streamwise).
    pub cx: f64,
    /// Centre column.
    pub cy: f64,
    /// Radius.
    pub r: f64,
}

impl CylinderSpec {
    /// Classic placement: a quarter of the way downstream, vertically centred,
    /// radius one ninth of the height (integer lattice coordinates, at least 1).
    pub fn classic(nx: usize, ny: usize) -> Self {
        Self {
            cx: (nx / 4) as f64,
            cy: (ny / 2) as f64,
            r: (ny / 9).max(1) as f64,
        }
    }
}

/// Physical and numerical parameters of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    /// Lattice rows (streamwise extent).
    pub nx: usize,
    /// Lattice columns.
    pub ny: usize,
    /// Reynolds number.
    pub reynolds: f64,
    /// Inflow velocity in lattice units.
    pub u_lb: f64,
    /// Number of time iterations.
    pub max_iter: usize,
    /// Obstacle geometry.
    pub cylinder: CylinderSpec,
    /// Launch heuristic tuning.
    #[serde(default)]
    pub dispatch: DispatchTuning,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            nx: 420,
            ny: 180,
            reynolds: 150.0,
            u_lb: 0.04,
            max_iter: 2000,
            cylinder: CylinderSpec::classic(420, 180),
            dispatch: DispatchTuning::default(),
        }
    }
}

impl FlowParams {
    /// The 1048 x 11264 configuration used to benchmark the GPU pipeline.
    pub fn gpu_benchmark() -> Self {
        let (nx, ny) = (1048, 22 * 512);
        Self {
            nx,
            ny,
            cylinder: CylinderSpec::classic(nx, ny),
            max_iter: 4,
            ..Self::default()
        }
    }

    /// Parse parameters from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: Self = toml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Builder method to set the grid extents and re-centre the cylinder.
    #[must_use]
    pub fn with_grid(mut self, nx: usize, ny: usize) -> Self {
        self.nx = nx;
        self.ny = ny;
        self.cylinder = CylinderSpec::classic(nx, ny);
        self
    }

    /// Builder method to set the cylinder.
    #[must_use]
    pub fn with_cylinder(mut self, cx: f64, cy: f64, r: f64) -> Self {
        self.cylinder = CylinderSpec { cx, cy, r };
        self
    }

    /// Builder method to set the Reynolds number.
    #[must_use]
    pub fn with_reynolds(mut self, reynolds: f64) -> Self {
        self.reynolds = reynolds;
        self
    }

    /// Builder method to set the inflow velocity.
    #[must_use]
    pub fn with_inflow_velocity(mut self, u_lb: f64) -> Self {
        self.u_lb = u_lb;
        self
    }

    /// Builder method to set the iteration count.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Builder method to set the dispatch tuning.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchTuning) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Domain height `ny - 1`.
    pub fn ly(&self) -> f64 {
        self.ny.saturating_sub(1) as f64
    }

    /// Kinematic viscosity `u_lb * r / Re`.
    pub fn viscosity(&self) -> f64 {
        self.u_lb * self.cylinder.r / self.reynolds
    }

    /// BGK relaxation parameter `1 / (3 nu + 0.5)`.
    pub fn omega(&self) -> f64 {
        1.0 / (3.0 * self.viscosity() + 0.5)
    }

    /// Number of lattice sites.
    pub fn sites(&self) -> usize {
        self.nx * self.ny
    }

    /// Inflow profile for these parameters.
    pub fn inflow_profile(&self) -> BoundaryVelocityProfile {
        BoundaryVelocityProfile::sinusoidal(self.ny, self.u_lb)
    }

    /// Reject configurations that cannot be simulated.
    pub fn validate(&self) -> Result<()> {
        // Outflow copies row nx - 2 into nx - 1.
        if self.nx < 2 || self.ny == 0 {
            return Err(LbmError::config(format!(
                "grid {}x{} too small (need nx >= 2, ny >= 1)",
                self.nx, self.ny
            )));
        }
        if self.reynolds <= 0.0 || !self.reynolds.is_finite() {
            return Err(LbmError::config(format!(
                "Reynolds number must be positive, got {}",
                self.reynolds
            )));
        }
        if !self.u_lb.is_finite() {
            return Err(LbmError::config("inflow velocity must be finite"));
        }

        let CylinderSpec { cx, cy, r } = self.cylinder;
        if r <= 0.0 || r.is_nan() {
            return Err(LbmError::config(format!("cylinder radius must be positive, got {r}")));
        }
        let inside_x = cx >= 0.0 && cx < self.nx as f64;
        let inside_y = cy >= 0.0 && cy < self.ny as f64;
        if !inside_x || !inside_y {
            return Err(LbmError::config(format!(
                "cylinder centre ({cx}, {cy}) lies outside the {}x{} domain",
                self.nx, self.ny
            )));
        }

        self.dispatch.validate()
    }

    /// Modelling preconditions that do not prevent a run but make it
    /// numerically unstable.
    pub fn stability_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let omega = self.omega();
        if omega <= 0.0 || omega >= 2.0 || omega.is_nan() {
            warnings.push(format!("relaxation parameter omega = {omega} outside (0, 2)"));
        }
        let max_ux = self.inflow_profile().max_ux();
        if max_ux >= 1.0 {
            warnings.push(format!(
                "inflow velocity {max_ux} >= 1: Zou/He density diverges"
            ));
        } else if max_ux > 0.1 {
            warnings.push(format!(
                "inflow velocity {max_ux} exceeds 0.1: compressibility error grows"
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = FlowParams::default();
        params.validate().unwrap();
        assert_eq!(params.cylinder, CylinderSpec { cx: 105.0, cy: 90.0, r: 20.0 });
        assert!(params.stability_warnings().is_empty());
    }

    #[test]
    fn test_gpu_benchmark_derived_values() {
        let params = FlowParams::gpu_benchmark();
        params.validate().unwrap();

        assert_eq!((params.nx, params.ny), (1048, 11264));
        assert_eq!(params.cylinder.cx, 262.0);
        assert_eq!(params.cylinder.cy, 5632.0);
        assert_eq!(params.cylinder.r, 1251.0);
        assert_eq!(params.max_iter, 4);
        assert_eq!(params.ly(), 11263.0);

        let nu = 0.04 * 1251.0 / 150.0;
        assert!((params.viscosity() - nu).abs() < 1e-15);
        assert!((params.omega() - 1.0 / (3.0 * nu + 0.5)).abs() < 1e-15);
    }

    #[test]
    fn test_small_grid_keeps_unit_radius() {
        let params = FlowParams::default().with_grid(8, 6);
        assert_eq!(params.cylinder, CylinderSpec { cx: 2.0, cy: 3.0, r: 1.0 });
        params.validate().unwrap();
        assert_eq!(CylinderSpec::classic(420, 18).r, 2.0);
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(FlowParams::default().with_grid(0, 10).validate().is_err());
        assert!(FlowParams::default().with_grid(1, 10).validate().is_err());
        assert!(FlowParams::default().with_reynolds(0.0).validate().is_err());
        assert!(FlowParams::default().with_reynolds(-5.0).validate().is_err());
        assert!(FlowParams::default()
            .with_cylinder(500.0, 90.0, 20.0)
            .validate()
            .is_err());
        assert!(FlowParams::default()
            .with_cylinder(100.0, 90.0, 0.0)
            .validate()
            .is_err());
        assert!(FlowParams::default()
            .with_dispatch(DispatchTuning::default().with_sm_count(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_stability_warnings() {
        let fast = FlowParams::default().with_inflow_velocity(1.2);
        assert!(!fast.stability_warnings().is_empty());

        // Negative viscosity pushes omega above 2.
        let unstable = FlowParams::default().with_inflow_velocity(-0.04);
        assert!(unstable
            .stability_warnings()
            .iter()
            .any(|w| w.contains("omega")));
    }

    #[test]
    fn test_toml_round_trip() {
        let params = FlowParams::default().with_grid(64, 32).with_max_iter(10);
        let text = toml::to_string(&params).unwrap();
        let parsed = FlowParams::from_toml_str(&text).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_toml_dispatch_defaults() {
        let text = r#"
            nx = 64
            ny = 32
            reynolds = 100.0
            u_lb = 0.04
            max_iter = 5

            [cylinder]
            cx = 16.0
            cy = 16.0
            r = 3.0
        "#;
        let params = FlowParams::from_toml_str(text).unwrap();
        assert_eq!(params.dispatch, DispatchTuning::default());
        assert_eq!(params.reynolds, 100.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = FlowParams::load("/nonexistent/params.toml").unwrap_err();
        assert!(matches!(err, LbmError::Io(_)));
    }
}
