//! Occupancy-driven block and grid sizing.

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};

/// Largest grid dimension accepted on the `y` and `z` axes.
const MAX_GRID_DIM_YZ: u32 = 65_535;

/// Tunable constants of the sizing heuristic.
///
/// The defaults were tuned empirically on a 22-SM device; they are not
/// correctness constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchTuning {
    /// Number of streaming multiprocessors on the target device.
    pub sm_count: u32,
    /// Columns per thread used to size 1D boundary launches.
    pub column_threshold: u32,
    /// Cap on `log2(threads per block)` along a single axis.
    pub max_block_exponent: u32,
}

impl Default for DispatchTuning {
    fn default() -> Self {
        Self {
            sm_count: 22,
            column_threshold: 216,
            max_block_exponent: 10,
        }
    }
}

impl DispatchTuning {
    /// Builder method to set the SM count.
    #[must_use]
    pub fn with_sm_count(mut self, sm_count: u32) -> Self {
        self.sm_count = sm_count;
        self
    }

    /// Builder method to set the 1D column threshold.
    #[must_use]
    pub fn with_column_threshold(mut self, threshold: u32) -> Self {
        self.column_threshold = threshold;
        self
    }

    /// Builder method to set the per-axis block exponent cap.
    #[must_use]
    pub fn with_max_block_exponent(mut self, exponent: u32) -> Self {
        self.max_block_exponent = exponent;
        self
    }

    /// Reject tunings that would divide by zero or overflow a block.
    pub fn validate(&self) -> Result<()> {
        if self.sm_count == 0 {
            return Err(LbmError::config("sm_count must be positive"));
        }
        if self.column_threshold == 0 {
            return Err(LbmError::config("column_threshold must be positive"));
        }
        if self.max_block_exponent > 10 {
            return Err(LbmError::config(format!(
                "max_block_exponent {} exceeds 10 (1024 threads per block)",
                self.max_block_exponent
            )));
        }
        Ok(())
    }
}

/// Block and grid dimensions for one kernel category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchShape {
    /// Threads per block (x, y, z).
    pub block_dim: (u32, u32, u32),
    /// Blocks per grid (x, y, z).
    pub grid_dim: (u32, u32, u32),
}

impl LaunchShape {
    /// Threads in a single block.
    #[must_use]
    pub fn threads_per_block(&self) -> u32 {
        self.block_dim.0 * self.block_dim.1 * self.block_dim.2
    }

    /// Total threads launched.
    #[must_use]
    pub fn total_threads(&self) -> u64 {
        let blocks = self.grid_dim.0 as u64 * self.grid_dim.1 as u64 * self.grid_dim.2 as u64;
        blocks * self.threads_per_block() as u64
    }

    /// Whether the launch reaches every index of an `m x n` domain.
    #[must_use]
    pub fn covers(&self, m: usize, n: usize) -> bool {
        (self.grid_dim.0 as u64 * self.block_dim.0 as u64) >= m as u64
            && (self.grid_dim.1 as u64 * self.block_dim.1 as u64) >= n as u64
    }
}

#[cfg(feature = "cuda")]
impl From<LaunchShape> for cudarc::driver::LaunchConfig {
    fn from(shape: LaunchShape) -> Self {
        cudarc::driver::LaunchConfig {
            grid_dim: shape.grid_dim,
            block_dim: shape.block_dim,
            shared_mem_bytes: 0,
        }
    }
}

/// Launch shapes for a fixed `nx x ny` lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlan {
    /// Rows of the lattice.
    pub nx: usize,
    /// Columns of the lattice.
    pub ny: usize,
    /// 2D launch over every site.
    pub sites: LaunchShape,
    /// 1D launch over the boundary columns.
    pub columns: LaunchShape,
}

impl LaunchPlan {
    /// Number of lattice rows handled by one block of the site launch.
    #[must_use]
    pub fn rows_per_block(&self) -> usize {
        self.sites.block_dim.0 as usize
    }

    /// Check that the plan was computed for the given extents.
    pub fn check_extents(&self, nx: usize, ny: usize) -> Result<()> {
        if self.nx != nx || self.ny != ny {
            return Err(LbmError::shape_mismatch(
                "launch plan",
                &[self.nx, self.ny],
                &[nx, ny],
            ));
        }
        Ok(())
    }
}

/// Derives thread-block and grid dimensions from grid extents and an
/// occupancy target.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfigurator {
    tuning: DispatchTuning,
}

impl LaunchConfigurator {
    /// Creates a configurator with the given tuning.
    #[must_use]
    pub fn new(tuning: DispatchTuning) -> Self {
        Self { tuning }
    }

    /// Creates a configurator with the default 22-SM tuning.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Returns the tuning.
    #[must_use]
    pub fn tuning(&self) -> &DispatchTuning {
        &self.tuning
    }

    /// Computes both launch shapes for an `nx x ny` lattice.
    pub fn plan(&self, nx: usize, ny: usize) -> Result<LaunchPlan> {
        let plan = LaunchPlan {
            nx,
            ny,
            sites: self.grid_2d(nx, ny)?,
            columns: self.columns_1d(ny)?,
        };
        tracing::debug!(
            nx,
            ny,
            sites_block = ?plan.sites.block_dim,
            sites_grid = ?plan.sites.grid_dim,
            columns_block = ?plan.columns.block_dim,
            columns_grid = ?plan.columns.grid_dim,
            "computed launch plan"
        );
        Ok(plan)
    }

    /// 2D shape covering an `m x n` grid.
    ///
    /// The occupancy exponent `r = min(cap, floor(log2(m*n / sm)))` is split
    /// between the axes according to the aspect-ratio skew
    /// `c = log2(max) - log2(min)`: the shorter axis gets `2^floor(r/2 - c)`
    /// threads and the longer one `2^ceil(r/2 + c)`, each clamped to
    /// `[1, 2^cap]`.
    pub fn grid_2d(&self, m: usize, n: usize) -> Result<LaunchShape> {
        self.tuning.validate()?;
        let (m32, n32) = (extent_u32("m", m)?, extent_u32("n", n)?);

        let cap = self.tuning.max_block_exponent as i64;
        let per_sm = (m as u64 * n as u64) / self.tuning.sm_count as u64;
        let r = (per_sm.max(1).ilog2() as i64).min(cap);

        let (shorter, longer) = if m < n { (m, n) } else { (n, m) };
        let c = (longer as f64).log2() - (shorter as f64).log2();
        let half = r as f64 / 2.0;
        let a = ((half - c).floor() as i64).min(cap);
        let b = ((half + c).ceil() as i64).min(cap);

        let (ex, ey) = if m < n { (a, b) } else { (b, a) };
        let (tx, ty) = (block_extent(ex), block_extent(ey));

        let shape = LaunchShape {
            block_dim: (tx, ty, 1),
            grid_dim: (m32.div_ceil(tx), n32.div_ceil(ty), 1),
        };
        if shape.grid_dim.1 > MAX_GRID_DIM_YZ {
            return Err(LbmError::config(format!(
                "grid y dimension {} exceeds {MAX_GRID_DIM_YZ}",
                shape.grid_dim.1
            )));
        }
        Ok(shape)
    }

    /// 1D shape covering `n` boundary columns.
    ///
    /// Uses `2^min(cap, floor(log2(max(1, n / column_threshold))))` threads per block.
    pub fn columns_1d(&self, n: usize) -> Result<LaunchShape> {
        self.tuning.validate()?;
        let n32 = extent_u32("n", n)?;

        let per_thread = (n32 / self.tuning.column_threshold).max(1);
        let exponent = per_thread.ilog2().min(self.tuning.max_block_exponent);
        let threads = 1u32 << exponent;

        Ok(LaunchShape {
            block_dim: (threads, 1, 1),
            grid_dim: (n32.div_ceil(threads), 1, 1),
        })
    }
}

fn extent_u32(name: &str, extent: usize) -> Result<u32> {
    if extent == 0 {
        return Err(LbmError::config(format!("grid extent {name} must be positive")));
    }
    u32::try_from(extent)
        .map_err(|_| LbmError::config(format!("grid extent {name} = {extent} does not fit in u32")))
}

/// `2^exponent`, with negative exponents clamped to a single thread.
fn block_extent(exponent: i64) -> u32 {
    if exponent <= 0 {
        1
    } else {
        1u32 << exponent
    }
}
