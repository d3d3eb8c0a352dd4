//! Launch configuration for the lattice kernels.
//!
//! Every kernel is dispatched either over the full `nx x ny` grid (one work
//! item per site) or over the `ny` boundary columns (one work item per
//! column). Block and grid shapes for both categories are derived once from
//! the grid extents and an occupancy target, then reused for every step.
//!
//! # Example
//!
//! ```
//! use lbm_gpu::launch_config::{DispatchTuning, LaunchConfigurator};
//!
//! let configurator = LaunchConfigurator::new(DispatchTuning::default());
//! let plan = configurator.plan(1048, 11264).unwrap();
//!
//! assert_eq!(plan.sites.block_dim, (2, 512, 1));
//! assert!(plan.sites.covers(1048, 11264));
//! assert!(plan.columns.covers(11264, 1));
//! ```

mod occupancy;

pub use occupancy::{DispatchTuning, LaunchConfigurator, LaunchPlan, LaunchShape};
