//! Physical and structural properties of the kernels.

use lbm_gpu::field::{DistributionField, ObstacleMask, ScalarField, VectorField};
use lbm_gpu::kernels::reference;
use lbm_gpu::lattice::{Lattice, LEFTWARD, Q};
use lbm_gpu::prelude::*;

/// Deterministic values in `[lo, hi)`.
fn fill(data: &mut [f64], seed: u64, lo: f64, hi: f64) {
    let mut x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    for v in data.iter_mut() {
        x = x
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = (x >> 11) as f64 / (1u64 << 53) as f64;
        *v = lo + (hi - lo) * unit;
    }
}

fn random_distribution(nx: usize, ny: usize, seed: u64) -> DistributionField {
    let mut f = DistributionField::new(nx, ny);
    fill(f.as_mut_slice(), seed, 0.01, 0.5);
    f
}

#[test]
fn test_equilibrium_at_rest_is_weights() {
    let lattice = Lattice::d2q9();
    let (nx, ny) = (5, 7);
    let rho = ScalarField::filled(nx, ny, 1.0);
    let u = VectorField::new(nx, ny);
    let mut feq = DistributionField::new(nx, ny);

    reference::equilibrium(&lattice, &rho, &u, &mut feq);

    for k in 0..Q {
        assert!(feq.plane(k).iter().all(|&f| f == lattice.weight(k)));
    }
}

#[test]
fn test_macroscopic_inverts_equilibrium() {
    let lattice = Lattice::d2q9();
    let (nx, ny) = (8, 6);

    let mut rho = ScalarField::new(nx, ny);
    fill(rho.as_mut_slice(), 1, 0.5, 2.0);
    let mut u = VectorField::new(nx, ny);
    {
        let (ux, uy) = u.components_mut();
        fill(ux, 2, -0.1, 0.1);
        fill(uy, 3, -0.1, 0.1);
    }

    let mut feq = DistributionField::new(nx, ny);
    reference::equilibrium(&lattice, &rho, &u, &mut feq);

    let mut rho2 = ScalarField::new(nx, ny);
    let mut u2 = VectorField::new(nx, ny);
    reference::macroscopic(&lattice, &feq, &mut rho2, &mut u2);

    assert!(rho.distance(&rho2) < 1e-12);
    assert!(u.distance(&u2) < 1e-12);
}

#[test]
fn test_bounce_back_twice_is_identity_on_obstacle() {
    let (nx, ny) = (12, 12);
    let obstacle = ObstacleMask::cylinder(nx, ny, 6.0, 6.0, 3.0);
    let fin = random_distribution(nx, ny, 7);

    let mut once = random_distribution(nx, ny, 8);
    reference::bounce_back(&obstacle, &fin, &mut once);
    let mut twice = random_distribution(nx, ny, 9);
    reference::bounce_back(&obstacle, &once, &mut twice);

    for row in 0..nx {
        for col in 0..ny {
            if !obstacle.is_solid(row, col) {
                continue;
            }
            for k in 0..Q {
                assert_eq!(twice.get(k, row, col), fin.get(k, row, col));
            }
        }
    }
}

#[test]
fn test_bounce_back_leaves_fluid_sites() {
    let (nx, ny) = (10, 10);
    let obstacle = ObstacleMask::cylinder(nx, ny, 5.0, 5.0, 2.0);
    let fin = random_distribution(nx, ny, 11);
    let before = random_distribution(nx, ny, 12);
    let mut fout = before.clone();

    reference::bounce_back(&obstacle, &fin, &mut fout);

    for row in 0..nx {
        for col in 0..ny {
            if obstacle.is_solid(row, col) {
                continue;
            }
            for k in 0..Q {
                assert_eq!(fout.get(k, row, col), before.get(k, row, col));
            }
        }
    }
}

#[test]
fn test_streaming_conserves_mass() {
    let lattice = Lattice::d2q9();
    let (nx, ny) = (9, 13);
    let fout = random_distribution(nx, ny, 21);
    let mut fin = DistributionField::new(nx, ny);

    reference::streaming(&lattice, &fout, &mut fin);

    for k in 0..Q {
        let before: f64 = fout.plane(k).iter().sum();
        let after: f64 = fin.plane(k).iter().sum();
        assert!((before - after).abs() < 1e-12, "direction {k}");
    }
    assert!((fout.total() - fin.total()).abs() < 1e-11);
}

#[test]
fn test_outflow_on_4x4() {
    let fin = random_distribution(4, 4, 31);
    let mut out = fin.clone();

    reference::outflow(&mut out);

    for k in 0..Q {
        for row in 0..4 {
            for col in 0..4 {
                let expected = if row == 3 && LEFTWARD.contains(&k) {
                    fin.get(k, 2, col)
                } else {
                    fin.get(k, row, col)
                };
                assert_eq!(out.get(k, row, col), expected);
            }
        }
    }
}

#[test]
fn test_launch_configuration_for_reference_grid() {
    let configurator = LaunchConfigurator::new(DispatchTuning::default().with_sm_count(22));
    let plan = configurator.plan(1048, 11264).unwrap();

    for shape in [plan.sites, plan.columns] {
        let (tx, ty, tz) = shape.block_dim;
        for t in [tx, ty, tz] {
            assert!(t.is_power_of_two() && t <= 1024);
        }
        assert!(shape.threads_per_block() <= 1024);
    }
    assert!(plan.sites.covers(1048, 11264));
    assert!(plan.columns.covers(11264, 1));
    assert_eq!(plan.sites.block_dim, (2, 512, 1));
    assert_eq!(plan.sites.grid_dim, (524, 22, 1));
    assert_eq!(plan.columns.block_dim, (32, 1, 1));
    assert_eq!(plan.columns.grid_dim, (352, 1, 1));
}

#[test]
fn test_parallel_pipeline_matches_reference() {
    let params = FlowParams::default().with_grid(96, 54).with_max_iter(20);
    let cpu = CpuBackend::for_params(&params).unwrap();

    let report = verify_backend(&cpu, &params, params.max_iter, DEFAULT_TOLERANCE).unwrap();

    assert!(report.passed());
    for comparison in &report.end_to_end {
        assert!(comparison.norm < DEFAULT_TOLERANCE, "{:?}", comparison);
    }
}

#[test]
fn test_zero_extent_rejected_before_dispatch() {
    let params = FlowParams::default().with_grid(0, 10);
    assert!(CpuBackend::for_params(&params).is_err());
    assert!(Simulation::new(ReferenceBackend::default(), params).is_err());
}
