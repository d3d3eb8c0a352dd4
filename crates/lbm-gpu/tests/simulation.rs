//! End-to-end runs of the time integration loop.

use lbm_gpu::prelude::*;

// Low Reynolds number keeps omega well inside (0, 2) on a small grid.
fn params(max_iter: usize) -> FlowParams {
    FlowParams::default()
        .with_grid(120, 48)
        .with_reynolds(10.0)
        .with_max_iter(max_iter)
}

#[test]
fn test_cpu_run_matches_reference_snapshots() {
    let p = params(30);
    let mut reference = Simulation::new(ReferenceBackend::default(), p.clone()).unwrap();
    let mut cpu = Simulation::new(CpuBackend::for_params(&p).unwrap(), p).unwrap();

    let mut expected = Vec::new();
    reference
        .run_with_observer(10, |snap| {
            expected.push(snap.clone());
            Ok(())
        })
        .unwrap();

    let mut actual = Vec::new();
    let stats = cpu
        .run_with_observer(10, |snap| {
            actual.push(snap.clone());
            Ok(())
        })
        .unwrap();

    assert_eq!(stats.iterations, 30);
    assert_eq!(expected.len(), 3);
    for (a, b) in expected.iter().zip(&actual) {
        assert_eq!(a.iteration, b.iteration);
        assert!(a.rho.distance(&b.rho) < DEFAULT_TOLERANCE);
        assert!(a.u.distance(&b.u) < DEFAULT_TOLERANCE);
    }
}

#[test]
fn test_flow_stays_bounded() {
    let p = params(200);
    let mut sim = Simulation::new(CpuBackend::for_params(&p).unwrap(), p).unwrap();
    sim.run().unwrap();

    let snap = sim.snapshot().unwrap();
    assert!(snap.is_finite());
    assert!(snap.max_velocity() < 0.2, "max |u| = {}", snap.max_velocity());
    assert!((snap.mean_density() - 1.0).abs() < 0.05);
}

#[test]
fn test_obstacle_slows_the_flow() {
    let p = params(100);
    let cylinder = p.cylinder;
    let mut sim = Simulation::new(CpuBackend::for_params(&p).unwrap(), p).unwrap();
    sim.run().unwrap();

    let snap = sim.snapshot().unwrap();
    let row = (cylinder.cx + cylinder.r + 1.0) as usize;
    let col = cylinder.cy as usize;
    let [behind, _] = snap.u.get(row, col);
    let [far, _] = snap.u.get(row, 1);
    assert!(behind < far, "wake {behind} vs free stream {far}");
}

#[test]
fn test_download_round_trip() {
    let p = params(3);
    let mut sim = Simulation::new(ReferenceBackend::default(), p).unwrap();
    sim.run().unwrap();
    let host = sim.download().unwrap();
    let snap = sim.snapshot().unwrap();
    assert_eq!(host.rho, snap.rho);
    assert_eq!(host.u, snap.u);
    host.check_shapes().unwrap();
}

#[cfg(feature = "cuda")]
#[test]
#[ignore] // Requires CUDA hardware
fn test_cuda_matches_reference_end_to_end() {
    let p = params(10);
    let cuda = CudaBackend::for_params(0, &p).unwrap();
    let report = verify_backend(&cuda, &p, p.max_iter, DEFAULT_TOLERANCE).unwrap();
    assert!(report.passed(), "{:?}", report.worst_per_stage());
}
