//! Kernel-by-kernel verification against the scalar reference.
//!
//! Every stage of the candidate backend is run on exactly the input the
//! reference sees at that point of its trajectory, and each field the stage
//! writes is compared by Euclidean norm. An end-to-end comparison of two
//! independent runs catches errors that only show up when stages compose.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kernels::{KernelStage, LatticeBackend, ReferenceBackend};
use crate::params::FlowParams;
use crate::state::{FieldId, LatticeState};

/// Largest accepted Euclidean-norm difference.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Difference in one field after one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelComparison {
    /// Time step (0-based).
    pub iteration: usize,
    /// Stage that was run.
    pub stage: KernelStage,
    /// Field that was compared.
    pub field: FieldId,
    /// `||reference - candidate||_2`.
    pub norm: f64,
}

/// Difference in one field after a full run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    /// Field that was compared.
    pub field: FieldId,
    /// `||reference - candidate||_2`.
    pub norm: f64,
}

/// Outcome of [`verify_backend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Candidate backend name.
    pub backend: String,
    /// Acceptance threshold.
    pub tolerance: f64,
    /// Time steps compared.
    pub iterations: usize,
    /// Norm of `fin` after initialisation.
    pub initialization: f64,
    /// Per-stage comparisons in pipeline order.
    pub kernels: Vec<KernelComparison>,
    /// Comparisons after `iterations` independent steps.
    pub end_to_end: Vec<FieldComparison>,
}

/// A comparison at or above tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    /// `fin` after initialisation.
    Initialization {
        /// `||reference - candidate||_2`.
        norm: f64,
    },
    /// One stage of one iteration.
    Kernel(KernelComparison),
    /// One field after the full run.
    EndToEnd(FieldComparison),
}

/// Whether `norm` fails `tolerance`. NaN always fails.
pub fn exceeds(norm: f64, tolerance: f64) -> bool {
    norm.is_nan() || norm >= tolerance
}

impl VerificationReport {
    /// Whether every comparison is within tolerance.
    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }

    /// Comparisons at or above tolerance: initialisation, then stages in
    /// pipeline order, then end-to-end fields.
    pub fn failures(&self) -> Vec<Failure> {
        let tol = self.tolerance;
        let mut failures = Vec::new();
        if exceeds(self.initialization, tol) {
            failures.push(Failure::Initialization {
                norm: self.initialization,
            });
        }
        failures.extend(
            self.kernels
                .iter()
                .filter(|c| exceeds(c.norm, tol))
                .map(|&c| Failure::Kernel(c)),
        );
        failures.extend(
            self.end_to_end
                .iter()
                .filter(|c| exceeds(c.norm, tol))
                .map(|&c| Failure::EndToEnd(c)),
        );
        failures
    }

    /// Largest norm per stage, in pipeline order. A NaN norm wins.
    pub fn worst_per_stage(&self) -> Vec<(KernelStage, f64)> {
        KernelStage::PIPELINE
            .iter()
            .map(|&stage| {
                let worst = self
                    .kernels
                    .iter()
                    .filter(|c| c.stage == stage)
                    .map(|c| c.norm)
                    .fold(0.0, |acc: f64, norm| {
                        if acc.is_nan() || norm.is_nan() {
                            f64::NAN
                        } else {
                            acc.max(norm)
                        }
                    });
                (stage, worst)
            })
            .collect()
    }
}

/// Run `stage` on `candidate` starting from `input` and return the result on the host.
pub fn run_stage_on<B: LatticeBackend>(
    candidate: &B,
    stage: KernelStage,
    input: &LatticeState,
) -> Result<LatticeState> {
    let mut device = candidate.upload(input)?;
    candidate.run_stage(stage, &mut device)?;
    let mut output = input.clone();
    candidate.download(&device, &mut output)?;
    Ok(output)
}

/// Compare each stage of `candidate` with the reference for `iterations` steps.
pub fn verify_kernels<B: LatticeBackend>(
    candidate: &B,
    params: &FlowParams,
    iterations: usize,
) -> Result<(f64, Vec<KernelComparison>)> {
    let reference = ReferenceBackend::default();
    let mut expected = LatticeState::new(params)?;

    let mut device = candidate.upload(&expected)?;
    candidate.initialize(&mut device)?;
    let mut actual = expected.clone();
    candidate.download(&device, &mut actual)?;
    reference.initialize(&mut expected)?;
    let initialization = expected.field_distance(&actual, FieldId::Fin)?;

    let mut comparisons = Vec::with_capacity(iterations * KernelStage::PIPELINE.len());
    for iteration in 0..iterations {
        for stage in KernelStage::PIPELINE {
            let actual = run_stage_on(candidate, stage, &expected)?;
            reference.run_stage(stage, &mut expected)?;
            for &field in stage.outputs() {
                comparisons.push(KernelComparison {
                    iteration,
                    stage,
                    field,
                    norm: expected.field_distance(&actual, field)?,
                });
            }
        }
    }
    Ok((initialization, comparisons))
}

/// Run `iterations` steps on both backends independently and compare every field.
pub fn verify_end_to_end<B: LatticeBackend>(
    candidate: &B,
    params: &FlowParams,
    iterations: usize,
) -> Result<Vec<FieldComparison>> {
    let reference = ReferenceBackend::default();
    let mut expected = LatticeState::new(params)?;
    let mut device = candidate.upload(&expected)?;

    reference.initialize(&mut expected)?;
    candidate.initialize(&mut device)?;
    for _ in 0..iterations {
        reference.step(&mut expected)?;
        candidate.step(&mut device)?;
    }

    let mut actual = expected.clone();
    candidate.download(&device, &mut actual)?;
    FieldId::ALL
        .iter()
        .map(|&field| {
            Ok(FieldComparison {
                field,
                norm: expected.field_distance(&actual, field)?,
            })
        })
        .collect()
}

/// Full verification of `candidate`: per-stage and end-to-end.
pub fn verify_backend<B: LatticeBackend>(
    candidate: &B,
    params: &FlowParams,
    iterations: usize,
    tolerance: f64,
) -> Result<VerificationReport> {
    tracing::info!(
        backend = candidate.name(),
        nx = params.nx,
        ny = params.ny,
        iterations,
        "verifying against reference"
    );
    let (initialization, kernels) = verify_kernels(candidate, params, iterations)?;
    let end_to_end = verify_end_to_end(candidate, params, iterations)?;

    let report = VerificationReport {
        backend: candidate.name().to_string(),
        tolerance,
        iterations,
        initialization,
        kernels,
        end_to_end,
    };
    for failure in report.failures() {
        match failure {
            Failure::Initialization { norm } => {
                tracing::warn!(norm, "initialization exceeds tolerance")
            }
            Failure::Kernel(c) => tracing::warn!(
                iteration = c.iteration,
                stage = c.stage.name(),
                field = c.field.name(),
                norm = c.norm,
                "kernel exceeds tolerance"
            ),
            Failure::EndToEnd(c) => tracing::warn!(
                field = c.field.name(),
                norm = c.norm,
                "end-to-end field exceeds tolerance"
            ),
        }
    }
    tracing::info!(passed = report.passed(), "verification finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::CpuBackend;

    fn params() -> FlowParams {
        FlowParams::default().with_grid(30, 20)
    }

    #[test]
    fn test_reference_verifies_itself() {
        let report = verify_backend(&ReferenceBackend::default(), &params(), 2, DEFAULT_TOLERANCE)
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.initialization, 0.0);
        // Two iterations, ten outputs per iteration.
        assert_eq!(report.kernels.len(), 20);
        assert_eq!(report.end_to_end.len(), FieldId::ALL.len());
    }

    #[test]
    fn test_cpu_backend_passes() {
        let p = params();
        let cpu = CpuBackend::for_params(&p).unwrap();
        let report = verify_backend(&cpu, &p, 3, DEFAULT_TOLERANCE).unwrap();
        assert!(report.passed(), "{:?}", report.worst_per_stage());
        assert!(report.failures().is_empty());
    }

    #[test]
    fn test_failing_report() {
        let mut report = verify_backend(&ReferenceBackend::default(), &params(), 1, DEFAULT_TOLERANCE)
            .unwrap();
        report.kernels[3].norm = 1.0;
        assert!(!report.passed());
        assert_eq!(report.failures(), vec![Failure::Kernel(report.kernels[3])]);

        let worst = report.worst_per_stage();
        assert_eq!(worst.len(), 8);
        assert!(worst.iter().any(|&(_, norm)| norm == 1.0));
    }

    #[test]
    fn test_nan_norm_is_reported() {
        let mut report = verify_backend(&ReferenceBackend::default(), &params(), 1, DEFAULT_TOLERANCE)
            .unwrap();
        let collision = report
            .kernels
            .iter()
            .position(|c| c.stage == KernelStage::Collision)
            .unwrap();
        report.kernels[collision].norm = f64::NAN;

        assert!(!report.passed());
        let worst = report.worst_per_stage();
        let (stage, norm) = worst[5];
        assert_eq!(stage, KernelStage::Collision);
        assert!(norm.is_nan());
        assert_eq!(worst[4].1, 0.0);
    }

    #[test]
    fn test_failures_cover_initialization_and_end_to_end() {
        let mut report = verify_backend(&ReferenceBackend::default(), &params(), 1, DEFAULT_TOLERANCE)
            .unwrap();
        report.initialization = 1.0;
        report.end_to_end[0].norm = f64::NAN;

        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], Failure::Initialization { norm: 1.0 });
        assert!(matches!(failures[1], Failure::EndToEnd(c) if c.field == FieldId::Fin));
        assert!(!report.passed());
    }
}
