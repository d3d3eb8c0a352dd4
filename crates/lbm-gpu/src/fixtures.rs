//! Recorded kernel inputs and outputs.
//!
//! A fixture captures the full state right before and right after one
//! stage of the reference trajectory. Fixtures are stored as one JSON file
//! per stage, named `{sequence:03}-{stage}.json` in pipeline order, and can
//! be replayed against any backend without recomputing the reference.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};
use crate::kernels::{KernelStage, LatticeBackend, ReferenceBackend};
use crate::params::FlowParams;
use crate::state::LatticeState;
use crate::verify::{run_stage_on, KernelComparison};

/// One stage of the reference trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelFixture {
    /// 1-based position in the trajectory.
    pub sequence: usize,
    /// Time step (0-based).
    pub iteration: usize,
    /// Stage that maps `input` to `output`.
    pub stage: KernelStage,
    /// State before the stage.
    pub input: LatticeState,
    /// State after the stage.
    pub output: LatticeState,
}

impl KernelFixture {
    /// File name of this fixture.
    pub fn file_name(&self) -> String {
        format!("{:03}-{}.json", self.sequence, self.stage.name())
    }
}

/// Directory of kernel fixtures.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    /// Store rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record `iterations` steps of the reference trajectory for `params`.
    ///
    /// Returns the number of fixtures written.
    pub fn generate(&self, params: &FlowParams, iterations: usize) -> Result<usize> {
        fs::create_dir_all(&self.dir)?;
        let reference = ReferenceBackend::default();
        let mut state = LatticeState::new(params)?;
        reference.initialize(&mut state)?;

        let mut sequence = 0;
        for iteration in 0..iterations {
            for stage in KernelStage::PIPELINE {
                sequence += 1;
                let input = state.clone();
                reference.run_stage(stage, &mut state)?;
                let fixture = KernelFixture {
                    sequence,
                    iteration,
                    stage,
                    input,
                    output: state.clone(),
                };
                self.write(&fixture)?;
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            fixtures = sequence,
            nx = params.nx,
            ny = params.ny,
            "generated kernel fixtures"
        );
        Ok(sequence)
    }

    /// Write a single fixture.
    pub fn write(&self, fixture: &KernelFixture) -> Result<PathBuf> {
        let path = self.dir.join(fixture.file_name());
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(writer, fixture)?;
        tracing::debug!(path = %path.display(), "wrote fixture");
        Ok(path)
    }

    /// Load every fixture, ordered by sequence number.
    pub fn load_all(&self) -> Result<Vec<KernelFixture>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut fixtures = Vec::with_capacity(paths.len());
        for path in paths {
            let fixture: KernelFixture = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
            let expected_name = fixture.file_name();
            if path.file_name().and_then(|n| n.to_str()) != Some(expected_name.as_str()) {
                return Err(LbmError::fixture(format!(
                    "{} holds fixture {expected_name}",
                    path.display()
                )));
            }
            fixture.input.check_shapes()?;
            fixture.output.check_shapes()?;
            fixtures.push(fixture);
        }

        if fixtures.is_empty() {
            return Err(LbmError::fixture(format!(
                "no fixtures found in {}",
                self.dir.display()
            )));
        }
        fixtures.sort_by_key(|f| f.sequence);
        Ok(fixtures)
    }

    /// Run every stored stage on `backend` and compare with the recorded output.
    pub fn replay<B: LatticeBackend>(&self, backend: &B) -> Result<Vec<KernelComparison>> {
        let fixtures = self.load_all()?;
        let mut comparisons = Vec::new();
        for fixture in &fixtures {
            let actual = run_stage_on(backend, fixture.stage, &fixture.input)?;
            for &field in fixture.stage.outputs() {
                comparisons.push(KernelComparison {
                    iteration: fixture.iteration,
                    stage: fixture.stage,
                    field,
                    norm: fixture.output.field_distance(&actual, field)?,
                });
            }
        }
        tracing::info!(
            backend = backend.name(),
            fixtures = fixtures.len(),
            "replayed kernel fixtures"
        );
        Ok(comparisons)
    }
}
