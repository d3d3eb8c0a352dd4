//! Raw snapshot output.
//!
//! Each snapshot is the velocity magnitude as little-endian `f32`, row-major
//! `(nx, ny)`, in `velocity_{iteration:06}.f32`. A `manifest.json` next to
//! the frames lists them with their statistics.

use std::fs;
use std::path::{Path, PathBuf};

use lbm_gpu::simulation::MacroscopicSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::CliResult;

/// Name of the manifest file.
pub const MANIFEST: &str = "manifest.json";

/// One written frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    /// Iteration of the frame.
    pub iteration: usize,
    /// File name relative to the output directory.
    pub file: String,
    /// Largest velocity magnitude.
    pub max_velocity: f64,
    /// Mean density.
    pub mean_density: f64,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Lattice rows.
    pub nx: usize,
    /// Lattice columns.
    pub ny: usize,
    /// Element type of the frames.
    pub dtype: String,
    /// Frames in iteration order.
    pub frames: Vec<FrameEntry>,
}

/// Writes velocity-magnitude frames and their manifest.
pub struct SnapshotWriter {
    dir: PathBuf,
    manifest: Manifest,
}

impl SnapshotWriter {
    /// Create the output directory.
    pub fn create(dir: impl Into<PathBuf>, nx: usize, ny: usize) -> CliResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            manifest: Manifest {
                nx,
                ny,
                dtype: "f32le".to_string(),
                frames: Vec::new(),
            },
        })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one frame.
    pub fn write(&mut self, snapshot: &MacroscopicSnapshot) -> lbm_gpu::Result<()> {
        let values: Vec<f32> = snapshot
            .velocity_magnitude()
            .iter()
            .map(|&v| f32::from_bits((v as f32).to_bits().to_le()))
            .collect();

        let file = format!("velocity_{:06}.f32", snapshot.iteration);
        fs::write(self.dir.join(&file), bytemuck::cast_slice::<f32, u8>(&values))?;

        self.manifest.frames.push(FrameEntry {
            iteration: snapshot.iteration,
            file,
            max_velocity: snapshot.max_velocity(),
            mean_density: snapshot.mean_density(),
        });
        tracing::debug!(iteration = snapshot.iteration, "wrote snapshot");
        Ok(())
    }

    /// Number of frames written so far.
    pub fn frames(&self) -> usize {
        self.manifest.frames.len()
    }

    /// Write the manifest and return it.
    pub fn finish(self) -> CliResult<Manifest> {
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(self.dir.join(MANIFEST), json)?;
        Ok(self.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbm_gpu::field::{ScalarField, VectorField};

    fn snapshot(iteration: usize) -> MacroscopicSnapshot {
        let mut u = VectorField::new(2, 3);
        u.set(1, 2, [3.0, 4.0]);
        MacroscopicSnapshot {
            iteration,
            rho: ScalarField::filled(2, 3, 1.0),
            u,
        }
    }

    #[test]
    fn test_writes_frames_and_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut writer = SnapshotWriter::create(tmp.path().join("out"), 2, 3).unwrap();
        writer.write(&snapshot(10)).unwrap();
        writer.write(&snapshot(20)).unwrap();
        assert_eq!(writer.frames(), 2);
        let manifest = writer.finish().unwrap();

        let bytes = fs::read(tmp.path().join("out/velocity_000010.f32")).unwrap();
        assert_eq!(bytes.len(), 6 * 4);
        let last = f32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        assert_eq!(last, 5.0);

        let text = fs::read_to_string(tmp.path().join("out").join(MANIFEST)).unwrap();
        let parsed: Manifest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.frames[1].file, "velocity_000020.f32");
        assert_eq!(parsed.frames[0].max_velocity, 5.0);
    }
}
