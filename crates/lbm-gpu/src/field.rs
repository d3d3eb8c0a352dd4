//! Dense lattice fields.
//!
//! All fields are flat row-major arrays over `(component, row, col)` with
//! `row` in `0..nx` (streamwise) and `col` in `0..ny`. A distribution field
//! stores nine planes of `nx * ny` populations, a vector field two planes.

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};
use crate::lattice::Q;

/// Euclidean norm of `a - b`.
///
/// Slices of different lengths are compared over their common prefix and
/// are expected to have been shape-checked beforehand.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn check_len(field: &'static str, expected: &[usize], len: usize) -> Result<()> {
    let total: usize = expected.iter().product();
    if total != len {
        return Err(LbmError::shape_mismatch(field, expected, &[len]));
    }
    Ok(())
}

/// Serialized form of a grid field; decoded through the `from_vec` constructors
/// so a buffer that disagrees with its extents is rejected on load.
#[derive(Deserialize)]
struct RawGrid<T> {
    nx: usize,
    ny: usize,
    #[serde(alias = "solid")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawProfile {
    ny: usize,
    data: Vec<f64>,
}

/// Nine populations per site, shape `(9, nx, ny)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<f64>")]
pub struct DistributionField {
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl DistributionField {
    /// Zero-filled field.
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            data: vec![0.0; Q * nx * ny],
        }
    }

    /// Wrap existing data laid out as `(9, nx, ny)`.
    pub fn from_vec(nx: usize, ny: usize, data: Vec<f64>) -> Result<Self> {
        check_len("distribution", &[Q, nx, ny], data.len())?;
        Ok(Self { nx, ny, data })
    }

    /// Extents `[9, nx, ny]`.
    pub fn shape(&self) -> [usize; 3] {
        [Q, self.nx, self.ny]
    }

    /// Number of sites in one population plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.nx * self.ny
    }

    /// Flat index of population `k` at `(row, col)`.
    #[inline(always)]
    pub fn index(&self, k: usize, row: usize, col: usize) -> usize {
        (k * self.nx + row) * self.ny + col
    }

    /// Population `k` at `(row, col)`.
    #[inline]
    pub fn get(&self, k: usize, row: usize, col: usize) -> f64 {
        self.data[self.index(k, row, col)]
    }

    /// Set population `k` at `(row, col)`.
    #[inline]
    pub fn set(&mut self, k: usize, row: usize, col: usize, value: f64) {
        let idx = self.index(k, row, col);
        self.data[idx] = value;
    }

    /// Plane of direction `k`.
    pub fn plane(&self, k: usize) -> &[f64] {
        let len = self.plane_len();
        &self.data[k * len..(k + 1) * len]
    }

    /// Raw data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Raw mutable data.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Sum of every population (total mass).
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Euclidean distance to another field of the same shape.
    pub fn distance(&self, other: &Self) -> f64 {
        euclidean_distance(&self.data, &other.data)
    }
}

/// One scalar per site, shape `(nx, ny)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<f64>")]
pub struct ScalarField {
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl ScalarField {
    /// Field filled with `value`.
    pub fn filled(nx: usize, ny: usize, value: f64) -> Self {
        Self {
            nx,
            ny,
            data: vec![value; nx * ny],
        }
    }

    /// Zero-filled field.
    pub fn new(nx: usize, ny: usize) -> Self {
        Self::filled(nx, ny, 0.0)
    }

    /// Wrap existing data laid out as `(nx, ny)`.
    pub fn from_vec(nx: usize, ny: usize, data: Vec<f64>) -> Result<Self> {
        check_len("scalar", &[nx, ny], data.len())?;
        Ok(Self { nx, ny, data })
    }

    /// Extents `[nx, ny]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.nx, self.ny]
    }

    /// Value at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ny + col]
    }

    /// Set the value at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.ny + col] = value;
    }

    /// Raw data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Raw mutable data.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Arithmetic mean.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Euclidean distance to another field of the same shape.
    pub fn distance(&self, other: &Self) -> f64 {
        euclidean_distance(&self.data, &other.data)
    }
}

/// Two components per site, shape `(2, nx, ny)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<f64>")]
pub struct VectorField {
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl VectorField {
    /// Zero-filled field.
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            data: vec![0.0; 2 * nx * ny],
        }
    }

    /// Wrap existing data laid out as `(2, nx, ny)`.
    pub fn from_vec(nx: usize, ny: usize, data: Vec<f64>) -> Result<Self> {
        check_len("vector", &[2, nx, ny], data.len())?;
        Ok(Self { nx, ny, data })
    }

    /// Extents `[2, nx, ny]`.
    pub fn shape(&self) -> [usize; 3] {
        [2, self.nx, self.ny]
    }

    /// Vector at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> [f64; 2] {
        let plane = self.nx * self.ny;
        let idx = row * self.ny + col;
        [self.data[idx], self.data[plane + idx]]
    }

    /// Set the vector at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: [f64; 2]) {
        let plane = self.nx * self.ny;
        let idx = row * self.ny + col;
        self.data[idx] = value[0];
        self.data[plane + idx] = value[1];
    }

    /// Component planes `(x, y)`.
    pub fn components(&self) -> (&[f64], &[f64]) {
        self.data.split_at(self.nx * self.ny)
    }

    /// Mutable component planes `(x, y)`.
    pub fn components_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        let plane = self.nx * self.ny;
        self.data.split_at_mut(plane)
    }

    /// Raw data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Per-site magnitude `|u|`, laid out as `(nx, ny)`.
    pub fn magnitude(&self) -> Vec<f64> {
        let (ux, uy) = self.components();
        ux.iter()
            .zip(uy)
            .map(|(x, y)| (x * x + y * y).sqrt())
            .collect()
    }

    /// Euclidean distance to another field of the same shape.
    pub fn distance(&self, other: &Self) -> f64 {
        euclidean_distance(&self.data, &other.data)
    }
}

/// Solid sites, shape `(nx, ny)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<bool>")]
pub struct ObstacleMask {
    nx: usize,
    ny: usize,
    solid: Vec<bool>,
}

impl ObstacleMask {
    /// Mask without any solid site.
    pub fn empty(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            solid: vec![false; nx * ny],
        }
    }

    /// Disc of radius `r` centred on `(cx, cy)`: `(x - cx)^2 + (y - cy)^2 < r^2`.
    pub fn cylinder(nx: usize, ny: usize, cx: f64, cy: f64, r: f64) -> Self {
        let mut solid = Vec::with_capacity(nx * ny);
        for x in 0..nx {
            for y in 0..ny {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                solid.push(dx * dx + dy * dy < r * r);
            }
        }
        Self { nx, ny, solid }
    }

    /// Wrap an existing `(nx, ny)` mask.
    pub fn from_vec(nx: usize, ny: usize, solid: Vec<bool>) -> Result<Self> {
        check_len("obstacle", &[nx, ny], solid.len())?;
        Ok(Self { nx, ny, solid })
    }

    /// Extents `[nx, ny]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.nx, self.ny]
    }

    /// Whether `(row, col)` is solid.
    #[inline]
    pub fn is_solid(&self, row: usize, col: usize) -> bool {
        self.solid[row * self.ny + col]
    }

    /// Raw mask.
    pub fn as_slice(&self) -> &[bool] {
        &self.solid
    }

    /// Mask as bytes (1 = solid) for device upload.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.solid.iter().map(|&s| u8::from(s)).collect()
    }

    /// Number of solid sites.
    pub fn count(&self) -> usize {
        self.solid.iter().filter(|&&s| s).count()
    }
}

/// Prescribed velocity per column of the inflow wall, shape `(2, ny)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct BoundaryVelocityProfile {
    ny: usize,
    data: Vec<f64>,
}

impl BoundaryVelocityProfile {
    /// `u_x(y) = u_lb * (1 + 1e-4 * sin(2 pi y / (ny - 1)))`, `u_y = 0`.
    ///
    /// The small perturbation breaks the symmetry so vortex shedding starts.
    pub fn sinusoidal(ny: usize, u_lb: f64) -> Self {
        let ly = ny.saturating_sub(1).max(1) as f64;
        let mut data = vec![0.0; 2 * ny];
        for (y, ux) in data[..ny].iter_mut().enumerate() {
            *ux = u_lb * (1.0 + 1e-4 * (y as f64 / ly * 2.0 * std::f64::consts::PI).sin());
        }
        Self { ny, data }
    }

    /// Same velocity on every column.
    pub fn uniform(ny: usize, velocity: [f64; 2]) -> Self {
        let mut data = vec![velocity[0]; 2 * ny];
        data[ny..].fill(velocity[1]);
        Self { ny, data }
    }

    /// Wrap existing data laid out as `(2, ny)`.
    pub fn from_vec(ny: usize, data: Vec<f64>) -> Result<Self> {
        check_len("inflow profile", &[2, ny], data.len())?;
        Ok(Self { ny, data })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.ny
    }

    /// Whether the profile has no columns.
    pub fn is_empty(&self) -> bool {
        self.ny == 0
    }

    /// Velocity at column `col`.
    #[inline]
    pub fn get(&self, col: usize) -> [f64; 2] {
        [self.data[col], self.data[self.ny + col]]
    }

    /// Component planes `(x, y)`.
    pub fn components(&self) -> (&[f64], &[f64]) {
        self.data.split_at(self.ny)
    }

    /// Raw data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Largest streamwise component.
    pub fn max_ux(&self) -> f64 {
        self.data[..self.ny]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl TryFrom<RawGrid<f64>> for DistributionField {
    type Error = LbmError;

    fn try_from(raw: RawGrid<f64>) -> Result<Self> {
        Self::from_vec(raw.nx, raw.ny, raw.data)
    }
}

impl TryFrom<RawGrid<f64>> for ScalarField {
    type Error = LbmError;

    fn try_from(raw: RawGrid<f64>) -> Result<Self> {
        Self::from_vec(raw.nx, raw.ny, raw.data)
    }
}

impl TryFrom<RawGrid<f64>> for VectorField {
    type Error = LbmError;

    fn try_from(raw: RawGrid<f64>) -> Result<Self> {
        Self::from_vec(raw.nx, raw.ny, raw.data)
    }
}

impl TryFrom<RawGrid<bool>> for ObstacleMask {
    type Error = LbmError;

    fn try_from(raw: RawGrid<bool>) -> Result<Self> {
        Self::from_vec(raw.nx, raw.ny, raw.data)
    }
}

impl TryFrom<RawProfile> for BoundaryVelocityProfile {
    type Error = LbmError;

    fn try_from(raw: RawProfile) -> Result<Self> {
        Self::from_vec(raw.ny, raw.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_indexing() {
        let mut f = DistributionField::new(3, 4);
        f.set(2, 1, 3, 7.0);
        assert_eq!(f.get(2, 1, 3), 7.0);
        assert_eq!(f.index(2, 1, 3), 2 * 12 + 4 + 3);
        assert_eq!(f.plane(2)[7], 7.0);
        assert_eq!(f.shape(), [9, 3, 4]);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(DistributionField::from_vec(2, 2, vec![0.0; 35]).is_err());
        assert!(ScalarField::from_vec(2, 2, vec![0.0; 3]).is_err());
        assert!(VectorField::from_vec(2, 2, vec![0.0; 9]).is_err());
        assert!(ObstacleMask::from_vec(2, 2, vec![false; 5]).is_err());
        assert!(BoundaryVelocityProfile::from_vec(2, vec![0.0; 3]).is_err());
        assert!(ScalarField::from_vec(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn test_deserialize_rejects_truncated_buffer() {
        let json = serde_json::to_string(&ScalarField::filled(3, 2, 1.0)).unwrap();
        assert!(serde_json::from_str::<ScalarField>(&json).is_ok());

        let truncated = json.replace("1.0,1.0,1.0,1.0,1.0,1.0", "1.0,1.0");
        let err = serde_json::from_str::<ScalarField>(&truncated).unwrap_err();
        assert!(err.to_string().contains("Shape mismatch"), "{err}");

        let mask = serde_json::to_string(&ObstacleMask::empty(2, 2)).unwrap();
        assert!(serde_json::from_str::<ObstacleMask>(&mask).is_ok());
        let short = mask.replace("false,false,false,false", "false");
        assert!(serde_json::from_str::<ObstacleMask>(&short).is_err());
    }

    #[test]
    fn test_vector_field_components() {
        let mut u = VectorField::new(2, 3);
        u.set(1, 2, [0.5, -0.25]);
        assert_eq!(u.get(1, 2), [0.5, -0.25]);
        let (ux, uy) = u.components();
        assert_eq!(ux[5], 0.5);
        assert_eq!(uy[5], -0.25);
        assert!((u.magnitude()[5] - (0.3125f64).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_cylinder_mask() {
        let mask = ObstacleMask::cylinder(20, 20, 10.0, 10.0, 3.0);
        assert!(mask.is_solid(10, 10));
        assert!(mask.is_solid(12, 10));
        // Strict inequality: distance exactly r is fluid.
        assert!(!mask.is_solid(13, 10));
        assert!(!mask.is_solid(0, 0));
        assert_eq!(mask.count(), 25);
    }

    #[test]
    fn test_sinusoidal_profile() {
        let profile = BoundaryVelocityProfile::sinusoidal(5, 0.04);
        assert_eq!(profile.len(), 5);
        assert!((profile.get(0)[0] - 0.04).abs() < 1e-15);
        // y = 1 of ly = 4 -> sin(pi/2) = 1
        assert!((profile.get(1)[0] - 0.04 * (1.0 + 1e-4)).abs() < 1e-15);
        assert!(profile.components().1.iter().all(|&v| v == 0.0));
        assert!(profile.max_ux() > 0.04);
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }
}
