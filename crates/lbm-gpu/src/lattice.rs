//! D2Q9 lattice constants.
//!
//! Nine discrete velocities ordered so that direction `k` and `8 - k` are
//! opposite. The first component points along the rows (`x`, streamwise), the
//! second along the columns (`y`):
//!
//! ```text
//!   x = -1    x = 0    x = +1
//!   6 (-1,1)  3 (0,1)  0 (1,1)
//!   7 (-1,0)  4 (0,0)  1 (1,0)
//!   8 (-1,-1) 5 (0,-1) 2 (1,-1)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};

/// Number of discrete velocities.
pub const Q: usize = 9;

/// Index of the rest population.
pub const REST: usize = 4;

/// Directions with a positive streamwise component (unknown at the inflow wall).
pub const RIGHTWARD: [usize; 3] = [0, 1, 2];

/// Directions with no streamwise component.
pub const VERTICAL: [usize; 3] = [3, 4, 5];

/// Directions with a negative streamwise component (unknown at the outflow wall).
pub const LEFTWARD: [usize; 3] = [6, 7, 8];

/// Immutable D2Q9 direction set and weights.
///
/// Built once at startup and shared by reference with every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    velocities: [[i32; 2]; Q],
    weights: [f64; Q],
}

impl Default for Lattice {
    fn default() -> Self {
        Self::d2q9()
    }
}

impl Lattice {
    /// The standard D2Q9 lattice.
    #[must_use]
    pub fn d2q9() -> Self {
        Self {
            velocities: [
                [1, 1],
                [1, 0],
                [1, -1],
                [0, 1],
                [0, 0],
                [0, -1],
                [-1, 1],
                [-1, 0],
                [-1, -1],
            ],
            weights: [
                1.0 / 36.0,
                1.0 / 9.0,
                1.0 / 36.0,
                1.0 / 9.0,
                4.0 / 9.0,
                1.0 / 9.0,
                1.0 / 36.0,
                1.0 / 9.0,
                1.0 / 36.0,
            ],
        }
    }

    /// All velocity vectors.
    #[inline]
    pub fn velocities(&self) -> &[[i32; 2]; Q] {
        &self.velocities
    }

    /// Velocity vector of direction `k`.
    #[inline]
    pub fn velocity(&self, k: usize) -> [i32; 2] {
        self.velocities[k]
    }

    /// All weights.
    #[inline]
    pub fn weights(&self) -> &[f64; Q] {
        &self.weights
    }

    /// Weight of direction `k`.
    #[inline]
    pub fn weight(&self, k: usize) -> f64 {
        self.weights[k]
    }

    /// Direction opposite to `k`.
    #[inline]
    pub const fn opposite(k: usize) -> usize {
        Q - 1 - k
    }

    /// Check the weight normalisation and the `v_k = -v_{8-k}` pairing.
    pub fn validate(&self) -> Result<()> {
        let total: f64 = self.weights.iter().sum();
        if (total - 1.0).abs() > 1e-14 {
            return Err(LbmError::config(format!(
                "lattice weights sum to {total}, expected 1"
            )));
        }

        for k in 0..Q {
            let v = self.velocities[k];
            let w = self.velocities[Self::opposite(k)];
            if v[0] != -w[0] || v[1] != -w[1] {
                return Err(LbmError::config(format!(
                    "direction {k} {v:?} is not opposite to direction {} {w:?}",
                    Self::opposite(k)
                )));
            }
        }

        if self.velocities[REST] != [0, 0] {
            return Err(LbmError::config("direction 4 must be the rest velocity"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_d2q9_is_valid() {
        Lattice::d2q9().validate().unwrap();
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Lattice::d2q9().weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_opposite_is_involution() {
        for k in 0..Q {
            assert_eq!(Lattice::opposite(Lattice::opposite(k)), k);
        }
        assert_eq!(Lattice::opposite(REST), REST);
    }

    #[test]
    fn test_direction_triples() {
        let lattice = Lattice::d2q9();
        for k in RIGHTWARD {
            assert_eq!(lattice.velocity(k)[0], 1);
        }
        for k in VERTICAL {
            assert_eq!(lattice.velocity(k)[0], 0);
        }
        for k in LEFTWARD {
            assert_eq!(lattice.velocity(k)[0], -1);
        }
    }

    #[test]
    fn test_broken_lattice_rejected() {
        let mut lattice = Lattice::d2q9();
        lattice.velocities[0] = [1, 0];
        assert!(lattice.validate().is_err());

        let mut lattice = Lattice::d2q9();
        lattice.weights[4] = 0.5;
        assert!(lattice.validate().is_err());
    }
}
