//! Simulation grid definition
//!
//! The ocean is simulated on a square, periodic grid whose side is a power of
//! two. Texel `(x, y)` maps to the centered wavevector
//! `k = 2π/L · (x − N/2, y − N/2)`, so the DC term sits at `(N/2, N/2)`.

use crate::error::{OceanError, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Largest supported grid side (parallel dispatch granularity)
pub const MAX_MAP_SIZE: u32 = 1024;

/// Side of a dispatch tile; grid sides must be a multiple of this
pub const TILE_SIZE: u32 = 32;

/// Square simulation grid shared by every per-texel field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationGrid {
    map_size: u32,
    log2_size: u32,
}

impl SimulationGrid {
    /// Validate a grid side and build the grid
    ///
    /// # Errors
    ///
    /// Returns `OceanError::InvalidMapSize` if `map_size` is not a power of two,
    /// exceeds [`MAX_MAP_SIZE`], or is not a multiple of [`TILE_SIZE`].
    pub fn new(map_size: u32) -> Result<Self> {
        if !map_size.is_power_of_two() {
            return Err(OceanError::InvalidMapSize {
                map_size,
                reason: "must be a power of two",
            });
        }
        if map_size > MAX_MAP_SIZE {
            return Err(OceanError::InvalidMapSize {
                map_size,
                reason: "must not exceed 1024",
            });
        }
        if map_size % TILE_SIZE != 0 {
            return Err(OceanError::InvalidMapSize {
                map_size,
                reason: "must be a multiple of the 32 texel dispatch tile",
            });
        }
        Ok(Self {
            map_size,
            log2_size: map_size.trailing_zeros(),
        })
    }

    /// Grid side in texels
    #[inline]
    pub fn size(&self) -> usize {
        self.map_size as usize
    }

    /// Grid side as `u32` (GPU parameter form)
    #[inline]
    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// Number of radix-2 stages, `log2(map_size)`
    #[inline]
    pub fn log2_size(&self) -> u32 {
        self.log2_size
    }

    /// Total texel count
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.size() * self.size()
    }

    /// Row-major index of `(x, y)`
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.size() + x
    }

    /// Coordinate of `−k` along one axis for texel coordinate `i`
    #[inline]
    pub fn mirror(&self, i: usize) -> usize {
        (self.size() - i) % self.size()
    }

    /// Wavevector of texel `(x, y)` for a domain of `domain_size` meters
    #[inline]
    pub fn wave_vector(&self, x: usize, y: usize, domain_size: f32) -> Vector2<f32> {
        let half = (self.map_size / 2) as f32;
        let dk = TAU / domain_size;
        Vector2::new((x as f32 - half) * dk, (y as f32 - half) * dk)
    }

    /// Workgroup counts for a 2D dispatch with the given workgroup side
    #[inline]
    pub fn workgroups(&self, workgroup_size: u32) -> u32 {
        self.map_size.div_ceil(workgroup_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sizes() {
        for log2 in 5..=10 {
            let grid = SimulationGrid::new(1 << log2).unwrap();
            assert_eq!(grid.log2_size(), log2);
            assert_eq!(grid.texel_count(), 1 << (2 * log2));
        }
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        assert!(matches!(
            SimulationGrid::new(100),
            Err(OceanError::InvalidMapSize { map_size: 100, .. })
        ));
        assert!(SimulationGrid::new(2048).is_err());
        assert!(SimulationGrid::new(16).is_err());
        assert!(SimulationGrid::new(0).is_err());
    }

    #[test]
    fn test_wave_vector_centered() {
        let grid = SimulationGrid::new(64).unwrap();
        let k = grid.wave_vector(32, 32, 100.0);
        assert_eq!(k, Vector2::zeros());

        let k = grid.wave_vector(33, 32, 100.0);
        assert!((k.x - TAU / 100.0).abs() < 1e-6);
        assert_eq!(k.y, 0.0);
    }

    #[test]
    fn test_mirror_maps_to_negative_k() {
        let grid = SimulationGrid::new(32).unwrap();
        let k = grid.wave_vector(20, 5, 50.0);
        let minus_k = grid.wave_vector(grid.mirror(20), grid.mirror(5), 50.0);
        assert!((k + minus_k).norm() < 1e-5);
        // The Nyquist row aliases onto itself
        assert_eq!(grid.mirror(0), 0);
    }
}
