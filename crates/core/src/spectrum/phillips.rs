//! Phillips spectrum and initial amplitude synthesis
//!
//! The initial spectrum follows Tessendorf's statistical wave model:
//!
//! ```text
//! P(k)  = A · exp(−1/(|k|·L)²) / |k|⁴ · (k̂·ŵ)² · exp(−|k|²·l²)
//! h0(k) = (ξr + i·ξi) / √2 · √P(k) · Δk
//! ```
//!
//! with `L = V²/g` the largest wave a wind of speed `V` sustains, `l = L/1000`
//! damping waves far shorter than that, `ξ` independent unit Gaussians and
//! `Δk = 2π/domain` the frequency spacing.
//!
//! # References
//! - Tessendorf, J. (2001) "Simulating Ocean Water", SIGGRAPH course notes

use super::{Complex32, SpectrumTexel};
use crate::config::OceanConfig;
use crate::error::{OceanError, Result};
use crate::grid::SimulationGrid;
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_1_SQRT_2, TAU};

/// Ratio between the largest wave and the damped small-wave length
const SMALL_WAVE_RATIO: f32 = 1000.0;

/// Inputs of the initial spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumParams {
    /// Wind speed in m/s
    pub wind_speed: f32,
    /// Unit wind direction in the grid plane
    pub wind_direction: Vector2<f32>,
    /// Physical extent of one period in meters
    pub domain_size: f32,
    /// Phillips constant `A`
    pub amplitude: f32,
    /// Gravitational acceleration in m/s²
    pub gravity: f32,
    /// Seed for the Gaussian draws
    pub seed: u64,
}

impl SpectrumParams {
    /// Extract the spectrum inputs from a configuration
    pub fn from_config(config: &OceanConfig) -> Self {
        let heading = config.wind_direction_degrees.to_radians();
        Self {
            wind_speed: config.wind_speed,
            wind_direction: Vector2::new(heading.cos(), heading.sin()),
            domain_size: config.domain_size(),
            amplitude: config.wave_amplitude,
            gravity: config.gravity,
            seed: config.seed,
        }
    }

    /// Largest wave length sustained by the wind, `V²/g`
    pub fn largest_wave(&self) -> f32 {
        self.wind_speed * self.wind_speed / self.gravity
    }
}

/// Phillips spectrum value at wavevector `k`
///
/// Zero at `k = 0` and everywhere when there is no wind.
pub fn phillips(k: Vector2<f32>, params: &SpectrumParams) -> f32 {
    let k_len_sq = k.norm_squared();
    let largest = params.largest_wave();
    if k_len_sq < 1e-12 || largest <= 0.0 {
        return 0.0;
    }

    let k_len = k_len_sq.sqrt();
    let k_dot_w = k.dot(&params.wind_direction) / k_len;
    let small = largest / SMALL_WAVE_RATIO;

    params.amplitude * (-1.0 / (k_len_sq * largest * largest)).exp() / (k_len_sq * k_len_sq)
        * k_dot_w
        * k_dot_w
        * (-k_len_sq * small * small).exp()
}

/// Initial spectrum H0 for one grid
#[derive(Debug, Clone, PartialEq)]
pub struct InitialSpectrum {
    grid: SimulationGrid,
    texels: Vec<SpectrumTexel>,
}

impl InitialSpectrum {
    /// Synthesize H0 from Phillips amplitudes and seeded Gaussian draws
    ///
    /// Draws happen in row-major order, two per texel (real then imaginary),
    /// so equal parameters always give bit-identical spectra.
    ///
    /// # Errors
    ///
    /// Returns `OceanError::InvalidParameter` if the domain size is not positive.
    pub fn generate(grid: &SimulationGrid, params: &SpectrumParams) -> Result<Self> {
        if params.domain_size.is_nan() || params.domain_size <= 0.0 {
            return Err(OceanError::InvalidParameter {
                name: "domain_size",
                message: format!("must be positive, got {}", params.domain_size),
            });
        }

        let n = grid.size();
        let delta_k = TAU / params.domain_size;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut h0 = Vec::with_capacity(grid.texel_count());
        for y in 0..n {
            for x in 0..n {
                let xi_r: f32 = rng.sample(StandardNormal);
                let xi_i: f32 = rng.sample(StandardNormal);
                let k = grid.wave_vector(x, y, params.domain_size);
                let scale = phillips(k, params).sqrt() * delta_k * FRAC_1_SQRT_2;
                h0.push(Complex32::new(xi_r, xi_i) * scale);
            }
        }

        let mut texels = Vec::with_capacity(h0.len());
        for y in 0..n {
            for x in 0..n {
                let mirrored = grid.index(grid.mirror(x), grid.mirror(y));
                texels.push(SpectrumTexel {
                    h0: h0[grid.index(x, y)],
                    h0_minus_k_conj: h0[mirrored].conj(),
                });
            }
        }

        Ok(Self { grid: *grid, texels })
    }

    /// Grid the spectrum was generated for
    pub fn grid(&self) -> &SimulationGrid {
        &self.grid
    }

    /// Texels in row-major order
    pub fn texels(&self) -> &[SpectrumTexel] {
        &self.texels
    }
}
