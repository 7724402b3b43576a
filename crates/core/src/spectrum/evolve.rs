//! Time evolution of the initial spectrum
//!
//! Deep-water dispersion `ω = sqrt(g·|k|)` advances each amplitude:
//!
//! ```text
//! H(k, t)  = h0(k)·e^{iωt} + conj(h0(−k))·e^{−iωt}
//! Dx(k, t) = −i · kx/|k| · H(k, t)
//! Dy(k, t) = −i · ky/|k| · H(k, t)
//! ```
//!
//! Pairing `k` with `−k` keeps all three spectra Hermitian, so their inverse
//! transforms are real. Displacement at `k = 0` is forced to zero.

use super::{Complex32, SpectrumTexel};
use crate::error::{OceanError, Result};
use crate::field::Field2D;
use crate::grid::SimulationGrid;
use nalgebra::Vector2;
use rayon::prelude::*;

/// Evolved spectra of one texel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvolvedTexel {
    /// Height spectrum
    pub height: Complex32,
    /// X displacement spectrum
    pub dx: Complex32,
    /// Y displacement spectrum
    pub dy: Complex32,
}

/// Angular frequency of a deep-water wave with wavenumber `k_len`
#[inline]
pub fn dispersion(k_len: f32, gravity: f32) -> f32 {
    (gravity * k_len).sqrt()
}

/// Evolve one texel to time `time`
#[inline]
pub fn evolve_texel(
    texel: SpectrumTexel,
    k: Vector2<f32>,
    time: f32,
    gravity: f32,
) -> EvolvedTexel {
    let k_len = k.norm();
    let phase = dispersion(k_len, gravity) * time;
    let (sin, cos) = phase.sin_cos();
    let forward = Complex32::new(cos, sin);
    let backward = Complex32::new(cos, -sin);

    let height = texel.h0 * forward + texel.h0_minus_k_conj * backward;

    if k_len < 1e-6 {
        return EvolvedTexel {
            height,
            ..EvolvedTexel::default()
        };
    }

    EvolvedTexel {
        height,
        dx: Complex32::new(0.0, -k.x / k_len) * height,
        dy: Complex32::new(0.0, -k.y / k_len) * height,
    }
}

/// Evolve the whole spectrum into three complex fields
///
/// # Arguments
///
/// * `h0` - Initial spectrum
/// * `grid` - Grid shared by every field
/// * `domain_size` - Physical extent of one period in meters
/// * `time` - Simulated time in seconds (already scaled by the speed multiplier)
/// * `gravity` - Gravitational acceleration in m/s²
/// * `height`, `dx`, `dy` - Output spectra, overwritten
///
/// # Errors
///
/// Returns `OceanError::SizeMismatch` if any field does not match the grid.
#[expect(clippy::too_many_arguments)]
pub fn evolve_spectrum<S, C>(
    h0: &S,
    grid: &SimulationGrid,
    domain_size: f32,
    time: f32,
    gravity: f32,
    height: &mut C,
    dx: &mut C,
    dy: &mut C,
) -> Result<()>
where
    S: Field2D<SpectrumTexel>,
    C: Field2D<Complex32>,
{
    let n = grid.size();
    for size in [h0.size(), height.size(), dx.size(), dy.size()] {
        if size != n {
            return Err(OceanError::SizeMismatch {
                expected: n,
                actual: size,
            });
        }
    }

    let evolved: Vec<EvolvedTexel> = (0..grid.texel_count())
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % n, i / n);
            evolve_texel(h0.get(x, y), grid.wave_vector(x, y, domain_size), time, gravity)
        })
        .collect();

    for (i, texel) in evolved.iter().enumerate() {
        let (x, y) = (i % n, i / n);
        height.set(x, y, texel.height);
        dx.set(x, y, texel.dx);
        dy.set(x, y, texel.dy);
    }
    Ok(())
}
