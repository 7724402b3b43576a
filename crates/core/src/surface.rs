//! Surface normals and foam from the spatial displacement maps
//!
//! Positions are measured in texel units with the displacements scaled by
//! `1/tile_size`:
//!
//! ```text
//! p(x, y) = (x + Dx/tile, y + Dy/tile, h/tile)
//! n       = normalize((p(x+1) − p(x−1)) × (p(y+1) − p(y−1)))
//! ```
//!
//! The horizontal displacement Jacobian
//! `J = (1 + ∂Dx/∂x)(1 + ∂Dy/∂y) − ∂Dx/∂y·∂Dy/∂x` drops below one where the
//! surface compresses and turns negative where it folds over. Foam grows
//! wherever the convergence `1 − J` exceeds the threshold and decays elsewhere.
//!
//! Neighbour reads wrap around, the field is one period of a tiling ocean.
//! Foam only reads its own previous value, so it is updated in place.

use crate::error::{OceanError, Result};
use crate::field::Field2D;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Inputs of one normal/foam update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoamParams {
    /// World units per texel step of the mesh
    pub tile_size: f32,
    /// Frame time in seconds
    pub delta_time: f32,
    /// Growth per second where water folds
    pub up_speed: f32,
    /// Decay per second elsewhere
    pub down_speed: f32,
    /// Convergence above which foam grows
    pub threshold: f32,
}

/// Advance one foam texel
#[inline]
pub fn integrate_foam(previous: f32, convergence: f32, params: &FoamParams) -> f32 {
    let next = if convergence > params.threshold {
        previous + params.up_speed * params.delta_time
    } else {
        previous - params.down_speed * params.delta_time
    };
    next.clamp(0.0, 1.0)
}

struct Neighbourhood<'a, R> {
    height: &'a R,
    dx: &'a R,
    dy: &'a R,
    size: isize,
    inv_tile: f32,
}

impl<R: Field2D<f32>> Neighbourhood<'_, R> {
    #[inline]
    fn wrap(&self, x: isize, y: isize) -> (usize, usize) {
        (x.rem_euclid(self.size) as usize, y.rem_euclid(self.size) as usize)
    }

    #[inline]
    fn position(&self, x: isize, y: isize) -> Vector3<f32> {
        let (wx, wy) = self.wrap(x, y);
        Vector3::new(
            x as f32 + self.dx.get(wx, wy) * self.inv_tile,
            y as f32 + self.dy.get(wx, wy) * self.inv_tile,
            self.height.get(wx, wy) * self.inv_tile,
        )
    }

    #[inline]
    fn sample(field: &R, (x, y): (usize, usize)) -> f32 {
        field.get(x, y)
    }

    /// Normal (x, y) and convergence at texel `(x, y)`
    fn evaluate(&self, x: isize, y: isize) -> ([f32; 2], f32) {
        let tangent_x = self.position(x + 1, y) - self.position(x - 1, y);
        let tangent_y = self.position(x, y + 1) - self.position(x, y - 1);
        let normal = tangent_x.cross(&tangent_y).normalize();

        let half = 0.5 * self.inv_tile;
        let (east, west) = (self.wrap(x + 1, y), self.wrap(x - 1, y));
        let (north, south) = (self.wrap(x, y + 1), self.wrap(x, y - 1));
        let ddx_dx = (Self::sample(self.dx, east) - Self::sample(self.dx, west)) * half;
        let ddx_dy = (Self::sample(self.dx, north) - Self::sample(self.dx, south)) * half;
        let ddy_dx = (Self::sample(self.dy, east) - Self::sample(self.dy, west)) * half;
        let ddy_dy = (Self::sample(self.dy, north) - Self::sample(self.dy, south)) * half;
        let jacobian = (1.0 + ddx_dx) * (1.0 + ddy_dy) - ddx_dy * ddy_dx;

        ([normal.x, normal.y], 1.0 - jacobian)
    }
}

/// Derive normals and integrate foam for one frame
///
/// # Arguments
///
/// * `height`, `dx`, `dy` - Spatial fields of this frame
/// * `normal` - Output normal field (x, y components)
/// * `foam` - Foam field, read as last frame's value and overwritten
/// * `params` - Tile size, frame time and foam rates
///
/// # Errors
///
/// Returns `OceanError::SizeMismatch` if the fields differ in size.
pub fn derive_surface<R, N>(
    height: &R,
    dx: &R,
    dy: &R,
    normal: &mut N,
    foam: &mut R,
    params: &FoamParams,
) -> Result<()>
where
    R: Field2D<f32>,
    N: Field2D<[f32; 2]>,
{
    let n = height.size();
    for size in [dx.size(), dy.size(), normal.size(), foam.size()] {
        if size != n {
            return Err(OceanError::SizeMismatch {
                expected: n,
                actual: size,
            });
        }
    }

    let neighbourhood = Neighbourhood {
        height,
        dx,
        dy,
        size: n as isize,
        inv_tile: 1.0 / params.tile_size,
    };
    let previous_foam: &R = foam;

    let texels: Vec<([f32; 2], f32)> = (0..n * n)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % n, i / n);
            let (normal, convergence) = neighbourhood.evaluate(x as isize, y as isize);
            let foam = integrate_foam(previous_foam.get(x, y), convergence, params);
            (normal, foam)
        })
        .collect();

    for (i, (n_xy, foam_value)) in texels.into_iter().enumerate() {
        let (x, y) = (i % n, i / n);
        normal.set(x, y, n_xy);
        foam.set(x, y, foam_value);
    }
    Ok(())
}
