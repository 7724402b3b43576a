//! Ocean solver trait definition
//!
//! This module defines the `OceanSolver` trait, the backend-agnostic interface
//! for the per-frame wave pipeline. Both CPU and GPU implementations implement
//! this trait, and the simulation drives them in a fixed order:
//! evolve → transform (height, dx, dy) → derive surface.

use crate::error::Result;
use crate::grid::SimulationGrid;
use crate::publish::SurfaceField;
use crate::spectrum::InitialSpectrum;
use crate::surface::FoamParams;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// One of the three spectra evolved every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralComponent {
    /// Vertical displacement
    Height,
    /// Choppy displacement along x
    DisplacementX,
    /// Choppy displacement along y
    DisplacementY,
}

impl SpectralComponent {
    /// Transform order used by every frame
    pub const ALL: [SpectralComponent; 3] = [
        SpectralComponent::Height,
        SpectralComponent::DisplacementX,
        SpectralComponent::DisplacementY,
    ];

    /// Position in [`SpectralComponent::ALL`]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            SpectralComponent::Height => 0,
            SpectralComponent::DisplacementX => 1,
            SpectralComponent::DisplacementY => 2,
        }
    }

    /// Spatial field this spectrum transforms into
    #[must_use]
    pub fn surface_field(self) -> SurfaceField {
        match self {
            SpectralComponent::Height => SurfaceField::Height,
            SpectralComponent::DisplacementX => SurfaceField::DisplacementX,
            SpectralComponent::DisplacementY => SurfaceField::DisplacementY,
        }
    }
}

/// Backend-agnostic interface for the FFT ocean pipeline
///
/// A solver owns every per-texel field of one grid size: the uploaded initial
/// spectrum, the three evolved spectra, the FFT scratch space, the three
/// spatial maps, the normal map and the persistent foam map. After
/// [`OceanSolver::release`] every operation fails with `OceanError::Disabled`.
pub trait OceanSolver: Send + Sync {
    /// Replace the initial spectrum H0
    ///
    /// The foam history is kept. Foam only starts from zero when the solver
    /// allocates its fields.
    ///
    /// # Errors
    ///
    /// Returns `OceanError::SizeMismatch` if the spectrum was generated for a
    /// different grid.
    fn upload_spectrum(&mut self, spectrum: &InitialSpectrum) -> Result<()>;

    /// Evolve H0 to `time` into the height and displacement spectra
    ///
    /// # Arguments
    ///
    /// * `time` - Simulated time in seconds
    /// * `domain_size` - Physical extent of one period in meters
    /// * `gravity` - Gravitational acceleration in m/s²
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` after release.
    fn evolve(&mut self, time: f32, domain_size: f32, gravity: f32) -> Result<()>;

    /// Inverse FFT one evolved spectrum into its spatial field
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` after release.
    fn transform(&mut self, component: SpectralComponent) -> Result<()>;

    /// Derive normals and integrate foam from the three spatial fields
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` after release.
    fn derive_surface(&mut self, params: &FoamParams) -> Result<()>;

    /// Read one published field in row-major order
    ///
    /// The normal field interleaves its (x, y) components.
    ///
    /// # Returns
    ///
    /// CPU backend returns a borrowed slice where the layout allows it, GPU
    /// backend always returns an owned copy after a blocking readback.
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` after release, or
    /// `OceanError::ResourceAllocation` if the readback fails.
    fn read_field(&self, field: SurfaceField) -> Result<Cow<'_, [f32]>>;

    /// Grid every field is allocated for
    fn grid(&self) -> SimulationGrid;

    /// Check if this is the GPU backend
    ///
    /// # Returns
    ///
    /// `true` if GPU-accelerated, `false` if CPU-only
    fn is_gpu_accelerated(&self) -> bool;

    /// Number of field allocations currently held
    fn live_allocations(&self) -> usize;

    /// Free every field allocation
    ///
    /// # Returns
    ///
    /// Number of allocations released, zero if already released
    fn release(&mut self) -> usize;

    /// GPU buffer backing a published field, for binding without readback
    #[cfg(feature = "gpu")]
    fn gpu_buffer(&self, _field: SurfaceField) -> Option<&wgpu::Buffer> {
        None
    }
}
