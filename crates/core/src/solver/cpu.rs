//! CPU-based ocean solver implementation
//!
//! This module provides a CPU implementation of the `OceanSolver` trait on top
//! of the [`Field2D`] storage strategies and Rayon for parallelism. This
//! backend is always available and serves as a fallback when GPU acceleration
//! is not available. The storage layout is a type parameter, so the linear and
//! tiled variants share every line of algorithm code.

use super::r#trait::{OceanSolver, SpectralComponent};
use crate::error::{OceanError, Result};
use crate::fft::inverse_fft_2d;
use crate::field::{Field2D, StorageLayout};
use crate::grid::SimulationGrid;
use crate::publish::SurfaceField;
use crate::spectrum::{evolve_spectrum, ButterflyTable, Complex32, InitialSpectrum, SpectrumTexel};
use crate::surface::{derive_surface, FoamParams};
use std::borrow::Cow;
use tracing::debug;

/// Fields held per grid: H0, three spectra, FFT scratch, three spatial maps,
/// normal and foam
const FIELD_COUNT: usize = 10;

struct CpuFields<L: StorageLayout> {
    h0: L::Field<SpectrumTexel>,
    spectra: [L::Field<Complex32>; 3],
    scratch: L::Field<Complex32>,
    spatial: [L::Field<f32>; 3],
    normal: L::Field<[f32; 2]>,
    foam: L::Field<f32>,
}

impl<L: StorageLayout> CpuFields<L> {
    fn new(size: usize) -> Self {
        Self {
            h0: Field2D::new(size),
            spectra: std::array::from_fn(|_| Field2D::new(size)),
            scratch: Field2D::new(size),
            spatial: std::array::from_fn(|_| Field2D::new(size)),
            normal: Field2D::new(size),
            foam: Field2D::new(size),
        }
    }
}

/// CPU-based ocean solver using Rayon for parallelism
///
/// Every stage is parallel within itself and stages run strictly one after
/// the other, so no stage ever observes a partially written field.
pub struct CpuOceanSolver<L: StorageLayout> {
    grid: SimulationGrid,
    table: ButterflyTable,
    fields: Option<CpuFields<L>>,
}

impl<L: StorageLayout> CpuOceanSolver<L> {
    /// Create a new CPU ocean solver
    ///
    /// # Arguments
    ///
    /// * `grid` - Grid every field is allocated for
    /// * `table` - Butterfly table built for the same grid
    ///
    /// # Errors
    ///
    /// Returns `OceanError::SizeMismatch` if the table was built for another size.
    pub fn new(grid: SimulationGrid, table: &ButterflyTable) -> Result<Self> {
        if table.size() != grid.size() {
            return Err(OceanError::SizeMismatch {
                expected: grid.size(),
                actual: table.size(),
            });
        }
        debug!(
            "Allocating {} CPU fields of {}x{} texels",
            L::NAME,
            grid.size(),
            grid.size()
        );
        Ok(Self {
            grid,
            table: table.clone(),
            fields: Some(CpuFields::new(grid.size())),
        })
    }

    fn fields(&self) -> Result<&CpuFields<L>> {
        self.fields.as_ref().ok_or(OceanError::Disabled)
    }

    fn fields_mut(&mut self) -> Result<&mut CpuFields<L>> {
        self.fields.as_mut().ok_or(OceanError::Disabled)
    }
}

fn flatten_pairs(pairs: Cow<'_, [[f32; 2]]>) -> Cow<'_, [f32]> {
    match pairs {
        Cow::Borrowed(slice) => Cow::Borrowed(bytemuck::cast_slice(slice)),
        Cow::Owned(vec) => Cow::Owned(bytemuck::cast_slice(&vec).to_vec()),
    }
}

impl<L: StorageLayout> OceanSolver for CpuOceanSolver<L> {
    fn upload_spectrum(&mut self, spectrum: &InitialSpectrum) -> Result<()> {
        let expected = self.grid.size();
        let actual = spectrum.grid().size();
        if actual != expected {
            return Err(OceanError::SizeMismatch { expected, actual });
        }
        let fields = self.fields_mut()?;
        fields.h0.copy_from_row_major(spectrum.texels())
    }

    fn evolve(&mut self, time: f32, domain_size: f32, gravity: f32) -> Result<()> {
        let grid = self.grid;
        let fields = self.fields_mut()?;
        let [height, dx, dy] = &mut fields.spectra;
        evolve_spectrum(&fields.h0, &grid, domain_size, time, gravity, height, dx, dy)
    }

    fn transform(&mut self, component: SpectralComponent) -> Result<()> {
        let Self { table, fields, .. } = self;
        let fields = fields.as_mut().ok_or(OceanError::Disabled)?;
        let i = component.index();
        inverse_fft_2d(
            &fields.spectra[i],
            &mut fields.scratch,
            &mut fields.spatial[i],
            table,
        )
    }

    fn derive_surface(&mut self, params: &FoamParams) -> Result<()> {
        let fields = self.fields_mut()?;
        let [height, dx, dy] = &fields.spatial;
        derive_surface(height, dx, dy, &mut fields.normal, &mut fields.foam, params)
    }

    fn read_field(&self, field: SurfaceField) -> Result<Cow<'_, [f32]>> {
        let fields = self.fields()?;
        Ok(match field {
            SurfaceField::Height => fields.spatial[0].to_row_major(),
            SurfaceField::DisplacementX => fields.spatial[1].to_row_major(),
            SurfaceField::DisplacementY => fields.spatial[2].to_row_major(),
            SurfaceField::Normal => flatten_pairs(fields.normal.to_row_major()),
            SurfaceField::Foam => fields.foam.to_row_major(),
        })
    }

    fn grid(&self) -> SimulationGrid {
        self.grid
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn live_allocations(&self) -> usize {
        if self.fields.is_some() {
            FIELD_COUNT
        } else {
            0
        }
    }

    fn release(&mut self) -> usize {
        let released = self.live_allocations();
        self.fields = None;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Linear, Tiled};
    use crate::spectrum::SpectrumParams;
    use nalgebra::Vector2;

    fn setup(map_size: u32) -> (SimulationGrid, ButterflyTable, InitialSpectrum) {
        let grid = SimulationGrid::new(map_size).unwrap();
        let table = ButterflyTable::build(map_size).unwrap();
        let params = SpectrumParams {
            wind_speed: 10.0,
            wind_direction: Vector2::new(1.0, 0.0),
            domain_size: 256.0,
            amplitude: 5e-4,
            gravity: 9.81,
            seed: 7,
        };
        let spectrum = InitialSpectrum::generate(&grid, &params).unwrap();
        (grid, table, spectrum)
    }

    fn run_frame<S: OceanSolver>(solver: &mut S, time: f32) {
        solver.evolve(time, 256.0, 9.81).unwrap();
        for component in SpectralComponent::ALL {
            solver.transform(component).unwrap();
        }
        let params = FoamParams {
            tile_size: 2.0,
            delta_time: 0.016,
            up_speed: 1.0,
            down_speed: 1.0,
            threshold: 0.3,
        };
        solver.derive_surface(&params).unwrap();
    }

    #[test]
    fn test_cpu_solver_creation() {
        let (grid, table, _) = setup(64);
        let solver = CpuOceanSolver::<Linear>::new(grid, &table).unwrap();
        assert_eq!(solver.grid().size(), 64);
        assert!(!solver.is_gpu_accelerated());
        assert_eq!(solver.live_allocations(), FIELD_COUNT);
    }

    #[test]
    fn test_cpu_solver_rejects_table_size() {
        let grid = SimulationGrid::new(64).unwrap();
        let table = ButterflyTable::build(32).unwrap();
        assert!(CpuOceanSolver::<Linear>::new(grid, &table).is_err());
    }

    #[test]
    fn test_cpu_solver_height_has_zero_mean() {
        let (grid, table, spectrum) = setup(64);
        let mut solver = CpuOceanSolver::<Linear>::new(grid, &table).unwrap();
        solver.upload_spectrum(&spectrum).unwrap();
        run_frame(&mut solver, 0.0);

        let height = solver.read_field(SurfaceField::Height).unwrap();
        assert_eq!(height.len(), 64 * 64);
        let mean = height.iter().sum::<f32>() / height.len() as f32;
        let peak = height.iter().fold(0.0_f32, |m, h| m.max(h.abs()));
        assert!(peak > 0.0, "Height field is flat");
        assert!(mean.abs() < peak * 1e-3, "Mean {mean} not near zero");
    }

    #[test]
    fn test_cpu_solver_layouts_agree() {
        let (grid, table, spectrum) = setup(64);
        let mut linear = CpuOceanSolver::<Linear>::new(grid, &table).unwrap();
        let mut tiled = CpuOceanSolver::<Tiled>::new(grid, &table).unwrap();
        linear.upload_spectrum(&spectrum).unwrap();
        tiled.upload_spectrum(&spectrum).unwrap();
        for frame in 0..3 {
            run_frame(&mut linear, frame as f32 * 0.1);
            run_frame(&mut tiled, frame as f32 * 0.1);
        }
        for field in SurfaceField::ALL {
            assert_eq!(
                linear.read_field(field).unwrap(),
                tiled.read_field(field).unwrap(),
                "{field:?} differs between layouts"
            );
        }
    }

    #[test]
    fn test_cpu_solver_normal_is_interleaved() {
        let (grid, table, spectrum) = setup(32);
        let mut solver = CpuOceanSolver::<Tiled>::new(grid, &table).unwrap();
        solver.upload_spectrum(&spectrum).unwrap();
        run_frame(&mut solver, 1.0);
        let normal = solver.read_field(SurfaceField::Normal).unwrap();
        assert_eq!(normal.len(), 32 * 32 * 2);
        assert!(normal.chunks(2).all(|n| n[0] * n[0] + n[1] * n[1] <= 1.0 + 1e-5));
    }

    #[test]
    fn test_cpu_solver_release() {
        let (grid, table, spectrum) = setup(32);
        let mut solver = CpuOceanSolver::<Linear>::new(grid, &table).unwrap();
        assert_eq!(solver.release(), FIELD_COUNT);
        assert_eq!(solver.live_allocations(), 0);
        assert_eq!(solver.release(), 0);
        assert_eq!(solver.upload_spectrum(&spectrum), Err(OceanError::Disabled));
        assert!(solver.read_field(SurfaceField::Foam).is_err());
    }

    #[test]
    fn test_cpu_solver_rejects_foreign_spectrum() {
        let (grid, table, _) = setup(64);
        let (_, _, small) = setup(32);
        let mut solver = CpuOceanSolver::<Linear>::new(grid, &table).unwrap();
        assert_eq!(
            solver.upload_spectrum(&small),
            Err(OceanError::SizeMismatch {
                expected: 64,
                actual: 32
            })
        );
    }
}
