//! Frame driver for the FFT ocean
//!
//! `OceanSimulation` owns the backend solver, the butterfly table and the
//! reflection/refraction capture, and runs one strictly ordered pipeline per
//! frame:
//!
//! 1. regenerate H0 if a wind change asked for it
//! 2. reflection/refraction capture
//! 3. spectrum evolution
//! 4. inverse FFT of height, x and y displacement
//! 5. normals and foam
//! 6. publish the frame's [`FrameOutput`]

use crate::capture::{ReflectionCapture, SceneRenderer, ViewerCamera, ViewerId, WaterPlane};
use crate::config::{OceanConfig, ParameterChange};
use crate::error::{OceanError, Result};
use crate::grid::SimulationGrid;
use crate::publish::{FrameOutput, ShadingParams, SurfaceBindings, SurfaceField};
use crate::solver::{
    create_ocean_solver, BackendPreference, FrameTimer, OceanSolver, ProfilerScope,
    SpectralComponent,
};
use crate::spectrum::{ButterflyTable, InitialSpectrum, SpectrumParams};
use crate::surface::FoamParams;
use nalgebra::Vector3;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, warn};

/// FFT ocean simulation
///
/// Construction allocates everything; [`OceanSimulation::disable`] frees it
/// and [`OceanSimulation::enable`] rebuilds it as a new generation.
pub struct OceanSimulation {
    config: OceanConfig,
    preference: BackendPreference,
    grid: SimulationGrid,
    table: ButterflyTable,
    solver: Option<Box<dyn OceanSolver>>,
    capture: ReflectionCapture,
    needs_reinit: bool,

    /// Simulated time, advanced by `dt · speed` every frame
    time: f32,
    frame: u64,
    generation: u32,

    /// Host copy of the height field for `height_at`
    height_cache: Vec<f32>,
    frame_timer: FrameTimer,
}

impl OceanSimulation {
    /// Create a new ocean simulation
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation configuration, validated here
    /// * `preference` - Backend choice
    ///
    /// # Errors
    ///
    /// Returns the configuration error if `config` is invalid, or any error of
    /// backend construction.
    pub fn new(config: OceanConfig, preference: BackendPreference) -> Result<Self> {
        info!("Creating ocean simulation");
        config.validate()?;

        let grid = SimulationGrid::new(config.map_size)?;
        let table = ButterflyTable::build(config.map_size)?;
        let solver = Self::build_backend(&config, preference, &grid, &table)?;

        info!(
            "Ocean simulation initialized: {}x{} grid, domain={:.1}m, wind={:.1}m/s, GPU={}",
            grid.size(),
            grid.size(),
            config.domain_size(),
            config.wind_speed,
            solver.is_gpu_accelerated()
        );

        Ok(Self {
            config,
            preference,
            grid,
            table,
            solver: Some(solver),
            capture: ReflectionCapture::new(config.capture),
            needs_reinit: false,
            time: 0.0,
            frame: 0,
            generation: 1,
            height_cache: Vec::new(),
            frame_timer: FrameTimer::new(),
        })
    }

    fn build_backend(
        config: &OceanConfig,
        preference: BackendPreference,
        grid: &SimulationGrid,
        table: &ButterflyTable,
    ) -> Result<Box<dyn OceanSolver>> {
        let mut solver = create_ocean_solver(config, preference, table)?;
        let spectrum = InitialSpectrum::generate(grid, &SpectrumParams::from_config(config))?;
        solver.upload_spectrum(&spectrum)?;
        Ok(solver)
    }

    fn regenerate_spectrum(&mut self) -> Result<()> {
        let solver = self.solver.as_mut().ok_or(OceanError::Disabled)?;
        let params = SpectrumParams::from_config(&self.config);
        let spectrum = InitialSpectrum::generate(&self.grid, &params)?;
        solver.upload_spectrum(&spectrum)?;
        self.needs_reinit = false;
        info!(
            "Regenerated initial spectrum: wind={:.1}m/s, largest wave={:.1}m",
            params.wind_speed,
            params.largest_wave()
        );
        Ok(())
    }

    /// Advance the ocean by one frame
    ///
    /// # Arguments
    ///
    /// * `dt` - Frame time in seconds
    /// * `viewer` - Active camera, `None` skips the captures
    /// * `water` - Water plane used for the captures
    /// * `renderer` - Scene renderer drawing the captures
    ///
    /// # Returns
    ///
    /// The frame's published fields, shading parameters and capture targets
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` while disabled,
    /// `OceanError::InvalidParameter` for a negative or non-finite `dt`, or any
    /// backend error.
    pub fn update(
        &mut self,
        dt: f32,
        viewer: Option<&ViewerCamera>,
        water: &WaterPlane,
        renderer: &mut dyn SceneRenderer,
    ) -> Result<FrameOutput> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(OceanError::InvalidParameter {
                name: "dt",
                message: format!("must be finite and non-negative, got {dt}"),
            });
        }
        if self.solver.is_none() {
            return Err(OceanError::Disabled);
        }
        let frame_start = Instant::now();

        if self.needs_reinit {
            let _scope = ProfilerScope::new("reinit");
            self.regenerate_spectrum()?;
        }

        let captures = {
            let _scope = ProfilerScope::new("capture");
            if *self.capture.config() != self.config.capture {
                self.capture.reconfigure(self.config.capture, renderer);
            }
            self.capture.capture(viewer, water, renderer)?
        };

        let next_time = self.time + dt * self.config.speed;
        if next_time.is_finite() {
            self.time = next_time;
        } else {
            warn!(
                "Non-finite simulated time (speed={}), holding t={:.3}s",
                self.config.speed, self.time
            );
        }
        let solver = self.solver.as_mut().ok_or(OceanError::Disabled)?;

        {
            let _scope = ProfilerScope::new("evolve");
            solver.evolve(self.time, self.config.domain_size(), self.config.gravity)?;
        }

        for component in SpectralComponent::ALL {
            let _scope = ProfilerScope::new("transform");
            solver.transform(component)?;
        }

        {
            let _scope = ProfilerScope::new("normal_foam");
            solver.derive_surface(&FoamParams {
                tile_size: self.config.tile_size,
                delta_time: dt,
                up_speed: self.config.foam_up_speed,
                down_speed: self.config.foam_down_speed,
                threshold: self.config.foam_threshold,
            })?;
        }

        let output = {
            let _scope = ProfilerScope::new("publish");
            self.frame += 1;
            FrameOutput {
                frame: self.frame,
                time: self.time,
                bindings: SurfaceBindings::new(self.generation, self.grid.map_size()),
                shading: ShadingParams::from_config(&self.config),
                reflection: captures.reflection,
                refraction: captures.refraction,
                debug_views: self.config.debug_views,
            }
        };

        self.frame_timer
            .record(frame_start.elapsed().as_secs_f64() * 1000.0);
        debug!(
            "Ocean frame {}: t={:.3}s, dt={:.4}s, {:.2}ms",
            self.frame,
            self.time,
            dt,
            self.frame_timer.last_frame_time_ms()
        );
        Ok(output)
    }

    /// Regenerate H0 at the start of the next frame
    pub fn request_reinit(&mut self) {
        self.needs_reinit = true;
    }

    /// Apply one control panel edit
    ///
    /// Wind changes regenerate the spectrum on the next frame; capture toggles
    /// take effect on the next capture.
    pub fn apply(&mut self, change: ParameterChange) {
        if self.config.apply(change) {
            debug!("Parameter change {:?} requires spectrum regeneration", change);
            self.request_reinit();
        }
        if !self.config.height_readback {
            self.height_cache.clear();
        }
    }

    /// Change the grid resolution
    ///
    /// Reallocates every field under a new generation. Foam history and the
    /// height cache start over.
    ///
    /// # Errors
    ///
    /// Returns `OceanError::InvalidMapSize` for a bad size, or any backend
    /// error. On error the previous configuration stays in effect.
    pub fn resize(&mut self, map_size: u32) -> Result<()> {
        let config = OceanConfig {
            map_size,
            ..self.config
        };
        config.validate()?;
        let grid = SimulationGrid::new(map_size)?;
        let table = ButterflyTable::build(map_size)?;

        if let Some(mut old) = self.solver.take() {
            old.release();
            match Self::build_backend(&config, self.preference, &grid, &table) {
                Ok(solver) => self.solver = Some(solver),
                Err(e) => {
                    // Keep running at the old size
                    let previous = Self::build_backend(
                        &self.config,
                        self.preference,
                        &self.grid,
                        &self.table,
                    )?;
                    self.solver = Some(previous);
                    self.generation += 1;
                    return Err(e);
                }
            }
        }

        info!("Resized ocean grid: {} -> {}", self.config.map_size, map_size);
        self.config = config;
        self.grid = grid;
        self.table = table;
        self.generation += 1;
        self.needs_reinit = false;
        self.height_cache.clear();
        Ok(())
    }

    /// Rebuild every resource after [`OceanSimulation::disable`]
    ///
    /// Does nothing if already enabled.
    ///
    /// # Errors
    ///
    /// Returns any backend construction error.
    pub fn enable(&mut self) -> Result<()> {
        if self.solver.is_some() {
            return Ok(());
        }
        let solver = Self::build_backend(&self.config, self.preference, &self.grid, &self.table)?;
        self.solver = Some(solver);
        self.generation += 1;
        self.needs_reinit = false;
        info!("Ocean simulation enabled (generation {})", self.generation);
        Ok(())
    }

    /// Drop the capture rig of a viewer that no longer renders
    ///
    /// # Returns
    ///
    /// Number of cameras released
    pub fn forget_viewer(&mut self, viewer: ViewerId) -> usize {
        self.capture.forget_viewer(viewer)
    }

    /// Free every backend field and capture resource
    ///
    /// # Returns
    ///
    /// Number of resources released
    pub fn disable(&mut self, renderer: &mut dyn SceneRenderer) -> usize {
        let fields = self.solver.take().map_or(0, |mut solver| solver.release());
        let captures = self.capture.release(renderer);
        self.height_cache.clear();
        info!(
            "Ocean simulation disabled: released {} fields and {} capture resources",
            fields, captures
        );
        fields + captures
    }

    /// Whether resources are allocated
    pub fn is_enabled(&self) -> bool {
        self.solver.is_some()
    }

    /// Copy the height field to the host for [`OceanSimulation::height_at`]
    ///
    /// This blocks until the backend has finished the frame. Does nothing
    /// unless `height_readback` is enabled.
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` while disabled, or the readback error.
    pub fn sync_readback(&mut self) -> Result<()> {
        if !self.config.height_readback {
            return Ok(());
        }
        let solver = self.solver.as_ref().ok_or(OceanError::Disabled)?;
        let _scope = ProfilerScope::new("readback");
        let heights = solver.read_field(SurfaceField::Height)?;
        self.height_cache.clear();
        self.height_cache.extend_from_slice(&heights);
        Ok(())
    }

    /// Water height under a world position
    ///
    /// Looks up the last read back height at column `floor(x/tile) mod N`,
    /// row `floor(z/tile) mod N`. Choppy displacement is not accounted for.
    /// Negative coordinates wrap around the period instead of mirroring, so
    /// `x = -tile` reads column `N - 1`.
    ///
    /// # Returns
    ///
    /// Height in world units, `0.0` when readback is off or nothing was read
    /// back yet
    pub fn height_at(&self, position: &Vector3<f32>) -> f32 {
        if !self.config.height_readback || self.height_cache.is_empty() {
            return 0.0;
        }
        if !position.x.is_finite() || !position.z.is_finite() {
            return 0.0;
        }
        let n = self.grid.size() as i64;
        let column = ((position.x / self.config.tile_size).floor() as i64).rem_euclid(n);
        let row = ((position.z / self.config.tile_size).floor() as i64).rem_euclid(n);
        self.height_cache
            .get(self.grid.index(column as usize, row as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Read one published field in row-major order
    ///
    /// # Errors
    ///
    /// Returns `OceanError::Disabled` while disabled, or the readback error.
    pub fn read_field(&self, field: SurfaceField) -> Result<Cow<'_, [f32]>> {
        self.solver
            .as_ref()
            .ok_or(OceanError::Disabled)?
            .read_field(field)
    }

    /// Backend fields plus capture cameras and targets currently held
    pub fn live_allocations(&self) -> usize {
        self.solver
            .as_ref()
            .map_or(0, |solver| solver.live_allocations())
            + self.capture.live_allocations()
    }

    /// Current configuration
    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    /// Backend solver, `None` while disabled
    pub fn solver(&self) -> Option<&dyn OceanSolver> {
        self.solver.as_deref()
    }

    /// Reflection/refraction capture state
    pub fn capture(&self) -> &ReflectionCapture {
        &self.capture
    }

    /// Current grid
    pub fn grid(&self) -> SimulationGrid {
        self.grid
    }

    /// Simulated time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Frames simulated so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Allocation generation of the published fields
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether H0 will be regenerated on the next frame
    pub fn reinit_pending(&self) -> bool {
        self.needs_reinit
    }

    /// Frame timing
    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }
}
