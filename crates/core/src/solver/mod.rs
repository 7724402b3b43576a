//! Ocean solver backends
//!
//! This module provides a unified GPU/CPU abstraction for the per-frame FFT
//! pipeline. The core abstraction is the `OceanSolver` trait, which has both
//! CPU and GPU implementations.
//!
//! # Feature Flags
//!
//! - `gpu` (default): Enables GPU acceleration via wgpu. Disable with
//!   `--no-default-features` for environments without GPU access.
//!
//! # Backend Selection
//!
//! With [`BackendPreference::Auto`] the best available backend is chosen:
//! 1. Try GPU (if `gpu` feature enabled and hardware available)
//! 2. Fall back to CPU (always available), in the configured storage layout
//!
//! # Example
//!
//! ```rust,ignore
//! use ocean_sim_core::solver::{create_ocean_solver, BackendPreference};
//! use ocean_sim_core::{ButterflyTable, OceanConfig};
//!
//! let config = OceanConfig::default();
//! let table = ButterflyTable::build(config.map_size)?;
//! let solver = create_ocean_solver(&config, BackendPreference::Auto, &table)?;
//! ```

mod context;
mod cpu;
pub mod profiler;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

#[cfg(feature = "gpu")]
mod gpu;

// Re-exports
pub use context::GpuInitResult;
pub use cpu::CpuOceanSolver;
pub use profiler::{FrameTimer, ProfilerScope};
pub use r#trait::{OceanSolver, SpectralComponent};

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use gpu::GpuOceanSolver;

use crate::config::OceanConfig;
use crate::error::{OceanError, Result};
use crate::field::{LayoutKind, Linear, Tiled};
use crate::grid::SimulationGrid;
use crate::spectrum::ButterflyTable;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(feature = "gpu")]
use tracing::warn;

/// Which backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendPreference {
    /// GPU when available, CPU otherwise
    #[default]
    Auto,
    /// Always the CPU backend
    Cpu,
    /// GPU or fail
    Gpu,
}

fn create_cpu_solver(
    config: &OceanConfig,
    grid: SimulationGrid,
    table: &ButterflyTable,
) -> Result<Box<dyn OceanSolver>> {
    info!(
        "Using CPU backend ({} storage, {}x{} grid)",
        match config.storage_layout {
            LayoutKind::Linear => "linear",
            LayoutKind::Tiled => "tiled",
        },
        grid.size(),
        grid.size()
    );
    Ok(match config.storage_layout {
        LayoutKind::Linear => Box::new(CpuOceanSolver::<Linear>::new(grid, table)?),
        LayoutKind::Tiled => Box::new(CpuOceanSolver::<Tiled>::new(grid, table)?),
    })
}

/// Create an ocean solver for `config.map_size`
///
/// # Arguments
///
/// * `config` - Validated configuration (grid size and CPU storage layout)
/// * `preference` - Backend choice
/// * `table` - Butterfly table built for the same grid
///
/// # Returns
///
/// A boxed `OceanSolver` trait object
///
/// # Errors
///
/// Returns `OceanError::InvalidMapSize` for a bad grid, `OceanError::GpuUnavailable`
/// if the GPU was required but cannot be used, or any allocation error of the
/// chosen backend.
pub fn create_ocean_solver(
    config: &OceanConfig,
    preference: BackendPreference,
    table: &ButterflyTable,
) -> Result<Box<dyn OceanSolver>> {
    let grid = SimulationGrid::new(config.map_size)?;

    if preference == BackendPreference::Cpu {
        return create_cpu_solver(config, grid, table);
    }

    #[cfg(feature = "gpu")]
    {
        let required = preference == BackendPreference::Gpu;
        match GpuContext::new() {
            GpuInitResult::Success(gpu_context) => {
                if gpu_context.can_allocate(grid.map_size()) {
                    info!(
                        "Using GPU backend: {} ({}x{} grid)",
                        gpu_context.adapter_name(),
                        grid.size(),
                        grid.size()
                    );
                    match GpuOceanSolver::new(gpu_context, grid, table) {
                        Ok(solver) => return Ok(Box::new(solver)),
                        Err(e) if !required => {
                            warn!("GPU solver creation failed: {}. Falling back to CPU.", e);
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    if required {
                        return Err(OceanError::GpuUnavailable(format!(
                            "insufficient memory for {0}x{0} grid",
                            grid.size()
                        )));
                    }
                    warn!(
                        "GPU has insufficient memory for {}x{} grid, falling back to CPU",
                        grid.size(),
                        grid.size()
                    );
                }
            }
            GpuInitResult::NoGpuFound => {
                if required {
                    return Err(OceanError::GpuUnavailable("no GPU adapter found".to_string()));
                }
                info!("No GPU found, using CPU backend");
            }
            GpuInitResult::InitFailed {
                adapter_name,
                error,
            } => {
                if required {
                    return Err(OceanError::GpuUnavailable(format!(
                        "'{adapter_name}' failed to initialize: {error}"
                    )));
                }
                warn!(
                    "GPU '{}' found but failed to initialize: {}. Falling back to CPU.",
                    adapter_name, error
                );
            }
        }
    }

    #[cfg(not(feature = "gpu"))]
    {
        if preference == BackendPreference::Gpu {
            return Err(OceanError::GpuUnavailable(
                "built without the gpu feature".to_string(),
            ));
        }
        info!("GPU feature disabled, using CPU backend");
    }

    create_cpu_solver(config, grid, table)
}
