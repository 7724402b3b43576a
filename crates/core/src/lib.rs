//! Ocean Simulation Core Library
//!
//! A real-time ocean surface simulation after Tessendorf's statistical FFT
//! method. A Phillips spectrum seeded from wind parameters is evolved every
//! frame, transformed to height and choppy displacement maps with a radix-2
//! inverse FFT, and turned into normals and persistent foam. Planar reflection
//! and refraction views are captured for the water material.
//!
//! ## Pipeline
//!
//! - `spectrum`: butterfly table, initial Phillips spectrum, time evolution
//! - `fft`: separable 2D inverse FFT over any field storage
//! - `surface`: normals, Jacobian and foam
//! - `capture`: mirrored reflection and clipped refraction cameras
//! - `solver`: CPU (Rayon) and GPU (wgpu) backends
//! - `simulation`: the per-frame driver tying everything together

// Configuration and shared types
pub mod config;
pub mod error;
pub mod field;
pub mod grid;

// Pipeline stages
pub mod capture;
pub mod fft;
pub mod publish;
pub mod spectrum;
pub mod surface;

// Backends and orchestration
pub mod simulation;
pub mod solver;

// Re-export configuration
pub use config::{
    CaptureConfig, Color, DebugView, DebugViews, OceanConfig, ParameterChange, ShadingConfig,
};
pub use error::{OceanError, Result};
pub use field::{Field2D, LayoutKind, Linear, LinearField, StorageLayout, Tiled, TiledField};
pub use grid::SimulationGrid;

// Re-export pipeline types
pub use capture::{
    CameraSettings, CaptureKind, HeadlessRenderer, ReflectionCapture, RenderTargetId,
    SceneRenderer, ViewerCamera, ViewerId, WaterPlane,
};
pub use publish::{FrameOutput, ShadingParams, SurfaceBindings, SurfaceField};
pub use spectrum::{ButterflyTable, InitialSpectrum, SpectrumParams};
pub use surface::FoamParams;

// Re-export backends and the driver
pub use simulation::OceanSimulation;
pub use solver::{create_ocean_solver, BackendPreference, OceanSolver, SpectralComponent};
