//! Ocean configuration and parameter updates
//!
//! [`OceanConfig`] carries everything the pipeline needs at construction.
//! Runtime edits arrive as [`ParameterChange`] values, which clamp to the
//! ranges the control panel exposes and flag a spectrum rebuild when needed.

use crate::error::{OceanError, Result};
use crate::field::LayoutKind;
use crate::grid::SimulationGrid;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Largest mesh tile resolution (vertex index range of a tile)
pub const MAX_MESH_SIZE: u32 = 255;

/// Render layer occupied by the water surface itself
pub const WATER_LAYER: u32 = 4;

/// Linear RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub r: f32,
    /// Green channel
    pub g: f32,
    /// Blue channel
    pub b: f32,
    /// Alpha channel
    pub a: f32,
}

impl Color {
    /// Create a color from its channels
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Clamp every channel to `[0, 1]`
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }

    /// Channels as an array
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Surface shading inputs handed to the material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadingConfig {
    /// Deep water tint
    pub water_color: Color,
    /// Directional light color
    pub light_color: Color,
    /// Specular exponent, 8 to 512
    pub specularity: f32,
    /// Foam texture scale, 0.1 to 10
    pub foam_size: f32,
    /// Fresnel exponent, 1 to 100
    pub fresnel_power: f32,
}

impl Default for ShadingConfig {
    fn default() -> Self {
        Self {
            water_color: Color::new(0.0, 0.17, 0.34, 1.0),
            light_color: Color::new(0.5, 0.4, 0.3, 1.0),
            specularity: 128.0,
            foam_size: 4.0,
            fresnel_power: 20.0,
        }
    }
}

/// Planar reflection/refraction capture settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Render the mirrored reflection view
    pub reflection: bool,
    /// Render the clipped refraction view
    pub refraction: bool,
    /// Off-screen target width in pixels
    pub target_width: u32,
    /// Off-screen target height in pixels
    pub target_height: u32,
    /// Clip plane pushed this far along the water normal
    pub clip_plane_offset: f32,
    /// Layers the auxiliary cameras may draw (the water layer is always removed)
    pub render_layers: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reflection: true,
            refraction: true,
            target_width: 1024,
            target_height: 1024,
            clip_plane_offset: 0.07,
            render_layers: u32::MAX,
        }
    }
}

impl CaptureConfig {
    /// Culling mask for auxiliary cameras
    pub fn culling_mask(&self) -> u32 {
        self.render_layers & !(1 << WATER_LAYER)
    }
}

/// Intermediate fields that can be selected for on-screen display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugView {
    /// Spatial height field
    Height,
    /// Normal field
    Normal,
    /// Reflection capture target
    Reflection,
    /// Refraction capture target
    Refraction,
    /// X displacement
    DisplacementX,
    /// Y displacement
    DisplacementY,
    /// Foam intensity
    Foam,
}

impl DebugView {
    /// Every view in display order
    pub const ALL: [DebugView; 7] = [
        DebugView::Height,
        DebugView::Normal,
        DebugView::Reflection,
        DebugView::Refraction,
        DebugView::DisplacementX,
        DebugView::DisplacementY,
        DebugView::Foam,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of enabled debug views (informational, never affects the simulation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebugViews(u8);

impl DebugViews {
    /// Enable or disable one view
    pub fn set(&mut self, view: DebugView, enabled: bool) {
        if enabled {
            self.0 |= view.bit();
        } else {
            self.0 &= !view.bit();
        }
    }

    /// Whether `view` is enabled
    pub fn contains(&self, view: DebugView) -> bool {
        self.0 & view.bit() != 0
    }

    /// Enabled views in display order
    pub fn iter(&self) -> impl Iterator<Item = DebugView> + '_ {
        DebugView::ALL.into_iter().filter(|v| self.contains(*v))
    }

    /// Whether no view is enabled
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Full ocean configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OceanConfig {
    /// FFT grid side (power of two, 32 to 1024)
    pub map_size: u32,
    /// Vertices per mesh tile side (at most 255)
    pub mesh_size: u32,
    /// World units per mesh quad
    pub tile_size: f32,
    /// Mesh tiles per axis
    pub sea_size: u32,
    /// Wind speed in m/s, 0 to 32
    pub wind_speed: f32,
    /// Wind heading in degrees, 0 = +x
    pub wind_direction_degrees: f32,
    /// Phillips spectrum constant
    pub wave_amplitude: f32,
    /// Gravitational acceleration in m/s²
    pub gravity: f32,
    /// Time multiplier, 0.5 to 2
    pub speed: f32,
    /// Seed for the spectrum's Gaussian draws
    pub seed: u64,
    /// Foam growth per second where water folds, 0 to 10
    pub foam_up_speed: f32,
    /// Foam decay per second elsewhere, 0 to 10
    pub foam_down_speed: f32,
    /// Convergence (1 − Jacobian) above which foam grows
    pub foam_threshold: f32,
    /// CPU storage layout for every field
    pub storage_layout: LayoutKind,
    /// Keep a host copy of the height field for `height_at` queries
    pub height_readback: bool,
    /// Surface shading inputs
    pub shading: ShadingConfig,
    /// Reflection/refraction capture
    pub capture: CaptureConfig,
    /// Debug views to display
    pub debug_views: DebugViews,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            map_size: 1024,
            mesh_size: 128,
            tile_size: 8.0,
            sea_size: 8,
            wind_speed: 16.0,
            wind_direction_degrees: 0.0,
            wave_amplitude: 5e-4,
            gravity: 9.81,
            speed: 1.0,
            seed: 42,
            foam_up_speed: 1.0,
            foam_down_speed: 1.0,
            foam_threshold: 0.3,
            storage_layout: LayoutKind::Linear,
            height_readback: false,
            shading: ShadingConfig::default(),
            capture: CaptureConfig::default(),
            debug_views: DebugViews::default(),
        }
    }
}

fn check_finite(name: &'static str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(OceanError::InvalidParameter {
            name,
            message: format!("must be finite, got {value}"),
        })
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<()> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(OceanError::InvalidParameter {
            name,
            message: format!("must be non-negative, got {value}"),
        });
    }
    Ok(())
}

impl OceanConfig {
    /// Check every value against its domain
    ///
    /// # Errors
    ///
    /// Returns the first `OceanError` found: `InvalidMapSize` for a bad grid,
    /// `InvalidParameter` for anything else.
    pub fn validate(&self) -> Result<()> {
        SimulationGrid::new(self.map_size)?;

        if self.mesh_size == 0 || self.mesh_size > MAX_MESH_SIZE {
            return Err(OceanError::InvalidParameter {
                name: "mesh_size",
                message: format!("must be in 1..={MAX_MESH_SIZE}, got {}", self.mesh_size),
            });
        }
        check_finite("tile_size", self.tile_size)?;
        if self.tile_size <= 0.0 {
            return Err(OceanError::InvalidParameter {
                name: "tile_size",
                message: format!("must be positive, got {}", self.tile_size),
            });
        }
        check_non_negative("wind_speed", self.wind_speed)?;
        check_finite("wind_direction_degrees", self.wind_direction_degrees)?;
        check_non_negative("wave_amplitude", self.wave_amplitude)?;
        check_finite("gravity", self.gravity)?;
        if self.gravity <= 0.0 {
            return Err(OceanError::InvalidParameter {
                name: "gravity",
                message: format!("must be positive, got {}", self.gravity),
            });
        }
        check_non_negative("speed", self.speed)?;
        check_non_negative("foam_up_speed", self.foam_up_speed)?;
        check_non_negative("foam_down_speed", self.foam_down_speed)?;
        check_finite("foam_threshold", self.foam_threshold)?;

        if self.capture.target_width == 0 || self.capture.target_height == 0 {
            return Err(OceanError::InvalidParameter {
                name: "capture",
                message: "render target must have a non-zero size".to_string(),
            });
        }
        check_finite("clip_plane_offset", self.capture.clip_plane_offset)?;
        Ok(())
    }

    /// Physical extent of one FFT period in meters
    pub fn domain_size(&self) -> f32 {
        self.mesh_size as f32 * self.tile_size
    }

    /// Texture sampling scale handed to the shader
    pub fn sample_scale(&self) -> f32 {
        1.0 / self.tile_size
    }

    /// Apply one runtime parameter edit
    ///
    /// Values are clamped to the control panel's ranges. Non-finite values are
    /// dropped and leave the configuration untouched.
    ///
    /// # Returns
    ///
    /// `true` if the change requires regenerating the initial spectrum
    pub fn apply(&mut self, change: ParameterChange) -> bool {
        if !change.is_finite() {
            warn!("Ignoring non-finite parameter change {:?}", change);
            return false;
        }
        match change {
            ParameterChange::WindSpeed(v) => {
                self.wind_speed = v.clamp(0.0, 32.0);
                return true;
            }
            ParameterChange::WaveSpeed(v) => self.speed = v.clamp(0.5, 2.0),
            ParameterChange::WaterColor(c) => self.shading.water_color = c.clamped(),
            ParameterChange::LightColor(c) => self.shading.light_color = c.clamped(),
            ParameterChange::FoamUpSpeed(v) => self.foam_up_speed = v.clamp(0.0, 10.0),
            ParameterChange::FoamDownSpeed(v) => self.foam_down_speed = v.clamp(0.0, 10.0),
            ParameterChange::Specularity(v) => self.shading.specularity = v.clamp(8.0, 512.0),
            ParameterChange::FoamSize(v) => self.shading.foam_size = v.clamp(0.1, 10.0),
            ParameterChange::FresnelPower(v) => self.shading.fresnel_power = v.clamp(1.0, 100.0),
            ParameterChange::Reflection(on) => self.capture.reflection = on,
            ParameterChange::Refraction(on) => self.capture.refraction = on,
            ParameterChange::DebugView(view, on) => self.debug_views.set(view, on),
            ParameterChange::HeightReadback(on) => self.height_readback = on,
        }
        false
    }
}

/// One edit coming from the control panel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterChange {
    /// Wind speed in m/s (rebuilds the spectrum)
    WindSpeed(f32),
    /// Time multiplier
    WaveSpeed(f32),
    /// Water tint
    WaterColor(Color),
    /// Light color
    LightColor(Color),
    /// Foam growth rate
    FoamUpSpeed(f32),
    /// Foam decay rate
    FoamDownSpeed(f32),
    /// Specular exponent
    Specularity(f32),
    /// Foam texture scale
    FoamSize(f32),
    /// Fresnel exponent
    FresnelPower(f32),
    /// Toggle the reflection capture
    Reflection(bool),
    /// Toggle the refraction capture
    Refraction(bool),
    /// Toggle one debug view
    DebugView(DebugView, bool),
    /// Toggle the height readback path
    HeightReadback(bool),
}

impl ParameterChange {
    /// Whether every number carried by the edit is finite
    pub fn is_finite(&self) -> bool {
        match *self {
            ParameterChange::WindSpeed(v)
            | ParameterChange::WaveSpeed(v)
            | ParameterChange::FoamUpSpeed(v)
            | ParameterChange::FoamDownSpeed(v)
            | ParameterChange::Specularity(v)
            | ParameterChange::FoamSize(v)
            | ParameterChange::FresnelPower(v) => v.is_finite(),
            ParameterChange::WaterColor(c) | ParameterChange::LightColor(c) => {
                c.to_array().iter().all(|v| v.is_finite())
            }
            ParameterChange::Reflection(_)
            | ParameterChange::Refraction(_)
            | ParameterChange::DebugView(..)
            | ParameterChange::HeightReadback(_) => true,
        }
    }
}
