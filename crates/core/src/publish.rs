//! Per-frame hand-off to the rendering collaborator
//!
//! Each frame produces one immutable [`FrameOutput`]. Field handles stay the
//! same from frame to frame for as long as the backing allocation lives, so a
//! material binds them once and only rebinds when the generation changes
//! (resize or disable/enable).

use crate::capture::RenderTargetId;
use crate::config::{Color, DebugViews, OceanConfig};
use serde::{Deserialize, Serialize};

/// Fields published every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceField {
    /// Vertical displacement
    Height,
    /// Horizontal displacement along x
    DisplacementX,
    /// Horizontal displacement along y
    DisplacementY,
    /// Surface normal (x, y), z reconstructed
    Normal,
    /// Foam intensity in `[0, 1]`
    Foam,
}

impl SurfaceField {
    /// Every published field
    pub const ALL: [SurfaceField; 5] = [
        SurfaceField::Height,
        SurfaceField::DisplacementX,
        SurfaceField::DisplacementY,
        SurfaceField::Normal,
        SurfaceField::Foam,
    ];

    /// Floats per texel
    pub fn components(self) -> usize {
        match self {
            SurfaceField::Normal => 2,
            _ => 1,
        }
    }
}

/// Stable identity of one published field allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldHandle {
    /// Allocation generation, bumped on every reallocation
    pub generation: u32,
    /// Which field
    pub field: SurfaceField,
}

/// Handles of every published field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceBindings {
    /// Grid side of every field
    pub map_size: u32,
    /// Height field
    pub height: FieldHandle,
    /// X displacement
    pub displacement_x: FieldHandle,
    /// Y displacement
    pub displacement_y: FieldHandle,
    /// Normal field
    pub normal: FieldHandle,
    /// Foam field
    pub foam: FieldHandle,
}

impl SurfaceBindings {
    /// Bindings for one allocation generation
    pub fn new(generation: u32, map_size: u32) -> Self {
        let handle = |field| FieldHandle { generation, field };
        Self {
            map_size,
            height: handle(SurfaceField::Height),
            displacement_x: handle(SurfaceField::DisplacementX),
            displacement_y: handle(SurfaceField::DisplacementY),
            normal: handle(SurfaceField::Normal),
            foam: handle(SurfaceField::Foam),
        }
    }

    /// Allocation generation shared by every handle
    pub fn generation(&self) -> u32 {
        self.height.generation
    }
}

/// Shading values handed to the surface material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadingParams {
    /// Water tint
    pub water_color: Color,
    /// Directional light color
    pub light_color: Color,
    /// Specular exponent
    pub specularity: f32,
    /// Fresnel exponent
    pub fresnel_power: f32,
    /// Foam texture scale
    pub foam_size: f32,
    /// World to texture scale, `1/tile_size`
    pub sample_scale: f32,
    /// Grid side in texels
    pub map_size: u32,
}

impl ShadingParams {
    /// Snapshot the shading inputs of a configuration
    pub fn from_config(config: &OceanConfig) -> Self {
        Self {
            water_color: config.shading.water_color,
            light_color: config.shading.light_color,
            specularity: config.shading.specularity,
            fresnel_power: config.shading.fresnel_power,
            foam_size: config.shading.foam_size,
            sample_scale: config.sample_scale(),
            map_size: config.map_size,
        }
    }
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    /// Frame counter since construction
    pub frame: u64,
    /// Simulated time in seconds
    pub time: f32,
    /// Field handles to bind
    pub bindings: SurfaceBindings,
    /// Material parameters
    pub shading: ShadingParams,
    /// Latest reflection capture, if any was ever rendered
    pub reflection: Option<RenderTargetId>,
    /// Latest refraction capture, if any was ever rendered
    pub refraction: Option<RenderTargetId>,
    /// Debug views the overlay should show
    pub debug_views: DebugViews,
}
