//! Planar reflection and refraction captures
//!
//! For every distinct viewer the capture keeps one mirrored reflection camera
//! and one refraction camera, created the first time the viewer is seen. Each
//! frame both are re-derived from the viewer and the water plane, given an
//! oblique near plane at the water surface, and drawn by the external
//! [`SceneRenderer`] into two shared off-screen targets.
//!
//! Cameras and targets are owned here and are only freed through
//! [`ReflectionCapture::release`].

pub mod projection;

pub use projection::{camera_space_plane, oblique_projection, reflection_matrix, Plane};

use crate::config::{CaptureConfig, Color};
use crate::error::Result;
use nalgebra::{Matrix4, Point3, Vector3};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity of a viewing camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerId(pub u64);

/// Identity of an off-screen color target owned by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTargetId(pub u64);

/// How a camera clears its target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClearMode {
    /// Draw the sky
    Skybox,
    /// Clear to a color
    SolidColor(Color),
    /// Clear depth only
    DepthOnly,
    /// Keep previous contents
    Nothing,
}

/// Lens and clear settings copied from the viewer every frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Clear behaviour
    pub clear: ClearMode,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Width over height
    pub aspect: f32,
    /// Orthographic instead of perspective
    pub orthographic: bool,
    /// Half height of the orthographic view volume
    pub orthographic_size: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            clear: ClearMode::Skybox,
            near: 0.3,
            far: 1000.0,
            fov_degrees: 60.0,
            aspect: 16.0 / 9.0,
            orthographic: false,
            orthographic_size: 5.0,
        }
    }
}

/// The camera currently looking at the ocean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerCamera {
    /// Stable viewer identity
    pub id: ViewerId,
    /// World position
    pub position: Vector3<f32>,
    /// Euler angles in degrees
    pub euler_degrees: Vector3<f32>,
    /// View matrix
    pub world_to_camera: Matrix4<f32>,
    /// Projection matrix
    pub projection: Matrix4<f32>,
    /// Lens and clear settings
    pub settings: CameraSettings,
}

impl ViewerCamera {
    /// Perspective viewer at `eye` looking at `target`
    pub fn looking_at(
        id: ViewerId,
        eye: Point3<f32>,
        target: Point3<f32>,
        settings: CameraSettings,
    ) -> Self {
        let world_to_camera = Matrix4::look_at_rh(&eye, &target, &Vector3::y());
        let projection = Matrix4::new_perspective(
            settings.aspect,
            settings.fov_degrees.to_radians(),
            settings.near,
            settings.far,
        );
        let forward = (target - eye).normalize();
        let pitch = (-forward.y).asin().to_degrees();
        let yaw = forward.x.atan2(forward.z).to_degrees();
        Self {
            id,
            position: eye.coords,
            euler_degrees: Vector3::new(pitch, yaw, 0.0),
            world_to_camera,
            projection,
            settings,
        }
    }
}

/// Which auxiliary view a camera renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureKind {
    /// Mirror image above the water
    Reflection,
    /// Straight view below the water
    Refraction,
}

/// Camera state owned by a capture rig
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxiliaryCamera {
    /// Reflection or refraction
    pub kind: CaptureKind,
    /// World position
    pub position: Vector3<f32>,
    /// Euler angles in degrees
    pub euler_degrees: Vector3<f32>,
    /// View matrix
    pub world_to_camera: Matrix4<f32>,
    /// Projection with the oblique near plane
    pub projection: Matrix4<f32>,
    /// Settings copied from the viewer
    pub settings: CameraSettings,
    /// Render layers drawn
    pub culling_mask: u32,
    /// Mirrored views flip triangle winding
    pub invert_culling: bool,
}

impl AuxiliaryCamera {
    fn new(kind: CaptureKind) -> Self {
        Self {
            kind,
            position: Vector3::zeros(),
            euler_degrees: Vector3::zeros(),
            world_to_camera: Matrix4::identity(),
            projection: Matrix4::identity(),
            settings: CameraSettings::default(),
            culling_mask: 0,
            invert_culling: kind == CaptureKind::Reflection,
        }
    }
}

/// Pair of auxiliary cameras for one viewer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureRig {
    /// Mirrored camera, created on first reflection capture
    pub reflection: Option<AuxiliaryCamera>,
    /// Refraction camera, created on first refraction capture
    pub refraction: Option<AuxiliaryCamera>,
}

impl CaptureRig {
    fn camera_count(&self) -> usize {
        usize::from(self.reflection.is_some()) + usize::from(self.refraction.is_some())
    }
}

/// The water surface plane in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterPlane {
    /// Any point on the water
    pub position: Vector3<f32>,
    /// Upward surface normal
    pub normal: Vector3<f32>,
}

impl Default for WaterPlane {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            normal: Vector3::y(),
        }
    }
}

/// External renderer that owns GPU targets and draws the scene
pub trait SceneRenderer {
    /// Allocate a color target
    ///
    /// # Errors
    ///
    /// Returns `OceanError::ResourceAllocation` if the target cannot be created
    fn create_target(
        &mut self,
        kind: CaptureKind,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetId>;

    /// Free a target created by [`SceneRenderer::create_target`]
    fn release_target(&mut self, target: RenderTargetId);

    /// Draw the scene from `camera` into `target`
    fn render(&mut self, camera: &AuxiliaryCamera, target: RenderTargetId);
}

/// Renderer that draws nothing and only keeps track of its targets
///
/// Used headless and in tests.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_id: u64,
    live: FxHashSet<RenderTargetId>,
    renders: Vec<(CaptureKind, RenderTargetId)>,
}

impl HeadlessRenderer {
    /// Create an empty renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets currently allocated
    pub fn live_targets(&self) -> usize {
        self.live.len()
    }

    /// Every render call so far, in order
    pub fn renders(&self) -> &[(CaptureKind, RenderTargetId)] {
        &self.renders
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn create_target(
        &mut self,
        _kind: CaptureKind,
        _width: u32,
        _height: u32,
    ) -> Result<RenderTargetId> {
        self.next_id += 1;
        let id = RenderTargetId(self.next_id);
        self.live.insert(id);
        Ok(id)
    }

    fn release_target(&mut self, target: RenderTargetId) {
        self.live.remove(&target);
    }

    fn render(&mut self, camera: &AuxiliaryCamera, target: RenderTargetId) {
        self.renders.push((camera.kind, target));
    }
}

/// Targets produced by a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOutput {
    /// Reflection target, if enabled
    pub reflection: Option<RenderTargetId>,
    /// Refraction target, if enabled
    pub refraction: Option<RenderTargetId>,
}

/// Per-viewer reflection/refraction rigs and their shared targets
///
/// A rig is kept for every viewer ever captured until
/// [`ReflectionCapture::forget_viewer`] or [`ReflectionCapture::release`].
#[derive(Debug)]
pub struct ReflectionCapture {
    config: CaptureConfig,
    rigs: FxHashMap<ViewerId, CaptureRig>,
    reflection_target: Option<RenderTargetId>,
    refraction_target: Option<RenderTargetId>,
}

impl ReflectionCapture {
    /// Create a capture with no rigs and no targets
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            rigs: FxHashMap::default(),
            reflection_target: None,
            refraction_target: None,
        }
    }

    /// Current settings
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Replace the settings
    ///
    /// A resolution change frees the existing targets; they are recreated at
    /// the new size on the next capture.
    pub fn reconfigure(&mut self, config: CaptureConfig, renderer: &mut dyn SceneRenderer) {
        let resized = config.target_width != self.config.target_width
            || config.target_height != self.config.target_height;
        if resized {
            for target in [self.reflection_target.take(), self.refraction_target.take()]
                .into_iter()
                .flatten()
            {
                renderer.release_target(target);
            }
        }
        self.config = config;
    }

    /// Rig of one viewer, if it was ever captured
    pub fn rig(&self, viewer: ViewerId) -> Option<&CaptureRig> {
        self.rigs.get(&viewer)
    }

    /// Targets to publish for the current settings
    pub fn outputs(&self) -> CaptureOutput {
        CaptureOutput {
            reflection: self.reflection_target.filter(|_| self.config.reflection),
            refraction: self.refraction_target.filter(|_| self.config.refraction),
        }
    }

    /// Render both auxiliary views for this frame
    ///
    /// Without an active viewer nothing is drawn and the previous targets are
    /// returned as they are.
    ///
    /// # Errors
    ///
    /// Propagates target allocation failures from the renderer.
    pub fn capture(
        &mut self,
        viewer: Option<&ViewerCamera>,
        water: &WaterPlane,
        renderer: &mut dyn SceneRenderer,
    ) -> Result<CaptureOutput> {
        let config = self.config;
        if !config.reflection && !config.refraction {
            return Ok(self.outputs());
        }
        let Some(viewer) = viewer else {
            debug!("No active viewer, skipping reflection/refraction capture");
            return Ok(self.outputs());
        };

        if config.reflection && self.reflection_target.is_none() {
            self.reflection_target = Some(renderer.create_target(
                CaptureKind::Reflection,
                config.target_width,
                config.target_height,
            )?);
        }
        if config.refraction && self.refraction_target.is_none() {
            self.refraction_target = Some(renderer.create_target(
                CaptureKind::Refraction,
                config.target_width,
                config.target_height,
            )?);
        }

        let normal = water.normal.normalize();
        let rig = self.rigs.entry(viewer.id).or_default();

        if let (true, Some(target)) = (config.reflection, self.reflection_target) {
            let plane = Plane {
                normal,
                distance: -normal.dot(&water.position) - config.clip_plane_offset,
            };
            let mirror = reflection_matrix(&plane);

            let camera = rig
                .reflection
                .get_or_insert_with(|| AuxiliaryCamera::new(CaptureKind::Reflection));
            camera.settings = viewer.settings;
            camera.culling_mask = config.culling_mask();
            camera.world_to_camera = viewer.world_to_camera * mirror;
            camera.position = mirror
                .transform_point(&Point3::from(viewer.position))
                .coords;
            camera.euler_degrees = Vector3::new(
                -viewer.euler_degrees.x,
                viewer.euler_degrees.y,
                viewer.euler_degrees.z,
            );
            let clip = camera_space_plane(
                &camera.world_to_camera,
                &water.position,
                &normal,
                1.0,
                config.clip_plane_offset,
            );
            camera.projection = oblique_projection(&viewer.projection, &clip);
            renderer.render(camera, target);
        }

        if let (true, Some(target)) = (config.refraction, self.refraction_target) {
            let camera = rig
                .refraction
                .get_or_insert_with(|| AuxiliaryCamera::new(CaptureKind::Refraction));
            camera.settings = viewer.settings;
            camera.culling_mask = config.culling_mask();
            camera.world_to_camera = viewer.world_to_camera;
            camera.position = viewer.position;
            camera.euler_degrees = viewer.euler_degrees;
            let clip = camera_space_plane(
                &camera.world_to_camera,
                &water.position,
                &normal,
                -1.0,
                config.clip_plane_offset,
            );
            camera.projection = oblique_projection(&viewer.projection, &clip);
            renderer.render(camera, target);
        }

        Ok(self.outputs())
    }

    /// Cameras and targets currently held
    pub fn live_allocations(&self) -> usize {
        let cameras: usize = self.rigs.values().map(CaptureRig::camera_count).sum();
        let targets = usize::from(self.reflection_target.is_some())
            + usize::from(self.refraction_target.is_some());
        cameras + targets
    }

    /// Drop the rig of a viewer that went away
    ///
    /// The shared targets stay alive for the remaining viewers.
    ///
    /// # Returns
    ///
    /// Number of cameras released
    pub fn forget_viewer(&mut self, viewer: ViewerId) -> usize {
        self.rigs
            .remove(&viewer)
            .as_ref()
            .map_or(0, CaptureRig::camera_count)
    }

    /// Free every rig and target
    ///
    /// # Returns
    ///
    /// Number of resources released
    pub fn release(&mut self, renderer: &mut dyn SceneRenderer) -> usize {
        let released = self.live_allocations();
        for target in [self.reflection_target.take(), self.refraction_target.take()]
            .into_iter()
            .flatten()
        {
            renderer.release_target(target);
        }
        self.rigs.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn viewer(id: u64) -> ViewerCamera {
        ViewerCamera::looking_at(
            ViewerId(id),
            Point3::new(0.0, 5.0, -10.0),
            Point3::new(0.0, 0.0, 5.0),
            CameraSettings::default(),
        )
    }

    #[test]
    fn test_no_viewer_is_noop() {
        let mut capture = ReflectionCapture::new(CaptureConfig::default());
        let mut renderer = HeadlessRenderer::new();
        let output = capture
            .capture(None, &WaterPlane::default(), &mut renderer)
            .unwrap();
        assert_eq!(output, CaptureOutput::default());
        assert_eq!(capture.live_allocations(), 0);
        assert!(renderer.renders().is_empty());
    }

    #[test]
    fn test_rigs_created_lazily_per_viewer() {
        let mut capture = ReflectionCapture::new(CaptureConfig::default());
        let mut renderer = HeadlessRenderer::new();
        let water = WaterPlane::default();

        let first = capture.capture(Some(&viewer(1)), &water, &mut renderer).unwrap();
        assert!(first.reflection.is_some() && first.refraction.is_some());
        // Two targets plus two cameras
        assert_eq!(capture.live_allocations(), 4);

        // Same viewer again reuses everything
        let second = capture.capture(Some(&viewer(1)), &water, &mut renderer).unwrap();
        assert_eq!(first, second);
        assert_eq!(capture.live_allocations(), 4);

        // A new viewer gets its own cameras but shares the targets
        capture.capture(Some(&viewer(2)), &water, &mut renderer).unwrap();
        assert_eq!(capture.live_allocations(), 6);
        assert_eq!(renderer.live_targets(), 2);
        assert_eq!(renderer.renders().len(), 6);
    }

    #[test]
    fn test_forget_viewer_drops_only_its_rig() {
        let mut capture = ReflectionCapture::new(CaptureConfig::default());
        let mut renderer = HeadlessRenderer::new();
        let water = WaterPlane::default();
        capture.capture(Some(&viewer(1)), &water, &mut renderer).unwrap();
        capture.capture(Some(&viewer(2)), &water, &mut renderer).unwrap();
        assert_eq!(capture.live_allocations(), 6);

        assert_eq!(capture.forget_viewer(ViewerId(2)), 2);
        assert!(capture.rig(ViewerId(2)).is_none());
        assert!(capture.rig(ViewerId(1)).is_some());
        assert_eq!(capture.live_allocations(), 4);
        assert_eq!(renderer.live_targets(), 2);

        // Unknown or already forgotten viewers are a no-op
        assert_eq!(capture.forget_viewer(ViewerId(2)), 0);
        assert_eq!(capture.forget_viewer(ViewerId(9)), 0);

        // Coming back rebuilds the rig
        capture.capture(Some(&viewer(2)), &water, &mut renderer).unwrap();
        assert_eq!(capture.live_allocations(), 6);
    }

    #[test]
    fn test_reflection_camera_is_mirrored() {
        let mut capture = ReflectionCapture::new(CaptureConfig {
            clip_plane_offset: 0.0,
            ..CaptureConfig::default()
        });
        let mut renderer = HeadlessRenderer::new();
        let eye = viewer(1);
        capture
            .capture(Some(&eye), &WaterPlane::default(), &mut renderer)
            .unwrap();

        let rig = capture.rig(ViewerId(1)).unwrap();
        let reflection = rig.reflection.unwrap();
        assert_relative_eq!(reflection.position, Vector3::new(0.0, -5.0, -10.0), epsilon = 1e-5);
        assert_relative_eq!(reflection.euler_degrees.x, -eye.euler_degrees.x);
        assert!(reflection.invert_culling);
        assert_eq!(reflection.culling_mask & (1 << crate::config::WATER_LAYER), 0);

        let refraction = rig.refraction.unwrap();
        assert_eq!(refraction.world_to_camera, eye.world_to_camera);
        assert!(!refraction.invert_culling);
    }

    #[test]
    fn test_disabled_captures_allocate_nothing() {
        let mut capture = ReflectionCapture::new(CaptureConfig {
            reflection: false,
            refraction: false,
            ..CaptureConfig::default()
        });
        let mut renderer = HeadlessRenderer::new();
        capture
            .capture(Some(&viewer(1)), &WaterPlane::default(), &mut renderer)
            .unwrap();
        assert_eq!(capture.live_allocations(), 0);
        assert_eq!(renderer.live_targets(), 0);
    }

    #[test]
    fn test_release_frees_everything() {
        let mut capture = ReflectionCapture::new(CaptureConfig::default());
        let mut renderer = HeadlessRenderer::new();
        capture
            .capture(Some(&viewer(1)), &WaterPlane::default(), &mut renderer)
            .unwrap();
        assert_eq!(capture.release(&mut renderer), 4);
        assert_eq!(capture.live_allocations(), 0);
        assert_eq!(renderer.live_targets(), 0);
        assert_eq!(capture.outputs(), CaptureOutput::default());
    }

    #[test]
    fn test_resize_recreates_targets() {
        let mut capture = ReflectionCapture::new(CaptureConfig::default());
        let mut renderer = HeadlessRenderer::new();
        let water = WaterPlane::default();
        let before = capture.capture(Some(&viewer(1)), &water, &mut renderer).unwrap();

        capture.reconfigure(
            CaptureConfig {
                target_width: 512,
                target_height: 512,
                ..CaptureConfig::default()
            },
            &mut renderer,
        );
        assert_eq!(renderer.live_targets(), 0);

        let after = capture.capture(Some(&viewer(1)), &water, &mut renderer).unwrap();
        assert_ne!(before.reflection, after.reflection);
        assert_eq!(renderer.live_targets(), 2);
    }
}
