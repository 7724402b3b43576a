//! Planar mirror and oblique clipping math
//!
//! Matrices follow the right-handed, camera-looks-down-−z convention with
//! clip-space depth in `[−1, 1]` (`Matrix4::look_at_rh` and
//! `Matrix4::new_perspective`).
//!
//! # References
//! - Lengyel, E. (2005) "Oblique View Frustum Depth Projection and Clipping",
//!   Journal of Game Development 1(2)

use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Plane `normal · p + distance = 0` with a unit normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal
    pub normal: Vector3<f32>,
    /// Signed offset
    pub distance: f32,
}

impl Plane {
    /// Plane through `point` with the given normal
    pub fn from_point_normal(point: &Vector3<f32>, normal: &Vector3<f32>) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance of `point` from the plane
    pub fn signed_distance(&self, point: &Vector3<f32>) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Matrix mirroring points across `plane`
#[rustfmt::skip]
pub fn reflection_matrix(plane: &Plane) -> Matrix4<f32> {
    let (a, b, c) = (plane.normal.x, plane.normal.y, plane.normal.z);
    let d = plane.distance;
    Matrix4::new(
        1.0 - 2.0 * a * a, -2.0 * a * b, -2.0 * a * c, -2.0 * d * a,
        -2.0 * b * a, 1.0 - 2.0 * b * b, -2.0 * b * c, -2.0 * d * b,
        -2.0 * c * a, -2.0 * c * b, 1.0 - 2.0 * c * c, -2.0 * d * c,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Express a world-space plane in camera space
///
/// The plane passes through `position` pushed `clip_offset` along `normal`.
/// `side_sign` selects which half space counts as visible: `+1` keeps the side
/// the normal points to, `−1` the opposite side.
pub fn camera_space_plane(
    world_to_camera: &Matrix4<f32>,
    position: &Vector3<f32>,
    normal: &Vector3<f32>,
    side_sign: f32,
    clip_offset: f32,
) -> Vector4<f32> {
    let offset_position = position + normal * clip_offset;
    let camera_position = world_to_camera.transform_point(&Point3::from(offset_position));
    let camera_normal = world_to_camera.transform_vector(normal).normalize() * side_sign;
    Vector4::new(
        camera_normal.x,
        camera_normal.y,
        camera_normal.z,
        -camera_position.coords.dot(&camera_normal),
    )
}

#[inline]
fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Replace the near plane of `projection` with the camera-space `clip_plane`
///
/// The far plane is tilted so the frustum stays as tight as possible. The
/// camera must lie on the plane's negative side. A singular projection or a
/// degenerate plane leaves the matrix unchanged.
pub fn oblique_projection(projection: &Matrix4<f32>, clip_plane: &Vector4<f32>) -> Matrix4<f32> {
    let Some(inverse) = projection.try_inverse() else {
        return *projection;
    };

    // Frustum corner opposite the plane
    let corner = inverse * Vector4::new(sign(clip_plane.x), sign(clip_plane.y), 1.0, 1.0);
    let denominator = clip_plane.dot(&corner);
    if denominator.abs() < f32::EPSILON {
        return *projection;
    }

    let scaled = clip_plane * (2.0 / denominator);
    let fourth_row: Vector4<f32> = projection.row(3).transpose();
    let mut oblique = *projection;
    oblique.set_row(2, &(scaled - fourth_row).transpose());
    oblique
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ndc_depth(projection: &Matrix4<f32>, view: &Matrix4<f32>, world: Vector3<f32>) -> f32 {
        let clip = projection * view * world.push(1.0);
        clip.z / clip.w
    }

    fn viewer() -> (Matrix4<f32>, Matrix4<f32>) {
        let view = Matrix4::look_at_rh(
            &Point3::new(0.0, 5.0, -10.0),
            &Point3::new(0.0, 0.0, 5.0),
            &Vector3::y(),
        );
        let projection = Matrix4::new_perspective(16.0 / 9.0, 1.0, 0.3, 1000.0);
        (view, projection)
    }

    #[test]
    fn test_reflection_is_involution() {
        let plane =
            Plane::from_point_normal(&Vector3::new(0.0, 2.0, 0.0), &Vector3::new(0.3, 1.0, 0.1));
        let r = reflection_matrix(&plane);
        let identity = r * r;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[(i, j)], expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_reflection_mirrors_points() {
        let plane = Plane::from_point_normal(&Vector3::new(0.0, 1.0, 0.0), &Vector3::y());
        let r = reflection_matrix(&plane);
        let mirrored = r.transform_point(&Point3::new(3.0, 4.0, -2.0));
        assert_relative_eq!(mirrored, Point3::new(3.0, -2.0, -2.0), epsilon = 1e-5);

        let on_plane = Point3::new(-7.0, 1.0, 9.0);
        assert_relative_eq!(r.transform_point(&on_plane), on_plane, epsilon = 1e-5);
    }

    #[test]
    fn test_camera_space_plane_sign() {
        let (view, _) = viewer();
        let plane = camera_space_plane(&view, &Vector3::zeros(), &Vector3::y(), 1.0, 0.0);
        // The viewer sits above the water, on the positive side
        assert!(plane.w > 0.0);
        let flipped = camera_space_plane(&view, &Vector3::zeros(), &Vector3::y(), -1.0, 0.0);
        assert_relative_eq!(plane, -flipped, epsilon = 1e-6);
    }

    #[test]
    fn test_reflection_clip_keeps_above_water() {
        let (view, projection) = viewer();
        let plane = Plane::from_point_normal(&Vector3::zeros(), &Vector3::y());
        let mirrored_view = view * reflection_matrix(&plane);
        let clip = camera_space_plane(&mirrored_view, &Vector3::zeros(), &Vector3::y(), 1.0, 0.0);
        let oblique = oblique_projection(&projection, &clip);

        // On the water plane: exactly on the new near plane
        let depth = ndc_depth(&oblique, &mirrored_view, Vector3::new(1.0, 0.0, 3.0));
        assert_relative_eq!(depth, -1.0, epsilon = 1e-4);
        // Above water: kept
        assert!(ndc_depth(&oblique, &mirrored_view, Vector3::new(0.0, 2.0, 5.0)) > -1.0);
        // Below water: clipped away
        assert!(ndc_depth(&oblique, &mirrored_view, Vector3::new(0.0, -2.0, 5.0)) < -1.0);
    }

    #[test]
    fn test_refraction_clip_keeps_below_water() {
        let (view, projection) = viewer();
        let clip = camera_space_plane(&view, &Vector3::zeros(), &Vector3::y(), -1.0, 0.0);
        let oblique = oblique_projection(&projection, &clip);

        assert!(ndc_depth(&oblique, &view, Vector3::new(0.0, -2.0, 5.0)) > -1.0);
        assert!(ndc_depth(&oblique, &view, Vector3::new(0.0, 2.0, 5.0)) < -1.0);
    }

    #[test]
    fn test_singular_projection_unchanged() {
        let singular = Matrix4::zeros();
        let clip = Vector4::new(0.0, 1.0, 0.0, -1.0);
        assert_eq!(oblique_projection(&singular, &clip), singular);
    }
}
