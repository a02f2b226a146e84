//! Cascade fitting for the directional light.
//!
//! The camera frustum is cut into [`CASCADE_COUNT`] + 1 depth ranges. Each range gets an
//! orthographic light-space matrix that tightly encloses its eight corners, with the depth
//! range stretched so casters behind the camera still land in the map.

use glam::{Mat4, Vec3, Vec4};

/// Split planes between cascades. The map holds one more layer than this.
pub const CASCADE_COUNT: usize = 4;
pub const CASCADE_LAYERS: u32 = CASCADE_COUNT as u32 + 1;

/// Stretch applied to the light-space depth bounds.
const Z_MULT: f32 = 10.0;

/// Camera parameters a cascade is fitted against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeCamera {
    pub view: Mat4,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

/// View distances of the split planes: `far/50, far/25, far/10, far/2`.
pub fn cascade_splits(far: f32) -> [f32; CASCADE_COUNT] {
    [far / 50.0, far / 25.0, far / 10.0, far / 2.0]
}

/// World-space corners of the camera frustum between `near` and `far`.
pub fn frustum_corners(camera: &CascadeCamera, near: f32, far: f32) -> [Vec3; 8] {
    let projection = Mat4::perspective_rh(camera.fov, camera.aspect, near, far);
    let inverse = (projection * camera.view).inverse();

    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [0.0, 1.0] {
                let p = inverse * Vec4::new(x, y, z, 1.0);
                corners[i] = p.truncate() / p.w;
                i += 1;
            }
        }
    }
    corners
}

/// Orthographic light-space matrix enclosing the camera frustum slice `[near, far]`.
///
/// `direction` is the direction the light travels.
pub fn light_space_matrix(camera: &CascadeCamera, direction: Vec3, near: f32, far: f32) -> Mat4 {
    let corners = frustum_corners(camera, near, far);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;

    let direction = direction.normalize_or(Vec3::NEG_Y);
    // A light straight along the up axis leaves look_at without a basis
    let up = if direction.dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let light_view = Mat4::look_at_rh(center - direction, center, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let p = light_view.transform_point3(corner);
        min = min.min(p);
        max = max.max(p);
    }

    let min_z = if min.z < 0.0 { min.z * Z_MULT } else { min.z / Z_MULT };
    let max_z = if max.z < 0.0 { max.z / Z_MULT } else { max.z * Z_MULT };

    // View space looks down -Z, so the near plane sits at -max_z
    let projection = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max_z, -min_z);
    projection * light_view
}

/// One matrix per cascade layer: `[near, d0]`, `[d0, d1]`, ..., `[d3, far]`.
pub fn light_space_matrices(
    camera: &CascadeCamera,
    direction: Vec3,
) -> [Mat4; CASCADE_LAYERS as usize] {
    let splits = cascade_splits(camera.far);
    let mut matrices = [Mat4::IDENTITY; CASCADE_LAYERS as usize];

    for (i, matrix) in matrices.iter_mut().enumerate() {
        let near = if i == 0 { camera.near } else { splits[i - 1] };
        let far = if i == CASCADE_COUNT { camera.far } else { splits[i] };
        *matrix = light_space_matrix(camera, direction, near, far);
    }
    matrices
}

/// Index of the cascade layer covering a fragment at positive `view_depth`.
pub fn cascade_for_depth(splits: &[f32], view_depth: f32) -> usize {
    splits
        .iter()
        .position(|&d| view_depth < d)
        .unwrap_or(splits.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CascadeCamera {
        CascadeCamera {
            view: Mat4::look_at_rh(Vec3::new(0.0, 5.0, 15.0), Vec3::ZERO, Vec3::Y),
            fov: 45f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }

    fn assert_inside_ndc(matrix: Mat4, points: &[Vec3]) {
        for &p in points {
            let ndc = matrix.project_point3(p);
            assert!(ndc.x >= -1.0 - 1e-3 && ndc.x <= 1.0 + 1e-3, "x {ndc}");
            assert!(ndc.y >= -1.0 - 1e-3 && ndc.y <= 1.0 + 1e-3, "y {ndc}");
            assert!(ndc.z >= -1e-3 && ndc.z <= 1.0 + 1e-3, "z {ndc}");
        }
    }

    #[test]
    fn splits_follow_far_plane() {
        assert_eq!(cascade_splits(1000.0), [20.0, 40.0, 100.0, 500.0]);
    }

    #[test]
    fn every_cascade_encloses_its_slice() {
        let camera = camera();
        let direction = Vec3::new(0.3, -1.0, 0.2).normalize();
        let matrices = light_space_matrices(&camera, direction);
        let splits = cascade_splits(camera.far);

        let bounds = [
            (camera.near, splits[0]),
            (splits[0], splits[1]),
            (splits[1], splits[2]),
            (splits[2], splits[3]),
            (splits[3], camera.far),
        ];
        for (matrix, (near, far)) in matrices.iter().zip(bounds) {
            assert_inside_ndc(*matrix, &frustum_corners(&camera, near, far));
        }
    }

    #[test]
    fn straight_down_light_is_finite() {
        let matrix = light_space_matrix(&camera(), Vec3::NEG_Y, 0.1, 20.0);
        assert!(matrix.is_finite());
        assert_inside_ndc(matrix, &frustum_corners(&camera(), 0.1, 20.0));
    }

    #[test]
    fn near_corners_map_to_near_plane() {
        let corners = frustum_corners(&camera(), 1.0, 10.0);
        let view = camera().view;
        for (i, c) in corners.iter().enumerate() {
            let depth = -view.transform_point3(*c).z;
            let expected = if i % 2 == 0 { 1.0 } else { 10.0 };
            approx::assert_relative_eq!(depth, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn layer_lookup_uses_first_greater_split() {
        let splits = cascade_splits(1000.0);
        assert_eq!(cascade_for_depth(&splits, 5.0), 0);
        assert_eq!(cascade_for_depth(&splits, 30.0), 1);
        assert_eq!(cascade_for_depth(&splits, 499.0), 3);
        assert_eq!(cascade_for_depth(&splits, 900.0), 4);
    }
}
