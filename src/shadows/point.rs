//! Cube face views for point light shadows.

use glam::{Mat4, Vec3};

use crate::buffers::ShadowViewData;

pub const CUBE_FACES: usize = 6;

/// Near plane of every face projection.
pub const FACE_NEAR: f32 = 0.1;

/// `(look direction, up)` per cube face, in layer order +X, -X, +Y, -Y, +Z, -Z.
pub const FACE_DIRECTIONS: [(Vec3, Vec3); CUBE_FACES] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// View-projection for each face of a light at `position` reaching `range`.
pub fn face_view_projections(position: Vec3, range: f32) -> [Mat4; CUBE_FACES] {
    let far = range.max(FACE_NEAR * 2.0);
    let projection = Mat4::perspective_rh(90f32.to_radians(), 1.0, FACE_NEAR, far);
    FACE_DIRECTIONS.map(|(dir, up)| projection * Mat4::look_at_rh(position, position + dir, up))
}

/// Shadow view slots for one light, face order matching [`FACE_DIRECTIONS`].
pub fn face_views(position: Vec3, range: f32) -> [ShadowViewData; CUBE_FACES] {
    face_view_projections(position, range).map(|vp| ShadowViewData {
        view_projection: vp.to_cols_array_2d(),
        light_position_range: position.extend(range).to_array(),
    })
}

/// First array layer of shadow cube `index` in the cube array.
pub fn base_layer(index: u32) -> u32 {
    index * CUBE_FACES as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faces_look_along_their_axis() {
        let position = Vec3::new(2.0, 3.0, -1.0);
        let matrices = face_view_projections(position, 20.0);
        for ((dir, _), vp) in FACE_DIRECTIONS.iter().zip(matrices) {
            let ndc = vp.project_point3(position + *dir * 5.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn point_outside_range_is_clipped() {
        let matrices = face_view_projections(Vec3::ZERO, 10.0);
        let ndc = matrices[0].project_point3(Vec3::new(15.0, 0.0, 0.0));
        assert!(ndc.z > 1.0);
    }

    #[test]
    fn cube_layers_are_contiguous() {
        assert_eq!(base_layer(0), 0);
        assert_eq!(base_layer(3), 18);
        let views = face_views(Vec3::ONE, 7.5);
        assert_eq!(views[4].light_position_range, [1.0, 1.0, 1.0, 7.5]);
    }
}
