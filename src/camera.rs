use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

/// Anything the renderer can view the scene through.
///
/// The renderer only consumes matrices and clip planes; how a camera is driven (orbit
/// controls, a scene entity, a script) is up to the implementor.
pub trait RenderCamera {
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self) -> Mat4;
    fn position(&self) -> Vec3;
    fn near_clip(&self) -> f32;
    fn far_clip(&self) -> f32;

    /// Vertical field of view in radians, used to fit shadow cascades.
    fn fov(&self) -> f32 {
        45f32.to_radians()
    }

    fn aspect_ratio(&self) -> f32 {
        let p = self.projection_matrix();
        p.y_axis.y / p.x_axis.x
    }

    fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProjectionKind {
    #[default]
    Perspective,
    Orthographic,
}

/// An orbit camera circling a focal point, as used by editor viewports.
///
/// # Example
/// ```
/// use phalanx::{EditorCamera, RenderCamera};
///
/// let camera = EditorCamera::new()
///     .at(0.0, 5.0, 10.0)
///     .looking_at(0.0, 0.0, 0.0)
///     .with_viewport(1280.0, 720.0);
///
/// assert!((camera.position() - phalanx::Vec3::new(0.0, 5.0, 10.0)).length() < 1e-4);
/// ```
#[derive(Clone, Debug)]
pub struct EditorCamera {
    pub focal_point: Vec3,
    pub distance: f32,
    /// Radians. Positive looks down.
    pub pitch: f32,
    /// Radians. Positive turns right.
    pub yaw: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub projection_kind: ProjectionKind,
    viewport: Vec2,
}

impl Default for EditorCamera {
    fn default() -> Self {
        Self {
            focal_point: Vec3::ZERO,
            distance: 10.0,
            pitch: 0.0,
            yaw: 0.0,
            fov: 45.0,
            near: 0.1,
            far: 1000.0,
            projection_kind: ProjectionKind::Perspective,
            viewport: Vec2::new(1280.0, 720.0),
        }
    }
}

impl EditorCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the eye to a position, keeping the current orientation and distance.
    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        let eye = Vec3::new(x, y, z);
        self.focal_point = eye + self.forward() * self.distance;
        self
    }

    /// Aim at a target from the current eye position.
    pub fn looking_at(mut self, x: f32, y: f32, z: f32) -> Self {
        let eye = self.position();
        let target = Vec3::new(x, y, z);
        let offset = target - eye;
        let distance = offset.length();
        if distance > f32::EPSILON {
            let f = offset / distance;
            self.pitch = (-f.y).asin();
            self.yaw = f.x.atan2(-f.z);
            self.distance = distance;
            self.focal_point = target;
        }
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees;
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn with_viewport(mut self, width: f32, height: f32) -> Self {
        self.set_viewport_size(width, height);
        self
    }

    pub fn with_projection(mut self, kind: ProjectionKind) -> Self {
        self.projection_kind = kind;
        self
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.viewport = Vec2::new(width, height);
        }
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.viewport
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, -self.yaw, -self.pitch, 0.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    /// Rotate around the focal point by a mouse delta in radians.
    pub fn orbit(&mut self, delta: Vec2) {
        let yaw_sign = if self.up().y < 0.0 { -1.0 } else { 1.0 };
        self.yaw += yaw_sign * delta.x;
        self.pitch += delta.y;
    }

    /// Slide the focal point in the view plane.
    pub fn pan(&mut self, delta: Vec2) {
        let speed = self.distance * 0.5;
        self.focal_point += -self.right() * delta.x * speed + self.up() * delta.y * speed;
    }

    /// Move toward (positive) or away from the focal point.
    ///
    /// Zooming through the focal point pushes the focal point forward instead of
    /// inverting the view.
    pub fn zoom(&mut self, delta: f32) {
        let speed = (self.distance * 0.2).powi(2).min(100.0);
        self.distance -= delta * speed;
        if self.distance < 1.0 {
            self.focal_point += self.forward();
            self.distance = 1.0;
        }
    }
}

impl RenderCamera for EditorCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation(), self.position()).inverse()
    }

    fn projection_matrix(&self) -> Mat4 {
        let aspect = self.viewport.x / self.viewport.y;
        match self.projection_kind {
            ProjectionKind::Perspective => {
                Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
            }
            ProjectionKind::Orthographic => {
                let half_height = self.distance * 0.25;
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }

    fn position(&self) -> Vec3 {
        self.focal_point - self.forward() * self.distance
    }

    fn near_clip(&self) -> f32 {
        self.near
    }

    fn far_clip(&self) -> f32 {
        self.far
    }

    fn fov(&self) -> f32 {
        self.fov.to_radians()
    }

    fn aspect_ratio(&self) -> f32 {
        self.viewport.x / self.viewport.y
    }
}

/// A camera owned by a scene entity: a projection plus the entity's world transform.
#[derive(Clone, Debug)]
pub struct SceneCamera {
    pub transform: Mat4,
    /// Vertical field of view in radians (perspective), or view height (orthographic).
    pub fov: f32,
    pub ortho_size: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub projection_kind: ProjectionKind,
}

impl SceneCamera {
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            fov: fov_degrees.to_radians(),
            ortho_size: 10.0,
            aspect,
            near,
            far,
            projection_kind: ProjectionKind::Perspective,
        }
    }

    pub fn orthographic(size: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            ortho_size: size,
            projection_kind: ProjectionKind::Orthographic,
            ..Self::perspective(45.0, aspect, near, far)
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

impl RenderCamera for SceneCamera {
    fn view_matrix(&self) -> Mat4 {
        self.transform.inverse()
    }

    fn projection_matrix(&self) -> Mat4 {
        match self.projection_kind {
            ProjectionKind::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
            }
            ProjectionKind::Orthographic => {
                let half_height = self.ortho_size * 0.5;
                let half_width = half_height * self.aspect;
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }

    fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    fn near_clip(&self) -> f32 {
        self.near
    }

    fn far_clip(&self) -> f32 {
        self.far
    }

    fn fov(&self) -> f32 {
        self.fov
    }

    fn aspect_ratio(&self) -> f32 {
        self.aspect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_editor_camera_looks_down_negative_z() {
        let camera = EditorCamera::new();
        assert_relative_eq!(camera.forward().z, -1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position().z, 10.0, epsilon = 1e-5);
    }

    #[test]
    fn looking_at_centers_the_target() {
        let camera = EditorCamera::new()
            .at(3.0, 4.0, 5.0)
            .looking_at(0.0, 0.0, 0.0)
            .with_viewport(800.0, 600.0);

        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(camera.position().x, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn zoom_never_passes_the_focal_point() {
        let mut camera = EditorCamera::new();
        for _ in 0..100 {
            camera.zoom(10.0);
        }
        assert!(camera.distance >= 1.0);
    }

    #[test]
    fn scene_camera_view_inverts_transform() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let camera = SceneCamera::perspective(60.0, 1.5, 0.1, 100.0).with_transform(transform);
        assert_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!((camera.view_matrix() * transform).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert_relative_eq!(camera.aspect_ratio(), 1.5);
    }

    #[test]
    fn aspect_ratio_default_reads_projection() {
        struct Fixed;
        impl RenderCamera for Fixed {
            fn view_matrix(&self) -> Mat4 {
                Mat4::IDENTITY
            }
            fn projection_matrix(&self) -> Mat4 {
                Mat4::perspective_rh(1.0, 2.0, 0.1, 10.0)
            }
            fn position(&self) -> Vec3 {
                Vec3::ZERO
            }
            fn near_clip(&self) -> f32 {
                0.1
            }
            fn far_clip(&self) -> f32 {
                10.0
            }
        }
        assert_relative_eq!(Fixed.aspect_ratio(), 2.0, epsilon = 1e-5);
    }
}
