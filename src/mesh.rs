//! Geometry submitted to the renderer.
//!
//! - [`Vertex3d`]: the vertex format shared by every geometry pipeline, including
//!   skinning attributes
//! - [`MeshData`]: CPU-side vertices and indices, with built-in primitives
//! - [`Mesh`]: GPU buffers plus the material the mesh is drawn with
//! - [`Model`]: a group of meshes drawn under one transform and entity id
//! - [`Animator`]: the skinning palette for an animated model
//! - [`Transform`]: position, rotation and scale with a builder API
//!
//! # Vertex Layout
//!
//! | Attribute    | Format    | Offset | Shader Location |
//! |--------------|-----------|--------|-----------------|
//! | position     | Float32x3 | 0      | 0               |
//! | normal       | Float32x3 | 12     | 1               |
//! | uv           | Float32x2 | 24     | 2               |
//! | bone_ids     | Sint32x4  | 32     | 3               |
//! | bone_weights | Float32x4 | 48     | 4               |
//!
//! # Example
//!
//! ```ignore
//! let desc = MaterialDesc::default();
//! let material = Arc::new(Material::new(&gpu, renderer.material_layout(), desc));
//! let cube = Mesh::from_data(&gpu, &MeshData::cube(), material);
//! let model = Arc::new(Model::new(vec![cube]));
//!
//! renderer.submit_model(ModelSubmission {
//!     transform: Transform::new().uniform_scale(2.0).matrix(),
//!     model,
//!     materials: Vec::new(),
//!     animator: None,
//!     entity_id: 7,
//!     selected: false,
//! });
//! ```

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::buffers::MAX_BONES;
use crate::gpu::GpuContext;
use crate::material::Material;

/// A vertex with position, normal, texture coordinates and up to four bone influences.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Indices into the model's bone palette. Unused influences are 0 with 0 weight.
    pub bone_ids: [i32; 4],
    pub bone_weights: [f32; 4],
}

impl Vertex3d {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            // bone ids
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 3,
                format: wgpu::VertexFormat::Sint32x4,
            },
            // bone weights
            wgpu::VertexAttribute {
                offset: 48,
                shader_location: 4,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };

    /// A static (unskinned) vertex.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            bone_ids: [0; 4],
            bone_weights: [0.0; 4],
        }
    }

    pub fn with_bones(mut self, ids: [i32; 4], weights: [f32; 4]) -> Self {
        self.bone_ids = ids;
        self.bone_weights = weights;
        self
    }
}

/// CPU-side geometry, ready to upload.
///
/// All built-in primitives use counter-clockwise winding for front faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Unit cube centered at the origin, four vertices per face for flat normals.
    pub fn cube() -> Self {
        // (normal, tangent u, tangent v) per face
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v) in FACES {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = n * 0.5 + u * (su * 0.5) + v * (sv * 0.5);
                vertices.push(Vertex3d::new(
                    p.to_array(),
                    normal,
                    [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self { vertices, indices }
    }

    /// UV sphere of radius 0.5 centered at the origin.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let (ring_radius, y) = phi.sin_cos();

            for seg in 0..=segments {
                let theta = std::f32::consts::TAU * seg as f32 / segments as f32;
                let (z, x) = theta.sin_cos();
                let normal = [x * ring_radius, y, z * ring_radius];
                vertices.push(Vertex3d::new(
                    [normal[0] * 0.5, normal[1] * 0.5, normal[2] * 0.5],
                    normal,
                    [seg as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;
                indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        Self { vertices, indices }
    }

    /// Square plane on the XZ axis facing +Y.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let up = [0.0, 1.0, 0.0];
        Self {
            vertices: vec![
                Vertex3d::new([-half, 0.0, -half], up, [0.0, 0.0]),
                Vertex3d::new([-half, 0.0, half], up, [0.0, 1.0]),
                Vertex3d::new([half, 0.0, half], up, [1.0, 1.0]),
                Vertex3d::new([half, 0.0, -half], up, [1.0, 0.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }
}

/// GPU-resident geometry and the material it is drawn with by default.
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
    pub material: Arc<Material>,
}

impl Mesh {
    pub fn new(
        gpu: &GpuContext,
        vertices: &[Vertex3d],
        indices: &[u32],
        material: Arc<Material>,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            material,
        }
    }

    pub fn from_data(gpu: &GpuContext, data: &MeshData, material: Arc<Material>) -> Self {
        Self::new(gpu, &data.vertices, &data.indices, material)
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind the vertex and index buffers and issue the indexed draw.
    pub(crate) fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// A group of meshes drawn together.
pub struct Model {
    pub meshes: Vec<Mesh>,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self { meshes }
    }

    pub fn from_mesh(mesh: Mesh) -> Self {
        Self { meshes: vec![mesh] }
    }

    /// Material for mesh `index`: the per-submission override when set, else the mesh's own.
    pub fn material_for<'a>(
        &'a self,
        index: usize,
        overrides: &'a [Option<Arc<Material>>],
    ) -> Option<&'a Arc<Material>> {
        let mesh = self.meshes.get(index)?;
        Some(
            overrides
                .get(index)
                .and_then(|m| m.as_ref())
                .unwrap_or(&mesh.material),
        )
    }
}

/// Final bone matrices for a skinned model, in palette order.
///
/// Only the first [`MAX_BONES`] matrices reach the GPU.
#[derive(Clone, Debug, Default)]
pub struct Animator {
    final_bone_matrices: Vec<Mat4>,
}

impl Animator {
    pub fn new(final_bone_matrices: Vec<Mat4>) -> Self {
        Self {
            final_bone_matrices,
        }
    }

    /// A rest pose of `count` identity bones.
    pub fn identity(count: usize) -> Self {
        Self::new(vec![Mat4::IDENTITY; count.min(MAX_BONES)])
    }

    pub fn set_bone(&mut self, index: usize, matrix: Mat4) {
        if let Some(bone) = self.final_bone_matrices.get_mut(index) {
            *bone = matrix;
        }
    }

    pub fn final_bone_matrices(&self) -> &[Mat4] {
        &self.final_bone_matrices
    }

    pub fn has_animation(&self) -> bool {
        !self.final_bone_matrices.is_empty()
    }
}

/// Position, rotation and scale, combined in scale-rotate-translate order.
///
/// ```
/// use phalanx::{Transform, Vec3, Quat};
///
/// let transform = Transform::new()
///     .position(Vec3::new(0.0, 5.0, -10.0))
///     .rotation(Quat::from_rotation_y(std::f32::consts::PI / 4.0))
///     .uniform_scale(2.0);
/// assert_eq!(transform.matrix().w_axis.truncate(), Vec3::new(0.0, 5.0, -10.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Decompose an affine matrix.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation from Euler angles in radians, applied Z then Y then X.
    pub fn euler(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = Quat::from_euler(glam::EulerRot::ZYX, z, y, x);
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ccw_outward(data: &MeshData) {
        for tri in data.indices.chunks_exact(3) {
            let [a, b, c] =
                [tri[0], tri[1], tri[2]].map(|i| Vec3::from(data.vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a);
            if face_normal.length_squared() < 1e-10 {
                continue; // degenerate pole triangle
            }
            let n = Vec3::from(data.vertices[tri[0] as usize].normal)
                + Vec3::from(data.vertices[tri[1] as usize].normal)
                + Vec3::from(data.vertices[tri[2] as usize].normal);
            assert!(face_normal.dot(n) > 0.0, "triangle {tri:?} winds clockwise");
        }
    }

    #[test]
    fn vertex_is_64_bytes() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 64);
        assert_eq!(Vertex3d::LAYOUT.array_stride, 64);
    }

    #[test]
    fn cube_has_flat_faces() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for v in &cube.vertices {
            let p = Vec3::from(v.position);
            assert_eq!(p.abs().max_element(), 0.5);
        }
        assert_ccw_outward(&cube);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = MeshData::sphere(16, 8);
        assert_eq!(sphere.vertices.len(), 17 * 9);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 0.5).abs() < 1e-5);
        }
        assert_ccw_outward(&sphere);
    }

    #[test]
    fn plane_faces_up() {
        let plane = MeshData::plane(4.0);
        assert_ccw_outward(&plane);
        assert!(plane.vertices.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn animator_clamps_to_max_bones() {
        assert_eq!(Animator::identity(500).final_bone_matrices().len(), MAX_BONES);
        assert!(!Animator::default().has_animation());
    }

    #[test]
    fn transform_roundtrips_through_matrix() {
        let t = Transform::new()
            .position(Vec3::new(1.0, 2.0, 3.0))
            .uniform_scale(2.0);
        let back = Transform::from_matrix(t.matrix());
        assert!((back.position - t.position).length() < 1e-5);
        assert!((back.scale - t.scale).length() < 1e-5);
    }
}
