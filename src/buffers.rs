//! GPU-side data layouts and the buffers that carry them.
//!
//! Every struct here is `#[repr(C)]` and mirrors a WGSL struct in `shaders/common.wgsl`.
//! Arrays of scalars are packed into `vec4`s to satisfy uniform address space layout rules.
//!
//! [`FrameUniforms`] holds the four per-frame uniform buffers (camera, lighting,
//! post-processing, volumetrics) behind one bind group that almost every pass binds at
//! group 0. [`DynamicUniform`] holds values that change *within* a frame (per-model object
//! data, per-face shadow views) in separate dynamic-offset slots, because several
//! `queue.write_buffer` calls to the same range before one submit would leave only the
//! last value visible to every pass.

use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;

/// Maximum skinning matrices per model.
pub const MAX_BONES: usize = 100;
/// Light-space matrices and split distances reserved in [`LightingData`].
pub const MAX_CASCADE_COUNT: usize = 16;
/// Fog volumes honored per frame.
pub const MAX_VOLUMES: usize = 32;
/// SSAO hemisphere kernel size.
pub const SSAO_KERNEL_SIZE: usize = 64;

/// Round `value` up to a multiple of `alignment`.
pub fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraData {
    pub view_projection: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub view_position: [f32; 4],
    /// Cluster grid x, y, z. `w` unused.
    pub tile_sizes: [u32; 4],
    pub screen_dimensions: [u32; 2],
    pub pixel_size: [f32; 2],
    /// Log-depth slicing: `slice = log2(depth) * scale + bias`.
    pub scale: f32,
    pub bias: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Screen tile width and height in pixels.
    pub tile_pixels: [u32; 2],
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLightData {
    /// Direction the light travels, `w` unused.
    pub direction: [f32; 4],
    pub color: [f32; 3],
    pub intensity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingData {
    pub directional: DirectionalLightData,
    pub light_space_matrices: [[[f32; 4]; 4]; MAX_CASCADE_COUNT],
    pub cascade_plane_distances: [[f32; 4]; MAX_CASCADE_COUNT / 4],
    pub using_directional_light: i32,
    pub cascade_count: i32,
    pub using_sky_light: i32,
    pub using_flow_map: i32,
}

impl LightingData {
    pub fn set_cascade_distance(&mut self, index: usize, distance: f32) {
        self.cascade_plane_distances[index / 4][index % 4] = distance;
    }

    pub fn cascade_distance(&self, index: usize) -> f32 {
        self.cascade_plane_distances[index / 4][index % 4]
    }
}

impl Default for LightingData {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightData {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub enabled: u32,
    pub intensity: f32,
    pub range: f32,
    /// Layer group in the point shadow cube array, or -1.
    pub shadow_index: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model`, for normals.
    pub model_inverse: [[f32; 4]; 4],
    pub bones: [[[f32; 4]; 4]; MAX_BONES],
    pub entity_id: i32,
    pub animated: u32,
    pub _pad: [u32; 2],
}

impl ObjectData {
    pub fn new(model: Mat4, entity_id: i32, bones: Option<&[Mat4]>) -> Self {
        let mut data = Self::zeroed();
        data.model = model.to_cols_array_2d();
        data.model_inverse = model.inverse().transpose().to_cols_array_2d();
        data.entity_id = entity_id;
        if let Some(bones) = bones {
            data.animated = 1;
            for (slot, bone) in data.bones.iter_mut().zip(bones) {
                *slot = bone.to_cols_array_2d();
            }
        }
        data
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VolumeData {
    pub min: [f32; 3],
    pub blend: f32,
    pub max: [f32; 3],
    pub scattering_distribution: f32,
    pub scattering_intensity: f32,
    pub extinction_scale: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VolumetricData {
    pub volumes: [VolumeData; MAX_VOLUMES],
    pub count: u32,
    pub _pad: [u32; 3],
}

impl Default for VolumetricData {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PostProcessingData {
    pub ssao_samples: [[f32; 4]; SSAO_KERNEL_SIZE],
    pub previous_view_projection: [[f32; 4]; 4],
    pub visualization_mode: i32,
    pub gamma: f32,
    pub time: f32,
    pub lens_distortion: f32,
    pub aberration_amount: f32,
    pub grain_amount: f32,
    pub vignette_intensity: f32,
    pub vignette_power: f32,
    pub focus_near_start: f32,
    pub focus_near_end: f32,
    pub focus_far_start: f32,
    pub focus_far_end: f32,
    pub focus_scale: f32,
    pub bokeh_threshold: f32,
    pub bokeh_size: f32,
    /// Non-zero when albedo is forced to white (lighting-only view).
    pub lighting_only: u32,
}

/// View for one shadow cascade or one point light cube face.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowViewData {
    pub view_projection: [[f32; 4]; 4],
    /// Light position (xyz) and range (w). Unused for cascades.
    pub light_position_range: [f32; 4],
}

/// View for one IBL capture face.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CaptureData {
    pub view_projection: [[f32; 4]; 4],
    pub roughness: f32,
    pub _pad: [f32; 3],
}

fn uniform_buffer<T: Pod + Zeroable>(gpu: &GpuContext, label: &str) -> wgpu::Buffer {
    gpu.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&T::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// The per-frame uniforms shared by nearly every pass (bind group 0).
pub struct FrameUniforms {
    pub camera: wgpu::Buffer,
    pub lighting: wgpu::Buffer,
    pub post: wgpu::Buffer,
    pub volumetric: wgpu::Buffer,
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl FrameUniforms {
    pub fn new(gpu: &GpuContext) -> Self {
        let camera = uniform_buffer::<CameraData>(gpu, "Camera Uniform Buffer");
        let lighting = uniform_buffer::<LightingData>(gpu, "Lighting Uniform Buffer");
        let post = uniform_buffer::<PostProcessingData>(gpu, "PostProcessing Uniform Buffer");
        let volumetric = uniform_buffer::<VolumetricData>(gpu, "Volumetric Uniform Buffer");

        let all = wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE;
        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[
                    // Camera
                    uniform_entry(0, all),
                    // Lighting
                    uniform_entry(1, all),
                    // Post-processing
                    uniform_entry(2, all),
                    // Volumetrics
                    uniform_entry(3, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lighting.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: post.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: volumetric.as_entire_binding(),
                },
            ],
        });

        Self {
            camera,
            lighting,
            post,
            volumetric,
            layout,
            bind_group,
        }
    }

    pub fn write_camera(&self, gpu: &GpuContext, data: &CameraData) {
        gpu.queue.write_buffer(&self.camera, 0, bytemuck::bytes_of(data));
    }

    pub fn write_lighting(&self, gpu: &GpuContext, data: &LightingData) {
        gpu.queue.write_buffer(&self.lighting, 0, bytemuck::bytes_of(data));
    }

    pub fn write_post(&self, gpu: &GpuContext, data: &PostProcessingData) {
        gpu.queue.write_buffer(&self.post, 0, bytemuck::bytes_of(data));
    }

    pub fn write_volumetric(&self, gpu: &GpuContext, data: &VolumetricData) {
        gpu.queue.write_buffer(&self.volumetric, 0, bytemuck::bytes_of(data));
    }
}

/// A uniform buffer holding one `T` per slot, bound with a dynamic offset.
///
/// The buffer grows (doubling) when more slots are written than it holds. Growing
/// recreates the bind group, so callers fetch [`bind_group`](Self::bind_group) after
/// [`write`](Self::write).
pub struct DynamicUniform<T> {
    label: String,
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> DynamicUniform<T> {
    pub fn new(
        gpu: &GpuContext,
        label: &str,
        visibility: wgpu::ShaderStages,
        capacity: u32,
    ) -> Self {
        let stride = align_to(std::mem::size_of::<T>() as u64, gpu.uniform_alignment());
        let capacity = capacity.max(1);

        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Bind Group Layout", label)),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
                    },
                    count: None,
                }],
            });

        let (buffer, bind_group) = Self::allocate(gpu, label, &layout, stride, capacity);

        Self {
            label: label.to_string(),
            buffer,
            layout,
            bind_group,
            stride,
            capacity,
            _marker: PhantomData,
        }
    }

    fn allocate(
        gpu: &GpuContext,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", label)),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
                }),
            }],
        });

        (buffer, bind_group)
    }

    /// Upload `slots`, one per dynamic offset, in a single write.
    pub fn write(&mut self, gpu: &GpuContext, slots: &[T]) {
        if slots.is_empty() {
            return;
        }
        if slots.len() as u32 > self.capacity {
            let mut capacity = self.capacity;
            while capacity < slots.len() as u32 {
                capacity *= 2;
            }
            let (buffer, bind_group) =
                Self::allocate(gpu, &self.label, &self.layout, self.stride, capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }

        let mut bytes = vec![0u8; self.stride as usize * slots.len()];
        for (i, slot) in slots.iter().enumerate() {
            let start = i * self.stride as usize;
            bytes[start..start + std::mem::size_of::<T>()]
                .copy_from_slice(bytemuck::bytes_of(slot));
        }
        gpu.queue.write_buffer(&self.buffer, 0, &bytes);
    }

    /// Dynamic offset of slot `index`.
    pub fn offset(&self, index: usize) -> u32 {
        (index as u64 * self.stride) as u32
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn uniform_layouts_match_shader_structs() {
        assert_eq!(size_of::<CameraData>(), 400);
        assert_eq!(size_of::<DirectionalLightData>(), 32);
        assert_eq!(size_of::<LightingData>(), 1136);
        assert_eq!(size_of::<PointLightData>(), 48);
        assert_eq!(size_of::<ObjectData>(), 6544);
        assert_eq!(size_of::<VolumeData>(), 48);
        assert_eq!(size_of::<VolumetricData>(), 1552);
        assert_eq!(size_of::<PostProcessingData>(), 1152);
        assert_eq!(size_of::<ShadowViewData>(), 80);
        assert_eq!(size_of::<CaptureData>(), 80);
    }

    #[test]
    fn every_uniform_is_16_byte_sized() {
        for size in [
            size_of::<CameraData>(),
            size_of::<LightingData>(),
            size_of::<ObjectData>(),
            size_of::<VolumetricData>(),
            size_of::<PostProcessingData>(),
        ] {
            assert_eq!(size % 16, 0);
        }
    }

    #[test]
    fn cascade_distances_pack_four_per_vec() {
        let mut lighting = LightingData::default();
        lighting.set_cascade_distance(5, 42.0);
        assert_eq!(lighting.cascade_plane_distances[1][1], 42.0);
        assert_eq!(lighting.cascade_distance(5), 42.0);
    }

    #[test]
    fn object_data_sets_animated_only_with_bones() {
        let still = ObjectData::new(Mat4::IDENTITY, 3, None);
        assert_eq!(still.animated, 0);
        assert_eq!(still.entity_id, 3);

        let bones = [Mat4::from_scale(glam::Vec3::splat(2.0))];
        let skinned = ObjectData::new(Mat4::IDENTITY, 3, Some(&bones));
        assert_eq!(skinned.animated, 1);
        assert_eq!(skinned.bones[0][0][0], 2.0);
    }

    #[test]
    fn align_rounds_up() {
        assert_eq!(align_to(6544, 256), 6656);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1, 256), 256);
    }
}
