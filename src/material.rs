//! Surface materials for the G-buffer pass.
//!
//! A [`Material`] owns a small uniform buffer and an optional albedo map, bound together
//! at group 2 of the geometry pipelines. Materials are created against the renderer's
//! [`MaterialLayout`] and shared between meshes with `Arc`.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::texture::Texture;

/// How a material treats coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlphaBlendMode {
    #[default]
    Opaque,
    /// Fragments with alpha below the cutoff are discarded. Drawn double-sided.
    Masked,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub albedo: [f32; 4],
    /// Emissive color (rgb) and strength (a).
    pub emission: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub specular: f32,
    pub alpha: f32,
    pub use_albedo_map: u32,
    pub alpha_cutoff: f32,
    pub masked: u32,
    pub _pad: u32,
}

/// Artist-facing material parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDesc {
    pub albedo: [f32; 4],
    pub emission: [f32; 3],
    pub emission_strength: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub specular: f32,
    pub alpha: f32,
    pub alpha_cutoff: f32,
    pub blend_mode: AlphaBlendMode,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            albedo: [1.0, 1.0, 1.0, 1.0],
            emission: [0.0; 3],
            emission_strength: 1.0,
            roughness: 0.5,
            metallic: 0.0,
            specular: 0.5,
            alpha: 1.0,
            alpha_cutoff: 0.5,
            blend_mode: AlphaBlendMode::Opaque,
        }
    }
}

impl MaterialDesc {
    pub fn with_albedo(mut self, r: f32, g: f32, b: f32) -> Self {
        self.albedo = [r, g, b, 1.0];
        self
    }

    pub fn with_emission(mut self, r: f32, g: f32, b: f32, strength: f32) -> Self {
        self.emission = [r, g, b];
        self.emission_strength = strength;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn masked(mut self, cutoff: f32) -> Self {
        self.blend_mode = AlphaBlendMode::Masked;
        self.alpha_cutoff = cutoff;
        self
    }

    fn to_data(self, has_map: bool) -> MaterialData {
        MaterialData {
            albedo: self.albedo,
            emission: [
                self.emission[0],
                self.emission[1],
                self.emission[2],
                self.emission_strength,
            ],
            roughness: self.roughness,
            metallic: self.metallic,
            specular: self.specular,
            alpha: self.alpha,
            use_albedo_map: has_map as u32,
            alpha_cutoff: self.alpha_cutoff,
            masked: (self.blend_mode == AlphaBlendMode::Masked) as u32,
            _pad: 0,
        }
    }
}

/// Bind group layout shared by every material, plus the white fallback albedo map.
pub struct MaterialLayout {
    pub(crate) layout: wgpu::BindGroupLayout,
    white: Texture,
}

impl MaterialLayout {
    pub fn new(gpu: &GpuContext) -> Self {
        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Material Bind Group Layout"),
                entries: &[
                    // Material uniforms
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Albedo map
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let white = Texture::from_rgba(gpu, &[255, 255, 255, 255], 1, 1, "Default White Texture");

        Self { layout, white }
    }
}

pub struct Material {
    buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    blend_mode: AlphaBlendMode,
    albedo_map: Option<Arc<Texture>>,
}

impl Material {
    pub fn new(gpu: &GpuContext, layout: &MaterialLayout, desc: MaterialDesc) -> Self {
        Self::with_albedo_map(gpu, layout, desc, None)
    }

    pub fn with_albedo_map(
        gpu: &GpuContext,
        layout: &MaterialLayout,
        desc: MaterialDesc,
        albedo_map: Option<Arc<Texture>>,
    ) -> Self {
        let data = desc.to_data(albedo_map.is_some());
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Material Uniform Buffer"),
                contents: bytemuck::bytes_of(&data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let texture = albedo_map.as_deref().unwrap_or(&layout.white);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &layout.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });

        Self {
            buffer,
            bind_group,
            blend_mode: desc.blend_mode,
            albedo_map,
        }
    }

    /// Rewrite the material parameters. The blend mode is fixed at creation.
    pub fn update(&self, gpu: &GpuContext, desc: MaterialDesc) {
        let mut data = desc.to_data(self.albedo_map.is_some());
        data.masked = (self.blend_mode == AlphaBlendMode::Masked) as u32;
        gpu.queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&data));
    }

    pub fn blend_mode(&self) -> AlphaBlendMode {
        self.blend_mode
    }

    pub fn is_double_sided(&self) -> bool {
        self.blend_mode == AlphaBlendMode::Masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_data_is_64_bytes() {
        assert_eq!(std::mem::size_of::<MaterialData>(), 64);
    }

    #[test]
    fn masked_desc_sets_flag_and_cutoff() {
        let data = MaterialDesc::default().masked(0.3).to_data(false);
        assert_eq!(data.masked, 1);
        assert_eq!(data.alpha_cutoff, 0.3);
        assert_eq!(data.use_albedo_map, 0);
    }

    #[test]
    fn emission_strength_rides_in_alpha() {
        let data = MaterialDesc::default()
            .with_emission(1.0, 0.5, 0.0, 4.0)
            .to_data(true);
        assert_eq!(data.emission, [1.0, 0.5, 0.0, 4.0]);
        assert_eq!(data.use_albedo_map, 1);
    }
}
