//! Shadow maps for the directional light and shadow-casting point lights.
//!
//! Both maps are allocated once in [`ShadowResources::new`]:
//!
//! - a `D2Array` depth texture with one layer per cascade ([`cascades`])
//! - a `CubeArray` depth texture with six layers per shadowed point light ([`point`])
//!
//! Every cascade and every cube face renders the draw list with its own
//! [`ShadowViewData`] slot, so a single frame upload serves all shadow passes.
//! The lighting pass samples both maps with the comparison [`ShadowResources::sampler`].

pub mod cascades;
pub mod point;

use glam::{Mat4, Vec3};

use crate::buffers::{DynamicUniform, ObjectData, ShadowViewData};
use crate::error::{RenderResult, RendererError};
use crate::framebuffer::DEPTH_FORMAT;
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::mesh::Vertex3d;
use crate::submission::ModelSubmission;

pub use cascades::{CASCADE_COUNT, CASCADE_LAYERS};
pub use point::CUBE_FACES;

/// Sizes fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowSettings {
    pub cascade_resolution: u32,
    pub point_resolution: u32,
    pub max_shadowed_lights: u32,
}

impl ShadowSettings {
    /// Shadow view slots: cascades first, then six per point light.
    pub fn view_slots(&self) -> u32 {
        CASCADE_LAYERS + self.max_shadowed_lights * CUBE_FACES as u32
    }

    /// Check the settings against device limits before allocating anything.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> RenderResult<()> {
        let max_dim = limits.max_texture_dimension_2d;
        if self.cascade_resolution > max_dim || self.point_resolution > max_dim {
            return Err(RendererError::ShadowResources(format!(
                "shadow resolution {}/{} exceeds the device limit of {max_dim}",
                self.cascade_resolution, self.point_resolution
            )));
        }
        let layers = self.max_shadowed_lights * CUBE_FACES as u32;
        if layers > limits.max_texture_array_layers {
            return Err(RendererError::ShadowResources(format!(
                "{} shadowed point lights need {layers} cube layers, the device allows {}",
                self.max_shadowed_lights, limits.max_texture_array_layers
            )));
        }
        Ok(())
    }
}

pub(crate) struct ShadowPipelines {
    cascade: wgpu::RenderPipeline,
    point: wgpu::RenderPipeline,
}

impl ShadowPipelines {
    pub(crate) fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        view_layout: &wgpu::BindGroupLayout,
        object_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shadow Pipeline Layout"),
                bind_group_layouts: &[view_layout, object_layout],
                push_constant_ranges: &[],
            });

        let unclipped_depth = gpu.supports(wgpu::Features::DEPTH_CLIP_CONTROL);

        let cascade = Self::depth_pipeline(
            gpu,
            &layout,
            shaders.module(ShaderId::ShadowCascade),
            "Cascade Shadow Pipeline",
            false,
            unclipped_depth,
        );
        let point = Self::depth_pipeline(
            gpu,
            &layout,
            shaders.module(ShaderId::ShadowPoint),
            "Point Shadow Pipeline",
            true,
            false,
        );

        Self { cascade, point }
    }

    fn depth_pipeline(
        gpu: &GpuContext,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        label: &str,
        writes_depth: bool,
        unclipped_depth: bool,
    ) -> wgpu::RenderPipeline {
        gpu.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs"),
                    buffers: &[Vertex3d::LAYOUT],
                    compilation_options: Default::default(),
                },
                // Point shadows store normalized distance through frag_depth
                fragment: writes_depth.then(|| wgpu::FragmentState {
                    module,
                    entry_point: Some("fs"),
                    targets: &[],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Front),
                    unclipped_depth,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: 2,
                        slope_scale: 2.0,
                        clamp: 0.0,
                    },
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}

/// Views over the two shadow map textures.
struct ShadowMaps {
    cascade_layers: Vec<wgpu::TextureView>,
    cascade_view: wgpu::TextureView,
    point_faces: Vec<wgpu::TextureView>,
    point_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl ShadowMaps {
    fn new(gpu: &GpuContext, settings: &ShadowSettings) -> Self {
        let depth_texture = |label: &str, size: u32, layers: u32| {
            gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };

        let layer_views = |texture: &wgpu::Texture, count: u32, label: &str| {
            (0..count)
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(label),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect::<Vec<_>>()
        };

        let cascade_map = depth_texture(
            "Cascaded Shadow Map",
            settings.cascade_resolution,
            CASCADE_LAYERS,
        );
        let cascade_layers = layer_views(&cascade_map, CASCADE_LAYERS, "Cascade Layer View");
        let cascade_view = cascade_map.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Cascaded Shadow Map View"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let point_layers = settings.max_shadowed_lights * CUBE_FACES as u32;
        let point_map = depth_texture(
            "Point Shadow Cube Array",
            settings.point_resolution,
            point_layers,
        );
        let point_faces = layer_views(&point_map, point_layers, "Point Shadow Face View");
        let point_view = point_map.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Point Shadow Cube Array View"),
            dimension: Some(wgpu::TextureViewDimension::CubeArray),
            ..Default::default()
        });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        Self {
            cascade_layers,
            cascade_view,
            point_faces,
            point_view,
            sampler,
        }
    }
}

/// Shadow map textures, per-view uniforms and the depth-only pipelines.
pub struct ShadowResources {
    settings: ShadowSettings,
    maps: ShadowMaps,
    views: DynamicUniform<ShadowViewData>,
    pipelines: ShadowPipelines,
}

impl ShadowResources {
    /// Allocate both shadow maps.
    ///
    /// Fails with [`RendererError::ShadowResources`] if the device cannot hold them. The
    /// renderer treats that as fatal.
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        object_layout: &wgpu::BindGroupLayout,
        settings: ShadowSettings,
    ) -> RenderResult<Self> {
        let fail = |err: RendererError| {
            log::error!("{err}");
            err
        };

        if settings.max_shadowed_lights == 0 {
            return Err(fail(RendererError::ShadowResources(
                "at least one shadowed point light is required".into(),
            )));
        }
        settings.check_limits(&gpu.limits).map_err(fail)?;

        let maps = gpu
            .validation_scope(|| ShadowMaps::new(gpu, &settings))
            .map_err(|e| fail(RendererError::ShadowResources(e.to_string())))?;

        let views = DynamicUniform::new(
            gpu,
            "Shadow View",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            settings.view_slots(),
        );
        let pipelines = ShadowPipelines::new(gpu, shaders, views.layout(), object_layout);

        log::info!(
            "shadow maps: {} cascades at {}², {} point cubes at {}²",
            CASCADE_LAYERS,
            settings.cascade_resolution,
            settings.max_shadowed_lights,
            settings.point_resolution
        );

        Ok(Self {
            settings,
            maps,
            views,
            pipelines,
        })
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        object_layout: &wgpu::BindGroupLayout,
    ) -> ShadowPipelines {
        ShadowPipelines::new(gpu, shaders, self.views.layout(), object_layout)
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: ShadowPipelines) {
        self.pipelines = pipelines;
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// All cascades as one `D2Array` view.
    pub(crate) fn cascade_view(&self) -> &wgpu::TextureView {
        &self.maps.cascade_view
    }

    /// Every shadow cube as one `CubeArray` view.
    pub(crate) fn point_view(&self) -> &wgpu::TextureView {
        &self.maps.point_view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.maps.sampler
    }

    /// Upload every cascade matrix and every shadowed light's face views in one write.
    pub fn write_views(
        &mut self,
        gpu: &GpuContext,
        cascades: &[Mat4],
        point_lights: &[(u32, Vec3, f32)],
    ) {
        let mut slots = vec![
            ShadowViewData {
                view_projection: Mat4::IDENTITY.to_cols_array_2d(),
                light_position_range: [0.0, 0.0, 0.0, 1.0],
            };
            self.settings.view_slots() as usize
        ];

        for (slot, matrix) in slots.iter_mut().zip(cascades.iter().take(CASCADE_LAYERS as usize)) {
            slot.view_projection = matrix.to_cols_array_2d();
        }
        for &(index, position, range) in point_lights {
            if index >= self.settings.max_shadowed_lights {
                continue;
            }
            let first = Self::point_slot(index, 0);
            slots[first..first + CUBE_FACES].copy_from_slice(&point::face_views(position, range));
        }

        self.views.write(gpu, &slots);
    }

    fn point_slot(index: u32, face: usize) -> usize {
        CASCADE_LAYERS as usize + point::base_layer(index) as usize + face
    }

    fn draw_models(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
    ) -> u32 {
        for (i, submission) in draw_list.iter().enumerate() {
            pass.set_bind_group(1, objects.bind_group(), &[objects.offset(i)]);
            for mesh in &submission.model.meshes {
                mesh.draw(pass);
            }
        }
        draw_list.len() as u32
    }

    /// Render the draw list into every cascade layer. Returns the draw call count.
    pub fn encode_cascades(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
    ) -> u32 {
        let mut draws = 0;
        for (layer, view) in self.maps.cascade_layers.iter().enumerate() {
            let mut pass = Self::begin_depth_pass(encoder, view, "Cascade Shadow Pass");
            pass.set_pipeline(&self.pipelines.cascade);
            pass.set_bind_group(0, self.views.bind_group(), &[self.views.offset(layer)]);
            draws += self.draw_models(&mut pass, objects, draw_list);
        }
        draws
    }

    /// Render the draw list into the six faces of each listed shadow cube.
    pub fn encode_point_lights(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
        shadow_indices: &[u32],
    ) -> u32 {
        let mut draws = 0;
        for &index in shadow_indices {
            if index >= self.settings.max_shadowed_lights {
                continue;
            }
            for face in 0..CUBE_FACES {
                let layer = (point::base_layer(index) as usize) + face;
                let view = &self.maps.point_faces[layer];
                let mut pass = Self::begin_depth_pass(encoder, view, "Point Shadow Pass");
                pass.set_pipeline(&self.pipelines.point);
                pass.set_bind_group(
                    0,
                    self.views.bind_group(),
                    &[self.views.offset(Self::point_slot(index, face))],
                );
                draws += self.draw_models(&mut pass, objects, draw_list);
            }
        }
        draws
    }

    fn begin_depth_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        view: &'e wgpu::TextureView,
        label: &str,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ShadowSettings {
        ShadowSettings {
            cascade_resolution: 4096,
            point_resolution: 1024,
            max_shadowed_lights: 10,
        }
    }

    #[test]
    fn view_slots_cover_cascades_and_faces() {
        assert_eq!(settings().view_slots(), 65);
        assert_eq!(ShadowResources::point_slot(0, 0), 5);
        assert_eq!(ShadowResources::point_slot(9, 5), 64);
    }

    #[test]
    fn limits_reject_oversized_maps() {
        let limits = wgpu::Limits::downlevel_defaults();
        let err = ShadowSettings {
            cascade_resolution: limits.max_texture_dimension_2d * 2,
            ..settings()
        }
        .check_limits(&limits);
        assert!(matches!(err, Err(RendererError::ShadowResources(_))));

        let too_many = ShadowSettings {
            max_shadowed_lights: limits.max_texture_array_layers,
            ..settings()
        };
        assert!(too_many.check_limits(&limits).is_err());
    }

    #[test]
    fn default_limits_hold_default_settings() {
        assert!(settings().check_limits(&wgpu::Limits::default()).is_ok());
    }
}
