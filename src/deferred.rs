//! G-buffer fill and the deferred lighting resolve.
//!
//! Geometry is drawn twice per frame. The pre-depth pass lays down depth only, then the
//! G-buffer pass re-draws with `Equal` depth and no depth writes, so every G-buffer texel is
//! shaded exactly once. The lighting resolve is a fullscreen pass over the G-buffer.
//!
//! # Bind groups
//!
//! Geometry pipelines:
//!
//! - **Group 0**: frame uniforms
//! - **Group 1**: per-model [`ObjectData`], dynamic offset = draw list index
//! - **Group 2**: material (pre-depth and G-buffer only)
//!
//! The lighting resolve uses group 0 for frame uniforms, group 1 for the G-buffer inputs, and
//! group 2 for everything lights need: the clustered light lists, both shadow maps, and
//! the IBL cubes.

use crate::buffers::{DynamicUniform, ObjectData};
use crate::clustering::ClusterCulling;
use crate::error::RenderResult;
use crate::framebuffer::{
    AttachmentSemantic, COLOR_FORMAT, DEPTH_FORMAT, ENTITY_ID_FORMAT, Framebuffer, MATERIAL_FORMAT,
};
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::ibl::Ibl;
use crate::material::MaterialLayout;
use crate::mesh::Vertex3d;
use crate::post_process::fullscreen::{FullscreenDesc, FullscreenPass, InputKind};
use crate::shadows::ShadowResources;
use crate::submission::ModelSubmission;

/// Color targets of the G-buffer pass, in `@location` order.
const GBUFFER_TARGETS: [wgpu::TextureFormat; 5] = [
    COLOR_FORMAT,
    ENTITY_ID_FORMAT,
    COLOR_FORMAT,
    COLOR_FORMAT,
    MATERIAL_FORMAT,
];

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, kind: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    }
}

fn lighting_layout(gpu: &GpuContext) -> wgpu::BindGroupLayout {
    use wgpu::TextureViewDimension as Dim;
    let depth = wgpu::TextureSampleType::Depth;
    let float = wgpu::TextureSampleType::Float { filterable: true };

    gpu.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lighting Bind Group Layout"),
            entries: &[
                // Point lights, light index list, light grid
                storage_entry(0),
                storage_entry(1),
                storage_entry(2),
                // Shadow maps
                texture_entry(3, depth, Dim::D2Array),
                texture_entry(4, depth, Dim::CubeArray),
                sampler_entry(5, wgpu::SamplerBindingType::Comparison),
                // Irradiance, prefilter, BRDF LUT, environment, flow map
                texture_entry(6, float, Dim::Cube),
                texture_entry(7, float, Dim::Cube),
                texture_entry(8, float, Dim::D2),
                texture_entry(9, float, Dim::Cube),
                texture_entry(10, float, Dim::Cube),
                sampler_entry(11, wgpu::SamplerBindingType::Filtering),
            ],
        })
}

fn lighting_bind_group(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    clusters: &ClusterCulling,
    shadows: &ShadowResources,
    ibl: &Ibl,
) -> wgpu::BindGroup {
    let [lights, indices, grid] = clusters.lighting_buffers();
    let view = |binding, view| wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(view),
    };

    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Lighting Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: indices.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: grid.as_entire_binding(),
            },
            view(3, shadows.cascade_view()),
            view(4, shadows.point_view()),
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(shadows.sampler()),
            },
            view(6, ibl.irradiance_view()),
            view(7, ibl.prefilter_view()),
            view(8, ibl.brdf_lut_view()),
            view(9, ibl.environment().view()),
            view(10, ibl.flow_map_view()),
            wgpu::BindGroupEntry {
                binding: 11,
                resource: wgpu::BindingResource::Sampler(ibl.sampler()),
            },
        ],
    })
}

/// Layouts the geometry pipelines are built against.
pub(crate) struct GeometryLayouts<'a> {
    pub frame: &'a wgpu::BindGroupLayout,
    pub object: &'a wgpu::BindGroupLayout,
    pub material: &'a MaterialLayout,
}

pub(crate) struct DeferredPipelines {
    pre_depth: wgpu::RenderPipeline,
    pre_depth_masked: wgpu::RenderPipeline,
    gbuffer: wgpu::RenderPipeline,
    gbuffer_masked: wgpu::RenderPipeline,
    outline_depth: wgpu::RenderPipeline,
    wireframe: wgpu::RenderPipeline,
    wireframe_selected: wgpu::RenderPipeline,
    lighting: FullscreenPass,
    visualization: FullscreenPass,
}

struct GeometryDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    fragment_entry: Option<&'a str>,
    targets: &'a [Option<wgpu::ColorTargetState>],
    cull_mode: Option<wgpu::Face>,
    polygon_mode: wgpu::PolygonMode,
    depth_compare: wgpu::CompareFunction,
    depth_write: bool,
}

fn geometry_pipeline(gpu: &GpuContext, desc: GeometryDesc<'_>) -> wgpu::RenderPipeline {
    gpu.device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(desc.layout),
            vertex: wgpu::VertexState {
                module: desc.module,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: desc.fragment_entry.map(|entry| wgpu::FragmentState {
                module: desc.module,
                entry_point: Some(entry),
                targets: desc.targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: desc.cull_mode,
                polygon_mode: desc.polygon_mode,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: desc.depth_write,
                depth_compare: desc.depth_compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
}

impl DeferredPipelines {
    fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        layouts: &GeometryLayouts<'_>,
        lighting_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let device = &gpu.device;
        let pipeline_layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
        };
        let material_layout = pipeline_layout(
            "Material Geometry Pipeline Layout",
            &[layouts.frame, layouts.object, &layouts.material.layout],
        );
        let plain_layout = pipeline_layout(
            "Plain Geometry Pipeline Layout",
            &[layouts.frame, layouts.object],
        );

        let pre_depth_module = shaders.module(ShaderId::PreDepth);
        let gbuffer_module = shaders.module(ShaderId::GBuffer);

        let pre_depth = |label, cull_mode| {
            geometry_pipeline(
                gpu,
                GeometryDesc {
                    label,
                    layout: &material_layout,
                    module: pre_depth_module,
                    fragment_entry: Some("fs"),
                    targets: &[],
                    cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    depth_compare: wgpu::CompareFunction::Less,
                    depth_write: true,
                },
            )
        };

        let gbuffer_targets = GBUFFER_TARGETS.map(|format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        });
        let gbuffer = |label, cull_mode| {
            geometry_pipeline(
                gpu,
                GeometryDesc {
                    label,
                    layout: &material_layout,
                    module: gbuffer_module,
                    fragment_entry: Some("fs"),
                    targets: &gbuffer_targets,
                    cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    depth_compare: wgpu::CompareFunction::Equal,
                    depth_write: false,
                },
            )
        };

        let polygon_mode = if gpu.supports(wgpu::Features::POLYGON_MODE_LINE) {
            wgpu::PolygonMode::Line
        } else {
            log::warn!("POLYGON_MODE_LINE unsupported, wireframe view draws filled polygons");
            wgpu::PolygonMode::Fill
        };
        let color_target = [Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let wireframe = |label, entry| {
            geometry_pipeline(
                gpu,
                GeometryDesc {
                    label,
                    layout: &plain_layout,
                    module: gbuffer_module,
                    fragment_entry: Some(entry),
                    targets: &color_target,
                    cull_mode: None,
                    polygon_mode,
                    depth_compare: wgpu::CompareFunction::Less,
                    depth_write: true,
                },
            )
        };

        let outline_depth = geometry_pipeline(
            gpu,
            GeometryDesc {
                label: "Outline Depth Pipeline",
                layout: &plain_layout,
                module: pre_depth_module,
                fragment_entry: None,
                targets: &[],
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                depth_compare: wgpu::CompareFunction::Less,
                depth_write: true,
            },
        );

        let lighting = FullscreenPass::new(
            gpu,
            shaders,
            layouts.frame,
            &[lighting_layout],
            FullscreenDesc::new(
                "Deferred Lighting",
                ShaderId::DeferredLighting,
                &[
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::Depth,
                ],
                COLOR_FORMAT,
            ),
        );
        let visualization = FullscreenPass::new(
            gpu,
            shaders,
            layouts.frame,
            &[],
            FullscreenDesc::new(
                "Buffer Visualization",
                ShaderId::BufferVisualization,
                &[
                    InputKind::Color,
                    InputKind::Sint,
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::Depth,
                ],
                COLOR_FORMAT,
            ),
        );

        Self {
            pre_depth: pre_depth("Pre-Depth Pipeline", Some(wgpu::Face::Back)),
            pre_depth_masked: pre_depth("Pre-Depth Masked Pipeline", None),
            gbuffer: gbuffer("G-Buffer Pipeline", Some(wgpu::Face::Back)),
            gbuffer_masked: gbuffer("G-Buffer Masked Pipeline", None),
            outline_depth,
            wireframe: wireframe("Wireframe Pipeline", "fs_wireframe"),
            wireframe_selected: wireframe("Wireframe Selected Pipeline", "fs_wireframe_selected"),
            lighting,
            visualization,
        }
    }
}

/// Geometry passes into the active framebuffer and the two fullscreen resolves.
pub struct DeferredPasses {
    lighting_layout: wgpu::BindGroupLayout,
    lighting_bind_group: wgpu::BindGroup,
    pipelines: DeferredPipelines,
}

impl DeferredPasses {
    pub(crate) fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        layouts: &GeometryLayouts<'_>,
        clusters: &ClusterCulling,
        shadows: &ShadowResources,
        ibl: &Ibl,
    ) -> Self {
        let lighting_layout = lighting_layout(gpu);
        // Every resource in the group is allocated once, so the group never goes stale
        let lighting_bind_group =
            lighting_bind_group(gpu, &lighting_layout, clusters, shadows, ibl);
        let pipelines = DeferredPipelines::new(gpu, shaders, layouts, &lighting_layout);

        Self {
            lighting_layout,
            lighting_bind_group,
            pipelines,
        }
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        layouts: &GeometryLayouts<'_>,
    ) -> DeferredPipelines {
        DeferredPipelines::new(gpu, shaders, layouts, &self.lighting_layout)
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: DeferredPipelines) {
        self.pipelines = pipelines;
    }

    fn draw_with_materials(
        pass: &mut wgpu::RenderPass<'_>,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
        opaque: &wgpu::RenderPipeline,
        masked: &wgpu::RenderPipeline,
    ) -> u32 {
        for (i, submission) in draw_list.iter().enumerate() {
            pass.set_bind_group(1, objects.bind_group(), &[objects.offset(i)]);
            for (index, mesh) in submission.model.meshes.iter().enumerate() {
                let Some(material) = submission.model.material_for(index, &submission.materials)
                else {
                    continue;
                };
                pass.set_pipeline(if material.is_double_sided() { masked } else { opaque });
                pass.set_bind_group(2, Some(&material.bind_group), &[]);
                mesh.draw(pass);
            }
        }
        draw_list.len() as u32
    }

    /// Depth-only draw of every model. Returns the draw call count.
    pub(crate) fn pre_depth(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
        active: &Framebuffer,
    ) -> RenderResult<u32> {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Pre-Depth Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(active.depth_attachment(true)?),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, frame, &[]);
        Ok(Self::draw_with_materials(
            &mut pass,
            objects,
            draw_list,
            &self.pipelines.pre_depth,
            &self.pipelines.pre_depth_masked,
        ))
    }

    /// Fill the G-buffer, then draw the selected models into the outline mask.
    ///
    /// Only the G-buffer draws are counted.
    pub(crate) fn gbuffer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
        active: &Framebuffer,
        outline: &Framebuffer,
    ) -> RenderResult<u32> {
        let draws = {
            let color_attachments = active.color_attachments(true);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("G-Buffer Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(active.depth_attachment(false)?),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, frame, &[]);
            Self::draw_with_materials(
                &mut pass,
                objects,
                draw_list,
                &self.pipelines.gbuffer,
                &self.pipelines.gbuffer_masked,
            )
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Outline Depth Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(outline.depth_attachment(true)?),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.outline_depth);
        pass.set_bind_group(0, frame, &[]);
        for (i, submission) in draw_list.iter().enumerate().filter(|(_, s)| s.selected) {
            pass.set_bind_group(1, objects.bind_group(), &[objects.offset(i)]);
            for mesh in &submission.model.meshes {
                mesh.draw(&mut pass);
            }
        }

        Ok(draws)
    }

    /// Line-polygon draw of every model straight into the active color and depth.
    pub(crate) fn wireframe(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        objects: &DynamicUniform<ObjectData>,
        draw_list: &[ModelSubmission],
        active: &Framebuffer,
    ) -> RenderResult<u32> {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Wireframe Pass"),
            color_attachments: &[Some(active.color_attachment(AttachmentSemantic::Color, true)?)],
            depth_stencil_attachment: Some(active.depth_attachment(true)?),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, frame, &[]);
        for (i, submission) in draw_list.iter().enumerate() {
            pass.set_pipeline(if submission.selected {
                &self.pipelines.wireframe_selected
            } else {
                &self.pipelines.wireframe
            });
            pass.set_bind_group(1, objects.bind_group(), &[objects.offset(i)]);
            for mesh in &submission.model.meshes {
                mesh.draw(&mut pass);
            }
        }
        Ok(draw_list.len() as u32)
    }

    /// Resolve lighting from the G-buffer in `active` into `target`.
    pub(crate) fn lighting(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        active: &Framebuffer,
        target: &Framebuffer,
    ) -> RenderResult<()> {
        use AttachmentSemantic::*;
        self.pipelines.lighting.run(
            gpu,
            encoder,
            frame,
            &[
                active.bind_attachment(Color)?,
                active.bind_attachment(Normal)?,
                active.bind_attachment(Emissive)?,
                active.bind_attachment(Material)?,
                active.bind_attachment(Depth)?,
            ],
            &[&self.lighting_bind_group],
            target.color_attachment(Color, true)?,
        );
        Ok(())
    }

    /// Show one raw G-buffer channel, selected by `PostProcessingData::visualization_mode`.
    pub(crate) fn visualize(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        active: &Framebuffer,
        target: &Framebuffer,
    ) -> RenderResult<()> {
        use AttachmentSemantic::*;
        self.pipelines.visualization.run(
            gpu,
            encoder,
            frame,
            &[
                active.bind_attachment(Color)?,
                active.bind_attachment(EntityId)?,
                active.bind_attachment(Normal)?,
                active.bind_attachment(Emissive)?,
                active.bind_attachment(Material)?,
                active.bind_attachment(Depth)?,
            ],
            &[],
            target.color_attachment(Color, true)?,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FramebufferSpec;

    #[test]
    fn gbuffer_targets_follow_attachment_order() {
        assert_eq!(FramebufferSpec::gbuffer(8, 8).color_formats(), GBUFFER_TARGETS.to_vec());
    }
}
