//! Depth of field and bokeh sprites.
//!
//! The blur itself is a fullscreen pass driven by the focus ranges in
//! `PostProcessingData`. Bokeh runs entirely on the GPU:
//!
//! 1. `isolate` (compute, 16×16 tiles): bright out-of-focus pixels append a sprite
//! 2. `finalize` (compute, one invocation): turn the sprite count into indirect draw args
//! 3. `draw`: instanced quads via `draw_indirect`, blended additively over the blur
//!
//! The sprite count never travels back to the CPU.

use bytemuck::{Pod, Zeroable};

use crate::error::RenderResult;
use crate::framebuffer::{AttachmentSemantic, COLOR_FORMAT, Framebuffer};
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::post_process::fullscreen::{FullscreenDesc, FullscreenPass, InputKind};
use crate::texture::Texture;

pub const MAX_BOKEH_COUNT: u32 = 2048;
pub const BOKEH_TILE_SIZE: u32 = 16;

/// One bokeh sprite, written by the isolate shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BokehSprite {
    /// Screen position in uv.
    pub position: [f32; 2],
    pub size: f32,
    pub _pad: f32,
    pub color: [f32; 4],
}

/// Workgroups covering a `width × height` frame.
pub fn isolate_dispatch(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(BOKEH_TILE_SIZE), height.div_ceil(BOKEH_TILE_SIZE))
}

/// Indirect args the finalize shader produces for `count` appended sprites.
pub fn expected_draw_args(count: u32) -> wgpu::util::DrawIndirectArgs {
    wgpu::util::DrawIndirectArgs {
        vertex_count: 6,
        instance_count: count.min(MAX_BOKEH_COUNT),
        first_vertex: 0,
        first_instance: 0,
    }
}

pub(crate) struct DofPipelines {
    blur: FullscreenPass,
    isolate: wgpu::ComputePipeline,
    finalize: wgpu::ComputePipeline,
    draw: wgpu::RenderPipeline,
}

impl DofPipelines {
    fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        compute_layout: &wgpu::BindGroupLayout,
        draw_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let device = &gpu.device;
        let bokeh = shaders.module(ShaderId::Bokeh);

        let blur = FullscreenPass::new(
            gpu,
            shaders,
            frame_layout,
            &[],
            FullscreenDesc::new(
                "Depth Of Field",
                ShaderId::DepthOfField,
                &[InputKind::Color, InputKind::Depth],
                COLOR_FORMAT,
            ),
        );

        let compute_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Bokeh Compute Pipeline Layout"),
                bind_group_layouts: &[frame_layout, compute_layout],
                push_constant_ranges: &[],
            });
        let compute = |entry: &str, label: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&compute_pipeline_layout),
                module: bokeh,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let draw_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bokeh Draw Pipeline Layout"),
            bind_group_layouts: &[frame_layout, draw_layout],
            push_constant_ranges: &[],
        });
        let additive = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        };
        let draw = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Bokeh Draw Pipeline"),
            layout: Some(&draw_pipeline_layout),
            vertex: wgpu::VertexState {
                module: bokeh,
                entry_point: Some("vs_draw"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: bokeh,
                entry_point: Some("fs_draw"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState {
                        color: additive,
                        alpha: additive,
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            blur,
            isolate: compute("isolate", "Bokeh Isolate Pipeline"),
            finalize: compute("finalize", "Bokeh Finalize Pipeline"),
            draw,
        }
    }
}

fn storage_entry(
    binding: u32,
    read_only: bool,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub struct DepthOfField {
    sprites: wgpu::Buffer,
    counter: wgpu::Buffer,
    indirect: wgpu::Buffer,
    compute_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    draw_bind_group: wgpu::BindGroup,
    shape: Texture,
    pipelines: DofPipelines,
}

impl DepthOfField {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        shape: Texture,
    ) -> Self {
        let device = &gpu.device;

        let sprites = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bokeh Sprite Buffer"),
            size: MAX_BOKEH_COUNT as u64 * std::mem::size_of::<BokehSprite>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bokeh Counter Buffer"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indirect = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bokeh Indirect Buffer"),
            size: std::mem::size_of::<wgpu::util::DrawIndirectArgs>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let compute = wgpu::ShaderStages::COMPUTE;
        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bokeh Compute Bind Group Layout"),
            entries: &[
                // Prior color
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: compute,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Scene depth
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: compute,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                storage_entry(2, false, compute),
                storage_entry(3, false, compute),
                storage_entry(4, false, compute),
            ],
        });

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bokeh Draw Bind Group Layout"),
            entries: &[
                storage_entry(0, true, wgpu::ShaderStages::VERTEX),
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

        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bokeh Draw Bind Group"),
            layout: &draw_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sprites.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(shape.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(shape.sampler()),
                },
            ],
        });

        let pipelines =
            DofPipelines::new(gpu, shaders, frame_layout, &compute_layout, &draw_layout);

        Self {
            sprites,
            counter,
            indirect,
            compute_layout,
            draw_layout,
            draw_bind_group,
            shape,
            pipelines,
        }
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> DofPipelines {
        DofPipelines::new(gpu, shaders, frame_layout, &self.compute_layout, &self.draw_layout)
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: DofPipelines) {
        self.pipelines = pipelines;
    }

    pub fn shape(&self) -> &Texture {
        &self.shape
    }

    /// Focus-range blur of `prior` into `target`.
    pub fn blur(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        prior: &Framebuffer,
        depth: &wgpu::TextureView,
        target: &Framebuffer,
    ) -> RenderResult<()> {
        self.pipelines.blur.run(
            gpu,
            encoder,
            frame,
            &[prior.bind_attachment(AttachmentSemantic::Color)?, depth],
            &[],
            target.color_attachment(AttachmentSemantic::Color, true)?,
        );
        Ok(())
    }

    /// Isolate bokeh from `source` and splat the sprites over `target`.
    ///
    /// `source` and `target` must be different framebuffers.
    pub fn bokeh(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        source: &Framebuffer,
        depth: &wgpu::TextureView,
        target: &Framebuffer,
    ) -> RenderResult<()> {
        gpu.queue.write_buffer(&self.counter, 0, bytemuck::bytes_of(&[0u32; 4]));

        let compute_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bokeh Compute Bind Group"),
            layout: &self.compute_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        source.bind_attachment(AttachmentSemantic::Color)?,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.sprites.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.indirect.as_entire_binding(),
                },
            ],
        });

        let (x, y) = isolate_dispatch(source.width(), source.height());
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bokeh Compute Pass"),
                timestamp_writes: None,
            });
            pass.set_bind_group(0, frame, &[]);
            pass.set_bind_group(1, &compute_group, &[]);
            pass.set_pipeline(&self.pipelines.isolate);
            pass.dispatch_workgroups(x, y, 1);
            pass.set_pipeline(&self.pipelines.finalize);
            pass.dispatch_workgroups(1, 1, 1);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bokeh Draw Pass"),
            color_attachments: &[Some(target.color_attachment(AttachmentSemantic::Color, false)?)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.draw);
        pass.set_bind_group(0, frame, &[]);
        pass.set_bind_group(1, &self.draw_bind_group, &[]);
        pass.draw_indirect(&self.indirect, 0);
        Ok(())
    }

    /// The last indirect args the finalize shader wrote.
    pub fn read_draw_args(&self, gpu: &GpuContext) -> RenderResult<wgpu::util::DrawIndirectArgs> {
        let bytes = gpu.read_storage(&self.indirect, self.indirect.size())?;
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        Ok(wgpu::util::DrawIndirectArgs {
            vertex_count: words.first().copied().unwrap_or(0),
            instance_count: words.get(1).copied().unwrap_or(0),
            first_vertex: words.get(2).copied().unwrap_or(0),
            first_instance: words.get(3).copied().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<BokehSprite>(), 32);
    }

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(isolate_dispatch(1920, 1080), (120, 68));
        assert_eq!(isolate_dispatch(1, 1), (1, 1));
    }

    #[test]
    fn instance_count_is_capped() {
        assert_eq!(expected_draw_args(10).instance_count, 10);
        assert_eq!(expected_draw_args(5000).instance_count, MAX_BOKEH_COUNT);
        assert_eq!(expected_draw_args(0).vertex_count, 6);
    }
}
