//! Fullscreen-triangle passes.
//!
//! A [`FullscreenPass`] draws one triangle over its target and reads its inputs from a bind
//! group built fresh for every draw, so the same pass can read whichever stage the frame
//! plan routes into it.
//!
//! # Bind groups
//!
//! - **Group 0**: frame uniforms (camera, lighting, post-processing, volumetrics)
//! - **Group 1**: `input_sampler` at binding 0, then one texture per input from binding 1
//! - **Group 2+**: pass-specific groups passed as `extra_layouts`
//!
//! [`FullscreenPass::blit`] drops the frame group and puts the inputs at group 0. It is
//! used to present a renderer output to a window surface.

use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};

/// How a pass input is declared in WGSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `texture_2d<f32>`, sampled with the linear sampler.
    Color,
    /// `texture_depth_2d`, read with `textureLoad`.
    Depth,
    /// `texture_2d<i32>`, read with `textureLoad`.
    Sint,
}

impl InputKind {
    fn sample_type(self) -> wgpu::TextureSampleType {
        match self {
            InputKind::Color => wgpu::TextureSampleType::Float { filterable: true },
            InputKind::Depth => wgpu::TextureSampleType::Depth,
            InputKind::Sint => wgpu::TextureSampleType::Sint,
        }
    }
}

/// Everything needed to build a fullscreen pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FullscreenDesc<'a> {
    pub label: &'a str,
    pub shader: ShaderId,
    pub entry_point: &'a str,
    pub inputs: &'a [InputKind],
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
}

impl<'a> FullscreenDesc<'a> {
    pub fn new(
        label: &'a str,
        shader: ShaderId,
        inputs: &'a [InputKind],
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            label,
            shader,
            entry_point: "fs",
            inputs,
            format,
            blend: None,
        }
    }

    pub fn entry(mut self, entry_point: &'a str) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn blend(mut self, blend: wgpu::BlendState) -> Self {
        self.blend = Some(blend);
        self
    }
}

pub struct FullscreenPass {
    label: String,
    pipeline: wgpu::RenderPipeline,
    input_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    input_count: usize,
    uses_frame: bool,
}

impl FullscreenPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        extra_layouts: &[&wgpu::BindGroupLayout],
        desc: FullscreenDesc<'_>,
    ) -> Self {
        Self::build(gpu, shaders, Some(frame_layout), extra_layouts, desc)
    }

    /// A pass with no frame uniforms, drawing `input` into a target of `format`.
    pub fn blit(gpu: &GpuContext, shaders: &ShaderLibrary, format: wgpu::TextureFormat) -> Self {
        Self::build(
            gpu,
            shaders,
            None,
            &[],
            FullscreenDesc::new("Blit", ShaderId::DrawTexture, &[InputKind::Color], format),
        )
    }

    fn build(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: Option<&wgpu::BindGroupLayout>,
        extra_layouts: &[&wgpu::BindGroupLayout],
        desc: FullscreenDesc<'_>,
    ) -> Self {
        let device = &gpu.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", desc.label)),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        entries.extend(desc.inputs.iter().enumerate().map(|(i, kind)| {
            wgpu::BindGroupLayoutEntry {
                binding: i as u32 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: kind.sample_type(),
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }
        }));

        let input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Input Bind Group Layout", desc.label)),
            entries: &entries,
        });

        let mut layouts: Vec<&wgpu::BindGroupLayout> = Vec::with_capacity(2 + extra_layouts.len());
        if let Some(frame_layout) = frame_layout {
            layouts.push(frame_layout);
        }
        layouts.push(&input_layout);
        layouts.extend_from_slice(extra_layouts);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", desc.label)),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let module = shaders.module(desc.shader);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{} Pipeline", desc.label)),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(desc.entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.format,
                    blend: desc.blend,
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
            label: desc.label.to_string(),
            pipeline,
            input_layout,
            sampler,
            input_count: desc.inputs.len(),
            uses_frame: frame_layout.is_some(),
        }
    }

    /// Bind group over `inputs`, in declaration order.
    pub fn bind_inputs(&self, gpu: &GpuContext, inputs: &[&wgpu::TextureView]) -> wgpu::BindGroup {
        debug_assert_eq!(inputs.len(), self.input_count, "{} input count", self.label);

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        }];
        entries.extend(inputs.iter().enumerate().map(|(i, view)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: wgpu::BindingResource::TextureView(view),
        }));

        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Input Bind Group", self.label)),
            layout: &self.input_layout,
            entries: &entries,
        })
    }

    /// Record the pass into an already open render pass.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        frame: Option<&wgpu::BindGroup>,
        inputs: &wgpu::BindGroup,
        extra: &[&wgpu::BindGroup],
    ) {
        pass.set_pipeline(&self.pipeline);
        let mut group = 0;
        if self.uses_frame {
            if let Some(frame) = frame {
                pass.set_bind_group(group, frame, &[]);
            }
            group += 1;
        }
        pass.set_bind_group(group, inputs, &[]);
        for (i, bind_group) in extra.iter().enumerate() {
            pass.set_bind_group(group + 1 + i as u32, *bind_group, &[]);
        }
        pass.draw(0..3, 0..1);
    }

    /// Open a render pass on `target`, bind `inputs`, and draw.
    pub fn run(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        inputs: &[&wgpu::TextureView],
        extra: &[&wgpu::BindGroup],
        target: wgpu::RenderPassColorAttachment<'_>,
    ) {
        let input_group = self.bind_inputs(gpu, inputs);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(target)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.draw(&mut pass, Some(frame), &input_group, extra);
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
