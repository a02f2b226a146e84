//! Off-screen framebuffers with named attachments.
//!
//! A [`Framebuffer`] is a set of same-sized textures that can be rendered to as one pass
//! target and then sampled by later passes. Attachments are addressed by
//! [`AttachmentSemantic`] rather than by slot index, so a pass asks for
//! `bind_attachment(AttachmentSemantic::Normal)` and never needs to know where the normal
//! buffer sits in the attachment list.
//!
//! # Attachment order
//!
//! Color attachments are bound as render targets in the order they were declared in the
//! [`FramebufferSpec`]. That order is the `@location(n)` order of fragment shader outputs.
//! The depth attachment (if any) is never a color target.
//!
//! # Example
//!
//! ```ignore
//! let mut gbuffer = Framebuffer::new(&gpu, FramebufferSpec::gbuffer(1280, 720));
//! let normals = gbuffer.bind_attachment(AttachmentSemantic::Normal)?;
//!
//! // After a window resize
//! gbuffer.resize(&gpu, 1920, 1080);
//! ```

use crate::error::{RenderResult, RendererError};
use crate::gpu::GpuContext;
use crate::texture::RendererId;

/// What an attachment stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSemantic {
    /// Lit color, or albedo (rgb) and ambient occlusion (a) inside the G-buffer.
    Color,
    /// Integer entity id per pixel, cleared to -1.
    EntityId,
    /// World-space normal.
    Normal,
    Emissive,
    /// Roughness, metallic, specular, alpha.
    Material,
    Depth,
}

impl AttachmentSemantic {
    pub fn is_depth(self) -> bool {
        self == AttachmentSemantic::Depth
    }

    fn clear_color(self) -> wgpu::Color {
        match self {
            AttachmentSemantic::EntityId => wgpu::Color {
                r: -1.0,
                g: 0.0,
                b: 0.0,
                a: 0.0,
            },
            _ => wgpu::Color::TRANSPARENT,
        }
    }
}

/// Semantics the renderer writes into the active framebuffer.
pub const GBUFFER_SEMANTICS: [AttachmentSemantic; 6] = [
    AttachmentSemantic::Color,
    AttachmentSemantic::EntityId,
    AttachmentSemantic::Normal,
    AttachmentSemantic::Emissive,
    AttachmentSemantic::Material,
    AttachmentSemantic::Depth,
];

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const ENTITY_ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Sint;
pub const MATERIAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub semantic: AttachmentSemantic,
    pub format: wgpu::TextureFormat,
}

/// Description of a framebuffer: label, size and ordered attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferSpec {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub attachments: Vec<AttachmentSpec>,
}

impl FramebufferSpec {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            attachments: Vec::new(),
        }
    }

    /// Add an attachment. Declaring a semantic twice replaces the earlier format.
    pub fn with(mut self, semantic: AttachmentSemantic, format: wgpu::TextureFormat) -> Self {
        if let Some(existing) = self.attachments.iter_mut().find(|a| a.semantic == semantic) {
            existing.format = format;
        } else {
            self.attachments.push(AttachmentSpec { semantic, format });
        }
        self
    }

    /// The full G-buffer layout the renderer requires of an active framebuffer.
    pub fn gbuffer(width: u32, height: u32) -> Self {
        Self::new("Active Framebuffer", width, height)
            .with(AttachmentSemantic::Color, COLOR_FORMAT)
            .with(AttachmentSemantic::EntityId, ENTITY_ID_FORMAT)
            .with(AttachmentSemantic::Normal, COLOR_FORMAT)
            .with(AttachmentSemantic::Emissive, COLOR_FORMAT)
            .with(AttachmentSemantic::Material, MATERIAL_FORMAT)
            .with(AttachmentSemantic::Depth, DEPTH_FORMAT)
    }

    /// A single HDR color attachment, used by most post-processing stages.
    pub fn color(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self::new(label, width, height).with(AttachmentSemantic::Color, COLOR_FORMAT)
    }

    pub fn depth_only(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self::new(label, width, height).with(AttachmentSemantic::Depth, DEPTH_FORMAT)
    }

    pub fn has(&self, semantic: AttachmentSemantic) -> bool {
        self.attachments.iter().any(|a| a.semantic == semantic)
    }

    /// Semantics from `required` that this spec does not declare.
    pub fn missing(&self, required: &[AttachmentSemantic]) -> Vec<AttachmentSemantic> {
        required.iter().copied().filter(|s| !self.has(*s)).collect()
    }

    /// Formats of the color attachments in target order.
    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.attachments
            .iter()
            .filter(|a| !a.semantic.is_depth())
            .map(|a| a.format)
            .collect()
    }
}

struct Attachment {
    spec: AttachmentSpec,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    id: RendererId,
}

/// A group of same-sized render targets that later passes can sample.
pub struct Framebuffer {
    spec: FramebufferSpec,
    attachments: Vec<Attachment>,
}

impl Framebuffer {
    /// Allocate every attachment in `spec`.
    ///
    /// Zero dimensions are clamped to 1 so a minimized viewport never produces an invalid
    /// texture.
    pub fn new(gpu: &GpuContext, mut spec: FramebufferSpec) -> Self {
        spec.width = spec.width.max(1);
        spec.height = spec.height.max(1);
        let attachments = Self::allocate(gpu, &spec);
        Self { spec, attachments }
    }

    fn allocate(gpu: &GpuContext, spec: &FramebufferSpec) -> Vec<Attachment> {
        spec.attachments
            .iter()
            .map(|a| {
                let label = format!("{} {:?}", spec.label, a.semantic);
                let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&label),
                    size: wgpu::Extent3d {
                        width: spec.width,
                        height: spec.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: a.format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Attachment {
                    spec: *a,
                    texture,
                    view,
                    id: RendererId::next(),
                }
            })
            .collect()
    }

    /// Reallocate every attachment at the new size.
    ///
    /// Returns `false` (and does nothing) if the size is unchanged or zero.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width == self.spec.width && height == self.spec.height)
        {
            return false;
        }
        self.spec.width = width;
        self.spec.height = height;
        self.attachments = Self::allocate(gpu, &self.spec);
        true
    }

    pub fn spec(&self) -> &FramebufferSpec {
        &self.spec
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    pub fn has(&self, semantic: AttachmentSemantic) -> bool {
        self.spec.has(semantic)
    }

    fn find(&self, semantic: AttachmentSemantic) -> RenderResult<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.spec.semantic == semantic)
            .ok_or_else(|| RendererError::MissingAttachment {
                label: self.spec.label.clone(),
                semantic,
            })
    }

    /// View of the attachment with `semantic`, for binding as a shader input.
    pub fn bind_attachment(
        &self,
        semantic: AttachmentSemantic,
    ) -> RenderResult<&wgpu::TextureView> {
        self.find(semantic).map(|a| &a.view)
    }

    pub fn attachment(&self, semantic: AttachmentSemantic) -> Option<&wgpu::Texture> {
        self.find(semantic).ok().map(|a| &a.texture)
    }

    /// Identity of an attachment, for display in editor viewports.
    pub fn renderer_id(&self, semantic: AttachmentSemantic) -> Option<RendererId> {
        self.find(semantic).ok().map(|a| a.id)
    }

    /// Color attachments set up for a render pass, cleared or loaded.
    pub fn color_attachments(
        &self,
        clear: bool,
    ) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
        self.attachments
            .iter()
            .filter(|a| !a.spec.semantic.is_depth())
            .map(|a| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &a.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: if clear {
                            wgpu::LoadOp::Clear(a.spec.semantic.clear_color())
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect()
    }

    /// A single color attachment, for passes that only write one semantic.
    pub fn color_attachment(
        &self,
        semantic: AttachmentSemantic,
        clear: bool,
    ) -> RenderResult<wgpu::RenderPassColorAttachment<'_>> {
        let a = self.find(semantic)?;
        Ok(wgpu::RenderPassColorAttachment {
            view: &a.view,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load: if clear {
                    wgpu::LoadOp::Clear(semantic.clear_color())
                } else {
                    wgpu::LoadOp::Load
                },
                store: wgpu::StoreOp::Store,
            },
        })
    }

    pub fn depth_attachment(
        &self,
        clear: bool,
    ) -> RenderResult<wgpu::RenderPassDepthStencilAttachment<'_>> {
        let a = self.find(AttachmentSemantic::Depth)?;
        Ok(wgpu::RenderPassDepthStencilAttachment {
            view: &a.view,
            depth_ops: Some(wgpu::Operations {
                load: if clear {
                    wgpu::LoadOp::Clear(1.0)
                } else {
                    wgpu::LoadOp::Load
                },
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        })
    }

    /// Copy one attachment of `source` into the same semantic of `self`.
    ///
    /// Both framebuffers must be the same size and format for that semantic.
    pub fn copy_from(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &Framebuffer,
        semantic: AttachmentSemantic,
    ) -> RenderResult<()> {
        let src = source.find(semantic)?;
        let dst = self.find(semantic)?;
        encoder.copy_texture_to_texture(
            src.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.spec.width.min(source.spec.width),
                height: self.spec.height.min(source.spec.height),
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Read an attachment back to the CPU as raw, tightly packed texels.
    ///
    /// Blocks until the GPU has finished. Meant for tests and tooling, not per-frame use.
    pub fn read_texels(
        &self,
        gpu: &GpuContext,
        semantic: AttachmentSemantic,
    ) -> RenderResult<Vec<u8>> {
        let a = self.find(semantic)?;
        let texel_size = a
            .spec
            .format
            .block_copy_size(if semantic.is_depth() {
                Some(wgpu::TextureAspect::DepthOnly)
            } else {
                None
            })
            .ok_or_else(|| {
                RendererError::Readback(format!("{:?} cannot be copied", a.spec.format))
            })?;

        let (width, height) = self.size();
        let row_bytes = width * texel_size;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Framebuffer Readback Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Framebuffer Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &a.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: if semantic.is_depth() {
                    wgpu::TextureAspect::DepthOnly
                } else {
                    wgpu::TextureAspect::All
                },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let padded = gpu.read_buffer(&buffer)?;
        let mut texels = Vec::with_capacity((row_bytes * height) as usize);
        for row in 0..height {
            let start = (row * padded_row) as usize;
            texels.extend_from_slice(&padded[start..start + row_bytes as usize]);
        }
        Ok(texels)
    }

    /// Read a color attachment back as linear RGBA floats.
    ///
    /// Supports `Rgba16Float`, `Rgba8Unorm` and `R32Float` attachments.
    pub fn read_color(
        &self,
        gpu: &GpuContext,
        semantic: AttachmentSemantic,
    ) -> RenderResult<Vec<[f32; 4]>> {
        let format = self.find(semantic)?.spec.format;
        let texels = self.read_texels(gpu, semantic)?;
        match format {
            wgpu::TextureFormat::Rgba16Float => {
                Ok(bytemuck::pod_collect_to_vec::<u8, half::f16>(&texels)
                    .chunks_exact(4)
                    .map(|c| [c[0].to_f32(), c[1].to_f32(), c[2].to_f32(), c[3].to_f32()])
                    .collect())
            }
            wgpu::TextureFormat::Rgba8Unorm => Ok(texels
                .chunks_exact(4)
                .map(|c| {
                    [
                        c[0] as f32 / 255.0,
                        c[1] as f32 / 255.0,
                        c[2] as f32 / 255.0,
                        c[3] as f32 / 255.0,
                    ]
                })
                .collect()),
            wgpu::TextureFormat::R32Float | wgpu::TextureFormat::Depth32Float => {
                Ok(bytemuck::pod_collect_to_vec::<u8, f32>(&texels)
                    .into_iter()
                    .map(|v| [v, v, v, 1.0])
                    .collect())
            }
            other => Err(RendererError::Readback(format!(
                "cannot decode {other:?} as color"
            ))),
        }
    }

    /// Read the entity id attachment back.
    pub fn read_entity_ids(&self, gpu: &GpuContext) -> RenderResult<Vec<i32>> {
        let texels = self.read_texels(gpu, AttachmentSemantic::EntityId)?;
        Ok(bytemuck::pod_collect_to_vec(&texels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gbuffer_spec_declares_every_semantic() {
        let spec = FramebufferSpec::gbuffer(640, 480);
        assert!(spec.missing(&GBUFFER_SEMANTICS).is_empty());
        // Depth is not a color target
        assert_eq!(spec.color_formats().len(), 5);
        assert_eq!(spec.color_formats()[1], ENTITY_ID_FORMAT);
    }

    #[test]
    fn missing_reports_absent_semantics_in_request_order() {
        let spec = FramebufferSpec::color("Post", 64, 64);
        assert_eq!(
            spec.missing(&[
                AttachmentSemantic::Depth,
                AttachmentSemantic::Color,
                AttachmentSemantic::Normal
            ]),
            vec![AttachmentSemantic::Depth, AttachmentSemantic::Normal]
        );
    }

    #[test]
    fn redeclaring_a_semantic_replaces_its_format() {
        let spec = FramebufferSpec::color("Post", 64, 64)
            .with(AttachmentSemantic::Color, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(spec.attachments.len(), 1);
        assert_eq!(spec.color_formats(), vec![wgpu::TextureFormat::Rgba8Unorm]);
    }

    #[test]
    fn entity_ids_clear_to_minus_one() {
        assert_eq!(AttachmentSemantic::EntityId.clear_color().r, -1.0);
        assert_eq!(AttachmentSemantic::Color.clear_color(), wgpu::Color::TRANSPARENT);
    }
}
