//! The post-processing chain.
//!
//! Every post pass reads the output of the last pass before it that produced one (see
//! [`FramePlan::input_of`]) and writes its own [`FramebufferKind`] target. The composite
//! passes write the active framebuffer's color attachment and never touch its entity IDs
//! or depth.

use crate::error::RenderResult;
use crate::framebuffer::{AttachmentSemantic, COLOR_FORMAT, Framebuffer, FramebufferSpec};
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::ibl::{CLOUD_SKY_HEIGHT, CLOUD_SKY_WIDTH};
use crate::post_process::bloom::{Bloom, BloomPipelines};
use crate::post_process::dof::{DepthOfField, DofPipelines};
use crate::post_process::fullscreen::{FullscreenDesc, FullscreenPass, InputKind};
use crate::render_path::{FramePlan, FramebufferKind, PassId};
use crate::texture::Texture;

/// One persistent target per stage.
pub struct PostTargets {
    deferred_lighting: Framebuffer,
    bloom_bright: Framebuffer,
    ssao: Framebuffer,
    previous_frame: Framebuffer,
    ssr: Framebuffer,
    motion_blur: Framebuffer,
    dof: Framebuffer,
    bloom: Framebuffer,
    lens_distortion: Framebuffer,
    fxaa: Framebuffer,
    outline: Framebuffer,
    /// Fixed size, never resized with the viewport.
    cloud_sky: Framebuffer,
}

impl PostTargets {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let color =
            |label: &str| Framebuffer::new(gpu, FramebufferSpec::color(label, width, height));

        Self {
            deferred_lighting: color("Deferred Lighting"),
            bloom_bright: color("Bloom Bright"),
            ssao: color("SSAO"),
            previous_frame: color("Previous Frame"),
            ssr: color("SSR"),
            motion_blur: color("Motion Blur"),
            dof: color("Depth Of Field"),
            bloom: color("Bloom"),
            lens_distortion: color("Lens Distortion"),
            fxaa: color("FXAA"),
            outline: Framebuffer::new(gpu, FramebufferSpec::depth_only("Outline", width, height)),
            cloud_sky: Framebuffer::new(
                gpu,
                FramebufferSpec::color("Cloud Sky", CLOUD_SKY_WIDTH, CLOUD_SKY_HEIGHT),
            ),
        }
    }

    pub fn get(&self, kind: FramebufferKind) -> &Framebuffer {
        match kind {
            FramebufferKind::DeferredLighting => &self.deferred_lighting,
            FramebufferKind::BloomBright => &self.bloom_bright,
            FramebufferKind::Ssao => &self.ssao,
            FramebufferKind::PreviousFrame => &self.previous_frame,
            FramebufferKind::Ssr => &self.ssr,
            FramebufferKind::MotionBlur => &self.motion_blur,
            FramebufferKind::DepthOfField => &self.dof,
            FramebufferKind::Bloom => &self.bloom,
            FramebufferKind::LensDistortion => &self.lens_distortion,
            FramebufferKind::Fxaa => &self.fxaa,
            FramebufferKind::Outline => &self.outline,
            FramebufferKind::CloudSky => &self.cloud_sky,
        }
    }

    /// Resize every viewport-sized target. Returns how many were reallocated.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> usize {
        [
            &mut self.deferred_lighting,
            &mut self.bloom_bright,
            &mut self.ssao,
            &mut self.previous_frame,
            &mut self.ssr,
            &mut self.motion_blur,
            &mut self.dof,
            &mut self.bloom,
            &mut self.lens_distortion,
            &mut self.fxaa,
            &mut self.outline,
        ]
        .into_iter()
        .filter_map(|fb| fb.resize(gpu, width, height).then_some(()))
        .count()
    }

    pub fn size(&self) -> (u32, u32) {
        self.deferred_lighting.size()
    }
}

struct ChainPasses {
    ssao: FullscreenPass,
    ssr: FullscreenPass,
    motion_blur: FullscreenPass,
    lens_distortion: FullscreenPass,
    fxaa: FullscreenPass,
    outline_fxaa: FullscreenPass,
    final_fx: FullscreenPass,
    final_plain: FullscreenPass,
    outline: FullscreenPass,
}

impl ChainPasses {
    fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        use InputKind::{Color, Depth};
        let pass = |desc: FullscreenDesc<'_>| {
            FullscreenPass::new(gpu, shaders, frame_layout, &[], desc)
        };

        Self {
            ssao: pass(FullscreenDesc::new(
                "SSAO",
                ShaderId::Ssao,
                &[Color, Color, Depth, Color],
                COLOR_FORMAT,
            )),
            ssr: pass(FullscreenDesc::new(
                "SSR",
                ShaderId::Ssr,
                &[Color, Color, Color, Color, Depth],
                COLOR_FORMAT,
            )),
            motion_blur: pass(FullscreenDesc::new(
                "Motion Blur",
                ShaderId::MotionBlur,
                &[Color, Depth],
                COLOR_FORMAT,
            )),
            lens_distortion: pass(FullscreenDesc::new(
                "Lens Distortion",
                ShaderId::LensDistortion,
                &[Color],
                COLOR_FORMAT,
            )),
            fxaa: pass(FullscreenDesc::new("FXAA", ShaderId::Fxaa, &[Color], COLOR_FORMAT)),
            outline_fxaa: pass(
                FullscreenDesc::new("Outline FXAA", ShaderId::Fxaa, &[Depth], COLOR_FORMAT)
                    .entry("fs_depth"),
            ),
            final_fx: pass(
                FullscreenDesc::new(
                    "Final Composite FX",
                    ShaderId::FinalComposite,
                    &[Color],
                    COLOR_FORMAT,
                )
                .entry("fs_fx"),
            ),
            final_plain: pass(
                FullscreenDesc::new(
                    "Final Composite",
                    ShaderId::FinalComposite,
                    &[Color],
                    COLOR_FORMAT,
                )
                .entry("fs_plain"),
            ),
            outline: pass(
                FullscreenDesc::new("Outline", ShaderId::Outline, &[Color], COLOR_FORMAT)
                    .blend(wgpu::BlendState::ALPHA_BLENDING),
            ),
        }
    }
}

/// Every pipeline the chain owns, rebuilt together on hot reload.
pub(crate) struct PostPipelines {
    passes: ChainPasses,
    bloom: BloomPipelines,
    dof: DofPipelines,
}

pub struct PostChain {
    targets: PostTargets,
    passes: ChainPasses,
    bloom: Bloom,
    dof: DepthOfField,
    ssao_noise: Texture,
}

/// Textures the chain samples besides its own targets.
pub struct PostTextures {
    pub ssao_noise: Texture,
    pub bloom_dirt: Texture,
    pub bokeh_shape: Texture,
}

impl PostChain {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
        textures: PostTextures,
    ) -> Self {
        Self {
            targets: PostTargets::new(gpu, width, height),
            passes: ChainPasses::new(gpu, shaders, frame_layout),
            bloom: Bloom::new(gpu, shaders, frame_layout, width, height, textures.bloom_dirt),
            dof: DepthOfField::new(gpu, shaders, frame_layout, textures.bokeh_shape),
            ssao_noise: textures.ssao_noise,
        }
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> PostPipelines {
        PostPipelines {
            passes: ChainPasses::new(gpu, shaders, frame_layout),
            bloom: BloomPipelines::new(gpu, shaders, frame_layout),
            dof: self.dof.build_pipelines(gpu, shaders, frame_layout),
        }
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: PostPipelines) {
        self.passes = pipelines.passes;
        self.bloom.set_pipelines(pipelines.bloom);
        self.dof.set_pipelines(pipelines.dof);
    }

    pub fn targets(&self) -> &PostTargets {
        &self.targets
    }

    pub fn dof(&self) -> &DepthOfField {
        &self.dof
    }

    /// Resize every viewport-sized target. Returns `true` if anything was reallocated.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> bool {
        self.bloom.resize(gpu, width, height);
        self.targets.resize(gpu, width, height) > 0
    }

    /// Record the post pass at `index` of `plan`.
    ///
    /// Passes the chain does not own are ignored.
    pub fn encode(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        plan: &FramePlan,
        index: usize,
        active: &Framebuffer,
    ) -> RenderResult<()> {
        use AttachmentSemantic::*;

        let Some(&pass) = plan.passes().get(index) else {
            return Ok(());
        };
        let prior = self.targets.get(plan.input_of(index));
        let depth = active.bind_attachment(Depth)?;
        let output = |kind| self.targets.get(kind).color_attachment(Color, true);

        match pass {
            PassId::BloomIsolate => {
                self.bloom
                    .isolate(gpu, encoder, frame, prior, &self.targets.bloom_bright)?;
            }
            PassId::Ssao => self.passes.ssao.run(
                gpu,
                encoder,
                frame,
                &[
                    prior.bind_attachment(Color)?,
                    active.bind_attachment(Normal)?,
                    depth,
                    self.ssao_noise.view(),
                ],
                &[],
                output(FramebufferKind::Ssao)?,
            ),
            PassId::CopyPreviousFrame => {
                self.targets.previous_frame.copy_from(encoder, prior, Color)?;
            }
            PassId::Ssr => self.passes.ssr.run(
                gpu,
                encoder,
                frame,
                &[
                    prior.bind_attachment(Color)?,
                    self.targets.previous_frame.bind_attachment(Color)?,
                    active.bind_attachment(Normal)?,
                    active.bind_attachment(Material)?,
                    depth,
                ],
                &[],
                output(FramebufferKind::Ssr)?,
            ),
            PassId::MotionBlur => self.passes.motion_blur.run(
                gpu,
                encoder,
                frame,
                &[prior.bind_attachment(Color)?, depth],
                &[],
                output(FramebufferKind::MotionBlur)?,
            ),
            PassId::DepthOfField => {
                self.dof.blur(gpu, encoder, frame, prior, depth, &self.targets.dof)?;
            }
            PassId::Bokeh => {
                // Sprites come from the image the blur read, not the blurred result
                let source = self.targets.get(plan.input_of(index.saturating_sub(1)));
                self.dof.bokeh(gpu, encoder, frame, source, depth, &self.targets.dof)?;
            }
            PassId::Bloom => {
                self.bloom.apply(
                    gpu,
                    encoder,
                    frame,
                    prior,
                    &self.targets.bloom_bright,
                    &self.targets.bloom,
                )?;
            }
            PassId::LensDistortion => self.passes.lens_distortion.run(
                gpu,
                encoder,
                frame,
                &[prior.bind_attachment(Color)?],
                &[],
                output(FramebufferKind::LensDistortion)?,
            ),
            PassId::Fxaa => self.passes.fxaa.run(
                gpu,
                encoder,
                frame,
                &[prior.bind_attachment(Color)?],
                &[],
                output(FramebufferKind::Fxaa)?,
            ),
            PassId::FinalCompositeFx | PassId::FinalComposite => {
                let composite = if pass == PassId::FinalCompositeFx {
                    &self.passes.final_fx
                } else {
                    &self.passes.final_plain
                };
                composite.run(
                    gpu,
                    encoder,
                    frame,
                    &[self.targets.get(plan.final_source()).bind_attachment(Color)?],
                    &[],
                    active.color_attachment(Color, true)?,
                );
            }
            PassId::OutlineFxaa => self.passes.outline_fxaa.run(
                gpu,
                encoder,
                frame,
                &[self.targets.outline.bind_attachment(Depth)?],
                &[],
                output(FramebufferKind::Fxaa)?,
            ),
            PassId::Outline => self.passes.outline.run(
                gpu,
                encoder,
                frame,
                &[self.targets.fxaa.bind_attachment(Color)?],
                &[],
                active.color_attachment(Color, false)?,
            ),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PassFlags;
    use crate::render_path::{
        FrameInputs, FramePlan, FramebufferKind, LitOutput, PassId, RenderPath,
    };

    fn plan(passes: PassFlags) -> FramePlan {
        FramePlan::build(&FrameInputs {
            path: RenderPath::Lit(LitOutput::Full),
            passes,
            has_directional_light: false,
            shadowed_point_lights: 0,
            any_selected: false,
        })
    }

    fn index_of(plan: &FramePlan, pass: PassId) -> usize {
        plan.passes().iter().position(|p| *p == pass).unwrap()
    }

    #[test]
    fn bokeh_reads_what_the_blur_read() {
        let plan = plan(PassFlags {
            motion_blur: true,
            dof: true,
            ..Default::default()
        });
        let bokeh = index_of(&plan, PassId::Bokeh);
        assert_eq!(plan.input_of(bokeh - 1), FramebufferKind::MotionBlur);
        assert_eq!(plan.input_of(bokeh), FramebufferKind::DepthOfField);
    }

    #[test]
    fn bloom_composites_over_the_stage_before_it() {
        let plan = plan(PassFlags {
            bloom: true,
            ssao: true,
            ..Default::default()
        });
        // The isolate runs on the lighting result, the composite on the SSAO output
        assert_eq!(
            plan.input_of(index_of(&plan, PassId::BloomIsolate)),
            FramebufferKind::DeferredLighting
        );
        assert_eq!(plan.input_of(index_of(&plan, PassId::Bloom)), FramebufferKind::Ssao);
        assert_eq!(plan.final_source(), FramebufferKind::Bloom);
    }

    #[test]
    fn previous_frame_copies_the_ssr_input() {
        let plan = plan(PassFlags {
            ssr: true,
            ssao: true,
            ..Default::default()
        });
        let copy = index_of(&plan, PassId::CopyPreviousFrame);
        assert_eq!(plan.input_of(copy), FramebufferKind::Ssao);
        assert_eq!(plan.input_of(copy + 1), FramebufferKind::Ssao);
    }
}
