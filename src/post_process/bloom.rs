//! Multi-level bloom.
//!
//! Bright pixels are isolated into `BloomBright`, then blurred through [`BLOOM_LEVELS`]
//! separable levels. Levels come in horizontal/vertical pairs, the first pair at full size
//! and every following pair at half the size of the one before. The vertical result of each
//! pair is summed into a full-size accumulator that ping-pongs between two buffers, and the
//! composite adds the final sum (masked by the dirt texture) onto the prior stage.

use crate::framebuffer::{AttachmentSemantic, COLOR_FORMAT, Framebuffer, FramebufferSpec};
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::post_process::fullscreen::{FullscreenDesc, FullscreenPass, InputKind};
use crate::error::RenderResult;
use crate::texture::Texture;

pub const BLOOM_LEVELS: usize = 14;

/// Size of every blur level for a `width × height` frame.
pub fn level_sizes(width: u32, height: u32) -> [(u32, u32); BLOOM_LEVELS] {
    std::array::from_fn(|level| {
        let shift = (level / 2) as u32;
        ((width >> shift).max(1), (height >> shift).max(1))
    })
}

pub(crate) struct BloomPipelines {
    isolate: FullscreenPass,
    blur_h: FullscreenPass,
    blur_v: FullscreenPass,
    add: FullscreenPass,
    composite: FullscreenPass,
}

impl BloomPipelines {
    pub(crate) fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        use InputKind::Color;
        let pass = |desc: FullscreenDesc<'_>| {
            FullscreenPass::new(gpu, shaders, frame_layout, &[], desc)
        };

        Self {
            isolate: pass(
                FullscreenDesc::new("Bloom Isolate", ShaderId::Bloom, &[Color], COLOR_FORMAT)
                    .entry("fs_isolate"),
            ),
            blur_h: pass(
                FullscreenDesc::new("Bloom Blur H", ShaderId::Bloom, &[Color], COLOR_FORMAT)
                    .entry("fs_blur_h"),
            ),
            blur_v: pass(
                FullscreenDesc::new("Bloom Blur V", ShaderId::Bloom, &[Color], COLOR_FORMAT)
                    .entry("fs_blur_v"),
            ),
            add: pass(
                FullscreenDesc::new("Bloom Add", ShaderId::Bloom, &[Color, Color], COLOR_FORMAT)
                    .entry("fs_add"),
            ),
            composite: pass(
                FullscreenDesc::new(
                    "Bloom Composite",
                    ShaderId::Bloom,
                    &[Color, Color, Color],
                    COLOR_FORMAT,
                )
                .entry("fs_composite"),
            ),
        }
    }
}

pub struct Bloom {
    levels: Vec<Framebuffer>,
    accumulators: [Framebuffer; 2],
    dirt: Texture,
    pipelines: BloomPipelines,
}

impl Bloom {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
        dirt: Texture,
    ) -> Self {
        let levels = level_sizes(width, height)
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| {
                Framebuffer::new(gpu, FramebufferSpec::color(format!("Bloom Level {i}"), w, h))
            })
            .collect();
        let accumulators = [
            Framebuffer::new(gpu, FramebufferSpec::color("Bloom Add A", width, height)),
            Framebuffer::new(gpu, FramebufferSpec::color("Bloom Add B", width, height)),
        ];

        Self {
            levels,
            accumulators,
            dirt,
            pipelines: BloomPipelines::new(gpu, shaders, frame_layout),
        }
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: BloomPipelines) {
        self.pipelines = pipelines;
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        for (level, (w, h)) in self.levels.iter_mut().zip(level_sizes(width, height)) {
            level.resize(gpu, w, h);
        }
        for acc in &mut self.accumulators {
            acc.resize(gpu, width, height);
        }
    }

    /// Extract bright pixels of `prior` into `bright`.
    pub fn isolate(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        prior: &Framebuffer,
        bright: &Framebuffer,
    ) -> RenderResult<()> {
        self.pipelines.isolate.run(
            gpu,
            encoder,
            frame,
            &[prior.bind_attachment(AttachmentSemantic::Color)?],
            &[],
            bright.color_attachment(AttachmentSemantic::Color, true)?,
        );
        Ok(())
    }

    /// Blur `bright` through every level, sum the levels, and composite onto `prior`
    /// into `target`.
    pub fn apply(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::BindGroup,
        prior: &Framebuffer,
        bright: &Framebuffer,
        target: &Framebuffer,
    ) -> RenderResult<()> {
        use AttachmentSemantic::Color;

        for (i, level) in self.levels.iter().enumerate() {
            let source = if i == 0 { bright } else { &self.levels[i - 1] };
            let blur = if i % 2 == 0 {
                &self.pipelines.blur_h
            } else {
                &self.pipelines.blur_v
            };
            blur.run(
                gpu,
                encoder,
                frame,
                &[source.bind_attachment(Color)?],
                &[],
                level.color_attachment(Color, true)?,
            );
        }

        // The first pair's result seeds the sum, later pairs are added one by one
        let mut sum: &Framebuffer = &self.levels[1];
        let mut next = 0;
        for pair_end in (3..BLOOM_LEVELS).step_by(2) {
            let acc = &self.accumulators[next];
            self.pipelines.add.run(
                gpu,
                encoder,
                frame,
                &[sum.bind_attachment(Color)?, self.levels[pair_end].bind_attachment(Color)?],
                &[],
                acc.color_attachment(Color, true)?,
            );
            sum = acc;
            next = 1 - next;
        }

        self.pipelines.composite.run(
            gpu,
            encoder,
            frame,
            &[
                prior.bind_attachment(Color)?,
                sum.bind_attachment(Color)?,
                self.dirt.view(),
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

    #[test]
    fn levels_halve_per_pair() {
        let sizes = level_sizes(1920, 1080);
        assert_eq!(sizes[0], (1920, 1080));
        assert_eq!(sizes[1], (1920, 1080));
        assert_eq!(sizes[2], (960, 540));
        assert_eq!(sizes[3], (960, 540));
        assert_eq!(sizes[13], (30, 16));
    }

    #[test]
    fn tiny_frames_clamp_to_one_pixel() {
        let sizes = level_sizes(8, 4);
        assert_eq!(sizes[13], (1, 1));
    }

    #[test]
    fn every_pair_reaches_the_sum() {
        // Pair ends 3, 5, ..., 13 are added onto level 1
        let added: Vec<usize> = (3..BLOOM_LEVELS).step_by(2).collect();
        assert_eq!(added, vec![3, 5, 7, 9, 11, 13]);
    }
}
