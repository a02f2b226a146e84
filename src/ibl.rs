//! Image-based lighting from the frame's sky light.
//!
//! A sky light is either an equirectangular HDRI (optionally with a flow map that animates
//! the visible sky) or the procedural cloud sky. Its radiance is baked into three cubes:
//!
//! | Resource | Size | Use |
//! |---|---|---|
//! | environment | 512² | visible background, prefilter source |
//! | irradiance | 32² | diffuse ambient |
//! | prefilter | 128², 5 mips | specular ambient, roughness = mip / 4 |
//!
//! plus a 512² split-sum BRDF lookup generated once at construction.
//!
//! Baking is costly, so [`IblCache`] remembers which HDRI and flow map the cubes hold and
//! skips regeneration while they stay the same. The procedural sky is animated and is
//! re-baked on every submission.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::buffers::{CaptureData, DynamicUniform, FrameUniforms};
use crate::framebuffer::{AttachmentSemantic, COLOR_FORMAT, Framebuffer};
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};
use crate::shadows::CUBE_FACES;
use crate::shadows::point::FACE_DIRECTIONS;
use crate::texture::{RendererId, Texture, TextureCube};

pub const ENVIRONMENT_SIZE: u32 = 512;
pub const IRRADIANCE_SIZE: u32 = 32;
pub const PREFILTER_SIZE: u32 = 128;
pub const PREFILTER_MIPS: u32 = 5;
pub const BRDF_LUT_SIZE: u32 = 512;
pub const FLOW_MAP_SIZE: u32 = 512;
pub const CLOUD_SKY_WIDTH: u32 = 1024;
pub const CLOUD_SKY_HEIGHT: u32 = 512;

const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;
const CUBE_VERTEX_COUNT: u32 = 36;

/// Where the sky's radiance comes from.
#[derive(Clone)]
pub enum SkySource {
    Hdri {
        hdri: Arc<Texture>,
        flow_map: Option<Arc<Texture>>,
    },
    /// Animated volumetric clouds, rendered each submission.
    Procedural,
}

#[derive(Clone)]
pub struct SkyLight {
    pub source: SkySource,
}

impl SkyLight {
    pub fn hdri(hdri: Arc<Texture>) -> Self {
        Self {
            source: SkySource::Hdri {
                hdri,
                flow_map: None,
            },
        }
    }

    pub fn with_flow_map(mut self, flow: Arc<Texture>) -> Self {
        if let SkySource::Hdri { flow_map, .. } = &mut self.source {
            *flow_map = Some(flow);
        }
        self
    }

    pub fn procedural() -> Self {
        Self {
            source: SkySource::Procedural,
        }
    }
}

/// What a sky submission has to regenerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkyUpdate {
    pub environment: bool,
    pub flow_map: bool,
}

/// Identities of the sources currently baked into the IBL cubes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IblCache {
    hdri: Option<RendererId>,
    flow_map: Option<RendererId>,
}

impl IblCache {
    /// Compare `source` against the cached identities and record it.
    pub fn on_submit(&mut self, source: &SkySource) -> SkyUpdate {
        match source {
            SkySource::Hdri { hdri, flow_map } => {
                self.record(hdri.renderer_id(), flow_map.as_ref().map(|f| f.renderer_id()))
            }
            SkySource::Procedural => {
                // Forget the HDRI so switching back re-bakes it
                self.hdri = None;
                self.flow_map = None;
                SkyUpdate {
                    environment: true,
                    flow_map: false,
                }
            }
        }
    }

    fn record(&mut self, hdri: RendererId, flow_map: Option<RendererId>) -> SkyUpdate {
        let update = SkyUpdate {
            environment: self.hdri != Some(hdri),
            flow_map: flow_map.is_some() && self.flow_map != flow_map,
        };
        self.hdri = Some(hdri);
        // The flow cube keeps the last baked map while a sky goes without one
        if flow_map.is_some() {
            self.flow_map = flow_map;
        }
        update
    }
}

/// Capture view-projections around the origin, in cube layer order.
pub fn capture_view_projections() -> [Mat4; CUBE_FACES] {
    let projection = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0);
    FACE_DIRECTIONS.map(|(dir, up)| projection * Mat4::look_at_rh(Vec3::ZERO, dir, up))
}

/// GGX roughness baked into prefilter mip `mip`.
pub fn prefilter_roughness(mip: u32) -> f32 {
    mip as f32 / (PREFILTER_MIPS - 1) as f32
}

/// Capture uniform slots: equirect faces, irradiance faces, then prefilter faces per mip.
fn capture_slots() -> Vec<CaptureData> {
    let views = capture_view_projections();
    let face = |vp: &Mat4, roughness: f32| CaptureData {
        view_projection: vp.to_cols_array_2d(),
        roughness,
        _pad: [0.0; 3],
    };

    let mut slots: Vec<CaptureData> = views.iter().map(|vp| face(vp, 0.0)).collect();
    slots.extend(views.iter().map(|vp| face(vp, 0.0)));
    for mip in 0..PREFILTER_MIPS {
        slots.extend(views.iter().map(|vp| face(vp, prefilter_roughness(mip))));
    }
    slots
}

fn equirect_slot(face: usize) -> usize {
    face
}

fn irradiance_slot(face: usize) -> usize {
    CUBE_FACES + face
}

fn prefilter_slot(mip: u32, face: usize) -> usize {
    2 * CUBE_FACES + mip as usize * CUBE_FACES + face
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) struct IblPipelines {
    equirect: wgpu::RenderPipeline,
    irradiance: wgpu::RenderPipeline,
    prefilter: wgpu::RenderPipeline,
    brdf: wgpu::RenderPipeline,
    clouds: wgpu::RenderPipeline,
}

impl IblPipelines {
    fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        capture_layout: &wgpu::BindGroupLayout,
        equirect_layout: &wgpu::BindGroupLayout,
        cube_layout: &wgpu::BindGroupLayout,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let device = &gpu.device;
        let ibl = shaders.module(ShaderId::Ibl);

        let pipeline_layout = |label: &str, layouts: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: layouts,
                push_constant_ranges: &[],
            })
        };
        let equirect_pipeline_layout = pipeline_layout(
            "Equirect Capture Pipeline Layout",
            &[capture_layout, equirect_layout],
        );
        let cube_pipeline_layout =
            pipeline_layout("Cube Capture Pipeline Layout", &[capture_layout, cube_layout]);
        let brdf_layout = pipeline_layout("BRDF LUT Pipeline Layout", &[]);
        let clouds_layout =
            pipeline_layout("Cloud Sky Pipeline Layout", &[frame_layout, equirect_layout]);

        let pipeline = |label: &str,
                        layout: &wgpu::PipelineLayout,
                        module: &wgpu::ShaderModule,
                        vs: &str,
                        fs: &str,
                        format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(vs),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fs),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Self {
            equirect: pipeline(
                "Equirect To Cube Pipeline",
                &equirect_pipeline_layout,
                ibl,
                "vs_capture",
                "fs_equirect",
                COLOR_FORMAT,
            ),
            irradiance: pipeline(
                "Irradiance Convolution Pipeline",
                &cube_pipeline_layout,
                ibl,
                "vs_capture",
                "fs_irradiance",
                COLOR_FORMAT,
            ),
            prefilter: pipeline(
                "Prefilter Pipeline",
                &cube_pipeline_layout,
                ibl,
                "vs_capture",
                "fs_prefilter",
                COLOR_FORMAT,
            ),
            brdf: pipeline(
                "BRDF LUT Pipeline",
                &brdf_layout,
                ibl,
                "vs_brdf",
                "fs_brdf",
                BRDF_LUT_FORMAT,
            ),
            clouds: pipeline(
                "Cloud Sky Pipeline",
                &clouds_layout,
                shaders.module(ShaderId::VolumetricClouds),
                "vs",
                "fs",
                COLOR_FORMAT,
            ),
        }
    }
}

/// Baked IBL cubes, the procedural sky source, and the passes that fill them.
pub struct Ibl {
    cache: IblCache,
    environment: TextureCube,
    irradiance: TextureCube,
    prefilter: TextureCube,
    flow_map: TextureCube,
    brdf_lut: wgpu::TextureView,
    sampler: wgpu::Sampler,
    captures: DynamicUniform<CaptureData>,
    equirect_layout: wgpu::BindGroupLayout,
    cube_layout: wgpu::BindGroupLayout,
    cloud_noise_bind_group: wgpu::BindGroup,
    pipelines: IblPipelines,
    has_flow_map: bool,
    environment_generations: u32,
    flow_map_generations: u32,
}

impl Ibl {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        cloud_noise: &Texture,
    ) -> Self {
        let device = &gpu.device;

        let environment =
            TextureCube::new(gpu, ENVIRONMENT_SIZE, 1, COLOR_FORMAT, "Environment Cube");
        let irradiance = TextureCube::new(gpu, IRRADIANCE_SIZE, 1, COLOR_FORMAT, "Irradiance Cube");
        let prefilter = TextureCube::new(
            gpu,
            PREFILTER_SIZE,
            PREFILTER_MIPS,
            COLOR_FORMAT,
            "Prefilter Cube",
        );
        let flow_map = TextureCube::new(gpu, FLOW_MAP_SIZE, 1, COLOR_FORMAT, "Flow Map Cube");

        let brdf_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("BRDF LUT"),
            size: wgpu::Extent3d {
                width: BRDF_LUT_SIZE,
                height: BRDF_LUT_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BRDF_LUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let brdf_lut = brdf_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("IBL Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let slots = capture_slots();
        let mut captures = DynamicUniform::new(
            gpu,
            "IBL Capture",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            slots.len() as u32,
        );
        // Capture views never change, one upload serves every bake
        captures.write(gpu, &slots);

        let equirect_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Equirect Source Bind Group Layout"),
            entries: &[
                texture_entry(0, wgpu::TextureViewDimension::D2),
                sampler_entry(1),
            ],
        });
        let cube_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cube Source Bind Group Layout"),
            entries: &[
                sampler_entry(1),
                texture_entry(2, wgpu::TextureViewDimension::Cube),
            ],
        });

        let cloud_noise_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloud Noise Bind Group"),
            layout: &equirect_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(cloud_noise.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(cloud_noise.sampler()),
                },
            ],
        });

        let pipelines = IblPipelines::new(
            gpu,
            shaders,
            captures.layout(),
            &equirect_layout,
            &cube_layout,
            frame_layout,
        );

        let ibl = Self {
            cache: IblCache::default(),
            environment,
            irradiance,
            prefilter,
            flow_map,
            brdf_lut,
            sampler,
            captures,
            equirect_layout,
            cube_layout,
            cloud_noise_bind_group,
            pipelines,
            has_flow_map: false,
            environment_generations: 0,
            flow_map_generations: 0,
        };
        ibl.generate_brdf_lut(gpu);
        ibl
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> IblPipelines {
        IblPipelines::new(
            gpu,
            shaders,
            self.captures.layout(),
            &self.equirect_layout,
            &self.cube_layout,
            frame_layout,
        )
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: IblPipelines) {
        self.pipelines = pipelines;
    }

    fn generate_brdf_lut(&self, gpu: &GpuContext) {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("BRDF LUT Encoder"),
            });
        {
            let mut pass = Self::begin_capture_pass(&mut encoder, &self.brdf_lut, "BRDF LUT Pass");
            pass.set_pipeline(&self.pipelines.brdf);
            pass.draw(0..3, 0..1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        log::debug!("generated {BRDF_LUT_SIZE}² BRDF lookup table");
    }

    /// Handle the frame's sky light, regenerating whatever its source invalidated.
    ///
    /// The procedural sky is first rendered into `clouds`, an equirect color target of
    /// [`CLOUD_SKY_WIDTH`] × [`CLOUD_SKY_HEIGHT`].
    pub fn submit(
        &mut self,
        gpu: &GpuContext,
        frame: &FrameUniforms,
        source: &SkySource,
        clouds: &Framebuffer,
    ) -> SkyUpdate {
        let update = self.cache.on_submit(source);
        if let SkySource::Hdri { flow_map, .. } = source {
            self.has_flow_map = flow_map.is_some();
        }
        if !update.environment && !update.flow_map {
            return update;
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("IBL Encoder"),
            });

        match source {
            SkySource::Hdri { hdri, flow_map } => {
                if update.environment {
                    self.bake_environment(gpu, &mut encoder, hdri.view(), hdri.sampler());
                }
                if let (true, Some(flow)) = (update.flow_map, flow_map) {
                    self.bake_flow_map(gpu, &mut encoder, flow);
                }
            }
            SkySource::Procedural => {
                self.render_clouds(&mut encoder, frame, clouds);
                if let Ok(view) = clouds.bind_attachment(AttachmentSemantic::Color) {
                    let source = self.source_bind_group(gpu, view, &self.sampler);
                    self.bake_from(gpu, &mut encoder, &source);
                }
                self.has_flow_map = false;
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        update
    }

    fn source_bind_group(
        &self,
        gpu: &GpuContext,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Equirect Source Bind Group"),
            layout: &self.equirect_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn bake_environment(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) {
        let source = self.source_bind_group(gpu, view, sampler);
        self.bake_from(gpu, encoder, &source);
    }

    /// Equirect to environment cube, then irradiance and prefilter from the cube.
    fn bake_from(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::BindGroup,
    ) {
        let equirect = &self.pipelines.equirect;
        self.capture_faces(encoder, equirect, source, &self.environment, 0, equirect_slot);

        let cube_source = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Environment Source Bind Group"),
            layout: &self.cube_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(self.environment.view()),
                },
            ],
        });

        self.capture_faces(
            encoder,
            &self.pipelines.irradiance,
            &cube_source,
            &self.irradiance,
            0,
            irradiance_slot,
        );
        for mip in 0..PREFILTER_MIPS {
            self.capture_faces(
                encoder,
                &self.pipelines.prefilter,
                &cube_source,
                &self.prefilter,
                mip,
                |face| prefilter_slot(mip, face),
            );
        }

        self.environment_generations += 1;
        log::debug!("regenerated IBL (bake #{})", self.environment_generations);
    }

    fn bake_flow_map(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        flow: &Texture,
    ) {
        let source = self.source_bind_group(gpu, flow.view(), flow.sampler());
        let equirect = &self.pipelines.equirect;
        self.capture_faces(encoder, equirect, &source, &self.flow_map, 0, equirect_slot);
        self.flow_map_generations += 1;
        log::debug!("regenerated flow map cube (bake #{})", self.flow_map_generations);
    }

    fn capture_faces(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        source: &wgpu::BindGroup,
        target: &TextureCube,
        mip: u32,
        slot: impl Fn(usize) -> usize,
    ) {
        let Some(faces) = target.faces.get(mip as usize) else {
            return;
        };
        for (face, view) in faces.iter().enumerate() {
            let mut pass = Self::begin_capture_pass(encoder, view, "IBL Capture Pass");
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, self.captures.bind_group(), &[self.captures.offset(slot(face))]);
            pass.set_bind_group(1, source, &[]);
            pass.draw(0..CUBE_VERTEX_COUNT, 0..1);
        }
    }

    fn render_clouds(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameUniforms,
        clouds: &Framebuffer,
    ) {
        let Ok(target) = clouds.color_attachment(AttachmentSemantic::Color, true) else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cloud Sky Pass"),
            color_attachments: &[Some(target)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.clouds);
        pass.set_bind_group(0, &frame.bind_group, &[]);
        pass.set_bind_group(1, &self.cloud_noise_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn begin_capture_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        view: &'e wgpu::TextureView,
        label: &str,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    pub fn has_flow_map(&self) -> bool {
        self.has_flow_map
    }

    /// Number of times the environment, irradiance and prefilter cubes were rebaked.
    pub fn environment_generations(&self) -> u32 {
        self.environment_generations
    }

    pub fn flow_map_generations(&self) -> u32 {
        self.flow_map_generations
    }

    pub fn environment(&self) -> &TextureCube {
        &self.environment
    }

    pub(crate) fn irradiance_view(&self) -> &wgpu::TextureView {
        self.irradiance.view()
    }

    pub(crate) fn prefilter_view(&self) -> &wgpu::TextureView {
        self.prefilter.view()
    }

    pub(crate) fn brdf_lut_view(&self) -> &wgpu::TextureView {
        &self.brdf_lut
    }

    pub(crate) fn flow_map_view(&self) -> &wgpu::TextureView {
        self.flow_map.view()
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefilter_roughness_spans_zero_to_one() {
        assert_eq!(prefilter_roughness(0), 0.0);
        assert_eq!(prefilter_roughness(2), 0.5);
        assert_eq!(prefilter_roughness(PREFILTER_MIPS - 1), 1.0);
    }

    #[test]
    fn capture_slots_are_laid_out_per_stage() {
        let slots = capture_slots();
        assert_eq!(slots.len(), 12 + 30);
        assert_eq!(slots[irradiance_slot(0)].roughness, 0.0);
        assert_eq!(slots[prefilter_slot(4, 5)].roughness, 1.0);
        assert_eq!(prefilter_slot(4, 5), slots.len() - 1);
    }

    #[test]
    fn capture_faces_look_outward() {
        for ((dir, _), vp) in FACE_DIRECTIONS.iter().zip(capture_view_projections()) {
            let ndc = vp.project_point3(*dir * 5.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        }
    }

    #[test]
    fn procedural_sky_always_regenerates() {
        let mut cache = IblCache::default();
        for _ in 0..3 {
            let update = cache.on_submit(&SkySource::Procedural);
            assert!(update.environment);
            assert!(!update.flow_map);
        }
    }

    #[test]
    fn same_hdri_bakes_once() {
        let mut cache = IblCache::default();
        let hdri = RendererId::next();
        assert!(cache.record(hdri, None).environment);
        for _ in 0..4 {
            assert_eq!(cache.record(hdri, None), SkyUpdate::default());
        }
    }

    #[test]
    fn flow_map_changes_independently() {
        let mut cache = IblCache::default();
        let hdri = RendererId::next();
        let flow = RendererId::next();
        let first = cache.record(hdri, Some(flow));
        assert!(first.environment && first.flow_map);

        let other_flow = RendererId::next();
        let second = cache.record(hdri, Some(other_flow));
        assert!(!second.environment);
        assert!(second.flow_map);

        // Dropping the flow map has nothing to bake
        assert_eq!(cache.record(hdri, None), SkyUpdate::default());
    }

    #[test]
    fn restoring_the_same_flow_map_skips_the_bake() {
        let mut cache = IblCache::default();
        let hdri = RendererId::next();
        let flow = RendererId::next();
        assert!(cache.record(hdri, Some(flow)).flow_map);
        assert_eq!(cache.record(hdri, None), SkyUpdate::default());
        assert_eq!(cache.record(hdri, Some(flow)), SkyUpdate::default());

        let other_flow = RendererId::next();
        assert!(cache.record(hdri, Some(other_flow)).flow_map);
    }

    #[test]
    fn returning_from_procedural_rebakes_the_hdri() {
        let mut cache = IblCache::default();
        let hdri = RendererId::next();
        cache.record(hdri, None);
        cache.on_submit(&SkySource::Procedural);
        assert!(cache.record(hdri, None).environment);
    }
}
