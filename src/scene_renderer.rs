//! The renderer context.
//!
//! A [`SceneRenderer`] owns every GPU resource of the deferred pipeline. A frame follows
//! the submission protocol:
//!
//! ```ignore
//! renderer.begin_scene(&gpu, &camera);
//! renderer.submit_directional_light(sun_transform, &sun);
//! renderer.submit_model(submission);
//! renderer.render_scene(&gpu)?;
//! renderer.end_scene();
//! ```
//!
//! [`render_scene`](SceneRenderer::render_scene) builds a [`FramePlan`], records every
//! scheduled pass into one command encoder and submits it once. Whatever happens, it
//! closes the frame: the draw and light lists are emptied and shadow slots are released.

use std::sync::Arc;

use bytemuck::Zeroable;
use glam::{Mat4, Vec3, Vec4};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::buffers::{CameraData, DynamicUniform, FrameUniforms, ObjectData, PostProcessingData};
use crate::camera::RenderCamera;
use crate::clustering::{self, ClusterCulling, GRID_SIZE_X, GRID_SIZE_Y, GRID_SIZE_Z};
use crate::config::{PassFlags, PostProcessSettings, RendererConfig};
use crate::deferred::{DeferredPasses, GeometryLayouts};
use crate::error::{RenderResult, RendererError};
use crate::framebuffer::{AttachmentSemantic, Framebuffer, FramebufferSpec, GBUFFER_SEMANTICS};
use crate::gpu::GpuContext;
use crate::hot_shader::ShaderLibrary;
use crate::ibl::{Ibl, SkyLight};
use crate::material::{Material, MaterialDesc, MaterialLayout};
use crate::post_process::chain::{PostChain, PostTextures};
use crate::post_process::ssao::ssao_kernel;
use crate::render_path::{
    FrameInputs, FramePlan, FramebufferKind, LitOutput, PassId, RenderPath, VisualizationMode,
};
use crate::shadows::cascades::{self, CASCADE_COUNT, CascadeCamera};
use crate::shadows::{ShadowResources, ShadowSettings};
use crate::stats::Statistics;
use crate::submission::{
    DirectionalLight, FrameSubmission, ModelSubmission, OverflowReport, PointLight, SpotLight,
    SubmitOutcome, Volume,
};
use crate::texture::Texture;

const INITIAL_OBJECT_SLOTS: u32 = 64;
const DIRT_MASK_SIZE: u32 = 512;
const BOKEH_SHAPE_SIZE: u32 = 64;
const CLOUD_NOISE_SIZE: u32 = 256;

/// Camera state captured at `begin_scene`.
#[derive(Debug, Clone, Copy)]
struct FrameCamera {
    projection: Mat4,
    view_projection: Mat4,
    cascade: CascadeCamera,
    dims: [u32; 2],
}

/// Build the camera uniforms for a `dims`-sized viewport.
pub fn camera_data(camera: &impl RenderCamera, dims: [u32; 2]) -> CameraData {
    let view = camera.view_matrix();
    let projection = camera.projection_matrix();
    let (near, far) = (camera.near_clip(), camera.far_clip());
    let (scale, bias) = clustering::log_depth_constants(near, far);

    CameraData {
        view_projection: (projection * view).to_cols_array_2d(),
        projection: projection.to_cols_array_2d(),
        inverse_projection: projection.inverse().to_cols_array_2d(),
        view: view.to_cols_array_2d(),
        inverse_view: view.inverse().to_cols_array_2d(),
        view_position: camera.position().extend(1.0).to_array(),
        tile_sizes: [GRID_SIZE_X, GRID_SIZE_Y, GRID_SIZE_Z, 0],
        screen_dimensions: dims,
        pixel_size: [1.0 / dims[0].max(1) as f32, 1.0 / dims[1].max(1) as f32],
        scale,
        bias,
        z_near: near,
        z_far: far,
        tile_pixels: clustering::tile_sizes(dims),
        _padding: [0; 2],
    }
}

/// Semantics of `spec` that are absent or not where the G-buffer pass writes them.
fn incompatible_semantics(spec: &FramebufferSpec) -> Vec<AttachmentSemantic> {
    let mut missing = spec.missing(&GBUFFER_SEMANTICS);
    if !missing.is_empty() {
        return missing;
    }

    let expected = FramebufferSpec::gbuffer(spec.width, spec.height);
    let colors = |s: &FramebufferSpec| {
        s.attachments
            .iter()
            .filter(|a| !a.semantic.is_depth())
            .copied()
            .collect::<Vec<_>>()
    };
    let (want, have) = (colors(&expected), colors(spec));
    for (i, attachment) in want.iter().enumerate() {
        if have.get(i) != Some(attachment) {
            missing.push(attachment.semantic);
        }
    }
    if have.len() > want.len() {
        missing.extend(have[want.len()..].iter().map(|a| a.semantic));
    }
    let depth_ok = spec
        .attachments
        .iter()
        .zip(expected.attachments.iter())
        .all(|(a, b)| !a.semantic.is_depth() || a == b);
    if !depth_ok {
        missing.push(AttachmentSemantic::Depth);
    }
    missing
}

pub struct SceneRenderer {
    config: RendererConfig,
    shaders: ShaderLibrary,
    frame: FrameUniforms,
    objects: DynamicUniform<ObjectData>,
    material_layout: MaterialLayout,
    default_material: Arc<Material>,
    submission: FrameSubmission,
    clusters: ClusterCulling,
    shadows: ShadowResources,
    ibl: Ibl,
    deferred: DeferredPasses,
    post: PostChain,
    active: Option<Framebuffer>,
    camera: Option<FrameCamera>,
    previous_view_projection: Mat4,
    post_data: PostProcessingData,
    mode: VisualizationMode,
    passes: PassFlags,
    settings: PostProcessSettings,
    stats: Statistics,
    last_overflow: OverflowReport,
}

impl SceneRenderer {
    /// Compile every shader and allocate every persistent resource.
    ///
    /// Shadow map allocation failures are fatal and surface as
    /// [`RendererError::ShadowResources`]. A pipeline the device rejects surfaces as
    /// [`RendererError::PipelineCreation`].
    pub fn new(gpu: &GpuContext, config: RendererConfig) -> RenderResult<Self> {
        config.validate()?;

        let shaders = ShaderLibrary::new(gpu, &config.shader_dir, config.hot_reload)?;
        let frame = FrameUniforms::new(gpu);
        let objects = DynamicUniform::new(
            gpu,
            "Object",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            INITIAL_OBJECT_SLOTS,
        );
        let material_layout = MaterialLayout::new(gpu);
        let default_material =
            Arc::new(Material::new(gpu, &material_layout, MaterialDesc::default()));

        let mut rng = StdRng::seed_from_u64(config.ssao_seed);
        let kernel = ssao_kernel(&mut rng);
        let textures = PostTextures {
            ssao_noise: Texture::ssao_noise(gpu, &mut rng),
            bloom_dirt: match &config.bloom_dirt_texture {
                Some(path) => Texture::from_file_linear(gpu, path)?,
                None => Texture::dirt_mask(gpu, DIRT_MASK_SIZE, &mut rng),
            },
            bokeh_shape: match &config.bokeh_shape_texture {
                Some(path) => Texture::from_file_linear(gpu, path)?,
                None => Texture::bokeh_hexagon(gpu, BOKEH_SHAPE_SIZE),
            },
        };
        let cloud_noise = match &config.cloud_noise_texture {
            Some(path) => Texture::from_file_linear(gpu, path)?,
            None => Texture::cloud_noise(gpu, CLOUD_NOISE_SIZE, &mut rng),
        };

        let shadows = ShadowResources::new(
            gpu,
            &shaders,
            objects.layout(),
            ShadowSettings {
                cascade_resolution: config.shadow_map_resolution,
                point_resolution: config.point_shadow_resolution,
                max_shadowed_lights: config.max_shadowed_lights,
            },
        )?;
        let (clusters, ibl, deferred, post) = gpu
            .validation_scope(|| {
                let clusters =
                    ClusterCulling::new(gpu, &shaders, &frame.layout, config.max_point_lights);
                let ibl = Ibl::new(gpu, &shaders, &frame.layout, &cloud_noise);
                let deferred = DeferredPasses::new(
                    gpu,
                    &shaders,
                    &GeometryLayouts {
                        frame: &frame.layout,
                        object: objects.layout(),
                        material: &material_layout,
                    },
                    &clusters,
                    &shadows,
                    &ibl,
                );
                let post = PostChain::new(
                    gpu,
                    &shaders,
                    &frame.layout,
                    config.initial_width,
                    config.initial_height,
                    textures,
                );
                (clusters, ibl, deferred, post)
            })
            .map_err(|err| {
                log::error!("renderer pipelines rejected by the device: {err}");
                RendererError::PipelineCreation(err.to_string())
            })?;

        let mut post_data = PostProcessingData::zeroed();
        post_data.ssao_samples = kernel;

        log::info!(
            "scene renderer ready: {}x{}, {} point lights, {} shadowed",
            config.initial_width,
            config.initial_height,
            config.max_point_lights,
            config.max_shadowed_lights
        );

        Ok(Self {
            submission: FrameSubmission::new(config.max_shadowed_lights, config.max_point_lights),
            passes: config.passes,
            settings: config.post,
            config,
            shaders,
            frame,
            objects,
            material_layout,
            default_material,
            clusters,
            shadows,
            ibl,
            deferred,
            post,
            active: None,
            camera: None,
            previous_view_projection: Mat4::IDENTITY,
            post_data,
            mode: VisualizationMode::default(),
            stats: Statistics::default(),
            last_overflow: OverflowReport::default(),
        })
    }

    /// Hand the renderer the framebuffer it renders into.
    ///
    /// The framebuffer must carry the full G-buffer layout of
    /// [`FramebufferSpec::gbuffer`]. Every intermediate target is resized to match it.
    pub fn set_active_framebuffer(
        &mut self,
        gpu: &GpuContext,
        framebuffer: Framebuffer,
    ) -> RenderResult<()> {
        let missing = incompatible_semantics(framebuffer.spec());
        if !missing.is_empty() {
            return Err(RendererError::IncompatibleFramebuffer {
                label: framebuffer.label().to_string(),
                missing,
            });
        }
        let (width, height) = framebuffer.size();
        self.post.resize(gpu, width, height);
        self.active = Some(framebuffer);
        Ok(())
    }

    /// Resize the active framebuffer and every persistent target.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(active) = &mut self.active {
            active.resize(gpu, width, height);
        }
        if self.post.resize(gpu, width, height) {
            log::info!("renderer resized to {width}x{height}");
        }
    }

    pub fn active_framebuffer(&self) -> Option<&Framebuffer> {
        self.active.as_ref()
    }

    /// An intermediate target, for display in editor panels.
    pub fn framebuffer(&self, kind: FramebufferKind) -> &Framebuffer {
        self.post.targets().get(kind)
    }

    pub fn material_layout(&self) -> &MaterialLayout {
        &self.material_layout
    }

    /// Plain white material for quick scenes.
    pub fn default_material(&self) -> Arc<Material> {
        self.default_material.clone()
    }

    fn viewport(&self) -> [u32; 2] {
        match &self.active {
            Some(active) => [active.width(), active.height()],
            None => [self.config.initial_width, self.config.initial_height],
        }
    }

    /// Open a frame viewed through `camera`.
    pub fn begin_scene(&mut self, gpu: &GpuContext, camera: &impl RenderCamera) {
        let dims = self.viewport();
        let data = camera_data(camera, dims);
        self.frame.write_camera(gpu, &data);

        self.camera = Some(FrameCamera {
            projection: camera.projection_matrix(),
            view_projection: camera.view_projection(),
            cascade: CascadeCamera {
                view: camera.view_matrix(),
                fov: camera.fov(),
                aspect: camera.aspect_ratio(),
                near: camera.near_clip(),
                far: camera.far_clip(),
            },
            dims,
        });
        self.submission.begin();
    }

    pub fn submit_model(&mut self, submission: ModelSubmission) -> SubmitOutcome {
        self.submission.submit_model(submission)
    }

    pub fn submit_directional_light(
        &mut self,
        transform: Mat4,
        light: &DirectionalLight,
    ) -> SubmitOutcome {
        self.submission.submit_directional_light(transform, light)
    }

    pub fn submit_point_light(&mut self, transform: Mat4, light: &PointLight) -> SubmitOutcome {
        self.submission.submit_point_light(transform, light)
    }

    pub fn submit_spot_light(&mut self, transform: Mat4, light: &SpotLight) -> SubmitOutcome {
        self.submission.submit_spot_light(transform, light)
    }

    /// Use `sky` for ambient light and background, re-baking the IBL cubes if needed.
    pub fn submit_sky_light(&mut self, gpu: &GpuContext, sky: &SkyLight) -> SubmitOutcome {
        let outcome = self.submission.claim_sky_light();
        if !outcome.is_accepted() {
            return outcome;
        }

        // The cloud shader animates on the post-processing time
        self.write_post(gpu);
        let update = self.ibl.submit(
            gpu,
            &self.frame,
            &sky.source,
            self.post.targets().get(FramebufferKind::CloudSky),
        );
        if update.environment || update.flow_map {
            self.stats.sky_regenerations += 1;
            log::debug!(
                "sky light regenerated (environment: {}, flow map: {})",
                update.environment,
                update.flow_map
            );
        }
        outcome
    }

    pub fn submit_volume(
        &mut self,
        translation: Vec3,
        scale: Vec3,
        volume: &Volume,
    ) -> SubmitOutcome {
        self.submission.submit_volume(translation, scale, volume)
    }

    /// Execute the frame plan, then close the frame whatever the outcome.
    pub fn render_scene(&mut self, gpu: &GpuContext) -> RenderResult<()> {
        let result = if self.submission.is_recording() {
            self.execute(gpu)
        } else {
            Err(RendererError::SceneNotBegun)
        };
        self.last_overflow = self.submission.end_frame();
        result
    }

    pub fn end_scene(&mut self) {}

    /// Advance the time the grain and cloud shaders animate on.
    pub fn update_timestep(&mut self, dt: f32) {
        self.post_data.time += dt;
    }

    pub fn visualization_mode(&self) -> VisualizationMode {
        self.mode
    }

    pub fn set_visualization_mode(&mut self, mode: VisualizationMode) {
        self.mode = mode;
    }

    pub fn passes(&self) -> PassFlags {
        self.passes
    }

    pub fn passes_mut(&mut self) -> &mut PassFlags {
        &mut self.passes
    }

    pub fn post_settings(&self) -> &PostProcessSettings {
        &self.settings
    }

    pub fn post_settings_mut(&mut self) -> &mut PostProcessSettings {
        &mut self.settings
    }

    pub fn stats(&self) -> Statistics {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Overflow counts of the last frame `render_scene` closed.
    pub fn overflow(&self) -> OverflowReport {
        self.last_overflow
    }

    pub fn ibl(&self) -> &Ibl {
        &self.ibl
    }

    pub fn clusters(&self) -> &ClusterCulling {
        &self.clusters
    }

    pub fn post_chain(&self) -> &PostChain {
        &self.post
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    fn write_post(&mut self, gpu: &GpuContext) {
        let s = &self.settings;
        let data = &mut self.post_data;
        data.previous_view_projection = self.previous_view_projection.to_cols_array_2d();
        data.visualization_mode = match self.mode.render_path() {
            RenderPath::GBufferChannel(channel) => channel.shader_index(),
            _ => -1,
        };
        let lighting_only = self.mode.render_path() == RenderPath::Lit(LitOutput::LightingOnly);
        data.lighting_only = lighting_only as u32;
        data.gamma = s.gamma;
        data.lens_distortion = s.lens_distortion;
        data.aberration_amount = s.aberration_amount;
        data.grain_amount = s.grain_amount;
        data.vignette_intensity = s.vignette_intensity;
        data.vignette_power = s.vignette_power;
        data.focus_near_start = s.focus_near_start;
        data.focus_near_end = s.focus_near_end;
        data.focus_far_start = s.focus_far_start;
        data.focus_far_end = s.focus_far_end;
        data.focus_scale = s.focus_scale;
        data.bokeh_threshold = s.bokeh_threshold;
        data.bokeh_size = s.bokeh_size;
        self.frame.write_post(gpu, &self.post_data);
    }

    /// Rebuild every pipeline after a shader changed on disk.
    ///
    /// Pipelines are swapped only if all of them build cleanly.
    fn check_hot_reload(&mut self, gpu: &GpuContext) {
        if !self.shaders.poll_changes(gpu) {
            return;
        }

        let rebuilt = gpu.validation_scope(|| {
            let layouts = GeometryLayouts {
                frame: &self.frame.layout,
                object: self.objects.layout(),
                material: &self.material_layout,
            };
            (
                self.shadows.build_pipelines(gpu, &self.shaders, self.objects.layout()),
                self.clusters.build_pipelines(gpu, &self.shaders, &self.frame.layout),
                self.ibl.build_pipelines(gpu, &self.shaders, &self.frame.layout),
                self.deferred.build_pipelines(gpu, &self.shaders, &layouts),
                self.post.build_pipelines(gpu, &self.shaders, &self.frame.layout),
            )
        });

        match rebuilt {
            Ok((shadows, clusters, ibl, deferred, post)) => {
                self.shadows.set_pipelines(shadows);
                self.clusters.set_pipelines(clusters);
                self.ibl.set_pipelines(ibl);
                self.deferred.set_pipelines(deferred);
                self.post.set_pipelines(post);
                log::info!("[hot-reload] pipelines rebuilt");
            }
            Err(err) => log::warn!("[hot-reload] pipeline rebuild failed, keeping old ones: {err}"),
        }
    }

    fn execute(&mut self, gpu: &GpuContext) -> RenderResult<()> {
        self.check_hot_reload(gpu);

        let camera = self.camera.ok_or(RendererError::SceneNotBegun)?;
        let active = self.active.take().ok_or(RendererError::NoActiveFramebuffer)?;
        let result = self.record(gpu, &camera, &active);
        self.active = Some(active);
        result?;

        self.previous_view_projection = camera.view_projection;
        self.stats.frames += 1;
        Ok(())
    }

    fn record(
        &mut self,
        gpu: &GpuContext,
        camera: &FrameCamera,
        active: &Framebuffer,
    ) -> RenderResult<()> {
        let shadowed: Vec<(u32, Vec3, f32)> = self
            .submission
            .shadowed_lights()
            .map(|(index, light)| (index, Vec4::from(light.position).truncate(), light.range))
            .collect();

        let plan = FramePlan::build(&FrameInputs {
            path: self.mode.render_path(),
            passes: self.passes,
            has_directional_light: self.submission.has_directional_light(),
            shadowed_point_lights: shadowed.len() as u32,
            any_selected: self.submission.any_selected(),
        });
        log::debug!("frame plan: {:?}", plan.passes());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Renderer Encoder"),
            });

        for (index, &pass) in plan.passes().iter().enumerate() {
            let frame = &self.frame.bind_group;
            let draw_list = self.submission.draw_list();
            match pass {
                PassId::UploadFrameData => self.upload_frame_data(gpu, camera, &shadowed),
                PassId::PointShadows => {
                    let indices: Vec<u32> = shadowed.iter().map(|(index, _, _)| *index).collect();
                    self.stats.shadow_draw_calls +=
                        self.shadows
                            .encode_point_lights(&mut encoder, &self.objects, draw_list, &indices);
                }
                PassId::CascadedShadows => {
                    self.stats.shadow_draw_calls +=
                        self.shadows.encode_cascades(&mut encoder, &self.objects, draw_list);
                }
                PassId::PreDepth => {
                    self.stats.draw_calls +=
                        self.deferred
                            .pre_depth(&mut encoder, frame, &self.objects, draw_list, active)?;
                }
                PassId::GBuffer => {
                    self.stats.draw_calls += self.deferred.gbuffer(
                        &mut encoder,
                        frame,
                        &self.objects,
                        draw_list,
                        active,
                        self.post.targets().get(FramebufferKind::Outline),
                    )?;
                }
                PassId::LightCulling => {
                    if self
                        .clusters
                        .encode(&mut encoder, frame, camera.projection, camera.dims)
                    {
                        self.stats.cluster_builds += 1;
                    }
                }
                PassId::DeferredLighting => self.deferred.lighting(
                    gpu,
                    &mut encoder,
                    frame,
                    active,
                    self.post.targets().get(FramebufferKind::DeferredLighting),
                )?,
                PassId::BufferVisualization => self.deferred.visualize(
                    gpu,
                    &mut encoder,
                    frame,
                    active,
                    self.post.targets().get(FramebufferKind::DeferredLighting),
                )?,
                PassId::Wireframe => {
                    self.stats.draw_calls +=
                        self.deferred
                            .wireframe(&mut encoder, frame, &self.objects, draw_list, active)?;
                }
                _ => self.post.encode(gpu, &mut encoder, frame, &plan, index, active)?,
            }
            self.stats.passes_executed += 1;
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn upload_frame_data(
        &mut self,
        gpu: &GpuContext,
        camera: &FrameCamera,
        shadowed: &[(u32, Vec3, f32)],
    ) {
        let has_flow_map = self.submission.has_sky_light() && self.ibl.has_flow_map();
        let lighting = self.submission.lighting_mut();
        let cascade_matrices = if lighting.using_directional_light != 0 {
            let direction = Vec4::from(lighting.directional.direction).truncate();
            let matrices = cascades::light_space_matrices(&camera.cascade, direction);
            for (slot, matrix) in lighting.light_space_matrices.iter_mut().zip(&matrices) {
                *slot = matrix.to_cols_array_2d();
            }
            let splits = cascades::cascade_splits(camera.cascade.far);
            for (i, distance) in splits.into_iter().enumerate() {
                lighting.set_cascade_distance(i, distance);
            }
            lighting.cascade_count = CASCADE_COUNT as i32;
            matrices.to_vec()
        } else {
            Vec::new()
        };
        lighting.using_flow_map = has_flow_map as i32;

        self.frame.write_lighting(gpu, self.submission.lighting());
        self.frame.write_volumetric(gpu, self.submission.volumes());
        self.write_post(gpu);

        let objects: Vec<ObjectData> = self
            .submission
            .draw_list()
            .iter()
            .map(|m| {
                ObjectData::new(
                    m.transform,
                    m.entity_id,
                    m.animator.as_ref().map(|a| a.final_bone_matrices()),
                )
            })
            .collect();
        self.objects.write(gpu, &objects);
        self.clusters.upload_lights(gpu, self.submission.lights());
        self.shadows.write_views(gpu, &cascade_matrices, shadowed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SceneCamera;
    use crate::framebuffer::{COLOR_FORMAT, DEPTH_FORMAT};
    use approx::assert_relative_eq;

    #[test]
    fn camera_data_carries_cluster_constants() {
        let camera = SceneCamera::perspective(60.0, 16.0 / 9.0, 0.1, 1000.0);
        let data = camera_data(&camera, [1280, 720]);
        assert_eq!(data.tile_sizes, [16, 9, 24, 0]);
        assert_eq!(data.tile_pixels, [80, 80]);
        assert_eq!(data.screen_dimensions, [1280, 720]);
        let (scale, bias) = clustering::log_depth_constants(0.1, 1000.0);
        assert_relative_eq!(data.scale, scale);
        assert_relative_eq!(data.bias, bias);
        assert_relative_eq!(data.pixel_size[0], 1.0 / 1280.0);
    }

    #[test]
    fn square_viewport_tiles_cover_every_row() {
        let camera = SceneCamera::perspective(60.0, 1.0, 0.1, 1000.0);
        let data = camera_data(&camera, [512, 512]);
        assert_eq!(data.tile_pixels, [32, 57]);
        assert!(data.tile_pixels[1] * GRID_SIZE_Y >= 512);
    }

    #[test]
    fn full_gbuffer_is_compatible() {
        assert!(incompatible_semantics(&FramebufferSpec::gbuffer(64, 64)).is_empty());
    }

    #[test]
    fn missing_semantics_are_reported() {
        let spec = FramebufferSpec::new("Viewport", 64, 64)
            .with(AttachmentSemantic::Color, COLOR_FORMAT)
            .with(AttachmentSemantic::Depth, DEPTH_FORMAT);
        let missing = incompatible_semantics(&spec);
        assert_eq!(
            missing,
            vec![
                AttachmentSemantic::EntityId,
                AttachmentSemantic::Normal,
                AttachmentSemantic::Emissive,
                AttachmentSemantic::Material,
            ]
        );
    }

    #[test]
    fn reordered_attachments_are_rejected() {
        use AttachmentSemantic::*;
        let spec = FramebufferSpec::new("Viewport", 64, 64)
            .with(Color, COLOR_FORMAT)
            .with(Normal, COLOR_FORMAT)
            .with(EntityId, wgpu::TextureFormat::R32Sint)
            .with(Emissive, COLOR_FORMAT)
            .with(Material, wgpu::TextureFormat::Rgba8Unorm)
            .with(Depth, DEPTH_FORMAT);
        assert_eq!(incompatible_semantics(&spec), vec![EntityId, Normal]);
    }
}
