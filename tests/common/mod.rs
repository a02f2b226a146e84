#![allow(dead_code)]

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use phalanx::*;

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 90;

/// A headless device, or `None` (with a note on stderr) when the machine has no usable adapter.
pub fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

pub fn small_config() -> RendererConfig {
    RendererConfig::new()
        .with_initial_size(WIDTH, HEIGHT)
        .with_shadow_map_resolution(256)
        .with_point_shadow_resolution(64)
        .with_max_shadowed_lights(2)
}

pub fn renderer(gpu: &GpuContext, config: RendererConfig) -> SceneRenderer {
    renderer_sized(gpu, config, WIDTH, HEIGHT)
}

pub fn renderer_sized(
    gpu: &GpuContext,
    config: RendererConfig,
    width: u32,
    height: u32,
) -> SceneRenderer {
    let mut renderer = match SceneRenderer::new(gpu, config.with_initial_size(width, height)) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer creation failed: {err}"),
    };
    let framebuffer = Framebuffer::new(gpu, FramebufferSpec::gbuffer(width, height));
    if let Err(err) = renderer.set_active_framebuffer(gpu, framebuffer) {
        panic!("gbuffer framebuffer rejected: {err}");
    }
    renderer
}

/// Camera 5 units above the origin looking straight down.
pub fn top_down_camera() -> SceneCamera {
    top_down_camera_with_aspect(WIDTH as f32 / HEIGHT as f32)
}

pub fn top_down_camera_with_aspect(aspect: f32) -> SceneCamera {
    let transform =
        Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)) * Mat4::from_rotation_x(-FRAC_PI_2);
    SceneCamera::perspective(60.0, aspect, 0.1, 100.0).with_transform(transform)
}

pub fn straight_down() -> Mat4 {
    Mat4::from_rotation_z(-FRAC_PI_2)
}

pub fn white_plane(gpu: &GpuContext, renderer: &SceneRenderer) -> Arc<Model> {
    let material = Arc::new(Material::new(
        gpu,
        renderer.material_layout(),
        MaterialDesc::default().with_albedo(1.0, 1.0, 1.0),
    ));
    Arc::new(Model::from_mesh(Mesh::from_data(gpu, &MeshData::plane(20.0), material)))
}

pub fn static_model(model: Arc<Model>, entity_id: i32) -> ModelSubmission {
    ModelSubmission {
        transform: Mat4::IDENTITY,
        model,
        materials: Vec::new(),
        animator: None,
        entity_id,
        selected: false,
    }
}

pub fn render(gpu: &GpuContext, renderer: &mut SceneRenderer) {
    if let Err(err) = renderer.render_scene(gpu) {
        panic!("render_scene failed: {err}");
    }
    renderer.end_scene();
}

pub fn read_stage(
    gpu: &GpuContext,
    renderer: &SceneRenderer,
    kind: FramebufferKind,
) -> Vec<[f32; 4]> {
    match renderer.framebuffer(kind).read_color(gpu, AttachmentSemantic::Color) {
        Ok(texels) => texels,
        Err(err) => panic!("{kind:?} readback failed: {err}"),
    }
}

pub fn read_active(gpu: &GpuContext, renderer: &SceneRenderer) -> Vec<[f32; 4]> {
    let Some(active) = renderer.active_framebuffer() else {
        panic!("no active framebuffer");
    };
    match active.read_color(gpu, AttachmentSemantic::Color) {
        Ok(texels) => texels,
        Err(err) => panic!("active color readback failed: {err}"),
    }
}

pub fn center_luminance(texels: &[[f32; 4]]) -> f32 {
    let [r, g, b, _] = texels[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize];
    0.2126 * r + 0.7152 * g + 0.0722 * b
}
