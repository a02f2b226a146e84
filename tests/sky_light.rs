mod common;

use std::sync::Arc;

use phalanx::*;

use common::*;

fn gradient_hdri(gpu: &GpuContext, tint: [f32; 3]) -> Arc<Texture> {
    let (width, height) = (16, 8);
    let pixels: Vec<[f32; 4]> = (0..width * height)
        .map(|i| {
            let v = (i / width) as f32 / height as f32;
            let k = 0.5 + 0.5 * v;
            [tint[0] * k, tint[1] * k, tint[2] * k, 1.0]
        })
        .collect();
    Arc::new(Texture::hdri_from_pixels(gpu, &pixels, width, height, "Test HDRI"))
}

fn neutral_flow_map(gpu: &GpuContext) -> Arc<Texture> {
    let texel = [128, 128, 0, 255];
    Arc::new(Texture::from_rgba_linear(gpu, &texel, 1, 1, "Test Flow Map"))
}

fn submit_frame(gpu: &GpuContext, renderer: &mut SceneRenderer, sky: &SkyLight) -> SubmitOutcome {
    renderer.begin_scene(gpu, &top_down_camera());
    let outcome = renderer.submit_sky_light(gpu, sky);
    render(gpu, renderer);
    outcome
}

#[test]
fn same_hdri_bakes_once() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let sky = SkyLight::hdri(gradient_hdri(&gpu, [1.0, 0.8, 0.6]));

    for _ in 0..3 {
        assert_eq!(submit_frame(&gpu, &mut renderer, &sky), SubmitOutcome::Accepted);
    }
    assert_eq!(renderer.ibl().environment_generations(), 1);
    assert_eq!(renderer.ibl().flow_map_generations(), 0);
    assert_eq!(renderer.stats().sky_regenerations, 1);

    let other = SkyLight::hdri(gradient_hdri(&gpu, [0.2, 0.4, 1.0]));
    submit_frame(&gpu, &mut renderer, &other);
    assert_eq!(renderer.ibl().environment_generations(), 2);
}

#[test]
fn flow_map_bakes_once_per_texture() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let hdri = gradient_hdri(&gpu, [1.0, 1.0, 1.0]);
    let flow = neutral_flow_map(&gpu);
    let sky = SkyLight::hdri(hdri).with_flow_map(flow);

    submit_frame(&gpu, &mut renderer, &sky);
    submit_frame(&gpu, &mut renderer, &sky);
    assert_eq!(renderer.ibl().environment_generations(), 1);
    assert_eq!(renderer.ibl().flow_map_generations(), 1);
    assert!(renderer.ibl().has_flow_map());
}

#[test]
fn dropping_the_flow_map_disables_it() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let hdri = gradient_hdri(&gpu, [1.0, 1.0, 1.0]);
    let flow = neutral_flow_map(&gpu);

    submit_frame(&gpu, &mut renderer, &SkyLight::hdri(hdri.clone()).with_flow_map(flow.clone()));
    assert!(renderer.ibl().has_flow_map());

    submit_frame(&gpu, &mut renderer, &SkyLight::hdri(hdri.clone()));
    assert!(!renderer.ibl().has_flow_map());
    assert_eq!(renderer.ibl().environment_generations(), 1);

    // Same flow texture again: enabled without a second bake
    submit_frame(&gpu, &mut renderer, &SkyLight::hdri(hdri).with_flow_map(flow));
    assert!(renderer.ibl().has_flow_map());
    assert_eq!(renderer.ibl().flow_map_generations(), 1);
}

#[test]
fn second_sky_light_in_a_frame_is_ignored() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let sky = SkyLight::hdri(gradient_hdri(&gpu, [1.0, 1.0, 1.0]));

    renderer.begin_scene(&gpu, &top_down_camera());
    assert_eq!(renderer.submit_sky_light(&gpu, &sky), SubmitOutcome::Accepted);
    assert_eq!(renderer.submit_sky_light(&gpu, &SkyLight::procedural()), SubmitOutcome::Ignored);
    render(&gpu, &mut renderer);

    assert_eq!(renderer.overflow().sky_lights_ignored, 1);
    assert_eq!(renderer.ibl().environment_generations(), 1);
}

#[test]
fn sky_lights_the_background() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let sky = SkyLight::hdri(gradient_hdri(&gpu, [1.0, 1.0, 1.0]));
    submit_frame(&gpu, &mut renderer, &sky);

    let lit = read_stage(&gpu, &renderer, FramebufferKind::DeferredLighting);
    assert!(center_luminance(&lit) > 0.0);
}
