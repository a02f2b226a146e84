mod common;

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use phalanx::buffers::PointLightData;
use phalanx::clustering::{self, MAX_LIGHTS_PER_TILE};
use phalanx::*;

use common::*;

#[test]
fn unlit_scene_resolves_to_black() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let plane = white_plane(&gpu, &renderer);

    renderer.begin_scene(&gpu, &top_down_camera());
    renderer.submit_model(static_model(plane, 1));
    render(&gpu, &mut renderer);

    let lit = read_stage(&gpu, &renderer, FramebufferKind::DeferredLighting);
    assert_eq!(lit.len(), (WIDTH * HEIGHT) as usize);
    for texel in &lit {
        assert_eq!(texel[..3], [0.0, 0.0, 0.0]);
    }
}

#[test]
fn brighter_directional_light_lights_more() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    let plane = white_plane(&gpu, &renderer);
    let camera = top_down_camera();

    let mut lit_at = |intensity: f32| {
        renderer.begin_scene(&gpu, &camera);
        let light = DirectionalLight {
            color: Vec3::ONE,
            intensity,
        };
        renderer.submit_directional_light(straight_down(), &light);
        renderer.submit_model(static_model(plane.clone(), 1));
        render(&gpu, &mut renderer);
        center_luminance(&read_stage(&gpu, &renderer, FramebufferKind::DeferredLighting))
    };

    let bright = lit_at(1.0);
    let dim = lit_at(0.1);
    assert!(dim > 0.0, "dim light should still reach the plane");
    assert!(bright > dim, "bright {bright} should exceed dim {dim}");
}

#[test]
fn gpu_light_grid_matches_cpu_reference() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config().with_max_point_lights(512));
    let plane = white_plane(&gpu, &renderer);

    let camera = SceneCamera::perspective(60.0, WIDTH as f32 / HEIGHT as f32, 0.1, 60.0)
        .with_transform(Mat4::from_translation(Vec3::new(50.0, 50.0, 70.0)));

    let mut rng = StdRng::seed_from_u64(400);
    let mut lights = Vec::new();
    renderer.begin_scene(&gpu, &camera);
    for _ in 0..400 {
        let position = Vec3::new(
            rng.gen_range(0.0..100.0),
            rng.gen_range(0.0..100.0),
            rng.gen_range(0.0..100.0),
        );
        let light = PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: rng.gen_range(1.0..8.0),
            casts_shadows: false,
        };
        renderer.submit_point_light(Mat4::from_translation(position), &light);
        lights.push(PointLightData {
            position: position.extend(1.0).to_array(),
            color: [1.0; 4],
            enabled: 1,
            intensity: light.intensity,
            range: light.radius,
            shadow_index: -1,
        });
    }
    renderer.submit_model(static_model(plane, 1));
    render(&gpu, &mut renderer);

    let inverse_projection = camera.projection_matrix().inverse();
    let aabbs = clustering::cluster_aabbs(inverse_projection, [WIDTH, HEIGHT], 0.1, 60.0);
    let reference = clustering::cull_lights_reference(&aabbs, camera.view_matrix(), &lights);
    let assigned = match renderer.clusters().read_cluster_lights(&gpu) {
        Ok(assigned) => assigned,
        Err(err) => panic!("cluster readback failed: {err}"),
    };
    assert_eq!(assigned.len(), reference.len());

    let mut total = 0usize;
    let mut mismatched = 0usize;
    for (gpu_lights, cpu_lights) in assigned.iter().zip(&reference) {
        if cpu_lights.len() < MAX_LIGHTS_PER_TILE as usize {
            assert!(gpu_lights.len() < MAX_LIGHTS_PER_TILE as usize);
        }
        let gpu_set: HashSet<u32> = gpu_lights.iter().copied().collect();
        let cpu_set: HashSet<u32> = cpu_lights.iter().copied().collect();
        total += cpu_set.len();
        mismatched += gpu_set.symmetric_difference(&cpu_set).count();
    }
    assert!(total > 0, "the camera should see some lights");
    // Boundary lights can land either side of a cluster plane in f32
    assert!(mismatched * 100 <= total, "{mismatched} of {total} assignments differ");
}

#[test]
fn point_light_reaches_the_bottom_row_of_a_square_viewport() {
    let Some(gpu) = gpu() else { return };
    let size = 96;
    let mut renderer = renderer_sized(&gpu, small_config(), size, size);
    let plane = white_plane(&gpu, &renderer);

    // Screen bottom looks at +z; the light sits over the last few pixel rows
    renderer.begin_scene(&gpu, &top_down_camera_with_aspect(1.0));
    let light = PointLight {
        color: Vec3::ONE,
        intensity: 5.0,
        radius: 1.5,
        casts_shadows: false,
    };
    renderer.submit_point_light(Mat4::from_translation(Vec3::new(0.0, 0.5, 2.6)), &light);
    renderer.submit_model(static_model(plane, 1));
    render(&gpu, &mut renderer);

    let lit = read_stage(&gpu, &renderer, FramebufferKind::DeferredLighting);
    assert_eq!(lit.len(), (size * size) as usize);
    let [r, g, b, _] = lit[(92 * size + size / 2) as usize];
    assert!(r + g + b > 0.0, "bottom row fragment missed the light in its cluster");
}

#[test]
fn disabled_bloom_matches_never_enabled() {
    let Some(gpu) = gpu() else { return };
    let camera = top_down_camera();

    let frame = |renderer: &mut SceneRenderer, plane: &std::sync::Arc<Model>| {
        renderer.begin_scene(&gpu, &camera);
        let light = DirectionalLight {
            color: Vec3::ONE,
            intensity: 4.0,
        };
        renderer.submit_directional_light(straight_down(), &light);
        renderer.submit_model(static_model(plane.clone(), 1));
        render(&gpu, renderer);
        read_active(&gpu, renderer)
    };

    let bloom = PassFlags {
        bloom: true,
        ..PassFlags::default()
    };
    let mut toggled = renderer(&gpu, small_config().with_passes(bloom));
    let plane = white_plane(&gpu, &toggled);
    let with_bloom = frame(&mut toggled, &plane);
    toggled.passes_mut().bloom = false;
    let passes_before = toggled.stats().passes_executed;
    let toggled_off = frame(&mut toggled, &plane);
    let passes_without_bloom = toggled.stats().passes_executed - passes_before;

    let mut plain = renderer(&gpu, small_config());
    let plain_plane = white_plane(&gpu, &plain);
    frame(&mut plain, &plain_plane);
    let passes_before = plain.stats().passes_executed;
    let never_enabled = frame(&mut plain, &plain_plane);

    assert_eq!(passes_without_bloom, plain.stats().passes_executed - passes_before);
    assert_eq!(toggled_off, never_enabled);
    assert_ne!(with_bloom, toggled_off, "bloom should have contributed while enabled");
}

#[test]
fn render_without_begin_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let mut renderer = renderer(&gpu, small_config());
    assert!(matches!(renderer.render_scene(&gpu), Err(RendererError::SceneNotBegun)));
}
