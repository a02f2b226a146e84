//! Demo scene: a `hecs` world of models and lights rendered by the scene renderer and
//! blitted to a window.
//!
//! Keys: `V` cycles the visualization mode, `B` toggles bloom, `Escape` quits.

use std::sync::Arc;
use std::time::Instant;

use hecs::World;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use phalanx::{
    AttachmentSemantic, DirectionalLight, EditorCamera, Framebuffer, FramebufferSpec,
    FullscreenPass, GpuContext, Mat4, Material, MaterialDesc, Mesh, MeshData, Model,
    ModelSubmission, PointLight, Quat, RenderResult, RendererConfig, SceneRenderer, SkyLight,
    Transform, Vec3, VisualizationMode, Volume, WindowSurface,
};

/// Tags an entity whose model should be outlined.
struct Selected;

/// Entity orbiting the origin at `speed` radians per second.
struct Orbit {
    radius: f32,
    height: f32,
    speed: f32,
}

struct Fog {
    scale: Vec3,
    volume: Volume,
}

struct Viewer {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: WindowSurface,
    renderer: SceneRenderer,
    blit: FullscreenPass,
    camera: EditorCamera,
    world: World,
}

impl Viewer {
    fn new(window: Arc<Window>) -> RenderResult<Self> {
        let (gpu, surface) = GpuContext::with_window(window.clone())?;
        let (width, height) = (surface.width(), surface.height());

        let config = RendererConfig::load("phalanx.toml").unwrap_or_else(|err| {
            log::info!("no usable phalanx.toml ({err}), using defaults");
            RendererConfig::new()
        });
        let mut renderer = SceneRenderer::new(&gpu, config.with_initial_size(width, height))?;
        let gbuffer = Framebuffer::new(&gpu, FramebufferSpec::gbuffer(width, height));
        renderer.set_active_framebuffer(&gpu, gbuffer)?;
        if surface.config.format.is_srgb() {
            // The final composite already encodes gamma
            renderer.post_settings_mut().gamma = 1.0;
        }

        let blit = FullscreenPass::blit(&gpu, renderer.shaders(), surface.config.format);
        let camera = EditorCamera::new()
            .at(0.0, 4.0, 12.0)
            .looking_at(0.0, 0.5, 0.0)
            .with_viewport(width as f32, height as f32);
        let world = build_world(&gpu, &renderer);

        Ok(Self {
            window,
            gpu,
            surface,
            renderer,
            blit,
            camera,
            world,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface.resize(&self.gpu, width, height);
        self.renderer.resize(&self.gpu, width, height);
        self.camera.set_viewport_size(width as f32, height as f32);
    }

    fn key(&mut self, code: KeyCode) {
        match code {
            KeyCode::KeyV => {
                let modes = VisualizationMode::ALL;
                let current = modes
                    .iter()
                    .position(|m| *m == self.renderer.visualization_mode())
                    .unwrap_or(0);
                let next = modes[(current + 1) % modes.len()];
                log::info!("visualization mode: {next:?}");
                self.renderer.set_visualization_mode(next);
            }
            KeyCode::KeyB => {
                let passes = self.renderer.passes_mut();
                passes.bloom = !passes.bloom;
                log::info!("bloom: {}", passes.bloom);
            }
            _ => {}
        }
    }

    fn animate(&mut self, time: f32) {
        for (_, (transform, orbit)) in self.world.query_mut::<(&mut Transform, &Orbit)>() {
            let angle = time * orbit.speed;
            transform.position =
                Vec3::new(angle.cos() * orbit.radius, orbit.height, angle.sin() * orbit.radius);
        }
    }

    fn render(&mut self, dt: f32) -> RenderResult<()> {
        self.renderer.update_timestep(dt);
        self.renderer.begin_scene(&self.gpu, &self.camera);

        self.renderer.submit_sky_light(&self.gpu, &SkyLight::procedural());
        let sun = Mat4::from_quat(Quat::from_euler(glam::EulerRot::ZYX, -1.1, 0.4, 0.0));
        let sunlight = DirectionalLight {
            color: Vec3::new(1.0, 0.95, 0.85),
            intensity: 3.0,
        };
        self.renderer.submit_directional_light(sun, &sunlight);

        for (_, (transform, light)) in self.world.query::<(&Transform, &PointLight)>().iter() {
            self.renderer.submit_point_light(transform.matrix(), light);
        }
        for (_, (transform, fog)) in self.world.query::<(&Transform, &Fog)>().iter() {
            self.renderer.submit_volume(transform.position, fog.scale, &fog.volume);
        }
        for (entity, (transform, model, selected)) in
            self.world.query::<(&Transform, &Arc<Model>, Option<&Selected>)>().iter()
        {
            self.renderer.submit_model(ModelSubmission {
                transform: transform.matrix(),
                model: model.clone(),
                materials: Vec::new(),
                animator: None,
                entity_id: entity.id() as i32,
                selected: selected.is_some(),
            });
        }

        self.renderer.render_scene(&self.gpu)?;
        self.renderer.end_scene();
        self.present()
    }

    fn present(&self) -> RenderResult<()> {
        let Some(active) = self.renderer.active_framebuffer() else {
            return Ok(());
        };
        let output = match self.surface.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return Ok(());
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let inputs = self
            .blit
            .bind_inputs(&self.gpu, &[active.bind_attachment(AttachmentSemantic::Color)?]);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.blit.draw(&mut pass, None, &inputs, &[]);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn build_world(gpu: &GpuContext, renderer: &SceneRenderer) -> World {
    let mut world = World::new();
    let layout = renderer.material_layout();
    let material = |desc: MaterialDesc| Arc::new(Material::new(gpu, layout, desc));
    let model = |data: &MeshData, material: Arc<Material>| {
        Arc::new(Model::from_mesh(Mesh::from_data(gpu, data, material)))
    };

    let ground_desc = MaterialDesc::default()
        .with_albedo(0.6, 0.6, 0.6)
        .with_roughness(0.9);
    let ground = model(&MeshData::plane(40.0), material(ground_desc));
    world.spawn((Transform::new(), ground));

    let sphere = MeshData::sphere(48, 24);
    let metals = [(0.95, 0.64, 0.54), (0.91, 0.92, 0.92), (1.0, 0.78, 0.34)];
    for (i, (r, g, b)) in metals.into_iter().enumerate() {
        let desc = MaterialDesc::default()
            .with_albedo(r, g, b)
            .with_metallic(1.0)
            .with_roughness(0.15 + 0.3 * i as f32);
        let position = Vec3::new(-3.0 + 3.0 * i as f32, 1.0, 0.0);
        let entity = world.spawn((
            Transform::from_position(position),
            model(&sphere, material(desc)),
        ));
        if i == 1 {
            let _ = world.insert_one(entity, Selected);
        }
    }

    let glowing = MaterialDesc::default()
        .with_albedo(0.1, 0.1, 0.1)
        .with_emission(1.0, 0.4, 0.1, 4.0);
    world.spawn((
        Transform::from_position(Vec3::new(0.0, 0.5, 3.0)).uniform_scale(0.8),
        model(&MeshData::cube(), material(glowing)),
    ));

    let colors = [
        Vec3::new(1.0, 0.3, 0.2),
        Vec3::new(0.2, 0.5, 1.0),
        Vec3::new(0.3, 1.0, 0.4),
    ];
    for (i, color) in colors.into_iter().enumerate() {
        world.spawn((
            Transform::new(),
            PointLight {
                color,
                intensity: 20.0,
                radius: 12.0,
                casts_shadows: i == 0,
            },
            Orbit {
                radius: 5.0,
                height: 2.0 + i as f32 * 0.5,
                speed: 0.4 + 0.2 * i as f32,
            },
        ));
    }

    world.spawn((
        Transform::from_position(Vec3::new(6.0, 1.5, -4.0)),
        Fog {
            scale: Vec3::new(6.0, 3.0, 6.0),
            volume: Volume {
                blend: true,
                ..Volume::default()
            },
        },
    ));

    world
}

#[derive(Default)]
struct App {
    viewer: Option<Viewer>,
    last_frame: Option<Instant>,
    start: Option<Instant>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("Phalanx");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };
        match Viewer::new(window) {
            Ok(viewer) => {
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
                self.start = Some(Instant::now());
            }
            Err(err) => {
                log::error!("failed to start renderer: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape {
                    event_loop.exit();
                } else {
                    viewer.key(code);
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = self.last_frame.map_or(0.0, |last| (now - last).as_secs_f32());
                self.last_frame = Some(now);
                let time = self.start.map_or(0.0, |start| (now - start).as_secs_f32());

                viewer.animate(time);
                if let Err(err) = viewer.render(dt) {
                    log::error!("frame failed: {err}");
                }
                viewer.window.request_redraw();
            }
            _ => (),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app)?;
    Ok(())
}
