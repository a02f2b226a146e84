//! # Phalanx
//!
//! **A deferred, clustered scene renderer on wgpu.**
//!
//! A [`SceneRenderer`] turns one frame's submissions (models, lights, a sky and fog
//! volumes) into a lit, post-processed image inside a framebuffer you own. The frame runs
//! through shadow maps, a depth prepass, a G-buffer, clustered light culling, a
//! fullscreen lighting resolve and a configurable post chain.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use phalanx::*;
//!
//! fn main() -> Result<(), RendererError> {
//!     let gpu = GpuContext::headless()?;
//!     let config = RendererConfig::new().with_initial_size(1280, 720);
//!     let mut renderer = SceneRenderer::new(&gpu, config)?;
//!     let gbuffer = Framebuffer::new(&gpu, FramebufferSpec::gbuffer(1280, 720));
//!     renderer.set_active_framebuffer(&gpu, gbuffer)?;
//!
//!     let cube = Arc::new(Model::from_mesh(Mesh::from_data(
//!         &gpu,
//!         &MeshData::cube(),
//!         renderer.default_material(),
//!     )));
//!     let camera = EditorCamera::new().at(0.0, 2.0, 6.0).looking_at(0.0, 0.0, 0.0);
//!
//!     renderer.begin_scene(&gpu, &camera);
//!     renderer.submit_directional_light(
//!         Mat4::from_rotation_z(-std::f32::consts::FRAC_PI_2),
//!         &DirectionalLight::default(),
//!     );
//!     renderer.submit_model(ModelSubmission {
//!         transform: Mat4::IDENTITY,
//!         model: cube,
//!         materials: Vec::new(),
//!         animator: None,
//!         entity_id: 1,
//!         selected: false,
//!     });
//!     renderer.render_scene(&gpu)?;
//!     renderer.end_scene();
//!     Ok(())
//! }
//! ```
//!
//! ## Frame protocol
//!
//! - `begin_scene` resets the submission state and captures the camera
//! - the `submit_*` calls report a [`SubmitOutcome`] instead of silently dropping work
//! - `render_scene` records one command encoder, submits it once, and leaves the result in
//!   the active framebuffer's color, entity id and depth attachments
//!
//! Shaders can be overridden from disk and hot reloaded, see [`RendererConfig`].

pub mod buffers;
pub mod camera;
pub mod clustering;
pub mod config;
pub mod deferred;
pub mod error;
pub mod framebuffer;
pub mod gpu;
pub mod hot_shader;
pub mod ibl;
pub mod material;
pub mod mesh;
pub mod post_process;
pub mod render_path;
pub mod scene_renderer;
pub mod shadows;
pub mod stats;
pub mod submission;
pub mod texture;

pub use camera::{EditorCamera, ProjectionKind, RenderCamera, SceneCamera};
pub use config::{PassFlags, PostProcessSettings, RendererConfig};
pub use error::{RenderResult, RendererError};
pub use framebuffer::{AttachmentSemantic, AttachmentSpec, Framebuffer, FramebufferSpec};
pub use gpu::{GpuContext, WindowSurface};
pub use ibl::{SkyLight, SkySource};
pub use material::{AlphaBlendMode, Material, MaterialDesc, MaterialLayout};
pub use mesh::{Animator, Mesh, MeshData, Model, Transform, Vertex3d};
pub use post_process::FullscreenPass;
pub use render_path::{FramebufferKind, GBufferChannel, VisualizationMode};
pub use scene_renderer::SceneRenderer;
pub use stats::Statistics;
pub use submission::{
    DirectionalLight, ModelSubmission, OverflowReport, PointLight, SpotLight, SubmitOutcome, Volume,
};
pub use texture::{RendererId, Texture};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
