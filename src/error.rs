//! Error types for renderer construction and frame execution.
//!
//! Construction errors (adapter, device, shadow resources, shaders, pipelines) are fatal:
//! they are returned from constructors and the caller is expected to abort. Capacity
//! overflow during submission is *not* an error; see [`SubmitOutcome`](crate::SubmitOutcome).

use std::path::PathBuf;

use thiserror::Error;

use crate::framebuffer::AttachmentSemantic;

/// Everything that can go wrong inside the renderer.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("failed to create window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("adapter lacks a required capability: {0}")]
    MissingCapability(&'static str),

    /// The shadow map texture array or cube array could not be created.
    #[error("shadow resources are incomplete: {0}")]
    ShadowResources(String),

    #[error("shader `{name}` failed to compile: {message}")]
    ShaderCompile { name: String, message: String },

    /// The device rejected one of the initial pipelines.
    #[error("failed to create render pipelines: {0}")]
    PipelineCreation(String),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("invalid renderer configuration: {0}")]
    Config(String),

    #[error("failed to parse renderer configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("framebuffer `{label}` is missing attachment(s) {missing:?}")]
    IncompatibleFramebuffer {
        label: String,
        missing: Vec<AttachmentSemantic>,
    },

    #[error("framebuffer `{label}` has no {semantic:?} attachment")]
    MissingAttachment {
        label: String,
        semantic: AttachmentSemantic,
    },

    #[error("no active framebuffer has been set")]
    NoActiveFramebuffer,

    #[error("render_scene called without a matching begin_scene")]
    SceneNotBegun,

    #[error("GPU readback failed: {0}")]
    Readback(String),
}

/// Convenience alias used throughout the crate.
pub type RenderResult<T> = Result<T, RendererError>;
