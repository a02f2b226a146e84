//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the device and queue every pass and resource is created from.
//! The renderer itself never presents, so the context works without a window:
//!
//! - [`GpuContext::headless`] creates a device with no surface (tests, offline renders).
//! - [`GpuContext::with_window`] also configures a [`WindowSurface`] for a winit window.
//!
//! Optional device features are enabled when the adapter offers them and reported
//! through [`GpuContext::supports`]. Downlevel capabilities the renderer cannot work
//! without (compute, cube map arrays, vertex storage reads) are checked up front and
//! surface as [`RendererError::MissingCapability`].

use std::sync::Arc;

use winit::window::Window;

use crate::error::{RenderResult, RendererError};

/// Features used when present: unclipped depth for cascaded shadows, and line
/// polygons for the wireframe visualization.
const OPTIONAL_FEATURES: wgpu::Features =
    wgpu::Features::DEPTH_CLIP_CONTROL.union(wgpu::Features::POLYGON_MODE_LINE);

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Features that were actually enabled on the device.
    pub features: wgpu::Features,
    /// Limits the device was created with.
    pub limits: wgpu::Limits,
    /// Name, backend and driver of the selected adapter.
    pub adapter_info: wgpu::AdapterInfo,
}

/// A configured presentation surface for a window.
pub struct WindowSurface {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a device without any presentation surface.
    ///
    /// Falls back to a software adapter when no hardware adapter is available. The GL
    /// backend is never selected, see [`backend_limitation`].
    pub fn headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all().difference(wgpu::Backends::GL),
            ..Default::default()
        });

        let adapter = match pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        )) {
            Ok(adapter) => adapter,
            Err(_) => pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: true,
            }))?,
        };

        Self::from_adapter(&adapter)
    }

    /// Create a device and a surface configured for `window`.
    ///
    /// The surface uses an sRGB format when one is available and Fifo presentation.
    pub fn with_window(window: Arc<Window>) -> RenderResult<(Self, WindowSurface)> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let gpu = Self::from_adapter(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RendererError::MissingCapability("surface has no supported formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok((gpu, WindowSurface { surface, config }))
    }

    fn from_adapter(adapter: &wgpu::Adapter) -> RenderResult<Self> {
        let adapter_info = adapter.get_info();
        if let Some(name) = backend_limitation(adapter_info.backend) {
            return Err(RendererError::MissingCapability(name));
        }
        let downlevel = adapter.get_downlevel_capabilities();

        for (flag, name) in [
            (wgpu::DownlevelFlags::COMPUTE_SHADERS, "compute shaders"),
            (wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES, "cube map arrays"),
            (wgpu::DownlevelFlags::VERTEX_STORAGE, "vertex stage storage buffers"),
        ] {
            if !downlevel.flags.contains(flag) {
                return Err(RendererError::MissingCapability(name));
            }
        }

        let features = adapter.features() & OPTIONAL_FEATURES;
        let limits = adapter.limits();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Phalanx Device"),
            required_features: features,
            required_limits: limits.clone(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        log::info!(
            "using adapter `{}` ({:?}), optional features {:?}",
            adapter_info.name,
            adapter_info.backend,
            features
        );

        Ok(Self {
            device,
            queue,
            features,
            limits,
            adapter_info,
        })
    }

    /// Returns `true` if every feature in `features` is enabled on the device.
    pub fn supports(&self, features: wgpu::Features) -> bool {
        self.features.contains(features)
    }

    /// Minimum alignment of dynamic uniform buffer offsets.
    pub fn uniform_alignment(&self) -> u64 {
        self.limits.min_uniform_buffer_offset_alignment as u64
    }

    /// Run `f` inside validation and internal error scopes.
    ///
    /// Returns the first error raised by the wgpu calls in `f` instead of letting it reach
    /// the device's uncaptured error handler. Shader translation failures in a backend
    /// are internal errors, everything else is validation.
    pub fn validation_scope<T>(&self, f: impl FnOnce() -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::Internal);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let internal = pollster::block_on(self.device.pop_error_scope());
        match validation.or(internal) {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    /// Map a `MAP_READ` buffer and copy its contents out, blocking until the GPU is done.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer) -> RenderResult<Vec<u8>> {
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RendererError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| RendererError::Readback(e.to_string()))?
            .map_err(|e| RendererError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }

    /// Copy `size` bytes of a GPU-only buffer into a staging buffer and read them.
    pub fn read_storage(&self, source: &wgpu::Buffer, size: u64) -> RenderResult<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.read_buffer(&staging)
    }
}

impl WindowSurface {
    /// Resize the surface to new dimensions.
    ///
    /// Ignores zero-sized dimensions (which occur while the window is minimized).
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}

/// Backends whose shader translation cannot express the renderer's shaders.
///
/// GLSL has no `textureLoad` for depth textures, which several fullscreen passes use.
pub fn backend_limitation(backend: wgpu::Backend) -> Option<&'static str> {
    match backend {
        wgpu::Backend::Gl => Some("depth texture loads (GL backend)"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_backend_is_rejected() {
        assert_eq!(backend_limitation(wgpu::Backend::Gl), Some("depth texture loads (GL backend)"));
        for backend in [wgpu::Backend::Vulkan, wgpu::Backend::Metal, wgpu::Backend::Dx12] {
            assert_eq!(backend_limitation(backend), None);
        }
    }
}
