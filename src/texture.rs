use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use half::f16;
use rand::Rng;

use crate::error::RenderResult;
use crate::gpu::GpuContext;

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a GPU texture.
///
/// Every texture (and every framebuffer attachment) gets a fresh id when its storage is
/// allocated, so a resized attachment reports a new id. The IBL cache compares these to
/// decide whether sky cubemaps need regenerating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(u64);

impl RendererId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for display in editor panels.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A GPU texture that can be bound to shaders.
#[derive(Debug)]
pub struct Texture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
    id: RendererId,
}

impl Texture {
    fn upload(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        address_mode: wgpu::AddressMode,
        label: &str,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
            id: RendererId::next(),
        }
    }

    /// Create an sRGB color texture from raw RGBA data (albedo maps).
    pub fn from_rgba(gpu: &GpuContext, data: &[u8], width: u32, height: u32, label: &str) -> Self {
        Self::upload(
            gpu,
            data,
            width,
            height,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::AddressMode::Repeat,
            label,
        )
    }

    /// Create a linear texture from raw RGBA data (masks, noise, lookup data).
    pub fn from_rgba_linear(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        Self::upload(
            gpu,
            data,
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::AddressMode::Repeat,
            label,
        )
    }

    /// Load an sRGB texture from an image file.
    pub fn from_file(gpu: &GpuContext, path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(gpu, &img, width, height, &path.to_string_lossy()))
    }

    /// Load a linear texture from an image file.
    pub fn from_file_linear(gpu: &GpuContext, path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba_linear(
            gpu,
            &img,
            width,
            height,
            &path.to_string_lossy(),
        ))
    }

    /// Create an HDR equirectangular texture from linear RGBA float pixels.
    ///
    /// Stored as `Rgba16Float` so it can be filtered on every adapter.
    pub fn hdri_from_pixels(
        gpu: &GpuContext,
        pixels: &[[f32; 4]],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let halves: Vec<f16> = pixels
            .iter()
            .flat_map(|p| p.iter().map(|&c| f16::from_f32(c)))
            .collect();
        Self::upload(
            gpu,
            bytemuck::cast_slice(&halves),
            width,
            height,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::AddressMode::ClampToEdge,
            label,
        )
    }

    /// Load an HDR (or any) image as an equirectangular sky texture.
    pub fn hdri_from_file(gpu: &GpuContext, path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)?.to_rgba32f();
        let (width, height) = img.dimensions();
        let pixels: Vec<[f32; 4]> = img.pixels().map(|p| p.0).collect();
        Ok(Self::hdri_from_pixels(
            gpu,
            &pixels,
            width,
            height,
            &path.to_string_lossy(),
        ))
    }

    /// 4×4 tangent-space rotation vectors used to decorrelate SSAO samples.
    pub fn ssao_noise(gpu: &GpuContext, rng: &mut impl Rng) -> Self {
        const SIZE: u32 = 4;
        let pixels: Vec<f16> = (0..SIZE * SIZE)
            .flat_map(|_| {
                [
                    rng.gen_range(-1.0f32..1.0),
                    rng.gen_range(-1.0f32..1.0),
                    0.0,
                    1.0,
                ]
            })
            .map(f16::from_f32)
            .collect();
        Self::upload(
            gpu,
            bytemuck::cast_slice(&pixels),
            SIZE,
            SIZE,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::AddressMode::Repeat,
            "SSAO Noise Texture",
        )
    }

    /// A soft-edged hexagonal aperture used as the bokeh sprite shape.
    pub fn bokeh_hexagon(gpu: &GpuContext, size: u32) -> Self {
        let mut data = vec![0u8; (size * size * 4) as usize];
        let half = size as f32 * 0.5;

        for y in 0..size {
            for x in 0..size {
                let px = ((x as f32 + 0.5) - half) / half;
                let py = ((y as f32 + 0.5) - half) / half;
                // Distance to a flat-topped regular hexagon
                let (ax, ay) = (px.abs(), py.abs());
                let d = (ax * 0.866_025 + ay * 0.5).max(ay);
                let coverage = ((0.95 - d) / 0.05).clamp(0.0, 1.0);
                let value = (coverage * 255.0) as u8;

                let idx = ((y * size + x) * 4) as usize;
                data[idx..idx + 4].copy_from_slice(&[value, value, value, value]);
            }
        }

        Self::from_rgba_linear(gpu, &data, size, size, "Bokeh Shape Texture")
    }

    /// Sparse smudges for the bloom dirt mask.
    pub fn dirt_mask(gpu: &GpuContext, size: u32, rng: &mut impl Rng) -> Self {
        let mut intensity = vec![0.0f32; (size * size) as usize];

        for _ in 0..48 {
            let cx = rng.gen_range(0.0..size as f32);
            let cy = rng.gen_range(0.0..size as f32);
            let radius = rng.gen_range(size as f32 * 0.01..size as f32 * 0.08);
            let strength = rng.gen_range(0.2f32..0.8);

            for y in 0..size {
                for x in 0..size {
                    let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt() / radius;
                    if d < 1.0 {
                        intensity[(y * size + x) as usize] += strength * (1.0 - d * d);
                    }
                }
            }
        }

        let data: Vec<u8> = intensity
            .iter()
            .flat_map(|&v| {
                let c = (v.min(1.0) * 255.0) as u8;
                [c, c, c, 255]
            })
            .collect();

        Self::from_rgba_linear(gpu, &data, size, size, "Bloom Dirt Texture")
    }

    /// Tileable value noise for the procedural cloud sky.
    pub fn cloud_noise(gpu: &GpuContext, size: u32, rng: &mut impl Rng) -> Self {
        const LATTICE: u32 = 8;
        let lattice: Vec<f32> = (0..LATTICE * LATTICE).map(|_| rng.r#gen::<f32>()).collect();
        let at = |x: u32, y: u32| lattice[((y % LATTICE) * LATTICE + (x % LATTICE)) as usize];

        let mut data = vec![0u8; (size * size * 4) as usize];
        for y in 0..size {
            for x in 0..size {
                let fx = x as f32 / size as f32 * LATTICE as f32;
                let fy = y as f32 / size as f32 * LATTICE as f32;
                let (ix, iy) = (fx.floor() as u32, fy.floor() as u32);
                let (tx, ty) = (fx.fract(), fy.fract());
                let (sx, sy) = (tx * tx * (3.0 - 2.0 * tx), ty * ty * (3.0 - 2.0 * ty));

                let top = at(ix, iy) + (at(ix + 1, iy) - at(ix, iy)) * sx;
                let bottom = at(ix, iy + 1) + (at(ix + 1, iy + 1) - at(ix, iy + 1)) * sx;
                let v = ((top + (bottom - top) * sy) * 255.0) as u8;

                let idx = ((y * size + x) * 4) as usize;
                data[idx..idx + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }

        Self::from_rgba_linear(gpu, &data, size, size, "Cloud Noise Texture")
    }

    /// Identity used by identity-keyed caches.
    pub fn renderer_id(&self) -> RendererId {
        self.id
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

/// A cube map with an optional mip chain, renderable face by face.
pub struct TextureCube {
    pub(crate) texture: wgpu::Texture,
    /// Cube view over all faces and mips, for sampling.
    pub(crate) view: wgpu::TextureView,
    /// `faces[mip][face]` single-layer 2D views, for rendering.
    pub(crate) faces: Vec<[wgpu::TextureView; 6]>,
    pub size: u32,
    pub mip_levels: u32,
    id: RendererId,
}

impl TextureCube {
    pub fn new(
        gpu: &GpuContext,
        size: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let faces = (0..mip_levels)
            .map(|mip| {
                std::array::from_fn(|face| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(label),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        base_array_layer: face as u32,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
            })
            .collect();

        Self {
            texture,
            view,
            faces,
            size,
            mip_levels,
            id: RendererId::next(),
        }
    }

    /// Edge length of mip level `mip`.
    pub fn mip_size(&self, mip: u32) -> u32 {
        (self.size >> mip).max(1)
    }

    pub fn renderer_id(&self) -> RendererId {
        self.id
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_ids_are_unique() {
        let a = RendererId::next();
        let b = RendererId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
