//! WGSL sources, disk overrides and hot reloading.
//!
//! Every shader the renderer uses is embedded in the binary with `include_str!`. A file
//! named `renderer3d_<name>.wgsl` in the configured shader directory replaces the embedded
//! body of the same name, so shaders can be tweaked without rebuilding. Shared preludes
//! (`common`, `frame`, `fullscreen`) are always prepended from the embedded copies.
//!
//! With hot reload on, [`ShaderLibrary::poll_changes`] re-reads modified files once per
//! frame. A body that fails to compile is reported and the previous module stays in use.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{RenderResult, RendererError};
use crate::gpu::GpuContext;

const COMMON: &str = include_str!("shaders/common.wgsl");
const FRAME: &str = include_str!("shaders/frame.wgsl");
const FULLSCREEN: &str = include_str!("shaders/fullscreen.wgsl");

/// Shared source prepended to a shader body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prelude {
    /// Struct definitions and math helpers.
    Common,
    /// The per-frame uniforms at bind group 0.
    Frame,
    /// The fullscreen triangle vertex shader.
    Fullscreen,
}

impl Prelude {
    fn source(self) -> &'static str {
        match self {
            Prelude::Common => COMMON,
            Prelude::Frame => FRAME,
            Prelude::Fullscreen => FULLSCREEN,
        }
    }
}

/// Every shader program the renderer compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    PreDepth,
    GBuffer,
    ShadowCascade,
    ShadowPoint,
    ClusterBuild,
    ClusterCull,
    DeferredLighting,
    BufferVisualization,
    Bloom,
    Ssao,
    Ssr,
    MotionBlur,
    DepthOfField,
    Bokeh,
    LensDistortion,
    Fxaa,
    FinalComposite,
    Outline,
    Ibl,
    VolumetricClouds,
    DrawTexture,
}

impl ShaderId {
    pub const ALL: [ShaderId; 21] = [
        ShaderId::PreDepth,
        ShaderId::GBuffer,
        ShaderId::ShadowCascade,
        ShaderId::ShadowPoint,
        ShaderId::ClusterBuild,
        ShaderId::ClusterCull,
        ShaderId::DeferredLighting,
        ShaderId::BufferVisualization,
        ShaderId::Bloom,
        ShaderId::Ssao,
        ShaderId::Ssr,
        ShaderId::MotionBlur,
        ShaderId::DepthOfField,
        ShaderId::Bokeh,
        ShaderId::LensDistortion,
        ShaderId::Fxaa,
        ShaderId::FinalComposite,
        ShaderId::Outline,
        ShaderId::Ibl,
        ShaderId::VolumetricClouds,
        ShaderId::DrawTexture,
    ];

    /// Name used in override file names and labels.
    pub fn name(self) -> &'static str {
        match self {
            ShaderId::PreDepth => "pre_depth",
            ShaderId::GBuffer => "gbuffer",
            ShaderId::ShadowCascade => "shadow_cascade",
            ShaderId::ShadowPoint => "shadow_point",
            ShaderId::ClusterBuild => "cluster_build",
            ShaderId::ClusterCull => "cluster_cull",
            ShaderId::DeferredLighting => "deferred_lighting",
            ShaderId::BufferVisualization => "buffer_visualization",
            ShaderId::Bloom => "bloom",
            ShaderId::Ssao => "ssao",
            ShaderId::Ssr => "ssr",
            ShaderId::MotionBlur => "motion_blur",
            ShaderId::DepthOfField => "dof",
            ShaderId::Bokeh => "bokeh",
            ShaderId::LensDistortion => "lens_distortion",
            ShaderId::Fxaa => "fxaa",
            ShaderId::FinalComposite => "final_composite",
            ShaderId::Outline => "outline",
            ShaderId::Ibl => "ibl",
            ShaderId::VolumetricClouds => "volumetric_clouds",
            ShaderId::DrawTexture => "draw_texture",
        }
    }

    fn embedded(self) -> &'static str {
        match self {
            ShaderId::PreDepth => include_str!("shaders/pre_depth.wgsl"),
            ShaderId::GBuffer => include_str!("shaders/gbuffer.wgsl"),
            ShaderId::ShadowCascade => include_str!("shaders/shadow_cascade.wgsl"),
            ShaderId::ShadowPoint => include_str!("shaders/shadow_point.wgsl"),
            ShaderId::ClusterBuild => include_str!("shaders/cluster_build.wgsl"),
            ShaderId::ClusterCull => include_str!("shaders/cluster_cull.wgsl"),
            ShaderId::DeferredLighting => include_str!("shaders/deferred_lighting.wgsl"),
            ShaderId::BufferVisualization => include_str!("shaders/buffer_visualization.wgsl"),
            ShaderId::Bloom => include_str!("shaders/bloom.wgsl"),
            ShaderId::Ssao => include_str!("shaders/ssao.wgsl"),
            ShaderId::Ssr => include_str!("shaders/ssr.wgsl"),
            ShaderId::MotionBlur => include_str!("shaders/motion_blur.wgsl"),
            ShaderId::DepthOfField => include_str!("shaders/dof.wgsl"),
            ShaderId::Bokeh => include_str!("shaders/bokeh.wgsl"),
            ShaderId::LensDistortion => include_str!("shaders/lens_distortion.wgsl"),
            ShaderId::Fxaa => include_str!("shaders/fxaa.wgsl"),
            ShaderId::FinalComposite => include_str!("shaders/final_composite.wgsl"),
            ShaderId::Outline => include_str!("shaders/outline.wgsl"),
            ShaderId::Ibl => include_str!("shaders/ibl.wgsl"),
            ShaderId::VolumetricClouds => include_str!("shaders/volumetric_clouds.wgsl"),
            ShaderId::DrawTexture => include_str!("shaders/draw_texture.wgsl"),
        }
    }

    fn preludes(self) -> &'static [Prelude] {
        use Prelude::*;
        match self {
            ShaderId::PreDepth
            | ShaderId::GBuffer
            | ShaderId::ClusterBuild
            | ShaderId::ClusterCull
            | ShaderId::Bokeh => &[Common, Frame],
            ShaderId::ShadowCascade | ShaderId::ShadowPoint | ShaderId::Ibl => &[Common],
            ShaderId::DrawTexture => &[Fullscreen],
            _ => &[Common, Frame, Fullscreen],
        }
    }

    /// Full source: preludes followed by `body`.
    fn assemble(self, body: &str) -> String {
        let mut source = String::new();
        for prelude in self.preludes() {
            source.push_str(prelude.source());
            source.push('\n');
        }
        source.push_str(body);
        source
    }
}

/// A shader source file watched for modification.
pub struct HotShader {
    path: PathBuf,
    last_modified: SystemTime,
    source: String,
}

impl HotShader {
    /// Load a shader from the given file path.
    pub fn new(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let io = |source| RendererError::Io {
            path: path.clone(),
            source,
        };
        let source = fs::read_to_string(&path).map_err(io)?;
        let last_modified = fs::metadata(&path).and_then(|m| m.modified()).map_err(io)?;

        Ok(Self {
            path,
            last_modified,
            source,
        })
    }

    /// Re-read the file if its modification time moved forward.
    /// Returns `true` if the source changed.
    pub fn check_reload(&mut self) -> bool {
        let Ok(modified) = fs::metadata(&self.path).and_then(|m| m.modified()) else {
            return false;
        };

        if modified > self.last_modified {
            if let Ok(source) = fs::read_to_string(&self.path) {
                self.last_modified = modified;
                let changed = source != self.source;
                self.source = source;
                return changed;
            }
        }

        false
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct ShaderEntry {
    id: ShaderId,
    file: Option<HotShader>,
    module: wgpu::ShaderModule,
}

/// All compiled shader modules, indexed by [`ShaderId`].
pub struct ShaderLibrary {
    dir: PathBuf,
    hot_reload: bool,
    entries: Vec<ShaderEntry>,
}

impl ShaderLibrary {
    /// Compile every shader, preferring disk overrides found in `dir`.
    ///
    /// Any compile failure here is fatal.
    pub fn new(gpu: &GpuContext, dir: impl Into<PathBuf>, hot_reload: bool) -> RenderResult<Self> {
        let dir = dir.into();
        let mut entries = Vec::with_capacity(ShaderId::ALL.len());

        for id in ShaderId::ALL {
            let file = Self::override_path(&dir, id)
                .is_file()
                .then(|| HotShader::new(Self::override_path(&dir, id)))
                .transpose()?;
            if let Some(file) = &file {
                log::info!("using shader override {:?}", file.path());
            }
            let body = file.as_ref().map_or(id.embedded(), |f| f.source());
            let module = compile(gpu, id, body)?;
            entries.push(ShaderEntry { id, file, module });
        }

        Ok(Self {
            dir,
            hot_reload,
            entries,
        })
    }

    pub fn override_path(dir: &Path, id: ShaderId) -> PathBuf {
        dir.join(format!("renderer3d_{}.wgsl", id.name()))
    }

    pub fn module(&self, id: ShaderId) -> &wgpu::ShaderModule {
        // Entries are built from ShaderId::ALL in declaration order
        &self.entries[id as usize].module
    }

    pub fn hot_reload(&self) -> bool {
        self.hot_reload
    }

    /// Recompile shaders whose override files changed (or newly appeared).
    ///
    /// Returns `true` if at least one module was replaced, meaning pipelines built from
    /// the library are stale.
    pub fn poll_changes(&mut self, gpu: &GpuContext) -> bool {
        if !self.hot_reload {
            return false;
        }

        let mut changed = false;
        for entry in &mut self.entries {
            let reloaded = match &mut entry.file {
                Some(file) => file.check_reload(),
                None => {
                    let path = Self::override_path(&self.dir, entry.id);
                    match path.is_file().then(|| HotShader::new(&path)) {
                        Some(Ok(file)) => {
                            entry.file = Some(file);
                            true
                        }
                        _ => false,
                    }
                }
            };
            if !reloaded {
                continue;
            }

            let Some(file) = &entry.file else { continue };
            log::info!("[hot-reload] Reloading shader: {:?}", file.path());
            match compile(gpu, entry.id, file.source()) {
                Ok(module) => {
                    entry.module = module;
                    changed = true;
                    log::info!("[hot-reload] Shader `{}` compiled successfully", entry.id.name());
                }
                Err(err) => {
                    log::warn!("[hot-reload] {err}, keeping previous version");
                }
            }
        }
        changed
    }
}

fn compile(gpu: &GpuContext, id: ShaderId, body: &str) -> RenderResult<wgpu::ShaderModule> {
    let source = id.assemble(body);
    let label = format!("Renderer3D {} Shader", id.name());
    gpu.validation_scope(|| {
        gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })
    .map_err(|e| RendererError::ShaderCompile {
        name: id.name().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_index_in_declaration_order() {
        for (i, id) in ShaderId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, i);
        }
    }

    #[test]
    fn override_paths_follow_naming_convention() {
        let path = ShaderLibrary::override_path(Path::new("assets/shaders"), ShaderId::Ssao);
        assert_eq!(path, Path::new("assets/shaders/renderer3d_ssao.wgsl"));
    }

    #[test]
    fn shadow_shaders_skip_frame_bindings() {
        let source = ShaderId::ShadowPoint.assemble("// body");
        assert!(source.starts_with(COMMON));
        assert!(!source.contains(FRAME));
        assert!(source.ends_with("// body"));
    }

    #[test]
    fn hot_shader_detects_modification() {
        let dir = std::env::temp_dir().join(format!("phalanx-hot-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("renderer3d_fxaa.wgsl");
        fs::write(&path, "// one").unwrap();

        let mut shader = HotShader::new(&path).unwrap();
        assert!(!shader.check_reload());

        // Push the mtime forward explicitly, filesystems may have coarse timestamps
        fs::write(&path, "// two").unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(shader.check_reload());
        assert_eq!(shader.source(), "// two");
        fs::remove_dir_all(&dir).unwrap();
    }
}
