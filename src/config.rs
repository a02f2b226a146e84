//! Renderer configuration.
//!
//! [`RendererConfig`] gathers every tunable that is fixed at construction time (resource
//! sizes, shader locations) together with the initial state of the runtime toggles
//! ([`PassFlags`], [`PostProcessSettings`]) that the editor flips afterwards.
//!
//! Configs can be built in code with the `with_*` builders or loaded from TOML:
//!
//! ```
//! use phalanx::RendererConfig;
//!
//! let config = RendererConfig::from_toml_str(r#"
//!     shadow_map_resolution = 2048
//!
//!     [passes]
//!     bloom = true
//!     fxaa = true
//! "#).unwrap();
//!
//! assert_eq!(config.shadow_map_resolution, 2048);
//! assert!(config.passes.bloom);
//! assert!(!config.passes.ssr);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RenderResult, RendererError};

/// Independent enable flags for each optional post-processing pass.
///
/// All passes are off by default. A disabled pass costs nothing: it is left out of the
/// frame plan entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassFlags {
    pub ssao: bool,
    pub ssr: bool,
    pub motion_blur: bool,
    pub dof: bool,
    pub bloom: bool,
    pub lens_distortion: bool,
    pub fxaa: bool,
}

impl PassFlags {
    /// Every optional pass enabled.
    pub fn all() -> Self {
        Self {
            ssao: true,
            ssr: true,
            motion_blur: true,
            dof: true,
            bloom: true,
            lens_distortion: true,
            fxaa: true,
        }
    }
}

/// Artist-facing post-processing tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    pub gamma: f32,
    pub lens_distortion: f32,
    pub aberration_amount: f32,
    pub grain_amount: f32,
    pub vignette_intensity: f32,
    pub vignette_power: f32,
    pub focus_near_start: f32,
    pub focus_near_end: f32,
    pub focus_far_start: f32,
    pub focus_far_end: f32,
    pub focus_scale: f32,
    pub bokeh_threshold: f32,
    pub bokeh_size: f32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            lens_distortion: 0.05,
            aberration_amount: 0.01,
            grain_amount: 0.25,
            vignette_intensity: 15.0,
            vignette_power: 0.25,
            focus_near_start: 0.0,
            focus_near_end: 0.0,
            focus_far_start: 0.0,
            focus_far_end: 0.0,
            focus_scale: 0.0,
            bokeh_threshold: 0.5,
            bokeh_size: 1.0,
        }
    }
}

/// Construction-time configuration for a [`SceneRenderer`](crate::SceneRenderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Directory searched for `renderer3d_<name>.wgsl` overrides.
    pub shader_dir: PathBuf,
    /// Recompile shaders whose files changed at the top of every `render_scene`.
    pub hot_reload: bool,
    /// Size the persistent framebuffers start at before the first `resize`.
    pub initial_width: u32,
    pub initial_height: u32,
    /// Edge length of each cascaded shadow map layer.
    pub shadow_map_resolution: u32,
    /// Edge length of each point light cube face.
    pub point_shadow_resolution: u32,
    /// Point lights that may own a shadow cube per frame.
    pub max_shadowed_lights: u32,
    /// Capacity of the point light storage buffer.
    pub max_point_lights: u32,
    pub passes: PassFlags,
    pub post: PostProcessSettings,
    /// Optional dirt mask blended into the bloom composite. Generated when absent.
    pub bloom_dirt_texture: Option<PathBuf>,
    /// Optional bokeh sprite shape. A hexagon is generated when absent.
    pub bokeh_shape_texture: Option<PathBuf>,
    /// Optional noise texture for the procedural cloud sky. Generated when absent.
    pub cloud_noise_texture: Option<PathBuf>,
    /// Seed for the SSAO kernel and generated noise textures.
    pub ssao_seed: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("assets/shaders"),
            hot_reload: false,
            initial_width: 1920,
            initial_height: 1080,
            shadow_map_resolution: 4096,
            point_shadow_resolution: 1024,
            max_shadowed_lights: 10,
            max_point_lights: 4096,
            passes: PassFlags::default(),
            post: PostProcessSettings::default(),
            bloom_dirt_texture: None,
            bokeh_shape_texture: None,
            cloud_noise_texture: None,
            ssao_seed: 0,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn with_initial_size(mut self, width: u32, height: u32) -> Self {
        self.initial_width = width;
        self.initial_height = height;
        self
    }

    pub fn with_shadow_map_resolution(mut self, resolution: u32) -> Self {
        self.shadow_map_resolution = resolution;
        self
    }

    pub fn with_point_shadow_resolution(mut self, resolution: u32) -> Self {
        self.point_shadow_resolution = resolution;
        self
    }

    pub fn with_max_shadowed_lights(mut self, count: u32) -> Self {
        self.max_shadowed_lights = count;
        self
    }

    pub fn with_max_point_lights(mut self, count: u32) -> Self {
        self.max_point_lights = count;
        self
    }

    pub fn with_passes(mut self, passes: PassFlags) -> Self {
        self.passes = passes;
        self
    }

    pub fn with_post(mut self, post: PostProcessSettings) -> Self {
        self.post = post;
        self
    }

    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RendererError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that would produce invalid GPU resources.
    pub fn validate(&self) -> RenderResult<()> {
        for (name, value) in [
            ("shadow_map_resolution", self.shadow_map_resolution),
            ("point_shadow_resolution", self.point_shadow_resolution),
        ] {
            if value == 0 || !value.is_power_of_two() {
                return Err(RendererError::Config(format!(
                    "{name} must be a non-zero power of two, got {value}"
                )));
            }
        }
        if self.max_shadowed_lights == 0 {
            return Err(RendererError::Config(
                "max_shadowed_lights must be at least 1".into(),
            ));
        }
        if self.max_point_lights == 0 {
            return Err(RendererError::Config(
                "max_point_lights must be at least 1".into(),
            ));
        }
        if self.initial_width == 0 || self.initial_height == 0 {
            return Err(RendererError::Config(
                "initial framebuffer size must be non-zero".into(),
            ));
        }
        if self.post.gamma <= 0.0 {
            return Err(RendererError::Config(format!(
                "gamma must be positive, got {}",
                self.post.gamma
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tunables() {
        let config = RendererConfig::default();
        assert_eq!(config.shadow_map_resolution, 4096);
        assert_eq!(config.point_shadow_resolution, 1024);
        assert_eq!(config.max_shadowed_lights, 10);
        assert_eq!(config.passes, PassFlags::default());
        assert_eq!(config.post.gamma, 2.2);
        assert_eq!(config.post.vignette_intensity, 15.0);
        assert_eq!(config.post.bokeh_threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            hot_reload = true

            [post]
            gamma = 2.4
            "#,
        )
        .unwrap();

        assert!(config.hot_reload);
        assert_eq!(config.post.gamma, 2.4);
        assert_eq!(config.post.grain_amount, 0.25);
        assert_eq!(config.max_point_lights, 4096);
    }

    #[test]
    fn rejects_non_power_of_two_shadow_maps() {
        let err = RendererConfig::new()
            .with_shadow_map_resolution(1000)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RendererError::Config(_)));
    }

    #[test]
    fn rejects_zero_shadowed_lights() {
        assert!(RendererConfig::new()
            .with_max_shadowed_lights(0)
            .validate()
            .is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = RendererConfig::from_toml_str("shadow_map_resolution = \"big\"").unwrap_err();
        assert!(matches!(err, RendererError::ConfigParse(_)));
    }
}
