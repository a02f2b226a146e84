//! Per-frame pass ordering.
//!
//! The visualization mode picks a [`RenderPath`] once per frame. [`FramePlan::build`] turns
//! that path, the enabled [`PassFlags`] and a few facts about the submitted scene into the
//! ordered list of passes `render_scene` executes. Passes that are disabled, or that have
//! nothing to do, are never scheduled, so they cost nothing and leave the previous output
//! untouched.
//!
//! ```
//! use phalanx::render_path::{FrameInputs, FramePlan, PassId, RenderPath, LitOutput};
//! use phalanx::PassFlags;
//!
//! let plan = FramePlan::build(&FrameInputs {
//!     path: RenderPath::Lit(LitOutput::Full),
//!     passes: PassFlags { bloom: true, ..Default::default() },
//!     has_directional_light: false,
//!     shadowed_point_lights: 0,
//!     any_selected: false,
//! });
//!
//! assert!(plan.contains(PassId::Bloom));
//! assert!(!plan.contains(PassId::CascadedShadows));
//! ```

use serde::{Deserialize, Serialize};

use crate::config::PassFlags;

/// What the editor viewport shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualizationMode {
    #[default]
    Rendered,
    Wireframe,
    /// Full lighting with white albedo.
    LightingOnly,
    /// Lit result before any post-processing.
    PrePostProcessing,
    Albedo,
    Depth,
    EntityId,
    Normal,
    Emissive,
    Roughness,
    Metallic,
    Specular,
    AmbientOcclusion,
}

impl VisualizationMode {
    pub const ALL: [VisualizationMode; 13] = [
        VisualizationMode::Rendered,
        VisualizationMode::Wireframe,
        VisualizationMode::LightingOnly,
        VisualizationMode::PrePostProcessing,
        VisualizationMode::Albedo,
        VisualizationMode::Depth,
        VisualizationMode::EntityId,
        VisualizationMode::Normal,
        VisualizationMode::Emissive,
        VisualizationMode::Roughness,
        VisualizationMode::Metallic,
        VisualizationMode::Specular,
        VisualizationMode::AmbientOcclusion,
    ];

    pub fn render_path(self) -> RenderPath {
        use VisualizationMode::*;
        match self {
            Rendered => RenderPath::Lit(LitOutput::Full),
            Wireframe => RenderPath::Wireframe,
            LightingOnly => RenderPath::Lit(LitOutput::LightingOnly),
            PrePostProcessing => RenderPath::Lit(LitOutput::PrePostProcessing),
            Albedo => RenderPath::GBufferChannel(GBufferChannel::Albedo),
            Depth => RenderPath::GBufferChannel(GBufferChannel::Depth),
            EntityId => RenderPath::GBufferChannel(GBufferChannel::EntityId),
            Normal => RenderPath::GBufferChannel(GBufferChannel::Normal),
            Emissive => RenderPath::GBufferChannel(GBufferChannel::Emissive),
            Roughness => RenderPath::GBufferChannel(GBufferChannel::Roughness),
            Metallic => RenderPath::GBufferChannel(GBufferChannel::Metallic),
            Specular => RenderPath::GBufferChannel(GBufferChannel::Specular),
            AmbientOcclusion => RenderPath::GBufferChannel(GBufferChannel::AmbientOcclusion),
        }
    }
}

/// A single G-buffer channel shown raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferChannel {
    Albedo,
    Depth,
    EntityId,
    Normal,
    Emissive,
    Roughness,
    Metallic,
    Specular,
    AmbientOcclusion,
}

impl GBufferChannel {
    /// Selector read by the buffer visualization shader.
    pub fn shader_index(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LitOutput {
    Full,
    LightingOnly,
    PrePostProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPath {
    Wireframe,
    Lit(LitOutput),
    GBufferChannel(GBufferChannel),
}

impl RenderPath {
    pub fn runs_post_chain(self) -> bool {
        matches!(
            self,
            RenderPath::Lit(LitOutput::Full) | RenderPath::Lit(LitOutput::LightingOnly)
        )
    }
}

/// Intermediate targets owned by the renderer, one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferKind {
    DeferredLighting,
    BloomBright,
    Ssao,
    PreviousFrame,
    Ssr,
    MotionBlur,
    DepthOfField,
    Bloom,
    LensDistortion,
    Fxaa,
    /// Depth mask of the selected models.
    Outline,
    CloudSky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    UploadFrameData,
    PointShadows,
    CascadedShadows,
    PreDepth,
    GBuffer,
    /// Cluster AABB rebuild (on a projection change) and the light cull.
    LightCulling,
    DeferredLighting,
    BufferVisualization,
    Wireframe,
    BloomIsolate,
    Ssao,
    CopyPreviousFrame,
    Ssr,
    MotionBlur,
    DepthOfField,
    /// Bokeh sprites drawn over the depth of field output.
    Bokeh,
    Bloom,
    LensDistortion,
    Fxaa,
    /// Tonemap, gamma, grain and vignette into the active color.
    FinalCompositeFx,
    /// Gamma only, for the unprocessed views.
    FinalComposite,
    OutlineFxaa,
    Outline,
}

impl PassId {
    /// The stage a pass writes, for passes that become the next pass's input.
    pub fn output(self) -> Option<FramebufferKind> {
        match self {
            PassId::DeferredLighting | PassId::BufferVisualization => {
                Some(FramebufferKind::DeferredLighting)
            }
            PassId::Ssao => Some(FramebufferKind::Ssao),
            PassId::Ssr => Some(FramebufferKind::Ssr),
            PassId::MotionBlur => Some(FramebufferKind::MotionBlur),
            PassId::DepthOfField => Some(FramebufferKind::DepthOfField),
            PassId::Bloom => Some(FramebufferKind::Bloom),
            PassId::LensDistortion => Some(FramebufferKind::LensDistortion),
            PassId::Fxaa => Some(FramebufferKind::Fxaa),
            _ => None,
        }
    }
}

/// Scene facts the plan depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub path: RenderPath,
    pub passes: PassFlags,
    pub has_directional_light: bool,
    pub shadowed_point_lights: u32,
    pub any_selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    path: RenderPath,
    passes: Vec<PassId>,
}

impl FramePlan {
    pub fn build(inputs: &FrameInputs) -> Self {
        let mut passes = vec![PassId::UploadFrameData];

        match inputs.path {
            RenderPath::Wireframe => {
                passes.push(PassId::Wireframe);
                return Self {
                    path: inputs.path,
                    passes,
                };
            }
            RenderPath::Lit(output) => {
                if inputs.shadowed_point_lights > 0 {
                    passes.push(PassId::PointShadows);
                }
                if inputs.has_directional_light {
                    passes.push(PassId::CascadedShadows);
                }
                passes.extend([
                    PassId::PreDepth,
                    PassId::GBuffer,
                    PassId::LightCulling,
                    PassId::DeferredLighting,
                ]);

                if output == LitOutput::PrePostProcessing {
                    passes.push(PassId::FinalComposite);
                } else {
                    Self::push_post_chain(&mut passes, &inputs.passes);
                    passes.push(PassId::FinalCompositeFx);
                }
            }
            RenderPath::GBufferChannel(_) => {
                passes.extend([
                    PassId::PreDepth,
                    PassId::GBuffer,
                    PassId::BufferVisualization,
                    PassId::FinalComposite,
                ]);
            }
        }

        if inputs.any_selected {
            passes.extend([PassId::OutlineFxaa, PassId::Outline]);
        }

        Self {
            path: inputs.path,
            passes,
        }
    }

    fn push_post_chain(passes: &mut Vec<PassId>, flags: &PassFlags) {
        let steps = [
            (flags.bloom, PassId::BloomIsolate),
            (flags.ssao, PassId::Ssao),
            (flags.ssr, PassId::CopyPreviousFrame),
            (flags.ssr, PassId::Ssr),
            (flags.motion_blur, PassId::MotionBlur),
            (flags.dof, PassId::DepthOfField),
            (flags.dof, PassId::Bokeh),
            (flags.bloom, PassId::Bloom),
            (flags.lens_distortion, PassId::LensDistortion),
            (flags.fxaa, PassId::Fxaa),
        ];
        passes.extend(steps.iter().filter(|(on, _)| *on).map(|(_, id)| *id));
    }

    pub fn path(&self) -> RenderPath {
        self.path
    }

    pub fn passes(&self) -> &[PassId] {
        &self.passes
    }

    pub fn contains(&self, pass: PassId) -> bool {
        self.passes.contains(&pass)
    }

    /// Input stage of the pass at `index`: the output of the last earlier pass that has one.
    pub fn input_of(&self, index: usize) -> FramebufferKind {
        self.passes[..index.min(self.passes.len())]
            .iter()
            .rev()
            .find_map(|p| p.output())
            .unwrap_or(FramebufferKind::DeferredLighting)
    }

    /// The stage the final composite reads.
    pub fn final_source(&self) -> FramebufferKind {
        self.input_of(self.passes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(path: RenderPath, passes: PassFlags) -> FrameInputs {
        FrameInputs {
            path,
            passes,
            has_directional_light: true,
            shadowed_point_lights: 2,
            any_selected: false,
        }
    }

    fn rendered(passes: PassFlags) -> FramePlan {
        FramePlan::build(&inputs(RenderPath::Lit(LitOutput::Full), passes))
    }

    #[test]
    fn full_chain_runs_in_order() {
        let plan = rendered(PassFlags::all());
        assert_eq!(
            plan.passes(),
            &[
                PassId::UploadFrameData,
                PassId::PointShadows,
                PassId::CascadedShadows,
                PassId::PreDepth,
                PassId::GBuffer,
                PassId::LightCulling,
                PassId::DeferredLighting,
                PassId::BloomIsolate,
                PassId::Ssao,
                PassId::CopyPreviousFrame,
                PassId::Ssr,
                PassId::MotionBlur,
                PassId::DepthOfField,
                PassId::Bokeh,
                PassId::Bloom,
                PassId::LensDistortion,
                PassId::Fxaa,
                PassId::FinalCompositeFx,
            ]
        );
        assert_eq!(plan.final_source(), FramebufferKind::Fxaa);
    }

    #[test]
    fn disabled_bloom_leaves_no_trace() {
        let never = rendered(PassFlags::default());
        let off = rendered(PassFlags {
            bloom: false,
            ..PassFlags::default()
        });
        assert_eq!(never, off);
        assert!(!off.contains(PassId::BloomIsolate));
        assert!(!off.contains(PassId::Bloom));
        assert_eq!(off.final_source(), FramebufferKind::DeferredLighting);
    }

    #[test]
    fn single_pass_feeds_composite() {
        let plan = rendered(PassFlags {
            bloom: true,
            ..PassFlags::default()
        });
        assert_eq!(plan.final_source(), FramebufferKind::Bloom);

        let bloom_isolate = plan
            .passes()
            .iter()
            .position(|p| *p == PassId::BloomIsolate)
            .unwrap_or_default();
        assert_eq!(plan.input_of(bloom_isolate), FramebufferKind::DeferredLighting);
    }

    #[test]
    fn inputs_follow_enabled_stages() {
        let plan = rendered(PassFlags {
            ssao: true,
            lens_distortion: true,
            ..PassFlags::default()
        });
        let lens = plan
            .passes()
            .iter()
            .position(|p| *p == PassId::LensDistortion)
            .unwrap_or_default();
        assert_eq!(plan.input_of(lens), FramebufferKind::Ssao);
        assert_eq!(plan.final_source(), FramebufferKind::LensDistortion);
    }

    #[test]
    fn pre_post_processing_skips_the_chain() {
        let plan = FramePlan::build(&inputs(
            RenderPath::Lit(LitOutput::PrePostProcessing),
            PassFlags::all(),
        ));
        assert!(!plan.contains(PassId::Bloom));
        assert!(!plan.contains(PassId::FinalCompositeFx));
        assert_eq!(plan.passes().last(), Some(&PassId::FinalComposite));
        assert_eq!(plan.final_source(), FramebufferKind::DeferredLighting);
    }

    #[test]
    fn lighting_only_keeps_the_chain() {
        let plan = FramePlan::build(&inputs(
            RenderPath::Lit(LitOutput::LightingOnly),
            PassFlags::all(),
        ));
        assert!(plan.contains(PassId::Bloom));
        assert!(plan.contains(PassId::FinalCompositeFx));
    }

    #[test]
    fn channel_views_visualize_instead_of_lighting() {
        let plan = FramePlan::build(&inputs(
            VisualizationMode::Normal.render_path(),
            PassFlags::all(),
        ));
        assert!(plan.contains(PassId::BufferVisualization));
        assert!(!plan.contains(PassId::DeferredLighting));
        assert!(!plan.contains(PassId::CascadedShadows));
        assert!(!plan.contains(PassId::LightCulling));
    }

    #[test]
    fn wireframe_replaces_everything() {
        let mut wire = inputs(RenderPath::Wireframe, PassFlags::all());
        wire.any_selected = true;
        let plan = FramePlan::build(&wire);
        assert_eq!(plan.passes(), &[PassId::UploadFrameData, PassId::Wireframe]);
    }

    #[test]
    fn shadows_only_when_there_is_something_to_shadow() {
        let mut lit = inputs(RenderPath::Lit(LitOutput::Full), PassFlags::default());
        lit.has_directional_light = false;
        lit.shadowed_point_lights = 0;
        let plan = FramePlan::build(&lit);
        assert!(!plan.contains(PassId::PointShadows));
        assert!(!plan.contains(PassId::CascadedShadows));
    }

    #[test]
    fn outline_follows_selection() {
        let mut lit = inputs(RenderPath::Lit(LitOutput::Full), PassFlags::default());
        lit.any_selected = true;
        let plan = FramePlan::build(&lit);
        assert_eq!(
            &plan.passes()[plan.passes().len() - 3..],
            &[PassId::FinalCompositeFx, PassId::OutlineFxaa, PassId::Outline]
        );
    }

    #[test]
    fn every_mode_maps_to_a_path() {
        let channels = VisualizationMode::ALL
            .iter()
            .filter(|m| matches!(m.render_path(), RenderPath::GBufferChannel(_)))
            .count();
        assert_eq!(channels, 9);
        assert!(VisualizationMode::Rendered.render_path().runs_post_chain());
        assert!(!VisualizationMode::PrePostProcessing.render_path().runs_post_chain());
    }
}
