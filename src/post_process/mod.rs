//! Screen-space passes that run after the lighting resolve.
//!
//! [`fullscreen`] holds the shared fullscreen-triangle pass. [`chain`] owns the per-stage
//! targets and records passes in frame plan order. The multi-pass effects, [`bloom`] and
//! [`dof`], each own their intermediate buffers.

pub mod bloom;
pub mod chain;
pub mod dof;
pub mod fullscreen;
pub mod ssao;

pub use bloom::{BLOOM_LEVELS, Bloom};
pub use chain::{PostChain, PostTargets, PostTextures};
pub use dof::{BokehSprite, DepthOfField, MAX_BOKEH_COUNT};
pub use fullscreen::{FullscreenDesc, FullscreenPass, InputKind};
