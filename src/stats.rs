/// Counters accumulated across frames until [`reset`](Statistics::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Model draws in the pre-depth, G-buffer and wireframe passes.
    pub draw_calls: u32,
    /// Model draws into cascades and point light cube faces.
    pub shadow_draw_calls: u32,
    pub passes_executed: u32,
    pub cluster_builds: u32,
    /// IBL bakes triggered by sky light submissions.
    pub sky_regenerations: u32,
    pub frames: u32,
}

impl Statistics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
