//! Per-frame scene submission.
//!
//! Between `begin_scene` and `render_scene`, scene code registers everything it wants
//! drawn: models, the directional light, point lights, a sky light and fog volumes.
//! [`FrameSubmission`] collects them on the CPU only. Nothing reaches the GPU until the
//! renderer uploads the collected lists at the top of `render_scene`.
//!
//! # Capacity policy
//!
//! Every submit returns a [`SubmitOutcome`] so overflow is observable instead of silent:
//!
//! - the first directional light and the first sky light of a frame win, later ones are
//!   [`SubmitOutcome::Ignored`]
//! - point lights receive shadow slots in submission order until `max_shadowed_lights`
//!   are taken, after which they are [`SubmitOutcome::Unshadowed`]
//! - point lights beyond the light buffer capacity, and fog volumes beyond
//!   [`MAX_VOLUMES`], are [`SubmitOutcome::Dropped`]
//!
//! [`FrameSubmission::end_frame`] empties the draw and light lists and resets the shadow
//! slot counter. That call is the frame boundary.

use std::sync::Arc;

use glam::{EulerRot, Mat4, Vec3};

use crate::buffers::{LightingData, MAX_VOLUMES, PointLightData, VolumeData, VolumetricData};
use crate::material::Material;
use crate::mesh::{Animator, Model};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    /// Influence radius in world units.
    pub radius: f32,
    pub casts_shadows: bool,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            casts_shadows: true,
        }
    }
}

/// Accepted by the submission API but not lit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    /// Inner and outer cone angles in degrees.
    pub cut_off: f32,
    pub outer_cut_off: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            cut_off: 12.5,
            outer_cut_off: 15.0,
        }
    }
}

/// A box of participating media (fog).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    /// Fade the fog toward the box edges instead of a hard boundary.
    pub blend: bool,
    pub scattering_distribution: f32,
    pub scattering_intensity: f32,
    pub extinction_scale: f32,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            blend: false,
            scattering_distribution: 0.5,
            scattering_intensity: 1.0,
            extinction_scale: 0.5,
        }
    }
}

/// Result of one submit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// A point light that owns shadow cube `index`.
    Shadowed(u32),
    /// A point light that was accepted without a shadow slot.
    Unshadowed,
    /// A singleton (directional or sky light) was already submitted, or no scene is open.
    Ignored,
    /// Capacity exhausted, the submission has no effect this frame.
    Dropped,
}

impl SubmitOutcome {
    /// `true` if the submission affects the frame.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            SubmitOutcome::Accepted | SubmitOutcome::Shadowed(_) | SubmitOutcome::Unshadowed
        )
    }
}

/// Per-frame counts of submissions that degraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverflowReport {
    pub point_lights_dropped: u32,
    /// Shadow-casting point lights that found every shadow slot taken.
    pub unshadowed_casters: u32,
    pub volumes_dropped: u32,
    pub directional_lights_ignored: u32,
    pub sky_lights_ignored: u32,
}

impl OverflowReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One entry of the draw list.
#[derive(Clone)]
pub struct ModelSubmission {
    pub transform: Mat4,
    pub model: Arc<Model>,
    /// Per-mesh overrides. `None` (or a short list) falls back to the mesh's own material.
    pub materials: Vec<Option<Arc<Material>>>,
    pub animator: Option<Arc<Animator>>,
    pub entity_id: i32,
    pub selected: bool,
}

/// The direction a directional light travels, from the Euler rotation of its transform.
///
/// An identity rotation points down +X. A -90° rotation about Z points straight down.
pub fn direction_from_transform(transform: Mat4) -> Vec3 {
    let (_, rotation, _) = transform.to_scale_rotation_translation();
    let (z, y, _x) = rotation.to_euler(EulerRot::ZYX);
    Vec3::new(z.cos() * y.cos(), z.sin() * y.cos(), -y.sin())
}

/// Everything submitted for the frame being recorded.
pub struct FrameSubmission {
    max_shadowed_lights: u32,
    max_point_lights: usize,
    recording: bool,
    draw_list: Vec<ModelSubmission>,
    lights: Vec<PointLightData>,
    lighting: LightingData,
    volumes: VolumetricData,
    next_shadow_index: u32,
    overflow: OverflowReport,
}

impl FrameSubmission {
    pub fn new(max_shadowed_lights: u32, max_point_lights: u32) -> Self {
        Self {
            max_shadowed_lights,
            max_point_lights: max_point_lights as usize,
            recording: false,
            draw_list: Vec::new(),
            lights: Vec::new(),
            lighting: LightingData::default(),
            volumes: VolumetricData::default(),
            next_shadow_index: 0,
            overflow: OverflowReport::default(),
        }
    }

    /// Open a frame: reset the singleton flags and the volume count.
    pub fn begin(&mut self) {
        self.lighting = LightingData::default();
        self.volumes.count = 0;
        self.overflow = OverflowReport::default();
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn check_recording(&self, what: &str) -> bool {
        if !self.recording {
            log::warn!("{what} submitted outside begin_scene/render_scene, ignoring");
        }
        self.recording
    }

    pub fn submit_model(&mut self, submission: ModelSubmission) -> SubmitOutcome {
        if !self.check_recording("model") {
            return SubmitOutcome::Ignored;
        }
        self.draw_list.push(submission);
        SubmitOutcome::Accepted
    }

    pub fn submit_directional_light(
        &mut self,
        transform: Mat4,
        light: &DirectionalLight,
    ) -> SubmitOutcome {
        if !self.check_recording("directional light") {
            return SubmitOutcome::Ignored;
        }
        if self.lighting.using_directional_light != 0 {
            self.overflow.directional_lights_ignored += 1;
            return SubmitOutcome::Ignored;
        }

        let direction = direction_from_transform(transform);
        self.lighting.directional.direction = direction.extend(1.0).to_array();
        self.lighting.directional.color = light.color.to_array();
        self.lighting.directional.intensity = light.intensity;
        self.lighting.using_directional_light = 1;
        SubmitOutcome::Accepted
    }

    pub fn submit_point_light(&mut self, transform: Mat4, light: &PointLight) -> SubmitOutcome {
        if !self.check_recording("point light") {
            return SubmitOutcome::Ignored;
        }
        if self.lights.len() >= self.max_point_lights {
            self.overflow.point_lights_dropped += 1;
            return SubmitOutcome::Dropped;
        }

        let has_shadow_slot = self.next_shadow_index < self.max_shadowed_lights;
        let shadow_index = if light.casts_shadows && has_shadow_slot {
            let index = self.next_shadow_index;
            self.next_shadow_index += 1;
            Some(index)
        } else {
            if light.casts_shadows {
                self.overflow.unshadowed_casters += 1;
            }
            None
        };

        self.lights.push(PointLightData {
            position: transform.w_axis.truncate().extend(1.0).to_array(),
            color: light.color.extend(1.0).to_array(),
            enabled: 1,
            intensity: light.intensity,
            range: light.radius,
            shadow_index: shadow_index.map_or(-1, |i| i as i32),
        });

        match shadow_index {
            Some(index) => SubmitOutcome::Shadowed(index),
            None => SubmitOutcome::Unshadowed,
        }
    }

    pub fn submit_spot_light(&mut self, _transform: Mat4, _light: &SpotLight) -> SubmitOutcome {
        if !self.check_recording("spot light") {
            return SubmitOutcome::Ignored;
        }
        SubmitOutcome::Accepted
    }

    /// Take the frame's sky light slot. Only the first caller gets `Accepted`.
    pub fn claim_sky_light(&mut self) -> SubmitOutcome {
        if !self.check_recording("sky light") {
            return SubmitOutcome::Ignored;
        }
        if self.lighting.using_sky_light != 0 {
            self.overflow.sky_lights_ignored += 1;
            return SubmitOutcome::Ignored;
        }
        self.lighting.using_sky_light = 1;
        SubmitOutcome::Accepted
    }

    /// Add a fog volume: a unit box scaled by `scale` and moved to `translation`.
    pub fn submit_volume(
        &mut self,
        translation: Vec3,
        scale: Vec3,
        volume: &Volume,
    ) -> SubmitOutcome {
        if !self.check_recording("volume") {
            return SubmitOutcome::Ignored;
        }
        let count = self.volumes.count as usize;
        if count >= MAX_VOLUMES {
            self.overflow.volumes_dropped += 1;
            return SubmitOutcome::Dropped;
        }

        self.volumes.volumes[count] = VolumeData {
            min: (Vec3::splat(-0.5) * scale + translation).to_array(),
            blend: volume.blend as u32 as f32,
            max: (Vec3::splat(0.5) * scale + translation).to_array(),
            scattering_distribution: volume.scattering_distribution,
            scattering_intensity: volume.scattering_intensity,
            extinction_scale: volume.extinction_scale,
            _pad: [0.0; 2],
        };
        self.volumes.count += 1;
        SubmitOutcome::Accepted
    }

    /// Close the frame: empty the lists, reset shadow slots, and return the overflow
    /// counts for the frame that just ended.
    pub fn end_frame(&mut self) -> OverflowReport {
        let report = self.overflow;
        if !report.is_empty() {
            log::warn!("frame submission overflow: {report:?}");
        }
        self.draw_list.clear();
        self.lights.clear();
        self.next_shadow_index = 0;
        self.recording = false;
        report
    }

    pub fn draw_list(&self) -> &[ModelSubmission] {
        &self.draw_list
    }

    pub fn lights(&self) -> &[PointLightData] {
        &self.lights
    }

    /// Lights that own a shadow cube, with their slot index.
    pub fn shadowed_lights(&self) -> impl Iterator<Item = (u32, &PointLightData)> {
        self.lights
            .iter()
            .filter(|l| l.shadow_index >= 0)
            .map(|l| (l.shadow_index as u32, l))
    }

    pub fn lighting(&self) -> &LightingData {
        &self.lighting
    }

    pub fn lighting_mut(&mut self) -> &mut LightingData {
        &mut self.lighting
    }

    pub fn volumes(&self) -> &VolumetricData {
        &self.volumes
    }

    pub fn next_shadow_index(&self) -> u32 {
        self.next_shadow_index
    }

    pub fn max_shadowed_lights(&self) -> u32 {
        self.max_shadowed_lights
    }

    pub fn overflow(&self) -> OverflowReport {
        self.overflow
    }

    pub fn has_directional_light(&self) -> bool {
        self.lighting.using_directional_light != 0
    }

    pub fn has_sky_light(&self) -> bool {
        self.lighting.using_sky_light != 0
    }

    pub fn any_selected(&self) -> bool {
        self.draw_list.iter().any(|m| m.selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn recording() -> FrameSubmission {
        let mut frame = FrameSubmission::new(10, 4096);
        frame.begin();
        frame
    }

    fn at(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, y, z))
    }

    #[test]
    fn shadow_slots_run_out_after_ten() {
        let mut frame = recording();
        for i in 0..10 {
            assert_eq!(
                frame.submit_point_light(at(i as f32, 0.0, 0.0), &PointLight::default()),
                SubmitOutcome::Shadowed(i)
            );
        }
        assert_eq!(
            frame.submit_point_light(at(0.0, 1.0, 0.0), &PointLight::default()),
            SubmitOutcome::Unshadowed
        );

        let indices: Vec<i32> = frame.lights().iter().map(|l| l.shadow_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, -1]);
        assert_eq!(frame.next_shadow_index(), 10);
        assert_eq!(frame.overflow().unshadowed_casters, 1);
    }

    #[test]
    fn non_casters_do_not_consume_slots() {
        let mut frame = recording();
        let plain = PointLight {
            casts_shadows: false,
            ..Default::default()
        };
        assert_eq!(frame.submit_point_light(Mat4::IDENTITY, &plain), SubmitOutcome::Unshadowed);
        assert_eq!(
            frame.submit_point_light(Mat4::IDENTITY, &PointLight::default()),
            SubmitOutcome::Shadowed(0)
        );
        assert_eq!(frame.overflow().unshadowed_casters, 0);
    }

    #[test]
    fn end_frame_empties_lists_and_resets_slots() {
        let mut frame = recording();
        for _ in 0..12 {
            frame.submit_point_light(Mat4::IDENTITY, &PointLight::default());
        }
        frame.end_frame();
        assert!(frame.lights().is_empty());
        assert!(frame.draw_list().is_empty());
        assert_eq!(frame.next_shadow_index(), 0);

        frame.begin();
        assert_eq!(
            frame.submit_point_light(Mat4::IDENTITY, &PointLight::default()),
            SubmitOutcome::Shadowed(0)
        );
    }

    #[test]
    fn first_directional_light_wins() {
        let mut frame = recording();
        let bright = DirectionalLight {
            intensity: 5.0,
            ..Default::default()
        };
        assert_eq!(
            frame.submit_directional_light(Mat4::IDENTITY, &bright),
            SubmitOutcome::Accepted
        );
        assert_eq!(
            frame.submit_directional_light(Mat4::IDENTITY, &DirectionalLight::default()),
            SubmitOutcome::Ignored
        );
        assert_eq!(frame.lighting().directional.intensity, 5.0);
        assert_eq!(frame.overflow().directional_lights_ignored, 1);

        // A new frame accepts a directional light again
        frame.end_frame();
        frame.begin();
        assert!(!frame.has_directional_light());
        assert!(frame.submit_directional_light(Mat4::IDENTITY, &bright).is_accepted());
    }

    #[test]
    fn only_one_sky_light_per_frame() {
        let mut frame = recording();
        assert_eq!(frame.claim_sky_light(), SubmitOutcome::Accepted);
        assert_eq!(frame.claim_sky_light(), SubmitOutcome::Ignored);
        assert!(frame.has_sky_light());
    }

    #[test]
    fn volumes_cap_at_thirty_two() {
        let mut frame = recording();
        for _ in 0..MAX_VOLUMES {
            assert!(frame.submit_volume(Vec3::ZERO, Vec3::ONE, &Volume::default()).is_accepted());
        }
        assert_eq!(
            frame.submit_volume(Vec3::ZERO, Vec3::ONE, &Volume::default()),
            SubmitOutcome::Dropped
        );
        assert_eq!(frame.volumes().count, MAX_VOLUMES as u32);
        assert_eq!(frame.overflow().volumes_dropped, 1);

        frame.begin();
        assert_eq!(frame.volumes().count, 0);
    }

    #[test]
    fn volume_box_spans_scaled_unit_cube() {
        let mut frame = recording();
        let (translation, scale) = (Vec3::new(10.0, 0.0, 0.0), Vec3::new(2.0, 4.0, 6.0));
        frame.submit_volume(translation, scale, &Volume::default());
        let v = frame.volumes().volumes[0];
        assert_eq!(v.min, [9.0, -2.0, -3.0]);
        assert_eq!(v.max, [11.0, 2.0, 3.0]);
        assert_eq!(v.scattering_distribution, 0.5);
    }

    #[test]
    fn light_buffer_capacity_drops_excess() {
        let mut frame = FrameSubmission::new(10, 2);
        frame.begin();
        frame.submit_point_light(Mat4::IDENTITY, &PointLight::default());
        frame.submit_point_light(Mat4::IDENTITY, &PointLight::default());
        assert_eq!(
            frame.submit_point_light(Mat4::IDENTITY, &PointLight::default()),
            SubmitOutcome::Dropped
        );
        assert_eq!(frame.lights().len(), 2);
        assert_eq!(frame.overflow().point_lights_dropped, 1);
    }

    #[test]
    fn submissions_outside_a_scene_are_ignored() {
        let mut frame = FrameSubmission::new(10, 16);
        assert_eq!(
            frame.submit_point_light(Mat4::IDENTITY, &PointLight::default()),
            SubmitOutcome::Ignored
        );
        assert!(frame.lights().is_empty());
    }

    #[test]
    fn point_light_takes_translation_and_radius() {
        let mut frame = recording();
        let light = PointLight {
            radius: 25.0,
            ..Default::default()
        };
        frame.submit_point_light(at(1.0, 2.0, 3.0), &light);
        let data = frame.lights()[0];
        assert_eq!(data.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(data.range, 25.0);
        assert_eq!(data.enabled, 1);
    }

    #[test]
    fn direction_follows_euler_rotation() {
        let identity = direction_from_transform(Mat4::IDENTITY);
        assert_relative_eq!(identity.x, 1.0, epsilon = 1e-6);

        let down = direction_from_transform(Mat4::from_rotation_z(-std::f32::consts::FRAC_PI_2));
        assert_relative_eq!(down.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(down.x, 0.0, epsilon = 1e-5);

        let pitched = direction_from_transform(Mat4::from_rotation_y(0.5));
        assert_relative_eq!(pitched.z, -(0.5f32).sin(), epsilon = 1e-5);
    }
}
