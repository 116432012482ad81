//! Drag Channels
//!
//! A scene carries a fixed number of drag channels. Each channel accumulates
//! a 3-component value from mouse drags, optionally clamped to a range. The
//! two rotation channels additionally compose a rotor from every applied
//! step, so the rotor always matches the value actually reached.
//!
//! Animated dragging keeps a momentum vector per channel that is added once
//! per frame and attenuated until it falls below a small threshold.

use std::collections::VecDeque;

use bitflags::bitflags;
use glam::{DMat4, DQuat, DVec2, DVec3};

use crate::settings::DragSettings;

/// Channel driving the second (inner) rotation.
pub const ROTATE2: usize = 0;
/// Channel driving the first (outer) rotation.
pub const ROTATE1: usize = 1;
pub const TRANSLATE: usize = 2;
pub const SCALE: usize = 3;

const ANIM_EPSILON: f64 = 1e-4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DragFlags: u8 {
        /// Mouse drags change this channel.
        const ENABLED      = 1 << 0;
        /// Steps are taken in the screen plane of the scene's frame.
        const SCREEN_PLANE = 1 << 1;
        /// Steps follow the projected basis axis closest to the mouse motion.
        const PROJ_DIR     = 1 << 2;
        /// Mouse steps feed the momentum vector instead of the value.
        const ANIMATED     = 1 << 3;
        /// The value is clamped to the channel range.
        const RANGE        = 1 << 4;
    }
}

/// Three axes a channel's components are expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragBasis {
    pub x: DVec3,
    pub y: DVec3,
    pub z: DVec3,
}

impl Default for DragBasis {
    fn default() -> Self {
        Self {
            x: DVec3::X,
            y: DVec3::Y,
            z: DVec3::Z,
        }
    }
}

impl DragBasis {
    #[inline]
    #[must_use]
    pub fn lin_comb(&self, a: f64, b: f64, c: f64) -> DVec3 {
        self.x * a + self.y * b + self.z * c
    }
}

/// How the scale channel value maps to scale factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleFunction {
    /// `1 + v`
    #[default]
    Linear,
    /// `exp(v)`
    Exp,
}

#[derive(Debug, Clone)]
pub struct DragChannel {
    value: DVec3,
    step: DVec3,
    factor: DVec3,
    range: (DVec3, DVec3),
    basis: DragBasis,
    rotor: DQuat,
    flags: DragFlags,
    anim: DVec3,
    anim_active: bool,
    attenuation: DVec3,
}

impl Default for DragChannel {
    fn default() -> Self {
        Self {
            value: DVec3::ZERO,
            step: DVec3::ZERO,
            factor: DVec3::ONE,
            range: (DVec3::ZERO, DVec3::ZERO),
            basis: DragBasis::default(),
            rotor: DQuat::IDENTITY,
            flags: DragFlags::empty(),
            anim: DVec3::ZERO,
            anim_active: false,
            attenuation: DVec3::splat(0.9),
        }
    }
}

impl DragChannel {
    #[inline]
    #[must_use]
    pub fn value(&self) -> DVec3 {
        self.value
    }

    /// Last applied change of the value.
    #[inline]
    #[must_use]
    pub fn step(&self) -> DVec3 {
        self.step
    }

    #[inline]
    #[must_use]
    pub fn rotor(&self) -> DQuat {
        self.rotor
    }

    #[inline]
    #[must_use]
    pub fn basis(&self) -> DragBasis {
        self.basis
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> DragFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn factor(&self) -> DVec3 {
        self.factor
    }

    #[must_use]
    pub fn is_anim_active(&self) -> bool {
        self.anim_active
    }

    fn clamp(&mut self) {
        if self.flags.contains(DragFlags::RANGE) {
            let (min, max) = self.range;
            self.value = self.value.max(min).min(max);
        }
    }
}

/// Gaussian-weighted moving average of recent mouse steps.
///
/// Weights depend on the age of each sample, so the smoothing window stays
/// the same length in seconds at any frame rate.
#[derive(Debug, Clone)]
pub struct MouseSmoother {
    samples: VecDeque<(DVec2, f64)>,
    queue_len: usize,
    sigma: f64,
}

impl MouseSmoother {
    #[must_use]
    pub fn new(queue_len: usize, sigma: f64) -> Self {
        Self {
            samples: VecDeque::with_capacity(queue_len + 1),
            queue_len: queue_len.max(1),
            sigma,
        }
    }

    /// Adds a sample taken at `time` seconds and returns the smoothed step.
    pub fn smooth(&mut self, step: DVec2, time: f64) -> DVec2 {
        self.samples.push_front((step, time));
        self.samples.truncate(self.queue_len);

        let var = self.sigma * self.sigma;
        let mut sum = step;
        let mut weight_sum = 1.0;
        for &(past, t) in self.samples.iter().skip(1) {
            let dt = time - t;
            let weight = if var > 0.0 { (-0.5 * dt * dt / var).exp() } else { 0.0 };
            weight_sum += weight;
            sum += past * weight;
        }
        sum / weight_sum
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Which drag channels a scene applies to its own frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoTransform {
    pub translate: bool,
    pub rotate1: bool,
    pub rotate2: bool,
    pub scale: bool,
    /// Scales pixel transfers by the x and y scale factors.
    pub pixel_zoom: bool,
    /// Scales after the rotations and translation instead of before, so the
    /// scale is centered on the translated origin.
    pub scale_about_local_origin: bool,
    /// Scales after the rotations and translation, keeping the point under
    /// the mouse at the start of a scale drag in place.
    pub scale_about_mouse_origin: bool,
}

impl AutoTransform {
    #[must_use]
    pub fn any(&self) -> bool {
        self.translate || self.rotate1 || self.rotate2 || self.scale || self.pixel_zoom
    }

    /// True if scaling comes last in the auto transform.
    #[must_use]
    pub fn scales_last(&self) -> bool {
        self.scale_about_local_origin || self.scale_about_mouse_origin
    }
}

/// The drag channels of one scene.
#[derive(Debug, Clone)]
pub struct DragChannels {
    channels: Vec<DragChannel>,
    smoother: MouseSmoother,
    smooth_mouse: bool,
    scale_function: ScaleFunction,
    auto: AutoTransform,
    /// Local point kept in place while scaling about the mouse origin.
    scale_origin: DVec3,
    scale_offset: DVec3,
}

impl Default for DragChannels {
    fn default() -> Self {
        Self::new(&DragSettings::default())
    }
}

impl DragChannels {
    #[must_use]
    pub fn new(settings: &DragSettings) -> Self {
        Self {
            // The four well-known channels always exist.
            channels: vec![DragChannel::default(); settings.channel_count.max(SCALE + 1)],
            smoother: MouseSmoother::new(settings.smooth_queue_len, settings.smooth_time),
            smooth_mouse: settings.smooth_mouse,
            scale_function: ScaleFunction::default(),
            auto: AutoTransform::default(),
            scale_origin: DVec3::ZERO,
            scale_offset: DVec3::ZERO,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn channel(&self, idx: usize) -> Option<&DragChannel> {
        self.channels.get(idx)
    }

    fn set_flag(&mut self, idx: usize, flag: DragFlags, value: bool) {
        if let Some(ch) = self.channels.get_mut(idx) {
            ch.flags.set(flag, value);
        }
    }

    pub fn enable(&mut self, idx: usize, value: bool) {
        self.set_flag(idx, DragFlags::ENABLED, value);
    }

    pub fn enable_screen_plane(&mut self, idx: usize, value: bool) {
        self.set_flag(idx, DragFlags::SCREEN_PLANE, value);
    }

    pub fn enable_proj_dir(&mut self, idx: usize, value: bool) {
        self.set_flag(idx, DragFlags::PROJ_DIR, value);
    }

    pub fn enable_range(&mut self, idx: usize, value: bool) {
        self.set_flag(idx, DragFlags::RANGE, value);
    }

    /// Switching animation on or off drops any pending momentum.
    pub fn enable_anim(&mut self, idx: usize, value: bool) {
        if let Some(ch) = self.channels.get_mut(idx) {
            if ch.flags.contains(DragFlags::ANIMATED) != value {
                ch.anim_active = false;
                ch.anim = DVec3::ZERO;
            }
            ch.flags.set(DragFlags::ANIMATED, value);
        }
    }

    pub fn set_smooth_mouse(&mut self, value: bool) {
        self.smooth_mouse = value;
        self.smoother.clear();
    }

    pub fn set_scale_function(&mut self, function: ScaleFunction) {
        self.scale_function = function;
    }

    #[inline]
    #[must_use]
    pub fn auto_transform(&self) -> AutoTransform {
        self.auto
    }

    pub fn set_auto_transform(&mut self, auto: AutoTransform) {
        self.auto = auto;
    }

    /// Sets the local point that stays fixed while scaling about the mouse
    /// origin.
    pub fn set_scale_origin(&mut self, origin: DVec3) {
        self.scale_origin = origin;
    }

    #[must_use]
    pub fn scale_offset(&self) -> DVec3 {
        self.scale_offset
    }

    pub fn set_range(&mut self, idx: usize, min: DVec3, max: DVec3) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.range = (min.min(max), max.max(min));
        true
    }

    pub fn set_factor(&mut self, idx: usize, factor: DVec3) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.factor = factor;
        true
    }

    pub fn set_basis(&mut self, idx: usize, basis: DragBasis) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.basis = basis;
        true
    }

    pub fn set_attenuation(&mut self, idx: usize, attenuation: DVec3) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.attenuation = attenuation;
        true
    }

    /// Adds `delta` (scaled by the channel factor) to a channel.
    ///
    /// With a range the stored step is the change actually applied after
    /// clamping, and rotation channels compose their rotor from that step.
    ///
    /// While scaling about the local origin, translation steps are taken in
    /// scaled units. While scaling about the mouse origin, scale steps move
    /// the frame so the scale origin keeps its place.
    pub fn add(&mut self, idx: usize, delta: DVec3) -> bool {
        if idx >= self.channels.len() {
            return false;
        }
        let mut delta = delta;
        let auto = self.auto;
        if idx == TRANSLATE && auto.scale && auto.translate && auto.scale_about_local_origin {
            self.scale_offset = DVec3::ZERO;
            let scale = self.auto_scale();
            let at_least = |c: f64| if c.abs() > 1e-6 { c } else { 1e-6 };
            delta *= DVec3::new(at_least(scale.x), at_least(scale.y), at_least(scale.z));
        }
        let old_scale = (idx == SCALE).then(|| self.auto_scale());

        let ch = &mut self.channels[idx];
        let delta = delta * ch.factor;
        let old = ch.value;
        ch.step = delta;
        ch.value += delta;
        if ch.flags.contains(DragFlags::RANGE) {
            ch.clamp();
            ch.step = ch.value - old;
        }

        if idx == ROTATE1 || idx == ROTATE2 {
            let s = ch.step;
            let axis = ch.basis.lin_comb(s.z, s.x, s.y);
            let angle = s.length();
            if let Some(axis) = axis.try_normalize() {
                ch.rotor = (DQuat::from_axis_angle(axis, angle) * ch.rotor).normalize();
            }
        }

        if let Some(old_scale) = old_scale {
            if auto.scale_about_mouse_origin && (auto.scale || auto.pixel_zoom) {
                self.scale_offset += self.scale_origin * (old_scale - self.auto_scale());
            }
        }
        true
    }

    /// Sets a channel value. Rotation channels get an absolute rotor with
    /// the value's magnitude taken as degrees.
    pub fn set(&mut self, idx: usize, value: DVec3) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.value = value;
        ch.step = DVec3::ZERO;
        ch.clamp();

        if idx == ROTATE1 || idx == ROTATE2 {
            let v = ch.value;
            let axis = ch.basis.lin_comb(v.z, v.x, v.y);
            ch.rotor = axis
                .try_normalize()
                .map_or(DQuat::IDENTITY, |axis| DQuat::from_axis_angle(axis, v.length().to_radians()));
        }
        true
    }

    /// Zeroes every value, step and rotor.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.value = DVec3::ZERO;
            ch.step = DVec3::ZERO;
            ch.rotor = DQuat::IDENTITY;
        }
        self.scale_offset = DVec3::ZERO;
    }

    pub fn reset_anim(&mut self, idx: usize) {
        if let Some(ch) = self.channels.get_mut(idx) {
            ch.anim_active = false;
            ch.anim = DVec3::ZERO;
        }
    }

    /// Blends `delta` into the channel's momentum and activates it.
    pub fn add_to_anim(&mut self, idx: usize, delta: DVec3) -> bool {
        let Some(ch) = self.channels.get_mut(idx) else {
            return false;
        };
        ch.anim = 0.2 * ch.anim + 0.8 * delta;
        ch.anim_active = true;
        true
    }

    /// Applies one frame of momentum to every animated channel. Returns true
    /// if any channel was animated this frame.
    pub fn step_anim(&mut self) -> bool {
        let mut animated = false;
        for idx in 0..self.channels.len() {
            let ch = &self.channels[idx];
            if !ch.flags.contains(DragFlags::ANIMATED) || !ch.anim_active {
                continue;
            }
            animated = true;
            let anim = ch.anim;
            self.add(idx, anim);

            let ch = &mut self.channels[idx];
            ch.anim = anim * ch.attenuation;
            if ch.anim.abs().max_element() < ANIM_EPSILON {
                ch.anim = DVec3::ZERO;
                ch.anim_active = false;
            }
        }
        animated
    }

    /// Scale factors derived from the scale channel.
    #[must_use]
    pub fn auto_scale(&self) -> DVec3 {
        let ch = &self.channels[SCALE];
        let v = ch.basis.lin_comb(ch.value.x, ch.value.y, ch.value.z);
        match self.scale_function {
            ScaleFunction::Linear => v + DVec3::ONE,
            ScaleFunction::Exp => DVec3::new(v.x.exp(), v.y.exp(), v.z.exp()),
        }
    }

    /// Pixel zoom factors if auto pixel zoom is on.
    #[must_use]
    pub fn auto_pixel_zoom(&self) -> Option<(f64, f64)> {
        self.auto.pixel_zoom.then(|| {
            let scale = self.auto_scale();
            (scale.x, scale.y)
        })
    }

    /// The frame transform of the enabled auto channels: scale, outer
    /// rotation, translation, inner rotation. Scaling about the local or
    /// mouse origin moves the scale (and the mouse-origin offset) last.
    #[must_use]
    pub fn auto_matrix(&self) -> DMat4 {
        let auto = self.auto;
        let mut matrix = DMat4::IDENTITY;
        if auto.scale && !auto.scales_last() {
            matrix *= DMat4::from_scale(self.auto_scale());
        }
        if auto.rotate1 {
            matrix *= rotor_matrix(self.channels[ROTATE1].rotor);
        }
        if auto.translate {
            let ch = &self.channels[TRANSLATE];
            let v = ch.value;
            let offset = if ch.flags.intersects(DragFlags::SCREEN_PLANE | DragFlags::PROJ_DIR) {
                v
            } else {
                ch.basis.lin_comb(v.x, v.y, v.z)
            };
            matrix *= DMat4::from_translation(offset);
        }
        if auto.rotate2 {
            matrix *= rotor_matrix(self.channels[ROTATE2].rotor);
        }
        if auto.scales_last() {
            if auto.scale_about_mouse_origin {
                matrix *= DMat4::from_translation(self.scale_offset);
            }
            if auto.scale {
                matrix *= DMat4::from_scale(self.auto_scale());
            }
        }
        matrix
    }

    /// Smooths a raw mouse step if smoothing is on.
    pub fn smooth_step(&mut self, step: DVec2, time: f64) -> DVec2 {
        if self.smooth_mouse {
            self.smoother.smooth(step, time)
        } else {
            step
        }
    }

    /// Routes a drag step to the value or, for animated channels, to the
    /// momentum.
    pub fn feed(&mut self, idx: usize, delta: DVec3) -> bool {
        let animated = self
            .channels
            .get(idx)
            .is_some_and(|ch| ch.flags.contains(DragFlags::ANIMATED));
        if animated {
            self.add_to_anim(idx, delta)
        } else {
            self.add(idx, delta)
        }
    }
}

/// Rotation matrix of a rotor, identity for negligible angles.
fn rotor_matrix(rotor: DQuat) -> DMat4 {
    let angle = 2.0 * rotor.w.clamp(-1.0, 1.0).acos();
    if angle.abs() > 1e-4 {
        DMat4::from_quat(rotor)
    } else {
        DMat4::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_clamp_reports_actual_step() {
        let mut drag = DragChannels::default();
        drag.enable_range(TRANSLATE, true);
        drag.set_range(TRANSLATE, DVec3::splat(-1.0), DVec3::splat(1.0));

        drag.add(TRANSLATE, DVec3::new(0.75, 0.0, 0.0));
        drag.add(TRANSLATE, DVec3::new(0.75, 0.0, 0.0));
        let ch = drag.channel(TRANSLATE).unwrap();
        assert_eq!(ch.value().x, 1.0);
        assert!((ch.step().x - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_rotor_follows_clamped_step() {
        let mut drag = DragChannels::default();
        drag.enable_range(ROTATE2, true);
        drag.set_range(ROTATE2, DVec3::ZERO, DVec3::new(0.5, 0.0, 0.0));
        drag.add(ROTATE2, DVec3::new(2.0, 0.0, 0.0));

        let angle = drag.channel(ROTATE2).unwrap().rotor().to_axis_angle().1;
        assert!((angle - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_anim_drag_decays_to_rest() {
        let mut drag = DragChannels::default();
        drag.enable_anim(TRANSLATE, true);
        drag.add_to_anim(TRANSLATE, DVec3::new(1.0, 0.0, 0.0));

        let mut frames = 0;
        while drag.step_anim() {
            frames += 1;
            assert!(frames < 1000);
        }
        assert!(!drag.channel(TRANSLATE).unwrap().is_anim_active());
        // Geometric series of 0.8 * 0.9^n.
        assert!((drag.channel(TRANSLATE).unwrap().value().x - 8.0).abs() < 1e-2);
    }

    #[test]
    fn test_smoothing_weights_by_age() {
        let mut smoother = MouseSmoother::new(5, 0.05);
        smoother.smooth(DVec2::new(10.0, 0.0), 0.0);
        // An old sample has negligible weight.
        let s = smoother.smooth(DVec2::new(0.0, 0.0), 10.0);
        assert!(s.x.abs() < 1e-9);

        let mut smoother = MouseSmoother::new(5, 0.05);
        smoother.smooth(DVec2::new(10.0, 0.0), 0.0);
        // A simultaneous sample counts fully.
        let s = smoother.smooth(DVec2::new(0.0, 0.0), 0.0);
        assert!((s.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_rotation_is_absolute() {
        let mut drag = DragChannels::default();
        drag.set(ROTATE1, DVec3::new(90.0, 0.0, 0.0));
        let (axis, angle) = drag.channel(ROTATE1).unwrap().rotor().to_axis_angle();
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((axis - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn test_scale_about_mouse_origin_keeps_point() {
        let mut drag = DragChannels::default();
        drag.set_auto_transform(AutoTransform {
            scale: true,
            scale_about_mouse_origin: true,
            ..AutoTransform::default()
        });
        let origin = DVec3::new(1.0, 0.5, 0.0);
        drag.set_scale_origin(origin);

        drag.add(SCALE, DVec3::splat(1.0));
        assert!((drag.scale_offset() - DVec3::new(-1.0, -0.5, 0.0)).length() < 1e-12);
        let moved = drag.auto_matrix().transform_point3(origin);
        assert!((moved - origin).length() < 1e-12);

        drag.reset();
        assert_eq!(drag.scale_offset(), DVec3::ZERO);
    }

    #[test]
    fn test_scale_about_local_origin_scales_last() {
        let mut drag = DragChannels::default();
        drag.set_auto_transform(AutoTransform {
            translate: true,
            scale: true,
            scale_about_local_origin: true,
            ..AutoTransform::default()
        });
        drag.set(SCALE, DVec3::splat(1.0));
        drag.add(TRANSLATE, DVec3::new(1.0, 0.0, 0.0));

        // Translation steps are taken in scaled units.
        assert!((drag.channel(TRANSLATE).unwrap().value().x - 2.0).abs() < 1e-12);
        let expected = DMat4::from_translation(DVec3::new(2.0, 0.0, 0.0)) * DMat4::from_scale(DVec3::splat(2.0));
        assert!(drag.auto_matrix().abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn test_pixel_zoom_leaves_frame_alone() {
        let mut drag = DragChannels::default();
        drag.set_auto_transform(AutoTransform {
            pixel_zoom: true,
            ..AutoTransform::default()
        });
        assert_eq!(drag.auto_pixel_zoom(), Some((1.0, 1.0)));
        drag.set(SCALE, DVec3::new(1.0, 2.0, 0.0));
        assert_eq!(drag.auto_pixel_zoom(), Some((2.0, 3.0)));
        assert_eq!(drag.auto_matrix(), DMat4::IDENTITY);
    }
}
