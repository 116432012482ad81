//! Local projections of a scene.

use glam::DMat4;

use crate::device::PixelRect;
use crate::device::transform::{frustum, ortho};

/// Projection a scene installs for its children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Central projection from a vertical or horizontal field of view in
    /// degrees. The angle applies to the shorter viewport side.
    Perspective { angle: f64, near: f64, far: f64 },
    /// Central projection with an explicit frustum.
    Frustum {
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
        near: f64,
        far: f64,
    },
    /// Orthographic projection, optionally widened to the viewport's aspect
    /// ratio.
    Ortho {
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
        near: f64,
        far: f64,
        fit_viewport_aspect: bool,
    },
    /// One unit per pixel, origin at the viewport center. Odd widths put
    /// the extra pixel on the right or top.
    Pixel,
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            angle: 50.0,
            near: 1.0,
            far: 100.0,
        }
    }
}

impl Projection {
    #[must_use]
    pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Self {
        Projection::Ortho {
            left,
            right,
            bottom,
            top,
            near,
            far,
            fit_viewport_aspect: false,
        }
    }

    /// True for the central projections.
    #[must_use]
    pub fn is_central(&self) -> bool {
        matches!(self, Projection::Perspective { .. } | Projection::Frustum { .. })
    }

    /// Projection matrix for a viewport.
    #[must_use]
    pub fn matrix(&self, viewport: PixelRect) -> DMat4 {
        let vw = f64::from(viewport[2]);
        let vh = f64::from(viewport[3]);
        match *self {
            Projection::Perspective { angle, near, far } => {
                let ta = (0.5 * angle.to_radians()).tan();
                let aspect = if vh == 0.0 { 1.0 } else { vw / vh };
                let (hw, hh) = if aspect < 1.0 {
                    let hw = ta * near;
                    (hw, hw / aspect)
                } else {
                    let hh = ta * near;
                    (hh * aspect, hh)
                };
                frustum(-hw, hw, -hh, hh, near, far)
            }
            Projection::Frustum {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => frustum(left, right, bottom, top, near, far),
            Projection::Ortho {
                mut left,
                mut right,
                mut bottom,
                mut top,
                near,
                far,
                fit_viewport_aspect,
            } => {
                if fit_viewport_aspect && vw != 0.0 && vh != 0.0 {
                    let ow = right - left;
                    let oh = top - bottom;
                    let o_aspect = ow / oh;
                    let v_aspect = vw / vh;
                    let sign = o_aspect.signum();
                    if v_aspect.abs() < o_aspect.abs() {
                        let oh = (ow / v_aspect) * sign;
                        let center = (bottom + top) / 2.0;
                        bottom = center - oh / 2.0;
                        top = center + oh / 2.0;
                    } else {
                        let ow = oh * v_aspect * sign;
                        let center = (left + right) / 2.0;
                        left = center - ow / 2.0;
                        right = center + ow / 2.0;
                    }
                }
                ortho(left, right, bottom, top, near, far)
            }
            Projection::Pixel => {
                let l = viewport[2] >> 1;
                let b = viewport[3] >> 1;
                let r = viewport[2] - l;
                let t = viewport[3] - b;
                ortho(
                    -f64::from(l),
                    f64::from(r),
                    -f64::from(b),
                    f64::from(t),
                    -1.01,
                    1.01,
                )
            }
        }
    }
}
