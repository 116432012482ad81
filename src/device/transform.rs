//! Object/window coordinate mapping in the manner of `gluProject`.

use glam::{DMat4, DVec3, DVec4};

use super::PixelRect;

/// Maps an object-space point to window coordinates `(x, y, depth)`.
///
/// Returns `None` when the point lies on the eye plane.
#[must_use]
pub fn project(point: DVec3, modelview: DMat4, projection: DMat4, viewport: PixelRect) -> Option<DVec3> {
    let clip = projection * modelview * point.extend(1.0);
    if clip.w.abs() < f64::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(DVec3::new(
        f64::from(viewport[0]) + f64::from(viewport[2]) * (ndc.x + 1.0) * 0.5,
        f64::from(viewport[1]) + f64::from(viewport[3]) * (ndc.y + 1.0) * 0.5,
        (ndc.z + 1.0) * 0.5,
    ))
}

/// Inverse of [`project`].
#[must_use]
pub fn unproject(window: DVec3, modelview: DMat4, projection: DMat4, viewport: PixelRect) -> Option<DVec3> {
    let inverse = (projection * modelview).inverse();
    if !inverse.is_finite() || viewport[2] == 0 || viewport[3] == 0 {
        return None;
    }
    let ndc = DVec4::new(
        (window.x - f64::from(viewport[0])) / f64::from(viewport[2]) * 2.0 - 1.0,
        (window.y - f64::from(viewport[1])) / f64::from(viewport[3]) * 2.0 - 1.0,
        window.z * 2.0 - 1.0,
        1.0,
    );
    let obj = inverse * ndc;
    if obj.w.abs() < f64::EPSILON {
        return None;
    }
    Some(obj.truncate() / obj.w)
}

/// Orthographic projection in the convention of `glOrtho`.
#[must_use]
pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> DMat4 {
    DMat4::orthographic_rh_gl(left, right, bottom, top, near, far)
}

/// Perspective frustum in the convention of `glFrustum`.
#[must_use]
pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> DMat4 {
    let w = right - left;
    let h = top - bottom;
    let d = far - near;
    DMat4::from_cols(
        DVec4::new(2.0 * near / w, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 2.0 * near / h, 0.0, 0.0),
        DVec4::new((right + left) / w, (top + bottom) / h, -(far + near) / d, -1.0),
        DVec4::new(0.0, 0.0, -2.0 * far * near / d, 0.0),
    )
}

/// True if `(x, y)` lies inside `rect`, edges included.
#[inline]
#[must_use]
pub fn rect_contains(rect: PixelRect, x: i32, y: i32) -> bool {
    x >= rect[0] && x <= rect[0] + rect[2] && y >= rect[1] && y <= rect[1] + rect[3]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_project_unproject_round_trip() {
        let viewport = [10, 20, 200, 100];
        let proj = frustum(-1.0, 1.0, -0.5, 0.5, 1.0, 50.0);
        let view = DMat4::from_translation(DVec3::new(0.0, 0.0, -5.0));
        let point = DVec3::new(0.3, -0.2, 0.5);

        let window = project(point, view, proj, viewport).unwrap();
        let back = unproject(window, view, proj, viewport).unwrap();
        assert!((back - point).length() < 1e-6);
    }

    #[test]
    fn test_pixel_ortho_maps_origin_to_center() {
        let viewport = [0, 0, 100, 50];
        let proj = ortho(-50.0, 49.0, -25.0, 24.0, -1.01, 1.01);
        let window = project(DVec3::ZERO, DMat4::IDENTITY, proj, viewport).unwrap();
        assert!((window.x - 100.0 * 50.0 / 99.0).abs() < EPSILON);
        assert!((window.z - 0.5).abs() < EPSILON);
    }
}
