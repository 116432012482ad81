//! Viewport placement and depth levels of a scene with a local view.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use parking_lot::Mutex;

use crate::device::PixelRect;
use crate::device::transform::{project, unproject};
use crate::settings::DepthLevelSettings;

/// Last composed viewport of a scene, readable by other scenes that anchor
/// their origin to it.
pub type ViewAnchor = Arc<Mutex<PixelRect>>;

/// Border insets in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Borders {
    pub left: i32,
    pub right: i32,
    pub bottom: i32,
    pub top: i32,
}

impl Borders {
    #[must_use]
    pub fn uniform(width: i32) -> Self {
        Self {
            left: width,
            right: width,
            bottom: width,
            top: width,
        }
    }
}

/// How a scene's viewport selects its depth level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthLevel {
    /// Offset from the enclosing scene's level.
    Relative(f64),
    /// Explicit level index.
    Absolute(f64),
    /// Level derived from the depth of the local origin along the viewing
    /// axis. Local depths in `[local_far, local_near]` map linearly onto
    /// levels in `[level_far, level_near]`. Needs a local origin and a
    /// non-empty local range.
    Local {
        local_near: f64,
        local_far: f64,
        level_near: f64,
        level_far: f64,
    },
}

impl DepthLevel {
    /// Local depth level with the default ranges.
    #[must_use]
    pub fn local() -> Self {
        DepthLevel::Local {
            local_near: 1.0,
            local_far: -1.0,
            level_near: 10.0,
            level_far: -10.0,
        }
    }
}

impl Default for DepthLevel {
    fn default() -> Self {
        DepthLevel::Relative(1.0)
    }
}

/// Anchors the origin of a viewport to an edge of another scene's viewport.
#[derive(Debug, Clone)]
pub struct OriginAnchor {
    pub view: ViewAnchor,
    /// Use the left edge of the anchor, otherwise its right edge.
    pub left_edge: bool,
    /// Use the bottom edge of the anchor, otherwise its top edge.
    pub bottom_edge: bool,
}

/// Placement of a local viewport inside the current one.
///
/// Each of left, bottom, width and height is either absolute pixels or a
/// fraction of the enclosing viewport. With `local_origin` the left/bottom/
/// depth triple is a point in the current frame that is projected to window
/// coordinates; with `local_extent` in addition the extent is the projected
/// size of the width/height box at that point.
#[derive(Debug, Clone)]
pub struct ViewportSpec {
    pub left: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub relative_left: bool,
    pub relative_bottom: bool,
    pub relative_width: bool,
    pub relative_height: bool,
    pub local_origin: bool,
    pub local_extent: bool,
    /// Fractions of the extent the origin is shifted left and down by.
    pub align_x: f64,
    pub align_y: f64,
    pub borders: Borders,
    pub depth_level: DepthLevel,
    pub anchor: Option<OriginAnchor>,
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self {
            left: 0.0,
            bottom: 0.0,
            width: 1.0,
            height: 1.0,
            depth: 0.0,
            relative_left: true,
            relative_bottom: true,
            relative_width: true,
            relative_height: true,
            local_origin: false,
            local_extent: false,
            align_x: 0.0,
            align_y: 0.0,
            borders: Borders::default(),
            depth_level: DepthLevel::default(),
            anchor: None,
        }
    }
}

/// Result of composing a [`ViewportSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposedViewport {
    /// Drawing area, borders removed.
    pub inner: PixelRect,
    /// Area including the borders.
    pub outer: PixelRect,
}

impl ViewportSpec {
    /// Absolute pixel viewport.
    #[must_use]
    pub fn absolute(left: i32, bottom: i32, width: i32, height: i32) -> Self {
        Self {
            left: f64::from(left),
            bottom: f64::from(bottom),
            width: f64::from(width),
            height: f64::from(height),
            relative_left: false,
            relative_bottom: false,
            relative_width: false,
            relative_height: false,
            ..Self::default()
        }
    }

    /// Viewport given as fractions of the enclosing one.
    #[must_use]
    pub fn relative(left: f64, bottom: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            bottom,
            width,
            height,
            ..Self::default()
        }
    }

    /// Viewport whose origin is the window position of `origin` in the
    /// current frame; the extent stays absolute pixels.
    #[must_use]
    pub fn at_local_origin(origin: DVec3, width: i32, height: i32) -> Self {
        Self {
            left: origin.x,
            bottom: origin.y,
            depth: origin.z,
            local_origin: true,
            width: f64::from(width),
            height: f64::from(height),
            relative_width: false,
            relative_height: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_borders(mut self, borders: Borders) -> Self {
        self.borders = borders;
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, x: f64, y: f64) -> Self {
        self.align_x = x;
        self.align_y = y;
        self
    }

    #[must_use]
    pub fn with_depth_level(mut self, level: DepthLevel) -> Self {
        self.depth_level = level;
        self
    }

    #[must_use]
    pub fn with_anchor(mut self, anchor: OriginAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Places the viewport inside `current`.
    ///
    /// `modelview` and `projection` are the current device matrices, used
    /// only for a local origin or extent.
    #[must_use]
    pub fn compose(&self, current: PixelRect, modelview: DMat4, projection: DMat4) -> ComposedViewport {
        let [mut left, mut bottom, cur_w, cur_h] = current;
        let (fw, fh) = (f64::from(cur_w), f64::from(cur_h));

        if let Some(anchor) = &self.anchor {
            let view = *anchor.view.lock();
            left = if anchor.left_edge { view[0] } else { view[0] + view[2] };
            bottom = if anchor.bottom_edge { view[1] } else { view[1] + view[3] };
        }

        let origin = DVec3::new(self.left, self.bottom, self.depth);
        let window_origin = if self.local_origin {
            project(origin, modelview, projection, current)
        } else {
            None
        };

        if self.local_origin {
            if let Some(w) = window_origin {
                left = w.x.floor() as i32;
                bottom = w.y.floor() as i32;
            }
        } else {
            left += if self.relative_left {
                (self.left * fw) as i32
            } else {
                self.left as i32
            };
            bottom += if self.relative_bottom {
                (self.bottom * fh) as i32
            } else {
                self.bottom as i32
            };
        }

        let extent = window_origin.filter(|_| self.local_extent).and_then(|w| {
            let corner = DVec3::new(self.left + self.width, self.bottom + self.height, self.depth);
            project(corner, modelview, projection, current)
                .map(|c| ((c.x - w.x).floor() as i32, (c.y - w.y).floor() as i32))
        });
        let (mut width, mut height) = extent.unwrap_or_else(|| {
            (
                if self.relative_width {
                    (self.width * fw) as i32
                } else {
                    self.width as i32
                },
                if self.relative_height {
                    (self.height * fh) as i32
                } else {
                    self.height as i32
                },
            )
        });

        let b = self.borders;
        if width.abs() <= b.left + b.right {
            width = b.left + b.right + 1;
        }
        if height <= b.bottom + b.top {
            height = b.bottom + b.top + 1;
        }
        if width < 0 {
            left += width;
            width = -width;
        }

        left -= (self.align_x * f64::from(width)) as i32;
        bottom -= (self.align_y * f64::from(height)) as i32;

        let outer = [left, bottom, width, height];
        let inner = [
            left + b.left,
            bottom + b.bottom,
            width - (b.left + b.right),
            height - (b.bottom + b.top),
        ];
        ComposedViewport { inner, outer }
    }

    /// New depth level index, or `None` to keep the current depth range.
    #[must_use]
    pub fn resolve_depth_level(
        &self,
        current_level: f64,
        current: PixelRect,
        modelview: DMat4,
        projection: DMat4,
    ) -> Option<f64> {
        match self.depth_level {
            DepthLevel::Relative(offset) => Some(current_level + offset),
            DepthLevel::Absolute(level) => Some(level),
            DepthLevel::Local { .. } if !self.local_origin => None,
            DepthLevel::Local {
                local_near, local_far, ..
            } if (local_near - local_far).abs() < f64::EPSILON => None,
            DepthLevel::Local {
                local_near,
                local_far,
                level_near,
                level_far,
            } => {
                let cx = f64::from(current[0]) + f64::from(current[2]) / 2.0;
                let cy = f64::from(current[1]) + f64::from(current[3]) / 2.0;
                let near_point = unproject(DVec3::new(cx, cy, 0.2), modelview, projection, current)?;
                let far_point = unproject(DVec3::new(cx, cy, 0.8), modelview, projection, current)?;
                // Points out of the screen.
                let axis = (near_point - far_point).try_normalize()?;

                let local = axis
                    .dot(DVec3::new(self.left, self.bottom, self.depth))
                    .clamp(local_far.min(local_near), local_near.max(local_far));
                Some((local - local_far) * (level_near - level_far) / (local_near - local_far) + level_far)
            }
        }
    }
}

/// Near/far depth range of a depth level.
#[must_use]
pub fn depth_range_for_level(level: f64, layout: &DepthLevelSettings) -> (f64, f64) {
    let near = layout.origin() - level * layout.width();
    (near, near + layout.width() - layout.gap())
}
