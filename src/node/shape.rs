//! Flat rectangle geometry.
//!
//! Rectangles are transformed through the current modelview, projection and
//! viewport to a window-space box and filled on the device. They are enough to
//! exercise every draw and pick path of the traversal.

use glam::DVec3;

use super::{ApplyMode, Node, NodeCore};
use crate::context::ApplyContext;
use crate::device::transform::project;
use crate::device::{MatrixMode, PixelRect};
use crate::errors::Result;

/// Axis-aligned rectangle in object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z: f64,
}

impl RectGeometry {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            z: 0.0,
        }
    }

    /// Window-space bounding box under the current device transform.
    fn window_rect(&self, ctx: &ApplyContext<'_>) -> Option<PixelRect> {
        let modelview = ctx.device.matrix(MatrixMode::ModelView);
        let projection = ctx.device.matrix(MatrixMode::Projection);
        let viewport = ctx.device.viewport();

        let a = project(DVec3::new(self.x, self.y, self.z), modelview, projection, viewport)?;
        let b = project(
            DVec3::new(self.x + self.width, self.y + self.height, self.z),
            modelview,
            projection,
            viewport,
        )?;
        let min = a.min(b);
        let max = a.max(b);
        let x0 = min.x.round() as i32;
        let y0 = min.y.round() as i32;
        Some([x0, y0, max.x.round() as i32 - x0, max.y.round() as i32 - y0])
    }
}

/// A single filled rectangle in the current color.
#[derive(Debug)]
pub struct Rect {
    core: NodeCore,
    geometry: RectGeometry,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            core: NodeCore::new("Rect"),
            geometry: RectGeometry::new(x, y, width, height),
        }
    }

    #[must_use]
    pub fn at_depth(mut self, z: f64) -> Self {
        self.geometry.z = z;
        self
    }

    #[must_use]
    pub fn geometry(&self) -> RectGeometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: RectGeometry) {
        self.geometry = geometry;
        self.core.content().set_changed(true, true, false);
    }
}

impl Node for Rect {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        let Some(rect) = self.geometry.window_rect(ctx) else {
            return Ok(true);
        };
        let rgba = match mode {
            ApplyMode::Draw => ctx.color_rgba(),
            ApplyMode::Pick => {
                ctx.push_pick_name(self.core.id());
                let rgba = ctx.pick_rgba(0);
                ctx.pop_pick_name();
                rgba
            }
        };
        ctx.device.fill_rect(rect, rgba);
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            geometry: self.geometry,
        })
    }
}

/// Rectangles that pick as separate parts of one node.
///
/// Part `i` is picked with part id `i`. While the enclosing scene is picked,
/// the selected part is drawn in the highlight color.
#[derive(Debug)]
pub struct RectBatch {
    core: NodeCore,
    parts: Vec<RectGeometry>,
    highlight: [f32; 4],
}

impl RectBatch {
    #[must_use]
    pub fn new(parts: Vec<RectGeometry>) -> Self {
        Self {
            core: NodeCore::new("RectBatch"),
            parts,
            highlight: [1.0, 1.0, 0.0, 1.0],
        }
    }

    #[must_use]
    pub fn with_highlight(mut self, rgba: [f32; 4]) -> Self {
        self.highlight = rgba;
        self
    }

    #[must_use]
    pub fn parts(&self) -> &[RectGeometry] {
        &self.parts
    }

    pub fn push(&mut self, part: RectGeometry) {
        self.parts.push(part);
        self.core.content().set_changed(true, true, false);
    }
}

impl Node for RectBatch {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if mode == ApplyMode::Pick {
            ctx.push_pick_name(self.core.id());
        }
        let base = ctx.color_rgba();
        let highlight = self.highlight.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let picked_part = (ctx.in_pick_state && ctx.selection.contains(self.core.id()))
            .then(|| ctx.selection.part_id());

        for (part_id, part) in (0u32..).zip(&self.parts) {
            let Some(rect) = part.window_rect(ctx) else {
                continue;
            };
            let rgba = match mode {
                ApplyMode::Pick => ctx.pick_rgba(part_id),
                ApplyMode::Draw if picked_part == Some(part_id) => highlight,
                ApplyMode::Draw => base,
            };
            ctx.device.fill_rect(rect, rgba);
        }

        if mode == ApplyMode::Pick {
            ctx.pop_pick_name();
        }
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            parts: self.parts.clone(),
            highlight: self.highlight,
        })
    }
}
