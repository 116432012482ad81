use super::{ApplyMode, Node, NodeCore};
use crate::context::ApplyContext;
use crate::errors::Result;

/// Sets the current draw color for the nodes after it.
#[derive(Debug)]
pub struct Color {
    core: NodeCore,
    rgba: [f32; 4],
}

impl Color {
    #[must_use]
    pub fn new(rgba: [f32; 4]) -> Self {
        Self {
            core: NodeCore::new("Color"),
            rgba,
        }
    }

    #[must_use]
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new([r, g, b, 1.0])
    }

    #[inline]
    #[must_use]
    pub fn rgba(&self) -> [f32; 4] {
        self.rgba
    }

    pub fn set_rgba(&mut self, rgba: [f32; 4]) {
        self.rgba = rgba;
        self.core.content().set_changed(true, true, false);
    }
}

impl Node for Color {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        // Pick colors are owned by the pick pass.
        if mode == ApplyMode::Draw {
            ctx.color = self.rgba;
        }
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            rgba: self.rgba,
        })
    }
}
