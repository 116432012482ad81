//! Per-traversal state.
//!
//! One [`ApplyContext`] is threaded through a whole draw or pick pass. Nodes
//! change it on the way down and restore what they changed on the way up.

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::device::{GraphicsDevice, MatrixStack};
use crate::node::{ApplyMode, NodeId, SharedShader};
use crate::pick::{PickNameStack, PickSelection};
use crate::render_target::TargetState;
use crate::settings::EngineSettings;

bitflags! {
    /// Input modifiers that select one of the 16 pick sub-scenes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const DRAG  = 1 << 3;
    }
}

impl Modifiers {
    /// Index `0..16` into the per-modifier pick tables.
    #[inline]
    #[must_use]
    pub fn pick_index(self) -> usize {
        usize::from(self.bits() & 0x0F)
    }
}

/// Cursor position and pick window, in window pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseState {
    pub x: i32,
    pub y: i32,
    pub pick_width: i32,
    pub pick_height: i32,
}

/// Render-pass flags of the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassFlags {
    pub first: bool,
    pub last: bool,
    pub transparency: bool,
}

impl Default for PassFlags {
    fn default() -> Self {
        Self {
            first: true,
            last: true,
            transparency: false,
        }
    }
}

/// Mutable state of one draw or pick pass.
pub struct ApplyContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub matrices: MatrixStack,
    pub settings: &'a EngineSettings,
    pub lock_timeout: Duration,

    pub time: f64,
    pub time_step: f64,
    pub repeat_idx: u32,
    pub pass: PassFlags,
    /// Set by any node that needs another frame to finish animating.
    pub need_animate: bool,

    pub names: &'a mut PickNameStack,
    pub selection: &'a mut PickSelection,
    pub modifiers: Modifiers,
    pub mouse: MouseState,
    /// True while inside a scene that is currently picked.
    pub in_pick_state: bool,

    pub invert_front_face: bool,
    pub auto_adapt_front_face: bool,
    /// Current depth level index of the enclosing scene.
    pub depth_level: f64,
    pub color: [f32; 4],

    pub current_shader: Option<SharedShader>,
    pub current_target: Option<Arc<Mutex<TargetState>>>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        device: &'a mut dyn GraphicsDevice,
        settings: &'a EngineSettings,
        names: &'a mut PickNameStack,
        selection: &'a mut PickSelection,
    ) -> Self {
        Self {
            device,
            matrices: MatrixStack::new(),
            settings,
            lock_timeout: settings.lock_timeout(),
            time: 0.0,
            time_step: 0.0,
            repeat_idx: 0,
            pass: PassFlags::default(),
            need_animate: false,
            names,
            selection,
            modifiers: Modifiers::empty(),
            mouse: MouseState::default(),
            in_pick_state: false,
            invert_front_face: false,
            auto_adapt_front_face: false,
            depth_level: 0.0,
            color: [1.0; 4],
            current_shader: None,
            current_target: None,
        }
    }

    /// True exactly once per frame: draw mode, first pass, first repeat.
    /// Animation state advances only here.
    #[inline]
    #[must_use]
    pub fn is_animation_step(&self, mode: ApplyMode) -> bool {
        mode == ApplyMode::Draw && self.pass.first && self.repeat_idx == 0
    }

    pub fn push_pick_name(&mut self, id: NodeId) {
        self.names.push(id);
    }

    pub fn pop_pick_name(&mut self) {
        self.names.pop();
    }

    /// Snapshots the pick-name stack and returns the RGBA pick color.
    pub fn pick_rgba(&mut self, part_id: u32) -> [u8; 4] {
        crate::pick::color_to_rgba(self.names.color(part_id))
    }

    /// Current draw color as RGBA8.
    #[must_use]
    pub fn color_rgba(&self) -> [u8; 4] {
        self.color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}
