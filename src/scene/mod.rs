//! Scene Traversal
//!
//! A [`Scene`] is a node list with its own view of the world. On every
//! `apply` it may:
//!
//! - compose a local viewport (with borders, alignment, anchoring and a
//!   depth level) inside the current one
//! - install a local projection and a fresh modelview frame
//! - apply the transforms accumulated by its drag channels
//! - substitute one of its pick sub-scenes for its children while picked
//! - blit the pixels of the last frame instead of traversing its children
//!   (adaptive redraw)
//! - run its children against a local clock, repeated `repeat_count` times
//!
//! Everything a scene changes in the device or the context is recorded in a
//! [`SavedState`] and put back in reverse order on every exit path, errors
//! included.

pub mod drag;
pub mod picking;
pub mod projection;
pub mod redraw;
pub mod viewport;

pub use drag::{AutoTransform, DragBasis, DragChannels, DragFlags, ScaleFunction};
pub use picking::{PICK_TABLE_SIZE, PickSceneKind, PickState, PickStateMachine};
pub use projection::Projection;
pub use redraw::RedrawCache;
pub use viewport::{Borders, ComposedViewport, DepthLevel, OriginAnchor, ViewAnchor, ViewportSpec};

use std::sync::Arc;

use glam::{DMat4, DVec2, DVec3};
use parking_lot::Mutex;

use crate::context::{ApplyContext, Modifiers};
use crate::device::transform::{project, rect_contains, unproject};
use crate::device::{MatrixMode, PixelRect};
use crate::errors::{Result, ResultExt};
use crate::node::{ApplyMode, Node, NodeCore, NodeHandle, NodeHandleExt, NodeId, NodeList};
use crate::settings::DragSettings;

use self::drag::{ROTATE1, ROTATE2, SCALE, TRANSLATE};
use self::viewport::depth_range_for_level;

/// Time of a scene-local clock, shareable between scenes.
pub type LocalClock = Arc<Mutex<f64>>;

/// Device matrices and viewport seen by the last draw pass, used to map
/// mouse motion into the scene's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseFrame {
    pub projection: DMat4,
    pub modelview: DMat4,
    pub viewport: PixelRect,
}

/// Everything a scene changed on the way down.
#[derive(Default)]
struct SavedState {
    viewport: Option<PixelRect>,
    scissor: Option<(PixelRect, bool)>,
    depth: Option<((f64, f64), f64)>,
    projection: bool,
    frame: bool,
    pick_name: bool,
    front_face: Option<(bool, bool)>,
    in_pick_state: Option<bool>,
    time: Option<(f64, f64)>,
    pixel_zoom: Option<(f64, f64)>,
}

impl SavedState {
    /// Puts back everything in reverse order. Matrix pops continue past an
    /// underflow so the remaining state is still restored.
    fn restore(self, ctx: &mut ApplyContext<'_>) -> Result<()> {
        let mut result = Ok(());
        if let Some((time, step)) = self.time {
            ctx.time = time;
            ctx.time_step = step;
        }
        if let Some(in_pick_state) = self.in_pick_state {
            ctx.in_pick_state = in_pick_state;
        }
        if let Some((invert, adapt)) = self.front_face {
            ctx.invert_front_face = invert;
            ctx.auto_adapt_front_face = adapt;
        }
        if self.pick_name {
            ctx.pop_pick_name();
        }
        if let Some((zx, zy)) = self.pixel_zoom {
            ctx.device.set_pixel_zoom(zx, zy);
        }
        if self.frame {
            for mode in [MatrixMode::ModelView, MatrixMode::Texture] {
                if let Err(err) = ctx.matrices.pop(ctx.device, mode) {
                    result = Err(err);
                }
            }
        }
        if self.projection {
            if let Err(err) = ctx.matrices.pop(ctx.device, MatrixMode::Projection) {
                result = Err(err);
            }
        }
        if let Some(viewport) = self.viewport {
            ctx.device.set_viewport(viewport);
        }
        if let Some((scissor, enabled)) = self.scissor {
            ctx.device.set_scissor_box(scissor);
            ctx.device.set_scissor_enabled(enabled);
        }
        if let Some(((near, far), level)) = self.depth {
            ctx.device.set_depth_range(near, far);
            ctx.depth_level = level;
        }
        result
    }
}

/// A node list with local view, picking, dragging and redraw caching.
pub struct Scene {
    list: NodeList,

    draw_scene: bool,
    draw_opaque: bool,
    draw_transparent: bool,
    pick_draw: bool,

    local_view: bool,
    viewport: ViewportSpec,
    view_scissor: bool,
    pickable_view: bool,
    anchor: ViewAnchor,
    local_frame: bool,
    reset_frame: bool,
    projection: Option<Projection>,
    auto_adapt_front_face: bool,

    repeat_count: u32,
    local_clock: Option<LocalClock>,
    need_animate: bool,

    picking: PickStateMachine,

    drag: DragChannels,
    auto_frame: Option<NodeHandle>,
    mouse_frame: Option<MouseFrame>,

    redraw: RedrawCache,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::with_drag_settings(&DragSettings::default())
    }

    #[must_use]
    pub fn with_drag_settings(drag: &DragSettings) -> Self {
        let list = NodeList::with_type_name("Scene");
        let picking = PickStateMachine::new(list.core().id());
        Self {
            list,
            draw_scene: true,
            draw_opaque: true,
            draw_transparent: true,
            pick_draw: true,
            local_view: false,
            viewport: ViewportSpec::default(),
            view_scissor: true,
            pickable_view: false,
            anchor: Arc::new(Mutex::new([0; 4])),
            local_frame: true,
            reset_frame: false,
            projection: None,
            auto_adapt_front_face: false,
            repeat_count: 1,
            local_clock: None,
            need_animate: false,
            picking,
            drag: DragChannels::new(drag),
            auto_frame: None,
            mouse_frame: None,
            redraw: RedrawCache::default(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.list.core_mut().set_name(name);
        self
    }

    fn mark_changed(&self) {
        self.list.set_content_changed(true, true, false);
    }

    // --- children -------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn list(&self) -> &NodeList {
        &self.list
    }

    #[inline]
    pub fn list_mut(&mut self) -> &mut NodeList {
        &mut self.list
    }

    pub fn add(&mut self, child: NodeHandle) -> bool {
        self.list.add(child)
    }

    // --- gating -----------------------------------------------------------------

    pub fn set_draw(&mut self, draw: bool) {
        self.draw_scene = draw;
        self.mark_changed();
    }

    #[must_use]
    pub fn is_drawn(&self) -> bool {
        self.draw_scene
    }

    pub fn set_draw_opaque(&mut self, draw: bool) {
        self.draw_opaque = draw;
    }

    pub fn set_draw_transparent(&mut self, draw: bool) {
        self.draw_transparent = draw;
    }

    /// Whether the scene takes part in pick passes.
    pub fn set_pick_draw(&mut self, draw: bool) {
        self.pick_draw = draw;
    }

    fn is_gated(&self, mode: ApplyMode, ctx: &ApplyContext<'_>) -> bool {
        if !self.draw_scene {
            return true;
        }
        match mode {
            ApplyMode::Pick => !self.pick_draw,
            ApplyMode::Draw if ctx.pass.transparency => !self.draw_transparent,
            ApplyMode::Draw => !self.draw_opaque,
        }
    }

    // --- view -----------------------------------------------------------------

    /// Installs a local viewport; `None` draws into the current one.
    pub fn set_viewport(&mut self, viewport: Option<ViewportSpec>) {
        match viewport {
            Some(spec) => {
                self.local_view = true;
                self.viewport = spec;
            }
            None => self.local_view = false,
        }
        self.redraw.invalidate();
        self.mark_changed();
    }

    #[must_use]
    pub fn viewport(&self) -> Option<&ViewportSpec> {
        self.local_view.then_some(&self.viewport)
    }

    /// Outer viewport of the last traversal, for other scenes to anchor to.
    #[must_use]
    pub fn view_anchor(&self) -> ViewAnchor {
        Arc::clone(&self.anchor)
    }

    pub fn set_view_scissor(&mut self, scissor: bool) {
        self.view_scissor = scissor;
    }

    /// Makes the whole local viewport hit in pick passes.
    pub fn set_pickable_view(&mut self, pickable: bool) {
        self.pickable_view = pickable;
    }

    pub fn set_projection(&mut self, projection: Option<Projection>) {
        self.projection = projection;
        self.mark_changed();
    }

    #[must_use]
    pub fn projection(&self) -> Option<Projection> {
        self.projection
    }

    /// Saves and restores the modelview and texture matrices around the
    /// children.
    pub fn set_local_frame(&mut self, local: bool) {
        self.local_frame = local;
    }

    /// Starts the children from an identity modelview.
    pub fn set_reset_frame(&mut self, reset: bool) {
        self.reset_frame = reset;
        self.mark_changed();
    }

    pub fn set_auto_adapt_front_face(&mut self, adapt: bool) {
        self.auto_adapt_front_face = adapt;
    }

    // --- time -----------------------------------------------------------------

    pub fn set_repeat_count(&mut self, count: u32) {
        self.repeat_count = count;
        self.mark_changed();
    }

    #[must_use]
    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Runs the children on a clock of their own.
    pub fn enable_local_time(&mut self, enable: bool) {
        self.local_clock = enable.then(|| Arc::new(Mutex::new(0.0)));
    }

    /// Shares `clock` with another scene.
    pub fn set_local_clock(&mut self, clock: Option<LocalClock>) {
        self.local_clock = clock;
    }

    #[must_use]
    pub fn local_clock(&self) -> Option<LocalClock> {
        self.local_clock.clone()
    }

    #[must_use]
    pub fn local_time(&self) -> Option<f64> {
        self.local_clock.as_ref().map(|clock| *clock.lock())
    }

    pub fn reset_local_time(&mut self) {
        if let Some(clock) = &self.local_clock {
            *clock.lock() = 0.0;
        }
    }

    /// True if something below the scene asked for another frame during the
    /// last animation step.
    #[must_use]
    pub fn needs_animation(&self) -> bool {
        self.need_animate
    }

    // --- picking ----------------------------------------------------------------

    #[must_use]
    pub fn picking(&self) -> &PickStateMachine {
        &self.picking
    }

    pub fn picking_mut(&mut self) -> &mut PickStateMachine {
        &mut self.picking
    }

    /// Makes picks of `triggers` (and no longer of this scene itself) start
    /// this scene's pick state. Invalid handles are skipped.
    pub fn set_pick_triggers(&mut self, triggers: &[NodeHandle]) {
        let ids: Vec<NodeId> = triggers.iter().filter_map(NodeHandleExt::node_id).collect();
        self.picking.set_pick_map(ids);
    }

    #[must_use]
    pub fn pick_state(&self) -> PickState {
        self.picking.state()
    }

    pub fn set_pickable(&mut self, pickable: bool) {
        self.picking.set_pickable(pickable);
    }

    // --- adaptive redraw --------------------------------------------------------

    /// Caches the pixels of the local view between frames. Needs a local
    /// view and switches on content-change tracking below the scene.
    pub fn enable_adaptive_redraw(&mut self, enable: bool) {
        self.redraw.set_enabled(enable);
        if enable {
            self.list.enable_content_changed_info(true);
            self.mark_changed();
        }
    }

    #[must_use]
    pub fn redraw_cache(&self) -> &RedrawCache {
        &self.redraw
    }

    // --- dragging ---------------------------------------------------------------

    #[must_use]
    pub fn drag(&self) -> &DragChannels {
        &self.drag
    }

    /// Channel configuration. Value changes should go through the
    /// `*_drag_data` methods so the scene frame follows.
    pub fn drag_mut(&mut self) -> &mut DragChannels {
        &mut self.drag
    }

    pub fn set_auto_transform(&mut self, auto: AutoTransform) {
        self.drag.set_auto_transform(auto);
        self.update_auto_frame();
    }

    #[must_use]
    pub fn auto_transform(&self) -> AutoTransform {
        self.drag.auto_transform()
    }

    /// Writes the drag transform into `frame` instead of the scene's own
    /// modelview. `frame` must be a [`Frame`](crate::node::Frame).
    pub fn set_auto_frame(&mut self, frame: Option<NodeHandle>) {
        self.auto_frame = frame;
        self.update_auto_frame();
    }

    #[must_use]
    pub fn mouse_frame(&self) -> Option<MouseFrame> {
        self.mouse_frame
    }

    fn update_auto_frame(&self) {
        if let Some(handle) = &self.auto_frame {
            let matrix = self.drag.auto_matrix();
            let updated = handle
                .with(|node| node.as_frame_mut().map(|frame| frame.set(matrix)))
                .flatten();
            if updated.is_none() {
                log::warn!("Scene {}: auto frame {handle:?} is not a reachable frame", self.list.core().id());
            }
        }
        self.mark_changed();
    }

    pub fn add_to_drag_data(&mut self, idx: usize, delta: DVec3) -> bool {
        let ok = self.drag.add(idx, delta);
        if ok {
            self.update_auto_frame();
        }
        ok
    }

    pub fn set_drag_data(&mut self, idx: usize, value: DVec3) -> bool {
        let ok = self.drag.set(idx, value);
        if ok {
            self.update_auto_frame();
        }
        ok
    }

    pub fn reset_drag_data(&mut self) {
        self.drag.reset();
        self.update_auto_frame();
    }

    pub fn reset_anim_drag(&mut self, idx: usize) {
        self.drag.reset_anim(idx);
    }

    pub fn add_to_anim_drag_data(&mut self, idx: usize, delta: DVec3) -> bool {
        self.drag.add_to_anim(idx, delta)
    }

    /// Advances drag momentum by one frame. Returns true while any channel
    /// is still moving.
    pub fn step_anim_drag(&mut self) -> bool {
        let animated = self.drag.step_anim();
        if animated {
            self.update_auto_frame();
        }
        animated
    }

    /// Maps a mouse step (window pixels) onto drag channel `idx`.
    ///
    /// `mouse` is the cursor position before the step. Returns false if the
    /// channel is disabled or, for screen-plane dragging, before the scene
    /// has been drawn once.
    pub fn active_mouse_move(
        &mut self,
        idx: usize,
        mouse: (i32, i32),
        step: (i32, i32),
        modifiers: Modifiers,
        time: f64,
    ) -> bool {
        let Some(flags) = self.drag.channel(idx).map(drag::DragChannel::flags) else {
            return false;
        };
        if !flags.contains(DragFlags::ENABLED) {
            return false;
        }
        let raw = DVec2::new(f64::from(step.0), f64::from(step.1));
        let s = self.drag.smooth_step(raw, time);
        let shift = modifiers.contains(Modifiers::SHIFT);

        let delta = if flags.contains(DragFlags::SCREEN_PLANE) {
            let Some(frame) = self.mouse_frame else {
                return false;
            };
            let Some(delta) = self.screen_plane_step(idx, frame, mouse, s, shift) else {
                return false;
            };
            delta
        } else {
            let factor = if idx == ROTATE1 || idx == ROTATE2 { 0.005 } else { 0.01 };
            if shift {
                DVec3::new(s.x, -s.y, 0.0) * factor
            } else {
                DVec3::new(s.x, 0.0, s.y) * factor
            }
        };

        if idx == SCALE && self.drag.auto_transform().scale_about_mouse_origin {
            if let Some(origin) = self.mouse_frame.and_then(|frame| self.local_point_under(frame, mouse)) {
                self.drag.set_scale_origin(origin);
            }
        }

        let ok = self.drag.feed(idx, delta);
        if ok {
            self.update_auto_frame();
        }
        ok
    }

    /// Point of the children's frame under the cursor, at the depth of the
    /// frame origin.
    fn local_point_under(&self, frame: MouseFrame, mouse: (i32, i32)) -> Option<DVec3> {
        let modelview = frame.modelview * self.drag.auto_matrix();
        let depth = project(DVec3::ZERO, modelview, frame.projection, frame.viewport)?.z;
        let window = DVec3::new(f64::from(mouse.0), f64::from(mouse.1), depth);
        unproject(window, modelview, frame.projection, frame.viewport)
    }

    /// Drag step for screen-plane dragging. Rotation channels get a basis of
    /// screen axes; translation follows the cursor in the plane of the frame
    /// origin, or the viewing axis with `shift`.
    fn screen_plane_step(
        &mut self,
        idx: usize,
        frame: MouseFrame,
        mouse: (i32, i32),
        s: DVec2,
        shift: bool,
    ) -> Option<DVec3> {
        let MouseFrame {
            projection,
            modelview,
            viewport,
        } = frame;
        let origin = project(DVec3::ZERO, modelview, projection, viewport)?;
        let at = |x: f64, y: f64, z: f64| unproject(DVec3::new(x, y, z), modelview, projection, viewport);

        let center = at(origin.x, origin.y, origin.z)?;
        let view_axis = (at(origin.x, origin.y, 0.2)? - at(origin.x, origin.y, 0.8)?).try_normalize()?;

        if idx == ROTATE1 || idx == ROTATE2 {
            let x = (at(origin.x + 100.0, origin.y, origin.z)? - center).try_normalize()?;
            let y = (at(origin.x, origin.y + 100.0, origin.z)? - center).try_normalize()?;
            self.drag.set_basis(idx, DragBasis { x, y, z: view_axis });
            return Some(DVec3::new(s.x, 0.0, s.y) * 0.005);
        }

        let (mx, my) = (f64::from(mouse.0), f64::from(mouse.1));
        let p0 = at(mx, my, origin.z)?;
        let p1 = at(mx + s.x, my + s.y, origin.z)?;
        let delta = p1 - p0;
        if idx == TRANSLATE && shift {
            return Some(view_axis * delta.length() * s.y.signum());
        }
        if idx == SCALE {
            return Some(DVec3::splat(s.y * 0.01));
        }
        Some(delta)
    }

    // --- traversal --------------------------------------------------------------

    /// Applies the children, `repeat_count` times, on the scene's clock.
    ///
    /// Pick sub-scenes are applied through this entry point, so their own
    /// view settings are ignored when they stand in for another scene.
    pub fn apply_element_list(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        let saved_time = ctx.time;
        if let Some(clock) = &self.local_clock {
            let mut time = clock.lock();
            if self.need_animate && ctx.is_animation_step(mode) {
                *time += ctx.time_step;
            }
            ctx.time = *time;
        }

        let saved_repeat = ctx.repeat_idx;
        let mut result = Ok(true);
        for repeat in 0..self.repeat_count {
            ctx.repeat_idx = saved_repeat + repeat;
            result = self.list.apply_children(mode, ctx);
            if !matches!(result, Ok(true)) {
                break;
            }
        }
        ctx.repeat_idx = saved_repeat;
        ctx.time = saved_time;
        result
    }

    /// Applies a pick sub-scene in place of the children.
    fn apply_substitute(handle: &NodeHandle, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        let timeout = ctx.lock_timeout;
        let applied = handle.try_with(timeout, |node| match node.as_scene_mut() {
            Some(scene) => scene.apply_element_list(mode, ctx),
            None => node.apply(mode, ctx),
        });
        applied.unwrap_or_else(|| {
            log::warn!("Pick sub-scene {handle:?} is invalid or busy");
            Ok(false)
        })
    }

    fn apply_view(
        &mut self,
        mode: ApplyMode,
        anim_step: bool,
        pick_start: bool,
        ctx: &mut ApplyContext<'_>,
        saved: &mut SavedState,
    ) -> Result<bool> {
        let mut cache_view = None;

        if self.local_view {
            let current = ctx.device.viewport();
            let modelview = ctx.device.matrix(MatrixMode::ModelView);
            let projection = ctx.device.matrix(MatrixMode::Projection);
            let composed = self.viewport.compose(current, modelview, projection);
            *self.anchor.lock() = composed.outer;
            let inner = composed.inner;

            if mode == ApplyMode::Pick && !rect_contains(inner, ctx.mouse.x, ctx.mouse.y) {
                return Ok(true);
            }

            saved.viewport = Some(current);
            saved.scissor = Some((ctx.device.scissor_box(), ctx.device.scissor_enabled()));
            saved.depth = Some((ctx.device.depth_range(), ctx.depth_level));

            if let Some(level) = self
                .viewport
                .resolve_depth_level(ctx.depth_level, current, modelview, projection)
            {
                let (near, far) = depth_range_for_level(level, &ctx.settings.depth_levels);
                ctx.device.set_depth_range(near, far);
                ctx.depth_level = level;
            }

            ctx.device.set_viewport(inner);
            if self.view_scissor {
                ctx.device.set_scissor_box(inner);
                ctx.device.set_scissor_enabled(true);
            }

            if mode == ApplyMode::Draw && self.redraw.is_enabled() {
                if self.picking.cur_pick_changed() || !self.redraw.fits(inner) {
                    self.redraw.invalidate();
                } else if !self.list.is_content_changed() && !self.need_animate {
                    self.redraw.blit(ctx.device, inner);
                    return Ok(true);
                }
                cache_view = Some(inner);
            }

            if self.projection.is_none() && inner[2] != 0 && inner[3] != 0 {
                ctx.matrices.push(&*ctx.device, MatrixMode::Projection);
                saved.projection = true;
                let scale = DMat4::from_scale(DVec3::new(
                    f64::from(current[2]) / f64::from(inner[2]),
                    f64::from(current[3]) / f64::from(inner[3]),
                    1.0,
                ));
                ctx.device.load_matrix(MatrixMode::Projection, scale * projection);
            }
        }

        if let Some(proj) = self.projection {
            if !saved.projection {
                ctx.matrices.push(&*ctx.device, MatrixMode::Projection);
                saved.projection = true;
            }
            let matrix = proj.matrix(ctx.device.viewport());
            ctx.device.load_matrix(MatrixMode::Projection, matrix);
        }

        if self.local_frame {
            ctx.matrices.push(&*ctx.device, MatrixMode::Texture);
            ctx.matrices.push(&*ctx.device, MatrixMode::ModelView);
            saved.frame = true;
        }
        if self.reset_frame {
            let mut frame = DMat4::IDENTITY;
            if self.projection.is_some_and(|p| p.is_central()) {
                frame = DMat4::from_translation(DVec3::new(0.0, 0.0, -5.0));
            }
            ctx.device.load_matrix(MatrixMode::ModelView, frame);
            saved.pixel_zoom = Some(ctx.device.pixel_zoom());
            ctx.device.set_pixel_zoom(1.0, 1.0);
        }

        if mode == ApplyMode::Pick {
            ctx.push_pick_name(self.list.core().id());
            saved.pick_name = true;
            if self.local_view && self.pickable_view {
                let radius = ctx.settings.pick.window_radius;
                let rgba = ctx.pick_rgba(0);
                let (x, y) = (ctx.mouse.x, ctx.mouse.y);
                ctx.device.fill_rect([x - radius, y - radius, 2 * radius, 2 * radius], rgba);
            }
        }

        saved.front_face = Some((ctx.invert_front_face, ctx.auto_adapt_front_face));
        if self.auto_adapt_front_face {
            ctx.auto_adapt_front_face = true;
            ctx.invert_front_face = false;
        }

        if mode == ApplyMode::Draw {
            self.mouse_frame = Some(MouseFrame {
                projection: ctx.device.matrix(MatrixMode::Projection),
                modelview: ctx.device.matrix(MatrixMode::ModelView),
                viewport: ctx.device.viewport(),
            });
        }
        if self.auto_frame.is_none() && self.drag.auto_transform().any() {
            ctx.device
                .mult_matrix(MatrixMode::ModelView, self.drag.auto_matrix());
            if let Some((zx, zy)) = self.drag.auto_pixel_zoom() {
                saved.pixel_zoom.get_or_insert(ctx.device.pixel_zoom());
                ctx.device.set_pixel_zoom(zx, zy);
            }
        }

        let selected = self.picking.select(anim_step, pick_start, self.need_animate, ctx);
        if !selected.is_empty() {
            if anim_step {
                if pick_start {
                    self.picking.restart_pick_time();
                    for handle in self.picking.current_scenes() {
                        handle.try_with(ctx.lock_timeout, |node| {
                            if let Some(scene) = node.as_scene_mut() {
                                scene.reset_local_time();
                            }
                        });
                    }
                } else if self.need_animate {
                    for handle in selected.pick.iter().chain(selected.single.iter()) {
                        handle.try_with(ctx.lock_timeout, |node| {
                            if let Some(scene) = node.as_scene_mut() {
                                scene.need_animate = true;
                            }
                        });
                    }
                    self.picking.advance_pick_time(ctx.time_step);
                }
            }
            saved.time = Some((ctx.time, ctx.time_step));
            ctx.time = self.picking.pick_time();
            ctx.time_step = self.picking.pick_time_step();
        }

        saved.in_pick_state = Some(ctx.in_pick_state);
        if self.picking.is_pickable() {
            ctx.in_pick_state = self.picking.is_picked();
        }

        let mut applied = true;
        if let Some(single) = &selected.single {
            applied = Self::apply_substitute(single, mode, ctx)?;
        }
        if applied {
            applied = match &selected.pick {
                Some(pick) => Self::apply_substitute(pick, mode, ctx)?,
                None => self.apply_element_list(mode, ctx)?,
            };
        }

        if let Some(view) = cache_view {
            if applied && ctx.pass.last {
                self.redraw.capture(ctx.device, view)?;
                self.list.set_content_changed(false, false, true);
            }
        }
        Ok(applied)
    }
}

impl Node for Scene {
    fn core(&self) -> &NodeCore {
        self.list.core()
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        self.list.core_mut()
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if self.is_gated(mode, ctx) {
            return Ok(true);
        }

        let anim_step = ctx.is_animation_step(mode);
        let outer_animate = ctx.need_animate;
        if anim_step {
            let dragging = self.step_anim_drag();
            ctx.need_animate = dragging;
        }
        let pick_start = self.picking.begin(mode, ctx);

        let mut saved = SavedState::default();
        let applied = self.apply_view(mode, anim_step, pick_start, ctx, &mut saved);
        let restored = saved.restore(ctx);

        if anim_step {
            self.need_animate = ctx.need_animate;
            ctx.need_animate |= outer_animate;
        }
        self.picking.end_of_pass(ctx.pass.last);

        let applied = applied.context("Error applying scene")?;
        restored?;
        Ok(applied)
    }

    /// Copies configuration and children. The copy is idle, has no cached
    /// image and gets its own local clock.
    fn copy(&self) -> Box<dyn Node> {
        let list = self.list.duplicate();
        let picking = self.picking.duplicate(list.core().id());
        let mut redraw = RedrawCache::default();
        redraw.set_enabled(self.redraw.is_enabled());
        Box::new(Self {
            list,
            draw_scene: self.draw_scene,
            draw_opaque: self.draw_opaque,
            draw_transparent: self.draw_transparent,
            pick_draw: self.pick_draw,
            local_view: self.local_view,
            viewport: self.viewport.clone(),
            view_scissor: self.view_scissor,
            pickable_view: self.pickable_view,
            anchor: Arc::new(Mutex::new(*self.anchor.lock())),
            local_frame: self.local_frame,
            reset_frame: self.reset_frame,
            projection: self.projection,
            auto_adapt_front_face: self.auto_adapt_front_face,
            repeat_count: self.repeat_count,
            local_clock: self.local_clock.as_ref().map(|c| Arc::new(Mutex::new(*c.lock()))),
            need_animate: false,
            picking,
            drag: self.drag.clone(),
            auto_frame: self.auto_frame.clone(),
            mouse_frame: None,
            redraw,
        })
    }

    fn as_list(&self) -> Option<&NodeList> {
        Some(&self.list)
    }

    fn as_list_mut(&mut self) -> Option<&mut NodeList> {
        Some(&mut self.list)
    }

    fn as_scene(&self) -> Option<&Scene> {
        Some(self)
    }

    fn as_scene_mut(&mut self) -> Option<&mut Scene> {
        Some(self)
    }
}
