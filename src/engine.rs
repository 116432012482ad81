//! Engine Core Module
//!
//! [`Engine`] drives the traversal of one scene graph on one graphics device.
//! It owns the node repository, the pick-name stack and the current pick
//! selection, and runs the per-frame passes:
//!
//! - **Draw**: an opaque pass, then (if enabled) a transparency pass. The
//!   first pass of a frame is the only one that advances animation.
//! - **Pick**: on demand, a pass in pick colors with the background cleared
//!   to "nothing", followed by a read-back and decode of the pixel under the
//!   cursor. The decoded path becomes the selection seen by later draws.
//!
//! # Example
//!
//! ```rust,ignore
//! use vizgraph::{Engine, EngineSettings, SoftwareDevice, Scene};
//!
//! let mut engine = Engine::new(SoftwareDevice::new(640, 480), EngineSettings::default());
//! let root = vizgraph::node::insert(engine.repository(), Scene::new())?;
//! engine.set_root(Some(root));
//!
//! loop {
//!     let animating = engine.render_frame()?;
//!     // ... present, handle input ...
//!     if let Some(hit) = engine.pick(mouse_x, mouse_y)? {
//!         println!("picked {:?}", hit.node());
//!     }
//! }
//! ```

use crate::context::{ApplyContext, Modifiers, MouseState, PassFlags};
use crate::device::{ClearFlags, GraphicsDevice};
use crate::errors::{Result, ResultExt};
use crate::node::{ApplyMode, NodeHandle, NodeRepository};
use crate::pick::{PickHit, PickNameStack, PickSelection, decode_pick_color, rgba_to_color};
use crate::settings::EngineSettings;
use crate::utils::FrameClock;

/// Render-loop driver for one device.
pub struct Engine<D: GraphicsDevice> {
    device: D,
    settings: EngineSettings,
    repository: NodeRepository,
    root: Option<NodeHandle>,

    names: PickNameStack,
    selection: PickSelection,
    modifiers: Modifiers,
    mouse: MouseState,

    clock: FrameClock,
    clear_color: [u8; 4],
}

impl<D: GraphicsDevice> Engine<D> {
    #[must_use]
    pub fn new(device: D, settings: EngineSettings) -> Self {
        let names = PickNameStack::new(settings.pick.name_stack_len, settings.pick.stored_stack_count);
        Self {
            device,
            repository: NodeRepository::with_lock_timeout(settings.lock_timeout()),
            settings,
            root: None,
            names,
            selection: PickSelection::new(),
            modifiers: Modifiers::empty(),
            mouse: MouseState::default(),
            clock: FrameClock::new(),
            clear_color: [0, 0, 0, 255],
        }
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Repository for the nodes of this engine's graph.
    #[must_use]
    pub fn repository(&self) -> &NodeRepository {
        &self.repository
    }

    pub fn set_root(&mut self, root: Option<NodeHandle>) {
        self.root = root;
    }

    #[must_use]
    pub fn root(&self) -> Option<&NodeHandle> {
        self.root.as_ref()
    }

    pub fn set_clear_color(&mut self, rgba: [u8; 4]) {
        self.clear_color = rgba;
    }

    /// Modifier keys used to choose pick sub-scenes.
    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Cursor position in window pixels, origin bottom left.
    pub fn set_mouse(&mut self, x: i32, y: i32) {
        self.mouse.x = x;
        self.mouse.y = y;
    }

    #[must_use]
    pub fn selection(&self) -> &PickSelection {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Renders a frame at wall-clock time. Returns true if anything asked
    /// for another frame to continue an animation.
    pub fn render_frame(&mut self) -> Result<bool> {
        self.clock.tick();
        self.render_passes()
    }

    /// Renders a frame at `time` seconds.
    pub fn render_frame_at(&mut self, time: f64) -> Result<bool> {
        self.clock.advance_to(time);
        self.render_passes()
    }

    fn render_passes(&mut self) -> Result<bool> {
        let Some(root) = self.root.clone() else {
            return Ok(false);
        };

        self.device.bind_target(None, None);
        self.device.set_scissor_enabled(false);
        self.device.set_clear_color(self.clear_color);
        self.device.clear(ClearFlags::all());

        let passes: &[bool] = if self.settings.transparency_pass {
            &[false, true]
        } else {
            &[false]
        };
        let mut need_animate = false;
        for (i, &transparency) in passes.iter().enumerate() {
            let pass = PassFlags {
                first: i == 0,
                last: i + 1 == passes.len(),
                transparency,
            };
            self.selection.reset_draw_flags();
            need_animate |= self
                .run_pass(&root, ApplyMode::Draw, pass)
                .context(format!("Error in render pass {i}"))?;
        }
        Ok(need_animate)
    }

    /// Runs one traversal of the root. Any render target still active at
    /// the end of the pass is finalized and leftover matrix pushes are
    /// unwound.
    fn run_pass(&mut self, root: &NodeHandle, mode: ApplyMode, pass: PassFlags) -> Result<bool> {
        let mut ctx = ApplyContext::new(&mut self.device, &self.settings, &mut self.names, &mut self.selection);
        ctx.pass = pass;
        ctx.time = self.clock.time();
        ctx.time_step = self.clock.step();
        ctx.modifiers = self.modifiers;
        ctx.mouse = self.mouse;

        let timeout = ctx.lock_timeout;
        let applied = root.try_with(timeout, |node| node.apply(mode, &mut ctx));

        let finalized = match ctx.current_target.take() {
            Some(target) => target.lock().finalize(ctx.device, pass.last),
            None => Ok(()),
        };
        if !ctx.matrices.is_empty() {
            log::warn!("Unbalanced matrix pushes after {mode:?} pass");
            ctx.matrices.unwind(ctx.device);
        }
        let need_animate = ctx.need_animate;

        match applied {
            None => log::warn!("Root node {root:?} is invalid or busy"),
            Some(Ok(false)) => log::debug!("{mode:?} pass aborted by a node"),
            Some(Ok(true)) => {}
            Some(Err(err)) => return Err(err),
        }
        finalized?;
        Ok(need_animate)
    }

    /// Picks at window position `(x, y)` and makes the result the current
    /// selection. Draws into the bound output, so a frame must be rendered
    /// before the next present.
    pub fn pick(&mut self, x: i32, y: i32) -> Result<Option<PickHit>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        self.set_mouse(x, y);
        let radius = self.settings.pick.window_radius;
        self.mouse.pick_width = radius;
        self.mouse.pick_height = radius;
        self.names.reset();

        self.device.bind_target(None, None);
        self.device.set_scissor_enabled(false);
        self.device.set_clear_color([0; 4]);
        self.device.clear(ClearFlags::all());

        self.run_pass(&root, ApplyMode::Pick, PassFlags::default())
            .context("Error in pick pass")?;
        if self.names.overflowed() {
            log::warn!("Pick pass stored {} name stacks, some were dropped", self.names.store_count());
        }

        let pixel = self.device.read_pixels([x, y, 1, 1])?;
        let rgba = match pixel.as_slice() {
            [r, g, b, a, ..] => [*r, *g, *b, *a],
            _ => [0; 4],
        };
        let hit = decode_pick_color(rgba_to_color(rgba)).and_then(|(index, part_id)| {
            self.names.load(index).map(|path| PickHit {
                path: path.to_vec(),
                part_id,
            })
        });

        match &hit {
            Some(hit) => {
                log::debug!("Picked {:?} part {}", hit.node(), hit.part_id);
                self.selection.set(hit);
            }
            None => self.selection.clear(),
        }
        Ok(hit)
    }
}
