//! Pick State Machine
//!
//! A pickable scene reacts to being under the cursor by substituting one of
//! its pick sub-scenes for its own children. The sub-scene is chosen from
//! 16-entry tables indexed by the modifier bits (see
//! [`Modifiers::pick_index`](crate::context::Modifiers::pick_index)).
//!
//! ```text
//!            picked, intro timer set             intro timer elapsed
//!   Idle ─────────────────────────────▶ Intro ─────────────────────────▶ Active
//!    ▲                                                                      │
//!    │  outro timer elapsed                          no longer picked       │
//!    └──────────────────────────── Outro ◀──────────────────────────────────┘
//! ```
//!
//! Without an intro timer a pick goes straight to `Active`; without an outro
//! timer a lost pick goes straight to `Idle`. Timers count down by the frame
//! time step and only on the animation step of a frame.

use rustc_hash::FxHashSet;

use crate::context::ApplyContext;
use crate::node::{ApplyMode, NodeHandle, NodeId};

/// Number of modifier combinations.
pub const PICK_TABLE_SIZE: usize = 16;

/// Externally visible pick state of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickState {
    Idle,
    PickedIntro,
    PickedActive,
    PickedOutro,
}

/// Role of a pick sub-scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickSceneKind {
    /// Shown while picked.
    Pick,
    /// Shown at most once per pass across all scenes sharing the selection.
    Single,
    Intro,
    SingleIntro,
    Outro,
    SingleOutro,
}

impl PickSceneKind {
    const fn index(self) -> usize {
        match self {
            PickSceneKind::Pick => 0,
            PickSceneKind::Single => 1,
            PickSceneKind::Intro => 2,
            PickSceneKind::SingleIntro => 3,
            PickSceneKind::Outro => 4,
            PickSceneKind::SingleOutro => 5,
        }
    }

    pub const ALL: [PickSceneKind; 6] = [
        PickSceneKind::Pick,
        PickSceneKind::Single,
        PickSceneKind::Intro,
        PickSceneKind::SingleIntro,
        PickSceneKind::Outro,
        PickSceneKind::SingleOutro,
    ];
}

type SceneTable = [Option<NodeHandle>; PICK_TABLE_SIZE];

/// Sub-scenes selected for one traversal of a pickable scene.
#[derive(Default)]
pub struct PickSelectionScenes {
    pub pick: Option<NodeHandle>,
    pub single: Option<NodeHandle>,
}

impl PickSelectionScenes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pick.is_none() && self.single.is_none()
    }
}

pub struct PickStateMachine {
    pickable: bool,
    map: FxHashSet<NodeId>,
    scenes: [SceneTable; 6],
    intro_timers: [f64; PICK_TABLE_SIZE],
    outro_timers: [f64; PICK_TABLE_SIZE],
    intro_factors: [f64; PICK_TABLE_SIZE],
    outro_factors: [f64; PICK_TABLE_SIZE],

    is_picked: bool,
    draw_flag: bool,
    cur_idx: Option<usize>,
    intro_idx: usize,
    outro_idx: usize,
    intro_timer: f64,
    outro_timer: f64,
    intro_factor: f64,
    outro_factor: f64,
    intro: bool,
    outro: bool,
    cur_changed: bool,

    pick_time: f64,
    pick_time_step: f64,
}

impl PickStateMachine {
    /// State machine whose pick map holds `own_id`.
    #[must_use]
    pub fn new(own_id: NodeId) -> Self {
        let mut map = FxHashSet::default();
        map.insert(own_id);
        Self {
            pickable: false,
            map,
            scenes: std::array::from_fn(|_| std::array::from_fn(|_| None)),
            intro_timers: [0.0; PICK_TABLE_SIZE],
            outro_timers: [0.0; PICK_TABLE_SIZE],
            intro_factors: [1.0; PICK_TABLE_SIZE],
            outro_factors: [1.0; PICK_TABLE_SIZE],
            is_picked: false,
            draw_flag: false,
            cur_idx: None,
            intro_idx: 0,
            outro_idx: 0,
            intro_timer: 0.0,
            outro_timer: 0.0,
            intro_factor: 1.0,
            outro_factor: 1.0,
            intro: false,
            outro: false,
            cur_changed: false,
            pick_time: 0.0,
            pick_time_step: 0.0,
        }
    }

    /// Copy with the same configuration and a fresh, idle state.
    #[must_use]
    pub fn duplicate(&self, own_id: NodeId) -> Self {
        let mut copy = Self::new(own_id);
        copy.pickable = self.pickable;
        copy.map.extend(self.map.iter().copied());
        copy.scenes.clone_from(&self.scenes);
        copy.intro_timers = self.intro_timers;
        copy.outro_timers = self.outro_timers;
        copy.intro_factors = self.intro_factors;
        copy.outro_factors = self.outro_factors;
        copy
    }

    // --- configuration ------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn is_pickable(&self) -> bool {
        self.pickable
    }

    pub fn set_pickable(&mut self, pickable: bool) {
        self.pickable = pickable;
    }

    /// Ids whose selection means "this scene is picked".
    #[must_use]
    pub fn pick_map(&self) -> &FxHashSet<NodeId> {
        &self.map
    }

    pub fn add_to_pick_map(&mut self, id: NodeId) {
        self.map.insert(id);
    }

    pub fn remove_from_pick_map(&mut self, id: NodeId) {
        self.map.remove(&id);
    }

    /// Replaces the whole pick map. The scene's own id is kept only if
    /// `ids` contains it.
    pub fn set_pick_map(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.map.clear();
        self.map.extend(ids);
    }

    /// Stores a sub-scene for modifier combination `idx`; `None` clears it.
    pub fn set_scene(&mut self, kind: PickSceneKind, idx: usize, scene: Option<NodeHandle>) -> bool {
        let Some(slot) = self.scenes[kind.index()].get_mut(idx) else {
            return false;
        };
        *slot = scene;
        true
    }

    #[must_use]
    pub fn scene(&self, kind: PickSceneKind, idx: usize) -> Option<&NodeHandle> {
        self.scenes[kind.index()].get(idx)?.as_ref()
    }

    /// Intro length in seconds and the rate of pick time during the intro.
    pub fn set_intro(&mut self, idx: usize, timer: f64, time_factor: f64) -> bool {
        if idx >= PICK_TABLE_SIZE {
            return false;
        }
        self.intro_timers[idx] = timer;
        self.intro_factors[idx] = time_factor;
        true
    }

    pub fn set_outro(&mut self, idx: usize, timer: f64, time_factor: f64) -> bool {
        if idx >= PICK_TABLE_SIZE {
            return false;
        }
        self.outro_timers[idx] = timer;
        self.outro_factors[idx] = time_factor;
        true
    }

    // --- state ----------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> PickState {
        if self.is_picked {
            if self.intro {
                PickState::PickedIntro
            } else {
                PickState::PickedActive
            }
        } else if self.outro {
            PickState::PickedOutro
        } else {
            PickState::Idle
        }
    }

    #[inline]
    #[must_use]
    pub fn is_picked(&self) -> bool {
        self.is_picked
    }

    /// True from a pick change until the end of that frame's last pass.
    #[inline]
    #[must_use]
    pub fn cur_pick_changed(&self) -> bool {
        self.cur_changed
    }

    #[must_use]
    pub fn cur_pick_index(&self) -> Option<usize> {
        self.cur_idx
    }

    #[must_use]
    pub fn pick_time(&self) -> f64 {
        self.pick_time
    }

    #[must_use]
    pub fn pick_time_step(&self) -> f64 {
        self.pick_time_step
    }

    pub(crate) fn end_of_pass(&mut self, last_pass: bool) {
        if last_pass {
            self.cur_changed = false;
        }
    }

    fn has_pick_scene(&self, idx: usize) -> bool {
        self.scenes[PickSceneKind::Pick.index()][idx].is_some()
            || self.scenes[PickSceneKind::Single.index()][idx].is_some()
    }

    /// Evaluates the selection at the start of a traversal. Returns true if
    /// a new pick started this frame.
    pub(crate) fn begin(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> bool {
        if !self.pickable {
            return false;
        }
        if mode == ApplyMode::Draw {
            // Every pass and repeat re-reads whether a single-shot scene
            // was already drawn.
            self.draw_flag = ctx.selection.find(&self.map).unwrap_or(false);
        }
        if !ctx.pass.first {
            return false;
        }

        if self.intro_timer > 0.0 {
            self.cur_idx = Some(self.intro_idx);
            return false;
        }
        if self.outro_timer > 0.0 {
            self.cur_idx = None;
            return false;
        }
        if mode != ApplyMode::Draw {
            return false;
        }

        self.intro = false;
        self.outro = false;
        self.is_picked = ctx.selection.find(&self.map).is_some();
        if ctx.repeat_idx != 0 {
            return false;
        }

        if self.is_picked {
            let mut idx = ctx.modifiers.pick_index();
            if !self.has_pick_scene(idx) {
                idx = 0;
            }
            if self.cur_idx != Some(idx) {
                self.cur_idx = Some(idx);
                self.cur_changed = true;
                self.intro_timer = self.intro_timers[idx];
                self.intro_factor = self.intro_factors[idx];
                self.intro_idx = idx;
                return true;
            }
        } else if let Some(cur) = self.cur_idx.take() {
            self.outro_timer = self.outro_timers[cur];
            self.outro_factor = self.outro_factors[cur];
            self.outro_idx = cur;
            self.cur_changed = true;
        }
        false
    }

    /// Advances intro/outro timers and picks the sub-scenes to show.
    ///
    /// `need_animate` is the scene's animation request of the previous frame.
    pub(crate) fn select(
        &mut self,
        anim_step: bool,
        pick_start: bool,
        need_animate: bool,
        ctx: &mut ApplyContext<'_>,
    ) -> PickSelectionScenes {
        if !self.pickable {
            return PickSelectionScenes::default();
        }
        let step = ctx.time_step.abs();

        let (kind_pick, kind_single, idx) = if self.is_picked {
            if anim_step {
                if self.intro_timer > 0.0 && need_animate && !pick_start {
                    self.intro_timer -= step;
                }
                self.intro = self.intro_timer > 0.0;
            }
            if self.intro {
                if self.intro_timer > 0.0 {
                    ctx.need_animate = true;
                }
                (PickSceneKind::Intro, PickSceneKind::SingleIntro, Some(self.intro_idx))
            } else {
                (PickSceneKind::Pick, PickSceneKind::Single, self.cur_idx)
            }
        } else {
            if anim_step {
                if self.outro_timer > 0.0 && need_animate {
                    self.outro_timer -= step;
                }
                self.outro = self.outro_timer > 0.0;
            }
            if !self.outro {
                return PickSelectionScenes::default();
            }
            if self.outro_timer > 0.0 {
                ctx.need_animate = true;
            }
            (PickSceneKind::Outro, PickSceneKind::SingleOutro, Some(self.outro_idx))
        };

        let Some(idx) = idx else {
            return PickSelectionScenes::default();
        };
        let pick = self.scenes[kind_pick.index()][idx].clone();
        let single = if self.draw_flag {
            None
        } else {
            self.scenes[kind_single.index()][idx].clone()
        };
        if single.is_some() {
            ctx.selection.flag_drawn(&self.map);
            self.draw_flag = true;
        }
        PickSelectionScenes { pick, single }
    }

    /// Sub-scenes of the current modifier combination, all six roles.
    pub(crate) fn current_scenes(&self) -> Vec<NodeHandle> {
        let Some(idx) = self.cur_idx else {
            return Vec::new();
        };
        PickSceneKind::ALL
            .iter()
            .filter_map(|kind| self.scenes[kind.index()][idx].clone())
            .collect()
    }

    pub(crate) fn restart_pick_time(&mut self) {
        self.pick_time = 0.0;
        self.pick_time_step = 0.0;
    }

    /// Advances pick time by the frame step scaled by the intro or outro
    /// rate. An overshooting timer shortens the last step.
    pub(crate) fn advance_pick_time(&mut self, time_step: f64) {
        self.pick_time_step = if self.intro {
            let mut step = self.intro_factor * time_step;
            if self.intro_timer < 0.0 {
                step += self.intro_factor * self.intro_timer;
            }
            step
        } else if self.outro {
            let mut step = self.outro_factor * time_step;
            if self.outro_timer < 0.0 {
                step += self.outro_factor * self.outro_timer;
            }
            step
        } else {
            time_step
        };
        self.pick_time += self.pick_time_step;
    }
}
