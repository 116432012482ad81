//! Scene Integration Tests
//!
//! Tests for:
//! - Device state restored after local views and projections
//! - Pick state transitions through intro and outro, and pick triggers
//! - Pick sub-scene substitution by modifier
//! - Adaptive redraw reusing the cached image and dropping it on pick changes

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::DMat4;
use vizgraph::device::MatrixMode;
use vizgraph::node::{self, Color, NodeCore, Rect};
use vizgraph::scene::{PickSceneKind, ViewportSpec};
use vizgraph::{
    ApplyContext, ApplyMode, Engine, EngineSettings, GraphicsDevice, Modifiers, Node, NodeHandle, NodeHandleExt,
    NodeList, PickState, Projection, Result, Scene, SoftwareDevice,
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Leaf that counts draw applications.
struct Counter {
    core: NodeCore,
    draws: Arc<AtomicUsize>,
}

impl Counter {
    fn new(draws: &Arc<AtomicUsize>) -> Self {
        Self {
            core: NodeCore::new("Counter"),
            draws: Arc::clone(draws),
        }
    }
}

impl Node for Counter {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, _ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if mode == ApplyMode::Draw {
            self.draws.fetch_add(1, Ordering::SeqCst);
        }
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self::new(&self.draws))
    }
}

fn engine(width: u32, height: u32) -> Engine<SoftwareDevice> {
    let settings = EngineSettings {
        transparency_pass: false,
        ..EngineSettings::default()
    };
    Engine::new(SoftwareDevice::new(width, height), settings)
}

/// Rectangle covering the whole viewport under identity matrices.
fn full_rect(engine: &Engine<SoftwareDevice>) -> NodeHandle {
    node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 2.0)).unwrap()
}

fn colored_scene(engine: &Engine<SoftwareDevice>, rgb: [f32; 3]) -> NodeHandle {
    let mut scene = Scene::new();
    scene.add(node::insert(engine.repository(), Color::rgb(rgb[0], rgb[1], rgb[2])).unwrap());
    scene.add(full_rect(engine));
    node::insert(engine.repository(), scene).unwrap()
}

fn pick_state(scene: &NodeHandle) -> PickState {
    scene.with_scene(|s| s.pick_state()).unwrap()
}

// ============================================================================
// State Restoration
// ============================================================================

#[test]
fn scene_view_does_not_leak_to_siblings() {
    let mut engine = engine(64, 64);

    let mut inset = Scene::new();
    inset.set_viewport(Some(ViewportSpec::absolute(8, 8, 16, 16)));
    inset.set_projection(Some(Projection::ortho(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0)));
    inset.add(full_rect(&engine));
    let inset = node::insert(engine.repository(), inset).unwrap();

    let mut root = NodeList::new();
    root.add(inset);
    root.add(full_rect(&engine));
    let root = node::insert(engine.repository(), root).unwrap();
    engine.set_root(Some(root));
    engine.set_clear_color(BLACK);

    engine.render_frame_at(0.0).unwrap();

    let device = engine.device();
    assert_eq!(device.viewport(), [0, 0, 64, 64]);
    assert!(!device.scissor_enabled());
    assert_eq!(device.depth_range(), (0.0, 1.0));
    assert_eq!(device.matrix(MatrixMode::Projection), DMat4::IDENTITY);
    // The sibling after the inset draws over the whole window.
    assert_eq!(device.pixel(2, 2), Some(WHITE));
    assert_eq!(device.pixel(60, 60), Some(WHITE));
}

#[test]
fn scene_state_restored_when_child_aborts() {
    struct Abort(NodeCore);

    impl Node for Abort {
        fn core(&self) -> &NodeCore {
            &self.0
        }

        fn core_mut(&mut self) -> &mut NodeCore {
            &mut self.0
        }

        fn apply(&mut self, _mode: ApplyMode, _ctx: &mut ApplyContext<'_>) -> Result<bool> {
            Ok(false)
        }

        fn copy(&self) -> Box<dyn Node> {
            Box::new(Abort(self.0.duplicate()))
        }
    }

    let mut engine = engine(32, 32);
    let mut scene = Scene::new();
    scene.set_viewport(Some(ViewportSpec::absolute(4, 4, 8, 8)));
    scene.set_projection(Some(Projection::Pixel));
    scene.add(node::insert(engine.repository(), Abort(NodeCore::new("Abort"))).unwrap());
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene));

    assert!(!engine.render_frame_at(0.0).unwrap());
    let device = engine.device();
    assert_eq!(device.viewport(), [0, 0, 32, 32]);
    assert!(!device.scissor_enabled());
    assert_eq!(device.matrix(MatrixMode::Projection), DMat4::IDENTITY);
}

// ============================================================================
// Pick State Machine
// ============================================================================

#[test]
fn scene_intro_then_active() {
    let mut engine = engine(64, 64);
    let mut scene = Scene::new();
    scene.set_pickable(true);
    scene.picking_mut().set_intro(0, 2.0, 1.0);
    scene.add(full_rect(&engine));
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene.clone()));

    let hit = engine.pick(32, 32).unwrap().expect("rect under cursor");
    assert_eq!(hit.path.first().copied(), scene.node_id());
    assert_eq!(pick_state(&scene), PickState::Idle);

    assert!(engine.render_frame_at(0.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::PickedIntro);

    assert!(engine.render_frame_at(1.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::PickedIntro);

    assert!(!engine.render_frame_at(2.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::PickedActive);
}

#[test]
fn scene_outro_then_idle() {
    let mut engine = engine(64, 64);
    let mut scene = Scene::new();
    scene.set_pickable(true);
    scene.picking_mut().set_outro(0, 1.0, 1.0);
    scene.add(full_rect(&engine));
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene.clone()));

    engine.pick(10, 10).unwrap();
    engine.render_frame_at(0.0).unwrap();
    assert_eq!(pick_state(&scene), PickState::PickedActive);

    engine.clear_selection();
    assert!(engine.render_frame_at(1.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::PickedOutro);

    assert!(!engine.render_frame_at(2.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::Idle);
}

#[test]
fn scene_without_timers_switches_immediately() {
    let mut engine = engine(16, 16);
    let mut scene = Scene::new();
    scene.set_pickable(true);
    // Lower left quadrant only.
    scene.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 1.0, 1.0)).unwrap());
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene.clone()));

    engine.pick(4, 4).unwrap().expect("hit");
    assert!(!engine.render_frame_at(0.0).unwrap());
    assert_eq!(pick_state(&scene), PickState::PickedActive);

    assert!(engine.pick(12, 12).unwrap().is_none());
    assert!(engine.selection().is_empty());
    engine.render_frame_at(1.0).unwrap();
    assert_eq!(pick_state(&scene), PickState::Idle);
}

#[test]
fn scene_pick_triggers_replace_own_id() {
    let mut engine = engine(16, 16);
    let mut button = NodeList::new();
    // Left half.
    button.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 1.0, 2.0)).unwrap());
    let button = node::insert(engine.repository(), button).unwrap();

    let mut panel = Scene::new();
    panel.set_pickable(true);
    // Right half.
    panel.add(node::insert(engine.repository(), Rect::new(0.0, -1.0, 1.0, 2.0)).unwrap());
    panel.set_pick_triggers(&[button.clone()]);
    let panel = node::insert(engine.repository(), panel).unwrap();

    let mut root = Scene::new();
    root.add(button);
    root.add(panel.clone());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));

    engine.pick(12, 8).unwrap().expect("panel content");
    engine.render_frame_at(0.0).unwrap();
    assert_eq!(pick_state(&panel), PickState::Idle);

    engine.pick(4, 8).unwrap().expect("button");
    engine.render_frame_at(1.0).unwrap();
    assert_eq!(pick_state(&panel), PickState::PickedActive);
}

// ============================================================================
// Pick Sub-Scenes
// ============================================================================

#[test]
fn scene_substitutes_pick_scene_by_modifier() {
    let mut engine = engine(32, 32);
    let red = colored_scene(&engine, [1.0, 0.0, 0.0]);
    let green = colored_scene(&engine, [0.0, 1.0, 0.0]);

    let mut scene = Scene::new();
    scene.set_pickable(true);
    scene.add(full_rect(&engine));
    scene.picking_mut().set_scene(PickSceneKind::Pick, 0, Some(red));
    scene
        .picking_mut()
        .set_scene(PickSceneKind::Pick, Modifiers::SHIFT.pick_index(), Some(green));
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene));

    engine.render_frame_at(0.0).unwrap();
    assert_eq!(engine.device().pixel(16, 16), Some(WHITE));

    engine.pick(16, 16).unwrap().expect("hit");
    engine.render_frame_at(0.1).unwrap();
    assert_eq!(engine.device().pixel(16, 16), Some(RED));

    engine.set_modifiers(Modifiers::SHIFT);
    engine.render_frame_at(0.2).unwrap();
    assert_eq!(engine.device().pixel(16, 16), Some(GREEN));

    // No table entry for CTRL: falls back to the unmodified scene.
    engine.set_modifiers(Modifiers::CTRL);
    engine.render_frame_at(0.3).unwrap();
    assert_eq!(engine.device().pixel(16, 16), Some(RED));
}

#[test]
fn scene_single_scene_drawn_once_per_pass() {
    let mut engine = engine(32, 32);
    let draws = Arc::new(AtomicUsize::new(0));
    let mut single = Scene::new();
    single.add(node::insert(engine.repository(), Counter::new(&draws)).unwrap());
    let single = node::insert(engine.repository(), single).unwrap();

    let shared = full_rect(&engine);
    let make = || {
        let mut scene = Scene::new();
        scene.set_pickable(true);
        scene.add(shared.clone());
        scene.picking_mut().set_scene(PickSceneKind::Single, 0, Some(single.clone()));
        node::insert(engine.repository(), scene).unwrap()
    };
    let first = make();
    let second = make();
    let first_id = first.node_id().unwrap();
    let second_id = second.node_id().unwrap();
    first.with_scene(|s| s.picking_mut().add_to_pick_map(second_id));
    second.with_scene(|s| s.picking_mut().add_to_pick_map(first_id));

    let mut root = NodeList::new();
    root.add(first);
    root.add(second);
    let root = node::insert(engine.repository(), root).unwrap();
    engine.set_root(Some(root));

    engine.pick(8, 8).unwrap().expect("hit");
    engine.render_frame_at(0.0).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Adaptive Redraw
// ============================================================================

#[test]
fn scene_adaptive_redraw_reuses_image() {
    let mut engine = engine(48, 48);
    let draws = Arc::new(AtomicUsize::new(0));
    let counter = node::insert(engine.repository(), Counter::new(&draws)).unwrap();

    let mut scene = Scene::new();
    scene.set_viewport(Some(ViewportSpec::absolute(8, 8, 32, 32)));
    scene.enable_adaptive_redraw(true);
    scene.add(node::insert(engine.repository(), Color::rgb(0.0, 0.0, 1.0)).unwrap());
    scene.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 1.0, 1.0)).unwrap());
    scene.add(counter.clone());
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene.clone()));
    engine.set_clear_color(BLACK);

    let snapshot = |engine: &Engine<SoftwareDevice>| -> Vec<Option<[u8; 4]>> {
        (0..48)
            .flat_map(|y| (0..48).map(move |x| (x, y)))
            .map(|(x, y)| engine.device().pixel(x, y))
            .collect()
    };

    engine.render_frame_at(0.0).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 1);
    assert!(scene.with_scene(|s| s.redraw_cache().has_image()).unwrap());
    let first = snapshot(&engine);

    engine.render_frame_at(0.1).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot(&engine), first);

    counter.with(|n| n.set_content_changed(true, true, false));
    engine.render_frame_at(0.2).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 2);
    assert_eq!(snapshot(&engine), first);
}

#[test]
fn scene_adaptive_redraw_follows_viewport_size() {
    let mut engine = engine(32, 32);
    let draws = Arc::new(AtomicUsize::new(0));

    let mut scene = Scene::new();
    scene.set_viewport(Some(ViewportSpec::relative(0.0, 0.0, 0.5, 0.5)));
    scene.enable_adaptive_redraw(true);
    scene.add(node::insert(engine.repository(), Counter::new(&draws)).unwrap());
    let scene = node::insert(engine.repository(), scene).unwrap();

    let mut root = Scene::new();
    root.add(scene);
    let root = node::insert(engine.repository(), root).unwrap();
    engine.set_root(Some(root.clone()));

    engine.render_frame_at(0.0).unwrap();
    engine.render_frame_at(0.1).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 1);

    // Shrinking the enclosing view changes the cached viewport's size.
    root.with_scene(|s| s.set_viewport(Some(ViewportSpec::absolute(0, 0, 20, 20))));
    engine.render_frame_at(0.2).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 2);
}

#[test]
fn scene_adaptive_redraw_redraws_on_pick_change() {
    let mut engine = engine(48, 48);
    let draws = Arc::new(AtomicUsize::new(0));

    let mut scene = Scene::new();
    scene.set_viewport(Some(ViewportSpec::absolute(8, 8, 32, 32)));
    scene.set_pickable(true);
    scene.enable_adaptive_redraw(true);
    scene.add(full_rect(&engine));
    scene.add(node::insert(engine.repository(), Counter::new(&draws)).unwrap());
    let scene = node::insert(engine.repository(), scene).unwrap();
    engine.set_root(Some(scene.clone()));

    engine.render_frame_at(0.0).unwrap();
    engine.render_frame_at(0.1).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 1);

    // Picking the scene changes its pick state but not its content.
    assert!(engine.pick(24, 24).unwrap().is_some());
    assert!(!scene.with_scene(|s| s.list().is_content_changed()).unwrap());
    engine.render_frame_at(0.2).unwrap();
    assert_eq!(pick_state(&scene), PickState::PickedActive);
    assert_eq!(draws.load(Ordering::SeqCst), 2);

    engine.render_frame_at(0.3).unwrap();
    assert_eq!(draws.load(Ordering::SeqCst), 2);

    // Releasing the pick invalidates the cache again.
    assert!(engine.pick(2, 2).unwrap().is_none());
    engine.render_frame_at(0.4).unwrap();
    assert_eq!(pick_state(&scene), PickState::Idle);
    assert_eq!(draws.load(Ordering::SeqCst), 3);
}
