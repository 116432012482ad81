//! Render Target Integration Tests
//!
//! Tests for:
//! - Activation and finalization of chained targets
//! - Drawing into off-screen surfaces
//! - Multisample resolve on read-back
//! - Single-shot render to file

use std::path::PathBuf;

use glam::{DMat4, DVec3};
use vizgraph::device::MatrixMode;
use vizgraph::node::{self, Rect};
use vizgraph::pick::{PickNameStack, PickSelection};
use vizgraph::{
    ApplyContext, ApplyMode, Engine, EngineSettings, GraphicsDevice, Image, ImageEncoder, Node, NodeHandle,
    NodeHandleExt, NodeList, RenderTarget, Result, Scene, SoftwareDevice, VizError,
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn engine(width: u32, height: u32) -> Engine<SoftwareDevice> {
    let mut engine = Engine::new(SoftwareDevice::new(width, height), EngineSettings::default());
    engine.set_clear_color(BLACK);
    engine
}

fn target(engine: &mut Engine<SoftwareDevice>, width: u32, height: u32, samples: u32) -> NodeHandle {
    let mut target = RenderTarget::new();
    target.create(engine.device_mut(), width, height, samples).unwrap();
    node::insert(engine.repository(), target).unwrap()
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn temp_png(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vizgraph-{}-{name}.png", std::process::id()))
}

// ============================================================================
// Activation
// ============================================================================

#[test]
fn target_chain_restores_state_before_first() {
    let mut device = SoftwareDevice::new(64, 64);
    let mut a = RenderTarget::new();
    a.create(&mut device, 16, 16, 0).unwrap();
    let mut b = RenderTarget::new();
    b.create(&mut device, 32, 8, 0).unwrap();
    let a_color = a.state().lock().color_surface();
    let b_color = b.state().lock().color_surface();

    let projection = DMat4::from_scale(DVec3::new(2.0, 2.0, 1.0));
    device.set_viewport([2, 2, 30, 30]);
    device.set_scissor_box([1, 1, 10, 10]);
    device.set_scissor_enabled(true);
    device.load_matrix(MatrixMode::Projection, projection);

    let settings = EngineSettings::default();
    let mut names = PickNameStack::default();
    let mut selection = PickSelection::new();
    {
        let mut ctx = ApplyContext::new(&mut device, &settings, &mut names, &mut selection);

        assert!(a.apply(ApplyMode::Draw, &mut ctx).unwrap());
        assert_eq!(ctx.device.bound_target(), a_color);
        assert_eq!(ctx.device.viewport(), [0, 0, 16, 16]);
        assert!(!ctx.device.scissor_enabled());

        assert!(b.apply(ApplyMode::Draw, &mut ctx).unwrap());
        assert_eq!(ctx.device.bound_target(), b_color);
        assert_eq!(ctx.device.viewport(), [0, 0, 32, 8]);
        assert!(!a.state().lock().is_active());

        let active = ctx.current_target.take().expect("b is active");
        active.lock().finalize(ctx.device, true).unwrap();
        a.finalize(ctx.device, true).unwrap();
    }

    assert_eq!(device.bound_target(), None);
    assert_eq!(device.viewport(), [2, 2, 30, 30]);
    assert_eq!(device.scissor_box(), [1, 1, 10, 10]);
    assert!(device.scissor_enabled());
    assert_eq!(device.matrix(MatrixMode::Projection), projection);
}

#[test]
fn target_is_ignored_in_pick_passes() {
    let mut engine = engine(16, 16);
    let target = target(&mut engine, 8, 8, 0);
    let rect = node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 2.0)).unwrap();
    let mut root = NodeList::new();
    root.add(target);
    root.add(rect.clone());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));

    let hit = engine.pick(4, 4).unwrap().expect("drawn into the default output");
    assert_eq!(hit.node(), rect.node_id());
}

#[test]
fn target_receives_following_drawing() {
    let mut engine = engine(32, 32);
    let target = target(&mut engine, 16, 16, 0);
    let mut root = NodeList::new();
    root.add(target.clone());
    root.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 1.0)).unwrap());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));

    engine.render_frame_at(0.0).unwrap();

    let color = target
        .with_render_target(|t| t.state().lock().color_surface())
        .flatten()
        .unwrap();
    let device = engine.device();
    assert_eq!(device.surface_pixel(color, 3, 3), Some(WHITE));
    assert_eq!(device.surface_pixel(color, 3, 12), Some(BLACK));
    assert_eq!(device.pixel(3, 3), Some(BLACK));
    assert_eq!(device.bound_target(), None);
    assert_eq!(device.viewport(), [0, 0, 32, 32]);
    assert_eq!(target.with_render_target(|t| t.state().lock().apply_count()), Some(0));
}

#[test]
fn target_without_surfaces_acts_as_default_output() {
    let mut engine = engine(16, 16);
    let empty = node::insert(engine.repository(), RenderTarget::new()).unwrap();
    let mut root = NodeList::new();
    root.add(empty);
    root.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 2.0)).unwrap());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));

    engine.render_frame_at(0.0).unwrap();
    assert_eq!(engine.device().pixel(8, 8), Some(WHITE));
}

// ============================================================================
// Read-back
// ============================================================================

#[test]
fn target_multisampled_image_is_resolved() {
    let mut engine = engine(32, 32);
    let handle = target(&mut engine, 8, 8, 4);
    let mut root = NodeList::new();
    root.add(handle.clone());
    root.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 1.0)).unwrap());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));
    engine.render_frame_at(0.0).unwrap();

    let image = handle
        .with(|node| {
            let target = node.as_render_target().expect("render target");
            target.get_image(engine.device_mut())
        })
        .unwrap()
        .unwrap();
    assert_eq!(image.size(), (8, 8));
    // Rows run top to bottom.
    assert_eq!(image.pixel(0, 7), Some(WHITE));
    assert_eq!(image.pixel(0, 0), Some(BLACK));
}

#[test]
fn target_destroyed_has_no_image() {
    let mut engine = engine(8, 8);
    let mut target = RenderTarget::new();
    target.create(engine.device_mut(), 4, 4, 0).unwrap();
    target.destroy(engine.device_mut());
    assert_eq!(engine.device().surface_count(), 0);
    assert!(matches!(target.get_image(engine.device_mut()), Err(VizError::NoImageData)));
}

#[test]
fn target_allocation_failure_is_an_error() {
    let mut engine = engine(8, 8);
    engine.device_mut().set_allocation_budget(Some(2));
    let mut target = RenderTarget::new();
    let err = target.create(engine.device_mut(), 4, 4, 2).unwrap_err();
    assert!(matches!(err.root_cause(), VizError::AllocationFailed { .. }));
    assert_eq!(engine.device().surface_count(), 0);
    assert!(target.state().lock().is_default());
}

// ============================================================================
// Render To File
// ============================================================================

#[test]
fn target_renders_to_file_once() -> anyhow::Result<()> {
    init_logger();
    let mut engine = engine(32, 32);
    let handle = target(&mut engine, 8, 8, 0);
    let snapshot = node::insert(engine.repository(), Scene::new()).unwrap();
    let path = temp_png("once");
    let _ = std::fs::remove_file(&path);

    handle.with_render_target(|t| t.enable_single_render_to_file(Some(snapshot.clone()), &path));
    assert_eq!(snapshot.with_scene(|s| s.is_drawn()), Some(true));

    let mut root = NodeList::new();
    root.add(handle.clone());
    root.add(node::insert(engine.repository(), Rect::new(-1.0, -1.0, 2.0, 1.0)).unwrap());
    root.add(snapshot.clone());
    engine.set_root(Some(node::insert(engine.repository(), root).unwrap()));

    engine.render_frame_at(0.0)?;

    assert_eq!(handle.with_render_target(|t| t.is_render_to_file_pending()), Some(false));
    assert_eq!(handle.with_render_target(|t| t.is_render_to_file_successful()), Some(true));
    assert_eq!(snapshot.with_scene(|s| s.is_drawn()), Some(false));

    let saved = image::open(&path)?.to_rgba8();
    assert_eq!(saved.dimensions(), (8, 8));
    assert_eq!(saved.get_pixel(0, 7).0, WHITE);
    assert_eq!(saved.get_pixel(0, 0).0, BLACK);
    std::fs::remove_file(&path)?;

    engine.render_frame_at(0.1)?;
    assert!(!path.exists());
    Ok(())
}

#[test]
fn target_reports_failed_export() {
    struct Failing;

    impl ImageEncoder for Failing {
        fn save(&self, _image: &Image, _path: &std::path::Path) -> Result<()> {
            Err(VizError::Device("disk full".into()))
        }
    }

    init_logger();
    let mut engine = engine(16, 16);
    let handle = target(&mut engine, 4, 4, 0);
    handle.with_render_target(|t| {
        t.set_encoder(Box::new(Failing));
        t.enable_single_render_to_file(None, temp_png("failing"));
    });
    engine.set_root(Some(handle.clone()));

    engine.render_frame_at(0.0).unwrap();
    assert_eq!(handle.with_render_target(|t| t.is_render_to_file_pending()), Some(false));
    assert_eq!(handle.with_render_target(|t| t.is_render_to_file_successful()), Some(false));
}
