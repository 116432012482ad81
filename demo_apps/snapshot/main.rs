//! Snapshot demo.
//!
//! Builds a bar chart with an inset legend, draws it into a multisampled
//! off-screen target, saves the resolved image and then picks one bar.
//!
//! ```text
//! cargo run -p snapshot -- out.png
//! VIZGRAPH_SETTINGS=settings.json cargo run -p snapshot
//! ```

use anyhow::Context;
use glam::DVec3;
use vizgraph::node::{self, Color, Rect, RectBatch, RectGeometry};
use vizgraph::scene::viewport::Borders;
use vizgraph::scene::{Projection, ViewportSpec};
use vizgraph::{Engine, EngineSettings, NodeHandle, NodeHandleExt, NodeList, NodeRepository, RenderTarget, Scene, SoftwareDevice};

const SIZE: u32 = 256;

fn load_settings() -> anyhow::Result<EngineSettings> {
    match std::env::var("VIZGRAPH_SETTINGS") {
        Ok(path) => EngineSettings::from_json_file(&path).with_context(|| format!("reading settings from {path}")),
        Err(_) => Ok(EngineSettings::default()),
    }
}

fn bars(repo: &NodeRepository) -> anyhow::Result<NodeHandle> {
    let heights = [0.4, 0.9, 0.6, 1.3];
    let parts = heights
        .iter()
        .enumerate()
        .map(|(i, h)| RectGeometry::new(-0.9 + 0.45 * i as f64, -0.9, 0.3, *h))
        .collect();

    let mut chart = Scene::new().named("chart");
    chart.set_pickable(true);
    chart.set_projection(Some(Projection::Ortho {
        left: -1.0,
        right: 1.0,
        bottom: -1.0,
        top: 1.0,
        near: -1.0,
        far: 1.0,
        fit_viewport_aspect: true,
    }));
    chart.add(node::insert(repo, Color::rgb(0.2, 0.5, 0.9))?);
    chart.add(node::insert(repo, RectBatch::new(parts).with_highlight([1.0, 0.6, 0.1, 1.0]))?);
    Ok(node::insert(repo, chart)?)
}

fn legend(repo: &NodeRepository) -> anyhow::Result<NodeHandle> {
    let mut legend = Scene::new().named("legend");
    legend.set_viewport(Some(
        ViewportSpec::absolute(SIZE as i32 - 72, SIZE as i32 - 40, 64, 32).with_borders(Borders::uniform(2)),
    ));
    legend.set_projection(Some(Projection::Pixel));
    legend.set_reset_frame(true);
    legend.add(node::insert(repo, Color::rgb(0.9, 0.9, 0.9))?);
    legend.add(node::insert(repo, Rect::new(-30.0, -14.0, 60.0, 28.0))?);
    Ok(node::insert(repo, legend)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "snapshot.png".to_owned());

    let _lease = vizgraph::registry::acquire();
    let mut engine = Engine::new(SoftwareDevice::new(SIZE, SIZE), load_settings()?);
    engine.set_clear_color([24, 24, 28, 255]);
    let repo = engine.repository().clone();

    let mut target = RenderTarget::new();
    target
        .create(engine.device_mut(), SIZE, SIZE, 4)
        .context("creating the off-screen target")?;
    target.enable_single_render_to_file(None, &path);
    let target = node::insert(&repo, target)?;

    let frame = vizgraph::registry::create("Frame").context("Frame is a built-in kind")?;
    let frame = repo.new_resource(frame)?;
    frame.with(|n| {
        if let Some(frame) = n.as_frame_mut() {
            frame.translate(DVec3::new(0.0, 0.05, 0.0));
        }
    });

    let mut root = NodeList::new().named("root");
    root.add(target.clone());
    root.add(frame);
    root.add(bars(&repo)?);
    root.add(legend(&repo)?);
    // A target without surfaces switches back to the window.
    root.add(node::insert(&repo, RenderTarget::new())?);
    engine.set_root(Some(node::insert(&repo, root)?));

    engine.render_frame().context("rendering the snapshot")?;
    let saved = target
        .with_render_target(|t| t.is_render_to_file_successful())
        .unwrap_or(false);
    anyhow::ensure!(saved, "could not save {path}");

    match engine.pick(64, 64)? {
        Some(hit) => log::info!("Picked {:?} part {} along {:?}", hit.node(), hit.part_id, hit.path),
        None => log::info!("Nothing under the cursor"),
    }
    let animating = engine.render_frame()?;
    log::info!("Second frame rendered, animating: {animating}");
    Ok(())
}
