//! Off-screen Render Targets
//!
//! A [`RenderTarget`] node redirects all drawing that follows it in the
//! traversal into an off-screen color surface until another target is
//! applied or the render loop finalizes it. At most one target is active at
//! a time: activating a target finalizes the one recorded in
//! [`ApplyContext::current_target`] first.
//!
//! Multisampled targets carry an extra single-sample surface that the color
//! image is resolved into before it can be read back.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{DMat4, DVec3};
use parking_lot::Mutex;

use crate::context::ApplyContext;
use crate::device::{ClearFlags, GraphicsDevice, MatrixMode, PixelRect, SurfaceDesc, SurfaceId, SurfaceKind};
use crate::errors::{Result, ResultExt, VizError};
use crate::image::{FileImageEncoder, Image, ImageEncoder, RenderToFileRequest};
use crate::node::{ApplyMode, Node, NodeCore, NodeHandle, NodeHandleExt};

/// Device state saved on activation.
#[derive(Debug, Clone, Copy)]
struct SavedView {
    viewport: PixelRect,
    scissor: PixelRect,
    scissor_enabled: bool,
    projection: DMat4,
}

/// Surfaces and activation state of a render target, shared with the
/// context while the target is active.
pub struct TargetState {
    color: Option<SurfaceId>,
    depth: Option<SurfaceId>,
    resolve: Option<SurfaceId>,
    width: u32,
    height: u32,
    samples: u32,

    saved: Option<SavedView>,
    apply_count: u32,

    request: Option<RenderToFileRequest>,
    snapshot_scene: Option<NodeHandle>,
    last_success: bool,
    encoder: Box<dyn ImageEncoder>,
}

impl std::fmt::Debug for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetState")
            .field("color", &self.color)
            .field("resolve", &self.resolve)
            .field("size", &(self.width, self.height))
            .field("samples", &self.samples)
            .field("apply_count", &self.apply_count)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            color: None,
            depth: None,
            resolve: None,
            width: 0,
            height: 0,
            samples: 0,
            saved: None,
            apply_count: 0,
            request: None,
            snapshot_scene: None,
            last_success: false,
            encoder: Box::new(FileImageEncoder),
        }
    }
}

impl TargetState {
    /// True for the default output, which has no surfaces of its own.
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.color.is_none()
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    #[must_use]
    pub fn color_surface(&self) -> Option<SurfaceId> {
        self.color
    }

    #[must_use]
    pub fn resolve_surface(&self) -> Option<SurfaceId> {
        self.resolve
    }

    #[must_use]
    pub fn apply_count(&self) -> u32 {
        self.apply_count
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    fn activate(&mut self, ctx: &mut ApplyContext<'_>) {
        let device = &mut *ctx.device;
        let viewport = device.viewport();
        let projection = device.matrix(MatrixMode::Projection);
        self.saved = Some(SavedView {
            viewport,
            scissor: device.scissor_box(),
            scissor_enabled: device.scissor_enabled(),
            projection,
        });

        device.bind_target(self.color, self.depth);
        device.set_scissor_enabled(false);
        let full = [0, 0, self.width as i32, self.height as i32];
        device.set_viewport(full);

        // Keep the aspect ratio of the viewport the target replaces.
        let ratio_x = f64::from(viewport[2]) / f64::from(self.width.max(1));
        let ratio_y = f64::from(viewport[3]) / f64::from(self.height.max(1));
        let scale = if ratio_x > ratio_y {
            DVec3::new(1.0, ratio_y / ratio_x, 1.0)
        } else if ratio_y > 0.0 {
            DVec3::new(ratio_x / ratio_y, 1.0, 1.0)
        } else {
            DVec3::ONE
        };
        device.mult_matrix(MatrixMode::Projection, DMat4::from_scale(scale));

        if ctx.pass.first {
            if self.apply_count == 0 {
                device.clear(ClearFlags::all());
            }
            self.apply_count += 1;
        }
        log::trace!("Render target {:?} activated ({} applies)", self.color, self.apply_count);
    }

    /// Rebinds the default output and restores the state saved on
    /// activation. In the last pass the final finalize of a frame runs a
    /// pending render-to-file request; its outcome is reported through
    /// [`RenderTarget::is_render_to_file_successful`].
    ///
    /// Finalizing an inactive target only rebinds the default output.
    pub fn finalize(&mut self, device: &mut dyn GraphicsDevice, last_pass: bool) -> Result<()> {
        device.bind_target(None, None);

        if last_pass {
            self.apply_count = self.apply_count.saturating_sub(1);
            if self.apply_count == 0 {
                if let Some(request) = self.request.take() {
                    self.export(device, &request);
                }
            }
        }

        if let Some(saved) = self.saved.take() {
            device.set_viewport(saved.viewport);
            device.load_matrix(MatrixMode::Projection, saved.projection);
            if saved.scissor_enabled {
                device.set_scissor_box(saved.scissor);
                device.set_scissor_enabled(true);
            }
        }
        log::trace!("Render target {:?} finalized", self.color);
        Ok(())
    }

    fn export(&mut self, device: &mut dyn GraphicsDevice, request: &RenderToFileRequest) {
        if let Some(scene) = self.snapshot_scene.take() {
            if scene.with_scene(|s| s.set_draw(false)).is_none() {
                log::warn!("Snapshot scene {scene:?} is not a reachable scene");
            }
        }

        let saved = self
            .get_image(device)
            .and_then(|image| self.encoder.save(&image, &request.path));
        self.last_success = saved.is_ok();
        match saved {
            Ok(()) => log::info!("Render target saved to {}", request.path.display()),
            Err(err) => log::warn!("Render to file {} failed: {err}", request.path.display()),
        }
    }

    /// Reads the full color image, resolving a multisampled surface first.
    /// Rows of the returned image run top to bottom.
    pub fn get_image(&self, device: &mut dyn GraphicsDevice) -> Result<Image> {
        let color = self.color.ok_or(VizError::NoImageData)?;
        let source = if self.samples > 0 {
            let resolve = self.resolve.ok_or(VizError::NoResolveSurface)?;
            device.resolve(color, resolve)?;
            resolve
        } else {
            color
        };

        let bound = device.bound_target();
        device.bind_target(Some(source), None);
        let pixels = device.read_pixels([0, 0, self.width as i32, self.height as i32]);
        device.bind_target(bound, None);
        Image::from_bottom_up(self.width, self.height, &pixels?)
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for surface in [self.color.take(), self.depth.take(), self.resolve.take()]
            .into_iter()
            .flatten()
        {
            device.destroy_surface(surface);
        }
        self.width = 0;
        self.height = 0;
        self.samples = 0;
        self.saved = None;
        self.apply_count = 0;
    }
}

/// Node that makes an off-screen surface the drawing target.
pub struct RenderTarget {
    core: NodeCore,
    state: Arc<Mutex<TargetState>>,
    enabled: bool,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTarget {
    /// A target without surfaces. Applying it switches back to the default
    /// output until [`create`](Self::create) is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: NodeCore::new("RenderTarget"),
            state: Arc::new(Mutex::new(TargetState::default())),
            enabled: true,
        }
    }

    /// Allocates the color and depth/stencil surfaces, plus a resolve
    /// surface if `samples > 0`. The sample count is clamped to the device
    /// maximum. Existing surfaces are released first.
    pub fn create(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32, samples: u32) -> Result<()> {
        let samples = samples.min(device.max_samples());
        let mut state = self.state.lock();
        state.release(device);

        let what = format!("render target {width}x{height}");
        let color = device
            .create_surface(SurfaceDesc {
                width,
                height,
                samples,
                kind: SurfaceKind::Color,
            })
            .context(format!("Error creating color surface of {what}"))?;
        let depth = device.create_surface(SurfaceDesc {
            width,
            height,
            samples,
            kind: SurfaceKind::DepthStencil,
        });
        let depth = match depth {
            Ok(depth) => depth,
            Err(err) => {
                device.destroy_surface(color);
                return Err::<(), _>(err).context(format!("Error creating depth surface of {what}"));
            }
        };
        let resolve = if samples > 0 {
            let resolve = device.create_surface(SurfaceDesc {
                width,
                height,
                samples: 0,
                kind: SurfaceKind::Color,
            });
            match resolve {
                Ok(resolve) => Some(resolve),
                Err(err) => {
                    device.destroy_surface(color);
                    device.destroy_surface(depth);
                    return Err::<(), _>(err).context(format!("Error creating resolve surface of {what}"));
                }
            }
        } else {
            None
        };

        state.color = Some(color);
        state.depth = Some(depth);
        state.resolve = resolve;
        state.width = width;
        state.height = height;
        state.samples = samples;
        log::debug!("Created {what} with {samples} samples");
        Ok(())
    }

    /// Releases the surfaces. The node then acts as the default output.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.state.lock().release(device);
    }

    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// State shared with the context while the target is active.
    #[must_use]
    pub fn state(&self) -> &Arc<Mutex<TargetState>> {
        &self.state
    }

    /// Exports the image at the end of the next frame that draws into this
    /// target. `scene` is switched on now and off again after the export.
    pub fn enable_single_render_to_file(&mut self, scene: Option<NodeHandle>, path: impl Into<PathBuf>) {
        if let Some(scene) = &scene {
            if scene.with_scene(|s| s.set_draw(true)).is_none() {
                log::warn!("Snapshot scene {scene:?} is not a reachable scene");
            }
        }
        let mut state = self.state.lock();
        state.snapshot_scene = scene;
        state.request = Some(RenderToFileRequest { path: path.into() });
        state.last_success = false;
    }

    #[must_use]
    pub fn is_render_to_file_pending(&self) -> bool {
        self.state.lock().request.is_some()
    }

    #[must_use]
    pub fn is_render_to_file_successful(&self) -> bool {
        self.state.lock().last_success
    }

    /// Replaces the encoder used for render-to-file.
    pub fn set_encoder(&mut self, encoder: Box<dyn ImageEncoder>) {
        self.state.lock().encoder = encoder;
    }

    pub fn get_image(&self, device: &mut dyn GraphicsDevice) -> Result<Image> {
        self.state.lock().get_image(device)
    }

    pub fn finalize(&self, device: &mut dyn GraphicsDevice, last_pass: bool) -> Result<()> {
        self.state.lock().finalize(device, last_pass)
    }
}

impl Node for RenderTarget {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if mode == ApplyMode::Pick || !self.enabled {
            return Ok(true);
        }

        if let Some(active) = ctx.current_target.take() {
            active
                .lock()
                .finalize(ctx.device, ctx.pass.last)
                .context("Error finalizing active render target")?;
        }

        let mut state = self.state.lock();
        if state.is_default() {
            ctx.device.bind_target(None, None);
            return Ok(true);
        }
        state.activate(ctx);
        drop(state);
        ctx.current_target = Some(Arc::clone(&self.state));
        Ok(true)
    }

    /// The copy starts without surfaces.
    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            state: Arc::new(Mutex::new(TargetState::default())),
            enabled: self.enabled,
        })
    }

    fn as_render_target(&self) -> Option<&RenderTarget> {
        Some(self)
    }

    fn as_render_target_mut(&mut self) -> Option<&mut RenderTarget> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    #[test]
    fn test_samples_are_clamped() {
        let mut device = SoftwareDevice::new(8, 8).with_max_samples(4);
        let mut target = RenderTarget::new();
        target.create(&mut device, 16, 16, 16).unwrap();
        let state = target.state().lock();
        assert_eq!(state.samples(), 4);
        assert!(state.resolve_surface().is_some());
        assert_eq!(device.surface_count(), 3);
    }

    #[test]
    fn test_allocation_failure_releases_partial_surfaces() {
        let mut device = SoftwareDevice::new(8, 8);
        device.set_allocation_budget(Some(1));
        let mut target = RenderTarget::new();
        let err = target.create(&mut device, 16, 16, 0).unwrap_err();
        assert!(matches!(err.root_cause(), VizError::AllocationFailed { .. }));
        assert_eq!(device.surface_count(), 0);
    }

    #[test]
    fn test_get_image_without_surface() {
        let mut device = SoftwareDevice::new(8, 8);
        let target = RenderTarget::new();
        assert!(matches!(target.get_image(&mut device), Err(VizError::NoImageData)));
    }

    #[test]
    fn test_copy_has_no_surfaces() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut target = RenderTarget::new();
        target.create(&mut device, 4, 4, 0).unwrap();
        let copy = target.copy();
        let copy = copy.as_render_target().unwrap();
        assert!(copy.state().lock().is_default());
    }
}
