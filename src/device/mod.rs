//! Graphics Device
//!
//! The traversal talks to the graphics API exclusively through the
//! [`GraphicsDevice`] trait: an immediate-mode state machine with a current
//! viewport, scissor box, depth range, three matrix modes and a bound draw
//! target. [`SoftwareDevice`] implements it on CPU framebuffers.

pub mod matrix_stack;
pub mod software;
pub mod transform;

pub use matrix_stack::MatrixStack;
pub use software::SoftwareDevice;

use bitflags::bitflags;
use glam::DMat4;

use crate::errors::Result;

/// Pixel rectangle `[x, y, width, height]`, origin at the bottom left.
pub type PixelRect = [i32; 4];

/// Matrix slot addressed by load/get/push/pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    ModelView,
    Projection,
    Texture,
}

impl MatrixMode {
    pub const ALL: [MatrixMode; 3] = [
        MatrixMode::ModelView,
        MatrixMode::Projection,
        MatrixMode::Texture,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            MatrixMode::ModelView => 0,
            MatrixMode::Projection => 1,
            MatrixMode::Texture => 2,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            MatrixMode::ModelView => "modelview",
            MatrixMode::Projection => "projection",
            MatrixMode::Texture => "texture",
        }
    }
}

bitflags! {
    /// Buffers affected by [`GraphicsDevice::clear`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Identifies an off-screen surface created by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// What a surface stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// RGBA8 color attachment.
    Color,
    /// Combined depth/stencil attachment.
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    /// `0` for a single-sample surface.
    pub samples: u32,
    pub kind: SurfaceKind,
}

/// The immediate-mode graphics API seen by the scene traversal.
pub trait GraphicsDevice {
    // --- viewport, scissor, depth ------------------------------------------
    fn viewport(&self) -> PixelRect;
    fn set_viewport(&mut self, rect: PixelRect);

    fn scissor_box(&self) -> PixelRect;
    fn set_scissor_box(&mut self, rect: PixelRect);
    fn scissor_enabled(&self) -> bool;
    fn set_scissor_enabled(&mut self, enabled: bool);

    fn depth_range(&self) -> (f64, f64);
    fn set_depth_range(&mut self, near: f64, far: f64);

    // --- matrices ------------------------------------------------------------
    fn matrix(&self, mode: MatrixMode) -> DMat4;
    fn load_matrix(&mut self, mode: MatrixMode, matrix: DMat4);

    /// Post-multiplies the current matrix of `mode`.
    fn mult_matrix(&mut self, mode: MatrixMode, matrix: DMat4) {
        let current = self.matrix(mode);
        self.load_matrix(mode, current * matrix);
    }

    // --- framebuffer -----------------------------------------------------------
    fn set_clear_color(&mut self, rgba: [u8; 4]);
    fn clear(&mut self, flags: ClearFlags);

    /// Fills a window-space rectangle of the bound target, clipped to the
    /// viewport and, if enabled, the scissor box.
    fn fill_rect(&mut self, rect: PixelRect, rgba: [u8; 4]);

    /// Reads RGBA8 pixels from the bound target, rows bottom to top.
    fn read_pixels(&mut self, rect: PixelRect) -> Result<Vec<u8>>;

    /// Writes RGBA8 pixels (rows bottom to top) with their lower left corner
    /// at `(x, y)`, each source pixel scaled by the pixel zoom.
    fn draw_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]);

    fn pixel_zoom(&self) -> (f64, f64);
    fn set_pixel_zoom(&mut self, x: f64, y: f64);

    /// Size of the bound target.
    fn target_size(&self) -> (u32, u32);

    // --- surfaces ---------------------------------------------------------------
    fn max_samples(&self) -> u32;
    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceId>;
    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Binds a color surface for drawing and reading; `None` binds the
    /// default output.
    fn bind_target(&mut self, color: Option<SurfaceId>, depth: Option<SurfaceId>);
    fn bound_target(&self) -> Option<SurfaceId>;

    /// Resolves a multisampled color surface into a single-sample one.
    fn resolve(&mut self, from: SurfaceId, to: SurfaceId) -> Result<()>;
}
