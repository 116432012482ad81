//! CPU reference implementation of [`GraphicsDevice`].
//!
//! Color buffers are RGBA8 with the origin at the bottom left. Multisampled
//! surfaces store one sample per pixel and cannot be read before a resolve,
//! matching the behavior of hardware multisample targets.

use glam::DMat4;
use rustc_hash::FxHashMap;

use super::{ClearFlags, GraphicsDevice, MatrixMode, PixelRect, SurfaceDesc, SurfaceId, SurfaceKind};
use crate::errors::{Result, VizError};

#[derive(Debug, Clone)]
struct Framebuffer {
    width: u32,
    height: u32,
    samples: u32,
    pixels: Vec<[u8; 4]>,
}

impl Framebuffer {
    fn new(width: u32, height: u32, samples: u32) -> Self {
        Self {
            width,
            height,
            samples,
            pixels: vec![[0; 4]; (width as usize) * (height as usize)],
        }
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

#[derive(Debug)]
struct Surface {
    desc: SurfaceDesc,
    color: Option<Framebuffer>,
}

/// Software rasterizer for axis-aligned rectangles and pixel transfers.
#[derive(Debug)]
pub struct SoftwareDevice {
    default_target: Framebuffer,
    surfaces: FxHashMap<SurfaceId, Surface>,
    next_surface: u32,
    bound: Option<SurfaceId>,

    viewport: PixelRect,
    scissor_box: PixelRect,
    scissor_enabled: bool,
    depth_range: (f64, f64),
    matrices: [DMat4; 3],
    clear_color: [u8; 4],
    pixel_zoom: (f64, f64),

    max_samples: u32,
    /// Remaining surface allocations before creation fails; `None` is unlimited.
    allocation_budget: Option<usize>,
    fill_count: u64,
}

impl SoftwareDevice {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let full = [0, 0, width as i32, height as i32];
        Self {
            default_target: Framebuffer::new(width, height, 0),
            surfaces: FxHashMap::default(),
            next_surface: 1,
            bound: None,
            viewport: full,
            scissor_box: full,
            scissor_enabled: false,
            depth_range: (0.0, 1.0),
            matrices: [DMat4::IDENTITY; 3],
            clear_color: [0, 0, 0, 0],
            pixel_zoom: (1.0, 1.0),
            max_samples: 8,
            allocation_budget: None,
            fill_count: 0,
        }
    }

    /// Caps the sample count reported by [`GraphicsDevice::max_samples`].
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: u32) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Lets only `budget` more surface allocations succeed.
    pub fn set_allocation_budget(&mut self, budget: Option<usize>) {
        self.allocation_budget = budget;
    }

    /// Number of [`GraphicsDevice::fill_rect`] calls so far.
    #[inline]
    #[must_use]
    pub fn fill_count(&self) -> u64 {
        self.fill_count
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    #[must_use]
    pub fn surface_desc(&self, surface: SurfaceId) -> Option<SurfaceDesc> {
        self.surfaces.get(&surface).map(|s| s.desc)
    }

    /// Pixel of the default output.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        self.default_target
            .index(x, y)
            .map(|i| self.default_target.pixels[i])
    }

    /// Pixel of an off-screen color surface.
    #[must_use]
    pub fn surface_pixel(&self, surface: SurfaceId, x: i32, y: i32) -> Option<[u8; 4]> {
        let fb = self.surfaces.get(&surface)?.color.as_ref()?;
        fb.index(x, y).map(|i| fb.pixels[i])
    }

    fn target(&self) -> Option<&Framebuffer> {
        match self.bound {
            None => Some(&self.default_target),
            Some(id) => self.surfaces.get(&id).and_then(|s| s.color.as_ref()),
        }
    }

    fn target_mut(&mut self) -> Option<&mut Framebuffer> {
        match self.bound {
            None => Some(&mut self.default_target),
            Some(id) => self.surfaces.get_mut(&id).and_then(|s| s.color.as_mut()),
        }
    }

    /// Intersection of `rect` with the viewport and the enabled scissor box.
    fn clip(&self, rect: PixelRect) -> Option<PixelRect> {
        let mut out = intersect(rect, self.viewport)?;
        if self.scissor_enabled {
            out = intersect(out, self.scissor_box)?;
        }
        Some(out)
    }
}

fn intersect(a: PixelRect, b: PixelRect) -> Option<PixelRect> {
    let x0 = a[0].max(b[0]);
    let y0 = a[1].max(b[1]);
    let x1 = (a[0] + a[2]).min(b[0] + b[2]);
    let y1 = (a[1] + a[3]).min(b[1] + b[3]);
    (x1 > x0 && y1 > y0).then_some([x0, y0, x1 - x0, y1 - y0])
}

impl GraphicsDevice for SoftwareDevice {
    fn viewport(&self) -> PixelRect {
        self.viewport
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.viewport = rect;
    }

    fn scissor_box(&self) -> PixelRect {
        self.scissor_box
    }

    fn set_scissor_box(&mut self, rect: PixelRect) {
        self.scissor_box = rect;
    }

    fn scissor_enabled(&self) -> bool {
        self.scissor_enabled
    }

    fn set_scissor_enabled(&mut self, enabled: bool) {
        self.scissor_enabled = enabled;
    }

    fn depth_range(&self) -> (f64, f64) {
        self.depth_range
    }

    fn set_depth_range(&mut self, near: f64, far: f64) {
        self.depth_range = (near.clamp(0.0, 1.0), far.clamp(0.0, 1.0));
    }

    fn matrix(&self, mode: MatrixMode) -> DMat4 {
        self.matrices[mode.index()]
    }

    fn load_matrix(&mut self, mode: MatrixMode, matrix: DMat4) {
        self.matrices[mode.index()] = matrix;
    }

    fn set_clear_color(&mut self, rgba: [u8; 4]) {
        self.clear_color = rgba;
    }

    fn clear(&mut self, flags: ClearFlags) {
        if !flags.contains(ClearFlags::COLOR) {
            return;
        }
        let color = self.clear_color;
        let region = if self.scissor_enabled {
            Some(self.scissor_box)
        } else {
            None
        };
        let Some(fb) = self.target_mut() else {
            return;
        };
        let full = [0, 0, fb.width as i32, fb.height as i32];
        let Some(area) = region.map_or(Some(full), |r| intersect(r, full)) else {
            return;
        };
        for y in area[1]..area[1] + area[3] {
            for x in area[0]..area[0] + area[2] {
                if let Some(i) = fb.index(x, y) {
                    fb.pixels[i] = color;
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: PixelRect, rgba: [u8; 4]) {
        self.fill_count += 1;
        let Some(area) = self.clip(rect) else {
            return;
        };
        let Some(fb) = self.target_mut() else {
            return;
        };
        for y in area[1]..area[1] + area[3] {
            for x in area[0]..area[0] + area[2] {
                if let Some(i) = fb.index(x, y) {
                    fb.pixels[i] = rgba;
                }
            }
        }
    }

    fn read_pixels(&mut self, rect: PixelRect) -> Result<Vec<u8>> {
        let fb = self
            .target()
            .ok_or_else(|| VizError::Device("bound target has no color buffer".into()))?;
        if fb.samples > 0 {
            return Err(VizError::Device(
                "cannot read pixels from a multisampled surface".into(),
            ));
        }
        let mut out = Vec::with_capacity((rect[2].max(0) * rect[3].max(0)) as usize * 4);
        for y in rect[1]..rect[1] + rect[3] {
            for x in rect[0]..rect[0] + rect[2] {
                let px = fb.index(x, y).map_or([0; 4], |i| fb.pixels[i]);
                out.extend_from_slice(&px);
            }
        }
        Ok(out)
    }

    /// Nearest-pixel zoom. Negative factors are taken by magnitude.
    fn draw_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]) {
        let (zx, zy) = (self.pixel_zoom.0.abs(), self.pixel_zoom.1.abs());
        if rgba.len() < width as usize * height as usize * 4 || zx == 0.0 || zy == 0.0 {
            return;
        }
        let Some(fb) = self.target_mut() else {
            return;
        };
        let out_w = (f64::from(width) * zx).round() as i32;
        let out_h = (f64::from(height) * zy).round() as i32;
        for row in 0..out_h {
            let src_row = ((f64::from(row) / zy) as u32).min(height - 1) as usize;
            for col in 0..out_w {
                let src_col = ((f64::from(col) / zx) as u32).min(width - 1) as usize;
                let src = (src_row * width as usize + src_col) * 4;
                if let Some(i) = fb.index(x + col, y + row) {
                    fb.pixels[i] = [rgba[src], rgba[src + 1], rgba[src + 2], rgba[src + 3]];
                }
            }
        }
    }

    fn pixel_zoom(&self) -> (f64, f64) {
        self.pixel_zoom
    }

    fn set_pixel_zoom(&mut self, x: f64, y: f64) {
        self.pixel_zoom = (x, y);
    }

    fn target_size(&self) -> (u32, u32) {
        self.target().map_or((0, 0), |fb| (fb.width, fb.height))
    }

    fn max_samples(&self) -> u32 {
        self.max_samples
    }

    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceId> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(VizError::AllocationFailed {
                    what: format!("{:?} surface {}x{}", desc.kind, desc.width, desc.height),
                    reason: "device memory exhausted".into(),
                });
            }
            *budget -= 1;
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(VizError::AllocationFailed {
                what: format!("{:?} surface", desc.kind),
                reason: "zero-sized surface".into(),
            });
        }
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        let color = (desc.kind == SurfaceKind::Color)
            .then(|| Framebuffer::new(desc.width, desc.height, desc.samples));
        self.surfaces.insert(id, Surface { desc, color });
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if self.bound == Some(surface) {
            self.bound = None;
        }
        self.surfaces.remove(&surface);
    }

    fn bind_target(&mut self, color: Option<SurfaceId>, _depth: Option<SurfaceId>) {
        self.bound = color.filter(|id| self.surfaces.contains_key(id));
    }

    fn bound_target(&self) -> Option<SurfaceId> {
        self.bound
    }

    fn resolve(&mut self, from: SurfaceId, to: SurfaceId) -> Result<()> {
        let source = self
            .surfaces
            .get(&from)
            .and_then(|s| s.color.as_ref())
            .map(|fb| fb.pixels.clone())
            .ok_or_else(|| VizError::Device(format!("no color surface {from:?}")))?;
        let target = self
            .surfaces
            .get_mut(&to)
            .and_then(|s| s.color.as_mut())
            .ok_or_else(|| VizError::Device(format!("no color surface {to:?}")))?;
        if target.pixels.len() != source.len() {
            return Err(VizError::Device("resolve size mismatch".into()));
        }
        target.pixels = source;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_is_clipped_by_scissor() {
        let mut device = SoftwareDevice::new(10, 10);
        device.set_scissor_box([0, 0, 5, 5]);
        device.set_scissor_enabled(true);
        device.fill_rect([0, 0, 10, 10], [255, 0, 0, 255]);

        assert_eq!(device.pixel(4, 4), Some([255, 0, 0, 255]));
        assert_eq!(device.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_draw_pixels_follows_pixel_zoom() {
        let mut device = SoftwareDevice::new(8, 8);
        device.set_pixel_zoom(2.0, 2.0);
        device.draw_pixels(1, 1, 2, 1, &[255, 0, 0, 255, 0, 255, 0, 255]);

        assert_eq!(device.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(device.pixel(2, 2), Some([255, 0, 0, 255]));
        assert_eq!(device.pixel(4, 2), Some([0, 255, 0, 255]));
        assert_eq!(device.pixel(5, 1), Some([0, 0, 0, 0]));
        assert_eq!(device.pixel(1, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_multisampled_surface_needs_resolve() {
        let mut device = SoftwareDevice::new(4, 4);
        let desc = SurfaceDesc {
            width: 4,
            height: 4,
            samples: 4,
            kind: SurfaceKind::Color,
        };
        let ms = device.create_surface(desc).unwrap();
        let single = device
            .create_surface(SurfaceDesc { samples: 0, ..desc })
            .unwrap();

        device.bind_target(Some(ms), None);
        device.set_viewport([0, 0, 4, 4]);
        device.fill_rect([0, 0, 4, 4], [1, 2, 3, 4]);
        assert!(device.read_pixels([0, 0, 4, 4]).is_err());

        device.resolve(ms, single).unwrap();
        device.bind_target(Some(single), None);
        let pixels = device.read_pixels([0, 0, 1, 1]).unwrap();
        assert_eq!(pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_allocation_budget() {
        let mut device = SoftwareDevice::new(4, 4);
        device.set_allocation_budget(Some(0));
        let desc = SurfaceDesc {
            width: 4,
            height: 4,
            samples: 0,
            kind: SurfaceKind::DepthStencil,
        };
        assert!(matches!(
            device.create_surface(desc),
            Err(VizError::AllocationFailed { .. })
        ));
    }
}
