use crate::device::{GraphicsDevice, PixelRect};
use crate::errors::Result;
use crate::image::Image;

/// Last rendered pixels of a scene's viewport.
///
/// While the scene's content is unchanged and the viewport keeps its size,
/// draw passes blit the cached image instead of traversing the children.
#[derive(Debug, Default)]
pub struct RedrawCache {
    enabled: bool,
    image: Option<Image>,
}

impl RedrawCache {
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.image = None;
        }
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    #[must_use]
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.image = None;
    }

    /// True if the cached image covers exactly `viewport`'s size.
    #[must_use]
    pub fn fits(&self, viewport: PixelRect) -> bool {
        self.image.as_ref().is_some_and(|img| {
            i64::from(img.width()) == i64::from(viewport[2]) && i64::from(img.height()) == i64::from(viewport[3])
        })
    }

    /// Draws the cached image at the viewport origin, unzoomed.
    pub fn blit(&self, device: &mut dyn GraphicsDevice, viewport: PixelRect) -> bool {
        let Some(img) = &self.image else {
            return false;
        };
        let (zx, zy) = device.pixel_zoom();
        device.set_pixel_zoom(1.0, 1.0);
        device.draw_pixels(viewport[0], viewport[1], img.width(), img.height(), &img.to_bottom_up());
        device.set_pixel_zoom(zx, zy);
        true
    }

    /// Reads `viewport` back from the bound target into the cache.
    pub fn capture(&mut self, device: &mut dyn GraphicsDevice, viewport: PixelRect) -> Result<()> {
        let width = u32::try_from(viewport[2]).unwrap_or(0);
        let height = u32::try_from(viewport[3]).unwrap_or(0);
        let pixels = device.read_pixels(viewport)?;
        self.image = Some(Image::from_bottom_up(width, height, &pixels)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    #[test]
    fn test_capture_then_blit_restores_pixels() {
        let mut device = SoftwareDevice::new(16, 16);
        device.fill_rect([0, 0, 16, 16], [0, 0, 0, 255]);
        device.fill_rect([2, 2, 4, 4], [255, 0, 0, 255]);

        let mut cache = RedrawCache::default();
        cache.set_enabled(true);
        cache.capture(&mut device, [0, 0, 8, 8]).unwrap();
        assert!(cache.fits([4, 4, 8, 8]));
        assert!(!cache.fits([0, 0, 8, 9]));

        device.fill_rect([0, 0, 16, 16], [0, 0, 255, 255]);
        assert!(cache.blit(&mut device, [0, 0, 8, 8]));
        assert_eq!(device.pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(device.pixel(7, 7), Some([0, 0, 0, 255]));
        assert_eq!(device.pixel(8, 8), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_disabling_drops_image() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut cache = RedrawCache::default();
        cache.set_enabled(true);
        cache.capture(&mut device, [0, 0, 4, 4]).unwrap();
        cache.set_enabled(false);
        assert!(!cache.has_image());
    }
}
