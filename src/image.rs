//! Pixel images and the image-encoder collaborator.

use std::path::{Path, PathBuf};

use crate::errors::{Result, VizError};
use crate::repository::Resource;

/// RGBA8 image, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl Image {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0; 4]; width as usize * height as usize],
        }
    }

    /// Wraps tightly packed RGBA8 data with rows top to bottom.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(VizError::Device(format!(
                "image data of {} bytes does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: data
                .chunks_exact(4)
                .map(|px| [px[0], px[1], px[2], px[3]])
                .collect(),
        })
    }

    /// Builds an image from bottom-to-top rows as read back from a device.
    pub fn from_bottom_up(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let row = width as usize * 4;
        let mut flipped = Vec::with_capacity(data.len());
        for chunk in data.chunks_exact(row.max(1)).rev() {
            flipped.extend_from_slice(chunk);
        }
        Self::from_rgba(width, height, flipped)
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Pixel at `(x, y)` with `y` counted from the top.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Pixels packed little-endian into `u32`, the layout of pick colors.
    #[must_use]
    pub fn packed(&self) -> Vec<u32> {
        self.pixels.iter().map(|px| u32::from_le_bytes(*px)).collect()
    }

    /// Rows bottom to top, the layout devices expect for pixel uploads.
    #[must_use]
    pub fn to_bottom_up(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for row in self.pixels.chunks_exact((self.width as usize).max(1)).rev() {
            out.extend_from_slice(bytemuck::cast_slice(row));
        }
        out
    }
}

impl Resource for Image {
    fn duplicate(&self) -> Self {
        self.clone()
    }
}

/// Saves images handed over by a render target.
pub trait ImageEncoder: Send {
    fn save(&self, image: &Image, path: &Path) -> Result<()>;
}

/// Encodes by file extension through the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageEncoder;

impl ImageEncoder for FileImageEncoder {
    fn save(&self, image: &Image, path: &Path) -> Result<()> {
        let buffer = ::image::RgbaImage::from_raw(image.width(), image.height(), image.data().to_vec())
            .ok_or_else(|| VizError::Device("image buffer size mismatch".into()))?;
        buffer.save(path)?;
        Ok(())
    }
}

/// A pending single-shot export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderToFileRequest {
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bottom_up_flips_rows() {
        // Two rows: bottom red, top blue.
        let data = [255, 0, 0, 255, 0, 0, 255, 255];
        let image = Image::from_bottom_up(1, 2, &data).unwrap();
        assert_eq!(image.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(image.pixel(0, 1), Some([255, 0, 0, 255]));
        assert_eq!(image.to_bottom_up(), data.to_vec());
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        assert!(Image::from_rgba(2, 2, vec![0; 3]).is_err());
    }
}
