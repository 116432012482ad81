use glam::DMat4;

use super::{GraphicsDevice, MatrixMode};
use crate::errors::{Result, VizError};

/// Saved matrices per [`MatrixMode`].
///
/// Pushing records the device's current matrix, popping loads it back.
#[derive(Debug, Default, Clone)]
pub struct MatrixStack {
    stacks: [Vec<DMat4>; 3],
}

impl MatrixStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, device: &dyn GraphicsDevice, mode: MatrixMode) {
        self.stacks[mode.index()].push(device.matrix(mode));
    }

    pub fn pop(&mut self, device: &mut dyn GraphicsDevice, mode: MatrixMode) -> Result<()> {
        let matrix = self.stacks[mode.index()]
            .pop()
            .ok_or(VizError::MatrixStackUnderflow(mode.name()))?;
        device.load_matrix(mode, matrix);
        Ok(())
    }

    pub fn push_all(&mut self, device: &dyn GraphicsDevice) {
        for mode in MatrixMode::ALL {
            self.push(device, mode);
        }
    }

    pub fn pop_all(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        for mode in MatrixMode::ALL {
            self.pop(device, mode)?;
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn depth(&self, mode: MatrixMode) -> usize {
        self.stacks[mode.index()].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.iter().all(Vec::is_empty)
    }

    /// Restores and discards everything still on the stacks, oldest last.
    pub fn unwind(&mut self, device: &mut dyn GraphicsDevice) {
        for mode in MatrixMode::ALL {
            if let Some(bottom) = self.stacks[mode.index()].first().copied() {
                device.load_matrix(mode, bottom);
            }
            self.stacks[mode.index()].clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use glam::DVec3;

    #[test]
    fn test_push_pop_restores_matrix() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut stack = MatrixStack::new();

        stack.push(&device, MatrixMode::ModelView);
        device.mult_matrix(
            MatrixMode::ModelView,
            DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0)),
        );
        assert_ne!(device.matrix(MatrixMode::ModelView), DMat4::IDENTITY);

        stack.pop(&mut device, MatrixMode::ModelView).unwrap();
        assert_eq!(device.matrix(MatrixMode::ModelView), DMat4::IDENTITY);
    }

    #[test]
    fn test_underflow_is_an_error() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut stack = MatrixStack::new();
        assert!(matches!(
            stack.pop(&mut device, MatrixMode::Texture),
            Err(VizError::MatrixStackUnderflow("texture"))
        ));
    }
}
