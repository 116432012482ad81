//! Transform nodes.

use glam::{DMat4, DQuat, DVec3};

use super::{ApplyMode, Node, NodeCore};
use crate::context::ApplyContext;
use crate::device::MatrixMode;
use crate::errors::{Result, ResultExt};

/// Multiplies a matrix onto one of the device matrices.
#[derive(Debug)]
pub struct Frame {
    core: NodeCore,
    mode: MatrixMode,
    matrix: DMat4,
    /// Pivot the transform is applied about.
    origin: Option<DVec3>,
    invert_front_face: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: NodeCore::new("Frame"),
            mode: MatrixMode::ModelView,
            matrix: DMat4::IDENTITY,
            origin: None,
            invert_front_face: false,
        }
    }

    #[must_use]
    pub fn from_matrix(matrix: DMat4) -> Self {
        Self {
            matrix,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MatrixMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Marks the frame as mirroring, which flips the front face below it.
    pub fn set_invert_front_face(&mut self, invert: bool) {
        self.invert_front_face = invert;
    }

    #[inline]
    #[must_use]
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> MatrixMode {
        self.mode
    }

    pub fn set(&mut self, matrix: DMat4) {
        self.matrix = matrix;
        self.core.content().set_changed(true, true, false);
    }

    pub fn reset(&mut self) {
        self.set(DMat4::IDENTITY);
    }

    pub fn translate(&mut self, offset: DVec3) {
        self.set(self.matrix * DMat4::from_translation(offset));
    }

    /// Rotates by `angle` radians about `axis`. A zero axis is ignored.
    pub fn rotate(&mut self, angle: f64, axis: DVec3) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        self.set(self.matrix * DMat4::from_quat(DQuat::from_axis_angle(axis, angle)));
    }

    pub fn rotate_quat(&mut self, rotation: DQuat) {
        self.set(self.matrix * DMat4::from_quat(rotation));
    }

    pub fn scale(&mut self, factors: DVec3) {
        self.set(self.matrix * DMat4::from_scale(factors));
    }
}

impl Node for Frame {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, _mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if self.invert_front_face {
            ctx.invert_front_face = true;
        }
        let matrix = match self.origin {
            Some(o) => DMat4::from_translation(-o) * self.matrix * DMat4::from_translation(o),
            None => self.matrix,
        };
        ctx.device.mult_matrix(self.mode, matrix);
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            mode: self.mode,
            matrix: self.matrix,
            origin: self.origin,
            invert_front_face: self.invert_front_face,
        })
    }

    fn as_frame(&self) -> Option<&Frame> {
        Some(self)
    }

    fn as_frame_mut(&mut self) -> Option<&mut Frame> {
        Some(self)
    }
}

/// Which matrices a [`FrameStack`] node saves or restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTarget {
    One(MatrixMode),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOp {
    Push(StackTarget),
    Pop(StackTarget),
}

/// Pushes or pops device matrices as a graph node.
#[derive(Debug)]
pub struct FrameStack {
    core: NodeCore,
    op: StackOp,
}

impl FrameStack {
    #[must_use]
    pub fn new(op: StackOp) -> Self {
        Self {
            core: NodeCore::new("FrameStack"),
            op,
        }
    }

    #[must_use]
    pub fn op(&self) -> StackOp {
        self.op
    }
}

impl Node for FrameStack {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, _mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        match self.op {
            StackOp::Push(StackTarget::All) => ctx.matrices.push_all(&*ctx.device),
            StackOp::Push(StackTarget::One(mode)) => ctx.matrices.push(&*ctx.device, mode),
            StackOp::Pop(StackTarget::All) => ctx
                .matrices
                .pop_all(ctx.device)
                .context("Error applying frame stack")?,
            StackOp::Pop(StackTarget::One(mode)) => ctx
                .matrices
                .pop(ctx.device, mode)
                .context("Error applying frame stack")?,
        }
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            op: self.op,
        })
    }
}
