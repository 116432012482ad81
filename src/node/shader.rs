//! Shader binding.
//!
//! Shader programs are owned by the embedding renderer. The graph only binds
//! them and feeds them the pick uniforms, so the program is reached through
//! the [`ShaderProgram`] trait.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ApplyMode, Node, NodeCore};
use crate::context::ApplyContext;
use crate::errors::Result;
use crate::pick::MAX_PART_ID;

/// Uniform names set by the traversal.
pub mod uniforms {
    /// `1` while rendering pick colors, `0` otherwise.
    pub const PICK_MODE: &str = "clu_iInPickDrawMode";
    /// Part id of the current selection, [`MAX_PART_ID`] when nothing of
    /// the enclosing scene is picked.
    ///
    /// [`MAX_PART_ID`]: crate::pick::MAX_PART_ID
    pub const PICKED_PART_ID: &str = "clu_iPickedPartId";
}

pub trait ShaderProgram: Send {
    fn has_uniform(&self, name: &str) -> bool;
    fn set_uniform_i32(&mut self, name: &str, value: i32);
}

pub type SharedShader = Arc<Mutex<dyn ShaderProgram>>;

/// Makes a program current and initializes its pick uniforms.
pub struct Shader {
    core: NodeCore,
    program: SharedShader,
    enabled: bool,
}

impl Shader {
    #[must_use]
    pub fn new(program: SharedShader) -> Self {
        Self {
            core: NodeCore::new("Shader"),
            program,
            enabled: true,
        }
    }

    /// A disabled shader unbinds any current program.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn program(&self) -> &SharedShader {
        &self.program
    }
}

impl Node for Shader {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        if !self.enabled {
            ctx.current_shader = None;
            return Ok(true);
        }
        let Some(mut program) = self.program.try_lock_for(ctx.lock_timeout) else {
            log::warn!("Shader {} is busy", self.core.id());
            return Ok(false);
        };
        if program.has_uniform(uniforms::PICK_MODE) {
            program.set_uniform_i32(uniforms::PICK_MODE, i32::from(mode == ApplyMode::Pick));
        }
        if program.has_uniform(uniforms::PICKED_PART_ID) {
            let part = if ctx.in_pick_state {
                ctx.selection.part_id()
            } else {
                MAX_PART_ID
            };
            program.set_uniform_i32(uniforms::PICKED_PART_ID, i32::try_from(part).unwrap_or(i32::MAX));
        }
        drop(program);
        ctx.current_shader = Some(Arc::clone(&self.program));
        Ok(true)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            core: self.core.duplicate(),
            program: Arc::clone(&self.program),
            enabled: self.enabled,
        })
    }
}
