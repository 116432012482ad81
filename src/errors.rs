//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! Failures fall into three groups:
//! - Resource allocation failures (surfaces, repository locks) are returned
//!   as [`VizError`] and unwind through every traversal level, each level
//!   adding a line of context through [`ResultExt::context`].
//! - Graph-shape failures (a missing sub-scene, a busy node) are not errors.
//!   They are logged and the optional behavior is skipped.
//! - A node that cannot be rendered reports `Ok(false)`, which aborts the
//!   rest of its list.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vizgraph::errors::{Result, ResultExt};
//!
//! fn draw_frame(engine: &mut Engine) -> Result<()> {
//!     engine.render_frame().context("Error drawing main scene")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the VizGraph engine.
#[derive(Error, Debug)]
pub enum VizError {
    // ========================================================================
    // Resource Allocation Errors
    // ========================================================================
    /// A backing surface or buffer could not be created.
    #[error("Failed to allocate {what}: {reason}")]
    AllocationFailed {
        /// What was being allocated
        what: String,
        /// Reason reported by the device
        reason: String,
    },

    /// The repository lock could not be acquired within the configured wait.
    #[error("Repository lock not acquired within {0} ms")]
    LockTimeout(u64),

    // ========================================================================
    // Handle Errors
    // ========================================================================
    /// The handle's resource is not owned by this repository.
    #[error("Handle #{0} is not registered with this repository")]
    HandleNotFound(u64),

    /// The operation needs a valid handle.
    #[error("Invalid resource handle")]
    InvalidHandle,

    // ========================================================================
    // Graphics State Errors
    // ========================================================================
    /// More pops than pushes on a matrix stack.
    #[error("Matrix stack underflow ({0})")]
    MatrixStackUnderflow(&'static str),

    /// The device rejected an operation.
    #[error("Graphics device error: {0}")]
    Device(String),

    // ========================================================================
    // Render Target Errors
    // ========================================================================
    /// The render target has no backing surface to read from.
    #[error("Render target has no image data")]
    NoImageData,

    /// A multisampled render target has no surface to resolve into.
    #[error("Multisampled render target has no resolve surface")]
    NoResolveSurface,

    // ========================================================================
    // I/O & Encoding Errors
    // ========================================================================
    /// Image encoding failed.
    #[error("Image encoding error: {0}")]
    ImageEncode(#[from] ::image::ImageError),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine settings could not be parsed.
    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),

    // ========================================================================
    // Nesting
    // ========================================================================
    /// An error annotated with the traversal level it passed through.
    #[error("{context}")]
    Nested {
        /// What was being done when the error surfaced
        context: String,
        /// The underlying error
        #[source]
        source: Box<VizError>,
    },
}

impl VizError {
    /// Returns the innermost error of a nested chain.
    #[must_use]
    pub fn root_cause(&self) -> &VizError {
        let mut current = self;
        while let VizError::Nested { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the context lines of a nested chain, outermost first.
    #[must_use]
    pub fn context_chain(&self) -> Vec<&str> {
        let mut lines = Vec::new();
        let mut current = self;
        while let VizError::Nested { context, source } = current {
            lines.push(context.as_str());
            current = source;
        }
        lines
    }
}

/// Alias for `Result<T, VizError>`.
pub type Result<T> = std::result::Result<T, VizError>;

/// Adds a context line to an error on its way up.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| VizError::Nested {
            context: context.into(),
            source: Box::new(source),
        })
    }
}
