//! VizGraph Engine
//!
//! A retained-mode scene graph drawn through an immediate-mode graphics API.
//! One recursive traversal serves both visible drawing and color-encoded
//! picking; scenes nest viewports, projections and frames, substitute pick
//! sub-scenes while picked, cache their pixels between frames and turn mouse
//! drags into transforms.
//!
//! - [`repository`]: reference-counted ownership of nodes and resources
//! - [`node`]: the [`Node`] trait, lists and leaf node kinds
//! - [`scene`]: the [`Scene`] traversal and its view, pick and drag state
//! - [`render_target`]: off-screen drawing with multisample resolve
//! - [`engine`]: the per-frame draw and pick passes

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod context;
pub mod device;
pub mod engine;
pub mod errors;
pub mod image;
pub mod node;
pub mod pick;
pub mod registry;
pub mod render_target;
pub mod repository;
pub mod scene;
pub mod settings;
pub mod utils;

pub use context::{ApplyContext, Modifiers, MouseState, PassFlags};
pub use device::{GraphicsDevice, MatrixMode, PixelRect, SoftwareDevice};
pub use engine::Engine;
pub use errors::{Result, VizError};
pub use image::{FileImageEncoder, Image, ImageEncoder};
pub use node::{ApplyMode, Node, NodeHandle, NodeHandleExt, NodeId, NodeList, NodeRepository};
pub use pick::{PickHit, PickSelection};
pub use render_target::RenderTarget;
pub use repository::{Handle, Repository, Resource};
pub use scene::{PickState, Projection, Scene, ViewportSpec};
pub use settings::EngineSettings;
pub use utils::FrameClock;
