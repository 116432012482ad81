//! Scene Graph Nodes
//!
//! Every node kind implements [`Node`]: one `apply` entry point used for both
//! drawing and picking, a prototype-style `copy`, and capability queries that
//! hand out typed views (`as_list`, `as_scene`, `as_frame`, ...) instead of
//! downcasts.
//!
//! Nodes live in a [`NodeRepository`] and are referenced through
//! [`NodeHandle`]s. Traversal is always top-down through list children;
//! the upward parent edges kept in [`ContentState`] exist only to forward
//! "content changed" notifications and never own anything.

pub mod color;
pub mod content;
pub mod frame;
pub mod list;
pub mod shader;
pub mod shape;

pub use color::Color;
pub use content::ContentState;
pub use frame::{Frame, FrameStack, StackOp, StackTarget};
pub use list::NodeList;
pub use shader::{Shader, ShaderProgram, SharedShader, uniforms};
pub use shape::{Rect, RectBatch, RectGeometry};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::ApplyContext;
use crate::errors::Result;
use crate::render_target::RenderTarget;
use crate::repository::{Handle, Repository, Resource};
use crate::scene::Scene;

/// Handle to a node in a [`NodeRepository`].
pub type NodeHandle = Handle<Box<dyn Node>>;

/// Repository owning the nodes of a scene graph.
pub type NodeRepository = Repository<Box<dyn Node>>;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide unique node id. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pass kind of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    /// Visible rendering.
    Draw,
    /// Rendering of pick colors for hit testing.
    Pick,
}

/// State shared by every node kind.
#[derive(Debug)]
pub struct NodeCore {
    id: NodeId,
    name: String,
    type_name: &'static str,
    content: Arc<ContentState>,
}

impl NodeCore {
    /// Core of a leaf node.
    #[must_use]
    pub fn new(type_name: &'static str) -> Self {
        Self::with_content(type_name, ContentState::leaf())
    }

    /// Core of a container node.
    #[must_use]
    pub fn new_list(type_name: &'static str) -> Self {
        Self::with_content(type_name, ContentState::list())
    }

    fn with_content(type_name: &'static str, content: ContentState) -> Self {
        Self {
            id: NodeId::next(),
            name: String::new(),
            type_name,
            content: Arc::new(content),
        }
    }

    /// Core for a copy: fresh id and change state, same name and type.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: NodeId::next(),
            name: self.name.clone(),
            type_name: self.type_name,
            content: Arc::new(self.content.detached_copy()),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the name. Lists index names when a node is added, so name a
    /// node before adding it.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> &Arc<ContentState> {
        &self.content
    }
}

/// A scene graph node.
pub trait Node: Send {
    fn core(&self) -> &NodeCore;
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Draws or picks the node.
    ///
    /// `Ok(false)` reports that the node could not be rendered and aborts the
    /// remainder of the enclosing list; `Err` carries allocation failures.
    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool>;

    /// Independent copy with a fresh id. Device resources are not shared;
    /// the copy starts without them.
    fn copy(&self) -> Box<dyn Node>;

    // --- capability queries ---------------------------------------------------

    fn as_list(&self) -> Option<&NodeList> {
        None
    }

    fn as_list_mut(&mut self) -> Option<&mut NodeList> {
        None
    }

    fn as_scene(&self) -> Option<&Scene> {
        None
    }

    fn as_scene_mut(&mut self) -> Option<&mut Scene> {
        None
    }

    fn as_frame(&self) -> Option<&Frame> {
        None
    }

    fn as_frame_mut(&mut self) -> Option<&mut Frame> {
        None
    }

    fn as_render_target(&self) -> Option<&RenderTarget> {
        None
    }

    fn as_render_target_mut(&mut self) -> Option<&mut RenderTarget> {
        None
    }

    // --- provided -----------------------------------------------------------------

    #[inline]
    fn id(&self) -> NodeId {
        self.core().id()
    }

    #[inline]
    fn name(&self) -> &str {
        self.core().name()
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        self.core().type_name()
    }

    fn is_content_changed(&self) -> bool {
        self.core().content().is_changed()
    }

    fn set_content_changed(&self, value: bool, tell_parents: bool, tell_children: bool) {
        self.core()
            .content()
            .set_changed(value, tell_parents, tell_children);
    }
}

impl Resource for Box<dyn Node> {
    fn duplicate(&self) -> Self {
        self.copy()
    }
}

/// Convenience accessors on node handles.
pub trait NodeHandleExt {
    /// Id of the referenced node, `None` if invalid or busy.
    fn node_id(&self) -> Option<NodeId>;

    /// Runs `f` on the node viewed as a list.
    fn with_list<R>(&self, f: impl FnOnce(&mut NodeList) -> R) -> Option<R>;

    /// Runs `f` on the node viewed as a scene.
    fn with_scene<R>(&self, f: impl FnOnce(&mut Scene) -> R) -> Option<R>;

    /// Runs `f` on the node viewed as a render target.
    fn with_render_target<R>(&self, f: impl FnOnce(&mut RenderTarget) -> R) -> Option<R>;
}

impl NodeHandleExt for NodeHandle {
    fn node_id(&self) -> Option<NodeId> {
        self.with(|node| node.id())
    }

    fn with_list<R>(&self, f: impl FnOnce(&mut NodeList) -> R) -> Option<R> {
        self.with(|node| node.as_list_mut().map(f)).flatten()
    }

    fn with_scene<R>(&self, f: impl FnOnce(&mut Scene) -> R) -> Option<R> {
        self.with(|node| node.as_scene_mut().map(f)).flatten()
    }

    fn with_render_target<R>(&self, f: impl FnOnce(&mut RenderTarget) -> R) -> Option<R> {
        self.with(|node| node.as_render_target_mut().map(f)).flatten()
    }
}

/// Stores `node` in `repo` and returns its handle.
pub fn insert(repo: &NodeRepository, node: impl Node + 'static) -> Result<NodeHandle> {
    repo.new_resource(Box::new(node))
}
