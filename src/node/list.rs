use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{ApplyMode, ContentState, Node, NodeCore, NodeHandle, NodeId};
use crate::context::ApplyContext;
use crate::errors::{Result, ResultExt};

struct Entry {
    handle: NodeHandle,
    id: NodeId,
    name: String,
    content: Arc<ContentState>,
    is_list: bool,
}

/// Ordered container of child nodes with id and name indices.
pub struct NodeList {
    core: NodeCore,
    entries: Vec<Entry>,
    by_id: FxHashMap<NodeId, NodeHandle>,
    by_name: FxHashMap<String, SmallVec<[NodeId; 2]>>,
}

impl Default for NodeList {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeList {
    #[must_use]
    pub fn new() -> Self {
        Self::with_type_name("List")
    }

    #[must_use]
    pub fn with_type_name(type_name: &'static str) -> Self {
        Self {
            core: NodeCore::new_list(type_name),
            entries: Vec::new(),
            by_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.core.set_name(name);
        self
    }

    /// Appends `child`. Returns `false` for an invalid handle or when the
    /// child cannot be reached (for example a list added to itself).
    pub fn add(&mut self, child: NodeHandle) -> bool {
        if !child.is_valid() {
            return false;
        }
        let Some((id, name, content, is_list)) = child.with(|node| {
            (
                node.id(),
                node.name().to_owned(),
                Arc::clone(node.core().content()),
                node.as_list().is_some(),
            )
        }) else {
            log::warn!("Node list {}: child is not reachable, not added", self.core.id());
            return false;
        };

        ContentState::link(self.core.content(), &content);
        if !name.is_empty() {
            self.by_name.entry(name.clone()).or_default().push(id);
        }
        self.by_id.insert(id, child.clone());
        self.entries.push(Entry {
            handle: child,
            id,
            name,
            content,
            is_list,
        });
        self.core.content().set_changed(true, true, false);
        true
    }

    /// Removes the first occurrence of `child`.
    pub fn delete(&mut self, child: &NodeHandle) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.handle.same_resource(child))
        else {
            return false;
        };
        let entry = self.entries.remove(pos);
        self.forget(&entry);
        self.core.content().set_changed(true, true, false);
        true
    }

    /// Drops the indices of a removed entry. The id index stays while
    /// another entry still holds the same child.
    fn forget(&mut self, entry: &Entry) {
        ContentState::unlink(self.core.content(), &entry.content);
        if !self.entries.iter().any(|e| e.id == entry.id) {
            self.by_id.remove(&entry.id);
        }
        if let Some(ids) = self.by_name.get_mut(&entry.name) {
            if let Some(i) = ids.iter().position(|id| *id == entry.id) {
                ids.remove(i);
            }
            if ids.is_empty() {
                self.by_name.remove(&entry.name);
            }
        }
    }

    /// Removes every child.
    pub fn reset(&mut self) {
        for entry in std::mem::take(&mut self.entries) {
            ContentState::unlink(self.core.content(), &entry.content);
        }
        self.by_id.clear();
        self.by_name.clear();
        self.core.content().set_changed(true, true, false);
    }

    /// Looks a child up by id, optionally searching nested lists.
    #[must_use]
    pub fn element_with_id(&self, id: NodeId, recurse: bool) -> Option<NodeHandle> {
        if let Some(handle) = self.by_id.get(&id) {
            return Some(handle.clone());
        }
        if !recurse {
            return None;
        }
        self.entries
            .iter()
            .filter(|e| e.is_list)
            .find_map(|e| {
                e.handle
                    .with(|node| node.as_list().and_then(|l| l.element_with_id(id, true)))
                    .flatten()
            })
    }

    /// Children registered under `name`, in insertion order.
    #[must_use]
    pub fn elements_with_name(&self, name: &str) -> Vec<NodeHandle> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Removes every child registered under `name`.
    pub fn delete_elements_with_name(&mut self, name: &str) {
        for handle in self.elements_with_name(name) {
            self.delete(&handle);
        }
    }

    /// Removes children referenced only by this list.
    ///
    /// The list holds two handles per child: the entry and the id index.
    pub fn prune_unique(&mut self) {
        let unique: Vec<NodeHandle> = self
            .entries
            .iter()
            .filter(|e| e.handle.ref_count() == 2)
            .map(|e| e.handle.clone())
            .collect();
        for handle in unique {
            self.delete(&handle);
        }
    }

    pub fn enable_content_changed_info(&self, enabled: bool) {
        self.core.content().enable_info(enabled);
    }

    #[must_use]
    pub fn is_content_changed(&self) -> bool {
        self.core.content().is_changed()
    }

    pub fn set_content_changed(&self, value: bool, tell_parents: bool, tell_children: bool) {
        self.core
            .content()
            .set_changed(value, tell_parents, tell_children);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child handles in list order.
    pub fn children(&self) -> impl Iterator<Item = &NodeHandle> {
        self.entries.iter().map(|e| &e.handle)
    }

    #[must_use]
    pub fn child_ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Applies the children in order.
    pub fn apply_children(&self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        Self::apply_list(self.children(), mode, ctx)
    }

    /// Applies `children` in order and stops at the first one that cannot be
    /// reached or returns `false`.
    pub fn apply_list<'h>(
        children: impl IntoIterator<Item = &'h NodeHandle>,
        mode: ApplyMode,
        ctx: &mut ApplyContext<'_>,
    ) -> Result<bool> {
        for child in children {
            let timeout = ctx.lock_timeout;
            match child.try_with(timeout, |node| node.apply(mode, ctx)) {
                Some(Ok(true)) => {}
                Some(Ok(false)) => return Ok(false),
                Some(Err(err)) => return Err(err),
                None => {
                    log::warn!("Child {child:?} is invalid or busy, aborting list");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Copy sharing the children of `self`.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = Self {
            core: self.core.duplicate(),
            entries: Vec::with_capacity(self.entries.len()),
            by_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
        };
        for entry in &self.entries {
            ContentState::link(copy.core.content(), &entry.content);
            if !entry.name.is_empty() {
                copy.by_name.entry(entry.name.clone()).or_default().push(entry.id);
            }
            copy.by_id.insert(entry.id, entry.handle.clone());
            copy.entries.push(Entry {
                handle: entry.handle.clone(),
                id: entry.id,
                name: entry.name.clone(),
                content: Arc::clone(&entry.content),
                is_list: entry.is_list,
            });
        }
        copy
    }
}

impl Drop for NodeList {
    fn drop(&mut self) {
        for entry in &self.entries {
            ContentState::unlink(self.core.content(), &entry.content);
        }
    }
}

impl Node for NodeList {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, mode: ApplyMode, ctx: &mut ApplyContext<'_>) -> Result<bool> {
        ctx.matrices.push_all(&*ctx.device);
        if mode == ApplyMode::Pick {
            ctx.push_pick_name(self.core.id());
        }

        let applied = self.apply_children(mode, ctx);

        if mode == ApplyMode::Pick {
            ctx.pop_pick_name();
        }
        let restored = ctx.matrices.pop_all(ctx.device);

        let applied = applied.context("Error applying node list")?;
        restored?;
        Ok(applied)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(self.duplicate())
    }

    fn as_list(&self) -> Option<&NodeList> {
        Some(self)
    }

    fn as_list_mut(&mut self) -> Option<&mut NodeList> {
        Some(self)
    }
}
