//! Content-changed bookkeeping.
//!
//! Each node owns one [`ContentState`]. Lists link their state to their
//! children's states with weak, non-owning edges in both directions: upward
//! edges forward "content changed" to every transitive parent, downward
//! edges forward resets and the "changed info needed" switch. The links never
//! touch node locks, so notifications are safe while a traversal holds the
//! locks of a node's ancestors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

#[derive(Debug, Default)]
struct Links {
    parents: SmallVec<[Weak<ContentState>; 2]>,
    children: Vec<Weak<ContentState>>,
}

#[derive(Debug)]
pub struct ContentState {
    is_list: bool,
    changed: AtomicBool,
    need_info: AtomicBool,
    links: Mutex<Links>,
}

impl ContentState {
    pub(crate) fn leaf() -> Self {
        Self::new(false)
    }

    pub(crate) fn list() -> Self {
        Self::new(true)
    }

    fn new(is_list: bool) -> Self {
        Self {
            is_list,
            changed: AtomicBool::new(false),
            need_info: AtomicBool::new(false),
            links: Mutex::new(Links::default()),
        }
    }

    /// Unlinked state carrying over the "changed info needed" switch.
    pub(crate) fn detached_copy(&self) -> Self {
        let copy = Self::new(self.is_list);
        copy.need_info
            .store(self.need_info.load(Ordering::Relaxed), Ordering::Relaxed);
        copy
    }

    #[inline]
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.is_list
    }

    #[inline]
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn needs_info(&self) -> bool {
        self.need_info.load(Ordering::Acquire)
    }

    /// Sets the changed flag.
    ///
    /// Lists ignore the call unless change info is enabled. With
    /// `tell_parents` every parent list is marked changed, even if this
    /// state already was, because an ancestor may still be clean. With
    /// `tell_children` child lists are reset to unchanged.
    pub fn set_changed(&self, value: bool, tell_parents: bool, tell_children: bool) {
        if self.is_list && !self.needs_info() {
            return;
        }
        self.changed.store(value, Ordering::Release);

        if tell_parents {
            for parent in self.parents() {
                parent.set_changed(true, true, false);
            }
        }
        if tell_children {
            for child in self.children() {
                if child.is_list {
                    child.set_changed(false, false, true);
                }
            }
        }
    }

    /// Switches change info on or off for this list and all child lists.
    pub fn enable_info(&self, enabled: bool) {
        self.need_info.store(enabled, Ordering::Release);
        for child in self.children() {
            if child.is_list {
                child.enable_info(enabled);
            }
        }
    }

    /// Links `child` below `parent`.
    pub(crate) fn link(parent: &Arc<ContentState>, child: &Arc<ContentState>) {
        child.links.lock().parents.push(Arc::downgrade(parent));
        parent.links.lock().children.push(Arc::downgrade(child));
        if parent.needs_info() && child.is_list {
            child.enable_info(true);
        }
    }

    /// Removes one link between `parent` and `child`.
    pub(crate) fn unlink(parent: &Arc<ContentState>, child: &Arc<ContentState>) {
        let parent_ptr = Arc::as_ptr(parent);
        let child_ptr = Arc::as_ptr(child);
        {
            let mut links = child.links.lock();
            if let Some(i) = links.parents.iter().position(|p| p.as_ptr() == parent_ptr) {
                links.parents.remove(i);
            }
        }
        let mut links = parent.links.lock();
        if let Some(i) = links.children.iter().position(|c| c.as_ptr() == child_ptr) {
            links.children.remove(i);
        }
    }

    /// Number of live parent links.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.links
            .lock()
            .parents
            .iter()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    fn parents(&self) -> SmallVec<[Arc<ContentState>; 2]> {
        let mut links = self.links.lock();
        links.parents.retain(|p| p.strong_count() > 0);
        links.parents.iter().filter_map(Weak::upgrade).collect()
    }

    fn children(&self) -> Vec<Arc<ContentState>> {
        let mut links = self.links.lock();
        links.children.retain(|c| c.strong_count() > 0);
        links.children.iter().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> Arc<ContentState> {
        Arc::new(ContentState::list())
    }

    #[test]
    fn test_disabled_list_ignores_changes() {
        let a = list();
        a.set_changed(true, true, false);
        assert!(!a.is_changed());
    }

    #[test]
    fn test_already_changed_parent_still_forwards() {
        let root = list();
        let mid = list();
        let leaf = Arc::new(ContentState::leaf());
        root.enable_info(true);
        ContentState::link(&root, &mid);
        ContentState::link(&mid, &leaf);
        assert!(mid.needs_info());

        mid.set_changed(true, false, false);
        assert!(mid.is_changed());
        assert!(!root.is_changed());

        leaf.set_changed(true, true, false);
        assert!(root.is_changed());
    }

    #[test]
    fn test_reset_children() {
        let root = list();
        let child = list();
        root.enable_info(true);
        ContentState::link(&root, &child);
        child.set_changed(true, true, false);
        assert!(root.is_changed() && child.is_changed());

        root.set_changed(false, false, true);
        assert!(!root.is_changed());
        assert!(!child.is_changed());
    }

    #[test]
    fn test_unlink_stops_propagation() {
        let root = list();
        let child = Arc::new(ContentState::leaf());
        root.enable_info(true);
        ContentState::link(&root, &child);
        ContentState::unlink(&root, &child);
        assert_eq!(child.parent_count(), 0);

        child.set_changed(true, true, false);
        assert!(!root.is_changed());
    }
}
