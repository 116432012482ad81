//! Node List Integration Tests
//!
//! Tests for:
//! - Fail-fast list traversal
//! - Content-changed propagation to transitive parents only
//! - Name and id lookup, pruning and copies

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use vizgraph::node::{self, NodeCore};
use vizgraph::pick::{PickNameStack, PickSelection};
use vizgraph::{
    ApplyContext, ApplyMode, EngineSettings, Node, NodeHandle, NodeHandleExt, NodeList, NodeRepository, Result,
    SoftwareDevice,
};

/// Leaf that counts its applications and returns a fixed result.
struct Counted {
    core: NodeCore,
    calls: Arc<AtomicUsize>,
    result: bool,
}

impl Counted {
    fn new(calls: &Arc<AtomicUsize>, result: bool) -> Self {
        Self {
            core: NodeCore::new("Counted"),
            calls: Arc::clone(calls),
            result,
        }
    }
}

impl Node for Counted {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn apply(&mut self, _mode: ApplyMode, _ctx: &mut ApplyContext<'_>) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }

    fn copy(&self) -> Box<dyn Node> {
        Box::new(Self::new(&self.calls, self.result))
    }
}

fn apply(handle: &NodeHandle) -> Result<bool> {
    let mut device = SoftwareDevice::new(8, 8);
    let settings = EngineSettings::default();
    let mut names = PickNameStack::default();
    let mut selection = PickSelection::new();
    let mut ctx = ApplyContext::new(&mut device, &settings, &mut names, &mut selection);
    handle
        .with(|node| node.apply(ApplyMode::Draw, &mut ctx))
        .unwrap_or(Ok(false))
}

fn changed(handle: &NodeHandle) -> bool {
    handle.with(|node| node.is_content_changed()).unwrap_or(false)
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn list_applies_children_in_order_and_stops_at_failure() {
    let repo = NodeRepository::new();
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));

    let mut list = NodeList::new();
    list.add(node::insert(&repo, Counted::new(&before, true)).unwrap());
    list.add(node::insert(&repo, Counted::new(&before, false)).unwrap());
    list.add(node::insert(&repo, Counted::new(&after, true)).unwrap());
    let list = node::insert(&repo, list).unwrap();

    assert!(!apply(&list).unwrap());
    assert_eq!(before.load(Ordering::SeqCst), 2);
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

#[test]
fn list_containing_itself_is_rejected() {
    let repo = NodeRepository::new();
    let list = node::insert(&repo, NodeList::new()).unwrap();
    let inner = list.clone();
    // The list is locked while `add` runs, so it cannot reach itself.
    let added = list.with_list(|l| l.add(inner)).unwrap();
    assert!(!added);
    assert_eq!(list.with_list(|l| l.len()), Some(0));
}

#[test]
fn list_restores_matrices() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut list = NodeList::new();
    list.add(node::insert(&repo, Counted::new(&calls, true)).unwrap());
    let list = node::insert(&repo, list).unwrap();

    let mut device = SoftwareDevice::new(8, 8);
    let settings = EngineSettings::default();
    let mut names = PickNameStack::default();
    let mut selection = PickSelection::new();
    let mut ctx = ApplyContext::new(&mut device, &settings, &mut names, &mut selection);
    let applied = list.with(|n| n.apply(ApplyMode::Pick, &mut ctx)).unwrap();

    assert!(applied.unwrap());
    assert!(ctx.matrices.is_empty());
    assert_eq!(ctx.names.depth(), 0);
}

// ============================================================================
// Content Changed
// ============================================================================

#[test]
fn content_changed_reaches_every_ancestor() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let leaf = node::insert(&repo, Counted::new(&calls, true)).unwrap();

    let mut mid = NodeList::new();
    mid.add(leaf.clone());
    let mid = node::insert(&repo, mid).unwrap();

    let mut sibling = NodeList::new();
    sibling.add(node::insert(&repo, Counted::new(&calls, true)).unwrap());
    let sibling = node::insert(&repo, sibling).unwrap();

    let mut root = NodeList::new();
    root.add(mid.clone());
    root.add(sibling.clone());
    root.enable_content_changed_info(true);
    root.set_content_changed(false, false, true);
    let root = node::insert(&repo, root).unwrap();
    assert!(!changed(&root) && !changed(&mid) && !changed(&sibling));

    leaf.with(|n| n.set_content_changed(true, true, false));

    assert!(changed(&mid));
    assert!(changed(&root));
    assert!(!changed(&sibling));
}

#[test]
fn content_changed_forwards_through_already_changed_parent() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let leaf = node::insert(&repo, Counted::new(&calls, true)).unwrap();

    let mut mid = NodeList::new();
    mid.add(leaf.clone());
    let mid = node::insert(&repo, mid).unwrap();

    let mut root = NodeList::new();
    root.add(mid.clone());
    root.enable_content_changed_info(true);
    let root = node::insert(&repo, root).unwrap();

    root.with_list(|l| l.set_content_changed(false, false, true));
    mid.with(|n| n.set_content_changed(true, false, false));
    assert!(changed(&mid) && !changed(&root));

    leaf.with(|n| n.set_content_changed(true, true, false));
    assert!(changed(&root));
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn list_finds_children_by_name_and_id() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut axis = Counted::new(&calls, true);
    axis.core_mut().set_name("axis");
    let axis = node::insert(&repo, axis).unwrap();
    let axis_id = axis.node_id().unwrap();

    let mut inner = NodeList::new();
    inner.add(axis.clone());
    let inner = node::insert(&repo, inner).unwrap();

    let mut root = NodeList::new();
    root.add(inner);
    let mut label = Counted::new(&calls, true);
    label.core_mut().set_name("axis");
    root.add(node::insert(&repo, label).unwrap());

    assert!(root.element_with_id(axis_id, false).is_none());
    assert!(root.element_with_id(axis_id, true).unwrap().same_resource(&axis));
    assert_eq!(root.elements_with_name("axis").len(), 1);

    root.delete_elements_with_name("axis");
    assert_eq!(root.len(), 1);
}

#[test]
fn prune_unique_keeps_shared_children() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let shared = node::insert(&repo, Counted::new(&calls, true)).unwrap();

    let mut list = NodeList::new();
    list.add(shared.clone());
    list.add(node::insert(&repo, Counted::new(&calls, true)).unwrap());
    list.prune_unique();

    assert_eq!(list.len(), 1);
    assert!(list.children().next().unwrap().same_resource(&shared));
    assert_eq!(repo.len().unwrap(), 1);
}

#[test]
fn list_copy_shares_children_with_fresh_id() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut list = NodeList::new();
    list.add(node::insert(&repo, Counted::new(&calls, true)).unwrap());
    let list = node::insert(&repo, list).unwrap();

    let copy = repo.copy(&list).unwrap();
    assert_ne!(copy.node_id(), list.node_id());
    assert_eq!(copy.with_list(|l| l.len()), Some(1));

    apply(&copy).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn list_keeps_id_index_for_remaining_duplicate() {
    let repo = NodeRepository::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let child = node::insert(&repo, Counted::new(&calls, true)).unwrap();
    let id = child.node_id().unwrap();

    let mut list = NodeList::new();
    assert!(list.add(child.clone()));
    assert!(list.add(child.clone()));

    assert!(list.delete(&child));
    assert_eq!(list.len(), 1);
    assert!(list.element_with_id(id, false).unwrap().same_resource(&child));

    assert!(list.delete(&child));
    assert!(list.element_with_id(id, false).is_none());
}
