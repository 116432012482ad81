//! Node Factory Registry
//!
//! A process-wide table of named node constructors. Subsystems that need the
//! table take a [`RegistryLease`]; the first lease installs the built-in
//! node kinds and dropping the last one clears the table again, including
//! any factories registered in between.
//!
//! ```rust,ignore
//! let lease = vizgraph::registry::acquire();
//! let scene = vizgraph::registry::create("Scene").unwrap();
//! drop(lease);
//! ```

use std::sync::OnceLock;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::node::{Frame, Node, NodeList, Rect};
use crate::render_target::RenderTarget;
use crate::scene::Scene;

/// Constructor of a node with default configuration.
pub type NodeFactory = fn() -> Box<dyn Node>;

#[derive(Default)]
struct Registry {
    leases: usize,
    factories: FxHashMap<String, NodeFactory>,
}

impl Registry {
    fn install_builtins(&mut self) {
        let builtins: [(&str, NodeFactory); 5] = [
            ("List", || Box::new(NodeList::new())),
            ("Scene", || Box::new(Scene::new())),
            ("Frame", || Box::new(Frame::new())),
            ("Rect", || Box::new(Rect::new(0.0, 0.0, 1.0, 1.0))),
            ("RenderTarget", || Box::new(RenderTarget::new())),
        ];
        for (name, factory) in builtins {
            self.factories.insert(name.to_owned(), factory);
        }
    }
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

/// Keeps the registry loaded while alive.
#[must_use = "the registry is torn down when the last lease is dropped"]
pub struct RegistryLease {
    _private: (),
}

impl Drop for RegistryLease {
    fn drop(&mut self) {
        let mut reg = registry().lock();
        reg.leases = reg.leases.saturating_sub(1);
        if reg.leases == 0 {
            reg.factories.clear();
            log::debug!("Node registry torn down");
        }
    }
}

/// Takes a lease, loading the built-in factories if this is the first one.
pub fn acquire() -> RegistryLease {
    let mut reg = registry().lock();
    if reg.leases == 0 {
        reg.install_builtins();
        log::debug!("Node registry loaded with {} built-in kinds", reg.factories.len());
    }
    reg.leases += 1;
    RegistryLease { _private: () }
}

/// Number of live leases.
#[must_use]
pub fn lease_count() -> usize {
    registry().lock().leases
}

/// Adds or replaces a factory. Fails while no lease is held.
pub fn register(name: impl Into<String>, factory: NodeFactory) -> bool {
    let mut reg = registry().lock();
    if reg.leases == 0 {
        log::warn!("Node registry is not loaded, factory not registered");
        return false;
    }
    reg.factories.insert(name.into(), factory);
    true
}

/// Builds a node of kind `name`.
#[must_use]
pub fn create(name: &str) -> Option<Box<dyn Node>> {
    let factory = registry().lock().factories.get(name).copied();
    factory.map(|f| f())
}

/// Registered kind names, sorted.
#[must_use]
pub fn names() -> Vec<String> {
    let mut names: Vec<String> = registry().lock().factories.keys().cloned().collect();
    names.sort();
    names
}
