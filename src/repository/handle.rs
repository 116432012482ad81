//! Resource Handles
//!
//! A [`Handle`] is either fully invalid or fully valid and registered with
//! its repository. Cloning registers the clone, dropping deregisters it.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Resource, ResourceKey, Shared};
use crate::errors::VizError;

/// Identifies one live handle within a repository.
pub type HandleId = u64;

struct Link<T> {
    key: ResourceKey,
    id: HandleId,
    resource: Weak<Mutex<T>>,
    repo: Arc<Shared<T>>,
}

/// Reference-counted handle into a [`Repository`](super::Repository).
pub struct Handle<T: Resource> {
    link: Option<Link<T>>,
}

impl<T: Resource> Handle<T> {
    pub(crate) fn from_parts(
        key: ResourceKey,
        id: HandleId,
        resource: Weak<Mutex<T>>,
        repo: Arc<Shared<T>>,
    ) -> Self {
        Self {
            link: Some(Link {
                key,
                id,
                resource,
                repo,
            }),
        }
    }

    /// A handle that references nothing.
    #[must_use]
    pub const fn invalid() -> Self {
        Self { link: None }
    }

    /// True while the handle is registered and its resource alive.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.resource.strong_count() > 0)
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<ResourceKey> {
        self.link.as_ref().map(|link| link.key)
    }

    /// Id of this handle, `0` for an invalid handle.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.link.as_ref().map_or(0, |link| link.id)
    }

    /// Shared access to the resource, `None` once it is destroyed.
    #[must_use]
    pub fn resource(&self) -> Option<Arc<Mutex<T>>> {
        self.link.as_ref().and_then(|link| link.resource.upgrade())
    }

    /// Runs `f` on the resource, waiting at most the repository's lock timeout.
    ///
    /// Returns `None` if the handle is invalid or the resource stays locked,
    /// which also happens when a resource tries to reach itself.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let timeout = self.link.as_ref()?.repo.lock_timeout;
        self.try_with(timeout, f)
    }

    /// Runs `f` on the resource, waiting at most `timeout` for its lock.
    pub fn try_with<R>(&self, timeout: Duration, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let resource = self.resource()?;
        let mut guard = resource.try_lock_for(timeout)?;
        Some(f(&mut guard))
    }

    /// Number of live handles to this handle's resource, `0` if invalid.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        let Some(link) = &self.link else {
            return 0;
        };
        link.repo
            .lock()
            .map_or(0, |inner| inner.entries.get(link.key).map_or(0, |e| e.handles.len()))
    }

    /// True if both handles reference the same resource.
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        match (&self.link, &other.link) {
            (Some(a), Some(b)) => a.key == b.key && Arc::ptr_eq(&a.repo, &b.repo),
            _ => false,
        }
    }

    pub(crate) fn parts(&self) -> Option<(ResourceKey, Weak<Mutex<T>>)> {
        self.link
            .as_ref()
            .map(|link| (link.key, Weak::clone(&link.resource)))
    }

    pub(crate) fn repository_ptr(&self) -> Option<*const Shared<T>> {
        self.link.as_ref().map(|link| Arc::as_ptr(&link.repo))
    }

    /// Detaches the handle without deregistering it.
    pub(crate) fn invalidate(&mut self) -> Option<(ResourceKey, HandleId)> {
        self.link.take().map(|link| (link.key, link.id))
    }
}

impl<T: Resource> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: Resource> Clone for Handle<T> {
    fn clone(&self) -> Self {
        let Some(link) = &self.link else {
            return Self::invalid();
        };
        match link.repo.register(link.key) {
            Ok(id) => Self::from_parts(
                link.key,
                id,
                Weak::clone(&link.resource),
                Arc::clone(&link.repo),
            ),
            Err(err) => {
                log::warn!("Handle #{} could not be registered: {err}", link.id);
                Self::invalid()
            }
        }
    }
}

impl<T: Resource> Drop for Handle<T> {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        match link.repo.deregister(link.key, link.id) {
            Ok(()) => {}
            // The repository was reset; nothing left to release.
            Err(VizError::HandleNotFound(_)) => {}
            Err(_) => link.repo.defer_deregister(link.key, link.id),
        }
    }
}

impl<T: Resource> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_resource(other) || (self.link.is_none() && other.link.is_none())
    }
}

impl<T: Resource> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            Some(link) => f
                .debug_struct("Handle")
                .field("key", &link.key)
                .field("id", &link.id)
                .field("alive", &(link.resource.strong_count() > 0))
                .finish(),
            None => f.write_str("Handle(invalid)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Repository;
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    impl Resource for Counter {
        fn duplicate(&self) -> Self {
            Counter(self.0)
        }
    }

    #[test]
    fn test_handle_ids_are_distinct() {
        let repo = Repository::new();
        let a = repo.new_resource(Counter(1)).unwrap();
        let b = a.clone();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
    }

    #[test]
    fn test_with_mutates_shared_resource() {
        let repo = Repository::new();
        let a = repo.new_resource(Counter(1)).unwrap();
        let b = a.clone();
        a.with(|c| c.0 += 41).unwrap();
        assert_eq!(b.with(|c| c.0), Some(42));
    }

    #[test]
    fn test_invalid_handle() {
        let h: Handle<Counter> = Handle::invalid();
        assert!(!h.is_valid());
        assert_eq!(h.id(), 0);
        assert!(h.with(|c| c.0).is_none());
        assert!(!h.clone().is_valid());
    }

    #[test]
    fn test_copy_is_independent() {
        let repo = Repository::new();
        let a = repo.new_resource(Counter(7)).unwrap();
        let b = repo.copy(&a).unwrap();
        b.with(|c| c.0 = 8).unwrap();
        assert_eq!(a.with(|c| c.0), Some(7));
        assert_ne!(a, b);
        assert_eq!(repo.len().unwrap(), 2);
    }
}
