//! Resource Repository
//!
//! The repository exclusively owns its resources and keeps, per resource, the
//! list of live [`Handle`]s that reference it. A resource is destroyed exactly
//! once, synchronously, when the last handle deregisters.
//!
//! # Design Principles
//! - Resources live in a [`SlotMap`]; stale keys never alias a newer resource
//! - Cloning a [`Handle`] registers the clone, dropping it deregisters it
//! - Handles hold only weak access to the resource, so [`Repository::reset`]
//!   destroys every resource even while handles are still alive
//! - Every public operation takes the repository mutex with a bounded wait
//!   and reports [`VizError::LockTimeout`] instead of blocking forever
//!
//! ```rust,ignore
//! let repo = Repository::<Image>::new();
//! let a = repo.new_resource(Image::new(4, 4))?;
//! let b = a.clone();
//! assert_eq!(repo.ref_count(&a), 2);
//! drop(a);
//! drop(b); // image destroyed here
//! ```

pub mod handle;

pub use handle::{Handle, HandleId};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::errors::{Result, VizError};

new_key_type! {
    /// Stable key of a resource inside its repository.
    pub struct ResourceKey;
}

/// A payload that can live in a [`Repository`].
pub trait Resource: Send + 'static {
    /// Deep copy used by [`Repository::copy`].
    fn duplicate(&self) -> Self
    where
        Self: Sized;
}

/// Default bounded wait for repository operations.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

pub(crate) struct Entry<T> {
    /// The owning reference; handles only hold weak ones.
    #[allow(dead_code)]
    pub(crate) resource: Arc<Mutex<T>>,
    pub(crate) handles: SmallVec<[HandleId; 4]>,
}

pub(crate) struct Inner<T> {
    pub(crate) entries: SlotMap<ResourceKey, Entry<T>>,
    next_handle: HandleId,
}

impl<T> Inner<T> {
    fn next_handle_id(&mut self) -> HandleId {
        self.next_handle += 1;
        self.next_handle
    }

    /// Removes a handle id and hands back the entry if it was the last one.
    fn remove_handle(&mut self, key: ResourceKey, id: HandleId) -> Result<Option<Entry<T>>> {
        let Some(entry) = self.entries.get_mut(key) else {
            return Err(VizError::HandleNotFound(id));
        };
        let Some(pos) = entry.handles.iter().position(|h| *h == id) else {
            return Err(VizError::HandleNotFound(id));
        };
        entry.handles.swap_remove(pos);
        if entry.handles.is_empty() {
            Ok(self.entries.remove(key))
        } else {
            Ok(None)
        }
    }
}

pub(crate) struct Shared<T> {
    pub(crate) inner: Mutex<Inner<T>>,
    /// Handles dropped while the repository lock was busy.
    pending: Mutex<Vec<(ResourceKey, HandleId)>>,
    pub(crate) lock_timeout: Duration,
}

impl<T> Shared<T> {
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Inner<T>>> {
        let mut guard = self.inner.try_lock_for(self.lock_timeout).ok_or_else(|| {
            log::warn!(
                "Repository lock not acquired within {} ms",
                self.lock_timeout.as_millis()
            );
            VizError::LockTimeout(self.lock_timeout.as_millis() as u64)
        })?;
        self.release_pending(&mut guard);
        Ok(guard)
    }

    /// Queues a deregistration that could not take the lock. It runs the
    /// next time anyone acquires the repository.
    pub(crate) fn defer_deregister(&self, key: ResourceKey, id: HandleId) {
        log::debug!("Repository busy, deferring release of handle #{id}");
        self.pending.lock().push((key, id));
    }

    /// Applies queued deregistrations. Emptied resources are dropped with
    /// the lock released, since they may own handles into this repository.
    fn release_pending(&self, guard: &mut MutexGuard<'_, Inner<T>>) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }
        let removed: Vec<Entry<T>> = pending
            .into_iter()
            .filter_map(|(key, id)| guard.remove_handle(key, id).ok().flatten())
            .collect();
        if !removed.is_empty() {
            MutexGuard::unlocked(guard, || drop(removed));
        }
    }

    /// Adds a handle id to a resource's live list.
    pub(crate) fn register(&self, key: ResourceKey) -> Result<HandleId> {
        let mut inner = self.lock()?;
        let id = inner.next_handle_id();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.handles.push(id);
                Ok(id)
            }
            None => Err(VizError::HandleNotFound(id)),
        }
    }

    /// Removes a handle id; destroys the resource when its list empties.
    pub(crate) fn deregister(&self, key: ResourceKey, id: HandleId) -> Result<()> {
        let removed = self.lock()?.remove_handle(key, id)?;
        // Resources may own handles into this repository; drop them unlocked.
        drop(removed);
        Ok(())
    }
}

/// Owner of reference-counted resources.
///
/// Cloning a `Repository` yields another view onto the same storage.
pub struct Repository<T: Resource> {
    shared: Arc<Shared<T>>,
}

impl<T: Resource> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Resource> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> Repository<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    entries: SlotMap::with_key(),
                    next_handle: 0,
                }),
                pending: Mutex::new(Vec::new()),
                lock_timeout,
            }),
        }
    }

    /// Takes ownership of `value` and returns the first handle to it.
    pub fn new_resource(&self, value: T) -> Result<Handle<T>> {
        let resource = Arc::new(Mutex::new(value));
        let weak = Arc::downgrade(&resource);
        let (key, id) = {
            let mut inner = self.shared.lock()?;
            let id = inner.next_handle_id();
            let mut handles = SmallVec::new();
            handles.push(id);
            let key = inner.entries.insert(Entry { resource, handles });
            (key, id)
        };
        Ok(Handle::from_parts(key, id, weak, Arc::clone(&self.shared)))
    }

    /// Stores a deep copy of the resource behind `handle`.
    pub fn copy(&self, handle: &Handle<T>) -> Result<Handle<T>> {
        let resource = handle.resource().ok_or(VizError::InvalidHandle)?;
        let duplicate = resource
            .try_lock_for(self.shared.lock_timeout)
            .map(|guard| guard.duplicate())
            .ok_or(VizError::LockTimeout(self.shared.lock_timeout.as_millis() as u64))?;
        drop(resource);
        self.new_resource(duplicate)
    }

    /// Registers an additional handle to the resource behind `handle`.
    ///
    /// Equivalent to `handle.clone()` but reports failures instead of
    /// returning an invalid handle.
    pub fn register(&self, handle: &Handle<T>) -> Result<Handle<T>> {
        let (key, weak) = handle.parts().ok_or(VizError::InvalidHandle)?;
        if !self.owns(handle) {
            return Err(VizError::HandleNotFound(handle.id()));
        }
        let id = self.shared.register(key)?;
        Ok(Handle::from_parts(key, id, weak, Arc::clone(&self.shared)))
    }

    /// Deregisters `handle`, destroying the resource if it was the last one.
    ///
    /// Fails with [`VizError::HandleNotFound`] if the resource is not owned by
    /// this repository (for example after [`Repository::reset`]).
    pub fn deregister(&self, mut handle: Handle<T>) -> Result<()> {
        if !self.owns(&handle) {
            return Err(VizError::HandleNotFound(handle.id()));
        }
        let Some((key, id)) = handle.invalidate() else {
            return Err(VizError::InvalidHandle);
        };
        self.shared.deregister(key, id)
    }

    /// Destroys every resource. Live handles become invalid but stay usable
    /// as values; dropping them later is a no-op.
    pub fn reset(&self) -> Result<()> {
        let drained: Vec<Entry<T>> = {
            let mut inner = self.shared.lock()?;
            self.shared.pending.lock().clear();
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };
        log::debug!("Repository reset, {} resources destroyed", drained.len());
        drop(drained);
        Ok(())
    }

    /// Number of live handles to the resource behind `handle`.
    #[must_use]
    pub fn ref_count(&self, handle: &Handle<T>) -> usize {
        let Some(key) = handle.key() else {
            return 0;
        };
        match self.shared.lock() {
            Ok(inner) => inner.entries.get(key).map_or(0, |e| e.handles.len()),
            Err(_) => 0,
        }
    }

    /// Number of owned resources.
    pub fn len(&self) -> Result<usize> {
        Ok(self.shared.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Acquires the repository mutex for a caller-chosen wait.
    ///
    /// While the guard is held every other repository operation waits or
    /// times out. Handles dropped in the meantime are released when the
    /// guard goes away.
    pub fn lock(&self, timeout: Duration) -> Result<RepositoryLock<'_, T>> {
        let mut guard = self
            .shared
            .inner
            .try_lock_for(timeout)
            .ok_or(VizError::LockTimeout(timeout.as_millis() as u64))?;
        self.shared.release_pending(&mut guard);
        Ok(RepositoryLock {
            shared: &self.shared,
            guard,
        })
    }

    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.shared.lock_timeout
    }

    fn owns(&self, handle: &Handle<T>) -> bool {
        handle
            .repository_ptr()
            .is_some_and(|ptr| std::ptr::eq(ptr, Arc::as_ptr(&self.shared)))
    }
}

/// Exclusive view of a repository, returned by [`Repository::lock`].
pub struct RepositoryLock<'a, T> {
    shared: &'a Shared<T>,
    guard: MutexGuard<'a, Inner<T>>,
}

impl<T> Drop for RepositoryLock<'_, T> {
    fn drop(&mut self) {
        self.shared.release_pending(&mut self.guard);
    }
}

impl<T> RepositoryLock<'_, T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: ResourceKey) -> bool {
        self.guard.entries.contains_key(key)
    }

    /// Total number of live handles across all resources.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.guard.entries.values().map(|e| e.handles.len()).sum()
    }
}
