use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Address of a shared allocation, used to key call-scoped Seen/Cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(usize);

impl Identity {
    pub(crate) fn of<T: ?Sized>(arc: &Arc<T>) -> Self {
        Self(Arc::as_ptr(arc) as *const () as usize)
    }
}

/// A reference-counted, mutable container. Clones share the same contents and identity,
/// which is what lets a value graph contain shared references and cycles.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Self(Arc::new(Mutex::new(inner)))
    }

    /// Locks the contents. A poisoned lock is recovered since the contents are plain data.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Clones the contents out so no lock is held while they are visited.
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    // The guard is held while the contents are printed, so a cycle back into this
    // container finds it locked and prints a marker instead of recursing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(inner) => fmt::Debug::fmt(&*inner, f),
            Err(TryLockError::Poisoned(poisoned)) => fmt::Debug::fmt(&**poisoned.get_ref(), f),
            Err(TryLockError::WouldBlock) => f.write_str("[Circular]"),
        }
    }
}
