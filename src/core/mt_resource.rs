use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` provides synchronized access to a value of type `T` that can be shared
/// across threads. It uses an `Arc<RwLock<T>>` internally. Chunks live in one of these so the
/// world can own them while meshing workers read them concurrently.
///
/// A panic while a guard is held poisons the lock. Chunk edits made by behaviour handlers are
/// journaled and rolled back on fault, so a poisoned lock still guards consistent data and the
/// accessors recover the guard instead of propagating the poison.
///
/// # Examples
///
/// ```
/// use voxel_runtime::core::MtResource;
///
/// let counter = MtResource::new(0);
/// *counter.get_mut() += 1;
/// assert_eq!(*counter.get(), 1);
/// ```
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard, blocking while a writer holds the lock.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(|poisoned| {
            log::warn!("Recovering read access to a poisoned resource");
            poisoned.into_inner()
        })
    }

    /// Returns a mutable guard, blocking while any other guard is held.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(|poisoned| {
            log::warn!("Recovering write access to a poisoned resource");
            poisoned.into_inner()
        })
    }

    /// Returns a mutable guard only if the lock is free right now.
    ///
    /// Used on paths that may re-enter a resource already held further up the stack, where
    /// blocking would deadlock.
    pub fn try_get_mut(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self.resource.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(PoisonError::into_inner(poisoned)),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Returns a read guard only if no writer holds the lock right now.
    pub fn try_get(&self) -> Option<RwLockReadGuard<'_, T>> {
        match self.resource.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(PoisonError::into_inner(poisoned)),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Whether both handles point at the same underlying value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
