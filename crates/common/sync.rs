//! Shared pointer cells used for lazily initialized, process-wide values.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A typed, nullable shared pointer with atomic load and store.
///
/// Loads observe the most recent completed store.
#[derive(Debug)]
pub struct AtomicPtr<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> Default for AtomicPtr<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

impl<T> AtomicPtr<T> {
    pub fn new(value: Option<Arc<T>>) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub fn load(&self) -> Option<Arc<T>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, value: Option<Arc<T>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Stores `value` and returns the previous content.
    pub fn swap(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        std::mem::replace(
            &mut *self.inner.write().unwrap_or_else(PoisonError::into_inner),
            value,
        )
    }
}

/// An [`AtomicPtr`] paired with a lock for double-checked initialization
/// and teardown.
#[derive(Debug)]
pub struct LockablePtr<T> {
    ptr: AtomicPtr<T>,
    lock: Mutex<()>,
}

impl<T> Default for LockablePtr<T> {
    fn default() -> Self {
        Self {
            ptr: AtomicPtr::default(),
            lock: Mutex::new(()),
        }
    }
}

/// Result of a conditional lock attempt.
pub enum LockOutcome<'a, T> {
    /// The condition did not hold; no lock is held.
    Observed(Option<Arc<T>>),
    /// The condition held after taking the lock.
    Locked(PtrGuard<'a, T>),
}

/// Exclusive access to a [`LockablePtr`]. Dropping the guard without calling
/// [`PtrGuard::unlock`] releases the lock and leaves the value untouched.
pub struct PtrGuard<'a, T> {
    owner: &'a LockablePtr<T>,
    current: Option<Arc<T>>,
    _lock: MutexGuard<'a, ()>,
}

impl<T> PtrGuard<'_, T> {
    pub fn current(&self) -> Option<&Arc<T>> {
        self.current.as_ref()
    }

    /// Publishes `value` and releases the lock.
    pub fn unlock(self, value: Option<Arc<T>>) {
        self.owner.ptr.store(value);
    }
}

impl<T> LockablePtr<T> {
    pub fn load(&self) -> Option<Arc<T>> {
        self.ptr.load()
    }

    /// Locks only while the pointer is empty.
    pub fn lock_if_nil(&self) -> LockOutcome<'_, T> {
        self.lock_when(|value| value.is_none())
    }

    /// Locks only while the pointer holds a value.
    pub fn lock_if_not_nil(&self) -> LockOutcome<'_, T> {
        self.lock_when(|value| value.is_some())
    }

    /// Returns the current value, initializing it with `init` under the lock
    /// when empty. `init` runs at most once across concurrent callers that
    /// succeed.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        match self.lock_if_nil() {
            LockOutcome::Observed(Some(value)) => Ok(value),
            LockOutcome::Observed(None) => self.get_or_try_init(init),
            LockOutcome::Locked(guard) => {
                let value = Arc::new(init()?);
                guard.unlock(Some(value.clone()));
                Ok(value)
            }
        }
    }

    fn lock_when(&self, condition: impl Fn(&Option<Arc<T>>) -> bool) -> LockOutcome<'_, T> {
        let observed = self.ptr.load();
        if !condition(&observed) {
            return LockOutcome::Observed(observed);
        }
        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.ptr.load();
        if !condition(&current) {
            return LockOutcome::Observed(current);
        }
        LockOutcome::Locked(PtrGuard {
            owner: self,
            current,
            _lock: lock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn atomic_ptr_load_store() {
        let ptr = AtomicPtr::default();
        assert!(ptr.load().is_none());
        ptr.store(Some(Arc::new(3)));
        assert_eq!(ptr.load().as_deref(), Some(&3));
        assert_eq!(ptr.swap(None).as_deref(), Some(&3));
        assert!(ptr.load().is_none());
    }

    #[test]
    fn lock_if_nil_observes_existing_value() {
        let ptr = LockablePtr::default();
        ptr.get_or_try_init(|| Ok::<_, ()>(1)).unwrap();
        match ptr.lock_if_nil() {
            LockOutcome::Observed(value) => assert_eq!(value.as_deref(), Some(&1)),
            LockOutcome::Locked(_) => panic!("pointer is already set"),
        }
    }

    #[test]
    fn lock_if_not_nil_clears_value() {
        let ptr = LockablePtr::default();
        ptr.get_or_try_init(|| Ok::<_, ()>("db")).unwrap();
        match ptr.lock_if_not_nil() {
            LockOutcome::Locked(guard) => {
                assert_eq!(guard.current().map(|v| **v), Some("db"));
                guard.unlock(None);
            }
            LockOutcome::Observed(_) => panic!("pointer should be set"),
        }
        assert!(ptr.load().is_none());
        assert!(matches!(ptr.lock_if_not_nil(), LockOutcome::Observed(None)));
    }

    #[test]
    fn dropped_guard_keeps_value() {
        let ptr: LockablePtr<u8> = LockablePtr::default();
        if let LockOutcome::Locked(guard) = ptr.lock_if_nil() {
            drop(guard);
        }
        assert!(ptr.load().is_none());
        assert!(matches!(ptr.lock_if_nil(), LockOutcome::Locked(_)));
    }

    #[test]
    fn init_runs_once_under_contention() {
        let ptr = Arc::new(LockablePtr::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ptr = ptr.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    *ptr.get_or_try_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ()>(42u32)
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
