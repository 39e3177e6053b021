//! Lock helpers that survive poisoning.
//!
//! Shared state in the router and job engine is only ever touched in short,
//! non-panicking critical sections, so a poisoned lock carries no broken
//! invariant worth propagating.

use std::sync::{Mutex, MutexGuard};

/// Extension trait for `Mutex` that ignores lock poisoning.
pub trait IgnoreLock<T> {
    /// Lock the mutex, recovering the guard if the lock is poisoned.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;

    /// Runs `operation` with the lock held and returns its result.
    fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, operation: F) -> R {
        let mut guard = self.lock_ignore_poison();
        operation(&mut guard)
    }
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
