//! Lock helpers.

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, taking the guard back from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
