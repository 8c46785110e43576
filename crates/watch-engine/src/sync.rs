use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a bookkeeping mutex, recovering the guard if a previous holder panicked.
///
/// Every map guarded this way is left consistent between statements, so a
/// poisoned lock carries no torn state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
