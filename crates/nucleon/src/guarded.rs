//! Values behind a timed mutual-exclusion lock.
//!
//! The typical owner is a drawing thread sharing its model with a producer
//! thread: every access goes through [`Guarded::acquire`], and the returned
//! [`GuardedRef`] is the only path to the payload. Release consumes the guard,
//! so a released value cannot be touched again.

use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::check;
use crate::error::{Error, Result};
use crate::port::Timeout;
use crate::sync::{Mutex, MutexGuard};

pub struct Guarded<T> {
    value: Mutex<T>,
}

/// Exclusive access to a [`Guarded`] payload. Dropping it releases the lock.
pub struct GuardedRef<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Guarded<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: parking_lot::const_mutex(value),
        }
    }

    /// Waits up to `timeout` for exclusive access.
    ///
    /// Acquiring again while already holding the value is not detected; with
    /// a finite timeout it ends in [`Error::Timeout`].
    pub fn acquire(&self, timeout: Timeout) -> Result<GuardedRef<'_, T>> {
        let guard = match timeout {
            Timeout::Immediate => self.value.try_lock(),
            Timeout::After(limit) => self.value.try_lock_for(limit),
            Timeout::Forever => Some(self.value.lock()),
        };
        match guard {
            Some(guard) => Ok(GuardedRef { guard }),
            None => {
                log::warn!(target: "guarded", "acquire timed out after {timeout:?}");
                Err(Error::Timeout)
            }
        }
    }

    pub fn try_acquire(&self) -> Option<GuardedRef<'_, T>> {
        self.value.try_lock().map(|guard| GuardedRef { guard })
    }

    /// Acquires or halts. For callers that hold exclusivity by construction,
    /// where contention means a broken invariant.
    #[track_caller]
    pub fn acquire_or_die(&self, timeout: Timeout) -> GuardedRef<'_, T> {
        match self.acquire(timeout) {
            Ok(guard) => guard,
            Err(_) => check::crash("guarded value still held after the allowed timeout"),
        }
    }

    /// Returns the lock. Equivalent to dropping the guard.
    pub fn release(&self, guard: GuardedRef<'_, T>) {
        check!(
            core::ptr::eq(MutexGuard::mutex(&guard.guard), &self.value),
            "released a guard that belongs to another value"
        );
        drop(guard);
    }

    /// Copies the payload out under the lock.
    pub fn read(&self, timeout: Timeout) -> Result<T>
    where
        T: Clone,
    {
        self.acquire(timeout).map(|guard| T::clone(&guard))
    }

    /// Replaces the payload under the lock.
    pub fn write(&self, value: T, timeout: Timeout) -> Result<()> {
        let mut guard = self.acquire(timeout)?;
        *guard = value;
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("locked", &self.value.is_locked())
            .finish()
    }
}

impl<T> Deref for GuardedRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GuardedRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
