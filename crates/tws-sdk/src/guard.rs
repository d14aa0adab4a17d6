//! Re-entrancy guards.
//!
//! [`Reentrant`] breaks runtime recursion: while a guarded computation is
//! running, entering it again yields the cached result of the last completed
//! run. [`OverrideGuard`] installs a temporary value in a slot and puts the
//! previous one back on drop, including during unwinding.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of [`Reentrant::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum Reentry<T> {
    /// The computation ran; carries its result.
    Ran(T),
    /// The guard was already active; carries the last completed result.
    Cached(Option<T>),
}

impl<T> Reentry<T> {
    pub fn is_cached(&self) -> bool {
        matches!(self, Reentry::Cached(_))
    }

    /// The fresh or cached result, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Reentry::Ran(value) => Some(value),
            Reentry::Cached(value) => value,
        }
    }
}

/// Guard cell for computations that must not recurse into themselves.
///
/// # Example
///
/// ```rust
/// use tws_sdk::{Reentrant, Reentry};
///
/// let guard: Reentrant<f64> = Reentrant::new();
/// let outer = guard.run(|| {
///     // A listener fired from inside the computation calls back in.
///     assert_eq!(guard.run(|| 99.0), Reentry::Cached(None));
///     21.5
/// });
/// assert_eq!(outer, Reentry::Ran(21.5));
/// assert_eq!(guard.run(|| 7.0), Reentry::Ran(7.0));
/// assert_eq!(guard.last(), Some(7.0));
/// ```
#[derive(Debug)]
pub struct Reentrant<T> {
    active: AtomicBool,
    last: Mutex<Option<T>>,
}

struct ActiveFlag<'a>(&'a AtomicBool);

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Clone> Reentrant<T> {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            last: Mutex::new(None),
        }
    }

    /// Run `f` unless the guard is already active.
    ///
    /// The active flag is cleared even if `f` panics; a panicking run
    /// leaves the cached value unchanged.
    pub fn run<F>(&self, f: F) -> Reentry<T>
    where
        F: FnOnce() -> T,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Reentry::Cached(self.last());
        }

        let _flag = ActiveFlag(&self.active);
        let value = f();
        *self.last.lock() = Some(value.clone());
        Reentry::Ran(value)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Result of the last completed run.
    pub fn last(&self) -> Option<T> {
        self.last.lock().clone()
    }
}

impl<T: Clone> Default for Reentrant<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped override of an optional slot.
///
/// Dropping the guard restores whatever the slot held before, so nested
/// overrides unwind in order.
pub struct OverrideGuard<'a, T: Copy> {
    slot: &'a Mutex<Option<T>>,
    previous: Option<T>,
}

impl<'a, T: Copy> OverrideGuard<'a, T> {
    pub fn install(slot: &'a Mutex<Option<T>>, value: T) -> Self {
        let previous = slot.lock().replace(value);
        Self { slot, previous }
    }
}

impl<T: Copy> Drop for OverrideGuard<'_, T> {
    fn drop(&mut self) {
        *self.slot.lock() = self.previous;
    }
}
