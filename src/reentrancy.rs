//! Debug-only reentrancy check.
//!
//! The map calls the user's hash function and equality predicate while it
//! walks a chain. A `ReentrancyCheck` embedded in the map turns a nested
//! call back into the same map from one of those into a panic in debug
//! builds. In release builds it is a zero-sized no-op.
//!
//! Cleanup hooks are never run under the check: every operation unlinks
//! the destroyed entry and leaves the guarded section before its hooks run.

use core::cell::Cell;
use core::marker::PhantomData;

/// Per-map tracker; guard an operation with `let _g = self.reentrancy.enter();`.
#[derive(Debug)]
pub(crate) struct ReentrancyCheck {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Single-threaded like the map itself.
    _nosend: PhantomData<*mut ()>,
}

impl ReentrancyCheck {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Mark the map busy until the returned guard drops. Panics in debug
    /// builds if it already is.
    #[inline]
    pub(crate) fn enter(&self) -> Entered<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrancy detected: map re-entered from its own hash or equality callback"
            );
            Entered { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Entered { _z: PhantomData }
        }
    }
}

/// RAII guard returned by [`ReentrancyCheck::enter`].
pub(crate) struct Entered<'a> {
    #[cfg(debug_assertions)]
    owner: &'a ReentrancyCheck,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}
