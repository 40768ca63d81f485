//! Allocator abstraction used for every block the map owns.
//!
//! The map never touches the process heap directly: bucket arrays and
//! chain nodes are acquired and released through an [`Allocator`] handed
//! in at construction. `Global` is the default; `TrackingAllocator`
//! wraps another allocator and counts what goes through it.

use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

/// Returned when an allocator cannot satisfy a request, or when the
/// requested layout cannot be represented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}

/// Source of raw memory blocks.
///
/// # Safety
///
/// A successful `allocate`/`allocate_zeroed` must return a block valid
/// for reads and writes of `layout.size()` bytes, aligned to
/// `layout.align()`, that stays valid until passed to `release`.
/// Callers never request zero-sized layouts.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Like `allocate`, but the block is zero-filled.
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(layout)?;
        // SAFETY: `allocate` handed back `layout.size()` writable bytes.
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(ptr)
    }

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with the same `layout` and must
    /// not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate_zeroed(layout)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).release(ptr, layout)
    }
}

/// The process heap.
#[derive(Copy, Clone, Debug, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: layout is non-zero sized.
        NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(AllocError)
    }

    #[inline]
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: layout is non-zero sized.
        NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) }).ok_or(AllocError)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// Counting allocator for instrumentation and exhaustion testing.
///
/// Single-threaded, like the map. An optional budget caps how many more
/// allocations may succeed; once it hits zero every request fails with
/// [`AllocError`] until the budget is lifted.
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = Global> {
    inner: A,
    allocations: Cell<usize>,
    releases: Cell<usize>,
    live_bytes: Cell<usize>,
    budget: Cell<Option<usize>>,
}

impl TrackingAllocator<Global> {
    pub fn new() -> Self {
        Self::wrap(Global)
    }
}

impl<A> TrackingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            allocations: Cell::new(0),
            releases: Cell::new(0),
            live_bytes: Cell::new(0),
            budget: Cell::new(None),
        }
    }

    /// Successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    /// Blocks handed out and not yet released.
    pub fn live_allocations(&self) -> usize {
        self.allocations.get() - self.releases.get()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    /// Allow only `n` more successful allocations; `None` removes the cap.
    pub fn set_budget(&self, n: Option<usize>) {
        self.budget.set(n);
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget.get()
    }

    fn charge(&self) -> Result<(), AllocError> {
        match self.budget.get() {
            Some(0) => Err(AllocError),
            Some(n) => {
                self.budget.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record(&self, layout: Layout) {
        self.allocations.set(self.allocations.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + layout.size());
    }
}

unsafe impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.charge()?;
        let ptr = self.inner.allocate(layout)?;
        self.record(layout);
        Ok(ptr)
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.charge()?;
        let ptr = self.inner.allocate_zeroed(layout)?;
        self.record(layout);
        Ok(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        self.releases.set(self.releases.get() + 1);
        self.live_bytes.set(self.live_bytes.get() - layout.size());
        self.inner.release(ptr, layout)
    }
}
