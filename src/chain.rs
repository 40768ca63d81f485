//! RawChain: doubly linked collision chain with allocator-backed nodes.
//!
//! The chain does not own an allocator. Every operation that acquires or
//! releases a node takes the allocator explicitly, so a whole bucket array
//! of chains can share the map's single allocator instance. The flip side
//! is that the chain cannot free itself on drop: the owner must call
//! `free_in` with the allocator the nodes came from. A chain dropped
//! while non-empty leaks its nodes.

use crate::alloc::{AllocError, Allocator};
use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;

struct Node<T> {
    prev: Option<NonNull<Node<T>>>,
    next: Option<NonNull<Node<T>>>,
    value: T,
}

/// Position of a linked node. Only meaningful for the chain that returned
/// it, and only until that node is removed.
#[derive(Debug)]
pub(crate) struct NodeRef<T>(NonNull<Node<T>>);

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for NodeRef<T> {}

pub(crate) struct RawChain<T> {
    head: Option<NonNull<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
    len: usize,
    _owns: PhantomData<T>,
}

impl<T> RawChain<T> {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link `value` at the back. On allocation failure the chain is
    /// unchanged and `value` is dropped.
    pub(crate) fn push_back_in<A>(&mut self, alloc: &A, value: T) -> Result<NodeRef<T>, AllocError>
    where
        A: Allocator + ?Sized,
    {
        let node = alloc.allocate(Layout::new::<Node<T>>())?.cast::<Node<T>>();
        // SAFETY: freshly allocated with Node<T>'s layout.
        unsafe {
            node.as_ptr().write(Node {
                prev: self.tail,
                next: None,
                value,
            });
        }
        match self.tail {
            // SAFETY: tail is a live node of this chain.
            Some(mut tail) => unsafe { tail.as_mut().next = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(node);
        self.len += 1;
        Ok(NodeRef(node))
    }

    /// First node, front to back, whose element satisfies `pred`.
    pub(crate) fn find<F>(&self, mut pred: F) -> Option<NodeRef<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let mut cur = self.head;
        while let Some(node) = cur {
            // SAFETY: every linked node stays valid while `self` is borrowed.
            let n = unsafe { node.as_ref() };
            if pred(&n.value) {
                return Some(NodeRef(node));
            }
            cur = n.next;
        }
        None
    }

    /// Unlink `node`, release its memory and hand back the element so the
    /// caller can run its own cleanup on it.
    ///
    /// # Safety
    ///
    /// `node` must be linked in this chain and `alloc` must be the
    /// allocator it was acquired from.
    pub(crate) unsafe fn remove_in<A>(&mut self, alloc: &A, node: NodeRef<T>) -> T
    where
        A: Allocator + ?Sized,
    {
        let ptr = node.0;
        let Node { prev, next, value } = ptr.as_ptr().read();
        match prev {
            Some(mut p) => p.as_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(mut n) => n.as_mut().prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        alloc.release(ptr.cast(), Layout::new::<Node<T>>());
        value
    }

    /// Empty the chain, passing every element to `dispose` front to back.
    ///
    /// The chain is detached before the first callback, so it is already
    /// empty if `dispose` panics; the nodes not yet visited are leaked.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator every node was acquired from.
    pub(crate) unsafe fn free_in<A, F>(&mut self, alloc: &A, mut dispose: F)
    where
        A: Allocator + ?Sized,
        F: FnMut(T),
    {
        let mut cur = self.head.take();
        self.tail = None;
        self.len = 0;
        while let Some(ptr) = cur {
            let node = ptr.as_ptr().read();
            alloc.release(ptr.cast(), Layout::new::<Node<T>>());
            cur = node.next;
            dispose(node.value);
        }
    }

    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head,
            remaining: self.len,
            _pd: PhantomData,
        }
    }
}

impl<T> Default for RawChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-to-back iterator over a chain's elements.
pub(crate) struct Iter<'c, T> {
    next: Option<NonNull<Node<T>>>,
    remaining: usize,
    _pd: PhantomData<&'c T>,
}

impl<'c, T> Iterator for Iter<'c, T> {
    type Item = &'c T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        // SAFETY: the chain is borrowed for 'c, so its nodes stay linked.
        let n = unsafe { &*node.as_ptr() };
        self.next = n.next;
        self.remaining -= 1;
        Some(&n.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'c, T> ExactSizeIterator for Iter<'c, T> {}

impl<'c, T> Clone for Iter<'c, T> {
    fn clone(&self) -> Self {
        Self {
            next: self.next,
            remaining: self.remaining,
            _pd: PhantomData,
        }
    }
}
