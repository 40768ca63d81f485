//! ChainedHashMap: fixed bucket array with one collision chain per bucket.

use crate::alloc::{AllocError, Allocator, Global};
use crate::chain::{self, RawChain};
use crate::hash::{Identity, KeyEq, KeyHash};
use crate::reentrancy::ReentrancyCheck;
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Hook run on a key whenever its entry is destroyed.
pub type KeyFreeFn<'a, K> = Box<dyn FnMut(&'a K) + 'a>;
/// Hook run on a data reference whenever its entry is destroyed.
pub type DataFreeFn<'a, V> = Box<dyn FnMut(&'a V) + 'a>;

/// One stored association. The map owns this record, never the key or
/// data it points at.
pub struct Entry<'a, K: ?Sized, V: ?Sized> {
    key: &'a K,
    data: &'a V,
}

impl<'a, K: ?Sized, V: ?Sized> Entry<'a, K, V> {
    pub fn key(&self) -> &'a K {
        self.key
    }

    pub fn data(&self) -> &'a V {
        self.data
    }
}

impl<K: ?Sized + fmt::Debug, V: ?Sized + fmt::Debug> fmt::Debug for Entry<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("data", &self.data)
            .finish()
    }
}

struct Bucket<'a, K: ?Sized, V: ?Sized> {
    chain: RawChain<Entry<'a, K, V>>,
}

/// Bucket storage acquired from the map's allocator.
struct BucketArray<'a, K: ?Sized, V: ?Sized> {
    ptr: NonNull<Bucket<'a, K, V>>,
    len: usize,
}

impl<'a, K: ?Sized, V: ?Sized> BucketArray<'a, K, V> {
    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::array::<Bucket<'a, K, V>>(len).map_err(|_| AllocError)
    }

    fn allocate_in<A: Allocator>(alloc: &A, len: usize) -> Result<Self, AllocError> {
        let ptr = alloc
            .allocate_zeroed(Self::layout(len)?)?
            .cast::<Bucket<'a, K, V>>();
        for i in 0..len {
            // SAFETY: `ptr` holds `len` uninitialized buckets.
            unsafe {
                ptr.as_ptr().add(i).write(Bucket {
                    chain: RawChain::new(),
                })
            };
        }
        Ok(Self { ptr, len })
    }

    fn as_slice(&self) -> &[Bucket<'a, K, V>] {
        // SAFETY: `len` buckets were initialized in `allocate_in`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [Bucket<'a, K, V>] {
        // SAFETY: as above, and `&mut self` makes the borrow unique.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// # Safety
    ///
    /// Every chain must already be empty and `alloc` must be the allocator
    /// the array came from.
    unsafe fn release_in<A: Allocator>(&mut self, alloc: &A) {
        if let Ok(layout) = Self::layout(self.len) {
            alloc.release(self.ptr.cast(), layout);
        }
    }
}

/// Cleanup protocol: run the configured hooks on a destroyed entry's key
/// and data. The entry record itself is released by the chain.
struct Cleanup<'a, K: ?Sized, V: ?Sized> {
    key_free: Option<KeyFreeFn<'a, K>>,
    data_free: Option<DataFreeFn<'a, V>>,
}

impl<'a, K: ?Sized, V: ?Sized> Cleanup<'a, K, V> {
    fn run(&mut self, entry: Entry<'a, K, V>) {
        if let Some(f) = self.key_free.as_mut() {
            f(entry.key);
        }
        if let Some(f) = self.data_free.as_mut() {
            f(entry.data);
        }
    }
}

/// Hash map with a fixed number of buckets and separate chaining.
///
/// Keys and data are borrowed for `'a`; the map owns only its bucket array
/// and the per-entry records, all acquired from `A`. Equality defaults to
/// [`Identity`]: a lookup matches only the very reference that was stored.
///
/// Not `Send`/`Sync`: the map is single-threaded and has no internal
/// locking.
pub struct ChainedHashMap<'a, K: ?Sized, V: ?Sized, H, E = Identity, A: Allocator = Global> {
    buckets: BucketArray<'a, K, V>,
    len: usize,
    hasher: H,
    equality: E,
    cleanup: Cleanup<'a, K, V>,
    alloc: A,
    reentrancy: ReentrancyCheck,
    _owns: PhantomData<Entry<'a, K, V>>,
}

/// Construction-time configuration for [`ChainedHashMap`].
pub struct Builder<'a, K: ?Sized, V: ?Sized, H, E = Identity, A = Global> {
    num_buckets: usize,
    hasher: H,
    equality: E,
    alloc: A,
    cleanup: Cleanup<'a, K, V>,
}

impl<'a, K: ?Sized, V: ?Sized, H> Builder<'a, K, V, H> {
    pub fn new(num_buckets: usize, hasher: H) -> Self {
        Self {
            num_buckets,
            hasher,
            equality: Identity,
            alloc: Global,
            cleanup: Cleanup {
                key_free: None,
                data_free: None,
            },
        }
    }
}

impl<'a, K: ?Sized, V: ?Sized, H, E, A> Builder<'a, K, V, H, E, A> {
    /// Replace the key-equality predicate.
    pub fn equality<E2>(self, equality: E2) -> Builder<'a, K, V, H, E2, A>
    where
        E2: KeyEq<K>,
    {
        Builder {
            num_buckets: self.num_buckets,
            hasher: self.hasher,
            equality,
            alloc: self.alloc,
            cleanup: self.cleanup,
        }
    }

    /// Acquire all map memory from `alloc` instead of the global heap.
    pub fn allocator<A2>(self, alloc: A2) -> Builder<'a, K, V, H, E, A2>
    where
        A2: Allocator,
    {
        Builder {
            num_buckets: self.num_buckets,
            hasher: self.hasher,
            equality: self.equality,
            alloc,
            cleanup: self.cleanup,
        }
    }

    /// Hook called with the key of every entry the map destroys.
    pub fn key_free<F>(mut self, f: F) -> Self
    where
        F: FnMut(&'a K) + 'a,
    {
        self.cleanup.key_free = Some(Box::new(f));
        self
    }

    /// Hook called with the data of every entry the map destroys.
    pub fn data_free<F>(mut self, f: F) -> Self
    where
        F: FnMut(&'a V) + 'a,
    {
        self.cleanup.data_free = Some(Box::new(f));
        self
    }

    /// Allocate the bucket array and assemble the map.
    ///
    /// # Panics
    ///
    /// Panics if `num_buckets` is zero.
    pub fn build(self) -> Result<ChainedHashMap<'a, K, V, H, E, A>, AllocError>
    where
        H: KeyHash<K>,
        E: KeyEq<K>,
        A: Allocator,
    {
        assert!(self.num_buckets > 0, "ChainedHashMap needs at least one bucket");
        let buckets = BucketArray::allocate_in(&self.alloc, self.num_buckets)?;
        Ok(ChainedHashMap {
            buckets,
            len: 0,
            hasher: self.hasher,
            equality: self.equality,
            cleanup: self.cleanup,
            alloc: self.alloc,
            reentrancy: ReentrancyCheck::new(),
            _owns: PhantomData,
        })
    }
}

impl<'a, K: ?Sized, V: ?Sized, H> ChainedHashMap<'a, K, V, H>
where
    H: KeyHash<K>,
{
    /// Empty map with identity equality, no cleanup hooks and the global heap.
    ///
    /// # Panics
    ///
    /// Panics if `num_buckets` is zero.
    pub fn new(num_buckets: usize, hasher: H) -> Result<Self, AllocError> {
        Builder::new(num_buckets, hasher).build()
    }

    pub fn builder(num_buckets: usize, hasher: H) -> Builder<'a, K, V, H> {
        Builder::new(num_buckets, hasher)
    }
}

impl<'a, K: ?Sized, V: ?Sized, H, E, A> ChainedHashMap<'a, K, V, H, E, A>
where
    H: KeyHash<K>,
    E: KeyEq<K>,
    A: Allocator,
{
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket count fixed at construction.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    fn bucket_index(&self, key: &K) -> usize {
        (self.hasher.hash_key(key) % self.buckets.len as u64) as usize
    }

    fn find_entry(&self, key: &K) -> Option<&Entry<'a, K, V>> {
        let idx = self.bucket_index(key);
        self.buckets.as_slice()[idx]
            .chain
            .iter()
            .find(|e| self.equality.keys_equal(e.key, key))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter();
        self.find_entry(key).is_some()
    }

    /// The data stored under `key`, as the exact reference passed to `set`.
    pub fn get(&self, key: &K) -> Option<&'a V> {
        let _g = self.reentrancy.enter();
        self.find_entry(key).map(|e| e.data)
    }

    /// Store `data` under `key`.
    ///
    /// A new entry record is allocated and appended to the bucket's chain.
    /// If an equal key was already present, its entry is then unlinked and
    /// the cleanup hooks run on the old key and data, so a replaced key
    /// moves to the back of its chain and the size is unchanged.
    ///
    /// The allocation happens before anything else is touched: on `Err`
    /// the map is unchanged and no hook has run.
    pub fn set(&mut self, key: &'a K, data: &'a V) -> Result<(), AllocError> {
        let replaced = {
            let _g = self.reentrancy.enter();
            let idx = self.bucket_index(key);
            let equality = &self.equality;
            let chain = &mut self.buckets.as_mut_slice()[idx].chain;
            let old = chain.find(|e| equality.keys_equal(e.key, key));
            chain.push_back_in(&self.alloc, Entry { key, data })?;
            match old {
                // SAFETY: found in this chain before the append, which leaves
                // existing nodes linked; all nodes come from `self.alloc`.
                Some(node) => Some(unsafe { chain.remove_in(&self.alloc, node) }),
                None => {
                    self.len += 1;
                    None
                }
            }
        };
        if let Some(old) = replaced {
            self.cleanup.run(old);
        }
        Ok(())
    }

    /// Remove the entry for `key`, running the cleanup hooks on it.
    /// Returns `false` if no such entry exists.
    pub fn erase(&mut self, key: &K) -> bool {
        let removed = {
            let _g = self.reentrancy.enter();
            let idx = self.bucket_index(key);
            let equality = &self.equality;
            let chain = &mut self.buckets.as_mut_slice()[idx].chain;
            match chain.find(|e| equality.keys_equal(e.key, key)) {
                // SAFETY: found in this chain; all nodes come from `self.alloc`.
                Some(node) => unsafe { chain.remove_in(&self.alloc, node) },
                None => return false,
            }
        };
        self.len -= 1;
        self.cleanup.run(removed);
        true
    }

    /// Destroy every entry, running the cleanup hooks once per entry. Each
    /// chain is detached before its hooks run. The bucket array and
    /// configuration are kept, so the map is afterwards indistinguishable
    /// from a freshly built one.
    pub fn clear(&mut self) {
        let cleanup = &mut self.cleanup;
        let len = &mut self.len;
        for bucket in self.buckets.as_mut_slice() {
            if bucket.chain.is_empty() {
                continue;
            }
            *len -= bucket.chain.len();
            // SAFETY: every node was acquired from `self.alloc`.
            unsafe { bucket.chain.free_in(&self.alloc, |e| cleanup.run(e)) };
        }
        debug_assert_eq!(*len, 0);
    }

    /// Visit entries bucket by bucket, in insertion order within a bucket,
    /// until `f` returns `false`.
    ///
    /// The map is borrowed shared for the whole walk, so `f` cannot mutate it.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Entry<'a, K, V>) -> bool,
    {
        for entry in self.iter() {
            if !f(entry) {
                return;
            }
        }
    }

    /// Iterator over all entries in `for_each` order.
    pub fn iter(&self) -> Iter<'_, 'a, K, V> {
        Iter {
            buckets: self.buckets.as_slice().iter(),
            chain: None,
            remaining: self.len,
        }
    }
}

impl<'a, K: ?Sized, V: ?Sized, H, E, A: Allocator> Drop for ChainedHashMap<'a, K, V, H, E, A> {
    fn drop(&mut self) {
        let cleanup = &mut self.cleanup;
        for bucket in self.buckets.as_mut_slice() {
            // SAFETY: every node was acquired from `self.alloc`.
            unsafe { bucket.chain.free_in(&self.alloc, |e| cleanup.run(e)) };
        }
        self.len = 0;
        // SAFETY: all chains are empty and the array came from `self.alloc`.
        unsafe { self.buckets.release_in(&self.alloc) };
    }
}

impl<'a, K: ?Sized, V: ?Sized, H, E, A: Allocator> fmt::Debug for ChainedHashMap<'a, K, V, H, E, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .buckets
            .as_slice()
            .iter()
            .flat_map(|b| b.chain.iter())
            .map(|e| (e.key, e.data));
        f.debug_map().entries(entries).finish()
    }
}

/// Iterator over a map's entries: bucket index ascending, insertion order
/// within a bucket.
pub struct Iter<'m, 'a, K: ?Sized, V: ?Sized> {
    buckets: core::slice::Iter<'m, Bucket<'a, K, V>>,
    chain: Option<chain::Iter<'m, Entry<'a, K, V>>>,
    remaining: usize,
}

impl<'m, 'a, K: ?Sized, V: ?Sized> Iterator for Iter<'m, 'a, K, V> {
    type Item = &'m Entry<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.chain.as_mut().and_then(Iterator::next) {
                self.remaining -= 1;
                return Some(entry);
            }
            self.chain = Some(self.buckets.next()?.chain.iter());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: ?Sized, V: ?Sized> ExactSizeIterator for Iter<'_, '_, K, V> {}

impl<'m, 'a, K: ?Sized, V: ?Sized, H, E, A> IntoIterator for &'m ChainedHashMap<'a, K, V, H, E, A>
where
    H: KeyHash<K>,
    E: KeyEq<K>,
    A: Allocator,
{
    type Item = &'m Entry<'a, K, V>;
    type IntoIter = Iter<'m, 'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrackingAllocator;
    use crate::hash::{ByValue, StdHash};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn by_len(k: &str) -> u64 {
        k.len() as u64
    }

    /// Invariant: distinct keys are all retrievable and counted once each.
    #[test]
    fn distinct_keys_counted_and_found() {
        let keys = ["a", "bb", "ccc", "dddd", "eeeee"];
        let vals = [1, 2, 3, 4, 5];
        let mut m: ChainedHashMap<'_, str, i32, _, ByValue> =
            ChainedHashMap::builder(3, StdHash::<std::collections::hash_map::RandomState>::default())
                .equality(ByValue)
                .build()
                .unwrap();
        assert!(m.is_empty());
        for (k, v) in keys.iter().zip(&vals) {
            m.set(k, v).unwrap();
        }
        assert_eq!(m.len(), keys.len());
        assert!(!m.is_empty());
        assert_eq!(m.num_buckets(), 3);
        for (k, v) in keys.iter().zip(&vals) {
            assert!(m.contains_key(k));
            assert_eq!(m.get(k), Some(v));
        }
        assert!(!m.contains_key("zz"));
        assert_eq!(m.get("zz"), None);
    }

    /// Invariant: `get` hands back the exact reference passed to `set`.
    #[test]
    fn get_returns_same_reference() {
        let key = String::from("k");
        let data = String::from("payload");
        let mut m = ChainedHashMap::new(8, by_len).unwrap();
        m.set(key.as_str(), data.as_str()).unwrap();
        let got = m.get(key.as_str()).unwrap();
        assert!(core::ptr::eq(got, data.as_str()));
    }

    /// Invariant: overwriting an existing key keeps the size, exposes the
    /// new data and runs both hooks exactly once on the old pair.
    #[test]
    fn set_existing_key_replaces_and_cleans_old() {
        let (k_old, k_new) = (String::from("key"), String::from("key"));
        let (d_old, d_new) = (10, 20);
        let freed_keys = Rc::new(RefCell::new(Vec::new()));
        let freed_data = Rc::new(RefCell::new(Vec::new()));
        let fk = freed_keys.clone();
        let fd = freed_data.clone();

        let mut m = ChainedHashMap::builder(4, by_len)
            .equality(ByValue)
            .key_free(move |k: &str| fk.borrow_mut().push(k as *const str))
            .data_free(move |d: &i32| fd.borrow_mut().push(*d))
            .build()
            .unwrap();

        m.set(k_old.as_str(), &d_old).unwrap();
        m.set(k_new.as_str(), &d_new).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("key"), Some(&20));
        assert_eq!(*freed_keys.borrow(), vec![k_old.as_str() as *const str]);
        assert_eq!(*freed_data.borrow(), vec![10]);

        // The surviving entry now holds the new key reference.
        let mut stored = None;
        m.for_each(|e| {
            stored = Some(e.key() as *const str);
            true
        });
        assert_eq!(stored, Some(k_new.as_str() as *const str));
    }

    /// Invariant: a replaced key moves to the back of its chain, after
    /// every entry that was inserted before the replacement.
    #[test]
    fn replace_moves_entry_to_chain_end() {
        let zero = |_: &str| 0u64;
        let vals = [1, 2, 3, 9];
        let mut m = ChainedHashMap::builder(1, zero).equality(ByValue).build().unwrap();
        m.set("a", &vals[0]).unwrap();
        m.set("b", &vals[1]).unwrap();
        m.set("c", &vals[2]).unwrap();
        m.set("a", &vals[3]).unwrap();
        assert_eq!(m.len(), 3);
        let order: Vec<(&str, i32)> = m.iter().map(|e| (e.key(), *e.data())).collect();
        assert_eq!(order, vec![("b", 2), ("c", 3), ("a", 9)]);
    }

    /// Invariant: erase of a present key shrinks the map by one and runs the
    /// hooks once; erase of an absent key is a no-op returning false.
    #[test]
    fn erase_present_and_absent() {
        let freed = Rc::new(Cell::new(0));
        let f = freed.clone();
        let vals = [1, 2];
        let mut m = ChainedHashMap::builder(4, by_len)
            .equality(ByValue)
            .data_free(move |_: &i32| f.set(f.get() + 1))
            .build()
            .unwrap();
        m.set("x", &vals[0]).unwrap();
        m.set("yy", &vals[1]).unwrap();

        assert!(m.erase("x"));
        assert_eq!(m.len(), 1);
        assert!(!m.contains_key("x"));
        assert_eq!(freed.get(), 1);

        assert!(!m.erase("x"));
        assert!(!m.erase("missing"));
        assert_eq!(m.len(), 1);
        assert_eq!(freed.get(), 1);
        assert_eq!(m.get("yy"), Some(&2));
    }

    /// Invariant: clear empties the map, runs the hooks once per entry and
    /// leaves the map reusable with the same configuration.
    #[test]
    fn clear_resets_to_fresh_state() {
        let freed = Rc::new(RefCell::new(Vec::new()));
        let f = freed.clone();
        let keys = ["a", "b", "c", "d"];
        let vals = [0, 1, 2, 3];
        let mut m = ChainedHashMap::builder(2, by_len)
            .equality(ByValue)
            .key_free(move |k: &str| f.borrow_mut().push(k.to_string()))
            .build()
            .unwrap();
        for (k, v) in keys.iter().zip(&vals) {
            m.set(k, v).unwrap();
        }
        m.clear();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
        assert_eq!(m.num_buckets(), 2);
        assert_eq!(m.iter().count(), 0);
        for k in keys {
            assert!(!m.contains_key(k));
        }
        let mut cleared = freed.borrow().clone();
        cleared.sort();
        assert_eq!(cleared, keys);

        m.set("a", &vals[1]).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("a"), Some(&1));
        assert_eq!(freed.borrow().len(), 4);

        drop(m);
        assert_eq!(freed.borrow().len(), 5);
        assert_eq!(freed.borrow().last().map(String::as_str), Some("a"));
    }

    /// Invariant: for_each visits bucket-major, insertion order per bucket,
    /// and stops at the first `false`.
    #[test]
    fn for_each_order_and_early_stop() {
        let first_char = |k: &str| (k.as_bytes()[0] - b'0') as u64;
        let vals = [0; 5];
        let mut m = ChainedHashMap::builder(4, first_char).equality(ByValue).build().unwrap();
        for k in ["2a", "0a", "1a", "0b", "2b"] {
            m.set(k, &vals[0]).unwrap();
        }

        let mut all = Vec::new();
        m.for_each(|e| {
            all.push(e.key());
            true
        });
        assert_eq!(all, vec!["0a", "0b", "1a", "2a", "2b"]);

        let mut seen = Vec::new();
        m.for_each(|e| {
            seen.push(e.key());
            seen.len() < 3
        });
        assert_eq!(seen, vec!["0a", "0b", "1a"]);

        let empty: ChainedHashMap<'_, str, i32, _> = ChainedHashMap::new(4, first_char).unwrap();
        let mut calls = 0;
        empty.for_each(|_| {
            calls += 1;
            true
        });
        assert_eq!(calls, 0);
    }

    /// Invariant: the default identity equality separates value-equal keys
    /// stored at different addresses.
    #[test]
    fn identity_equality_distinguishes_equal_values() {
        let k1 = String::from("same");
        let k2 = String::from("same");
        let (v1, v2) = (1, 2);
        let mut m = ChainedHashMap::new(4, by_len).unwrap();
        m.set(k1.as_str(), &v1).unwrap();
        m.set(k2.as_str(), &v2).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(k1.as_str()), Some(&1));
        assert_eq!(m.get(k2.as_str()), Some(&2));
        assert!(!m.contains_key(&*String::from("same")));
    }

    /// Invariant: when the entry allocation fails, `set` reports it and
    /// changes nothing, for a new key and for an overwrite alike.
    #[test]
    fn failed_set_is_transactional() {
        let alloc = TrackingAllocator::new();
        let freed = Rc::new(Cell::new(0));
        let f = freed.clone();
        let vals = [1, 2, 3];
        let mut m = ChainedHashMap::builder(4, by_len)
            .equality(ByValue)
            .allocator(&alloc)
            .data_free(move |_: &i32| f.set(f.get() + 1))
            .build()
            .unwrap();
        m.set("a", &vals[0]).unwrap();
        let live = alloc.live_allocations();

        alloc.set_budget(Some(0));
        assert_eq!(m.set("b", &vals[1]), Err(AllocError));
        assert_eq!(m.len(), 1);
        assert!(!m.contains_key("b"));
        assert_eq!(alloc.live_allocations(), live);

        assert_eq!(m.set("a", &vals[2]), Err(AllocError));
        assert_eq!(m.get("a"), Some(&1));
        assert_eq!(m.len(), 1);
        assert_eq!(freed.get(), 0);
        assert_eq!(alloc.live_allocations(), live);

        alloc.set_budget(None);
        m.set("a", &vals[2]).unwrap();
        assert_eq!(m.get("a"), Some(&3));
        assert_eq!(m.len(), 1);
        assert_eq!(freed.get(), 1);
        assert_eq!(alloc.live_allocations(), live);
    }

    /// Invariant: failing to allocate the bucket array fails construction.
    #[test]
    fn failed_build_reports_alloc_error() {
        let alloc = TrackingAllocator::new();
        alloc.set_budget(Some(0));
        let r: Result<ChainedHashMap<'_, str, i32, _, Identity, _>, _> =
            ChainedHashMap::builder(16, by_len).allocator(&alloc).build();
        assert!(matches!(r, Err(AllocError)));
        assert_eq!(alloc.allocations(), 0);
    }

    /// Invariant: zero buckets is a contract violation.
    #[test]
    #[should_panic(expected = "at least one bucket")]
    fn zero_buckets_panics() {
        let _ = ChainedHashMap::<str, i32, _>::new(0, by_len);
    }

    /// Invariant: dropping the map runs the hooks for every remaining entry
    /// and returns every block to the allocator.
    #[test]
    fn drop_cleans_entries_and_releases_memory() {
        let alloc = TrackingAllocator::new();
        let freed = Rc::new(Cell::new(0));
        let f = freed.clone();
        let vals: Vec<i32> = (0..50).collect();
        let keys: Vec<String> = vals.iter().map(|v| format!("k{v}")).collect();
        {
            let mut m = ChainedHashMap::builder(7, StdHash::<std::collections::hash_map::RandomState>::default())
                .equality(ByValue)
                .allocator(&alloc)
                .data_free(move |_: &i32| f.set(f.get() + 1))
                .build()
                .unwrap();
            for (k, v) in keys.iter().zip(&vals) {
                m.set(k.as_str(), v).unwrap();
            }
            assert!(m.erase("k0"));
            assert_eq!(m.len(), 49);
            assert_eq!(alloc.live_allocations(), 1 + 49);
        }
        assert_eq!(freed.get(), 50);
        assert_eq!(alloc.live_allocations(), 0);
        assert_eq!(alloc.live_bytes(), 0);
    }

    /// Invariant: an absent map is simply `None`; dropping it does nothing.
    #[test]
    fn absent_map_drop_is_noop() {
        let m: Option<ChainedHashMap<'_, str, i32, fn(&str) -> u64>> = None;
        drop(m);
    }

    /// Invariant: iteration yields each entry once and reports its length.
    #[test]
    fn iter_is_exact_size() {
        let vals = [0, 1, 2];
        let mut m = ChainedHashMap::builder(2, by_len).equality(ByValue).build().unwrap();
        m.set("a", &vals[0]).unwrap();
        m.set("bb", &vals[1]).unwrap();
        m.set("ccc", &vals[2]).unwrap();
        let it = m.iter();
        assert_eq!(it.len(), 3);
        let data: BTreeSet<i32> = (&m).into_iter().map(|e| *e.data()).collect();
        assert_eq!(data, BTreeSet::from([0, 1, 2]));
        assert_eq!(format!("{m:?}").matches(':').count(), 3);
    }

    /// Invariant (debug-only): an equality predicate that re-enters the map
    /// while it probes panics instead of silently recursing.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrant_equality_panics() {
        type Reentrant<'a> = ChainedHashMap<'a, str, i32, fn(&str) -> u64, Box<dyn Fn(&str, &str) -> bool + 'a>>;

        let slot: Rc<Cell<*const Reentrant<'static>>> = Rc::new(Cell::new(core::ptr::null()));
        let s = slot.clone();
        let eq: Box<dyn Fn(&str, &str) -> bool> = Box::new(move |a: &str, b: &str| {
            let ptr = s.get();
            if !ptr.is_null() {
                // SAFETY: set below to a map that outlives this call.
                let _ = unsafe { (*ptr).contains_key("probe") };
            }
            a == b
        });
        let mut m: Reentrant<'static> = ChainedHashMap::builder(1, by_len as fn(&str) -> u64)
            .equality(eq)
            .build()
            .unwrap();
        m.set("a", &1).unwrap();
        slot.set(&m as *const _);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| m.contains_key("a")));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        slot.set(core::ptr::null());
    }
}
