//! Pluggable hashing and key-equality strategies.
//!
//! Both are plain traits with blanket impls for closures, so a map can be
//! configured with `|k: &str| ...` directly or with one of the provided
//! unit strategies.

use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;

/// Hash function used to pick a bucket: `hash(key) % num_buckets`.
pub trait KeyHash<K: ?Sized> {
    fn hash_key(&self, key: &K) -> u64;
}

impl<K, F> KeyHash<K> for F
where
    K: ?Sized,
    F: Fn(&K) -> u64,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self(key)
    }
}

/// Adapts a [`BuildHasher`] to [`KeyHash`] for `K: Hash`.
#[derive(Clone, Debug, Default)]
pub struct StdHash<S = DefaultHashBuilder>(pub S);

impl StdHash {
    /// Backed by hashbrown's default hasher.
    pub fn new() -> Self {
        StdHash(DefaultHashBuilder::default())
    }
}

impl<S> StdHash<S> {
    pub fn with_hasher(hasher: S) -> Self {
        StdHash(hasher)
    }
}

impl<K, S> KeyHash<K> for StdHash<S>
where
    K: ?Sized + Hash,
    S: BuildHasher,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self.0.hash_one(key)
    }
}

/// Key-equality predicate. `stored` is the key already in the map,
/// `query` the key being looked up.
pub trait KeyEq<K: ?Sized> {
    fn keys_equal(&self, stored: &K, query: &K) -> bool;
}

impl<K, F> KeyEq<K> for F
where
    K: ?Sized,
    F: Fn(&K, &K) -> bool,
{
    #[inline]
    fn keys_equal(&self, stored: &K, query: &K) -> bool {
        self(stored, query)
    }
}

/// Two keys are equal only if they are the same reference. Value-equal
/// keys living at different addresses are distinct.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl<K: ?Sized> KeyEq<K> for Identity {
    #[inline]
    fn keys_equal(&self, stored: &K, query: &K) -> bool {
        core::ptr::eq(stored, query)
    }
}

/// Keys compare with `PartialEq`.
#[derive(Copy, Clone, Debug, Default)]
pub struct ByValue;

impl<K: ?Sized + PartialEq> KeyEq<K> for ByValue {
    #[inline]
    fn keys_equal(&self, stored: &K, query: &K) -> bool {
        stored == query
    }
}
