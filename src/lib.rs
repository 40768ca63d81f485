//! chained-hashmap: a single-threaded hash map with a fixed bucket array,
//! separate chaining and an injectable allocator.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) average lookup over caller-owned keys and data without
//!   committing to a memory-management strategy.
//! - Layers:
//!   - `Allocator`: narrow allocate/release interface. Every block the map
//!     owns (bucket array, chain nodes) goes through it.
//!   - `RawChain<T>`: doubly linked collision chain whose nodes come from
//!     an allocator passed per call, so all buckets share the map's one
//!     allocator instance.
//!   - `ChainedHashMap<'a, K, V, H, E, A>`: bucket array plus live-entry
//!     count; hashes a key to `hash % num_buckets` and delegates search,
//!     append and unlink to that bucket's chain.
//!
//! Ownership
//! - Keys and data are stored as `&'a K` / `&'a V`. The map never clones
//!   or drops them; `'a` makes the borrow checker enforce that they
//!   outlive their time in the map.
//! - The map owns the entry records. Whenever one is destroyed (erase,
//!   overwrite, clear, drop) the configured key/data cleanup hooks run
//!   exactly once on its key and data.
//!
//! Constraints
//! - Bucket count is fixed at construction and must be non-zero.
//! - Keys are unique under the configured equality predicate, which
//!   defaults to reference identity.
//! - Single-threaded: `!Send`/`!Sync`, no internal locking.
//! - Allocation failure is reported as `AllocError`; a failed operation
//!   leaves the map unchanged.
//!
//! Reentrancy
//! - `for_each` and `iter` borrow the map shared, so callbacks cannot
//!   mutate it. Operations that run user hash/equality code carry a
//!   debug-only reentrancy check; cleanup hooks run after it is released.
//!
//! Non-goals
//! - No rehashing or resizing, no ordered iteration, no copying of keys
//!   or data.

pub mod alloc;
mod chain;
pub mod hash;
pub mod map;
mod map_proptest;
mod reentrancy;

// Public surface
pub use crate::alloc::{AllocError, Allocator, Global, TrackingAllocator};
pub use crate::hash::{ByValue, Identity, KeyEq, KeyHash, StdHash};
pub use crate::map::{Builder, ChainedHashMap, Entry, Iter};
