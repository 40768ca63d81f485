#![cfg(test)]

// Property tests for ChainedHashMap kept inside the crate so they can also
// check allocator balance through the internal chain layout.

use crate::alloc::{AllocError, TrackingAllocator};
use crate::hash::{ByValue, StdHash};
use crate::map::ChainedHashMap;
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

// Pool-indexed operations: keys come from a small pool so that replaces,
// erases of present keys and collisions are frequent.
#[derive(Clone, Debug)]
enum Op {
    Set(usize, usize),
    Erase(usize),
    Get(usize),
    Clear,
    Iterate,
    StopAfter(usize),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::btree_set("[a-z]{0,4}", 1..=8).prop_flat_map(|set| {
        let pool: Vec<String> = set.into_iter().collect();
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), 0..DATA.len()).prop_map(|(k, d)| Op::Set(k, d)),
            2 => idx.clone().prop_map(Op::Erase),
            2 => idx.clone().prop_map(Op::Get),
            1 => Just(Op::Clear),
            1 => Just(Op::Iterate),
            1 => (0usize..10).prop_map(Op::StopAfter),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

static DATA: [i32; 6] = [0, 1, 2, 3, 4, 5];

/// Hook log shared between the map's cleanup hooks and the test body.
#[derive(Default)]
struct Freed {
    keys: Vec<String>,
    data: Vec<i32>,
}

fn run_scenario<H>(hasher: H, num_buckets: usize, pool: &[String], ops: &[Op]) -> Result<(), TestCaseError>
where
    H: crate::hash::KeyHash<str>,
{
    let alloc = TrackingAllocator::new();
    let freed = Rc::new(RefCell::new(Freed::default()));
    let (fk, fd) = (freed.clone(), freed.clone());
    let mut model: HashMap<&str, i32> = HashMap::new();
    {
        let mut sut = ChainedHashMap::builder(num_buckets, hasher)
            .equality(ByValue)
            .allocator(&alloc)
            .key_free(move |k: &str| fk.borrow_mut().keys.push(k.to_string()))
            .data_free(move |d: &i32| fd.borrow_mut().data.push(*d))
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        for op in ops {
            freed.borrow_mut().keys.clear();
            freed.borrow_mut().data.clear();
            match *op {
                Op::Set(k, d) => {
                    let key = pool[k].as_str();
                    let prev = model.insert(key, DATA[d]);
                    sut.set(key, &DATA[d]).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    let f = freed.borrow();
                    match prev {
                        Some(old) => {
                            prop_assert_eq!(&f.keys, &vec![key.to_string()]);
                            prop_assert_eq!(&f.data, &vec![old]);
                        }
                        None => prop_assert!(f.keys.is_empty() && f.data.is_empty()),
                    }
                }
                Op::Erase(k) => {
                    let key = pool[k].as_str();
                    let prev = model.remove(key);
                    prop_assert_eq!(sut.erase(key), prev.is_some());
                    let f = freed.borrow();
                    match prev {
                        Some(old) => {
                            prop_assert_eq!(&f.keys, &vec![key.to_string()]);
                            prop_assert_eq!(&f.data, &vec![old]);
                        }
                        None => prop_assert!(f.keys.is_empty() && f.data.is_empty()),
                    }
                }
                Op::Get(k) => {
                    let key = pool[k].as_str();
                    prop_assert_eq!(sut.get(key).copied(), model.get(key).copied());
                    prop_assert_eq!(sut.contains_key(key), model.contains_key(key));
                }
                Op::Clear => {
                    let expected: BTreeSet<String> = model.keys().map(|k| k.to_string()).collect();
                    sut.clear();
                    model.clear();
                    let f = freed.borrow();
                    prop_assert_eq!(f.keys.len(), expected.len());
                    let got: BTreeSet<String> = f.keys.iter().cloned().collect();
                    prop_assert_eq!(got, expected);
                }
                Op::Iterate => {
                    let mut seen = Vec::new();
                    sut.for_each(|e| {
                        seen.push((e.key(), *e.data()));
                        true
                    });
                    prop_assert_eq!(seen.len(), model.len());
                    let seen: HashMap<&str, i32> = seen.into_iter().collect();
                    prop_assert_eq!(&seen, &model);
                }
                Op::StopAfter(n) => {
                    let mut calls = 0;
                    sut.for_each(|_| {
                        calls += 1;
                        calls < n
                    });
                    let expected = if model.is_empty() { 0 } else { n.max(1).min(model.len()) };
                    prop_assert_eq!(calls, expected);
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            // One bucket array plus one record per live entry.
            prop_assert_eq!(alloc.live_allocations(), 1 + model.len());
        }
    }
    prop_assert_eq!(alloc.live_allocations(), 0);
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - `len`/`is_empty`/`get`/`contains_key` parity with the model.
// - Overwrite and erase run the cleanup hooks exactly once on the old pair;
//   inserts of new keys and misses run none.
// - `clear` runs the hooks once per live entry.
// - `for_each` visits every entry once, or stops at the first `false`.
// - Exactly one allocator block per live entry plus the bucket array, and
//   nothing left after drop.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(), buckets in 1usize..=16) {
        run_scenario(StdHash::<RandomState>::default(), buckets, &pool, &ops)?;
    }
}

// Property: same invariants with every key hashed to one value, so the
// whole map is a single chain and equality alone resolves keys.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario(), buckets in 1usize..=4) {
        run_scenario(|_: &str| 7u64, buckets, &pool, &ops)?;
    }
}

// Property: with an allocation budget, a failing `set` leaves size,
// contents and live allocations exactly as before, whether the key was new
// or about to be overwritten.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_failed_set_changes_nothing(
        (pool, ops) in arb_scenario(),
        budget in 0usize..6,
    ) {
        let alloc = TrackingAllocator::new();
        let mut sut = ChainedHashMap::builder(4, StdHash::<RandomState>::default())
            .equality(ByValue)
            .allocator(&alloc)
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut model: HashMap<&str, i32> = HashMap::new();
        alloc.set_budget(Some(budget));

        for op in &ops {
            if let Op::Set(k, d) = *op {
                let key = pool[k].as_str();
                let live = alloc.live_allocations();
                match sut.set(key, &DATA[d]) {
                    Ok(()) => {
                        model.insert(key, DATA[d]);
                    }
                    Err(AllocError) => {
                        prop_assert_eq!(alloc.live_allocations(), live);
                        prop_assert_eq!(sut.get(key), model.get(key));
                    }
                }
                prop_assert_eq!(sut.len(), model.len());
            }
        }
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        alloc.set_budget(None);
    }
}
