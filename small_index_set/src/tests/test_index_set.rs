#![allow(missing_docs)]

use super::*;
use rand::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, BuildHasherDefault};
use zwohash::ZwoHasher;

fn key_hash(key: u64) -> u64 {
    <BuildHasherDefault<ZwoHasher>>::default().hash_one(key)
}

/// Caller-side view of the intended usage: `keys` is the external keyed collection and the
/// set accelerates key -> position lookups over it.
struct KeyedCollection {
    keys: Vec<u64>,
    set: SmallIndexSet,
}

impl KeyedCollection {
    fn new() -> Self {
        KeyedCollection {
            keys: Vec::new(),
            set: SmallIndexSet::new(),
        }
    }

    fn position(&self, key: u64) -> Option<usize> {
        self.set.lookup(key_hash(key), |index| self.keys[index] == key)
    }

    /// Appends a key that is not yet present and indexes it.
    fn push(&mut self, key: u64) -> usize {
        debug_assert_eq!(self.position(key), None);
        let index = self.keys.len();
        self.keys.push(key);
        let keys = &self.keys;
        self.set
            .insert(key_hash(key), index, &(), |index| key_hash(keys[index]));
        index
    }
}

#[test]
fn growth_policy_sequence_is_deterministic() {
    assert_eq!(next_capacity(0), 32);
    assert_eq!(next_capacity(31), 32);
    let mut capacity = 0;
    let mut seen = Vec::new();
    for _ in 0..10 {
        capacity = next_capacity(capacity);
        seen.push(capacity);
    }
    // baseline, then 2x up to 2^8, 4x through the mid-range, 2x again from 2^19
    assert_eq!(
        seen,
        vec![32, 64, 128, 256, 512, 2048, 8192, 32768, 131072, 524288]
    );
    assert_eq!(next_capacity(1 << 19), 1 << 20);
    assert_eq!(next_capacity(1 << 20), 1 << 21);
}

#[test]
fn empty_set_finds_nothing() {
    let set = SmallIndexSet::new();
    assert_eq!(set.capacity(), 0);
    assert_eq!(set.width(), None);
    for hash in 0..100 {
        assert_eq!(set.lookup(hash, |_| true), None);
    }
}

#[test]
fn grows_past_the_baseline_capacity() {
    let set = SmallIndexSet::new();
    let hasher = |index: usize| index as u64;
    for index in 0..=MIN_CAPACITY {
        set.insert(index as u64, index, &(), hasher);
    }
    assert!(set.capacity() > MIN_CAPACITY);
    for index in 0..=MIN_CAPACITY {
        assert_eq!(set.lookup(index as u64, |found| found == index), Some(index));
    }
}

#[test]
fn widening_rehash_keeps_the_capacity() {
    let set = SmallIndexSet::new();
    let hasher = |index: usize| index as u64;
    for index in 0..5 {
        set.insert(index as u64, index, &(), hasher);
    }
    assert_eq!(set.capacity(), 32);
    assert_eq!(set.width(), Some(WidthClass::U8));
    // 300 + 1 does not fit 8-bit slots: same capacity, upgraded width
    set.insert(300, 300, &(), hasher);
    assert_eq!(set.capacity(), 32);
    assert_eq!(set.width(), Some(WidthClass::U16));
    for index in (0..5).chain([300]) {
        assert_eq!(set.lookup(index as u64, |found| found == index), Some(index));
    }
}

#[test]
fn first_insert_of_a_large_index() {
    // exercises widening from the empty state followed by the first growth, which must not
    // narrow the width back down before the pending value is placed
    let set = SmallIndexSet::new();
    let hasher = |index: usize| index as u64;
    set.insert(70000, 70000, &(), hasher);
    assert_eq!(set.width(), Some(WidthClass::U32));
    assert_eq!(set.lookup(70000, |found| found == 70000), Some(70000));
}

#[test]
fn width_only_ever_increases() {
    let set = SmallIndexSet::new();
    let hasher = |index: usize| index as u64;
    let mut widest = WidthClass::U8;
    for index in 0..300 {
        set.insert(index as u64, index, &(), hasher);
        let width = set.width().unwrap();
        assert!(width >= widest);
        assert!(width.max_value() as usize >= index + 1);
        widest = width;
    }
    assert_eq!(widest, WidthClass::U16);
}

#[test]
#[should_panic(expected = "exceeds the supported range")]
fn out_of_domain_index_panics() {
    let set = SmallIndexSet::new();
    set.insert(0, (1 << 31) - 1, &(), |index| index as u64);
}

#[test]
fn round_trips_sequential_indices() {
    let mut collection = KeyedCollection::new();
    for key in 0..2000u64 {
        collection.push(key * 3 + 1);
    }
    for key in 0..2000u64 {
        assert_eq!(collection.position(key * 3 + 1), Some(key as usize));
    }
    assert_eq!(collection.position(5), None);
    assert!(collection.set.capacity() >= 2048);
}

#[test]
fn matches_a_reference_model() {
    let mut collection = KeyedCollection::new();
    let mut positions: HashMap<u64, usize> = HashMap::new();
    let mut rng = rand_pcg::Pcg64::seed_from_u64(33);
    for _ in 0..3000 {
        let key = rng.gen_range(0..5000u64) ^ 0x5851_f42d_4c95_7f2d;
        if rng.gen_range(0..3) == 0 {
            assert_eq!(collection.position(key), positions.get(&key).copied());
        } else if !positions.contains_key(&key) {
            let index = collection.push(key);
            positions.insert(key, index);
            assert_eq!(collection.position(key), Some(index));
        }
    }
    for (&key, &index) in &positions {
        assert_eq!(collection.position(key), Some(index));
    }
}

#[test]
fn tracker_sees_every_publication() {
    #[derive(Default)]
    struct RetainAll(Mutex<Vec<Arc<PackedTable>>>);

    impl OwnershipTracker for RetainAll {
        fn register_edge(&self, table: &Arc<PackedTable>) {
            self.0.lock().unwrap().push(table.clone());
        }
    }

    let set = SmallIndexSet::new();
    let tracker = RetainAll::default();
    let hasher = |index: usize| index as u64;
    for index in 0..100 {
        set.insert(index as u64, index, &tracker, hasher);
    }
    let tables = tracker.0.lock().unwrap();
    assert!(tables.len() >= 2);
    assert_eq!(tables.last().unwrap().capacity(), set.capacity());
    for pair in tables.windows(2) {
        assert!(pair[1].capacity() >= pair[0].capacity());
    }
}

#[test]
fn concurrent_lookups_during_growth() {
    use std::sync::atomic::AtomicUsize;

    // distinct keys via an odd multiplier, so eq matches exactly one index
    let keys: Vec<u64> = (0..4096u64)
        .map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .collect();
    let set = SmallIndexSet::new();
    let progress = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        let set = &set;
        let keys = &keys;
        let progress = &progress;
        for seed in 0..3u64 {
            scope.spawn(move || {
                let mut rng = rand_pcg::Pcg64::seed_from_u64(seed);
                loop {
                    let done = progress.load(Ordering::Acquire);
                    if done == 0 {
                        continue;
                    }
                    let index = rng.gen_range(0..done);
                    let key = keys[index];
                    // a completed insert is always visible, whichever table snapshot the
                    // lookup captured
                    let found = set.lookup(key_hash(key), |i| keys[i] == key);
                    assert_eq!(found, Some(index));
                    if done >= keys.len() {
                        break;
                    }
                }
            });
        }
        scope.spawn(move || {
            for (index, &key) in keys.iter().enumerate() {
                set.insert(key_hash(key), index, &(), |i| key_hash(keys[i]));
                progress.store(index + 1, Ordering::Release);
            }
        });
    });

    for (index, &key) in keys.iter().enumerate() {
        assert_eq!(set.lookup(key_hash(key), |i| keys[i] == key), Some(index));
    }
}
