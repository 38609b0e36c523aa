//! Growable index set with lock-free lookups and a single serialized writer.
use std::{
    fmt,
    ptr::null_mut,
    sync::{
        atomic::{AtomicPtr, Ordering},
        Arc, Mutex,
    },
};

use crate::packed_table::{PackedTable, WidthClass};

#[cfg(test)]
#[path = "tests/test_index_set.rs"]
mod test_index_set;

/// Baseline capacity of the first usable table.
const MIN_CAPACITY: usize = 32;

/// Largest supported logical index; its biased slot value must stay below `2^31`.
const MAX_INDEX: usize = (1 << 31) - 2;

/// Returns the capacity to grow to after `capacity` turned out to be too small.
///
/// Growing by doubling alone would rehash every entry too often while the set is in its hot
/// growth phase, so mid-range sizes grow by 4x; very small and very large tables fall back to
/// 2x to limit overshoot.
fn next_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else if capacity >= (1 << 19) || capacity <= (1 << 8) {
        capacity << 1
    } else {
        capacity << 2
    }
}

fn encode(index: usize) -> u32 {
    assert!(
        index <= MAX_INDEX,
        "logical index {index} exceeds the supported range"
    );
    index as u32 + 1
}

/// Capability notified once per table publication.
///
/// [`SmallIndexSet`] retains every table it ever published, so for purely in-process use the
/// no-op impl for `()` suffices. Hosts whose memory manager tracks reachability (or that hand
/// out table references outliving the set) can clone the [`Arc`] to register an ownership edge
/// from the set's owning object to the new table; the callback runs after the table is fully
/// built and before it becomes visible to any reader.
pub trait OwnershipTracker {
    /// Records an ownership edge to a freshly built table about to be published.
    fn register_edge(&self, table: &Arc<PackedTable>);
}

impl OwnershipTracker for () {
    fn register_edge(&self, _table: &Arc<PackedTable>) {}
}

/// A growable set of logical indices with lock-free concurrent lookups.
///
/// Writers are serialized on an internal mutex that readers never touch, so any number of
/// [`lookup`](Self::lookup) calls may run concurrently with a single active
/// [`insert`](Self::insert). A lookup captures the published table once and probes that
/// snapshot; a table superseded by growth is only ever appended to before the swap and is kept
/// alive until the set is dropped, so the snapshot stays valid for the whole call.
///
/// See the crate docs for the storage layout and the bounded-probing caveat.
pub struct SmallIndexSet {
    /// The published table, null until the first publication. Read with acquire ordering by
    /// readers; written with release ordering, once per replacement, by the writer. Always
    /// points into an `Arc` held in `writer`.
    current: AtomicPtr<PackedTable>,
    writer: Mutex<WriterState>,
}

#[derive(Default)]
struct WriterState {
    /// Every table published so far, oldest first; the last entry backs `current`. Superseded
    /// tables are retained so that a concurrent lookup holding an older snapshot can finish
    /// against it.
    published: Vec<Arc<PackedTable>>,
}

impl Default for SmallIndexSet {
    fn default() -> Self {
        SmallIndexSet {
            current: AtomicPtr::new(null_mut()),
            writer: Mutex::new(Default::default()),
        }
    }
}

impl SmallIndexSet {
    /// Constructs an empty set.
    pub fn new() -> Self {
        Default::default()
    }

    fn current_table(&self) -> Option<&PackedTable> {
        let ptr = self.current.load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: a non-null `current` always points into an `Arc` stored in
            // `writer.published`, entries of which are only dropped together with the set
            // itself, so the allocation outlives the returned `&self`-bound reference.
            Some(unsafe { &*ptr })
        }
    }

    /// Searches for an index whose entry matches the caller's key.
    ///
    /// `hash` is the hash of the key being looked up and `eq` decides whether the entry at a
    /// given logical index matches it. Lock-free; any number of callers may run concurrently
    /// with each other and with an insert.
    ///
    /// A `None` result usually means the index was never inserted, but a table probed near its
    /// saturation point (just before the writer grows it) can also report `None` for an entry
    /// placed beyond the probe bound. Callers must treat `None` as "not cached" rather than
    /// "proven absent".
    pub fn lookup(&self, hash: u64, eq: impl FnMut(usize) -> bool) -> Option<usize> {
        self.current_table()?.lookup(hash, eq)
    }

    /// Returns the slot count of the currently published table.
    pub fn capacity(&self) -> usize {
        self.current_table().map_or(0, PackedTable::capacity)
    }

    /// Returns the slot width of the currently published table, if any.
    pub fn width(&self) -> Option<WidthClass> {
        self.current_table().map(PackedTable::width)
    }

    /// Inserts a logical index that is not yet in the set.
    ///
    /// `hash` is the hash of the new entry's key; `hasher` recomputes the hash of any already
    /// stored index and is needed whenever the insertion forces the table to be rebuilt. The
    /// `tracker` is notified of every table publication this insert performs.
    ///
    /// Inserts are serialized internally; concurrent lookups proceed without blocking.
    /// Inserting an index that is already present is not supported (the caller is expected to
    /// have looked it up first), and indices at or beyond `2^31 - 1` panic rather than corrupt
    /// the mapping by truncation.
    pub fn insert(
        &self,
        hash: u64,
        index: usize,
        tracker: &impl OwnershipTracker,
        hasher: impl Fn(usize) -> u64,
    ) {
        let value = encode(index);
        let mut writer = self.writer.lock().unwrap();
        let (capacity, max_value) = match writer.published.last() {
            Some(table) => (table.capacity(), table.max_value()),
            None => (0, 0),
        };
        if value > max_value {
            // widen at unchanged capacity so the new value is representable
            self.rehash(&mut writer, tracker, &hasher, capacity, value);
        }
        loop {
            if let Some(table) = writer.published.last() {
                if table.try_insert(hash, value) {
                    return;
                }
            }
            // table full for this hash; grow and retry
            let capacity = writer.published.last().map_or(0, |table| table.capacity());
            self.rehash(&mut writer, tracker, &hasher, next_capacity(capacity), 0);
        }
    }

    /// Builds a replacement table of `new_capacity` slots, wide enough for
    /// `pending_min_value` and every already stored value, and publishes it.
    ///
    /// Reinsertion uses the same bounded placement as insert; if it fails, the partially
    /// filled table is discarded, the capacity doubled and the rebuild restarted, so readers
    /// only ever observe completely built tables.
    fn rehash(
        &self,
        writer: &mut WriterState,
        tracker: &impl OwnershipTracker,
        hasher: &impl Fn(usize) -> u64,
        mut new_capacity: usize,
        pending_min_value: u32,
    ) {
        let old = writer.published.last().cloned();
        let mut np = pending_min_value;
        if let Some(old) = &old {
            np = np.max(old.max_stored());
        }
        let mut width = WidthClass::for_value(np);
        if let Some(old) = &old {
            // widths never narrow, even when the surviving values would fit a narrower table
            width = width.max(old.width());
        }
        let new = 'build: loop {
            let new = PackedTable::new(width, new_capacity);
            if let Some(old) = &old {
                for slot in 0..old.capacity() {
                    let value = old.load_relaxed(slot);
                    if value != 0 && !new.try_insert(hasher((value - 1) as usize), value) {
                        new_capacity <<= 1;
                        continue 'build;
                    }
                }
            }
            break new;
        };
        log::trace!(
            "publishing rebuilt table: {new_capacity} slots at {width:?} (was {} slots)",
            old.as_ref().map_or(0, |old| old.capacity()),
        );
        let new = Arc::new(new);
        tracker.register_edge(&new);
        let ptr = Arc::as_ptr(&new) as *mut PackedTable;
        writer.published.push(new);
        self.current.store(ptr, Ordering::Release);
    }
}

impl fmt::Debug for SmallIndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_table() {
            Some(table) => fmt::Debug::fmt(table, f),
            None => f.debug_set().finish(),
        }
    }
}
