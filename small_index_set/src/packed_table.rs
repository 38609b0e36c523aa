//! Packed fixed-width slot storage shared between one writer and concurrent readers.
use std::{fmt, sync::atomic::Ordering};

use atomic::Atomic;

use crate::probe::ProbeSeq;

#[cfg(test)]
#[path = "tests/test_packed_table.rs"]
mod test_packed_table;

/// Slot width of a [`PackedTable`].
///
/// A table's width is fixed at construction and chosen as the narrowest class that can
/// represent the largest slot value the table must hold. Across the lifetime of a
/// [`SmallIndexSet`](crate::SmallIndexSet) the width only ever increases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WidthClass {
    /// 8-bit slots.
    U8,
    /// 16-bit slots.
    U16,
    /// 32-bit slots.
    U32,
}

impl WidthClass {
    /// Returns the largest slot value representable at this width.
    pub fn max_value(self) -> u32 {
        match self {
            WidthClass::U8 => u8::MAX as u32,
            WidthClass::U16 => u16::MAX as u32,
            WidthClass::U32 => u32::MAX,
        }
    }

    /// Returns the narrowest width that can represent `value`.
    pub(crate) fn for_value(value: u32) -> Self {
        if value <= u8::MAX as u32 {
            WidthClass::U8
        } else if value <= u16::MAX as u32 {
            WidthClass::U16
        } else {
            WidthClass::U32
        }
    }
}

enum Slots {
    U8(Box<[Atomic<u8>]>),
    U16(Box<[Atomic<u16>]>),
    U32(Box<[Atomic<u32>]>),
}

/// Fixed-capacity open-addressing table of packed slot values.
///
/// Slot value 0 means "empty"; a non-zero value `v` encodes logical index `v - 1`, so
/// zero-initialized storage is a valid empty table with no separate validity bitmap. The
/// capacity is a power of two, or zero for a table that cannot hold anything yet.
///
/// A table is mutated in exactly one way after construction: the writer fills a previously
/// empty slot with a release store. Readers use acquire loads, so observing a slot value also
/// makes everything the writer did before publishing it visible. Growing or widening never
/// touches an existing table; a replacement is built from scratch and swapped in by
/// [`SmallIndexSet`](crate::SmallIndexSet).
pub struct PackedTable {
    slots: Slots,
}

impl PackedTable {
    /// Allocates a zero-filled (all empty) table.
    ///
    /// `capacity` must be zero or a power of two.
    pub(crate) fn new(width: WidthClass, capacity: usize) -> Self {
        debug_assert!(capacity == 0 || capacity.is_power_of_two());
        let slots = match width {
            WidthClass::U8 => Slots::U8((0..capacity).map(|_| Atomic::new(0)).collect()),
            WidthClass::U16 => Slots::U16((0..capacity).map(|_| Atomic::new(0)).collect()),
            WidthClass::U32 => Slots::U32((0..capacity).map(|_| Atomic::new(0)).collect()),
        };
        PackedTable { slots }
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        match &self.slots {
            Slots::U8(slots) => slots.len(),
            Slots::U16(slots) => slots.len(),
            Slots::U32(slots) => slots.len(),
        }
    }

    /// Returns the slot width of this table.
    pub fn width(&self) -> WidthClass {
        match &self.slots {
            Slots::U8(_) => WidthClass::U8,
            Slots::U16(_) => WidthClass::U16,
            Slots::U32(_) => WidthClass::U32,
        }
    }

    /// Returns the largest slot value this table can hold.
    pub fn max_value(&self) -> u32 {
        self.width().max_value()
    }

    fn load(&self, slot: usize, order: Ordering) -> u32 {
        match &self.slots {
            Slots::U8(slots) => slots[slot].load(order) as u32,
            Slots::U16(slots) => slots[slot].load(order) as u32,
            Slots::U32(slots) => slots[slot].load(order),
        }
    }

    /// Reads a slot without ordering; only valid on the writer's own thread.
    pub(crate) fn load_relaxed(&self, slot: usize) -> u32 {
        self.load(slot, Ordering::Relaxed)
    }

    /// Reads a slot with acquire ordering, pairing with the writer's release stores.
    pub(crate) fn load_acquire(&self, slot: usize) -> u32 {
        self.load(slot, Ordering::Acquire)
    }

    /// Publishes `value` into a slot with release ordering.
    ///
    /// A reader that acquire-loads the slot and sees `value` also sees every write the
    /// writer performed before this store, including any entry data the index refers to.
    fn store_release(&self, slot: usize, value: u32) {
        debug_assert!(value <= self.max_value());
        match &self.slots {
            Slots::U8(slots) => slots[slot].store(value as u8, Ordering::Release),
            Slots::U16(slots) => slots[slot].store(value as u16, Ordering::Release),
            Slots::U32(slots) => slots[slot].store(value, Ordering::Release),
        }
    }

    /// Searches the probe sequence of `hash` for an entry accepted by `eq`.
    ///
    /// Safe to call from any thread concurrently with the writer. An empty slot terminates
    /// the search (there are no tombstones), and the probe bound can produce a spurious
    /// `None` for an entry placed beyond it in a near-full table.
    pub(crate) fn lookup(&self, hash: u64, mut eq: impl FnMut(usize) -> bool) -> Option<usize> {
        if self.capacity() == 0 {
            return None;
        }
        for slot in ProbeSeq::new(hash, self.capacity()) {
            let value = self.load_acquire(slot);
            if value == 0 {
                return None;
            }
            let index = (value - 1) as usize;
            if eq(index) {
                return Some(index);
            }
        }
        None
    }

    /// Places `value` in the first empty slot along the probe sequence of `hash`.
    ///
    /// Writer-only. Returns false when the probe bound is exhausted, i.e. the table is
    /// effectively full for this hash and must be replaced by a larger one.
    pub(crate) fn try_insert(&self, hash: u64, value: u32) -> bool {
        if self.capacity() <= 1 {
            return false;
        }
        for slot in ProbeSeq::new(hash, self.capacity()) {
            if self.load_relaxed(slot) == 0 {
                self.store_release(slot, value);
                return true;
            }
        }
        false
    }

    /// Returns the largest stored slot value, or 0 for an empty table. Writer-only.
    pub(crate) fn max_stored(&self) -> u32 {
        (0..self.capacity())
            .map(|slot| self.load_relaxed(slot))
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Debug for PackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries((0..self.capacity()).filter_map(|slot| {
                let value = self.load_acquire(slot);
                (value != 0).then(|| (value - 1) as usize)
            }))
            .finish()
    }
}
