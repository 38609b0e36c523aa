//! [`SmallIndexSet`] is a growable set of small non-negative integers ("logical indices")
//! supporting lock-free concurrent lookups alongside a single serialized writer.
//!
//! The intended use is as an accelerator for a separate, externally owned keyed collection:
//! the set stores positions into that collection, keyed by a hash derived from the collection's
//! keys. The set itself never sees the keys; callers pass hash values along with closures that
//! compare or rehash entries by their logical index, in the style of a low-level explicitly
//! hashed table.
//!
//! Internally the set is a packed open-addressing table whose slots are 8, 16 or 32 bits wide,
//! using the narrowest width that can represent the largest stored index. Slot value 0 means
//! "empty" and a non-zero value `v` encodes logical index `v - 1`, so zero-filled storage is a
//! valid empty table. Tables are never resized or widened in place; growing or widening builds
//! a fresh table and publishes it wholesale with a release store, which is what makes the
//! concurrent read path safe without any locking.
//!
//! Probing is bounded: lookups and insertions inspect a small, size-dependent number of slots
//! and then give up. For the writer "give up" triggers growth; for readers it means a lookup
//! against a borderline-saturated table can return `None` for an entry that is present beyond
//! the bound. This is a deliberate trade-off of a small false-negative probability for bounded
//! worst-case latency, not a defect; entries placed by a completed `insert` are always found.
//!
//! Deletion is not supported, which is also why an empty slot can terminate a probe early:
//! there are no tombstones.

mod index_set;
mod packed_table;
mod probe;

pub use index_set::{OwnershipTracker, SmallIndexSet};
pub use packed_table::{PackedTable, WidthClass};
