//! Bounded linear probe sequences over power-of-two tables.

#[cfg(test)]
#[path = "tests/test_probe.rs"]
mod test_probe;

/// Returns the probe bound for a table of `capacity` slots.
///
/// This is a fixed empirical bound, independent of the table's load factor: 16 for tables of up
/// to 1024 slots, a 64th of the capacity beyond that. Probing never scans the whole table.
pub(crate) fn max_probe(capacity: usize) -> usize {
    if capacity <= 1024 {
        16
    } else {
        capacity >> 6
    }
}

/// Iterator over the candidate slots for a hash value.
///
/// Starts at `hash mod capacity` and steps by one slot (wrapping), visiting at most
/// `max_probe(capacity) + 1` slots and stopping early if it would wrap around to the start
/// slot. Lookup, insertion and rehashing all walk the same sequence, so an entry placed by the
/// writer is always reachable by a subsequent lookup with the same hash.
pub(crate) struct ProbeSeq {
    mask: usize,
    slot: usize,
    start: usize,
    remaining: usize,
}

impl ProbeSeq {
    /// Constructs the probe sequence for `hash` in a table of `capacity` slots.
    ///
    /// `capacity` must be a nonzero power of two.
    pub(crate) fn new(hash: u64, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mask = capacity - 1;
        let start = (hash as usize) & mask;
        ProbeSeq {
            mask,
            slot: start,
            start,
            remaining: max_probe(capacity) + 1,
        }
    }
}

impl Iterator for ProbeSeq {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.slot;
        self.remaining -= 1;
        self.slot = (self.slot + 1) & self.mask;
        if self.slot == self.start {
            // wrapped around, every slot was visited
            self.remaining = 0;
        }
        Some(slot)
    }
}
