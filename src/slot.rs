//! Slot states and slot-array allocation.

use crate::error::TableError;
use crate::hash::RawHash;

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: RawHash,
}

/// A tombstone marks a slot that held an entry once. Lookups probe through
/// it; only a rehash turns it back into `Empty`.
#[derive(Debug)]
pub(crate) enum Slot<K, V> {
    Empty,
    Tombstone,
    Occupied(Entry<K, V>),
}

impl<K, V> Slot<K, V> {
    /// Moves the entry out and leaves a tombstone. Other states are left
    /// untouched.
    #[inline]
    pub(crate) fn take_entry(&mut self) -> Option<Entry<K, V>> {
        match self {
            Slot::Occupied(_) => match core::mem::replace(self, Slot::Tombstone) {
                Slot::Occupied(e) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn entry(&self) -> Option<&Entry<K, V>> {
        match self {
            Slot::Occupied(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self) -> Option<&mut Entry<K, V>> {
        match self {
            Slot::Occupied(e) => Some(e),
            _ => None,
        }
    }
}

/// Allocates `n` slots built by `make`, reporting allocation failure instead
/// of aborting.
pub(crate) fn alloc_slots<T>(n: usize, make: impl FnMut() -> T) -> Result<Box<[T]>, TableError> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| TableError::ResourceExhausted { slots: n })?;
    v.resize_with(n, make);
    Ok(v.into_boxed_slice())
}

/// Writes `entry` into the first empty slot of its probe sequence in a
/// freshly cleared array and returns the number of probes used.
///
/// The array must have at least one empty slot.
pub(crate) fn place_rehashed<K, V>(
    slots: &mut [Slot<K, V>],
    log_slots: u32,
    entry: Entry<K, V>,
) -> usize {
    for (n, i) in entry.hash.probe(log_slots).enumerate() {
        if let Slot::Empty = slots[i] {
            slots[i] = Slot::Occupied(entry);
            return n + 1;
        }
    }
    unreachable!("probe sequences are unbounded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashParams;

    #[test]
    fn take_entry_leaves_tombstone() {
        let hash = HashParams::default().raw(1);
        let mut s = Slot::Occupied(Entry {
            key: 1u32,
            value: "a",
            hash,
        });
        let e = s.take_entry().unwrap();
        assert_eq!((e.key, e.value), (1, "a"));
        assert!(matches!(s, Slot::Tombstone));
        assert!(s.take_entry().is_none());
        assert!(matches!(s, Slot::Tombstone));

        let mut empty: Slot<u32, &str> = Slot::Empty;
        assert!(empty.take_entry().is_none());
        assert!(matches!(empty, Slot::Empty));
    }

    #[test]
    fn rehash_placement_skips_occupied() {
        let params = HashParams::default();
        let mut slots: Vec<Slot<u64, ()>> = (0..8).map(|_| Slot::Empty).collect();
        // Two entries with the same raw hash must land on distinct slots.
        let hash = params.raw(5);
        assert_eq!(place_rehashed(&mut slots, 3, Entry { key: 1, value: (), hash }), 1);
        assert_eq!(place_rehashed(&mut slots, 3, Entry { key: 2, value: (), hash }), 2);
        let live = slots.iter().filter(|s| s.entry().is_some()).count();
        assert_eq!(live, 2);
    }

    #[test]
    fn alloc_reports_impossible_sizes() {
        let r = alloc_slots::<Slot<u64, u64>>(usize::MAX, || Slot::Empty);
        assert_eq!(
            r.err(),
            Some(TableError::ResourceExhausted { slots: usize::MAX })
        );
    }
}
