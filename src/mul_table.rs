//! MulTable: single-threaded open-addressing table with double hashing.

use crate::config::{LoadFactor, TableConfig};
use crate::error::TableError;
use crate::growth::{self, Occupancy, Plan};
use crate::hash::{FoldKeys, HashParams, KeyOps, RawHash};
use crate::slot::{alloc_slots, place_rehashed, Entry, Slot};
use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;

/// Counters describing a table's current shape.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableStats {
    pub entries: usize,
    pub tombstones: usize,
    pub slots: usize,
    /// Upper bound on the probes any successful lookup needs.
    pub max_probe: usize,
}

/// Open-addressing hash table with multiplicative double hashing.
///
/// Removal leaves a tombstone in the slot so probe chains built earlier stay
/// intact. Before a new entry is placed, the table grows (doubles) or, when
/// tombstones outnumber entries, is rebuilt at the same size, so that
/// `entries + tombstones` never exceeds the load-factor bound. Past the
/// configured capacity ceiling the bound is relaxed instead.
pub struct MulTable<K, V, O = FoldKeys> {
    ops: O,
    params: HashParams,
    load: LoadFactor,
    max_log_slots: u32,
    log_slots: u32,
    max_probe: usize,
    entries: usize,
    tombstones: usize,
    slots: Box<[Slot<K, V>]>,
    ceiling_warned: bool,
}

/// Outcome of probing for a key: the slot holding it, or the first slot a
/// new entry could take (with its probe count) if one was seen.
enum Lookup {
    Found(usize),
    Vacant(Option<(usize, usize)>),
}

impl<K, V> MulTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self::with_config_and_ops(config, FoldKeys)
    }
}

impl<K, V> Default for MulTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, O> MulTable<K, V, O>
where
    O: KeyOps<K>,
{
    /// Panics if the initial slot array cannot be allocated.
    pub fn with_config_and_ops(config: TableConfig, ops: O) -> Self {
        Self::try_with_config_and_ops(config, ops).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_with_config_and_ops(config: TableConfig, ops: O) -> Result<Self, TableError> {
        let max_log_slots = config.max_log_slots(core::mem::size_of::<Slot<K, V>>());
        let log_slots = config.initial_log_slots(max_log_slots);
        let slots = alloc_slots(1usize << log_slots, || Slot::Empty)?;
        Ok(Self::from_parts(
            ops,
            HashParams::from_seed(config.hash_seed),
            config.load,
            max_log_slots,
            log_slots,
            slots,
        ))
    }

    /// Assembles a table around an existing slot array, recounting entries,
    /// tombstones and the probe bound.
    pub(crate) fn from_parts(
        ops: O,
        params: HashParams,
        load: LoadFactor,
        max_log_slots: u32,
        log_slots: u32,
        slots: Box<[Slot<K, V>]>,
    ) -> Self {
        debug_assert_eq!(slots.len(), 1usize << log_slots);
        let mut t = Self {
            ops,
            params,
            load,
            max_log_slots,
            log_slots,
            max_probe: 1,
            entries: 0,
            tombstones: 0,
            slots,
            ceiling_warned: false,
        };
        for i in 0..t.slots.len() {
            match &t.slots[i] {
                Slot::Empty => {}
                Slot::Tombstone => t.tombstones += 1,
                Slot::Occupied(e) => {
                    t.entries += 1;
                    let probes = t.probes_to(e.hash, i);
                    t.max_probe = t.max_probe.max(probes);
                }
            }
        }
        t
    }

    /// Position of slot `target` in the probe sequence of `hash`, 1-based.
    fn probes_to(&self, hash: RawHash, target: usize) -> usize {
        hash.probe(self.log_slots)
            .take(self.slots.len())
            .position(|i| i == target)
            .map_or(self.slots.len(), |n| n + 1)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn load_factor(&self) -> LoadFactor {
        self.load
    }

    pub fn hash_params(&self) -> HashParams {
        self.params
    }

    pub fn key_ops(&self) -> &O {
        &self.ops
    }

    /// Only valid while no entry is stored: entries cache hashes computed
    /// with the old policy. Tombstones carry no hash and may remain.
    pub(crate) fn key_ops_mut(&mut self) -> &mut O {
        debug_assert!(self.entries == 0);
        &mut self.ops
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            entries: self.entries,
            tombstones: self.tombstones,
            slots: self.slots.len(),
            max_probe: self.max_probe,
        }
    }

    #[inline]
    fn raw_hash<Q>(&self, key: &Q) -> RawHash
    where
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        self.params.raw(self.ops.reduce(key))
    }

    /// Walks at most `max_probe` slots. Stops at the key, or at the first
    /// empty slot since no key lies past a gap in its chain.
    fn lookup<Q>(&self, key: &Q, hash: RawHash) -> Lookup
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let mut vacant = None;
        for (n, i) in hash.probe(self.log_slots).take(self.max_probe).enumerate() {
            match &self.slots[i] {
                Slot::Empty => return Lookup::Vacant(vacant.or(Some((i, n + 1)))),
                Slot::Tombstone => {
                    if vacant.is_none() {
                        vacant = Some((i, n + 1));
                    }
                }
                Slot::Occupied(e) => {
                    // Equal keys reduce equally, so a hash mismatch rules
                    // the slot out without calling `eq`.
                    if e.hash == hash && self.ops.eq(e.key.borrow(), key) {
                        return Lookup::Found(i);
                    }
                }
            }
        }
        Lookup::Vacant(vacant)
    }

    fn find<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        match self.lookup(key, self.raw_hash(key)) {
            Lookup::Found(i) => Some(i),
            Lookup::Vacant(_) => None,
        }
    }

    /// Inserts `key -> value`, or replaces the value of an equal key already
    /// present and returns the old one. The passed key is dropped in that
    /// case; the stored key is kept.
    ///
    /// Panics if the table must grow and the allocation fails, or if it is
    /// full at its capacity ceiling; see [`try_insert`](Self::try_insert).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, TableError> {
        let hash = self.raw_hash(&key);
        let hint = match self.lookup(&key, hash) {
            Lookup::Found(i) => {
                let e = self.slots[i].entry_mut().map(|e| &mut e.value);
                return Ok(e.map(|old| core::mem::replace(old, value)));
            }
            Lookup::Vacant(hint) => hint,
        };
        let hint = if self.make_room()? { None } else { hint };
        self.place(Entry { key, value, hash }, hint)
    }

    /// Grows or cleans up so one more entry fits. Returns true if the slot
    /// array was rebuilt.
    fn make_room(&mut self) -> Result<bool, TableError> {
        let occ = Occupancy {
            live: self.entries,
            tombstones: self.tombstones,
            log_slots: self.log_slots,
        };
        match growth::plan(occ, &self.load, self.max_log_slots) {
            Plan::Fits => Ok(false),
            Plan::Clean => self.rehash(self.log_slots).map(|_| true),
            Plan::Grow(log) => self.rehash(log).map(|_| true),
            Plan::Degraded => {
                if !self.ceiling_warned {
                    self.ceiling_warned = true;
                    log::warn!(
                        "table reached its capacity ceiling of {} slots; load factor bound no longer enforced",
                        self.slots.len()
                    );
                }
                Ok(false)
            }
            Plan::Full => Err(TableError::Full {
                slots: self.slots.len(),
            }),
        }
    }

    /// Writes a new entry at `hint` or, without a hint, at the first
    /// tombstone or empty slot of its probe sequence.
    fn place(
        &mut self,
        entry: Entry<K, V>,
        hint: Option<(usize, usize)>,
    ) -> Result<Option<V>, TableError> {
        let target = hint.or_else(|| {
            entry
                .hash
                .probe(self.log_slots)
                .take(self.slots.len())
                .enumerate()
                .find(|&(_, i)| !matches!(self.slots[i], Slot::Occupied(_)))
                .map(|(n, i)| (i, n + 1))
        });
        let Some((i, probes)) = target else {
            return Err(TableError::Full {
                slots: self.slots.len(),
            });
        };
        if let Slot::Tombstone = self.slots[i] {
            self.tombstones -= 1;
        }
        self.slots[i] = Slot::Occupied(entry);
        self.entries += 1;
        self.max_probe = self.max_probe.max(probes);
        Ok(None)
    }

    /// Rebuilds the slot array with `2^log_slots` slots from cached hashes.
    /// On allocation failure the table is unchanged.
    fn rehash(&mut self, log_slots: u32) -> Result<(), TableError> {
        let fresh = alloc_slots(1usize << log_slots, || Slot::Empty)?;
        let old = core::mem::replace(&mut self.slots, fresh);
        let old_len = old.len();
        let purged = self.tombstones;

        let mut max_probe = 1;
        for slot in old.into_vec() {
            if let Slot::Occupied(e) = slot {
                max_probe = max_probe.max(place_rehashed(&mut self.slots, log_slots, e));
            }
        }
        self.log_slots = log_slots;
        self.tombstones = 0;
        self.max_probe = max_probe;

        if old_len == self.slots.len() {
            log::debug!(
                "cleaned {purged} tombstones from {old_len} slots ({} entries)",
                self.entries
            );
        } else {
            log::debug!(
                "grew from {old_len} to {} slots ({} entries, max probe {max_probe})",
                self.slots.len(),
                self.entries
            );
        }
        Ok(())
    }

    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let i = self.find(key)?;
        self.slots[i].entry().map(|e| &e.value)
    }

    pub fn search_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let i = self.find(key)?;
        self.slots[i].entry_mut().map(|e| &mut e.value)
    }

    pub fn search_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let i = self.find(key)?;
        self.slots[i].entry().map(|e| (&e.key, &e.value))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        self.find(key).is_some()
    }

    /// Number of probes a successful lookup of `key` takes; `None` if absent.
    pub fn probe_count<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let hash = self.raw_hash(key);
        match self.lookup(key, hash) {
            Lookup::Found(i) => Some(self.probes_to(hash, i)),
            Lookup::Vacant(_) => None,
        }
    }

    /// Removes `key` and hands back its key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let i = self.find(key)?;
        let e = self.slots[i].take_entry()?;
        self.entries -= 1;
        self.tombstones += 1;
        Some((e.key, e.value))
    }

    /// Removes `key`, hands back its value and drops the stored key.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes and drops `key` and its value. Returns false if absent.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        self.remove_entry(key).is_some()
    }

    /// Drops every entry; the slot count is kept.
    pub fn clear(&mut self) {
        self.drain();
    }

    /// Removes all entries, yielding them in slot order. Tombstones are
    /// cleared too. Entries not consumed are dropped with the iterator.
    ///
    /// Each yielded entry leaves a tombstone until the iterator is dropped,
    /// so a leaked `Drain` leaves a consistent table holding the entries it
    /// did not yield.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            slots: &mut self.slots,
            pos: 0,
            entries: &mut self.entries,
            tombstones: &mut self.tombstones,
            max_probe: &mut self.max_probe,
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots.iter(),
            remaining: self.entries,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.slots.iter_mut(),
            remaining: self.entries,
        }
    }
}

/// Iterator over entries in slot order.
pub struct Iter<'a, K, V> {
    it: core::slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.it.by_ref().find_map(Slot::entry)?;
        self.remaining -= 1;
        Some((&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over entries with mutable values.
pub struct IterMut<'a, K, V> {
    it: core::slice::IterMut<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.it.by_ref().find_map(Slot::entry_mut)?;
        self.remaining -= 1;
        Some((&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Draining iterator returned by [`MulTable::drain`].
pub struct Drain<'a, K, V> {
    slots: &'a mut [Slot<K, V>],
    pos: usize,
    entries: &'a mut usize,
    tombstones: &'a mut usize,
    max_probe: &'a mut usize,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        while let Some(slot) = self.slots.get_mut(self.pos) {
            self.pos += 1;
            if let Some(e) = slot.take_entry() {
                *self.entries -= 1;
                *self.tombstones += 1;
                return Some((e.key, e.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (*self.entries, Some(*self.entries))
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

impl<K, V> Drop for Drain<'_, K, V> {
    fn drop(&mut self) {
        *self.entries = 0;
        *self.tombstones = 0;
        *self.max_probe = 1;
        for slot in self.slots.iter_mut() {
            *slot = Slot::Empty;
        }
    }
}

impl<'a, K, V, O> IntoIterator for &'a MulTable<K, V, O>
where
    O: KeyOps<K>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, O> Extend<(K, V)> for MulTable<K, V, O>
where
    O: KeyOps<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for MulTable<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let config = TableConfig::new().min_expected_entries(iter.size_hint().0);
        let mut t = Self::with_config(config);
        t.extend(iter);
        t
    }
}

impl<K, V, O> fmt::Debug for MulTable<K, V, O>
where
    K: fmt::Debug,
    V: fmt::Debug,
    O: KeyOps<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
