//! SyncTable: the open-addressing table shared between threads.
//!
//! Locking protocol
//! - Every operation first passes the [`Gate`]. Rebuilds (grow or cleanup)
//!   only run with the gate closed and no pass outstanding, so an operation
//!   always sees a single slot-array generation.
//! - A single-key operation holds the key lock selected by its initial probe
//!   index for its whole probe-and-place. Equal keys share an initial index,
//!   so all operations on one key are serialized.
//! - Individual slots sit behind their own mutex; placements claim a slot
//!   under it. Slot locks are only taken while holding a key lock and never
//!   two at a time, which keeps the lock order acyclic.
//! - Unlike the fixed key-lock pool, slot mutexes scale with the slot array.
//!   A probe sequence that crosses into slots covered by other key locks
//!   therefore never has to acquire several key locks in a global order.
//! - A new entry first reserves capacity on the `used` counter. When the
//!   growth policy refuses, the thread drops its locks, returns its pass and
//!   asks the gate for a rebuild, then retries the key in the new generation.

use crate::config::{LoadFactor, TableConfig};
use crate::error::TableError;
use crate::gate::{Gate, Pass};
use crate::growth::{self, Occupancy, Plan};
use crate::hash::{FoldKeys, HashParams, KeyOps, Probe, RawHash};
use crate::mul_table::{MulTable, TableStats};
use crate::reentrancy;
use crate::slot::{alloc_slots, Entry, Slot};
use core::borrow::Borrow;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::{Mutex, MutexGuard, RwLock};

/// Tables smaller than this are rebuilt by one thread.
const MIN_SHARDED_REHASH: usize = 1 << 12;

/// One slot array and its counters. Replaced as a whole by a rebuild.
struct Generation<K, V> {
    slots: Box<[Mutex<Slot<K, V>>]>,
    log_slots: u32,
    entries: AtomicUsize,
    tombstones: AtomicUsize,
    // entries + tombstones + reserved placements
    used: AtomicUsize,
    max_probe: AtomicUsize,
}

/// Why a new entry could not be reserved.
enum Blocked {
    Rebuild,
    Full(usize),
}

enum Attempt<K, V> {
    Done(Option<V>),
    NeedsRoom(K, V),
    Full(usize),
}

/// Concurrent open-addressing table.
///
/// All methods take `&self`; share the table by reference (e.g. with
/// `std::thread::scope`) or through an `Arc`. Lookups go through the same
/// gate and key locks as writers, so they never observe a half-finished
/// rebuild.
///
/// `KeyOps` callbacks run while locks are held and must not call back into
/// the same table. Debug builds panic on such nested calls.
///
/// ```
/// use muloa::SyncTable;
///
/// let table: SyncTable<u64, u64> = SyncTable::new();
/// std::thread::scope(|s| {
///     for t in 0..4u64 {
///         let table = &table;
///         s.spawn(move || table.insert_batch((0..100).map(|i| (t * 100 + i, i))));
///     }
/// });
/// assert_eq!(table.len(), 400);
/// assert_eq!(table.get(&250), Some(50));
/// ```
pub struct SyncTable<K, V, O = FoldKeys> {
    ops: O,
    params: HashParams,
    load: LoadFactor,
    max_log_slots: u32,
    grow_threads: usize,
    gate: Gate,
    key_locks: Box<[Mutex<()>]>,
    current: RwLock<Generation<K, V>>,
    ceiling_warned: AtomicBool,
}

impl<K, V> SyncTable<K, V>
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

impl<K, V> Default for SyncTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, O> SyncTable<K, V, O>
where
    O: KeyOps<K>,
{
    /// Panics if the initial slot array cannot be allocated.
    pub fn with_config_and_ops(config: TableConfig, ops: O) -> Self {
        Self::try_with_config_and_ops(config, ops).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_with_config_and_ops(config: TableConfig, ops: O) -> Result<Self, TableError> {
        let max_log_slots = config.max_log_slots(core::mem::size_of::<Mutex<Slot<K, V>>>());
        let log_slots = config.initial_log_slots(max_log_slots);
        let slots = alloc_slots(1usize << log_slots, || Mutex::new(Slot::Empty))?;
        let key_locks = (0..1usize << config.key_locks_log2)
            .map(|_| Mutex::new(()))
            .collect();
        Ok(Self {
            ops,
            params: HashParams::from_seed(config.hash_seed),
            load: config.load,
            max_log_slots,
            grow_threads: config.grow_threads,
            gate: Gate::new(),
            key_locks,
            current: RwLock::new(Generation {
                slots,
                log_slots,
                entries: AtomicUsize::new(0),
                tombstones: AtomicUsize::new(0),
                used: AtomicUsize::new(0),
                max_probe: AtomicUsize::new(1),
            }),
            ceiling_warned: AtomicBool::new(false),
        })
    }

    pub fn key_ops(&self) -> &O {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.current.read().entries.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the counters; exact once other threads are quiet.
    pub fn stats(&self) -> TableStats {
        let gen = self.current.read();
        TableStats {
            entries: gen.entries.load(Ordering::Acquire),
            tombstones: gen.tombstones.load(Ordering::Acquire),
            slots: gen.slots.len(),
            max_probe: gen.max_probe.load(Ordering::Acquire),
        }
    }

    /// Converts into a single-threaded table. Ownership proves no other
    /// thread is still operating on it.
    pub fn into_table(self) -> MulTable<K, V, O> {
        let gen = self.current.into_inner();
        let slots = gen
            .slots
            .into_vec()
            .into_iter()
            .map(Mutex::into_inner)
            .collect();
        MulTable::from_parts(
            self.ops,
            self.params,
            self.load,
            self.max_log_slots,
            gen.log_slots,
            slots,
        )
    }

    #[inline]
    fn key_lock(&self, probe: &Probe) -> MutexGuard<'_, ()> {
        self.key_locks[probe.start() & (self.key_locks.len() - 1)].lock()
    }

    /// Probes for `key` and returns its slot still locked. The caller holds
    /// the key's key lock.
    fn find_locked<'g, Q>(
        &self,
        gen: &'g Generation<K, V>,
        key: &Q,
        hash: RawHash,
        probe: Probe,
    ) -> Option<MutexGuard<'g, Slot<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let max_probe = gen.max_probe.load(Ordering::Acquire);
        for i in probe.take(max_probe) {
            let slot = gen.slots[i].lock();
            match &*slot {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied(e) => {
                    if e.hash == hash && self.ops.eq(e.key.borrow(), key) {
                        return Some(slot);
                    }
                }
            }
        }
        None
    }

    fn search_once<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let gen = self.current.read();
        let hash = self.params.raw(self.ops.reduce(key));
        let probe = hash.probe(gen.log_slots);
        let _key_lock = self.key_lock(&probe);
        let slot = self.find_locked(&gen, key, hash, probe)?;
        slot.entry().map(|e| f(&e.value))
    }

    fn remove_once<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let gen = self.current.read();
        let hash = self.params.raw(self.ops.reduce(key));
        let probe = hash.probe(gen.log_slots);
        let _key_lock = self.key_lock(&probe);
        let mut slot = self.find_locked(&gen, key, hash, probe)?;
        let e = slot.take_entry()?;
        gen.entries.fetch_sub(1, Ordering::AcqRel);
        gen.tombstones.fetch_add(1, Ordering::AcqRel);
        Some((e.key, e.value))
    }

    /// Calls `f` on the value stored for `key` while its slot is locked.
    pub fn search_with<Q, R, F>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
        F: FnOnce(&V) -> R,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        self.search_once(key, f)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
        V: Clone,
    {
        self.search_with(key, V::clone)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        self.search_with(key, |_| ()).is_some()
    }

    /// Looks up every key under one gate pass.
    pub fn search_batch<'q, Q, I>(&self, keys: I) -> Vec<Option<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + 'q,
        O: KeyOps<Q>,
        V: Clone,
        I: IntoIterator<Item = &'q Q>,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        keys.into_iter()
            .map(|k| self.search_once(k, V::clone))
            .collect()
    }

    /// Removes `key` and returns its value; the stored key is dropped.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        self.remove_once(key).map(|(_, v)| v)
    }

    /// Removes and drops `key` and its value. Returns false if absent.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        O: KeyOps<Q>,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        self.remove_once(key).is_some()
    }

    pub fn remove_batch<'q, Q, I>(&self, keys: I) -> Vec<Option<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + 'q,
        O: KeyOps<Q>,
        I: IntoIterator<Item = &'q Q>,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        keys.into_iter()
            .map(|k| self.remove_once(k).map(|(_, v)| v))
            .collect()
    }

    /// Deletes every key; returns how many were present.
    pub fn delete_batch<'q, Q, I>(&self, keys: I) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + 'q,
        O: KeyOps<Q>,
        I: IntoIterator<Item = &'q Q>,
    {
        let _g = reentrancy::enter(self);
        let _pass = self.gate.enter();
        keys.into_iter()
            .filter(|k| self.remove_once(*k).is_some())
            .count()
    }
}

impl<K, V, O> SyncTable<K, V, O>
where
    K: Send,
    V: Send,
    O: KeyOps<K>,
{
    /// Inserts or updates `key`; returns the replaced value.
    ///
    /// Panics if a rebuild cannot allocate its slot array, or if the table
    /// is full at its capacity ceiling; see [`try_insert`](Self::try_insert).
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_insert(&self, key: K, value: V) -> Result<Option<V>, TableError> {
        let _g = reentrancy::enter(self);
        let pass = self.gate.enter();
        let (_pass, res) = self.insert_in(pass, key, value);
        res
    }

    /// Inserts every pair under as few gate passes as possible. Replaced
    /// values are dropped.
    pub fn insert_batch<I>(&self, items: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.try_insert_batch(items)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Stops at the first failing pair; pairs before it stay inserted.
    pub fn try_insert_batch<I>(&self, items: I) -> Result<(), TableError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let _g = reentrancy::enter(self);
        let mut pass = self.gate.enter();
        for (key, value) in items {
            let (p, res) = self.insert_in(pass, key, value);
            pass = p;
            res?;
        }
        Ok(())
    }

    /// Inserts one pair, leaving the gate for rebuilds as often as needed.
    fn insert_in<'a>(
        &'a self,
        mut pass: Pass<'a>,
        mut key: K,
        mut value: V,
    ) -> (Pass<'a>, Result<Option<V>, TableError>) {
        loop {
            match self.try_insert_once(key, value) {
                Attempt::Done(old) => return (pass, Ok(old)),
                Attempt::Full(slots) => return (pass, Err(TableError::Full { slots })),
                Attempt::NeedsRoom(k, v) => {
                    key = k;
                    value = v;
                    if let Some(Err(e)) = pass.resize_with(|| self.rebuild()) {
                        return (self.gate.enter(), Err(e));
                    }
                    pass = self.gate.enter();
                }
            }
        }
    }

    fn try_insert_once(&self, key: K, value: V) -> Attempt<K, V> {
        let gen = self.current.read();
        let hash = self.params.raw(self.ops.reduce(&key));
        let probe = hash.probe(gen.log_slots);
        let _key_lock = self.key_lock(&probe);

        if let Some(mut slot) = self.find_locked(&gen, &key, hash, probe) {
            if let Some(e) = slot.entry_mut() {
                return Attempt::Done(Some(core::mem::replace(&mut e.value, value)));
            }
        }
        match self.reserve(&gen) {
            Ok(()) => {}
            Err(Blocked::Rebuild) => return Attempt::NeedsRoom(key, value),
            Err(Blocked::Full(slots)) => return Attempt::Full(slots),
        }

        for (n, i) in probe.take(gen.slots.len()).enumerate() {
            let mut slot = gen.slots[i].lock();
            match *slot {
                Slot::Occupied(_) => continue,
                Slot::Tombstone => {
                    gen.tombstones.fetch_sub(1, Ordering::AcqRel);
                    gen.used.fetch_sub(1, Ordering::AcqRel);
                }
                Slot::Empty => {}
            }
            *slot = Slot::Occupied(Entry { key, value, hash });
            gen.entries.fetch_add(1, Ordering::AcqRel);
            gen.max_probe.fetch_max(n + 1, Ordering::AcqRel);
            return Attempt::Done(None);
        }
        // The reservation guarantees a free slot; give it back regardless.
        gen.used.fetch_sub(1, Ordering::AcqRel);
        Attempt::Full(gen.slots.len())
    }

    /// Claims room for one new entry in `gen`.
    fn reserve(&self, gen: &Generation<K, V>) -> Result<(), Blocked> {
        let mut used = gen.used.load(Ordering::Acquire);
        loop {
            let tombstones = gen.tombstones.load(Ordering::Acquire).min(used);
            let occ = Occupancy {
                live: used - tombstones,
                tombstones,
                log_slots: gen.log_slots,
            };
            match growth::plan(occ, &self.load, self.max_log_slots) {
                Plan::Fits => {}
                Plan::Degraded => {
                    if !self.ceiling_warned.swap(true, Ordering::Relaxed) {
                        log::warn!(
                            "table reached its capacity ceiling of {} slots; load factor bound no longer enforced",
                            gen.slots.len()
                        );
                    }
                }
                Plan::Clean | Plan::Grow(_) => return Err(Blocked::Rebuild),
                Plan::Full => return Err(Blocked::Full(gen.slots.len())),
            }
            match gen.used.compare_exchange_weak(
                used,
                used + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => used = current,
            }
        }
    }

    /// Grows or cleans the table. Runs with the gate closed, so no other
    /// thread holds the generation.
    fn rebuild(&self) -> Result<(), TableError> {
        let mut gen = self.current.write();
        let entries = *gen.entries.get_mut();
        let occ = Occupancy {
            live: entries,
            tombstones: *gen.tombstones.get_mut(),
            log_slots: gen.log_slots,
        };
        let log_slots = match growth::plan(occ, &self.load, self.max_log_slots) {
            Plan::Clean => gen.log_slots,
            Plan::Grow(log) => log,
            // Another rebuild already made room.
            Plan::Fits | Plan::Degraded | Plan::Full => return Ok(()),
        };

        let fresh = alloc_slots(1usize << log_slots, || Mutex::new(Slot::Empty))?;
        let mut old = core::mem::replace(&mut gen.slots, fresh).into_vec();
        let max_probe = AtomicUsize::new(1);
        let target: &[Mutex<Slot<K, V>>] = &gen.slots;
        if self.grow_threads > 1 && old.len() >= MIN_SHARDED_REHASH {
            let chunk = old.len().div_ceil(self.grow_threads);
            std::thread::scope(|s| {
                for shard in old.chunks_mut(chunk) {
                    let max_probe = &max_probe;
                    s.spawn(move || rehash_shard(shard, target, log_slots, max_probe));
                }
            });
        } else {
            rehash_shard(&mut old, target, log_slots, &max_probe);
        }

        let old_len = old.len();
        let purged = *gen.tombstones.get_mut();
        gen.log_slots = log_slots;
        *gen.tombstones.get_mut() = 0;
        *gen.used.get_mut() = entries;
        *gen.max_probe.get_mut() = max_probe.into_inner();
        if old_len == gen.slots.len() {
            log::debug!("cleaned {purged} tombstones from {old_len} slots ({entries} entries)");
        } else {
            log::debug!(
                "grew from {old_len} to {} slots ({entries} entries, {} threads)",
                gen.slots.len(),
                self.grow_threads
            );
        }
        Ok(())
    }
}

/// Moves the entries of `shard` into `target` by their cached hashes.
fn rehash_shard<K, V>(
    shard: &mut [Mutex<Slot<K, V>>],
    target: &[Mutex<Slot<K, V>>],
    log_slots: u32,
    max_probe: &AtomicUsize,
) {
    let mut local = 1;
    for cell in shard {
        let Slot::Occupied(entry) = core::mem::replace(cell.get_mut(), Slot::Empty) else {
            continue;
        };
        for (n, i) in entry.hash.probe(log_slots).enumerate() {
            let mut slot = target[i].lock();
            if let Slot::Empty = *slot {
                *slot = Slot::Occupied(entry);
                local = local.max(n + 1);
                break;
            }
        }
    }
    max_probe.fetch_max(local, Ordering::AcqRel);
}
