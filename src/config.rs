//! Construction parameters shared by both table variants.

use crate::hash::KeyOps;
use crate::mul_table::MulTable;
use crate::sync_table::SyncTable;
use core::hash::Hash;

/// Smallest slot array a table ever uses (`2^3` slots).
pub const MIN_LOG_SLOTS: u32 = 3;

/// Hard cap on `log2(slot_count)`; probe indices come from the top bits of a
/// 64-bit hash.
const MAX_LOG_SLOTS: u32 = 62;

/// Upper bound on `(entries + tombstones) / slot_count`, stored as
/// `numerator / 2^log2_denominator`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoadFactor {
    numerator: u64,
    log2_denominator: u32,
}

impl LoadFactor {
    /// Panics unless `0 < numerator < 2^log2_denominator` and
    /// `log2_denominator <= 32`.
    pub fn new(numerator: u64, log2_denominator: u32) -> Self {
        assert!(
            log2_denominator <= 32,
            "load factor denominator 2^{log2_denominator} is too large"
        );
        assert!(
            numerator > 0 && numerator < 1u64 << log2_denominator,
            "load factor {numerator}/2^{log2_denominator} must lie strictly between 0 and 1"
        );
        Self {
            numerator,
            log2_denominator,
        }
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn log2_denominator(&self) -> u32 {
        self.log2_denominator
    }

    /// Largest `entries + tombstones` allowed with `2^log_slots` slots.
    /// Always strictly less than the slot count.
    #[inline]
    pub fn max_sum(&self, log_slots: u32) -> usize {
        (((1u128 << log_slots) * self.numerator as u128) >> self.log2_denominator) as usize
    }
}

impl Default for LoadFactor {
    /// One half.
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Builder-style configuration for [`MulTable`](crate::MulTable),
/// [`SyncTable`](crate::SyncTable) and [`BlockTable`](crate::BlockTable).
///
/// ```
/// use muloa::{MulTable, TableConfig};
///
/// let config = TableConfig::new()
///     .min_expected_entries(1_000)
///     .load_factor(3, 2); // 3/4
/// let mut table: MulTable<u64, u64> = MulTable::with_config(config);
/// table.insert(1, 10);
/// assert_eq!(table.search(&1), Some(&10));
/// ```
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub(crate) min_expected_entries: usize,
    pub(crate) load: LoadFactor,
    pub(crate) max_log_slots: Option<u32>,
    pub(crate) hash_seed: u64,
    pub(crate) key_locks_log2: u32,
    pub(crate) grow_threads: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_expected_entries: 0,
            load: LoadFactor::default(),
            max_log_slots: None,
            hash_seed: 0,
            key_locks_log2: 8,
            grow_threads: 1,
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the initial slot array so this many entries fit without growth.
    pub fn min_expected_entries(mut self, n: usize) -> Self {
        self.min_expected_entries = n;
        self
    }

    /// Sets the load-factor bound to `numerator / 2^log2_denominator`.
    pub fn load_factor(mut self, numerator: u64, log2_denominator: u32) -> Self {
        self.load = LoadFactor::new(numerator, log2_denominator);
        self
    }

    /// Caps the slot count at `2^log`. Past the cap a table keeps accepting
    /// entries above its load factor until only one free slot remains.
    pub fn max_slots_log2(mut self, log: u32) -> Self {
        assert!(
            log >= MIN_LOG_SLOTS,
            "slot count cap 2^{log} is below the minimum 2^{MIN_LOG_SLOTS}"
        );
        self.max_log_slots = Some(log);
        self
    }

    /// Seed from which the two hash primes are derived.
    pub fn hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = seed;
        self
    }

    /// Number of key locks of a [`SyncTable`](crate::SyncTable), as a power
    /// of two.
    pub fn key_locks_log2(mut self, log: u32) -> Self {
        assert!(log <= 16, "2^{log} key locks is excessive");
        self.key_locks_log2 = log;
        self
    }

    /// Threads that share a [`SyncTable`](crate::SyncTable) rehash.
    pub fn grow_threads(mut self, n: usize) -> Self {
        self.grow_threads = n.max(1);
        self
    }

    pub fn load(&self) -> LoadFactor {
        self.load
    }

    pub fn build<K: Eq + Hash, V>(self) -> MulTable<K, V> {
        MulTable::with_config(self)
    }

    pub fn build_with_ops<K, V, O: KeyOps<K>>(self, ops: O) -> MulTable<K, V, O> {
        MulTable::with_config_and_ops(self, ops)
    }

    pub fn build_sync<K: Eq + Hash, V>(self) -> SyncTable<K, V> {
        SyncTable::with_config(self)
    }

    /// Capacity ceiling for slots of `slot_size` bytes: the user cap if any,
    /// never more than what fits in `isize::MAX` bytes.
    pub(crate) fn max_log_slots(&self, slot_size: usize) -> u32 {
        let fits = (isize::MAX as usize / slot_size.max(1)).ilog2();
        let cap = fits.min(MAX_LOG_SLOTS).max(MIN_LOG_SLOTS);
        match self.max_log_slots {
            Some(user) => user.min(cap),
            None => cap,
        }
    }

    /// Smallest slot count whose bound admits `min_expected_entries`.
    pub(crate) fn initial_log_slots(&self, max_log: u32) -> u32 {
        let mut log = MIN_LOG_SLOTS;
        while log < max_log && self.load.max_sum(log) < self.min_expected_entries {
            log += 1;
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_sum_is_floor_and_below_slot_count() {
        let half = LoadFactor::default();
        assert_eq!(half.max_sum(3), 4);
        assert_eq!(half.max_sum(10), 512);

        let almost_full = LoadFactor::new(255, 8);
        for log in MIN_LOG_SLOTS..20 {
            assert!(almost_full.max_sum(log) < 1 << log);
        }
        assert_eq!(almost_full.max_sum(3), 7);

        let tiny = LoadFactor::new(1, 10);
        assert_eq!(tiny.max_sum(3), 0);
        assert_eq!(tiny.max_sum(10), 1);
    }

    #[test]
    #[should_panic(expected = "strictly between 0 and 1")]
    fn load_factor_of_one_rejected() {
        let _ = LoadFactor::new(4, 2);
    }

    #[test]
    #[should_panic(expected = "strictly between 0 and 1")]
    fn zero_load_factor_rejected() {
        let _ = TableConfig::new().load_factor(0, 4);
    }

    #[test]
    fn initial_size_follows_expected_entries() {
        let c = TableConfig::new();
        assert_eq!(c.initial_log_slots(40), MIN_LOG_SLOTS);
        let c = TableConfig::new().min_expected_entries(1000);
        // 1024 slots hold 512 at 1/2; 2048 hold 1024.
        assert_eq!(c.initial_log_slots(40), 11);
        assert_eq!(c.initial_log_slots(9), 9);
    }

    #[test]
    fn ceiling_respects_user_cap_and_memory() {
        let c = TableConfig::new();
        assert!(c.max_log_slots(32) <= 58);
        assert_eq!(TableConfig::new().max_slots_log2(5).max_log_slots(32), 5);
    }
}
