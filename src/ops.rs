//! Table operations shared by algorithm code.
//!
//! Graph algorithms (shortest paths, search, dynamic programming over
//! subsets) need a map from vertex keys to per-vertex state and nothing more.
//! Writing them against [`TableOps`] lets a caller pick the table family.

use crate::config::TableConfig;
use crate::hash::KeyOps;
use crate::mul_table::MulTable;
use core::hash::{BuildHasher, Hash};

/// The map operations an algorithm may rely on.
pub trait TableOps<K, V> {
    /// An empty table sized so `min_expected_entries` fit without growing.
    fn with_expected(min_expected_entries: usize) -> Self
    where
        Self: Sized;

    /// Inserts or updates; returns the replaced value.
    fn insert(&mut self, key: K, value: V) -> Option<V>;

    fn search(&self, key: &K) -> Option<&V>;

    fn remove(&mut self, key: &K) -> Option<V>;

    fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, O> TableOps<K, V> for MulTable<K, V, O>
where
    O: KeyOps<K> + Default,
{
    fn with_expected(min_expected_entries: usize) -> Self {
        let config = TableConfig::new().min_expected_entries(min_expected_entries);
        MulTable::with_config_and_ops(config, O::default())
    }

    #[inline]
    fn insert(&mut self, key: K, value: V) -> Option<V> {
        MulTable::insert(self, key, value)
    }

    #[inline]
    fn search(&self, key: &K) -> Option<&V> {
        MulTable::search(self, key)
    }

    #[inline]
    fn remove(&mut self, key: &K) -> Option<V> {
        MulTable::remove(self, key)
    }

    #[inline]
    fn delete(&mut self, key: &K) -> bool {
        MulTable::delete(self, key)
    }

    fn len(&self) -> usize {
        MulTable::len(self)
    }
}

impl<K, V, S> TableOps<K, V> for hashbrown::HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn with_expected(min_expected_entries: usize) -> Self {
        hashbrown::HashMap::with_capacity_and_hasher(min_expected_entries, S::default())
    }

    #[inline]
    fn insert(&mut self, key: K, value: V) -> Option<V> {
        hashbrown::HashMap::insert(self, key, value)
    }

    #[inline]
    fn search(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    #[inline]
    fn remove(&mut self, key: &K) -> Option<V> {
        hashbrown::HashMap::remove(self, key)
    }

    fn len(&self) -> usize {
        hashbrown::HashMap::len(self)
    }
}
