//! BlockTable: keys and elements as fixed-size byte blocks.
//!
//! The table copies blocks in and out and interprets key bytes only through
//! its key hooks. Release hooks stand in for destructors of payloads that
//! own resources outside the stored bytes (handles, out-of-line pointers):
//! they run on every block the table gives up.

use crate::config::TableConfig;
use crate::error::TableError;
use crate::hash::{fold_bytes, KeyOps};
use crate::mul_table::{MulTable, TableStats};
use core::fmt;

type EqHook = Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;
type ReduceHook = Box<dyn Fn(&[u8]) -> u64 + Send + Sync>;
type ReleaseHook = Box<dyn FnMut(&mut [u8]) + Send>;

/// Key policy over byte blocks: custom hooks, or byte equality and folding.
pub struct BlockKeys {
    eq: Option<EqHook>,
    reduce: Option<ReduceHook>,
}

impl KeyOps<[u8]> for BlockKeys {
    #[inline]
    fn reduce(&self, key: &[u8]) -> u64 {
        match &self.reduce {
            Some(f) => f(key),
            None => fold_bytes(key),
        }
    }

    #[inline]
    fn eq(&self, a: &[u8], b: &[u8]) -> bool {
        match &self.eq {
            Some(f) => f(a, b),
            None => a == b,
        }
    }
}

impl KeyOps<Box<[u8]>> for BlockKeys {
    #[inline]
    fn reduce(&self, key: &Box<[u8]>) -> u64 {
        KeyOps::<[u8]>::reduce(self, key)
    }

    #[inline]
    fn eq(&self, a: &Box<[u8]>, b: &Box<[u8]>) -> bool {
        KeyOps::<[u8]>::eq(self, a, b)
    }
}

/// Hash table over byte blocks of sizes fixed at construction.
///
/// ```
/// use muloa::{BlockTable, TableConfig};
///
/// let mut t = BlockTable::new(4, 8, TableConfig::new());
/// t.insert(&7u32.to_le_bytes(), &49u64.to_le_bytes());
/// assert_eq!(t.search(&7u32.to_le_bytes()), Some(&49u64.to_le_bytes()[..]));
///
/// let mut out = [0u8; 8];
/// assert!(t.remove(&7u32.to_le_bytes(), &mut out));
/// assert_eq!(u64::from_le_bytes(out), 49);
/// ```
pub struct BlockTable {
    key_size: usize,
    elt_size: usize,
    table: MulTable<Box<[u8]>, Box<[u8]>, BlockKeys>,
    key_release: Option<ReleaseHook>,
    elt_release: Option<ReleaseHook>,
}

impl BlockTable {
    /// Panics if either size is zero or the slot array cannot be allocated.
    pub fn new(key_size: usize, elt_size: usize, config: TableConfig) -> Self {
        assert!(key_size > 0, "key blocks must be at least one byte");
        assert!(elt_size > 0, "element blocks must be at least one byte");
        let ops = BlockKeys {
            eq: None,
            reduce: None,
        };
        Self {
            key_size,
            elt_size,
            table: MulTable::with_config_and_ops(config, ops),
            key_release: None,
            elt_release: None,
        }
    }

    /// Replaces byte equality of keys. Must be set while the table holds no
    /// entries, and keys it calls equal must reduce to the same word.
    pub fn with_key_eq(mut self, eq: impl Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static) -> Self {
        assert!(self.table.is_empty(), "key hooks must be set on an empty table");
        self.table.key_ops_mut().eq = Some(Box::new(eq));
        self
    }

    /// Replaces the default reduction (zero-extension up to 8 bytes, folding
    /// beyond). Must be set while the table holds no entries.
    pub fn with_key_reduce(mut self, reduce: impl Fn(&[u8]) -> u64 + Send + Sync + 'static) -> Self {
        assert!(self.table.is_empty(), "key hooks must be set on an empty table");
        self.table.key_ops_mut().reduce = Some(Box::new(reduce));
        self
    }

    /// Runs on every key block the table releases.
    pub fn with_key_release(mut self, release: impl FnMut(&mut [u8]) + Send + 'static) -> Self {
        self.key_release = Some(Box::new(release));
        self
    }

    /// Runs on every element block the table releases, including elements
    /// replaced by an update.
    pub fn with_elt_release(mut self, release: impl FnMut(&mut [u8]) + Send + 'static) -> Self {
        self.elt_release = Some(Box::new(release));
        self
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn elt_size(&self) -> usize {
        self.elt_size
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    #[inline]
    fn check_key(&self, key: &[u8]) {
        assert_eq!(key.len(), self.key_size, "key block has the wrong length");
    }

    #[inline]
    fn check_elt(&self, elt: &[u8]) {
        assert_eq!(elt.len(), self.elt_size, "element block has the wrong length");
    }

    /// Copies `key` and `elt` into the table. If an equal key is present,
    /// its element is released and overwritten in place.
    pub fn insert(&mut self, key: &[u8], elt: &[u8]) {
        self.try_insert(key, elt).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_insert(&mut self, key: &[u8], elt: &[u8]) -> Result<(), TableError> {
        self.check_key(key);
        self.check_elt(elt);
        if let Some(old) = self.table.search_mut(key) {
            if let Some(release) = &mut self.elt_release {
                release(old);
            }
            old.copy_from_slice(elt);
            return Ok(());
        }
        self.table.try_insert(key.into(), elt.into())?;
        Ok(())
    }

    pub fn search(&self, key: &[u8]) -> Option<&[u8]> {
        self.check_key(key);
        self.table.search(key).map(|e| &e[..])
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.search(key).is_some()
    }

    /// Moves the element of `key` into `out` and releases the stored key.
    /// The element hook does not run: the caller now owns the element.
    pub fn remove(&mut self, key: &[u8], out: &mut [u8]) -> bool {
        self.check_key(key);
        self.check_elt(out);
        let Some((mut k, e)) = self.table.remove_entry(key) else {
            return false;
        };
        out.copy_from_slice(&e);
        if let Some(release) = &mut self.key_release {
            release(&mut k);
        }
        true
    }

    /// Removes `key` and releases both of its blocks.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.check_key(key);
        let Some((mut k, mut e)) = self.table.remove_entry(key) else {
            return false;
        };
        if let Some(release) = &mut self.key_release {
            release(&mut k);
        }
        if let Some(release) = &mut self.elt_release {
            release(&mut e);
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.table.iter().map(|(k, e)| (&k[..], &e[..]))
    }
}

impl Drop for BlockTable {
    fn drop(&mut self) {
        if self.key_release.is_none() && self.elt_release.is_none() {
            return;
        }
        for (mut k, mut e) in self.table.drain() {
            if let Some(release) = &mut self.key_release {
                release(&mut k);
            }
            if let Some(release) = &mut self.elt_release {
                release(&mut e);
            }
        }
    }
}

impl fmt::Debug for BlockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockTable")
            .field("key_size", &self.key_size)
            .field("elt_size", &self.elt_size)
            .field("stats", &self.table.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(&mut [u8]) + Send + 'static) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = n.clone();
        (n, move |_: &mut [u8]| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn insert_search_update() {
        let mut t = BlockTable::new(2, 3, TableConfig::new());
        t.insert(&[1, 2], &[7, 7, 7]);
        assert_eq!(t.search(&[1, 2]), Some(&[7u8, 7, 7][..]));
        t.insert(&[1, 2], &[8, 8, 8]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.search(&[1, 2]), Some(&[8u8, 8, 8][..]));
        assert_eq!(t.search(&[2, 1]), None);
    }

    #[test]
    fn long_keys_fold_every_byte() {
        let mut t = BlockTable::new(16, 1, TableConfig::new());
        for i in 0..200u8 {
            let mut key = [0u8; 16];
            key[15] = i;
            t.insert(&key, &[i]);
        }
        assert_eq!(t.len(), 200);
        let mut key = [0u8; 16];
        key[15] = 123;
        assert_eq!(t.search(&key), Some(&[123u8][..]));
    }

    /// Invariant: every released block passes through exactly one hook call,
    /// and a removed element is handed to the caller instead.
    #[test]
    fn release_hooks_follow_ownership() {
        let (keys, key_hook) = counter();
        let (elts, elt_hook) = counter();
        let mut t = BlockTable::new(1, 1, TableConfig::new())
            .with_key_release(key_hook)
            .with_elt_release(elt_hook);

        t.insert(&[1], &[10]);
        t.insert(&[1], &[11]);
        assert_eq!((keys.load(Ordering::SeqCst), elts.load(Ordering::SeqCst)), (0, 1));

        let mut out = [0u8];
        assert!(t.remove(&[1], &mut out));
        assert_eq!(out, [11]);
        assert_eq!((keys.load(Ordering::SeqCst), elts.load(Ordering::SeqCst)), (1, 1));
        assert!(!t.remove(&[1], &mut out));

        t.insert(&[2], &[20]);
        assert!(t.delete(&[2]));
        assert!(!t.delete(&[2]));
        assert_eq!((keys.load(Ordering::SeqCst), elts.load(Ordering::SeqCst)), (2, 2));

        for i in 0..5 {
            t.insert(&[i], &[i]);
        }
        drop(t);
        assert_eq!((keys.load(Ordering::SeqCst), elts.load(Ordering::SeqCst)), (7, 7));
    }

    #[test]
    fn custom_key_hooks() {
        // Only the first two bytes of a key are significant.
        let mut t = BlockTable::new(4, 1, TableConfig::new())
            .with_key_eq(|a, b| a[..2] == b[..2])
            .with_key_reduce(|k| fold_bytes(&k[..2]));
        t.insert(&[1, 2, 3, 4], &[1]);
        t.insert(&[1, 2, 9, 9], &[2]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.search(&[1, 2, 0, 0]), Some(&[2u8][..]));
        assert_eq!(t.iter().next().map(|(k, _)| k.to_vec()), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    #[should_panic(expected = "wrong length")]
    fn short_key_is_rejected() {
        let mut t = BlockTable::new(4, 1, TableConfig::new());
        t.insert(&[1, 2], &[0]);
    }

    #[test]
    #[should_panic(expected = "empty table")]
    fn key_hooks_after_insert_are_rejected() {
        let mut t = BlockTable::new(1, 1, TableConfig::new());
        t.insert(&[1], &[1]);
        let _ = t.with_key_eq(|a, b| a == b);
    }

    /// Invariant: tombstones left by deletes do not block key hooks; only
    /// live entries do.
    #[test]
    fn key_hooks_after_delete_are_accepted() {
        let mut t = BlockTable::new(1, 1, TableConfig::new());
        t.insert(&[1], &[1]);
        assert!(t.delete(&[1]));
        assert!(t.is_empty());
        assert_eq!(t.stats().tombstones, 1);

        let mut t = t.with_key_eq(|a, b| a == b).with_key_reduce(|_| 0);
        t.insert(&[2], &[20]);
        t.insert(&[3], &[30]);
        assert_eq!(t.search(&[2]), Some(&[20u8][..]));
        assert_eq!(t.search(&[3]), Some(&[30u8][..]));
        assert_eq!(t.search(&[1]), None);
    }
}
