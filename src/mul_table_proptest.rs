#![cfg(test)]

// Property tests for MulTable kept inside the crate so they can check
// internal counters and probe bounds directly.

use crate::hash::KeyOps;
use crate::{FoldKeys, MulTable, TableConfig};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Every key reduces to the same word: all keys share one probe sequence.
#[derive(Clone, Copy, Default)]
struct Collide;
impl<Q: ?Sized + Eq> KeyOps<Q> for Collide {
    fn reduce(&self, _key: &Q) -> u64 {
        0
    }
    fn eq(&self, a: &Q, b: &Q) -> bool {
        a == b
    }
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Search(usize),
    Contains(String),
    Remove(usize),
    Delete(usize),
    Mutate(usize, i32),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => idx.clone().prop_map(OpI::Search),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Delete),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap.
// Checked after every op:
// - `len`/`is_empty` parity with the model.
// - `entries + tombstones` within the load-factor bound and below the slot
//   count.
// - Every live key is found within `max_probe` probes.
fn run_state_machine<O>(
    mut sut: MulTable<Key, i32, O>,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    O: KeyOps<Key> + KeyOps<str>,
{
    let mut model: HashMap<Key, i32> = HashMap::new();
    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.insert(k.clone(), v), model.insert(k, v));
            }
            OpI::Search(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.search(&k), model.get(&k));
            }
            OpI::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            OpI::Remove(i) => {
                let k = key_from(&pool, i);
                let got = sut.remove_entry(&k);
                let want = model.remove_entry(&k);
                prop_assert_eq!(got, want);
            }
            OpI::Delete(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.delete(&k), model.remove(&k).is_some());
            }
            OpI::Mutate(i, d) => {
                let k = key_from(&pool, i);
                if let Some(v) = sut.search_mut(&k) {
                    *v = v.saturating_add(d);
                }
                if let Some(v) = model.get_mut(&k) {
                    *v = v.saturating_add(d);
                }
            }
            OpI::Iterate => {
                let s: BTreeSet<_> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let m: BTreeSet<_> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(s, m);
            }
            OpI::Clear => {
                sut.clear();
                model.clear();
                prop_assert_eq!(sut.stats().tombstones, 0);
            }
        }

        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        let stats = sut.stats();
        let log = stats.slots.trailing_zeros();
        prop_assert!(stats.entries + stats.tombstones <= sut.load_factor().max_sum(log));
        prop_assert!(stats.entries + stats.tombstones < stats.slots);
        for k in model.keys() {
            let probes = sut.probe_count(k);
            prop_assert!(probes.is_some(), "live key {:?} not found", k);
            prop_assert!(probes.unwrap_or(0) <= stats.max_probe);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let sut: MulTable<Key, i32, FoldKeys> = MulTable::new();
        run_state_machine(sut, pool, ops)?;
    }
}

// Same state machine under worst-case collisions with a high load factor:
// every key shares one probe sequence, so tombstone reuse and cleanup are
// exercised on long chains.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let config = TableConfig::new().load_factor(7, 3);
        let sut: MulTable<Key, i32, Collide> = MulTable::with_config_and_ops(config, Collide);
        run_state_machine(sut, pool, ops)?;
    }
}
