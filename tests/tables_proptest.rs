use muloa::{BlockTable, SyncTable, TableConfig};
use proptest::prelude::*;
use std::collections::HashMap;

// Model operations on SyncTable from one thread and assert parity with
// HashMap after each step. A small ceiling forces degraded mode and Full.
proptest! {
    #[test]
    fn prop_sync_table_matches_model(cap in 3u32..=6, ops in proptest::collection::vec((0u8..=3u8, 0u16..80u16, any::<u32>()), 1..200)) {
        let t: SyncTable<u16, u32> = SyncTable::with_config(TableConfig::new().max_slots_log2(cap).key_locks_log2(2));
        let slots = 1usize << cap;
        let mut model: HashMap<u16, u32> = HashMap::new();

        for (op, k, v) in ops {
            match op {
                // Insert fails only when every other slot is live
                0 => match t.try_insert(k, v) {
                    Ok(prev) => prop_assert_eq!(prev, model.insert(k, v)),
                    Err(e) => {
                        prop_assert!(!model.contains_key(&k), "update failed: {}", e);
                        prop_assert_eq!(model.len(), slots - 1);
                    }
                },
                1 => prop_assert_eq!(t.get(&k), model.get(&k).copied()),
                2 => prop_assert_eq!(t.remove(&k), model.remove(&k)),
                3 => prop_assert_eq!(t.delete(&k), model.remove(&k).is_some()),
                _ => unreachable!(),
            }
            prop_assert_eq!(t.len(), model.len());
        }

        let table = t.into_table();
        let mut pairs: Vec<(u16, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        let mut want: Vec<(u16, u32)> = model.into_iter().collect();
        pairs.sort_unstable();
        want.sort_unstable();
        prop_assert_eq!(pairs, want);
    }
}

// BlockTable with 3-byte keys: blocks in, same blocks out.
proptest! {
    #[test]
    fn prop_block_table_matches_model(ops in proptest::collection::vec((0u8..=2u8, proptest::array::uniform3(0u8..4), any::<[u8; 2]>()), 1..150)) {
        let mut t = BlockTable::new(3, 2, TableConfig::new());
        let mut model: HashMap<[u8; 3], [u8; 2]> = HashMap::new();

        for (op, k, e) in ops {
            match op {
                0 => {
                    t.insert(&k, &e);
                    model.insert(k, e);
                }
                1 => {
                    let mut out = [0u8; 2];
                    let removed = t.remove(&k, &mut out);
                    let want = model.remove(&k);
                    prop_assert_eq!(removed, want.is_some());
                    if let Some(w) = want {
                        prop_assert_eq!(out, w);
                    }
                }
                2 => prop_assert_eq!(t.search(&k), model.get(&k).map(|e| &e[..])),
                _ => unreachable!(),
            }
            prop_assert_eq!(t.len(), model.len());
        }
    }
}
