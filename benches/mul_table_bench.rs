use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use muloa::{MulTable, SyncTable, TableConfig};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("mul_table_insert_10k", |b| {
        b.iter_batched(
            MulTable::<u64, u64>::new,
            |mut m| {
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    m.insert(x, i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    c.bench_function("mul_table_insert_10k_presized", |b| {
        b.iter_batched(
            || TableConfig::new().min_expected_entries(10_000).build::<u64, u64>(),
            |mut m| {
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    m.insert(x, i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_search(c: &mut Criterion) {
    let mut m: MulTable<u64, u64> = MulTable::new();
    let keys: Vec<u64> = lcg(7).take(20_000).collect();
    for (i, &k) in keys.iter().enumerate() {
        m.insert(k, i as u64);
    }
    c.bench_function("mul_table_search_hit", |b| {
        let mut it = keys.iter().cycle();
        b.iter(|| black_box(m.search(it.next().unwrap())))
    });
    c.bench_function("mul_table_search_miss", |b| {
        let mut miss = lcg(0xdead_beef);
        b.iter(|| black_box(m.search(&miss.next().unwrap())))
    });
}

// Steady state with half the slots' worth of churn: exercises tombstone
// reuse and periodic cleanup.
fn bench_churn(c: &mut Criterion) {
    c.bench_function("mul_table_remove_insert_churn", |b| {
        let mut m: MulTable<u64, u64> = TableConfig::new().min_expected_entries(4_096).build();
        let mut next = lcg(3);
        let mut live: Vec<u64> = next.by_ref().take(2_048).collect();
        for &k in &live {
            m.insert(k, k);
        }
        let mut i = 0;
        b.iter(|| {
            let slot = i % live.len();
            m.delete(&live[slot]);
            let k = next.next().unwrap();
            m.insert(k, k);
            live[slot] = k;
            i += 1;
        })
    });
}

fn bench_sync_insert(c: &mut Criterion) {
    c.bench_function("sync_table_insert_4x10k", |b| {
        b.iter_batched(
            SyncTable::<u64, u64>::new,
            |m| {
                std::thread::scope(|s| {
                    for t in 0..4u64 {
                        let m = &m;
                        s.spawn(move || m.insert_batch(lcg(t + 1).take(10_000).map(|k| (k, t))));
                    }
                });
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .measurement_time(Duration::from_secs(3))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_insert, bench_search, bench_churn, bench_sync_insert
}
criterion_main!(benches);
