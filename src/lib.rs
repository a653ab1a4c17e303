//! muloa: open-addressing hash tables with multiplicative double hashing,
//! tombstone-based removal and a gate-synchronized concurrent variant.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one probing scheme and one growth policy, shared by a
//!   single-threaded table, a concurrent table and a byte-block table.
//! - Layers:
//!   - hash: reduces a key to a word (`KeyOps`), multiplies it by two
//!     per-table primes into a `RawHash`, and turns that into a probe
//!     sequence (start from the top bits of the first value, odd step from
//!     the top bits of the second).
//!   - growth: pure decision function: fits, clean, grow, degraded or full.
//!   - MulTable<K, V, O>: single-threaded table over `Slot` (empty,
//!     tombstone or occupied) with lazy cleanup and doubling.
//!   - SyncTable<K, V, O>: the same slot layout behind a gate, key locks
//!     and per-slot mutexes; rebuilds happen with the gate closed.
//!   - BlockTable: fixed-size byte blocks on top of MulTable, with
//!     caller-supplied key hooks and release hooks.
//!   - TableOps: the small map interface graph algorithms are written
//!     against, implemented for MulTable and `hashbrown::HashMap`.
//!
//! Probing invariants
//! - The slot count is a power of two and the step is odd, so a probe
//!   sequence visits every slot once before repeating.
//! - Every table keeps at least one slot that is not occupied, so a probe
//!   for an absent key always terminates.
//! - Lookups stop at the first empty slot or after `max_probe` slots,
//!   whichever comes first. `max_probe` only shrinks on rebuild.
//! - Entries cache their `RawHash`; rebuilds never call `KeyOps`.
//!
//! Load and tombstones
//! - `entries + tombstones <= max_sum`, where `max_sum` is the load-factor
//!   bound applied to the slot count. Checked before placing a new entry.
//! - When the bound would be exceeded: if tombstones outnumber entries the
//!   table is rebuilt at the same size (cleanup), otherwise it doubles until
//!   the entries fit. At the capacity ceiling the bound is relaxed
//!   (degraded) until a single free slot remains; then inserts of new keys
//!   fail with `TableError::Full`.
//! - Removal only tombstones a slot. Insertion of an absent key reuses the
//!   first tombstone on its probe path.
//!
//! Concurrency
//! - SyncTable admits operations through a gate. A thread whose new entry
//!   does not fit leaves the gate and asks for a rebuild; the first such
//!   thread closes the gate, waits for all others to leave, rebuilds
//!   (optionally over several scoped threads) and reopens it.
//! - Each key operation holds one key lock, chosen by the key's initial
//!   probe index, for its whole probe-and-place. Capacity for a new entry
//!   is reserved on an atomic counter before any slot is claimed.
//! - `KeyOps` callbacks run under locks. Debug builds detect a callback
//!   re-entering the same table and panic instead of deadlocking.
//!
//! Errors
//! - Allocation failure during a rebuild leaves the table unchanged and is
//!   reported as `TableError::ResourceExhausted` by `try_insert`; `insert`
//!   panics with the same message. Absent keys are `None`/`false`, never
//!   errors. Bad configuration and wrong block lengths are assertions.

mod block;
mod config;
mod error;
mod gate;
mod growth;
mod hash;
mod mul_table;
mod mul_table_proptest;
mod ops;
pub mod primes;
mod reentrancy;
mod slot;
mod sync_table;

// Public surface
pub use block::{BlockKeys, BlockTable};
pub use config::{LoadFactor, TableConfig, MIN_LOG_SLOTS};
pub use error::TableError;
pub use hash::{fold_bytes, FoldHasher, FoldKeys, HashParams, HashedKeys, KeyOps};
pub use mul_table::{Drain, Iter, IterMut, MulTable, TableStats};
pub use ops::TableOps;
pub use sync_table::SyncTable;
