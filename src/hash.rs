//! Key reduction, multiplicative double hashing and probe sequences.
//!
//! A key is first reduced to a machine word (its *standard key*). Two odd
//! 64-bit primes, fixed per table, multiply that word (wrapping) into the
//! pair of raw hash values stored with every entry. The top `log2(slots)`
//! bits of the first value pick the initial slot; the top bits of the second,
//! forced odd, give the probe step. An odd step modulo a power of two visits
//! every slot before repeating, so probing a non-full table terminates.

use crate::primes::prime_at_or_below;
use core::hash::{BuildHasher, Hash, Hasher};
use std::collections::hash_map::RandomState;

/// Key policy: reduction to a standard key plus key equality.
///
/// `reduce` and `eq` must agree on which parts of a key are significant:
/// keys that compare equal must reduce to the same word. Distinct keys may
/// share a word; that only costs extra probes.
pub trait KeyOps<K: ?Sized> {
    /// Reduces `key` to the word that is multiplied into the raw hashes.
    fn reduce(&self, key: &K) -> u64;

    /// Key equality used at every probed slot.
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Default policy: folds the key's `Hash` byte stream into one word and
/// compares with `Eq`.
#[derive(Copy, Clone, Debug, Default)]
pub struct FoldKeys;

impl<K: ?Sized + Hash + Eq> KeyOps<K> for FoldKeys {
    #[inline]
    fn reduce(&self, key: &K) -> u64 {
        let mut h = FoldHasher::default();
        key.hash(&mut h);
        h.finish()
    }

    #[inline]
    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Reduces keys through a `BuildHasher`, e.g. a randomly seeded one.
#[derive(Clone, Debug, Default)]
pub struct HashedKeys<S = RandomState>(pub S);

impl<K: ?Sized + Hash + Eq, S: BuildHasher> KeyOps<K> for HashedKeys<S> {
    #[inline]
    fn reduce(&self, key: &K) -> u64 {
        self.0.hash_one(key)
    }

    #[inline]
    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Folds bytes into a word: byte `i` is added at bit offset `8 * (i % 8)`.
///
/// Up to eight bytes this is a zero-extended little-endian copy; longer
/// streams wrap around and every byte still contributes.
#[derive(Clone, Debug, Default)]
pub struct FoldHasher {
    acc: u64,
    pos: u64,
}

impl Hasher for FoldHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.acc = self.acc.wrapping_add((b as u64) << (8 * (self.pos % 8)));
            self.pos += 1;
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.acc
    }
}

/// Folds a raw byte block, the default reduction for byte-block keys.
pub fn fold_bytes(bytes: &[u8]) -> u64 {
    let mut h = FoldHasher::default();
    h.write(bytes);
    h.finish()
}

const FIRST_BASE: u64 = 0x9E37_79B9_7F4A_7C15;
const SECOND_BASE: u64 = 0xC2B2_AE3D_27D4_EB4F;
const SEED_MIX: u64 = 0xFF51_AFD7_ED55_8CCD;

/// The two multipliers of a table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HashParams {
    first_prime: u64,
    second_prime: u64,
}

impl HashParams {
    /// Derives both primes from `seed`. The same seed always yields the same
    /// primes.
    pub fn from_seed(seed: u64) -> Self {
        let mix = seed.wrapping_mul(SEED_MIX).rotate_left(31);
        // Top bit set keeps the multipliers large; the search below only
        // moves down by a prime gap, so it stays set.
        let first_prime = prime_at_or_below((FIRST_BASE ^ mix) | 1 << 63);
        let second_prime = prime_at_or_below((SECOND_BASE ^ mix.rotate_left(17)) | 1 << 63);
        Self {
            first_prime,
            second_prime,
        }
    }

    pub fn first_prime(&self) -> u64 {
        self.first_prime
    }

    pub fn second_prime(&self) -> u64 {
        self.second_prime
    }

    #[inline]
    pub(crate) fn raw(&self, standard_key: u64) -> RawHash {
        RawHash {
            first: self.first_prime.wrapping_mul(standard_key),
            second: self.second_prime.wrapping_mul(standard_key),
        }
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

/// Raw hash values cached with an entry so rehashing never touches key
/// bytes again.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct RawHash {
    pub(crate) first: u64,
    pub(crate) second: u64,
}

#[inline]
fn top_bits(h: u64, log_slots: u32) -> usize {
    if log_slots == 0 {
        0
    } else {
        (h >> (u64::BITS - log_slots)) as usize
    }
}

impl RawHash {
    #[inline]
    pub(crate) fn probe(self, log_slots: u32) -> Probe {
        let mask = (1usize << log_slots) - 1;
        Probe {
            index: top_bits(self.first, log_slots),
            step: top_bits(self.second, log_slots) | 1,
            mask,
        }
    }
}

/// Double-hashing probe sequence over `mask + 1` slots.
///
/// The iterator never ends on its own; callers bound it with `take`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Probe {
    index: usize,
    step: usize,
    mask: usize,
}

impl Probe {
    /// Index of the first probed slot.
    #[inline]
    pub(crate) fn start(&self) -> usize {
        self.index
    }
}

impl Iterator for Probe {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let i = self.index;
        self.index = (self.index + self.step) & self.mask;
        Some(i)
    }
}
