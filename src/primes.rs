//! Deterministic Miller-Rabin over `u64`, used to pick hash multipliers.

// Witness set that is exact for every n < 2^64.
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

#[inline]
fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Returns true iff `n` is prime.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Largest prime `<= n`.
///
/// Panics if `n < 2`; there is no such prime.
pub fn prime_at_or_below(n: u64) -> u64 {
    assert!(n >= 2, "no prime at or below {n}");
    if n == 2 {
        return 2;
    }
    let mut c = if n % 2 == 0 { n - 1 } else { n };
    while !is_prime(c) {
        c -= 2;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_numbers() {
        let primes: Vec<u64> = (0..40).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37]);
    }

    /// Carmichael numbers fool Fermat tests but not Miller-Rabin.
    #[test]
    fn carmichael_numbers_are_composite() {
        for n in [561u64, 1105, 1729, 2465, 2821, 6601, 8911] {
            assert!(!is_prime(n), "{n} reported prime");
        }
    }

    #[test]
    fn largest_u64_prime() {
        assert_eq!(prime_at_or_below(u64::MAX), u64::MAX - 58);
        assert!(is_prime(u64::MAX - 58));
        assert!(!is_prime(u64::MAX));
    }

    #[test]
    fn at_or_below_is_inclusive() {
        assert_eq!(prime_at_or_below(2), 2);
        assert_eq!(prime_at_or_below(3), 3);
        assert_eq!(prime_at_or_below(10), 7);
        assert_eq!(prime_at_or_below(1_000_000_007), 1_000_000_007);
    }
}
