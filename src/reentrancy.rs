//! Debug-only reentrancy guard for the concurrent table.
//!
//! `SyncTable` runs `KeyOps` callbacks while holding a gate pass and a key
//! lock. A callback that calls back into the same table on the same thread
//! would block on its own locks forever. In debug builds such nested entry
//! panics instead; in release builds the guard compiles to nothing.

use core::marker::PhantomData;

#[cfg(debug_assertions)]
use core::cell::RefCell;

#[cfg(debug_assertions)]
thread_local! {
    // Addresses of the tables the current thread is inside.
    static ACTIVE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as inside `owner` until dropped.
///
/// In debug builds, panics if the thread is already inside `owner`.
#[inline]
pub(crate) fn enter<T>(owner: &T) -> ReentrancyGuard {
    #[cfg(debug_assertions)]
    {
        let addr = owner as *const T as usize;
        ACTIVE.with(|a| {
            let mut a = a.borrow_mut();
            assert!(
                !a.contains(&addr),
                "reentrancy detected: nested entry into a concurrent table from one of its callbacks"
            );
            a.push(addr);
        });
        ReentrancyGuard {
            addr,
            _nosend: PhantomData,
        }
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = owner;
        ReentrancyGuard {
            _nosend: PhantomData,
        }
    }
}

/// RAII guard returned by [`enter`]. Bound to the thread that created it.
pub(crate) struct ReentrancyGuard {
    #[cfg(debug_assertions)]
    addr: usize,
    _nosend: PhantomData<*mut ()>,
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        ACTIVE.with(|a| {
            let mut a = a.borrow_mut();
            if let Some(pos) = a.iter().rposition(|&x| x == self.addr) {
                a.swap_remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::enter;

    #[test]
    fn enter_and_exit_is_ok() {
        let owner = 0u64;
        {
            let _g = enter(&owner);
        }
        let _g = enter(&owner);
    }

    #[test]
    fn distinct_owners_nest() {
        let a = 0u64;
        let b = 0u64;
        let _ga = enter(&a);
        let _gb = enter(&b);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_in_debug() {
        let owner = 0u64;
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = enter(&owner);
            let _g2 = enter(&owner);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        // The unwound guard was released.
        let _g = enter(&owner);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn other_threads_are_not_affected() {
        let owner = 0u64;
        let _g = enter(&owner);
        std::thread::scope(|s| {
            s.spawn(|| {
                let _g = enter(&owner);
            });
        });
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn reentrancy_noop_in_release() {
        let owner = 0u64;
        let _g1 = enter(&owner);
        let _g2 = enter(&owner);
    }
}
