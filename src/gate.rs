//! Gate: admission control that lets one thread rebuild a shared table.
//!
//! Threads pass the gate before touching table state and hold a [`Pass`]
//! while they work. A thread that needs a rebuild closes the gate, waits for
//! every pass to be returned, rebuilds with no other thread inside, then
//! reopens the gate. New arrivals block while it is closed.
//!
//! Invariants
//! - Closed gate and zero passes out: the resizing thread has exclusive
//!   access.
//! - Passes out: the gate cannot finish closing; the resizer waits on
//!   `grow_cond` until the last pass is returned.

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct GateState {
    open: bool,
    in_threads: usize,
}

#[derive(Debug)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    open_cond: Condvar,
    grow_cond: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                open: true,
                in_threads: 0,
            }),
            open_cond: Condvar::new(),
            grow_cond: Condvar::new(),
        }
    }

    /// Blocks while the gate is closed, then admits the caller.
    pub(crate) fn enter(&self) -> Pass<'_> {
        let mut s = self.state.lock();
        while !s.open {
            self.open_cond.wait(&mut s);
        }
        s.in_threads += 1;
        Pass {
            gate: self,
            active: true,
        }
    }

    fn leave(&self) {
        let mut s = self.state.lock();
        s.in_threads -= 1;
        if !s.open && s.in_threads == 0 {
            self.grow_cond.notify_all();
        }
    }

    fn leave_and_resize<R>(&self, resize: impl FnOnce() -> R) -> Option<R> {
        let mut s = self.state.lock();
        s.in_threads -= 1;
        if !s.open {
            // Another thread is already rebuilding.
            if s.in_threads == 0 {
                self.grow_cond.notify_all();
            }
            return None;
        }
        s.open = false;
        log::trace!("gate closed; waiting for {} threads", s.in_threads);
        while s.in_threads > 0 {
            self.grow_cond.wait(&mut s);
        }
        drop(s);

        let _reopen = Reopen(self);
        Some(resize())
    }

    #[cfg(test)]
    fn in_threads(&self) -> usize {
        self.state.lock().in_threads
    }
}

/// Reopens the gate on drop, including when the rebuild panics.
struct Reopen<'a>(&'a Gate);

impl Drop for Reopen<'_> {
    fn drop(&mut self) {
        let mut s = self.0.state.lock();
        s.open = true;
        log::trace!("gate reopened");
        self.0.open_cond.notify_all();
    }
}

/// Proof of admission. Returned to the gate on drop.
pub(crate) struct Pass<'a> {
    gate: &'a Gate,
    active: bool,
}

impl Pass<'_> {
    /// Returns the pass and runs `resize` with the gate closed and no other
    /// thread inside. Returns `None` without running it if another thread
    /// closed the gate first; that thread does the rebuild.
    pub(crate) fn resize_with<R>(mut self, resize: impl FnOnce() -> R) -> Option<R> {
        self.active = false;
        self.gate.leave_and_resize(resize)
    }
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        if self.active {
            self.gate.leave();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn passes_are_counted_and_returned() {
        let gate = Gate::new();
        let a = gate.enter();
        let b = gate.enter();
        assert_eq!(gate.in_threads(), 2);
        drop(a);
        assert_eq!(gate.in_threads(), 1);
        drop(b);
        assert_eq!(gate.in_threads(), 0);
    }

    #[test]
    fn single_thread_resize_runs_immediately() {
        let gate = Gate::new();
        let pass = gate.enter();
        assert_eq!(pass.resize_with(|| 7), Some(7));
        assert_eq!(gate.in_threads(), 0);
        // Gate is open again.
        drop(gate.enter());
    }

    /// Invariant: the resize closure runs only after every other pass has
    /// been returned, and no thread is admitted while it runs.
    #[test]
    fn resize_waits_for_passes_and_excludes_entrants() {
        let gate = Gate::new();
        let inside = AtomicUsize::new(0);
        let resizing = AtomicBool::new(false);
        let barrier = Barrier::new(4);

        std::thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    let pass = gate.enter();
                    inside.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    std::thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(pass);
                    // Re-entering must not overlap the resize.
                    let _again = gate.enter();
                    assert!(!resizing.load(Ordering::SeqCst));
                });
            }
            let pass = gate.enter();
            barrier.wait();
            let ran = pass.resize_with(|| {
                resizing.store(true, Ordering::SeqCst);
                assert_eq!(inside.load(Ordering::SeqCst), 0);
                std::thread::sleep(Duration::from_millis(10));
                resizing.store(false, Ordering::SeqCst);
            });
            assert!(ran.is_some());
        });
        assert_eq!(gate.in_threads(), 0);
    }

    /// Invariant: a second thread asking for a resize while one is pending
    /// defers to the first.
    #[test]
    fn concurrent_resize_requests_run_once() {
        let gate = Gate::new();
        let runs = AtomicUsize::new(0);
        let barrier = Barrier::new(2);
        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    let pass = gate.enter();
                    barrier.wait();
                    pass.resize_with(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                    });
                });
            }
        });
        // Both passes overlapped, so exactly one thread closed the gate.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_resize_reopens_gate() {
        let gate = Gate::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            gate.enter().resize_with(|| panic!("boom"));
        }));
        assert!(res.is_err());
        drop(gate.enter());
        assert_eq!(gate.in_threads(), 0);
    }
}
