// ── Lazy global initializer ───────────────────────────────────────────────────
//
// `InitGuard` runs a closure exactly once across every caller in the process,
// without a static constructor and without any blocking primitive (it has to
// work before the first `Mutex` exists, since mutex promotion itself goes
// through here).  `InitCell<T>` pairs a guard with storage and is what every
// process-wide singleton in the crate is built on.
//
// State machine: UNINIT → INITIALIZING → READY, exactly once.  The winner of
// the UNINIT→INITIALIZING exchange runs the initializer and publishes READY
// with release ordering; every other caller polls with acquire ordering and
// yields between polls.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::fatal;

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

// ── InitGuard ─────────────────────────────────────────────────────────────────

/// Tri-state flag enforcing exactly-once lazy initialization.
///
/// Zero-initialized (`InitGuard::new()`) is the UNINIT state, so a guard can
/// live in a `static` with no constructor call.
#[derive(Debug)]
pub struct InitGuard {
    state: AtomicU8,
}

impl InitGuard {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
        }
    }

    /// A guard whose resource was initialized eagerly by its owner.
    pub(crate) const fn new_ready() -> Self {
        Self {
            state: AtomicU8::new(READY),
        }
    }

    /// `true` once the guarded initializer has completed.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Run `init` unless some caller already has; return only once the
    /// guarded resource is fully initialized.
    ///
    /// If `init` panics the process is aborted: losers would otherwise spin
    /// on INITIALIZING forever.
    #[doc(alias = "ensure_initialized")]
    pub fn ensure<F: FnOnce()>(&self, init: F) {
        // Uncontended fast path: one acquire load.
        if self.is_ready() {
            return;
        }

        match self
            .state
            .compare_exchange(UNINIT, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                let armed = AbortOnUnwind;
                init();
                std::mem::forget(armed);

                if self.state.swap(READY, Ordering::Release) != INITIALIZING {
                    fatal("init guard left INITIALIZING by someone other than its winner");
                }
            }
            Err(_) => self.wait_ready(),
        }
    }

    fn wait_ready(&self) {
        loop {
            match self.state.load(Ordering::Acquire) {
                READY => return,
                INITIALIZING => std::thread::yield_now(),
                _ => fatal("init guard observed in an impossible state"),
            }
        }
    }
}

impl Default for InitGuard {
    fn default() -> Self {
        Self::new()
    }
}

struct AbortOnUnwind;

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        fatal("guarded initializer panicked");
    }
}

// ── InitCell ──────────────────────────────────────────────────────────────────

/// A value produced at most once, on first use, by whichever caller gets
/// there first.
pub struct InitCell<T> {
    guard: InitGuard,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the value is written exactly once, by the guard's winner, before
// READY is published with release ordering; every shared access happens
// after an acquire observation of READY.  Shared `&T` across threads needs
// `T: Sync`, and the winner may construct it on any thread, hence `T: Send`.
unsafe impl<T: Send + Sync> Sync for InitCell<T> {}
// SAFETY: moving the cell moves the (possibly initialized) `T` with it.
unsafe impl<T: Send> Send for InitCell<T> {}

impl<T> InitCell<T> {
    pub const fn new() -> Self {
        Self {
            guard: InitGuard::new(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// A cell that is already initialized with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            guard: InitGuard::new_ready(),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }
    }

    pub fn get_or_init<F: FnOnce() -> T>(&self, init: F) -> &T {
        self.guard.ensure(|| {
            let value = init();
            // SAFETY: only the guard's single winner reaches this closure,
            // and no reader touches the slot until READY is published.
            unsafe { (*self.value.get()).write(value) };
        });
        // SAFETY: `ensure` returned, so READY was observed with acquire
        // ordering and the slot holds an initialized value.
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    pub fn get(&self) -> Option<&T> {
        if self.guard.is_ready() {
            // SAFETY: READY observed with acquire ordering (see above).
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<T> Default for InitCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for InitCell<T> {
    fn drop(&mut self) {
        if *self.guard.state.get_mut() == READY {
            // SAFETY: initialized, and `&mut self` means no outstanding borrows.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn concurrent_callers_run_initializer_exactly_once() {
        const CALLERS: usize = 32;

        let guard = InitGuard::new();
        let runs = AtomicUsize::new(0);
        let published = AtomicUsize::new(0);
        let start = Barrier::new(CALLERS);

        std::thread::scope(|s| {
            for _ in 0..CALLERS {
                s.spawn(|| {
                    start.wait();
                    guard.ensure(|| {
                        // Widen the race window so losers really do spin.
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        runs.fetch_add(1, Ordering::Relaxed);
                        published.store(0xC0FFEE, Ordering::Relaxed);
                    });
                    // Every caller must observe the initializer's writes.
                    assert_eq!(published.load(Ordering::Relaxed), 0xC0FFEE);
                });
            }
        });

        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert!(guard.is_ready());
    }

    #[test]
    fn ready_guard_skips_initializer() {
        let guard = InitGuard::new_ready();
        guard.ensure(|| panic!("must not run"));
        assert!(guard.is_ready());
    }

    #[test]
    fn cell_initializes_once_and_shares_value() {
        let cell: InitCell<Vec<u32>> = InitCell::new();
        assert!(cell.get().is_none());

        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let v = cell.get_or_init(|| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        vec![1, 2, 3]
                    });
                    assert_eq!(v, &[1, 2, 3]);
                });
            }
        });

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cell.get(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn cell_drops_its_value() {
        use std::sync::Arc;

        let marker = Arc::new(());
        {
            let cell = InitCell::ready(Arc::clone(&marker));
            assert_eq!(Arc::strong_count(&marker), 2);
            drop(cell);
        }
        assert_eq!(Arc::strong_count(&marker), 1);

        // An uninitialized cell must not touch its slot on drop.
        let empty: InitCell<Arc<()>> = InitCell::new();
        drop(empty);
    }
}
