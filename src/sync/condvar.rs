// ── Condition variable ────────────────────────────────────────────────────────
//
// A thin owner over the backend `RawCond`: POSIX uses `pthread_cond_t`
// against the pthread mutex inside `sync::Mutex`; Win32 uses a counted
// manual-reset event (see `platform/win32/sync.rs`).
//
// Only threads blocked at the time of a `signal`/`broadcast` are eligible to
// wake, and a call with no waiters does nothing.

use crate::platform::sys::sync::RawCond;
use crate::sync::mutex::MutexGuard;

pub struct Condvar {
    raw: RawCond,
}

impl Condvar {
    pub fn new() -> Self {
        Self { raw: RawCond::new() }
    }

    /// Release the OS object.  No thread may be waiting.
    pub fn destroy(self) {
        drop(self);
    }

    /// Wake at least one waiter, if any is blocked.
    pub fn signal(&self) {
        self.raw.signal();
    }

    /// Wake every thread blocked at the time of the call.
    pub fn broadcast(&self) {
        self.raw.broadcast();
    }

    /// Atomically release `guard`'s mutex, block until signalled, and
    /// re-acquire it.  Always use the same mutex with a given condvar, and
    /// re-check the predicate on return.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        // The guard stays alive across the wait: the lock it names is held
        // again when `RawCond::wait` returns.
        self.raw.wait(guard.mutex.raw());
        guard
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
