// ── Critical sections and the condition variable ──────────────────────────────
//
// `RawLock` is a heap-pinned `CRITICAL_SECTION`; the structure must not move
// once initialized.
//
// `RawCond` is built for kernels with no native condition variable, from one
// manual-reset event and three counters kept under their own lock:
//
//   waiters     threads between counting in and leaving `wait`
//   releases    wakeups granted and not yet consumed
//   generation  bumped by every signal/broadcast that grants wakeups
//
// A waiter may only consume a release granted after it counted in, which is
// what the generation check enforces: a thread arriving later cannot steal a
// wakeup meant for an earlier one.  The event is set exactly while
// `releases > 0`, and both are changed together under the counter lock.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, FALSE, HANDLE, TRUE};
use windows::Win32::System::Threading::{
    CreateEventW, DeleteCriticalSection, EnterCriticalSection, InitializeCriticalSection,
    LeaveCriticalSection, ResetEvent, SetEvent, WaitForSingleObject, CRITICAL_SECTION, INFINITE,
    WAIT_OBJECT_0,
};

use crate::error::fatal;
use crate::sync::Mutex;

// ── RawLock ───────────────────────────────────────────────────────────────────

pub(crate) struct RawLock {
    inner: Box<UnsafeCell<CRITICAL_SECTION>>,
}

// SAFETY: a critical section is designed to be shared between threads; all
// access goes through the Win32 API.
unsafe impl Send for RawLock {}
// SAFETY: see above.
unsafe impl Sync for RawLock {}

impl RawLock {
    pub(crate) fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(CRITICAL_SECTION::default()));
        // SAFETY: fresh, pinned storage; initialized exactly once.
        unsafe { InitializeCriticalSection(inner.get()) };
        Self { inner }
    }

    pub(crate) fn lock(&self) {
        // SAFETY: initialized in `new` and pinned in the Box.
        unsafe { EnterCriticalSection(self.inner.get()) };
    }

    pub(crate) fn unlock(&self) {
        // SAFETY: the caller holds the lock (guard discipline in `sync`).
        unsafe { LeaveCriticalSection(self.inner.get()) };
    }
}

impl Drop for RawLock {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is inside lock/unlock.
        unsafe { DeleteCriticalSection(self.inner.get()) };
    }
}

// ── RawCond ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    waiters: usize,
    releases: usize,
    generation: u64,
}

pub(crate) struct RawCond {
    counters: Mutex<Counters>,
    event: HANDLE,
}

// SAFETY: the event handle is a process-wide kernel object usable from any
// thread; the counters are behind their own lock.
unsafe impl Send for RawCond {}
// SAFETY: see above.
unsafe impl Sync for RawCond {}

impl RawCond {
    pub(crate) fn new() -> Self {
        // SAFETY: unnamed manual-reset event, default security, initially
        // non-signalled.
        let event = unsafe { CreateEventW(None, TRUE, FALSE, PCWSTR::null()) }
            .unwrap_or_else(|_| fatal("CreateEventW"));
        Self {
            counters: Mutex::init(Counters::default()),
            event,
        }
    }

    fn set_event(&self) {
        // SAFETY: handle owned by `self`.
        if unsafe { SetEvent(self.event) }.is_err() {
            fatal("SetEvent");
        }
    }

    fn reset_event(&self) {
        // SAFETY: handle owned by `self`.
        if unsafe { ResetEvent(self.event) }.is_err() {
            fatal("ResetEvent");
        }
    }

    /// Grant wakeups to waiters that have none yet, at most `limit`.
    fn release(&self, limit: usize) {
        let mut c = self.counters.lock();
        let unreleased = c.waiters - c.releases;
        if unreleased == 0 {
            return;
        }
        c.releases += unreleased.min(limit);
        c.generation = c.generation.wrapping_add(1);
        self.set_event();
    }

    pub(crate) fn signal(&self) {
        self.release(1);
    }

    pub(crate) fn broadcast(&self) {
        self.release(usize::MAX);
    }

    /// Release `lock`, block until woken, re-acquire `lock`.
    pub(crate) fn wait(&self, lock: &RawLock) {
        let entered = {
            let mut c = self.counters.lock();
            c.waiters += 1;
            c.generation
        };
        lock.unlock();

        loop {
            // SAFETY: handle owned by `self` and alive for the wait.
            if unsafe { WaitForSingleObject(self.event, INFINITE) } != WAIT_OBJECT_0 {
                fatal("WaitForSingleObject(condvar)");
            }
            let mut c = self.counters.lock();
            if c.releases > 0 && c.generation != entered {
                c.waiters -= 1;
                c.releases -= 1;
                if c.releases == 0 {
                    self.reset_event();
                }
                break;
            }
            drop(c);
            // The event is held open for older waiters; let them run.
            std::thread::yield_now();
        }

        lock.lock();
    }
}

impl Drop for RawCond {
    fn drop(&mut self) {
        // SAFETY: owned handle, closed exactly once.
        if unsafe { CloseHandle(self.event) }.is_err() {
            fatal("CloseHandle(event)");
        }
    }
}
