// ── pthread mutex and condition variable ──────────────────────────────────────
//
// Both are heap-pinned: POSIX forbids moving either after first use, and
// `sync::Mutex` / `sync::Condvar` values move freely.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;

use crate::error::fatal;

// ── RawLock ───────────────────────────────────────────────────────────────────

pub(crate) struct RawLock {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: a pthread mutex is designed to be shared between threads; all
// access goes through the pthread API.
unsafe impl Send for RawLock {}
// SAFETY: see above.
unsafe impl Sync for RawLock {}

impl RawLock {
    pub(crate) fn new() -> Self {
        Self {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)),
        }
    }

    pub(crate) fn lock(&self) {
        // SAFETY: the mutex is initialized and pinned in its Box.
        if unsafe { libc::pthread_mutex_lock(self.inner.get()) } != 0 {
            fatal("pthread_mutex_lock");
        }
    }

    pub(crate) fn unlock(&self) {
        // SAFETY: the caller holds the lock (guard discipline in `sync`).
        if unsafe { libc::pthread_mutex_unlock(self.inner.get()) } != 0 {
            fatal("pthread_mutex_unlock");
        }
    }
}

impl Drop for RawLock {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is inside lock/unlock.
        if unsafe { libc::pthread_mutex_destroy(self.inner.get()) } != 0 {
            fatal("pthread_mutex_destroy");
        }
    }
}

// ── RawCond ───────────────────────────────────────────────────────────────────

pub(crate) struct RawCond {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: as for `RawLock`.
unsafe impl Send for RawCond {}
// SAFETY: see above.
unsafe impl Sync for RawCond {}

impl RawCond {
    pub(crate) fn new() -> Self {
        Self {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)),
        }
    }

    pub(crate) fn signal(&self) {
        // SAFETY: initialized and pinned in the Box.
        if unsafe { libc::pthread_cond_signal(self.inner.get()) } != 0 {
            fatal("pthread_cond_signal");
        }
    }

    pub(crate) fn broadcast(&self) {
        // SAFETY: initialized and pinned in the Box.
        if unsafe { libc::pthread_cond_broadcast(self.inner.get()) } != 0 {
            fatal("pthread_cond_broadcast");
        }
    }

    /// Release `lock`, block until woken, re-acquire `lock`.
    pub(crate) fn wait(&self, lock: &RawLock) {
        // SAFETY: the caller holds `lock`; both objects are initialized and
        // pinned.
        if unsafe { libc::pthread_cond_wait(self.inner.get(), lock.inner.get()) } != 0 {
            fatal("pthread_cond_wait");
        }
    }
}

impl Drop for RawCond {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means nobody is waiting or signalling.
        if unsafe { libc::pthread_cond_destroy(self.inner.get()) } != 0 {
            fatal("pthread_cond_destroy");
        }
    }
}
