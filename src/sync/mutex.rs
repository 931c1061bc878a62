// ── Mutex ─────────────────────────────────────────────────────────────────────
//
// A non-reentrant lock over the host's native primitive.  `Mutex::new` is a
// `const fn` producing the "zero-initialized" state: no OS object exists yet,
// and the first `lock()` promotes it through the lazy initializer.  The cost
// is one acquire load per lock on the uncontended path.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::once::InitCell;
use crate::platform::sys::sync::RawLock;

pub struct Mutex<T: ?Sized = ()> {
    raw: InitCell<RawLock>,
    data: UnsafeCell<T>,
}

// SAFETY: the data is only reachable through a guard, and at most one guard
// exists at a time; moving `T` between threads needs `T: Send`.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
// SAFETY: see above.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Static-storage form: the OS lock is created on first `lock()`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: InitCell::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Eager form: the OS lock exists before this returns.
    pub fn init(value: T) -> Self {
        Self {
            raw: InitCell::ready(RawLock::new()),
            data: UnsafeCell::new(value),
        }
    }

    /// Release the OS lock.  The caller guarantees no other thread is in
    /// `lock`/`unlock`; ownership makes that a compile-time fact.
    pub fn destroy(self) {
        drop(self);
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    pub(crate) fn raw(&self) -> &RawLock {
        self.raw.get_or_init(RawLock::new)
    }

    /// Block until the lock is held.  Re-locking from the owning thread
    /// deadlocks.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw().lock();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// `true` once the OS lock exists (after `init` or the first `lock`).
    pub(crate) fn is_promoted(&self) -> bool {
        self.raw.get().is_some()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> std::fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("promoted", &self.is_promoted())
            .finish_non_exhaustive()
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// Proof that the lock is held; unlocking happens on drop.
///
/// The guard stays on the thread that locked: both backends require the
/// owner to unlock.
///
/// ```compile_fail
/// let m = keel::sync::Mutex::init(0u32);
/// let guard = m.lock();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(guard));
/// });
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, T: ?Sized = ()> {
    pub(crate) mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing a guard only hands out `&T`.
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard's existence means this thread holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` makes this the only borrow.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw().unlock();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
