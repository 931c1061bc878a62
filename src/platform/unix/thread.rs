#![allow(unsafe_code)]

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::panic::AssertUnwindSafe;
use std::ptr;

use crate::error::fatal;

pub(crate) type Entry = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct RawThread {
    id: libc::pthread_t,
}

extern "C" fn trampoline(shim: *mut c_void) -> *mut c_void {
    // SAFETY: `shim` is the `Box<Entry>` leaked by `spawn`; ownership moves
    // to this thread exactly once and the allocation is freed right here,
    // before the entry runs.
    let entry = *unsafe { Box::from_raw(shim.cast::<Entry>()) };

    if std::panic::catch_unwind(AssertUnwindSafe(entry)).is_err() {
        fatal("thread entry panicked");
    }
    ptr::null_mut()
}

impl RawThread {
    pub(crate) fn spawn(entry: Entry) -> Self {
        // `Entry` is a fat pointer; box it again to hand over a thin one.
        let shim = Box::into_raw(Box::new(entry));
        let mut id = MaybeUninit::<libc::pthread_t>::uninit();

        // SAFETY: `trampoline` matches the start-routine ABI and takes
        // ownership of `shim`; default attributes.
        let rc = unsafe {
            libc::pthread_create(id.as_mut_ptr(), ptr::null(), trampoline, shim.cast())
        };
        if rc != 0 {
            // SAFETY: creation failed, so the shim was never handed over.
            drop(unsafe { Box::from_raw(shim) });
            fatal("pthread_create");
        }

        // SAFETY: pthread_create succeeded and wrote the id.
        Self {
            id: unsafe { id.assume_init() },
        }
    }

    pub(crate) fn join(self) {
        // SAFETY: `id` is a joinable thread not yet joined or detached;
        // `self` is consumed so this happens once.
        if unsafe { libc::pthread_join(self.id, ptr::null_mut()) } != 0 {
            fatal("pthread_join");
        }
    }

    pub(crate) fn detach(self) {
        // SAFETY: as for `join`.
        if unsafe { libc::pthread_detach(self.id) } != 0 {
            fatal("pthread_detach");
        }
    }
}
