#![allow(unsafe_code)]

use std::ffi::c_void;
use std::panic::AssertUnwindSafe;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Threading::{
    CreateThread, WaitForSingleObject, INFINITE, THREAD_CREATION_FLAGS, WAIT_OBJECT_0,
};

use crate::error::fatal;

pub(crate) type Entry = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct RawThread {
    handle: HANDLE,
}

// SAFETY: a thread handle may be waited on or closed from any thread.
unsafe impl Send for RawThread {}

unsafe extern "system" fn trampoline(shim: *mut c_void) -> u32 {
    // SAFETY: `shim` is the `Box<Entry>` leaked by `spawn`; this thread takes
    // ownership exactly once and frees it before the entry runs.
    let entry = *unsafe { Box::from_raw(shim.cast::<Entry>()) };

    if std::panic::catch_unwind(AssertUnwindSafe(entry)).is_err() {
        fatal("thread entry panicked");
    }
    0
}

impl RawThread {
    pub(crate) fn spawn(entry: Entry) -> Self {
        let shim = Box::into_raw(Box::new(entry));

        // SAFETY: `trampoline` matches LPTHREAD_START_ROUTINE and takes
        // ownership of `shim`; default stack and security.
        let created = unsafe {
            CreateThread(
                None,
                0,
                Some(trampoline),
                Some(shim.cast::<c_void>().cast_const()),
                THREAD_CREATION_FLAGS(0),
                None,
            )
        };
        match created {
            Ok(handle) => Self { handle },
            Err(_) => {
                // SAFETY: creation failed, so the shim was never handed over.
                drop(unsafe { Box::from_raw(shim) });
                fatal("CreateThread")
            }
        }
    }

    pub(crate) fn join(self) {
        // SAFETY: `handle` is an open thread handle owned by `self`.
        unsafe {
            if WaitForSingleObject(self.handle, INFINITE) != WAIT_OBJECT_0 {
                fatal("WaitForSingleObject(thread)");
            }
            if CloseHandle(self.handle).is_err() {
                fatal("CloseHandle(thread)");
            }
        }
    }

    pub(crate) fn detach(self) {
        // SAFETY: owned handle, closed exactly once; the thread keeps running.
        if unsafe { CloseHandle(self.handle) }.is_err() {
            fatal("CloseHandle(thread)");
        }
    }
}
