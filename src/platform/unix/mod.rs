// ── POSIX platform implementation ─────────────────────────────────────────────
//
// One of the modules in the crate where `unsafe` code is permitted.  Every
// `unsafe` block MUST carry a `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// POSIX hosts have a single code path: byte paths go straight to libc.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{KeelError, Result};

pub(crate) mod fs;
pub(crate) mod process;
pub(crate) mod sync;
pub(crate) mod thread;
pub(crate) mod time;

/// The calling thread's current `errno`.
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

pub(crate) fn last_error_code() -> u32 {
    errno() as u32
}

/// NUL-terminated copy of `path` for libc.
pub(crate) fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| KeelError::InvalidPath)
}
