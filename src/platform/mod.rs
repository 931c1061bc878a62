// ── Platform abstraction layer ────────────────────────────────────────────────
//
// Every host call the crate makes lives below this module.  `sys` names the
// backend for the current target; the domain modules (`sync`, `time`, `fs`,
// `process`) only ever go through `sys`, and both backends export the same
// set of items:
//
//   sys::last_error_code
//   sys::sync::{RawLock, RawCond}        sys::thread::RawThread
//   sys::time::{monotonic_frequency, monotonic_counter, calendar_counter,
//               CALENDAR_FREQUENCY, sleep_ms}
//   sys::fs::{RawFile, path_bytes, path_from_bytes, path_size, exists,
//             rename, unlink, mkdir, rmdir, absolute_into, PATH_STYLE}
//   sys::process::{current_dir, daemon, install_termination, numcpu,
//                  fdlimit, datadir}

#[cfg(windows)]
pub(crate) mod win32;
#[cfg(windows)]
pub(crate) use win32 as sys;

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(unix)]
pub(crate) use unix as sys;

