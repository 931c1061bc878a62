// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except:
//   • `platform::win32` / `platform::unix` – host FFI
//   • `once`                               – initializer cell storage
//   • `sync`                               – interior mutability behind locks
// Each unsafe block in those modules MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

//! Keel: the portable primitives a long-running node daemon is built on.
//!
//! Exactly-once lazy initialization, a mutex / condition variable / thread
//! trio, a monotonic time source, durable whole-file I/O and a handful of
//! process facts, each behaving identically on Windows and POSIX hosts.
//!
//! Failures that callers can act on come back as [`KeelError`].  Failures
//! that mean an invariant is already broken (a primitive that cannot be
//! destroyed, a thread that cannot be created) end the process instead.

pub mod config;
pub mod error;
pub mod fs;
pub mod once;
pub mod process;
pub mod sync;
pub mod time;

mod platform;

pub use error::{KeelError, Result};
pub use once::{InitCell, InitGuard};
pub use sync::{Condvar, Mutex, MutexGuard, Thread};
