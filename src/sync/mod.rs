// ── Synchronization primitives ────────────────────────────────────────────────
//
// Mutex, condition variable and thread, each a thin safe layer over the
// backend in `platform::sys`.  A condition variable must be paired with the
// same mutex across all of its waits.

mod condvar;
mod mutex;
mod thread;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
pub use thread::Thread;
