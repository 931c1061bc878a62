// ── Thread ────────────────────────────────────────────────────────────────────
//
// An OS thread running one closure.  The closure is boxed and its ownership
// moves into the new thread, so nothing on the spawner's stack needs to
// outlive `spawn`.  Failing to create, join or detach a thread ends the
// process: those only happen on resource exhaustion or a handle bug.

use crate::platform::sys::thread::RawThread;

#[must_use = "dropping a Thread detaches it; call join() to wait for it"]
pub struct Thread {
    raw: Option<RawThread>,
}

impl Thread {
    pub fn spawn<F>(entry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            raw: Some(RawThread::spawn(Box::new(entry))),
        }
    }

    /// Block until the thread's closure returns, then release the handle.
    pub fn join(mut self) {
        if let Some(raw) = self.raw.take() {
            raw.join();
        }
    }

    /// Release the handle without waiting; the OS reclaims the thread when
    /// it exits.
    pub fn detach(mut self) {
        if let Some(raw) = self.raw.take() {
            raw.detach();
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.detach();
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Condvar, Mutex};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn join_observes_value_written_by_entry() {
        let slot = Arc::new(Mutex::init(0u32));
        let arg = Arc::clone(&slot);

        let t = Thread::spawn(move || {
            *arg.lock() = 0xDEAD_BEEF;
        });
        t.join();

        assert_eq!(*slot.lock(), 0xDEAD_BEEF);
    }

    #[test]
    fn entry_owns_its_argument() {
        // The argument is built in a frame that is gone before the thread
        // necessarily runs.
        fn start() -> (Thread, Arc<Mutex<Vec<u8>>>) {
            let out = Arc::new(Mutex::init(Vec::new()));
            let local = vec![1u8, 2, 3];
            let sink = Arc::clone(&out);
            let t = Thread::spawn(move || sink.lock().extend(local));
            (t, out)
        }

        let (t, out) = start();
        t.join();
        assert_eq!(*out.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn detached_thread_keeps_running() {
        struct Done {
            flag: Mutex<bool>,
            cond: Condvar,
        }
        let done = Arc::new(Done {
            flag: Mutex::init(false),
            cond: Condvar::new(),
        });
        let ran = Arc::new(AtomicBool::new(false));

        let (d, r) = (Arc::clone(&done), Arc::clone(&ran));
        Thread::spawn(move || {
            r.store(true, Ordering::SeqCst);
            *d.flag.lock() = true;
            d.cond.broadcast();
        })
        .detach();

        let mut g = done.flag.lock();
        while !*g {
            g = done.cond.wait(g);
        }
        drop(g);
        assert!(ran.load(Ordering::SeqCst));
    }
}
