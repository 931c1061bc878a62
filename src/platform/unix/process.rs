#![allow(unsafe_code)]

use std::ffi::{c_void, CStr, OsString};
use std::mem::{self, ManuallyDrop};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use super::errno;
use crate::error::{KeelError, Result};
use crate::sync::Thread;

// ── Working directory ─────────────────────────────────────────────────────────

pub(crate) fn current_dir() -> Result<Vec<u8>> {
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    loop {
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        let p = unsafe { libc::getcwd(buf.as_mut_ptr().cast(), buf.len()) };
        if !p.is_null() {
            // SAFETY: getcwd NUL-terminated the result inside `buf`.
            let len = unsafe { CStr::from_ptr(p) }.to_bytes().len();
            buf.truncate(len);
            return Ok(buf);
        }
        if errno() != libc::ERANGE {
            return Err(KeelError::last_os("getcwd"));
        }
        let grown = buf.len() * 2;
        buf.resize(grown, 0);
    }
}

// ── Daemonization ─────────────────────────────────────────────────────────────

/// Classic double fork.  Only the grandchild returns; every intermediate
/// image exits, so exactly one process survives.
pub(crate) fn daemon() -> Result<()> {
    // SAFETY: fork/setsid/signal/umask/chdir/close/open are called with
    // valid arguments; the parent branches exit immediately.
    unsafe {
        let pid = libc::fork();
        if pid < 0 {
            return Err(KeelError::last_os("fork"));
        }
        if pid > 0 {
            std::process::exit(libc::EXIT_SUCCESS);
        }

        if libc::setsid() < 0 {
            std::process::exit(libc::EXIT_FAILURE);
        }

        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
        libc::signal(libc::SIGHUP, libc::SIG_IGN);

        let pid = libc::fork();
        if pid < 0 {
            std::process::exit(libc::EXIT_FAILURE);
        }
        if pid > 0 {
            std::process::exit(libc::EXIT_SUCCESS);
        }

        libc::umask(0);
        libc::chdir(c"/".as_ptr());

        libc::close(libc::STDIN_FILENO);
        libc::close(libc::STDOUT_FILENO);
        libc::close(libc::STDERR_FILENO);

        // Lowest free descriptors: these land on 0, 1 and 2.
        libc::open(c"/dev/null".as_ptr(), libc::O_RDONLY);
        libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
    }
    Ok(())
}

// ── Termination signals ───────────────────────────────────────────────────────
//
// The signal handler itself only writes one byte to a self-pipe (write(2) is
// async-signal-safe).  A detached watcher thread reads the pipe and runs the
// pending handler there, on an ordinary thread where locks and allocation
// are allowed.

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(_signum: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe; the pipe is non-blocking so
        // a full pipe drops the byte instead of stalling the handler.
        unsafe { libc::write(fd, (&byte as *const u8).cast::<c_void>(), 1) };
    }
}

fn set_fd_flags(fd: libc::c_int, get: libc::c_int, set: libc::c_int, bits: libc::c_int) -> Result<()> {
    // SAFETY: plain descriptor calls on a descriptor we own.
    unsafe {
        let flags = libc::fcntl(fd, get);
        if flags < 0 || libc::fcntl(fd, set, flags | bits) < 0 {
            return Err(KeelError::last_os("fcntl"));
        }
    }
    Ok(())
}

/// Both ends of the self-pipe; closed on drop until handed to the watcher.
struct WakePipe {
    read_fd: libc::c_int,
    write_fd: libc::c_int,
}

impl WakePipe {
    fn open() -> Result<Self> {
        let mut fds = [-1; 2];
        // SAFETY: `fds` is a valid two-element out-array.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(KeelError::last_os("pipe"));
        }
        let pipe = Self {
            read_fd: fds[0],
            write_fd: fds[1],
        };
        for fd in fds {
            set_fd_flags(fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
        }
        set_fd_flags(pipe.write_fd, libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;
        Ok(pipe)
    }

    /// Give up ownership; the descriptors then live for the whole process.
    fn into_fds(self) -> (libc::c_int, libc::c_int) {
        let this = ManuallyDrop::new(self);
        (this.read_fd, this.write_fd)
    }
}

impl Drop for WakePipe {
    fn drop(&mut self) {
        // SAFETY: both descriptors are owned by `self` and closed once.
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

fn set_disposition(signum: libc::c_int, sa: &libc::sigaction) -> Result<libc::sigaction> {
    // SAFETY: all-zero is a valid `sigaction` out-value.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: both pointers are valid for the call.
    if unsafe { libc::sigaction(signum, sa, &mut old) } != 0 {
        return Err(KeelError::last_os("sigaction"));
    }
    Ok(old)
}

/// Route `signals` to `deliver` through the self-pipe.  On failure every
/// disposition already changed is put back and the pipe is closed.
fn install_on(signals: &[libc::c_int], deliver: fn()) -> Result<()> {
    let pipe = WakePipe::open()?;

    // SAFETY: all-zero is a valid `sigaction`; the mask is then emptied
    // properly and the handler has the plain one-argument signature.
    let sa = unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = on_signal as *const () as libc::sighandler_t;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        sa
    };

    let mut previous = Vec::with_capacity(signals.len());
    for &signum in signals {
        match set_disposition(signum, &sa) {
            Ok(old) => previous.push((signum, old)),
            Err(e) => {
                for (signum, old) in previous.iter().rev() {
                    let _ = set_disposition(*signum, old);
                }
                return Err(e);
            }
        }
    }

    // Signals caught before this store are dropped by the handler.
    let (read_fd, write_fd) = pipe.into_fds();
    WAKE_FD.store(write_fd, Ordering::Relaxed);

    Thread::spawn(move || loop {
        let mut byte = 0u8;
        // SAFETY: one-byte read into a local.
        let n = unsafe { libc::read(read_fd, (&mut byte as *mut u8).cast::<c_void>(), 1) };
        match n {
            1 => deliver(),
            n if n < 0 && errno() == libc::EINTR => continue,
            _ => break,
        }
    })
    .detach();
    Ok(())
}

/// Install SIGTERM/SIGINT delivery; `deliver` runs on the watcher thread
/// once per received signal.  Called once per process.
pub(crate) fn install_termination(deliver: fn()) -> Result<()> {
    install_on(&[libc::SIGTERM, libc::SIGINT], deliver)
}

// ── System ────────────────────────────────────────────────────────────────────

pub(crate) fn numcpu() -> usize {
    // SAFETY: sysconf has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 {
        1
    } else {
        n as usize
    }
}

/// Raise the soft open-file limit to at least `min` (capped by the hard
/// limit) and return the limit now in force.
pub(crate) fn fdlimit(min: u64) -> Result<u64> {
    let mut rl = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `rl` is a valid out-pointer.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) } != 0 {
        return Err(KeelError::last_os("getrlimit"));
    }

    let want = min as libc::rlim_t;
    if rl.rlim_cur != libc::RLIM_INFINITY && rl.rlim_cur < want {
        let capped = if rl.rlim_max == libc::RLIM_INFINITY {
            want
        } else {
            want.min(rl.rlim_max)
        };
        let raised = libc::rlimit {
            rlim_cur: capped,
            rlim_max: rl.rlim_max,
        };
        // SAFETY: `raised` is a valid in-pointer.
        if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &raised) } != 0 {
            return Err(KeelError::last_os("setrlimit"));
        }
        rl.rlim_cur = capped;
    }
    Ok(rl.rlim_cur as u64)
}

/// Per-user data directory for `app`.
pub(crate) fn datadir(app: &str) -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or(KeelError::VarNotPresent)?;
    let mut path = PathBuf::from(home);

    if cfg!(target_os = "macos") {
        path.push("Library");
        path.push("Application Support");
        path.push(crate::process::capitalize(app));
    } else {
        let mut dot = OsString::from(".");
        dot.push(app.to_lowercase());
        path.push(dot);
    }
    Ok(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn current_handler(signum: libc::c_int) -> libc::sighandler_t {
        // SAFETY: a null new action only queries the disposition.
        unsafe {
            let mut cur: libc::sigaction = mem::zeroed();
            assert_eq!(libc::sigaction(signum, std::ptr::null(), &mut cur), 0);
            cur.sa_sigaction
        }
    }

    #[test]
    fn failed_install_restores_earlier_dispositions() {
        let before = current_handler(libc::SIGUSR2);
        let wake_fd = WAKE_FD.load(Ordering::Relaxed);

        // SIGKILL cannot be caught, so the second sigaction fails after
        // SIGUSR2 has already been changed.
        let err = install_on(&[libc::SIGUSR2, libc::SIGKILL], || {});
        assert!(err.is_err());

        assert_eq!(current_handler(libc::SIGUSR2), before);
        assert_eq!(WAKE_FD.load(Ordering::Relaxed), wake_fd);
    }
}
