// ── Process / environment ─────────────────────────────────────────────────────
//
// Working directory, environment lookups, daemonization, termination
// notification and a few host facts.  All recoverable: nothing here aborts.

use std::path::PathBuf;

use crate::error::{KeelError, Result};
use crate::platform::sys;
use crate::sync::Mutex;

// ── Working directory ─────────────────────────────────────────────────────────

pub fn cwd() -> Result<PathBuf> {
    let bytes = sys::process::current_dir()?;
    Ok(sys::fs::path_from_bytes(&bytes)?.to_path_buf())
}

/// Copy the current directory into `buf`, returning its length in bytes.
/// Fails with `BufferTooSmall` rather than truncating.
pub fn cwd_into(buf: &mut [u8]) -> Result<usize> {
    copy_into(&sys::process::current_dir()?, buf)
}

// ── Environment ───────────────────────────────────────────────────────────────

/// The value of `name`, or `None` if it is unset or not valid Unicode.
pub fn getenv(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Copy the value of `name` into `buf`, returning its length in bytes.
pub fn getenv_into(name: &str, buf: &mut [u8]) -> Result<usize> {
    let value = getenv(name).ok_or(KeelError::VarNotPresent)?;
    copy_into(value.as_bytes(), buf)
}

fn copy_into(src: &[u8], buf: &mut [u8]) -> Result<usize> {
    let capacity = buf.len();
    let dst = buf
        .get_mut(..src.len())
        .ok_or(KeelError::BufferTooSmall {
            needed: src.len(),
            capacity,
        })?;
    dst.copy_from_slice(src);
    Ok(src.len())
}

// ── Daemonization ─────────────────────────────────────────────────────────────

/// Detach from the controlling terminal: fork twice, start a new session,
/// point the standard streams at `/dev/null`.  Only the final child returns.
///
/// Returns `Unsupported` on Windows, where there is nothing to detach from.
pub fn daemon() -> Result<()> {
    tracing::debug!("keel: daemonizing");
    sys::process::daemon()
}

// ── Termination ───────────────────────────────────────────────────────────────

type Handler = Box<dyn FnOnce() + Send + 'static>;

static PENDING: Mutex<Option<Handler>> = Mutex::new(None);
static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Run `handler` once when the host asks the process to terminate
/// (SIGTERM/SIGINT, or a console close/Ctrl-C event on Windows).
///
/// Only one handler is pending at a time; registering again replaces it.
/// The handler runs on a thread the caller does not own.  On Windows the
/// process is torn down as soon as that thread returns, so after the
/// handler finishes the thread blocks forever and the application keeps
/// running until it exits on its own.
#[doc(alias = "onterm")]
pub fn on_terminate<F>(handler: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    {
        let mut installed = INSTALLED.lock();
        if !*installed {
            sys::process::install_termination(deliver_termination)?;
            *installed = true;
            tracing::debug!("keel: termination hook installed");
        }
    }

    *PENDING.lock() = Some(Box::new(handler));
    Ok(())
}

/// Called by the backend for each termination notification; runs the
/// pending handler, if any, exactly once.
pub(crate) fn deliver_termination() {
    let handler = PENDING.lock().take();
    if let Some(handler) = handler {
        tracing::debug!("keel: delivering termination");
        handler();
    }
}

// ── Host facts ────────────────────────────────────────────────────────────────

/// Number of online processors; at least 1.
pub fn numcpu() -> usize {
    sys::process::numcpu()
}

/// Per-user data directory for `app`:
///
/// | host    | path                                        |
/// |---------|---------------------------------------------|
/// | Windows | `%APPDATA%\App`                             |
/// | macOS   | `~/Library/Application Support/App`         |
/// | other   | `~/.app`                                    |
///
/// The directory is not created.
pub fn datadir(app: &str) -> Result<PathBuf> {
    sys::process::datadir(app)
}

/// Raise the open-file limit to at least `min` where the host allows it
/// and report the limit now in force.  Windows has no such limit and
/// reports `max(min, 2048)`.
pub fn fdlimit(min: u64) -> Result<u64> {
    sys::process::fdlimit(min)
}

/// `app` with its first letter upper-cased.
pub(crate) fn capitalize(app: &str) -> String {
    let mut chars = app.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwd_matches_std() {
        let ours = cwd().expect("cwd");
        let std_cwd = std::env::current_dir().expect("std cwd");
        assert_eq!(ours, std_cwd);
    }

    #[test]
    fn cwd_into_fails_instead_of_truncating() {
        let mut tiny = [0u8; 1];
        let err = cwd_into(&mut tiny).expect_err("cwd is longer than one byte");
        assert!(matches!(err, KeelError::BufferTooSmall { capacity: 1, .. }));

        let mut buf = vec![0u8; 4096];
        let len = cwd_into(&mut buf).expect("cwd_into");
        assert!(len > 0);
    }

    #[test]
    fn getenv_reads_and_reports_absence() {
        std::env::set_var("KEEL_TEST_GETENV", "chain-data");
        assert_eq!(getenv("KEEL_TEST_GETENV").as_deref(), Some("chain-data"));

        let mut buf = [0u8; 32];
        let len = getenv_into("KEEL_TEST_GETENV", &mut buf).expect("present");
        assert_eq!(&buf[..len], b"chain-data");

        let mut small = [0u8; 4];
        assert!(matches!(
            getenv_into("KEEL_TEST_GETENV", &mut small),
            Err(KeelError::BufferTooSmall {
                needed: 10,
                capacity: 4
            })
        ));

        assert_eq!(getenv("KEEL_TEST_SURELY_UNSET"), None);
        assert!(matches!(
            getenv_into("KEEL_TEST_SURELY_UNSET", &mut buf),
            Err(KeelError::VarNotPresent)
        ));
    }

    #[test]
    fn numcpu_is_at_least_one() {
        assert!(numcpu() >= 1);
    }

    #[test]
    fn fdlimit_reports_at_least_current() {
        let limit = fdlimit(64).expect("fdlimit");
        assert!(limit >= 64);
    }

    #[test]
    fn datadir_names_the_app() {
        let dir = datadir("keelnode").expect("datadir");
        let leaf = dir
            .file_name()
            .and_then(|s| s.to_str())
            .expect("utf-8 leaf");
        if cfg!(any(windows, target_os = "macos")) {
            assert_eq!(leaf, "Keelnode");
        } else {
            assert_eq!(leaf, ".keelnode");
        }
    }

    #[test]
    fn capitalize_upper_cases_first_letter_only() {
        assert_eq!(capitalize("keel"), "Keel");
        assert_eq!(capitalize("kEEL"), "KEEL");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn delivery_without_handler_is_a_no_op() {
        deliver_termination();
    }

    #[cfg(unix)]
    #[test]
    #[allow(unsafe_code)]
    fn sigterm_runs_handler_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        on_terminate(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .expect("install");

        // SAFETY: signals the current process; the handler is installed.
        unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };

        let deadline = crate::time::now_millis() + 5_000;
        while calls.load(Ordering::SeqCst) == 0 && crate::time::now_millis() < deadline {
            crate::time::sleep(5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A second notification finds no pending handler.
        // SAFETY: as above.
        unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        crate::time::sleep(50);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
