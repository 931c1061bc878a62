// ── Win32 platform implementation ─────────────────────────────────────────────
//
// One of the modules in the crate where `unsafe` code is permitted.  Every
// `unsafe` block MUST carry a `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Windows hosts come in two kernel classes.  NT-class kernels get the UTF-16
// `*W` entry points and atomic replace-on-rename; legacy (9x-class) kernels
// only have the single-byte `*A` calls.  The choice is made once, in
// `paths()`, and every path-taking call goes through the selected
// `HostPaths` implementation.

#![allow(unsafe_code)]

use windows::Win32::Foundation::GetLastError;
use windows::Win32::System::SystemInformation::GetVersion;

use crate::config::{HostConfig, PathApiPreference};
use crate::error::KeelError;
use crate::once::InitCell;

pub(crate) mod fs;
pub(crate) mod paths;
pub(crate) mod process;
pub(crate) mod sync;
pub(crate) mod thread;
pub(crate) mod time;

use paths::{HostPaths, NarrowPaths, WidePaths};

pub(crate) fn last_error_code() -> u32 {
    // SAFETY: reads thread-local state; no preconditions.
    unsafe { GetLastError() }.0
}

/// Adapt a `windows::core::Error` into `KeelError::Os` naming `function`.
pub(crate) fn os_err(function: &'static str) -> impl FnOnce(windows::core::Error) -> KeelError {
    move |e| match KeelError::from(e) {
        KeelError::Os { code, .. } => KeelError::Os { function, code },
        other => other,
    }
}

// ── Kernel class ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KernelClass {
    Nt,
    Legacy,
}

/// Detected once; the high bit of `GetVersion()` is set on 9x kernels.
pub(crate) fn kernel_class() -> KernelClass {
    static CLASS: InitCell<KernelClass> = InitCell::new();

    *CLASS.get_or_init(|| {
        // SAFETY: no preconditions.
        let version = unsafe { GetVersion() };
        if version < 0x8000_0000 {
            KernelClass::Nt
        } else {
            KernelClass::Legacy
        }
    })
}

static WIDE: WidePaths = WidePaths;
static NARROW: NarrowPaths = NarrowPaths;

/// The filesystem code path for this process, honouring the host config
/// override before falling back to kernel-class detection.
pub(crate) fn paths() -> &'static dyn HostPaths {
    static PATHS: InitCell<&'static dyn HostPaths> = InitCell::new();

    *PATHS.get_or_init(|| {
        let selected: &'static dyn HostPaths = match HostConfig::global().path_api {
            PathApiPreference::Wide => &WIDE,
            PathApiPreference::Narrow => &NARROW,
            PathApiPreference::Auto => match kernel_class() {
                KernelClass::Nt => &WIDE,
                KernelClass::Legacy => &NARROW,
            },
        };
        tracing::debug!(
            kernel = ?kernel_class(),
            path_api = selected.name(),
            "keel: path API selected"
        );
        selected
    })
}
