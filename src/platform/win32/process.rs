#![allow(unsafe_code)]

use std::path::PathBuf;

use windows::core::s;
use windows::Win32::Foundation::{BOOL, TRUE};
use windows::Win32::System::Console::SetConsoleCtrlHandler;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows::Win32::System::Threading::{Sleep, INFINITE};

use super::paths::{SpecialFolderA, SpecialFolderW};
use super::{os_err, paths};
use crate::error::{KeelError, Result};
use crate::once::InitCell;

/// Windows has no per-process descriptor ceiling worth raising; this is the
/// figure reported instead.
const FD_LIMIT: u64 = 2048;

pub(crate) fn current_dir() -> Result<Vec<u8>> {
    paths().current_dir()
}

pub(crate) fn daemon() -> Result<()> {
    Err(KeelError::Unsupported {
        operation: "daemon",
    })
}

// ── Termination ───────────────────────────────────────────────────────────────
//
// The console control handler runs on a thread the system creates for the
// event, and the process is terminated as soon as it returns.  After the
// pending handler has run, that thread sleeps forever so the application's
// own shutdown decides when the process ends.

static DELIVER: InitCell<fn()> = InitCell::new();

unsafe extern "system" fn on_console_event(_ctrl_type: u32) -> BOOL {
    if let Some(deliver) = DELIVER.get() {
        deliver();
    }
    // SAFETY: no preconditions; blocks only this system-owned thread.
    unsafe { Sleep(INFINITE) };
    TRUE
}

pub(crate) fn install_termination(deliver: fn()) -> Result<()> {
    DELIVER.get_or_init(|| deliver);
    // SAFETY: `on_console_event` has the PHANDLER_ROUTINE signature and,
    // being a plain function, lives for the whole process.
    unsafe { SetConsoleCtrlHandler(Some(on_console_event), TRUE) }
        .map_err(os_err("SetConsoleCtrlHandler"))
}

// ── System ────────────────────────────────────────────────────────────────────

pub(crate) fn numcpu() -> usize {
    let mut info = SYSTEM_INFO::default();
    // SAFETY: `info` is a valid out-pointer.
    unsafe { GetSystemInfo(&mut info) };
    (info.dwNumberOfProcessors as usize).max(1)
}

pub(crate) fn fdlimit(min: u64) -> Result<u64> {
    Ok(min.max(FD_LIMIT))
}

/// `SHGetSpecialFolderPath*`, looked up once.  Both are optional: very old
/// shells lack them.
pub(crate) struct Shell32 {
    pub(crate) folder_w: Option<SpecialFolderW>,
    pub(crate) folder_a: Option<SpecialFolderA>,
}

pub(crate) fn shell32() -> &'static Shell32 {
    static SHELL32: InitCell<Shell32> = InitCell::new();

    SHELL32.get_or_init(|| {
        // SAFETY: NUL-terminated literal.  The module stays loaded for the
        // life of the process, so the entry points never dangle.
        let Ok(module) = (unsafe { LoadLibraryA(s!("shell32.dll")) }) else {
            return Shell32 {
                folder_w: None,
                folder_a: None,
            };
        };

        // SAFETY: the exported symbols have exactly these signatures.
        unsafe {
            Shell32 {
                folder_w: GetProcAddress(module, s!("SHGetSpecialFolderPathW"))
                    .map(|f| std::mem::transmute::<_, SpecialFolderW>(f)),
                folder_a: GetProcAddress(module, s!("SHGetSpecialFolderPathA"))
                    .map(|f| std::mem::transmute::<_, SpecialFolderA>(f)),
            }
        }
    })
}

/// `<app data>\<App>`.
pub(crate) fn datadir(app: &str) -> Result<PathBuf> {
    let base = paths().app_data()?;
    let base = std::str::from_utf8(&base).map_err(|_| KeelError::InvalidPath)?;
    Ok(PathBuf::from(base).join(crate::process::capitalize(app)))
}
