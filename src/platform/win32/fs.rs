#![allow(unsafe_code)]

use std::mem::ManuallyDrop;
use std::path::Path;

use windows::Win32::Foundation::{
    CloseHandle, SetLastError, GENERIC_READ, GENERIC_WRITE, HANDLE, NO_ERROR,
};
use windows::Win32::Storage::FileSystem::{
    FlushFileBuffers, GetFileSize, LockFile, ReadFile, SetFilePointer, UnlockFile, WriteFile,
    CREATE_ALWAYS, FILE_BEGIN, FILE_CREATION_DISPOSITION, FILE_END, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_ALWAYS, OPEN_EXISTING, SET_FILE_POINTER_MOVE_METHOD,
};

use super::paths::copy_out;
use super::{last_error_code, os_err, paths};
use crate::error::{KeelError, Result};
use crate::fs::segments::Style;

pub(crate) const PATH_STYLE: Style = Style::Windows;

const READ: u32 = GENERIC_READ.0;
const WRITE: u32 = GENERIC_WRITE.0;

/// `SetFilePointer` / `GetFileSize` return this for the low word on
/// failure, and also for a legitimate low word of all ones.
const INVALID_LOW_WORD: u32 = u32::MAX;

/// Largest single transfer; `ReadFile`/`WriteFile` take a 32-bit count.
const MAX_IO: usize = u32::MAX as usize;

// ── RawFile ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct RawFile {
    handle: HANDLE,
}

// SAFETY: file handles may be used and closed from any thread.
unsafe impl Send for RawFile {}

fn open_with(path: &Path, access: u32, disposition: FILE_CREATION_DISPOSITION) -> Result<RawFile> {
    let handle =
        paths().create_file(path, access, FILE_SHARE_READ | FILE_SHARE_WRITE, disposition)?;
    Ok(RawFile { handle })
}

/// Compose a 64-bit result from a low word returned by value and a high
/// word returned through a pointer.  The low word alone cannot signal
/// failure, so the thread error code is cleared first and checked after.
fn split_call(function: &'static str, call: impl FnOnce(&mut u32) -> u32) -> Result<u64> {
    let mut high = 0u32;
    // SAFETY: no preconditions.
    unsafe { SetLastError(NO_ERROR) };
    let low = call(&mut high);
    if low == INVALID_LOW_WORD && last_error_code() != NO_ERROR.0 {
        return Err(KeelError::last_os(function));
    }
    Ok((u64::from(high) << 32) | u64::from(low))
}

impl RawFile {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        open_with(path, READ, OPEN_EXISTING)
    }

    pub(crate) fn create(path: &Path) -> Result<Self> {
        open_with(path, WRITE, CREATE_ALWAYS)
    }

    pub(crate) fn append(path: &Path) -> Result<Self> {
        let file = open_with(path, WRITE, OPEN_ALWAYS)?;
        file.move_pointer(0, FILE_END)?;
        Ok(file)
    }

    pub(crate) fn lock(path: &Path) -> Result<Self> {
        let file = open_with(path, READ | WRITE, OPEN_ALWAYS)?;
        // SAFETY: owned handle; the range covers every possible offset.
        unsafe { LockFile(file.handle, 0, 0, u32::MAX, u32::MAX) }.map_err(os_err("LockFile"))?;
        Ok(file)
    }

    pub(crate) fn unlock(&self) -> Result<()> {
        // SAFETY: owned handle; same range as `lock`.
        unsafe { UnlockFile(self.handle, 0, 0, u32::MAX, u32::MAX) }.map_err(os_err("UnlockFile"))
    }

    pub(crate) fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let want = (buf.len() - done).min(MAX_IO);
            let mut n = 0u32;
            // SAFETY: owned handle; synchronous I/O into a bounded slice.
            unsafe { ReadFile(self.handle, Some(&mut buf[done..done + want]), Some(&mut n), None) }
                .map_err(os_err("ReadFile"))?;
            if n == 0 {
                return Err(KeelError::ShortTransfer {
                    expected: buf.len(),
                    actual: done,
                });
            }
            done += n as usize;
        }
        Ok(())
    }

    pub(crate) fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let want = (buf.len() - done).min(MAX_IO);
            let mut n = 0u32;
            // SAFETY: owned handle; synchronous I/O from a bounded slice.
            unsafe { WriteFile(self.handle, Some(&buf[done..done + want]), Some(&mut n), None) }
                .map_err(os_err("WriteFile"))?;
            if n == 0 {
                return Err(KeelError::ShortTransfer {
                    expected: buf.len(),
                    actual: done,
                });
            }
            done += n as usize;
        }
        Ok(())
    }

    fn move_pointer(&self, offset: u64, method: SET_FILE_POINTER_MOVE_METHOD) -> Result<u64> {
        split_call("SetFilePointer", |high| {
            let mut hi = (offset >> 32) as i32;
            // SAFETY: owned handle; `hi` is a valid in/out pointer.
            let low = unsafe { SetFilePointer(self.handle, offset as u32 as i32, Some(&mut hi), method) };
            *high = hi as u32;
            low
        })
    }

    pub(crate) fn seek(&self, offset: u64) -> Result<u64> {
        self.move_pointer(offset, FILE_BEGIN)
    }

    pub(crate) fn size(&self) -> Result<u64> {
        split_call("GetFileSize", |high| {
            // SAFETY: owned handle; `high` is a valid out-pointer.
            unsafe { GetFileSize(self.handle, Some(high)) }
        })
    }

    pub(crate) fn sync(&self) -> Result<()> {
        // SAFETY: owned handle.
        unsafe { FlushFileBuffers(self.handle) }.map_err(os_err("FlushFileBuffers"))
    }

    pub(crate) fn close(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: owned handle, closed once with Drop suppressed.
        unsafe { CloseHandle(this.handle) }.map_err(os_err("CloseHandle"))
    }
}

impl Drop for RawFile {
    fn drop(&mut self) {
        // SAFETY: owned handle, closed exactly once.
        let _ = unsafe { CloseHandle(self.handle) };
    }
}

// ── Path operations ───────────────────────────────────────────────────────────

/// Paths cross the portable layer as UTF-8; each `HostPaths` re-encodes.
pub(crate) fn path_bytes(path: &Path) -> Result<&[u8]> {
    path.to_str()
        .map(str::as_bytes)
        .ok_or(KeelError::InvalidPath)
}

pub(crate) fn path_from_bytes(bytes: &[u8]) -> Result<&Path> {
    std::str::from_utf8(bytes)
        .map(Path::new)
        .map_err(|_| KeelError::InvalidPath)
}

pub(crate) fn path_size(path: &Path) -> Result<u64> {
    let file = open_with(path, READ, OPEN_EXISTING)?;
    file.size()
}

pub(crate) fn exists(path: &Path) -> bool {
    paths().attributes(path).is_some()
}

pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    paths().rename(from, to)
}

pub(crate) fn unlink(path: &Path) -> Result<()> {
    paths().delete_file(path)
}

pub(crate) fn mkdir(path: &Path) -> Result<()> {
    paths().create_dir(path)
}

pub(crate) fn rmdir(path: &Path) -> Result<()> {
    paths().remove_dir(path)
}

/// Lexical resolution against the current directory; the path need not
/// exist.
pub(crate) fn absolute_into(path: &Path, buf: &mut [u8]) -> Result<usize> {
    copy_out(&paths().full_path(path)?, buf)
}
