#![allow(unsafe_code)]

use std::ffi::{CStr, OsStr};
use std::mem::{self, ManuallyDrop};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::{c_path, errno};
use crate::error::{KeelError, Result};
use crate::fs::segments::Style;

pub(crate) const PATH_STYLE: Style = Style::Posix;

const CREATE_MODE: libc::c_uint = 0o644;
const DIR_MODE: libc::mode_t = 0o755;

/// Largest single read/write request; the kernel may still return less.
const MAX_IO: usize = libc::ssize_t::MAX as usize;

// ── RawFile ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct RawFile {
    fd: libc::c_int,
}

fn open_with(path: &Path, flags: libc::c_int, function: &'static str) -> Result<RawFile> {
    let c = c_path(path)?;
    // SAFETY: `c` is NUL-terminated and outlives the call; the mode argument
    // is read only when O_CREAT is set.
    let fd = unsafe { libc::open(c.as_ptr(), flags | libc::O_CLOEXEC, CREATE_MODE) };
    if fd < 0 {
        return Err(KeelError::last_os(function));
    }
    Ok(RawFile { fd })
}

fn stat_size(st: &libc::stat) -> u64 {
    st.st_size as u64
}

impl RawFile {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        open_with(path, libc::O_RDONLY, "open")
    }

    pub(crate) fn create(path: &Path) -> Result<Self> {
        open_with(path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, "open")
    }

    /// Open or create for writing, positioned at the current end.
    pub(crate) fn append(path: &Path) -> Result<Self> {
        let file = open_with(path, libc::O_WRONLY | libc::O_CREAT, "open")?;
        // SAFETY: `file.fd` is an open descriptor owned by `file`.
        if unsafe { libc::lseek(file.fd, 0, libc::SEEK_END) } < 0 {
            return Err(KeelError::last_os("lseek"));
        }
        Ok(file)
    }

    /// Open or create `path` and take an exclusive whole-file lock on it.
    ///
    /// The lock belongs to this open file description, not the process, so
    /// a second `lock` of the same path fails even from the same process.
    pub(crate) fn lock(path: &Path) -> Result<Self> {
        let file = open_with(path, libc::O_RDWR | libc::O_CREAT, "open")?;
        file.set_lock(true)?;
        Ok(file)
    }

    pub(crate) fn unlock(&self) -> Result<()> {
        self.set_lock(false)
    }

    #[cfg(target_os = "linux")]
    fn set_lock(&self, exclusive: bool) -> Result<()> {
        let kind = if exclusive { libc::F_WRLCK } else { libc::F_UNLCK };
        // SAFETY: all-zero is a valid `flock`; l_start = l_len = 0 covers
        // the whole file, however large it grows, and OFD locks require
        // l_pid = 0.
        let mut fl: libc::flock = unsafe { mem::zeroed() };
        fl.l_type = kind as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;

        // SAFETY: `fl` is a valid pointer for F_OFD_SETLK.
        if unsafe { libc::fcntl(self.fd, libc::F_OFD_SETLK, &fl as *const libc::flock) } < 0 {
            return Err(KeelError::last_os("fcntl(F_OFD_SETLK)"));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn set_lock(&self, exclusive: bool) -> Result<()> {
        let op = if exclusive {
            libc::LOCK_EX | libc::LOCK_NB
        } else {
            libc::LOCK_UN
        };
        // SAFETY: `self.fd` is an open descriptor owned by `self`.
        if unsafe { libc::flock(self.fd, op) } < 0 {
            return Err(KeelError::last_os("flock"));
        }
        Ok(())
    }

    pub(crate) fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let want = (buf.len() - done).min(MAX_IO);
            // SAFETY: `buf[done..]` is valid for `want` writable bytes.
            let n = unsafe { libc::read(self.fd, buf[done..].as_mut_ptr().cast(), want) };
            if n < 0 {
                if errno() == libc::EINTR {
                    continue;
                }
                return Err(KeelError::last_os("read"));
            }
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
            // SAFETY: `buf[done..]` is valid for `want` readable bytes.
            let n = unsafe { libc::write(self.fd, buf[done..].as_ptr().cast(), want) };
            if n < 0 {
                if errno() == libc::EINTR {
                    continue;
                }
                return Err(KeelError::last_os("write"));
            }
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

    pub(crate) fn seek(&self, offset: u64) -> Result<u64> {
        let Ok(pos) = libc::off_t::try_from(offset) else {
            return Err(KeelError::Os {
                function: "lseek",
                code: libc::EOVERFLOW as u32,
            });
        };
        // SAFETY: plain descriptor call.
        let r = unsafe { libc::lseek(self.fd, pos, libc::SEEK_SET) };
        if r < 0 {
            return Err(KeelError::last_os("lseek"));
        }
        Ok(r as u64)
    }

    pub(crate) fn size(&self) -> Result<u64> {
        // SAFETY: all-zero is a valid `stat`; fstat fills it in.
        let mut st: libc::stat = unsafe { mem::zeroed() };
        // SAFETY: `st` is a valid out-pointer.
        if unsafe { libc::fstat(self.fd, &mut st) } != 0 {
            return Err(KeelError::last_os("fstat"));
        }
        Ok(stat_size(&st))
    }

    pub(crate) fn sync(&self) -> Result<()> {
        // Plain fsync on macOS only reaches the drive cache.
        #[cfg(target_os = "macos")]
        {
            // SAFETY: plain descriptor call.
            if unsafe { libc::fcntl(self.fd, libc::F_FULLFSYNC) } == 0 {
                return Ok(());
            }
        }
        // SAFETY: plain descriptor call.
        if unsafe { libc::fsync(self.fd) } != 0 {
            return Err(KeelError::last_os("fsync"));
        }
        Ok(())
    }

    pub(crate) fn close(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this.fd` is owned and, with Drop suppressed, closed once.
        if unsafe { libc::close(this.fd) } != 0 {
            return Err(KeelError::last_os("close"));
        }
        Ok(())
    }
}

impl Drop for RawFile {
    fn drop(&mut self) {
        // SAFETY: owned descriptor, closed exactly once.
        unsafe { libc::close(self.fd) };
    }
}

// ── Path operations ───────────────────────────────────────────────────────────

/// Paths are opaque bytes on POSIX; every path is representable.
pub(crate) fn path_bytes(path: &Path) -> Result<&[u8]> {
    Ok(path.as_os_str().as_bytes())
}

pub(crate) fn path_from_bytes(bytes: &[u8]) -> Result<&Path> {
    Ok(Path::new(OsStr::from_bytes(bytes)))
}

pub(crate) fn path_size(path: &Path) -> Result<u64> {
    let c = c_path(path)?;
    // SAFETY: all-zero is a valid `stat`.
    let mut st: libc::stat = unsafe { mem::zeroed() };
    // SAFETY: NUL-terminated path and valid out-pointer.
    if unsafe { libc::stat(c.as_ptr(), &mut st) } != 0 {
        return Err(KeelError::last_os("stat"));
    }
    Ok(stat_size(&st))
}

pub(crate) fn exists(path: &Path) -> bool {
    let Ok(c) = c_path(path) else {
        return false;
    };
    // SAFETY: NUL-terminated path.
    unsafe { libc::access(c.as_ptr(), libc::F_OK) == 0 }
}

/// `rename(2)` replaces an existing destination atomically.
pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    let (src, dst) = (c_path(from)?, c_path(to)?);
    // SAFETY: both NUL-terminated.
    if unsafe { libc::rename(src.as_ptr(), dst.as_ptr()) } != 0 {
        return Err(KeelError::last_os("rename"));
    }
    Ok(())
}

pub(crate) fn unlink(path: &Path) -> Result<()> {
    let c = c_path(path)?;
    // SAFETY: NUL-terminated path.
    if unsafe { libc::unlink(c.as_ptr()) } != 0 {
        return Err(KeelError::last_os("unlink"));
    }
    Ok(())
}

pub(crate) fn mkdir(path: &Path) -> Result<()> {
    let c = c_path(path)?;
    // SAFETY: NUL-terminated path.
    if unsafe { libc::mkdir(c.as_ptr(), DIR_MODE) } != 0 {
        if errno() == libc::EEXIST {
            return Err(KeelError::AlreadyExists);
        }
        return Err(KeelError::last_os("mkdir"));
    }
    Ok(())
}

pub(crate) fn rmdir(path: &Path) -> Result<()> {
    let c = c_path(path)?;
    // SAFETY: NUL-terminated path.
    if unsafe { libc::rmdir(c.as_ptr()) } != 0 {
        return Err(KeelError::last_os("rmdir"));
    }
    Ok(())
}

/// Canonical absolute form via `realpath(3)`.  The path must exist.
pub(crate) fn absolute_into(path: &Path, buf: &mut [u8]) -> Result<usize> {
    let c = c_path(path)?;
    // SAFETY: NUL-terminated input; a null `resolved` asks libc to malloc.
    let resolved = unsafe { libc::realpath(c.as_ptr(), std::ptr::null_mut()) };
    if resolved.is_null() {
        return Err(KeelError::last_os("realpath"));
    }

    // SAFETY: realpath returned a NUL-terminated string we now own.
    let bytes = unsafe { CStr::from_ptr(resolved) }.to_bytes();
    let result = if bytes.len() > buf.len() {
        Err(KeelError::BufferTooSmall {
            needed: bytes.len(),
            capacity: buf.len(),
        })
    } else {
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    };

    // SAFETY: allocated by realpath with malloc; `bytes` is not used past here.
    unsafe { libc::free(resolved.cast()) };
    result
}
