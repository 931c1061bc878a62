// ── Filesystem primitives ─────────────────────────────────────────────────────
//
// File contents are opaque byte streams.  Every call behaves the same on
// either Win32 code path (wide or single-byte) and on POSIX; the backend in
// `platform::sys::fs` does the host-specific work.  Failures are always
// `Err`, never an abort.

use std::path::{Path, PathBuf};

use crate::error::{KeelError, Result};
use crate::platform::sys::fs as sys;

pub mod segments;

/// Capacity used by `absolute()`; 32 768 is the documented maximum for
/// `\\?\` extended paths, and comfortably above POSIX `PATH_MAX`.
const PATH_BUF_LEN: usize = 32_768;

// ── File ──────────────────────────────────────────────────────────────────────

/// An open file.  Dropping it closes the handle silently; use `close` to
/// learn whether the close succeeded.
#[derive(Debug)]
pub struct File {
    raw: sys::RawFile,
}

impl File {
    /// Fill `buf` completely.  A short read is an error even if the host
    /// call itself succeeded; the file position is then unspecified.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.raw.read_exact(buf)
    }

    /// Write all of `buf`.  A short write is an error.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.raw.write_all(buf)
    }

    /// Move to `offset` bytes from the start; returns the new position.
    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        self.raw.seek(offset)
    }

    pub fn size(&self) -> Result<u64> {
        self.raw.size()
    }

    /// Flush file data to stable storage.
    #[doc(alias = "fsync")]
    pub fn sync(&self) -> Result<()> {
        self.raw.sync()
    }

    pub fn close(self) -> Result<()> {
        self.raw.close()
    }
}

/// Open an existing file for reading.
pub fn open(path: impl AsRef<Path>) -> Result<File> {
    Ok(File {
        raw: sys::RawFile::open(path.as_ref())?,
    })
}

/// Create (or truncate) a file for writing.
pub fn create(path: impl AsRef<Path>) -> Result<File> {
    Ok(File {
        raw: sys::RawFile::create(path.as_ref())?,
    })
}

/// Open or create a file for writing, positioned at its end.
pub fn append(path: impl AsRef<Path>) -> Result<File> {
    Ok(File {
        raw: sys::RawFile::append(path.as_ref())?,
    })
}

// ── Path operations ───────────────────────────────────────────────────────────

pub fn size(path: impl AsRef<Path>) -> Result<u64> {
    sys::path_size(path.as_ref())
}

pub fn exists(path: impl AsRef<Path>) -> bool {
    sys::exists(path.as_ref())
}

/// Move `from` over `to`, replacing it if present.
///
/// Atomic on POSIX and on NT-class Windows.  On the single-byte Win32 path
/// there is no atomic replace: the destination is deleted and the move
/// retried, so an interruption between the two steps can leave `to`
/// missing with `from` still in place.
pub fn rename(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    sys::rename(from.as_ref(), to.as_ref())
}

#[doc(alias = "remove_file")]
pub fn unlink(path: impl AsRef<Path>) -> Result<()> {
    sys::unlink(path.as_ref())
}

/// Create one directory.  Fails with `AlreadyExists` if it is there.
pub fn mkdir(path: impl AsRef<Path>) -> Result<()> {
    sys::mkdir(path.as_ref())
}

/// Create `path` and every missing ancestor.  Components that already
/// exist are fine; any other failure aborts the whole call.  A bare drive
/// root (`C:`, `C:\`) or UNC share is taken to exist.
pub fn mkdirp(path: impl AsRef<Path>) -> Result<()> {
    let bytes = sys::path_bytes(path.as_ref())?;
    if bytes.is_empty() {
        return Err(KeelError::InvalidPath);
    }

    let plan = segments::Plan::new(bytes, sys::PATH_STYLE);
    for prefix in plan.prefixes() {
        match sys::mkdir(sys::path_from_bytes(prefix)?) {
            Ok(()) | Err(KeelError::AlreadyExists) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Remove an empty directory.
pub fn rmdir(path: impl AsRef<Path>) -> Result<()> {
    sys::rmdir(path.as_ref())
}

/// Resolve `path` to its canonical absolute form in `buf`, returning the
/// number of bytes written.  Never truncates: a result that does not fit is
/// `BufferTooSmall`.
///
/// On POSIX the path must exist (symlinks are resolved); on Win32 the
/// resolution is lexical.
pub fn absolute_into(path: impl AsRef<Path>, buf: &mut [u8]) -> Result<usize> {
    sys::absolute_into(path.as_ref(), buf)
}

pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut buf = vec![0u8; PATH_BUF_LEN];
    let len = absolute_into(path, &mut buf)?;
    Ok(sys::path_from_bytes(&buf[..len])?.to_path_buf())
}

// ── Locking ───────────────────────────────────────────────────────────────────

/// An exclusive whole-file advisory lock, held for as long as this handle
/// is open.
#[derive(Debug)]
#[must_use = "the lock is released when the LockFile is dropped"]
pub struct LockFile {
    raw: sys::RawFile,
}

/// Open or create `path` and lock it exclusively.  Fails immediately if
/// another handle holds the lock, including one in this process.
pub fn lock(path: impl AsRef<Path>) -> Result<LockFile> {
    Ok(LockFile {
        raw: sys::RawFile::lock(path.as_ref())?,
    })
}

impl LockFile {
    /// Release the lock and close the handle.  The handle is closed even
    /// when the unlock call fails; the error only reports that the release
    /// was not acknowledged.
    pub fn unlock(self) -> Result<()> {
        let unlocked = self.raw.unlock();
        let closed = self.raw.close();
        unlocked.and(closed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn write_file(path: &Path, bytes: &[u8]) {
        let mut f = create(path).expect("create");
        f.write_all(bytes).expect("write");
        f.close().expect("close");
    }

    fn read_file(path: &Path) -> Vec<u8> {
        let mut f = open(path).expect("open");
        let len = f.size().expect("fsize") as usize;
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf).expect("read");
        buf
    }

    #[test]
    fn write_close_reopen_read_roundtrip() {
        let dir = scratch();
        let path = dir.path().join("blob.bin");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();

        write_file(&path, &bytes);

        let mut f = open(&path).expect("reopen");
        let mut buf = vec![0u8; bytes.len()];
        f.read_exact(&mut buf).expect("read");
        assert_eq!(buf, bytes);
    }

    #[test]
    fn short_read_is_failure() {
        let dir = scratch();
        let path = dir.path().join("short");
        write_file(&path, b"abc");

        let mut f = open(&path).expect("open");
        let mut buf = [0u8; 8];
        let err = f.read_exact(&mut buf).expect_err("only 3 bytes exist");
        assert!(matches!(
            err,
            KeelError::ShortTransfer {
                expected: 8,
                actual: 3
            }
        ));
    }

    #[test]
    fn rename_replaces_existing_destination() {
        let dir = scratch();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        write_file(&a, b"rename-roundtrip");
        write_file(&b, b"stale contents that must disappear");

        rename(&a, &b).expect("rename");

        assert_eq!(read_file(&b), b"rename-roundtrip");
        assert!(!exists(&a));
    }

    #[test]
    fn mkdirp_creates_every_level_and_is_idempotent() {
        let dir = scratch();
        let leaf = dir.path().join("a").join("b").join("c");

        mkdirp(&leaf).expect("mkdirp");
        assert!(exists(dir.path().join("a")));
        assert!(exists(dir.path().join("a").join("b")));
        assert!(exists(&leaf));

        mkdirp(&leaf).expect("second mkdirp");
    }

    #[test]
    fn mkdirp_fails_when_an_ancestor_is_a_file() {
        let dir = scratch();
        let blocker = dir.path().join("file");
        write_file(&blocker, b"x");

        assert!(mkdirp(blocker.join("sub")).is_err());
    }

    #[test]
    fn mkdir_reports_existing_directory() {
        let dir = scratch();
        let d = dir.path().join("d");
        mkdir(&d).expect("mkdir");
        assert!(matches!(mkdir(&d), Err(KeelError::AlreadyExists)));
        rmdir(&d).expect("rmdir");
        assert!(!exists(&d));
    }

    #[test]
    fn open_missing_file_is_an_error_not_an_abort() {
        let dir = scratch();
        assert!(open(dir.path().join("nope")).is_err());
        assert!(size(dir.path().join("nope")).is_err());
        assert!(unlink(dir.path().join("nope")).is_err());
    }

    #[test]
    fn append_positions_at_end() {
        let dir = scratch();
        let path = dir.path().join("log");

        let mut f = append(&path).expect("append creates");
        f.write_all(b"one,").expect("write");
        f.close().expect("close");

        let mut f = append(&path).expect("append reopens");
        f.write_all(b"two").expect("write");
        f.sync().expect("fsync");
        f.close().expect("close");

        assert_eq!(read_file(&path), b"one,two");
    }

    #[test]
    fn create_truncates() {
        let dir = scratch();
        let path = dir.path().join("t");
        write_file(&path, b"long original contents");
        write_file(&path, b"new");
        assert_eq!(size(&path).expect("size"), 3);
    }

    #[test]
    fn seek_returns_new_offset() {
        let dir = scratch();
        let path = dir.path().join("s");
        write_file(&path, b"0123456789");

        let mut f = open(&path).expect("open");
        assert_eq!(f.seek(7).expect("seek"), 7);
        let mut buf = [0u8; 3];
        f.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"789");
    }

    /// 5 000 000 000 bytes does not fit in 32 bits.  The file is sparse
    /// (seek past the end, write the final byte) so the test stays cheap.
    #[test]
    fn size_beyond_32_bits_is_exact() {
        const LEN: u64 = 5_000_000_000;

        let dir = scratch();
        let path = dir.path().join("huge");
        let mut f = create(&path).expect("create");
        assert_eq!(f.seek(LEN - 1).expect("seek"), LEN - 1);
        f.write_all(&[0xAA]).expect("write last byte");
        assert_eq!(f.size().expect("fsize"), LEN);
        f.close().expect("close");

        assert_eq!(size(&path).expect("size"), LEN);
        unlink(&path).expect("unlink");
    }

    #[test]
    fn lock_then_unlock_closes_handle() {
        let dir = scratch();
        let path = dir.path().join("LOCK");

        let held = lock(&path).expect("lock");
        assert!(exists(&path));
        held.unlock().expect("unlock");

        // The file can be locked again once released.
        lock(&path).expect("relock").unlock().expect("unlock again");
    }

    #[test]
    fn second_lock_in_same_process_is_refused() {
        let dir = scratch();
        let path = dir.path().join("LOCK");

        let held = lock(&path).expect("lock");
        assert!(lock(&path).is_err(), "lock was granted twice");

        held.unlock().expect("unlock");
        lock(&path).expect("relock after release").unlock().expect("unlock again");
    }

    #[test]
    fn absolute_resolves_relative_paths() {
        let dir = scratch();
        let path = dir.path().join("abs");
        write_file(&path, b"");

        let resolved = absolute(&path).expect("absolute");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("abs"));
    }

    #[test]
    fn absolute_into_never_truncates() {
        let dir = scratch();
        let mut tiny = [0u8; 4];
        let err = absolute_into(dir.path(), &mut tiny).expect_err("too small");
        assert!(matches!(err, KeelError::BufferTooSmall { capacity: 4, .. }));
    }

    #[test]
    fn mkdirp_rejects_empty_path() {
        assert!(matches!(mkdirp(""), Err(KeelError::InvalidPath)));
    }
}
