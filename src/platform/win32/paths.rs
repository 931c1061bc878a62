// ── Dual path API ─────────────────────────────────────────────────────────────
//
// `HostPaths` is every Win32 call that takes or returns a path, in two
// flavours.  `WidePaths` converts to NUL-terminated UTF-16 and calls the
// `*W` entry points; `NarrowPaths` accepts ASCII paths only and calls the
// `*A` entry points, which interpret bytes in the active code page.
//
// Conversion buffers are `SmallVec`s: typical paths fit inline and never
// touch the heap.

#![allow(unsafe_code)]

use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use smallvec::SmallVec;
use windows::core::{s, w, PCSTR, PCWSTR, PSTR, PWSTR};
use windows::Win32::Foundation::{BOOL, ERROR_ALREADY_EXISTS, HANDLE, MAX_PATH};
use windows::Win32::Storage::FileSystem::{
    CreateDirectoryA, CreateDirectoryW, CreateFileA, CreateFileW, DeleteFileA, DeleteFileW,
    GetFileAttributesA, GetFileAttributesW, GetFullPathNameA, GetFullPathNameW, MoveFileA,
    MoveFileExW, RemoveDirectoryA, RemoveDirectoryW, FILE_ATTRIBUTE_NORMAL,
    FILE_CREATION_DISPOSITION, FILE_SHARE_MODE, MOVEFILE_REPLACE_EXISTING,
};
use windows::Win32::System::Environment::{
    GetCurrentDirectoryA, GetCurrentDirectoryW, GetEnvironmentVariableA, GetEnvironmentVariableW,
};

use super::os_err;
use super::process::shell32;
use crate::error::{KeelError, Result};

const INVALID_FILE_ATTRIBUTES: u32 = u32::MAX;

/// `CSIDL_APPDATA`: the roaming per-user application data folder.
const CSIDL_APPDATA: i32 = 0x001a;

type WideBuf = SmallVec<[u16; 256]>;
type NarrowBuf = SmallVec<[u8; 256]>;

fn to_wide(path: &Path) -> Result<WideBuf> {
    let mut buf: WideBuf = path.as_os_str().encode_wide().collect();
    if buf.contains(&0) {
        return Err(KeelError::InvalidPath);
    }
    buf.push(0);
    Ok(buf)
}

fn to_narrow(path: &Path) -> Result<NarrowBuf> {
    let text = path
        .to_str()
        .filter(|s| s.is_ascii() && !s.contains('\0'))
        .ok_or(KeelError::InvalidPath)?;
    let mut buf = NarrowBuf::from_slice(text.as_bytes());
    buf.push(0);
    Ok(buf)
}

fn from_wide(units: &[u16]) -> Result<Vec<u8>> {
    String::from_utf16(units)
        .map(String::into_bytes)
        .map_err(|_| KeelError::InvalidPath)
}

pub(crate) fn copy_out(src: &[u8], buf: &mut [u8]) -> Result<usize> {
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

/// Drive a "returns length, or required size if too small" Win32 call
/// until the result fits.  `call` returns 0 on failure.
fn grow_until_fits<T: Copy + Default>(
    function: &'static str,
    mut call: impl FnMut(&mut [T]) -> u32,
) -> Result<Vec<T>> {
    let mut buf = vec![T::default(); MAX_PATH as usize];
    loop {
        let n = call(&mut buf) as usize;
        if n == 0 {
            return Err(KeelError::last_os(function));
        }
        if n < buf.len() {
            buf.truncate(n);
            return Ok(buf);
        }
        // `n` is the required size including the terminator.
        buf.resize(n, T::default());
    }
}

fn is_already_exists(e: &KeelError) -> bool {
    matches!(e, KeelError::Os { code, .. } if *code == ERROR_ALREADY_EXISTS.0)
}

pub(crate) type SpecialFolderW = unsafe extern "system" fn(*mut core::ffi::c_void, PWSTR, i32, BOOL) -> BOOL;
pub(crate) type SpecialFolderA = unsafe extern "system" fn(*mut core::ffi::c_void, PSTR, i32, BOOL) -> BOOL;

// ── Interface ─────────────────────────────────────────────────────────────────

pub(crate) trait HostPaths: Sync {
    fn name(&self) -> &'static str;

    fn create_file(
        &self,
        path: &Path,
        access: u32,
        share: FILE_SHARE_MODE,
        disposition: FILE_CREATION_DISPOSITION,
    ) -> Result<HANDLE>;

    /// `None` if the path does not exist or cannot be queried.
    fn attributes(&self, path: &Path) -> Option<u32>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn delete_file(&self, path: &Path) -> Result<()>;
    fn create_dir(&self, path: &Path) -> Result<()>;
    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Full path as UTF-8 bytes.
    fn full_path(&self, path: &Path) -> Result<Vec<u8>>;

    /// Current directory as UTF-8 bytes.
    fn current_dir(&self) -> Result<Vec<u8>>;

    /// `CSIDL_APPDATA`, or `%USERPROFILE%` when the shell cannot say.
    fn app_data(&self) -> Result<Vec<u8>>;
}

// ── UTF-16 (`*W`) ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct WidePaths;

impl HostPaths for WidePaths {
    fn name(&self) -> &'static str {
        "wide"
    }

    fn create_file(
        &self,
        path: &Path,
        access: u32,
        share: FILE_SHARE_MODE,
        disposition: FILE_CREATION_DISPOSITION,
    ) -> Result<HANDLE> {
        let p = to_wide(path)?;
        // SAFETY: `p` is NUL-terminated and outlives the call.
        unsafe {
            CreateFileW(
                PCWSTR(p.as_ptr()),
                access,
                share,
                None,
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                HANDLE::default(),
            )
        }
        .map_err(os_err("CreateFileW"))
    }

    fn attributes(&self, path: &Path) -> Option<u32> {
        let p = to_wide(path).ok()?;
        // SAFETY: NUL-terminated.
        let attrs = unsafe { GetFileAttributesW(PCWSTR(p.as_ptr())) };
        (attrs != INVALID_FILE_ATTRIBUTES).then_some(attrs)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let (src, dst) = (to_wide(from)?, to_wide(to)?);
        // SAFETY: both NUL-terminated.
        unsafe {
            MoveFileExW(
                PCWSTR(src.as_ptr()),
                PCWSTR(dst.as_ptr()),
                MOVEFILE_REPLACE_EXISTING,
            )
        }
        .map_err(os_err("MoveFileExW"))
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let p = to_wide(path)?;
        // SAFETY: NUL-terminated.
        unsafe { DeleteFileW(PCWSTR(p.as_ptr())) }.map_err(os_err("DeleteFileW"))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let p = to_wide(path)?;
        // SAFETY: NUL-terminated; default security.
        unsafe { CreateDirectoryW(PCWSTR(p.as_ptr()), None) }
            .map_err(os_err("CreateDirectoryW"))
            .map_err(|e| if is_already_exists(&e) { KeelError::AlreadyExists } else { e })
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let p = to_wide(path)?;
        // SAFETY: NUL-terminated.
        unsafe { RemoveDirectoryW(PCWSTR(p.as_ptr())) }.map_err(os_err("RemoveDirectoryW"))
    }

    fn full_path(&self, path: &Path) -> Result<Vec<u8>> {
        let p = to_wide(path)?;
        let units = grow_until_fits("GetFullPathNameW", |buf: &mut [u16]| {
            // SAFETY: NUL-terminated input; output bounded by the slice.
            unsafe { GetFullPathNameW(PCWSTR(p.as_ptr()), Some(buf), None) }
        })?;
        from_wide(&units)
    }

    fn current_dir(&self) -> Result<Vec<u8>> {
        let units = grow_until_fits("GetCurrentDirectoryW", |buf: &mut [u16]| {
            // SAFETY: output bounded by the slice.
            unsafe { GetCurrentDirectoryW(Some(buf)) }
        })?;
        from_wide(&units)
    }

    fn app_data(&self) -> Result<Vec<u8>> {
        let mut buf = [0u16; MAX_PATH as usize];
        if let Some(f) = shell32().folder_w {
            // SAFETY: `f` is SHGetSpecialFolderPathW; the buffer holds the
            // documented MAX_PATH units.
            if unsafe { f(std::ptr::null_mut(), PWSTR(buf.as_mut_ptr()), CSIDL_APPDATA, BOOL(0)) }
                .as_bool()
            {
                let len = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
                return from_wide(&buf[..len]);
            }
        }

        // SAFETY: output bounded by the slice.
        let n = unsafe { GetEnvironmentVariableW(w!("USERPROFILE"), Some(&mut buf[..])) } as usize;
        if n == 0 || n >= buf.len() {
            return Err(KeelError::VarNotPresent);
        }
        from_wide(&buf[..n])
    }
}

// ── Single-byte (`*A`) ────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct NarrowPaths;

impl HostPaths for NarrowPaths {
    fn name(&self) -> &'static str {
        "narrow"
    }

    fn create_file(
        &self,
        path: &Path,
        access: u32,
        share: FILE_SHARE_MODE,
        disposition: FILE_CREATION_DISPOSITION,
    ) -> Result<HANDLE> {
        let p = to_narrow(path)?;
        // SAFETY: `p` is NUL-terminated and outlives the call.
        unsafe {
            CreateFileA(
                PCSTR(p.as_ptr()),
                access,
                share,
                None,
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                HANDLE::default(),
            )
        }
        .map_err(os_err("CreateFileA"))
    }

    fn attributes(&self, path: &Path) -> Option<u32> {
        let p = to_narrow(path).ok()?;
        // SAFETY: NUL-terminated.
        let attrs = unsafe { GetFileAttributesA(PCSTR(p.as_ptr())) };
        (attrs != INVALID_FILE_ATTRIBUTES).then_some(attrs)
    }

    /// No atomic replace on this path: when the destination exists it is
    /// deleted and the move retried.  An interruption between the two
    /// leaves `to` missing and `from` in place.
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let (src_buf, dst_buf) = (to_narrow(from)?, to_narrow(to)?);
        let (src, dst) = (PCSTR(src_buf.as_ptr()), PCSTR(dst_buf.as_ptr()));

        // SAFETY: both NUL-terminated and alive for every call below.
        match unsafe { MoveFileA(src, dst) }.map_err(os_err("MoveFileA")) {
            Ok(()) => return Ok(()),
            Err(e) if is_already_exists(&e) => {}
            Err(e) => return Err(e),
        }
        // SAFETY: as above.
        unsafe { DeleteFileA(dst) }.map_err(os_err("DeleteFileA"))?;
        // SAFETY: as above.
        unsafe { MoveFileA(src, dst) }.map_err(os_err("MoveFileA"))
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let p = to_narrow(path)?;
        // SAFETY: NUL-terminated.
        unsafe { DeleteFileA(PCSTR(p.as_ptr())) }.map_err(os_err("DeleteFileA"))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let p = to_narrow(path)?;
        // SAFETY: NUL-terminated; default security.
        unsafe { CreateDirectoryA(PCSTR(p.as_ptr()), None) }
            .map_err(os_err("CreateDirectoryA"))
            .map_err(|e| if is_already_exists(&e) { KeelError::AlreadyExists } else { e })
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let p = to_narrow(path)?;
        // SAFETY: NUL-terminated.
        unsafe { RemoveDirectoryA(PCSTR(p.as_ptr())) }.map_err(os_err("RemoveDirectoryA"))
    }

    fn full_path(&self, path: &Path) -> Result<Vec<u8>> {
        let p = to_narrow(path)?;
        grow_until_fits("GetFullPathNameA", |buf: &mut [u8]| {
            // SAFETY: NUL-terminated input; output bounded by the slice.
            unsafe { GetFullPathNameA(PCSTR(p.as_ptr()), Some(buf), None) }
        })
    }

    fn current_dir(&self) -> Result<Vec<u8>> {
        grow_until_fits("GetCurrentDirectoryA", |buf: &mut [u8]| {
            // SAFETY: output bounded by the slice.
            unsafe { GetCurrentDirectoryA(Some(buf)) }
        })
    }

    fn app_data(&self) -> Result<Vec<u8>> {
        let mut buf = [0u8; MAX_PATH as usize];
        if let Some(f) = shell32().folder_a {
            // SAFETY: `f` is SHGetSpecialFolderPathA; the buffer holds the
            // documented MAX_PATH bytes.
            if unsafe { f(std::ptr::null_mut(), PSTR(buf.as_mut_ptr()), CSIDL_APPDATA, BOOL(0)) }
                .as_bool()
            {
                let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                return Ok(buf[..len].to_vec());
            }
        }

        // SAFETY: output bounded by the slice.
        let n = unsafe { GetEnvironmentVariableA(s!("USERPROFILE"), Some(&mut buf[..])) } as usize;
        if n == 0 || n >= buf.len() {
            return Err(KeelError::VarNotPresent);
        }
        Ok(buf[..n].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_conversion_is_nul_terminated() {
        let w = to_wide(Path::new(r"C:\data")).expect("wide");
        assert_eq!(w.last(), Some(&0));
        assert_eq!(w.len(), "C:\\data".len() + 1);
    }

    #[test]
    fn narrow_conversion_rejects_non_ascii() {
        assert!(to_narrow(Path::new(r"C:\data")).is_ok());
        assert!(matches!(
            to_narrow(Path::new("C:\\d\u{e9}j\u{e0}")),
            Err(KeelError::InvalidPath)
        ));
    }

    #[test]
    fn both_paths_agree_on_current_dir() {
        let wide = WidePaths.current_dir().expect("wide cwd");
        let narrow = NarrowPaths.current_dir().expect("narrow cwd");
        if narrow.is_ascii() {
            assert_eq!(wide, narrow);
        }
    }
}
