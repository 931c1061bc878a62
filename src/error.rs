// ── Central error type ────────────────────────────────────────────────────────
//
// All recoverable operations in Keel return `error::Result<T>`.  Conditions
// that mean an invariant is already broken (a primitive's OS handle refusing
// to close, thread creation failing, an initializer guard in an impossible
// state) never become a `KeelError`; they go through `fatal` and end the
// process.

/// Every recoverable error that Keel can produce.
#[derive(Debug)]
pub enum KeelError {
    /// A host API call reported failure.
    Os {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw host error code (`GetLastError()` value or `errno`).
        code: u32,
    },

    /// A standard I/O error (config file read, …).
    Io(std::io::Error),

    /// A read or write moved fewer bytes than requested.
    ShortTransfer { expected: usize, actual: usize },

    /// A caller-supplied buffer cannot hold the result.  Nothing was
    /// truncated; the buffer contents are unspecified.
    BufferTooSmall { needed: usize, capacity: usize },

    /// The target of `mkdir` already exists.
    AlreadyExists,

    /// The requested environment variable is not set.
    VarNotPresent,

    /// The path contains an interior NUL or cannot be expressed on the
    /// active host code path.
    InvalidPath,

    /// The operation has no meaning on this host.
    Unsupported { operation: &'static str },

    /// The host config document failed to parse.
    Config(serde_json::Error),
}

impl KeelError {
    /// Wrap the calling thread's current `errno` / `GetLastError()` value.
    ///
    /// Call immediately after the failing host function; the code lives in
    /// thread-local state that any later call may overwrite.
    pub(crate) fn last_os(function: &'static str) -> Self {
        Self::Os {
            function,
            code: crate::platform::sys::last_error_code(),
        }
    }
}

impl std::fmt::Display for KeelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Os { function, code } => {
                write!(f, "{function} failed (error {code:#010x})")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ShortTransfer { expected, actual } => {
                write!(f, "short transfer: {actual} of {expected} bytes")
            }
            Self::BufferTooSmall { needed, capacity } => {
                write!(f, "buffer too small: need {needed} bytes, have {capacity}")
            }
            Self::AlreadyExists => f.write_str("already exists"),
            Self::VarNotPresent => f.write_str("environment variable not present"),
            Self::InvalidPath => f.write_str("path cannot be represented on this host"),
            Self::Unsupported { operation } => {
                write!(f, "{operation} is not supported on this host")
            }
            Self::Config(e) => write!(f, "host config: {e}"),
        }
    }
}

impl std::error::Error for KeelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeelError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e)
    }
}

// Convert a windows-crate error (HRESULT) directly into a KeelError so that
// `?` can be used on `windows::core::Result<T>` throughout the Win32 backend.
#[cfg(windows)]
impl From<windows::core::Error> for KeelError {
    fn from(e: windows::core::Error) -> Self {
        // Win32 errors appear as 0x8007xxxx HRESULTs; keep the low word so
        // codes compare equal to `GetLastError()` values.
        let hr = e.code().0 as u32;
        let code = if hr & 0xFFFF_0000 == 0x8007_0000 {
            hr & 0xFFFF
        } else {
            hr
        };
        Self::Os {
            function: "windows",
            code,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KeelError>;

// ── Fatal path ────────────────────────────────────────────────────────────────

/// Terminate the process after an unrecoverable invariant violation.
///
/// Not a panic: nothing may unwind past a half-released OS primitive.
#[cold]
pub(crate) fn fatal(what: &'static str) -> ! {
    tracing::error!(what, "keel: fatal invariant violation, aborting");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_display_names_function_and_code() {
        let e = KeelError::Os {
            function: "MoveFileExW",
            code: 5,
        };
        assert_eq!(e.to_string(), "MoveFileExW failed (error 0x00000005)");
    }

    #[test]
    fn buffer_too_small_reports_both_sizes() {
        let e = KeelError::BufferTooSmall {
            needed: 40,
            capacity: 8,
        };
        assert_eq!(e.to_string(), "buffer too small: need 40 bytes, have 8");
    }

    #[test]
    fn config_error_exposes_source() {
        let parse = serde_json::from_str::<u32>("nope").expect_err("must fail");
        let e = KeelError::from(parse);
        assert!(std::error::Error::source(&e).is_some());
    }
}
