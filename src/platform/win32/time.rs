#![allow(unsafe_code)]

use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};
use windows::Win32::System::SystemInformation::GetSystemTimeAsFileTime;
use windows::Win32::System::Threading::Sleep;

use crate::error::fatal;

/// `FILETIME` counts 100 ns intervals.
pub(crate) const CALENDAR_FREQUENCY: u64 = 10_000_000;

/// 1601-01-01 to 1970-01-01 in 100 ns intervals.
const UNIX_EPOCH_FILETIME: u64 = 116_444_736_000_000_000;

pub(crate) fn monotonic_frequency() -> Option<u64> {
    let mut freq = 0i64;
    // SAFETY: `freq` is a valid out-pointer.
    unsafe { QueryPerformanceFrequency(&mut freq) }.ok()?;
    u64::try_from(freq).ok()
}

pub(crate) fn monotonic_counter() -> u64 {
    let mut ticks = 0i64;
    // SAFETY: `ticks` is a valid out-pointer.  The call cannot fail once
    // the frequency query has succeeded.
    if unsafe { QueryPerformanceCounter(&mut ticks) }.is_err() {
        fatal("QueryPerformanceCounter");
    }
    ticks as u64
}

/// 100 ns intervals since the Unix epoch.
pub(crate) fn calendar_counter() -> u64 {
    // SAFETY: no preconditions.
    let ft = unsafe { GetSystemTimeAsFileTime() };
    let since_1601 = (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
    since_1601.saturating_sub(UNIX_EPOCH_FILETIME)
}

pub(crate) fn sleep_ms(ms: u64) {
    // `INFINITE` is u32::MAX; stay below it.
    let ms = ms.min(u64::from(u32::MAX - 1)) as u32;
    // SAFETY: no preconditions.
    unsafe { Sleep(ms) };
}
